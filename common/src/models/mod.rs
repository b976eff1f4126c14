mod service;
mod trade;

pub use service::{ServiceCredential, ServiceKind};
pub use trade::{sort_trades, TradeAction, TradeRecord};
