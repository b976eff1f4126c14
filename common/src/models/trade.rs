use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an executed trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    /// Sign applied to the traded notional: buying spends cash, selling receives it.
    pub fn cash_sign(&self) -> f64 {
        match self {
            TradeAction::Buy => -1.0,
            TradeAction::Sell => 1.0,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "Buy"),
            TradeAction::Sell => write!(f, "Sell"),
        }
    }
}

/// One executed trade, normalized across exchanges
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    /// Exchange the execution came from
    pub service_name: String,
    /// Exchange-native pair identifier (e.g., "BTC_JPY", "btc_jpy")
    pub currency_pair: String,
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    /// Unit price in quote currency
    pub price: f64,
    /// Quantity in base currency
    pub amount: f64,
    /// Fee in quote currency
    pub fee: f64,
    /// Realized cash flow of this execution in quote currency, net of fee and bonus
    pub profit: f64,
    /// Free-text annotations for details the other fields cannot carry
    pub remarks: Vec<String>,
}

impl TradeRecord {
    /// Cash flow of a single execution: signed notional, minus fee, plus bonus.
    pub fn realized_profit(
        action: TradeAction,
        price: f64,
        amount: f64,
        fee: f64,
        bonus: f64,
    ) -> f64 {
        action.cash_sign() * price * amount - fee + bonus
    }
}

/// Orders trades by timestamp, oldest first.
pub fn sort_trades(trades: &mut [TradeRecord]) {
    trades.sort_by_key(|t| t.timestamp);
}
