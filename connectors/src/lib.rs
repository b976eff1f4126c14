pub mod bitflyer;
pub mod retry;
pub mod sign;
pub mod zaif;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    models::{ServiceCredential, ServiceKind, TradeRecord},
    Error, Result,
};
use serde::de::DeserializeOwned;
use tracing::error;

pub use bitflyer::BitFlyerConnector;
pub use retry::RetryPolicy;
pub use zaif::ZaifConnector;

/// Trait defining the interface for exchange API clients
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Name attached to every record this connector produces
    fn name(&self) -> &str;

    /// List the pairs currently traded on the exchange, in its native format
    async fn list_currency_pairs(&self) -> Result<Vec<String>>;

    /// Get the account's executions for a pair within `[from, to]`, in the
    /// order the exchange returns them
    async fn get_trade_history(
        &self,
        currency_pair: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>>;
}

/// The supported exchanges, selected from configuration
pub enum Connector {
    BitFlyer(BitFlyerConnector),
    Zaif(ZaifConnector),
}

impl Connector {
    pub fn from_credential(credential: &ServiceCredential) -> Result<Self> {
        let key = credential.key.clone();
        let secret = credential.secret.clone();
        Ok(match credential.kind()? {
            ServiceKind::BitFlyer => Connector::BitFlyer(BitFlyerConnector::new(key, secret)),
            ServiceKind::Zaif => Connector::Zaif(ZaifConnector::new(key, secret)),
        })
    }
}

#[async_trait]
impl ExchangeConnector for Connector {
    fn name(&self) -> &str {
        match self {
            Connector::BitFlyer(c) => c.name(),
            Connector::Zaif(c) => c.name(),
        }
    }

    async fn list_currency_pairs(&self) -> Result<Vec<String>> {
        match self {
            Connector::BitFlyer(c) => c.list_currency_pairs().await,
            Connector::Zaif(c) => c.list_currency_pairs().await,
        }
    }

    async fn get_trade_history(
        &self,
        currency_pair: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>> {
        match self {
            Connector::BitFlyer(c) => c.get_trade_history(currency_pair, from, to).await,
            Connector::Zaif(c) => c.get_trade_history(currency_pair, from, to).await,
        }
    }
}

/// Reads the body of a response, turning a non-2xx status into an exchange error.
pub(crate) async fn read_body(response: reqwest::Response, exchange: &str) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(Error::HttpError)?;

    if !status.is_success() {
        error!("{} API error: {} - {}", exchange, status, body);
        return Err(Error::ExchangeError(format!(
            "{} API error: {} - {}",
            exchange, status, body
        )));
    }

    Ok(body)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str, exchange: &str, what: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        Error::ParseError(format!("Failed to parse {} {}: {}", exchange, what, e))
    })
}
