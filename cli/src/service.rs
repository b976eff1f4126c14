use crate::config::AppConfig;
use chrono::{DateTime, Duration, Utc};
use common::{
    models::{sort_trades, TradeRecord},
    Result,
};
use connectors::{Connector, ExchangeConnector};
use tracing::{debug, info};

/// How far back trade history is requested
pub const HISTORY_WINDOW_DAYS: i64 = 365;

/// A connector and the pairs to query on it; no pairs means all listed pairs
pub struct ServiceTarget<C> {
    pub connector: C,
    pub currency_pairs: Vec<String>,
}

/// Collects trade history across every configured exchange
pub struct TradeHistoryService<C> {
    targets: Vec<ServiceTarget<C>>,
}

impl TradeHistoryService<Connector> {
    /// Builds a connector for every configured service. Fails on the first
    /// unknown service before anything touches the network.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let targets = config
            .services
            .iter()
            .map(|credential| -> Result<ServiceTarget<Connector>> {
                Ok(ServiceTarget {
                    connector: Connector::from_credential(credential)?,
                    currency_pairs: credential.currencies.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(targets))
    }
}

impl<C: ExchangeConnector> TradeHistoryService<C> {
    pub fn new(targets: Vec<ServiceTarget<C>>) -> Self {
        Self { targets }
    }

    /// Pairs listed by each exchange, keyed by service name
    pub async fn list_currency_pairs(&self) -> Result<Vec<(String, Vec<String>)>> {
        let mut listed = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let pairs = target.connector.list_currency_pairs().await?;
            listed.push((target.connector.name().to_string(), pairs));
        }
        Ok(listed)
    }

    /// All trades of the last year across every service and pair, oldest
    /// first. Any failure aborts the whole collection.
    pub async fn collect_trades(&self, now: DateTime<Utc>) -> Result<Vec<TradeRecord>> {
        let from = now - Duration::days(HISTORY_WINDOW_DAYS);
        let mut trades = Vec::new();

        for target in &self.targets {
            let connector = &target.connector;
            let pairs = if target.currency_pairs.is_empty() {
                debug!("Discovering currency pairs on {}", connector.name());
                connector.list_currency_pairs().await?
            } else {
                target.currency_pairs.clone()
            };

            for pair in &pairs {
                info!("Fetching {} trade history for {}", connector.name(), pair);
                let history = connector.get_trade_history(pair, from, now).await?;
                trades.extend(history);
            }
        }

        sort_trades(&mut trades);
        info!("Collected {} trades", trades.len());

        Ok(trades)
    }
}
