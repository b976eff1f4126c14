use crate::{decode, read_body, sign, ExchangeConnector, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::{
    models::{TradeAction, TradeRecord},
    Error, Result,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const ZAIF_API_URL: &str = "https://api.zaif.jp";
const SERVICE_NAME: &str = "Zaif";

/// Error text Zaif sends when requests arrive faster than the account allows
const TIME_WAIT_RESTRICTION: &str = "time wait restriction";

pub struct ZaifConnector {
    client: reqwest::Client,
    key: String,
    secret: String,
    base_url: String,
    /// Must strictly increase across every private call made with this key
    nonce: AtomicU64,
    retry: RetryPolicy,
}

impl ZaifConnector {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            secret: secret.into(),
            base_url: ZAIF_API_URL.to_string(),
            nonce: AtomicU64::new(Utc::now().timestamp().max(0) as u64),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::SeqCst)
    }

    /// Calls a private `tapi` method and returns the raw response body.
    async fn private_request(&self, method: &str, params: &[(&str, String)]) -> Result<String> {
        let mut all_params = params.to_vec();
        all_params.push(("method", method.to_string()));
        all_params.push(("nonce", self.next_nonce().to_string()));

        let body = sign::encode_params(&all_params);
        let signature = sign::hmac_sha512_hex(&body, &self.secret);

        debug!("POST (signed) /tapi method={}", method);

        let response = self
            .client
            .post(format!("{}/tapi", self.base_url))
            .header("Key", &self.key)
            .header("Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(Error::HttpError)?;

        read_body(response, SERVICE_NAME).await
    }

    async fn trade_history_once(
        &self,
        currency_pair: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ZaifTrade>> {
        let params = [
            ("currency_pair", currency_pair.to_string()),
            ("since", from.timestamp().to_string()),
            ("end", to.timestamp().to_string()),
        ];
        let body = self.private_request("trade_history", &params).await?;
        let envelope: ZaifEnvelope = decode(&body, SERVICE_NAME, "trade history")?;
        envelope.into_trades()
    }
}

/// Whether a Zaif error message reports the temporary rate limit.
pub fn is_time_wait_restriction(message: &str) -> bool {
    message.contains(TIME_WAIT_RESTRICTION)
}

#[derive(Debug, Deserialize)]
struct ZaifEnvelope {
    success: i64,
    #[serde(rename = "return", default)]
    result: Value,
    #[serde(default)]
    error: String,
}

impl ZaifEnvelope {
    /// Trades in document order. Zaif keys them by trade id and sends `[]`
    /// when there are none.
    fn into_trades(self) -> Result<Vec<ZaifTrade>> {
        if self.success != 1 {
            return Err(if is_time_wait_restriction(&self.error) {
                Error::RateLimited(self.error)
            } else {
                Error::ExchangeError(self.error)
            });
        }

        let parse = |v: Value| {
            serde_json::from_value::<ZaifTrade>(v)
                .map_err(|e| Error::ParseError(format!("Failed to parse Zaif trade: {}", e)))
        };
        match self.result {
            Value::Object(map) => map.into_iter().map(|(_, v)| parse(v)).collect(),
            Value::Array(items) => items.into_iter().map(parse).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(Error::ParseError(format!(
                "unexpected Zaif trade history payload: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ZaifCurrencyPair {
    currency_pair: String,
}

#[derive(Debug, Deserialize)]
struct ZaifTrade {
    action: String,
    your_action: String,
    amount: f64,
    price: f64,
    #[serde(default)]
    fee: f64,
    #[serde(default)]
    fee_amount: f64,
    #[serde(default)]
    bonus: Option<f64>,
    #[serde(deserialize_with = "unix_seconds")]
    timestamp: i64,
}

/// Zaif sends `timestamp` as a quoted number of seconds; accept a bare one too.
fn unix_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Int(s) => Ok(s),
        Seconds::Float(s) => Ok(s as i64),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn parse_your_action(your_action: &str) -> Result<TradeAction> {
    match your_action {
        "bid" => Ok(TradeAction::Buy),
        "ask" => Ok(TradeAction::Sell),
        other => Err(Error::UnsupportedValue(format!("unsupported action: {}", other))),
    }
}

fn to_trade_record(currency_pair: &str, trade: &ZaifTrade) -> Result<TradeRecord> {
    let action = parse_your_action(&trade.your_action)?;
    let fee = trade.fee_amount * trade.price;
    let bonus = trade.bonus.unwrap_or(0.0);
    let profit = TradeRecord::realized_profit(action, trade.price, trade.amount, fee, bonus);

    let mut remarks = vec![format!("Action: {}", trade.action)];
    if trade.fee > 0.0 || trade.fee_amount > 0.0 {
        remarks.push(format!("Fee: {:.6}", trade.fee));
        remarks.push(format!("Fee Amount: {:.6}", trade.fee_amount));
    }
    if bonus > 0.0 {
        remarks.push(format!("Bonus: {:.6}", bonus));
    }

    let timestamp = Utc
        .timestamp_opt(trade.timestamp, 0)
        .single()
        .ok_or_else(|| Error::ParseError(format!("invalid timestamp: {}", trade.timestamp)))?;

    Ok(TradeRecord {
        service_name: SERVICE_NAME.to_string(),
        currency_pair: currency_pair.to_string(),
        timestamp,
        action,
        price: trade.price,
        amount: trade.amount,
        fee,
        profit,
        remarks,
    })
}

#[async_trait]
impl ExchangeConnector for ZaifConnector {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn list_currency_pairs(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/1/currency_pairs/all", self.base_url);

        debug!("Fetching currency pairs from Zaif: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Error::HttpError)?;

        let body = read_body(response, SERVICE_NAME).await?;
        let pairs: Vec<ZaifCurrencyPair> = decode(&body, SERVICE_NAME, "currency pairs")?;

        Ok(pairs.into_iter().map(|p| p.currency_pair).collect())
    }

    async fn get_trade_history(
        &self,
        currency_pair: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>> {
        let trades = self
            .retry
            .run(|| self.trade_history_once(currency_pair, from, to))
            .await
            .map_err(|e| match e {
                Error::RateLimited(message) => Error::ExchangeError(message),
                other => other,
            })?;

        info!("Zaif {}: {} trades", currency_pair, trades.len());

        trades
            .iter()
            .map(|trade| to_trade_record(currency_pair, trade))
            .collect()
    }
}
