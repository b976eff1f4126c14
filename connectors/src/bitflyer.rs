use crate::{decode, read_body, sign, ExchangeConnector};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use common::{
    models::{TradeAction, TradeRecord},
    Error, Result,
};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info};

const BITFLYER_API_URL: &str = "https://api.bitflyer.jp";
const SERVICE_NAME: &str = "bitFlyer";

/// Largest page the execution history endpoint serves
const EXECUTION_COUNT: &str = "10000";
/// Executions are reported in UTC and shown in JST
const REPORT_OFFSET_HOURS: i64 = 9;
/// Fractional digits `exec_date` is padded or cut to before parsing
const FRACTION_DIGITS: usize = 9;

pub struct BitFlyerConnector {
    client: reqwest::Client,
    key: String,
    secret: String,
    base_url: String,
}

impl BitFlyerConnector {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            secret: secret.into(),
            base_url: BITFLYER_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Signature over `timestamp + method + path[?query]`.
    fn sign(&self, timestamp: i64, method: &str, path_and_query: &str) -> String {
        let text = format!("{}{}{}", timestamp, method, path_and_query);
        sign::hmac_sha256_hex(text, &self.secret)
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let query = sign::encode_params(params);
        let path_and_query = if query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, query)
        };
        let timestamp = Utc::now().timestamp();
        let signature = self.sign(timestamp, "GET", &path_and_query);

        debug!("GET (signed) {}", path_and_query);

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path_and_query))
            .header("ACCESS-KEY", &self.key)
            .header("ACCESS-TIMESTAMP", timestamp.to_string())
            .header("ACCESS-SIGN", signature)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(Error::HttpError)?;

        let body = read_body(response, SERVICE_NAME).await?;
        decode(&body, SERVICE_NAME, what)
    }
}

#[derive(Debug, Deserialize)]
struct BitFlyerMarket {
    product_code: String,
}

#[derive(Debug, Deserialize)]
struct BitFlyerExecution {
    side: String,
    price: f64,
    size: f64,
    #[serde(default)]
    commission: f64,
    exec_date: String,
}

/// Parses `exec_date`, whose fractional seconds come with anywhere from zero
/// to many digits, into a UTC instant.
fn parse_exec_date(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim_end_matches('Z');
    let (seconds, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let fraction: String = fraction.chars().take(FRACTION_DIGITS).collect();
    let normalized = format!("{}.{:0<width$}", seconds, fraction, width = FRACTION_DIGITS);

    let naive = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| Error::ParseError(format!("invalid exec_date {:?}: {}", raw, e)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn parse_side(side: &str) -> Result<TradeAction> {
    match side {
        "BUY" => Ok(TradeAction::Buy),
        "SELL" => Ok(TradeAction::Sell),
        other => Err(Error::UnsupportedValue(format!("unsupported side: {}", other))),
    }
}

fn to_trade_record(
    currency_pair: &str,
    execution: &BitFlyerExecution,
    executed_at: DateTime<Utc>,
) -> Result<TradeRecord> {
    let action = parse_side(&execution.side)?;
    let fee = execution.commission * execution.price;
    let profit = TradeRecord::realized_profit(action, execution.price, execution.size, fee, 0.0);

    Ok(TradeRecord {
        service_name: SERVICE_NAME.to_string(),
        currency_pair: currency_pair.to_string(),
        timestamp: executed_at + Duration::hours(REPORT_OFFSET_HOURS),
        action,
        price: execution.price,
        amount: execution.size,
        fee,
        profit,
        remarks: Vec::new(),
    })
}

#[async_trait]
impl ExchangeConnector for BitFlyerConnector {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn list_currency_pairs(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/markets", self.base_url);

        debug!("Fetching markets from bitFlyer: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Error::HttpError)?;

        let body = read_body(response, SERVICE_NAME).await?;
        let markets: Vec<BitFlyerMarket> = decode(&body, SERVICE_NAME, "markets")?;

        Ok(markets.into_iter().map(|m| m.product_code).collect())
    }

    async fn get_trade_history(
        &self,
        currency_pair: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TradeRecord>> {
        let params = [
            ("product_code", currency_pair.to_string()),
            ("count", EXECUTION_COUNT.to_string()),
        ];
        let executions: Vec<BitFlyerExecution> = self
            .signed_get("/v1/me/getexecutions", &params, "executions")
            .await?;

        // The endpoint has no time filter; the window is applied here.
        let mut trades = Vec::with_capacity(executions.len());
        for execution in &executions {
            let executed_at = parse_exec_date(&execution.exec_date)?;
            if executed_at < from || executed_at > to {
                continue;
            }
            trades.push(to_trade_record(currency_pair, execution, executed_at)?);
        }

        info!(
            "bitFlyer {}: {} of {} executions within window",
            currency_pair,
            trades.len(),
            executions.len()
        );

        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn execution(
        side: &str,
        price: f64,
        size: f64,
        commission: f64,
        exec_date: &str,
    ) -> BitFlyerExecution {
        BitFlyerExecution {
            side: side.to_string(),
            price,
            size,
            commission,
            exec_date: exec_date.to_string(),
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn normalize(e: &BitFlyerExecution) -> Result<TradeRecord> {
        to_trade_record("BTC_JPY", e, parse_exec_date(&e.exec_date)?)
    }

    #[test]
    fn sell_execution() {
        let trade = normalize(&execution("SELL", 100.0, 2.0, 0.001, "2021-01-01T00:00:00")).unwrap();

        assert_eq!(trade.action, TradeAction::Sell);
        assert!((trade.fee - 0.1).abs() < 1e-12);
        assert!((trade.profit - 199.9).abs() < 1e-9);
        assert_eq!(trade.timestamp, utc("2021-01-01T09:00:00Z"));
        assert_eq!(trade.service_name, "bitFlyer");
        assert_eq!(trade.currency_pair, "BTC_JPY");
        assert!(trade.remarks.is_empty());
    }

    #[test]
    fn buy_execution() {
        let trade = normalize(&execution("BUY", 3_000_000.0, 0.01, 0.0000015, "2021-03-04T05:06:07.5")).unwrap();

        let fee = 0.0000015 * 3_000_000.0;
        assert_eq!(trade.action, TradeAction::Buy);
        assert!((trade.fee - fee).abs() < 1e-9);
        assert!((trade.profit - (-(3_000_000.0 * 0.01) - fee)).abs() < 1e-9);
    }

    #[test]
    fn unknown_side_is_rejected() {
        for side in ["buy", "HOLD", ""] {
            let err = normalize(&execution(side, 1.0, 1.0, 0.0, "2021-01-01T00:00:00")).unwrap_err();
            assert!(matches!(err, Error::UnsupportedValue(_)), "side {:?}", side);
        }
    }

    #[test]
    fn exec_date_precision_is_normalized() {
        assert_eq!(parse_exec_date("2015-07-14T07:25:47").unwrap(), utc("2015-07-14T07:25:47Z"));
        assert_eq!(parse_exec_date("2015-07-14T07:25:47.7").unwrap(), utc("2015-07-14T07:25:47.700Z"));
        assert_eq!(parse_exec_date("2015-07-14T07:25:47.747").unwrap(), utc("2015-07-14T07:25:47.747Z"));
        assert_eq!(
            parse_exec_date("2015-07-14T07:25:47.123456").unwrap(),
            utc("2015-07-14T07:25:47.123456Z")
        );
        assert_eq!(
            parse_exec_date("2015-07-14T07:25:47.1234567891").unwrap(),
            utc("2015-07-14T07:25:47.123456789Z")
        );
        assert_eq!(parse_exec_date("2015-07-14T07:25:47.5Z").unwrap(), utc("2015-07-14T07:25:47.5Z"));
    }

    #[test]
    fn malformed_exec_date_is_a_parse_error() {
        let err = parse_exec_date("14/07/2015 07:25").unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn signature_covers_timestamp_method_and_query() {
        let connector = BitFlyerConnector::new("key", "secret");
        let expected = sign::hmac_sha256_hex(
            "1600000000GET/v1/me/getexecutions?count=10000&product_code=BTC_JPY",
            "secret",
        );
        assert_eq!(
            connector.sign(1_600_000_000, "GET", "/v1/me/getexecutions?count=10000&product_code=BTC_JPY"),
            expected
        );
    }

    #[tokio::test]
    async fn lists_product_codes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/markets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"product_code":"BTC_JPY","market_type":"Spot"},{"product_code":"ETH_BTC","market_type":"Spot"}]"#)
            .create_async()
            .await;

        let connector = BitFlyerConnector::new("key", "secret").with_base_url(server.url());
        let pairs = connector.list_currency_pairs().await.unwrap();

        assert_eq!(pairs, vec!["BTC_JPY", "ETH_BTC"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetches_signed_executions_within_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/me/getexecutions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("product_code".into(), "BTC_JPY".into()),
                Matcher::UrlEncoded("count".into(), "10000".into()),
            ]))
            .match_header("ACCESS-KEY", "my-key")
            .match_header("ACCESS-TIMESTAMP", Matcher::Regex(r"^\d+$".into()))
            .match_header("ACCESS-SIGN", Matcher::Regex("^[0-9a-f]{64}$".into()))
            .with_status(200)
            .with_body(
                r#"[
                    {"id":3,"side":"SELL","price":100,"size":2,"commission":0.001,"exec_date":"2021-01-01T00:00:00","child_order_id":"a"},
                    {"id":2,"side":"BUY","price":50,"size":1,"commission":0,"exec_date":"2020-06-01T12:00:00.12"},
                    {"id":1,"side":"BUY","price":10,"size":1,"commission":0,"exec_date":"2019-01-01T00:00:00"}
                ]"#,
            )
            .create_async()
            .await;

        let connector = BitFlyerConnector::new("my-key", "my-secret").with_base_url(server.url());
        let trades = connector
            .get_trade_history("BTC_JPY", utc("2020-01-01T00:00:00Z"), utc("2022-01-01T00:00:00Z"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].action, TradeAction::Sell);
        assert_eq!(trades[0].timestamp, utc("2021-01-01T09:00:00Z"));
        assert_eq!(trades[1].action, TradeAction::Buy);
        assert_eq!(trades[1].profit, -50.0);
        assert_eq!(trades[1].timestamp, utc("2020-06-01T21:00:00.12Z"));
    }

    #[tokio::test]
    async fn unsupported_side_fails_the_whole_call() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/me/getexecutions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"side":"SELL","price":1,"size":1,"commission":0,"exec_date":"2021-01-01T00:00:00"},{"side":"SWAP","price":1,"size":1,"commission":0,"exec_date":"2021-01-01T00:00:00"}]"#)
            .create_async()
            .await;

        let connector = BitFlyerConnector::new("k", "s").with_base_url(server.url());
        let err = connector
            .get_trade_history("BTC_JPY", utc("2020-01-01T00:00:00Z"), utc("2022-01-01T00:00:00Z"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedValue(_)));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/me/getexecutions")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"status":-500,"error_message":"Invalid signature"}"#)
            .create_async()
            .await;

        let connector = BitFlyerConnector::new("k", "s").with_base_url(server.url());
        let err = connector
            .get_trade_history("BTC_JPY", utc("2020-01-01T00:00:00Z"), utc("2022-01-01T00:00:00Z"))
            .await
            .unwrap_err();

        match err {
            Error::ExchangeError(msg) => assert!(msg.contains("Invalid signature")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/markets")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let connector = BitFlyerConnector::new("k", "s").with_base_url(server.url());
        let err = connector.list_currency_pairs().await.unwrap_err();

        assert!(matches!(err, Error::ParseError(_)));
    }
}
