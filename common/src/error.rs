use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Exchange API error: {0}")]
    ExchangeError(String),

    /// Temporary rate limit reported by the exchange. Retryable.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Parsing error: {0}")]
    ParseError(String),

    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failed call may succeed if issued again after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_is_transient() {
        assert!(Error::RateLimited("time wait restriction".into()).is_transient());
        assert!(!Error::ExchangeError("invalid key".into()).is_transient());
        assert!(!Error::UnsupportedValue("side: HOLD".into()).is_transient());
    }
}
