use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange identifiers accepted in the configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    #[serde(rename = "bitflyer")]
    BitFlyer,
    #[serde(rename = "zaif")]
    Zaif,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::BitFlyer => write!(f, "bitflyer"),
            ServiceKind::Zaif => write!(f, "zaif"),
        }
    }
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitflyer" => Ok(ServiceKind::BitFlyer),
            "zaif" => Ok(ServiceKind::Zaif),
            _ => Err(Error::ConfigError(format!("unsupported service: {}", s))),
        }
    }
}

/// Credentials and pair filter for one configured exchange account
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceCredential {
    /// Service identifier (e.g., "bitflyer", "zaif")
    pub service: String,
    pub key: String,
    pub secret: String,
    /// Pairs to query; empty means every pair the exchange lists
    #[serde(default)]
    pub currencies: Vec<String>,
}

impl ServiceCredential {
    pub fn kind(&self) -> crate::Result<ServiceKind> {
        self.service.parse()
    }
}

impl fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredential")
            .field("service", &self.service)
            .field("key", &"***REDACTED***")
            .field("secret", &"***REDACTED***")
            .field("currencies", &self.currencies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(service: &str) -> ServiceCredential {
        ServiceCredential {
            service: service.to_string(),
            key: "my-key".to_string(),
            secret: "my-secret".to_string(),
            currencies: vec![],
        }
    }

    #[test]
    fn parses_known_services_case_insensitively() {
        assert_eq!("bitflyer".parse::<ServiceKind>().unwrap(), ServiceKind::BitFlyer);
        assert_eq!("bitFlyer".parse::<ServiceKind>().unwrap(), ServiceKind::BitFlyer);
        assert_eq!("Zaif".parse::<ServiceKind>().unwrap(), ServiceKind::Zaif);
    }

    #[test]
    fn rejects_unknown_service() {
        let err = credential("coincheck").kind().unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.to_string().contains("coincheck"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", credential("zaif"));
        assert!(!rendered.contains("my-key"));
        assert!(!rendered.contains("my-secret"));
        assert!(rendered.contains("zaif"));
    }
}
