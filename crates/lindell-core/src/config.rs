//! Ceremony configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest Paillier modulus the client accepts by default
pub const DEFAULT_MIN_PAILLIER_MODULUS_BITS: u64 = 2048;

const ENV_PEER_TIMEOUT_MS: &str = "LINDELL_PEER_TIMEOUT_MS";
const ENV_MIN_PAILLIER_BITS: &str = "LINDELL_MIN_PAILLIER_BITS";

/// Tunables shared by both roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeremonyConfig {
    /// How long to wait for the next peer message; unbounded when unset
    pub peer_timeout_ms: Option<u64>,
    /// Reject Paillier moduli shorter than this
    pub min_paillier_modulus_bits: u64,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            peer_timeout_ms: None,
            min_paillier_modulus_bits: DEFAULT_MIN_PAILLIER_MODULUS_BITS,
        }
    }
}

impl CeremonyConfig {
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn peer_timeout(&self) -> Option<Duration> {
        self.peer_timeout_ms.map(Duration::from_millis)
    }

    /// Defaults overridden by `LINDELL_PEER_TIMEOUT_MS` and `LINDELL_MIN_PAILLIER_BITS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(ENV_PEER_TIMEOUT_MS) {
            let ms = value.parse::<u64>().map_err(|e| {
                Error::InvalidConfig(format!("{}: {}", ENV_PEER_TIMEOUT_MS, e))
            })?;
            config.peer_timeout_ms = Some(ms);
        }

        if let Ok(value) = std::env::var(ENV_MIN_PAILLIER_BITS) {
            config.min_paillier_modulus_bits = value.parse::<u64>().map_err(|e| {
                Error::InvalidConfig(format!("{}: {}", ENV_MIN_PAILLIER_BITS, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if !value.is_object() {
            return Err(Error::InvalidConfig("configuration must be a JSON object".into()));
        }
        let config: Self =
            serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.peer_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig("peer timeout must be positive".into()));
        }
        if self.min_paillier_modulus_bits == 0 {
            return Err(Error::InvalidConfig(
                "minimum Paillier modulus size must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CeremonyConfig::default();
        assert_eq!(config.peer_timeout(), None);
        assert_eq!(config.min_paillier_modulus_bits, 2048);
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = CeremonyConfig::from_json(r#"{"peer_timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.peer_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.min_paillier_modulus_bits, DEFAULT_MIN_PAILLIER_MODULUS_BITS);

        assert!(CeremonyConfig::from_json(r#"{"peer_timeout_ms": 0}"#).is_err());
        assert!(matches!(CeremonyConfig::from_json("[]"), Err(Error::InvalidConfig(_))));
        assert!(CeremonyConfig::from_json("7").is_err());
        assert!(CeremonyConfig::from_json("{}").is_ok());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(ENV_PEER_TIMEOUT_MS, "250");
        std::env::set_var(ENV_MIN_PAILLIER_BITS, "3072");
        let config = CeremonyConfig::from_env().unwrap();
        std::env::remove_var(ENV_PEER_TIMEOUT_MS);
        std::env::remove_var(ENV_MIN_PAILLIER_BITS);

        assert_eq!(config.peer_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.min_paillier_modulus_bits, 3072);
    }
}
