//! Runtime configuration loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tunables shared by every component of a render.
///
/// Every key is optional; an empty file yields the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Debounce window for continuous filter inputs.
    pub debounce_ms: u64,

    /// Page size for editable grids that do not set one.
    pub default_page_size: usize,

    /// Field holding row identity when the content does not name one.
    pub row_identifier: String,

    /// Text shown for missing values.
    pub placeholder: String,

    pub currency_symbol: String,

    pub datetime_format: String,
    pub date_format: String,
    pub time_format: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            default_page_size: 10,
            row_identifier: "id".to_string(),
            placeholder: "N/A".to_string(),
            currency_symbol: "$".to_string(),
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M:%S".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(Error::Config("default_page_size must be at least 1".into()));
        }
        if self.row_identifier.is_empty() {
            return Err(Error::Config("row_identifier must not be empty".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = RuntimeConfig::parse("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn parse_overrides() {
        let config = RuntimeConfig::parse(
            r#"
debounce_ms = 150
default_page_size = 25
placeholder = "-"
currency_symbol = "€"
"#,
        )
        .unwrap();
        assert_eq!(config.debounce_ms, 150);
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.placeholder, "-");
        assert_eq!(config.currency_symbol, "€");
        assert_eq!(config.row_identifier, "id");
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = RuntimeConfig::parse("default_page_size = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = RuntimeConfig::parse("debounce_ms = \"soon\"").unwrap_err();
        assert!(err.to_string().starts_with("config error"));
    }
}
