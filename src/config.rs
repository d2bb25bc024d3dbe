// ⚙️ Configuration
// Environment-driven settings shared by the dashboard, importer and server.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";
pub const DEFAULT_DATABASE_PATH: &str = "cnae.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_CURRENCY_PREFIX: &str = "R$";
pub const DEFAULT_LOG_FILE: &str = "cnae-dashboard.log";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the REST API, without a trailing slash
    pub api_url: String,
    pub database_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub currency_prefix: String,
    /// Initial dashboard range
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub log_file: PathBuf,
}

impl Config {
    /// Read from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank keys take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = get("CNAE_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let bind_raw = get("CNAE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CNAE_BIND_ADDR",
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        let start_date = parse_date("CNAE_START_DATE", get("CNAE_START_DATE"), default_start())?;
        let end_date = parse_date("CNAE_END_DATE", get("CNAE_END_DATE"), default_end())?;

        Ok(Self {
            api_url,
            database_path: get("CNAE_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            bind_addr,
            // Prefix is kept verbatim, only unset falls back
            currency_prefix: lookup("CNAE_CURRENCY_PREFIX")
                .unwrap_or_else(|| DEFAULT_CURRENCY_PREFIX.to_string()),
            start_date,
            end_date,
            log_file: get("CNAE_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            currency_prefix: DEFAULT_CURRENCY_PREFIX.to_string(),
            start_date: default_start(),
            end_date: default_end(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

fn default_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 12, 31).unwrap_or_default()
}

fn parse_date(
    key: &'static str,
    raw: Option<String>,
    default: NaiveDate,
) -> Result<NaiveDate, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
            ConfigError::InvalidValue {
                key,
                value,
                reason: e.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(config.end_date, NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("CNAE_API_URL", "http://api.local:9000/api/v1/"),
            ("CNAE_DATABASE_PATH", "/tmp/x.db"),
            ("CNAE_BIND_ADDR", "127.0.0.1:9999"),
            ("CNAE_CURRENCY_PREFIX", "US$"),
            ("CNAE_START_DATE", "2019-06-01"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "http://api.local:9000/api/v1");
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.bind_addr.port(), 9999);
        assert_eq!(config.currency_prefix, "US$");
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2019, 6, 1).unwrap());
    }

    #[test]
    fn test_empty_prefix_is_kept() {
        let config = config_from(&[("CNAE_CURRENCY_PREFIX", "")]).unwrap();
        assert_eq!(config.currency_prefix, "");
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = config_from(&[("CNAE_END_DATE", "31/12/2020")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CNAE_END_DATE", .. }));

        let err = config_from(&[("CNAE_BIND_ADDR", "not-an-addr")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CNAE_BIND_ADDR", .. }));
    }
}
