//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::{CheckoutConfig, PricingPolicy};
use common::WarehouseId;
use thiserror::Error;

/// A variable was set but could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human-readable
/// - `DATABASE_URL`: PostgreSQL URL; when unset everything runs in memory
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `10`)
/// - `TAX_RATE`, `SHIPPING_FEE`, `FREE_SHIPPING_THRESHOLD`, `COD_FEE`: pricing
/// - `DEFAULT_WAREHOUSE_ID`: fallback warehouse for addresses without coordinates
/// - `WORKER_POLL_INTERVAL_MS`: task worker poll period (default `1000`)
/// - `PROMO_SWEEP_INTERVAL_SECS`: promo sweep period (default `3600`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub pricing: PricingPolicy,
    pub default_warehouse_id: Option<WarehouseId>,
    pub worker_poll_interval: Duration,
    pub promo_sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Unset variables take their default; set but malformed ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match get("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            pricing: PricingPolicy {
                tax_rate: parse(&get, "TAX_RATE")?
                    .unwrap_or(defaults.pricing.tax_rate),
                shipping_fee: parse(&get, "SHIPPING_FEE")?
                    .unwrap_or(defaults.pricing.shipping_fee),
                free_shipping_threshold: parse(&get, "FREE_SHIPPING_THRESHOLD")?
                    .unwrap_or(defaults.pricing.free_shipping_threshold),
                cod_fee: parse(&get, "COD_FEE")?.unwrap_or(defaults.pricing.cod_fee),
            },
            default_warehouse_id: parse(&get, "DEFAULT_WAREHOUSE_ID")?,
            worker_poll_interval: parse(&get, "WORKER_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.worker_poll_interval),
            promo_sweep_interval: parse(&get, "PROMO_SWEEP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.promo_sweep_interval),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig {
            pricing: self.pricing.clone(),
            default_warehouse_id: self.default_warehouse_id,
        }
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError { var, value })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            pricing: PricingPolicy::default(),
            default_warehouse_id: None,
            worker_poll_interval: Duration::from_millis(1000),
            promo_sweep_interval: Duration::from_secs(3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use rust_decimal_macros::dec;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.pricing, PricingPolicy::default());
        assert_eq!(config.worker_poll_interval, Duration::from_secs(1));
        assert_eq!(config.promo_sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let warehouse = WarehouseId::new();
        let config = load(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("TAX_RATE", "0.075"),
            ("COD_FEE", " 3.50 "),
            ("DEFAULT_WAREHOUSE_ID", &warehouse.to_string()),
            ("WORKER_POLL_INTERVAL_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.pricing.tax_rate, dec!(0.075));
        assert_eq!(config.pricing.cod_fee, dec!(3.50));
        assert_eq!(config.pricing.shipping_fee, dec!(5.00));
        assert_eq!(config.checkout().default_warehouse_id, Some(warehouse));
        assert_eq!(config.worker_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let err = load(&[("TAX_RATE", "ten percent")]).unwrap_err();
        assert_eq!(err.var, "TAX_RATE");

        let err = load(&[("DEFAULT_WAREHOUSE_ID", "main")]).unwrap_err();
        assert_eq!(err.var, "DEFAULT_WAREHOUSE_ID");
    }

    #[test]
    fn test_blank_value_uses_default() {
        let config = load(&[("PORT", "  ")]).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
