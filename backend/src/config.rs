//! Configuration management for the Retail POS & Inventory Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with POS_ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use shared::{validate_code_prefix, validate_tax_rate};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sale business rules
    pub sales: SalesConfig,

    /// Return business rules
    pub returns: ReturnsConfig,

    /// Stock alert policy
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SalesConfig {
    /// Tax rate applied to the sale subtotal (fraction, e.g. 0.07)
    pub tax_rate: Decimal,

    /// Hours after creation during which a sale may be voided
    pub void_window_hours: i64,

    /// Prefix for generated sale codes
    pub code_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReturnsConfig {
    /// Days after a sale during which a return may be requested
    pub window_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// Units above zero that still classify a low-stock level as
    /// critical. Policy constant, deliberately configurable.
    pub critical_band: i32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> AppResult<Self> {
        let environment = std::env::var("POS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config: Config = Self::sources(&environment)
            .map_err(|e| AppError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn sources(environment: &str) -> Result<config::Config, ConfigError> {
        config::Config::builder()
            // Start with default values
            .set_default("environment", environment)?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("sales.tax_rate", "0.07")?
            .set_default("sales.void_window_hours", 24)?
            .set_default("sales.code_prefix", "POS")?
            .set_default("returns.window_days", 30)?
            .set_default("alerts.critical_band", 2)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (POS_ prefix)
            .add_source(
                Environment::with_prefix("POS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
    }

    /// Reject business-rule settings no deployment should run with.
    fn validate(&self) -> AppResult<()> {
        validate_tax_rate(self.sales.tax_rate)
            .map_err(|msg| AppError::Configuration(format!("sales.tax_rate: {}", msg)))?;
        validate_code_prefix(&self.sales.code_prefix)
            .map_err(|msg| AppError::Configuration(format!("sales.code_prefix: {}", msg)))?;
        if self.sales.void_window_hours <= 0 {
            return Err(AppError::Configuration(
                "sales.void_window_hours must be positive".to_string(),
            ));
        }
        if self.returns.window_days <= 0 {
            return Err(AppError::Configuration(
                "returns.window_days must be positive".to_string(),
            ));
        }
        if self.alerts.critical_band < 0 {
            return Err(AppError::Configuration(
                "alerts.critical_band cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sane_config() -> Config {
        Config {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/pos".to_string(),
                max_connections: 10,
                min_connections: 2,
            },
            sales: SalesConfig {
                tax_rate: Decimal::from_str("0.07").unwrap(),
                void_window_hours: 24,
                code_prefix: "POS".to_string(),
            },
            returns: ReturnsConfig { window_days: 30 },
            alerts: AlertsConfig { critical_band: 2 },
        }
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(sane_config().validate().is_ok());
    }

    #[test]
    fn nonpositive_windows_fail_validation() {
        let mut config = sane_config();
        config.sales.void_window_hours = 0;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(msg)) if msg.contains("void_window_hours")
        ));

        let mut config = sane_config();
        config.returns.window_days = -1;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(msg)) if msg.contains("window_days")
        ));
    }

    #[test]
    fn tax_rate_and_prefix_use_shared_rules() {
        let mut config = sane_config();
        config.sales.tax_rate = Decimal::from_str("1.5").unwrap();
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(msg)) if msg.contains("tax_rate")
        ));

        let mut config = sane_config();
        config.sales.code_prefix = "pos".to_string();
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration(msg)) if msg.contains("code_prefix")
        ));
    }
}
