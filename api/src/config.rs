//! Worker configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use shared::config::{AggregationConfig, FinalizationConfig};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Unknown log format: {other}"),
        }
    }
}

/// Worker configuration.
///
/// Configuration values can be set via environment variables:
/// - `WEATHER_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `WEATHER_PORT`: The port to listen on (default: 8080)
/// - `WEATHER_LOG_FORMAT`: `pretty` or `json` (default: pretty)
/// - `WEATHER_FINALIZER_ENABLED`: Run the scheduled sweep (default: true)
/// - `WEATHER_FINALIZER_INTERVAL_SECS`: Seconds between sweeps (default: 86400)
/// - `WEATHER_LOOKBACK_HOURS`: Hours before today's midnight left open (default: 24)
/// - `WEATHER_TIME_BUDGET_SECS`: Wall-clock budget per sweep (default: 540)
/// - `WEATHER_PAGE_SIZE`: Days fetched per page (default: 100)
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Log output format.
    pub log_format: LogFormat,
    /// Hot-path settings.
    pub aggregation: AggregationConfig,
    /// Finalization settings.
    pub finalization: FinalizationConfig,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A numeric or boolean variable is set but cannot be parsed
    /// - The resulting aggregation or finalization settings are invalid
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let host = std::env::var("WEATHER_HOST").unwrap_or(defaults.host);
        let port = env_parse("WEATHER_PORT")?.unwrap_or(defaults.port);
        let log_format = env_parse("WEATHER_LOG_FORMAT")?.unwrap_or(defaults.log_format);

        let mut finalization = defaults.finalization;
        if let Some(enabled) = env_parse("WEATHER_FINALIZER_ENABLED")? {
            finalization.enabled = enabled;
        }
        if let Some(secs) = env_parse("WEATHER_FINALIZER_INTERVAL_SECS")? {
            finalization.schedule_interval = Duration::from_secs(secs);
        }
        if let Some(hours) = env_parse("WEATHER_LOOKBACK_HOURS")? {
            finalization.lookback_hours = hours;
        }
        if let Some(secs) = env_parse("WEATHER_TIME_BUDGET_SECS")? {
            finalization.time_budget = Duration::from_secs(secs);
        }
        if let Some(page_size) = env_parse("WEATHER_PAGE_SIZE")? {
            finalization.page_size = page_size;
        }

        let config = Self {
            host,
            port,
            log_format,
            aggregation: defaults.aggregation,
            finalization,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the nested aggregation and finalization settings.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.aggregation
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid aggregation configuration")?;
        self.finalization
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid finalization configuration")?;
        Ok(())
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_format: LogFormat::default(),
            aggregation: AggregationConfig::default(),
            finalization: FinalizationConfig::default(),
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {name}: {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.finalization.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_socket_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Config::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_invalid_socket_addr_is_an_error() {
        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.finalization.page_size = 0;
        assert!(config.validate().is_err());
    }
}
