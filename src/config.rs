use std::env;
use std::str::FromStr;

use crate::evaluator::RateSettings;
use crate::storage::MIN_UPDATE_INTERVAL_SECS;

#[derive(Debug, Clone)]
pub struct Config {
    pub explorer_api_url: String,
    pub explorer_api_key: String,
    pub dashboard_api_url: String,
    pub database_url: String,
    pub http_bind_addr: String,
    pub rate: RateSettings,
    pub default_update_interval_secs: f64,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing EXPLORER_API_KEY env var")]
    MissingExplorerApiKey,
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let explorer_api_key =
            env::var("EXPLORER_API_KEY").map_err(|_| ConfigError::MissingExplorerApiKey)?;
        let explorer_api_url = env::var("EXPLORER_API_URL")
            .unwrap_or_else(|_| "https://api-sepolia.arbiscan.io/api".to_string());
        let dashboard_api_url = env::var("DASHBOARD_API_URL")
            .unwrap_or_else(|_| "https://dashboard-devnet3.cortensor.network".to_string());

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/sentinel.db".to_string());
        let http_bind_addr = env::var("HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let defaults = RateSettings::default();
        let rate = RateSettings {
            max_calls_per_second: parse_var("MAX_CALLS_PER_SECOND", defaults.max_calls_per_second)?,
            floor_delay_secs: parse_var("FLOOR_DELAY_SECS", defaults.floor_delay_secs)?,
        };
        if !rate.max_calls_per_second.is_finite() || rate.max_calls_per_second <= 0.0 {
            return Err(ConfigError::Invalid {
                var: "MAX_CALLS_PER_SECOND",
                value: rate.max_calls_per_second.to_string(),
            });
        }
        if !rate.floor_delay_secs.is_finite() || rate.floor_delay_secs < 0.0 {
            return Err(ConfigError::Invalid {
                var: "FLOOR_DELAY_SECS",
                value: rate.floor_delay_secs.to_string(),
            });
        }
        let default_update_interval_secs: f64 = parse_var("DEFAULT_UPDATE_INTERVAL_SECS", 300.0)?;
        if !default_update_interval_secs.is_finite()
            || default_update_interval_secs < MIN_UPDATE_INTERVAL_SECS
        {
            return Err(ConfigError::Invalid {
                var: "DEFAULT_UPDATE_INTERVAL_SECS",
                value: default_update_interval_secs.to_string(),
            });
        }

        Ok(Self {
            explorer_api_url,
            explorer_api_key,
            dashboard_api_url,
            database_url,
            http_bind_addr,
            rate,
            default_update_interval_secs,
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => parse_value(var, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.to_string(),
    })
}
