//! Configuration module for profitscout.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Feature pipeline and Model.

mod feature_config;
mod model_config;

pub use feature_config::{DEFAULT_DATA_PATH, FeatureEnvConfig};
pub use model_config::{DEFAULT_MODEL_DIR, ModelEnvConfig};

use anyhow::{Context, Result, anyhow};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub features: FeatureEnvConfig,
    pub model: ModelEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    /// Same as `from_env` but reading variables through `var`.
    pub fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            features: FeatureEnvConfig::from_lookup(var).context("Failed to load feature config")?,
            model: ModelEnvConfig::from_lookup(var).context("Failed to load model config")?,
        })
    }
}

/// Parses `key` when set, `default` otherwise.
fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Failed to parse {}: {}", key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = Config::from_lookup(&|_: &str| None).expect("Should parse with defaults");
        assert_eq!(config.features.lookforward_periods, 30);
        assert_eq!(config.model.forest.max_depth, 15);
    }

    #[test]
    fn test_parse_var_reports_key() {
        let var = |_: &str| Some("abc".to_string());
        let err = parse_var::<usize>(&var, "N_TREES", 100).unwrap_err();
        assert!(err.to_string().contains("N_TREES"));
    }
}
