//! Feature pipeline configuration parsing from environment variables.
//!
//! This module handles the data source, chunking and labeling parameters.

use super::parse_var;
use crate::application::features::chunked_builder::{
    BuilderSettings, ChunkContinuity, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_ROWS,
};
use crate::application::features::labeling::{
    DEFAULT_LOOKFORWARD_PERIODS, DEFAULT_PROFIT_THRESHOLD, LabelGenerator,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_DATA_PATH: &str = "ETHUSD_1m_Binance.csv";

/// Feature pipeline environment configuration
#[derive(Debug, Clone)]
pub struct FeatureEnvConfig {
    pub data_path: PathBuf,
    pub chunk_size: usize,
    pub continuity: ChunkContinuity,
    pub profit_threshold: f64,
    pub lookforward_periods: usize,
}

impl FeatureEnvConfig {
    pub fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_path = var("DATA_PATH").unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());

        let continuity = match var("CHUNK_CONTINUITY") {
            Some(raw) => raw.parse::<ChunkContinuity>().context("Failed to parse CHUNK_CONTINUITY")?,
            None => ChunkContinuity::Carry,
        };
        let continuity = match continuity {
            ChunkContinuity::Overlap { .. } => ChunkContinuity::Overlap {
                rows: parse_var(var, "OVERLAP_ROWS", DEFAULT_OVERLAP_ROWS)?,
            },
            carry => carry,
        };

        Ok(Self {
            data_path: PathBuf::from(data_path),
            chunk_size: parse_var(var, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            continuity,
            profit_threshold: parse_var(var, "PROFIT_THRESHOLD", DEFAULT_PROFIT_THRESHOLD)?,
            lookforward_periods: parse_var(var, "LOOKFORWARD_PERIODS", DEFAULT_LOOKFORWARD_PERIODS)?,
        })
    }

    pub fn labeler(&self) -> LabelGenerator {
        LabelGenerator::new(self.profit_threshold, self.lookforward_periods)
    }

    /// Settings for a labeled, normalized build.
    pub fn builder_settings(&self) -> BuilderSettings {
        BuilderSettings {
            chunk_size: self.chunk_size,
            continuity: self.continuity,
            normalize: true,
            labeler: Some(self.labeler()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_feature_config_defaults() {
        let config = FeatureEnvConfig::from_lookup(&lookup(&[])).unwrap();
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_PATH));
        assert_eq!(config.chunk_size, 50_000);
        assert_eq!(config.continuity, ChunkContinuity::Carry);
        assert_eq!(config.labeler(), LabelGenerator::default());
    }

    #[test]
    fn test_overlap_rows_apply_to_overlap_mode() {
        let config = FeatureEnvConfig::from_lookup(&lookup(&[
            ("CHUNK_CONTINUITY", "overlap"),
            ("OVERLAP_ROWS", "250"),
            ("PROFIT_THRESHOLD", "0.02"),
        ]))
        .unwrap();
        assert_eq!(config.continuity, ChunkContinuity::Overlap { rows: 250 });
        assert_eq!(config.builder_settings().labeler.unwrap().profit_threshold, 0.02);
    }

    #[test]
    fn test_invalid_values_fail_loudly() {
        assert!(FeatureEnvConfig::from_lookup(&lookup(&[("CHUNK_CONTINUITY", "sliding")])).is_err());
        let err = FeatureEnvConfig::from_lookup(&lookup(&[("CHUNK_SIZE", "lots")])).unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }
}
