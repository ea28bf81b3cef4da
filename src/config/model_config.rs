//! Model configuration parsing from environment variables.
//!
//! This module handles the artifact location, classifier choice and
//! training/inference parameters.

use super::parse_var;
use crate::application::ml::classifier::{ClassifierKind, ForestParams};
use crate::application::ml::inference::ClipMode;
use crate::application::ml::training::{DEFAULT_SPLIT_SEED, DEFAULT_TEST_FRACTION, TrainingSettings};
use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_MODEL_DIR: &str = "models";

/// Model environment configuration
#[derive(Debug, Clone)]
pub struct ModelEnvConfig {
    pub model_dir: PathBuf,
    pub classifier: ClassifierKind,
    pub forest: ForestParams,
    pub test_fraction: f64,
    pub split_seed: u64,
    pub clip_mode: ClipMode,
}

impl ModelEnvConfig {
    pub fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let classifier = match var("CLASSIFIER") {
            Some(raw) => raw.parse::<ClassifierKind>()?,
            None => ClassifierKind::RandomForest,
        };
        let clip_mode = match var("CLIP_MODE") {
            Some(raw) => raw.parse::<ClipMode>().context("Failed to parse CLIP_MODE")?,
            None => ClipMode::default(),
        };
        let defaults = ForestParams::default();

        Ok(Self {
            model_dir: PathBuf::from(var("MODEL_DIR").unwrap_or_else(|| DEFAULT_MODEL_DIR.to_string())),
            classifier,
            forest: ForestParams {
                n_trees: parse_var(var, "N_TREES", defaults.n_trees)?,
                max_depth: parse_var(var, "MAX_DEPTH", defaults.max_depth)?,
                min_samples_split: parse_var(var, "MIN_SAMPLES_SPLIT", defaults.min_samples_split)?,
                min_samples_leaf: parse_var(var, "MIN_SAMPLES_LEAF", defaults.min_samples_leaf)?,
            },
            test_fraction: parse_var(var, "TEST_FRACTION", DEFAULT_TEST_FRACTION)?,
            split_seed: parse_var(var, "SPLIT_SEED", DEFAULT_SPLIT_SEED)?,
            clip_mode,
        })
    }

    pub fn training_settings(&self) -> TrainingSettings {
        TrainingSettings {
            classifier: self.classifier,
            forest: self.forest,
            test_fraction: self.test_fraction,
            split_seed: self.split_seed,
        }
    }
}
