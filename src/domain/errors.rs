use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or saving the model artifact bundle
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Model artifact not found: {path}")]
    MissingArtifact { path: PathBuf },

    #[error("Model artifact {path} is corrupt: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Unknown feature column in bundle: {name}")]
    UnknownFeatureColumn { name: String },

    #[error("Scaler expects {scaler} features but bundle lists {columns} columns")]
    ShapeMismatch { scaler: usize, columns: usize },

    #[error("Failed to write model artifact {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },
}

/// Errors related to feature building and data ingestion
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read candle source: {reason}")]
    Source { reason: String },

    #[error("Malformed candle at row {row}: {reason}")]
    MalformedCandle { row: usize, reason: String },

    #[error("Invalid pipeline configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("No usable rows after feature engineering")]
    EmptyDataset,
}

/// Errors raised inside a single live prediction
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("No candles supplied")]
    NoCandles,

    #[error("Insufficient data for prediction")]
    InsufficientData { features_available: usize },

    #[error("Feature vector has {actual} values, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model evaluation failed: {reason}")]
    Model { reason: String },
}
