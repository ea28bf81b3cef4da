use crate::application::features::engineer_features;
use crate::application::features::outlier_normalizer::{ClipBounds, ClipPolicy};
use crate::domain::errors::InferenceError;
use crate::domain::market::candle::Candle;
use crate::domain::ml::feature_registry::Feature;
use crate::domain::ml::prediction::{PredictionResponse, TechnicalSummary};
use crate::domain::ports::{FeatureScaler, ProbabilityClassifier};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Where live inference takes its clip bounds from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipMode {
    /// Percentiles of the request's own candles.
    PerCall,
    /// Bounds persisted at training time, when the bundle has them.
    #[default]
    Frozen,
}

impl FromStr for ClipMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per_call" | "percall" => Ok(ClipMode::PerCall),
            "frozen" => Ok(ClipMode::Frozen),
            _ => anyhow::bail!("Invalid CLIP_MODE: {}. Must be 'per_call' or 'frozen'", s),
        }
    }
}

/// Everything a trained model needs at prediction time.
pub struct ModelBundle {
    pub scaler: Box<dyn FeatureScaler>,
    pub classifier: Box<dyn ProbabilityClassifier>,
    /// Columns fed to the scaler, in order.
    pub feature_columns: Vec<Feature>,
    pub clip_bounds: Option<ClipBounds>,
}

pub struct InferenceAdapter {
    bundle: ModelBundle,
    clip_mode: ClipMode,
}

impl InferenceAdapter {
    pub fn new(bundle: ModelBundle, clip_mode: ClipMode) -> Self {
        if clip_mode == ClipMode::Frozen && bundle.clip_bounds.is_none() {
            warn!("Bundle has no clip bounds, falling back to per-call normalization");
        }
        info!(
            "Inference ready: {} over {} features",
            bundle.classifier.name(),
            bundle.feature_columns.len()
        );
        Self { bundle, clip_mode }
    }

    /// Predicts from raw candles. Never fails: every error becomes the WAIT
    /// fallback with an `error` message.
    pub fn predict(&self, candles: &[Candle]) -> PredictionResponse {
        match self.try_predict(candles) {
            Ok(response) => response,
            Err(InferenceError::InsufficientData { features_available }) => {
                warn!(
                    "Insufficient data: {}/{} features available from {} candles",
                    features_available,
                    self.bundle.feature_columns.len(),
                    candles.len()
                );
                PredictionResponse::insufficient_data(features_available)
            }
            Err(e) => {
                error!("Prediction failed: {}", e);
                PredictionResponse::fallback(e.to_string())
            }
        }
    }

    pub fn try_predict(&self, candles: &[Candle]) -> Result<PredictionResponse, InferenceError> {
        if candles.is_empty() {
            return Err(InferenceError::NoCandles);
        }

        let policy = match (self.clip_mode, &self.bundle.clip_bounds) {
            (ClipMode::Frozen, Some(bounds)) => ClipPolicy::Frozen(bounds),
            _ => ClipPolicy::PerCall,
        };
        let table = engineer_features(candles, policy);
        let last = table.len() - 1;
        let columns = &self.bundle.feature_columns;

        let features_available = table.available_count(last, columns);
        if features_available < columns.len() {
            return Err(InferenceError::InsufficientData { features_available });
        }
        let row: Vec<f64> = columns.iter().filter_map(|f| table.cell(last, *f)).collect();

        let scaled = self.bundle.scaler.transform(&row)?;
        let prediction = self.bundle.classifier.predict(&scaled)?;
        let probability = self.bundle.classifier.predict_proba(&scaled)?;
        debug!("Raw model output: prediction={} probability={:.4}", prediction, probability);

        // Raw closes, in time order; the input may arrive unsorted.
        let latest = candles
            .iter()
            .max_by_key(|c| c.open_time)
            .ok_or(InferenceError::NoCandles)?;
        let earliest = candles
            .iter()
            .min_by_key(|c| c.open_time)
            .ok_or(InferenceError::NoCandles)?;
        let price_change_24h = (earliest.close != 0.0)
            .then(|| (latest.close - earliest.close) / earliest.close * 100.0);

        Ok(PredictionResponse {
            current_price: Some(latest.close),
            price_change_24h,
            technical_summary: Some(TechnicalSummary {
                rsi: table.cell(last, Feature::Rsi),
                macd: table.cell(last, Feature::Macd),
                bb_position: table.cell(last, Feature::BbPosition),
                volatility: table.cell(last, Feature::Volatility10),
            }),
            data_points: Some(candles.len()),
            timestamp: Some(latest.open_time),
            ..PredictionResponse::decision(prediction, probability)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::FEATURE_COUNT;
    use crate::domain::ml::prediction::Recommendation;

    struct Identity(usize);

    impl FeatureScaler for Identity {
        fn transform(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
            if row.len() != self.0 {
                return Err(InferenceError::DimensionMismatch {
                    expected: self.0,
                    actual: row.len(),
                });
            }
            Ok(row.to_vec())
        }

        fn n_features(&self) -> usize {
            self.0
        }
    }

    struct Constant(f64);

    impl ProbabilityClassifier for Constant {
        fn predict_proba(&self, _scaled: &[f64]) -> Result<f64, InferenceError> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    struct Broken;

    impl ProbabilityClassifier for Broken {
        fn predict_proba(&self, _scaled: &[f64]) -> Result<f64, InferenceError> {
            Err(InferenceError::Model {
                reason: "weights missing".to_string(),
            })
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn adapter(classifier: Box<dyn ProbabilityClassifier>) -> InferenceAdapter {
        InferenceAdapter::new(
            ModelBundle {
                scaler: Box::new(Identity(FEATURE_COUNT)),
                classifier,
                feature_columns: Feature::ALL.to_vec(),
                clip_bounds: None,
            },
            ClipMode::PerCall,
        )
    }

    fn series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i % 6) as f64;
                Candle::new(i as i64 * 60_000, close - 0.5, close + 1.0, close - 1.0, close, 10.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn test_five_candles_is_insufficient() {
        let response = adapter(Box::new(Constant(0.9))).predict(&series(5));
        assert_eq!(response.error.as_deref(), Some("Insufficient data for prediction"));
        assert_eq!(response.recommendation, Recommendation::Wait);
        assert_eq!(response.probability, 0.5);
        assert!(response.features_available.is_some_and(|n| n < FEATURE_COUNT));
    }

    #[test]
    fn test_successful_prediction_fields() {
        let mut candles = series(40);
        candles.reverse();
        let response = adapter(Box::new(Constant(0.85))).predict(&candles);

        assert!(!response.is_error());
        assert_eq!(response.prediction, 1);
        assert_eq!(response.recommendation, Recommendation::Buy);
        assert_eq!(response.data_points, Some(40));
        assert_eq!(response.timestamp, Some(39 * 60_000));
        assert_eq!(response.current_price, Some(100.0 + (39 % 6) as f64));
        let change = response.price_change_24h.unwrap();
        assert!((change - 3.0).abs() < 1e-9);
        assert!(response.technical_summary.unwrap().rsi.is_some());
    }

    #[test]
    fn test_model_error_becomes_fallback() {
        let response = adapter(Box::new(Broken)).predict(&series(40));
        assert!(response.error.unwrap().contains("weights missing"));
        assert_eq!(response.prediction, 0);
        assert_eq!(response.recommendation, Recommendation::Wait);
    }

    #[test]
    fn test_empty_request() {
        let response = adapter(Box::new(Constant(0.1))).predict(&[]);
        assert!(response.is_error());
        assert!(response.features_available.is_none());
    }

    #[test]
    fn test_clip_mode_parsing() {
        assert_eq!("per_call".parse::<ClipMode>().unwrap(), ClipMode::PerCall);
        assert_eq!("FROZEN".parse::<ClipMode>().unwrap(), ClipMode::Frozen);
        assert!("never".parse::<ClipMode>().is_err());
    }
}
