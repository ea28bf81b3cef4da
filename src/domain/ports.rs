use crate::domain::errors::InferenceError;

/// Fitted transform applied to a feature vector before classification.
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError>;

    /// Number of features the transform was fit on.
    fn n_features(&self) -> usize;
}

/// Interface for the binary profit classifier
pub trait ProbabilityClassifier: Send + Sync {
    /// Probability (0.0 to 1.0) that the row is a profit opportunity
    fn predict_proba(&self, scaled: &[f64]) -> Result<f64, InferenceError>;

    /// Hard class label
    fn predict(&self, scaled: &[f64]) -> Result<u8, InferenceError> {
        Ok(u8::from(self.predict_proba(scaled)? >= 0.5))
    }

    /// Batched probabilities; models with matrix inference override this.
    fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, InferenceError> {
        rows.iter().map(|r| self.predict_proba(r)).collect()
    }

    /// Get model name/type
    fn name(&self) -> &str;
}
