use crate::domain::errors::InferenceError;
use crate::domain::ports::ProbabilityClassifier;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::str::FromStr;
use tracing::info;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Which model family a training run fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    RandomForest,
    SgdLogistic,
}

impl FromStr for ClassifierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random_forest" | "rf" => Ok(ClassifierKind::RandomForest),
            "sgd_logistic" | "sgd" => Ok(ClassifierKind::SgdLogistic),
            _ => anyhow::bail!(
                "Invalid CLASSIFIER: {}. Must be 'random_forest' or 'sgd_logistic'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 15,
            min_samples_split: 10,
            min_samples_leaf: 5,
        }
    }
}

/// Features considered per split: the floor of the square root of the
/// feature count, at least one.
pub fn sqrt_max_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}

/// Random forest fit on 0/1 targets.
///
/// Each tree predicts the positive-class frequency of its leaf, so the forest
/// average is the vote share of the positive class.
#[derive(Serialize, Deserialize)]
pub struct ForestClassifier {
    model: Forest,
}

impl ForestClassifier {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Result<Self> {
        let matrix = DenseMatrix::from_2d_vec(&x.to_vec()).map_err(|e| anyhow!("Matrix error: {}", e))?;
        let targets: Vec<f64> = y.iter().map(|v| f64::from(*v)).collect();
        let max_features = sqrt_max_features(x.first().map_or(0, Vec::len));

        info!(
            "Training Random Forest (Trees: {}, Depth: {}, MinSplit: {}, MinLeaf: {}, MaxFeatures: {}) on {} samples...",
            params.n_trees,
            params.max_depth,
            params.min_samples_split,
            params.min_samples_leaf,
            max_features,
            x.len()
        );
        let forest_params = RandomForestRegressorParameters::default()
            .with_n_trees(params.n_trees)
            .with_max_depth(params.max_depth)
            .with_min_samples_split(params.min_samples_split)
            .with_min_samples_leaf(params.min_samples_leaf)
            .with_m(max_features);
        let model = RandomForestRegressor::fit(&matrix, &targets, forest_params)
            .map_err(|e| anyhow!("Training error: {}", e))?;
        Ok(Self { model })
    }
}

impl ProbabilityClassifier for ForestClassifier {
    fn predict_proba(&self, scaled: &[f64]) -> Result<f64, InferenceError> {
        self.predict_proba_batch(&[scaled.to_vec()])?
            .first()
            .copied()
            .ok_or_else(|| InferenceError::Model {
                reason: "No prediction returned".to_string(),
            })
    }

    fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, InferenceError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let matrix = DenseMatrix::from_2d_vec(&rows.to_vec()).map_err(|e| InferenceError::Model {
            reason: format!("Matrix creation failed: {}", e),
        })?;
        let predictions: Vec<f64> = self.model.predict(&matrix).map_err(|e| InferenceError::Model {
            reason: format!("Prediction failed: {}", e),
        })?;
        Ok(predictions.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }

    fn name(&self) -> &str {
        "SmartCore Random Forest"
    }
}

/// Logistic regression trained incrementally by stochastic gradient descent.
///
/// Suited to datasets that are fed in mini-batches rather than held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdLogistic {
    weights: Vec<f64>,
    bias: f64,
    alpha: f64,
    eta0: f64,
    steps: u64,
}

impl SgdLogistic {
    pub fn new(n_features: usize) -> Self {
        Self {
            weights: vec![0.0; n_features],
            bias: 0.0,
            alpha: 1e-4,
            eta0: 0.01,
            steps: 0,
        }
    }

    /// One pass over a mini-batch with per-class sample weights.
    pub fn partial_fit(&mut self, x: &[Vec<f64>], y: &[u8], class_weights: [f64; 2]) -> Result<()> {
        for (row, label) in x.iter().zip(y) {
            if row.len() != self.weights.len() {
                return Err(anyhow!(
                    "sample has {} features, model expects {}",
                    row.len(),
                    self.weights.len()
                ));
            }
            self.steps += 1;
            let eta = self.eta0 / (1.0 + self.alpha * self.eta0 * self.steps as f64);
            let target = f64::from(*label);
            let gradient = (sigmoid(self.decision(row)) - target) * class_weights[usize::from(*label)];

            let shrink = 1.0 - eta * self.alpha;
            for (w, xi) in self.weights.iter_mut().zip(row) {
                *w = *w * shrink - eta * gradient * xi;
            }
            self.bias -= eta * gradient;
        }
        Ok(())
    }

    fn decision(&self, row: &[f64]) -> f64 {
        self.weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + self.bias
    }
}

impl ProbabilityClassifier for SgdLogistic {
    fn predict_proba(&self, scaled: &[f64]) -> Result<f64, InferenceError> {
        if scaled.len() != self.weights.len() {
            return Err(InferenceError::DimensionMismatch {
                expected: self.weights.len(),
                actual: scaled.len(),
            });
        }
        Ok(sigmoid(self.decision(scaled)))
    }

    fn name(&self) -> &str {
        "SGD Logistic Regression"
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Weights inversely proportional to class frequency: `n / (2 * count)`.
///
/// With a class absent there is nothing to balance and both weights are 1.
pub fn balanced_class_weights(y: &[u8]) -> [f64; 2] {
    let positives = y.iter().filter(|l| **l == 1).count();
    let counts = [y.len() - positives, positives];
    if counts.contains(&0) {
        return [1.0, 1.0];
    }
    counts.map(|c| y.len() as f64 / (2.0 * c as f64))
}

/// The persisted classifier, whichever family was trained.
#[derive(Serialize, Deserialize)]
pub enum TrainedClassifier {
    RandomForest(ForestClassifier),
    SgdLogistic(SgdLogistic),
}

impl TrainedClassifier {
    fn inner(&self) -> &dyn ProbabilityClassifier {
        match self {
            TrainedClassifier::RandomForest(m) => m,
            TrainedClassifier::SgdLogistic(m) => m,
        }
    }
}

impl ProbabilityClassifier for TrainedClassifier {
    fn predict_proba(&self, scaled: &[f64]) -> Result<f64, InferenceError> {
        self.inner().predict_proba(scaled)
    }

    fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, InferenceError> {
        self.inner().predict_proba_batch(rows)
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let positive = i % 2 == 0;
            let offset = if positive { 2.0 } else { -2.0 };
            x.push(vec![offset + (i % 5) as f64 * 0.1, (i % 3) as f64 * 0.1]);
            y.push(u8::from(positive));
        }
        (x, y)
    }

    #[test]
    fn test_balanced_weights() {
        let weights = balanced_class_weights(&[0, 0, 0, 1]);
        assert_eq!(weights, [4.0 / 6.0, 2.0]);
        assert_eq!(balanced_class_weights(&[0, 0]), [1.0, 1.0]);
        assert_eq!(balanced_class_weights(&[1, 1, 1]), [1.0, 1.0]);
        assert_eq!(balanced_class_weights(&[]), [1.0, 1.0]);
    }

    #[test]
    fn test_sgd_learns_separable_data() {
        let (x, y) = separable(200);
        let mut model = SgdLogistic::new(2);
        for _ in 0..20 {
            model.partial_fit(&x, &y, balanced_class_weights(&y)).unwrap();
        }
        assert!(model.predict_proba(&[2.0, 0.0]).unwrap() > 0.5);
        assert!(model.predict_proba(&[-2.0, 0.0]).unwrap() < 0.5);
        assert_eq!(model.predict(&[2.5, 0.1]).unwrap(), 1);
    }

    #[test]
    fn test_sgd_rejects_wrong_width() {
        let mut model = SgdLogistic::new(3);
        assert!(model.partial_fit(&[vec![1.0]], &[1], [1.0, 1.0]).is_err());
        assert!(model.predict_proba(&[1.0]).is_err());
    }

    #[test]
    fn test_forest_probabilities_are_bounded() {
        let (x, y) = separable(60);
        let params = ForestParams {
            n_trees: 5,
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 1,
        };
        let forest = ForestClassifier::fit(&x, &y, &params).unwrap();
        let probs = forest.predict_proba_batch(&x).unwrap();
        assert_eq!(probs.len(), x.len());
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(forest.predict_proba(&[2.0, 0.0]).unwrap() > 0.5);
    }

    #[test]
    fn test_forest_defaults_and_feature_sampling() {
        let params = ForestParams::default();
        assert_eq!(params.min_samples_leaf, 5);
        assert_eq!(params.min_samples_split, 10);
        assert_eq!(sqrt_max_features(27), 5);
        assert_eq!(sqrt_max_features(2), 1);
        assert_eq!(sqrt_max_features(0), 1);
    }

    #[test]
    fn test_classifier_kind_parsing() {
        assert_eq!("rf".parse::<ClassifierKind>().unwrap(), ClassifierKind::RandomForest);
        assert_eq!(
            "SGD_LOGISTIC".parse::<ClassifierKind>().unwrap(),
            ClassifierKind::SgdLogistic
        );
        assert!("xgboost".parse::<ClassifierKind>().is_err());
    }
}
