use super::classifier::{
    ClassifierKind, ForestClassifier, ForestParams, SgdLogistic, TrainedClassifier, balanced_class_weights,
};
use super::evaluation::{ClassificationReport, EVALUATION_BATCH_SIZE, predict_in_batches};
use super::inference::ModelBundle;
use super::scaler::StandardScaler;
use crate::application::features::chunked_builder::FeatureRecord;
use crate::application::features::feature_table::FeatureTable;
use crate::application::features::outlier_normalizer::{ClipBounds, OutlierNormalizer};
use crate::domain::errors::PipelineError;
use crate::domain::ml::feature_registry::Feature;
use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

pub const SGD_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SPLIT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy)]
pub struct TrainingSettings {
    pub classifier: ClassifierKind,
    pub forest: ForestParams,
    pub test_fraction: f64,
    pub split_seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            classifier: ClassifierKind::RandomForest,
            forest: ForestParams::default(),
            test_fraction: DEFAULT_TEST_FRACTION,
            split_seed: DEFAULT_SPLIT_SEED,
        }
    }
}

/// Labeled rows restricted to the model's feature columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    pub open_time: Vec<i64>,
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u8>,
}

impl LabeledDataset {
    pub fn from_records(records: &[FeatureRecord], columns: &[Feature]) -> Result<Self, PipelineError> {
        let mut dataset = Self::default();
        for record in records {
            let label = record.label.ok_or_else(|| PipelineError::InvalidConfig {
                reason: format!("row at {} has no label", record.open_time),
            })?;
            dataset.open_time.push(record.open_time);
            dataset.x.push(record.features.select(columns));
            dataset.y.push(label);
        }
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.y.iter().filter(|l| **l == 1).count()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.positives() as f64 / self.len() as f64
        }
    }

    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            open_time: indices.iter().map(|i| self.open_time[*i]).collect(),
            x: indices.iter().map(|i| self.x[*i].clone()).collect(),
            y: indices.iter().map(|i| self.y[*i]).collect(),
        }
    }
}

/// Train/test indices with each class split in the same proportion.
///
/// Both index lists come back in ascending (time) order.
pub fn stratified_split(y: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();
    for class in [0u8, 1] {
        let mut members: Vec<usize> = (0..y.len()).filter(|i| y[*i] == class).collect();
        members.shuffle(&mut rng);
        let n_test = (members.len() as f64 * test_fraction).round() as usize;
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Clip bounds over an assembled table of emitted rows.
pub fn fit_clip_bounds(records: &[FeatureRecord]) -> ClipBounds {
    let mut table = FeatureTable::with_capacity(records.len());
    for record in records {
        table.push_row(record.open_time, record.features.values().map(Some));
    }
    OutlierNormalizer::fit(&table).covering_neutral_fills()
}

/// Fitted artifacts of one training run.
pub struct TrainedModel {
    pub scaler: StandardScaler,
    pub classifier: TrainedClassifier,
    pub feature_columns: Vec<Feature>,
    pub clip_bounds: Option<ClipBounds>,
}

impl TrainedModel {
    pub fn into_bundle(self) -> ModelBundle {
        ModelBundle {
            scaler: Box::new(self.scaler),
            classifier: Box::new(self.classifier),
            feature_columns: self.feature_columns,
            clip_bounds: self.clip_bounds,
        }
    }
}

pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub test: LabeledDataset,
    pub report: ClassificationReport,
}

pub struct Trainer {
    settings: TrainingSettings,
}

impl Trainer {
    pub fn new(settings: TrainingSettings) -> Result<Self> {
        if !(settings.test_fraction > 0.0 && settings.test_fraction < 1.0) {
            bail!("test fraction must be in (0, 1), got {}", settings.test_fraction);
        }
        Ok(Self { settings })
    }

    /// Splits, fits scaler and classifier on the train part and scores the
    /// held-out part.
    pub fn train(
        &self,
        dataset: &LabeledDataset,
        feature_columns: Vec<Feature>,
        clip_bounds: Option<ClipBounds>,
    ) -> Result<TrainingOutcome> {
        let (train_idx, test_idx) = stratified_split(&dataset.y, self.settings.test_fraction, self.settings.split_seed);
        if train_idx.is_empty() || test_idx.is_empty() {
            bail!("dataset of {} rows is too small to split", dataset.len());
        }
        let train = dataset.subset(&train_idx);
        let test = dataset.subset(&test_idx);
        info!("Train set: {} rows, test set: {} rows", train.len(), test.len());

        info!("Scaling features...");
        let scaler = StandardScaler::fit(&train.x).context("Cannot fit scaler on an empty train set")?;
        let train_scaled = scaler.transform_batch(&train.x)?;

        let classifier = match self.settings.classifier {
            ClassifierKind::RandomForest => {
                TrainedClassifier::RandomForest(ForestClassifier::fit(&train_scaled, &train.y, &self.settings.forest)?)
            }
            ClassifierKind::SgdLogistic => TrainedClassifier::SgdLogistic(fit_sgd(&train_scaled, &train.y)?),
        };

        info!("Evaluating model...");
        let (predictions, probabilities) = predict_in_batches(&scaler, &classifier, &test.x, EVALUATION_BATCH_SIZE)?;
        let report = ClassificationReport::compute(&test.y, &predictions, &probabilities);
        info!("Test accuracy: {:.4}", report.accuracy);

        Ok(TrainingOutcome {
            model: TrainedModel {
                scaler,
                classifier,
                feature_columns,
                clip_bounds,
            },
            test,
            report,
        })
    }
}

fn fit_sgd(x: &[Vec<f64>], y: &[u8]) -> Result<SgdLogistic> {
    let width = x.first().map_or(0, Vec::len);
    let mut model = SgdLogistic::new(width);
    let class_weights = balanced_class_weights(y);
    let n_batches = x.len().div_ceil(SGD_BATCH_SIZE);
    info!("Training incrementally with {} batches...", n_batches);

    for (i, (xb, yb)) in x.chunks(SGD_BATCH_SIZE).zip(y.chunks(SGD_BATCH_SIZE)).enumerate() {
        model.partial_fit(xb, yb, class_weights)?;
        if (i + 1) % 10 == 0 {
            info!("Incremental training progress: {:.1}%", (i + 1) as f64 / n_batches as f64 * 100.0);
        }
    }
    Ok(model)
}
