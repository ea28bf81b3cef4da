use crate::domain::errors::InferenceError;
use crate::domain::ports::{FeatureScaler, ProbabilityClassifier};
use serde::Serialize;
use std::fmt;
use tracing::debug;

pub const EVALUATION_BATCH_SIZE: usize = 5_000;
pub const BACKTEST_CONFIDENCE: f64 = 0.7;
pub const SWEEP_THRESHOLDS: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];

/// Scales and scores `rows` in fixed-size batches.
///
/// Returns hard predictions (p >= 0.5) and positive-class probabilities.
pub fn predict_in_batches(
    scaler: &dyn FeatureScaler,
    classifier: &dyn ProbabilityClassifier,
    rows: &[Vec<f64>],
    batch_size: usize,
) -> Result<(Vec<u8>, Vec<f64>), InferenceError> {
    let mut predictions = Vec::with_capacity(rows.len());
    let mut probabilities = Vec::with_capacity(rows.len());
    for (i, batch) in rows.chunks(batch_size.max(1)).enumerate() {
        let scaled = batch
            .iter()
            .map(|r| scaler.transform(r))
            .collect::<Result<Vec<_>, _>>()?;
        let probs = classifier.predict_proba_batch(&scaled)?;
        predictions.extend(probs.iter().map(|p| u8::from(*p >= 0.5)));
        probabilities.extend(probs);
        debug!("Scored batch {} ({} rows)", i + 1, batch.len());
    }
    Ok((predictions, probabilities))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (t, p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (0, 0) => matrix.true_negative += 1,
                (0, _) => matrix.false_positive += 1,
                (_, 0) => matrix.false_negative += 1,
                _ => matrix.true_positive += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[[{:>8} {:>8}]", self.true_negative, self.false_positive)?;
        write!(f, " [{:>8} {:>8}]]", self.false_negative, self.true_positive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn new(hits: usize, predicted: usize, support: usize) -> Self {
        let precision = ratio(hits, predicted);
        let recall = ratio(hits, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Held-out metrics of a binary classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    /// `None` when the labels contain a single class.
    pub roc_auc: Option<f64>,
    pub confusion: ConfusionMatrix,
    /// Indexed by class label.
    pub classes: [ClassMetrics; 2],
}

impl ClassificationReport {
    pub fn compute(y_true: &[u8], y_pred: &[u8], probabilities: &[f64]) -> Self {
        let confusion = ConfusionMatrix::from_labels(y_true, y_pred);
        let c = &confusion;
        let negatives = ClassMetrics::new(
            c.true_negative,
            c.true_negative + c.false_negative,
            c.true_negative + c.false_positive,
        );
        let positives = ClassMetrics::new(
            c.true_positive,
            c.true_positive + c.false_positive,
            c.true_positive + c.false_negative,
        );
        Self {
            accuracy: ratio(c.true_negative + c.true_positive, c.total()),
            roc_auc: roc_auc(y_true, probabilities),
            confusion,
            classes: [negatives, positives],
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        match self.roc_auc {
            Some(auc) => writeln!(f, "ROC AUC: {:.4}", auc)?,
            None => writeln!(f, "ROC AUC: undefined (single class)")?,
        }
        writeln!(f, "{:>10} {:>10} {:>10} {:>10} {:>10}", "class", "precision", "recall", "f1-score", "support")?;
        for (label, m) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>10} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f, "Confusion matrix:")?;
        write!(f, "{}", self.confusion)
    }
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let n = y_true.len().min(scores.len());
    let positives = y_true[..n].iter().filter(|l| **l == 1).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied scores share the mean rank.
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        for idx in &order[i..=j] {
            if y_true[*idx] == 1 {
                positive_rank_sum += mean_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Outcome of acting only on signals at or above a confidence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BacktestResult {
    pub threshold: f64,
    pub signals: usize,
    pub correct_signals: usize,
    pub precision: f64,
    /// Precision times the profit target.
    pub expected_profit_per_signal: f64,
}

pub fn backtest(y_true: &[u8], probabilities: &[f64], threshold: f64, profit_threshold: f64) -> BacktestResult {
    let (signals, correct_signals) = y_true
        .iter()
        .zip(probabilities)
        .filter(|(_, p)| **p >= threshold)
        .fold((0, 0), |(s, c), (t, _)| (s + 1, c + usize::from(*t == 1)));
    let precision = ratio(correct_signals, signals);
    BacktestResult {
        threshold,
        signals,
        correct_signals,
        precision,
        expected_profit_per_signal: precision * profit_threshold,
    }
}

/// Backtests each threshold, keeping only those that produced signals.
pub fn threshold_sweep(
    y_true: &[u8],
    probabilities: &[f64],
    thresholds: &[f64],
    profit_threshold: f64,
) -> Vec<BacktestResult> {
    thresholds
        .iter()
        .map(|t| backtest(y_true, probabilities, *t, profit_threshold))
        .filter(|r| r.signals > 0)
        .collect()
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_confusion_and_per_class_metrics() {
        let y_true = [0, 0, 1, 1, 1, 0];
        let y_pred = [0, 1, 1, 0, 1, 0];
        let report = ClassificationReport::compute(&y_true, &y_pred, &[0.1, 0.6, 0.9, 0.4, 0.8, 0.2]);

        assert_eq!(
            report.confusion,
            ConfusionMatrix {
                true_negative: 2,
                false_positive: 1,
                false_negative: 1,
                true_positive: 2,
            }
        );
        assert_relative_eq!(report.accuracy, 4.0 / 6.0);
        assert_relative_eq!(report.classes[1].precision, 2.0 / 3.0);
        assert_relative_eq!(report.classes[1].recall, 2.0 / 3.0);
        assert_eq!(report.classes[0].support, 3);
        assert_relative_eq!(report.roc_auc.unwrap(), 8.0 / 9.0);
    }

    #[test]
    fn test_roc_auc_extremes_and_ties() {
        assert_relative_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_relative_eq!(roc_auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]).unwrap(), 0.0);
        assert_relative_eq!(roc_auc(&[0, 1, 0, 1], &[0.5; 4]).unwrap(), 0.5);
        assert!(roc_auc(&[1, 1], &[0.3, 0.4]).is_none());
    }

    #[test]
    fn test_backtest_counts_signals() {
        let y_true = [1, 0, 1, 1, 0];
        let probs = [0.95, 0.75, 0.72, 0.4, 0.1];
        let result = backtest(&y_true, &probs, 0.7, 0.01);
        assert_eq!(result.signals, 3);
        assert_eq!(result.correct_signals, 2);
        assert_relative_eq!(result.expected_profit_per_signal, 0.01 * 2.0 / 3.0);

        let sweep = threshold_sweep(&y_true, &probs, &SWEEP_THRESHOLDS, 0.01);
        // 0.8 and 0.9 keep only the 0.95 signal; nothing is dropped.
        assert_eq!(sweep.len(), 5);
        assert_eq!(sweep[4].signals, 1);
        assert_relative_eq!(sweep[4].precision, 1.0);
    }

    #[test]
    fn test_empty_backtest_has_zero_precision() {
        let result = backtest(&[1, 0], &[0.1, 0.2], 0.7, 0.01);
        assert_eq!(result.signals, 0);
        assert_eq!(result.precision, 0.0);
        assert!(threshold_sweep(&[1, 0], &[0.1, 0.2], &SWEEP_THRESHOLDS, 0.01).is_empty());
    }
}
