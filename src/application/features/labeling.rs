use super::feature_table::FeatureTable;
use crate::domain::ml::feature_registry::Feature;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROFIT_THRESHOLD: f64 = 0.01;
pub const DEFAULT_LOOKFORWARD_PERIODS: usize = 30;

/// Forward-looking "profit opportunity" labels.
///
/// Row `t` is labelled 1 when some high in the next `lookforward_periods`
/// rows reaches `close[t] * (1 + profit_threshold)`. Rows without a full
/// horizon ahead of them are labelled 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelGenerator {
    pub profit_threshold: f64,
    pub lookforward_periods: usize,
}

impl Default for LabelGenerator {
    fn default() -> Self {
        Self {
            profit_threshold: DEFAULT_PROFIT_THRESHOLD,
            lookforward_periods: DEFAULT_LOOKFORWARD_PERIODS,
        }
    }
}

impl LabelGenerator {
    pub fn new(profit_threshold: f64, lookforward_periods: usize) -> Self {
        Self {
            profit_threshold,
            lookforward_periods,
        }
    }

    /// Horizon used for a chunk of `chunk_len` rows: short chunks scan at
    /// most a tenth of their length ahead.
    pub fn horizon_for_chunk(&self, chunk_len: usize) -> usize {
        self.lookforward_periods.min(chunk_len / 10)
    }

    /// Labels with the configured horizon.
    pub fn label(&self, close: &[f64], high: &[f64]) -> Vec<u8> {
        self.label_with_horizon(close, high, self.lookforward_periods)
    }

    pub fn label_with_horizon(&self, close: &[f64], high: &[f64], horizon: usize) -> Vec<u8> {
        let n = close.len().min(high.len());
        let mut labels = vec![0u8; n];
        if horizon == 0 {
            return labels;
        }

        for (t, label) in labels.iter_mut().enumerate().take(n.saturating_sub(horizon)) {
            let current = close[t];
            let future = &high[t + 1..=t + horizon];
            // A missing future high makes the outcome unknown; leave it at 0.
            if future.iter().any(|h| h.is_nan()) {
                continue;
            }
            let max_future = future.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let profit_ratio = (max_future - current) / current;
            if profit_ratio >= self.profit_threshold {
                *label = 1;
            }
        }
        labels
    }

    /// Labels a feature table from its (normalized) High and Close columns.
    pub fn label_table(&self, table: &FeatureTable, horizon: usize) -> Vec<u8> {
        let close = table.values(Feature::Close);
        let high = table.values(Feature::High);
        self.label_with_horizon(&close, &high, horizon)
    }
}
