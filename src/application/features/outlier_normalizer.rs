use super::feature_table::FeatureTable;
use crate::domain::ml::feature_registry::{FEATURE_COUNT, Feature};
use serde::{Deserialize, Serialize};

pub const LOWER_QUANTILE: f64 = 0.001;
pub const UPPER_QUANTILE: f64 = 0.999;

pub const NEUTRAL_RATIO: f64 = 1.0;
pub const NEUTRAL_CHANGE: f64 = 0.0;
pub const NEUTRAL_RSI: f64 = 50.0;

/// Per-column clip range. `None` for a column that had no finite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipBounds {
    bounds: Vec<Option<(f64, f64)>>,
}

impl ClipBounds {
    pub fn get(&self, feature: Feature) -> Option<(f64, f64)> {
        self.bounds.get(feature.index()).copied().flatten()
    }

    /// Number of columns the bounds were fit on.
    pub fn column_count(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_complete(&self) -> bool {
        self.bounds.len() == FEATURE_COUNT
    }

    /// Widens each filled column's range to contain its neutral value, so a
    /// table normalized under these bounds is a fixed point of normalization.
    pub fn covering_neutral_fills(mut self) -> Self {
        let fills = Feature::NEUTRAL_RATIOS
            .into_iter()
            .chain(Feature::PRICE_TO_MA)
            .map(|f| (f, NEUTRAL_RATIO))
            .chain(Feature::PCT_CHANGES.into_iter().map(|f| (f, NEUTRAL_CHANGE)))
            .chain(std::iter::once((Feature::Rsi, NEUTRAL_RSI)));
        for (feature, neutral) in fills {
            if let Some(Some((low, high))) = self.bounds.get_mut(feature.index()) {
                *low = low.min(neutral);
                *high = high.max(neutral);
            }
        }
        self
    }
}

/// How clip bounds are obtained for a normalization call.
#[derive(Debug, Clone, Copy)]
pub enum ClipPolicy<'a> {
    /// Percentiles of the rows currently in scope.
    PerCall,
    /// Bounds fixed elsewhere, typically at training time.
    Frozen(&'a ClipBounds),
}

/// Cleans engineered columns so every emitted feature is finite.
pub struct OutlierNormalizer;

impl OutlierNormalizer {
    /// Replaces non-finite values, clips to the table's own percentiles and
    /// fills neutral values. Returns the applied bounds widened to cover the
    /// fills, i.e. bounds under which the result is stable.
    pub fn normalize(table: &mut FeatureTable) -> ClipBounds {
        Self::replace_non_finite(table);
        let bounds = Self::fit(table);
        Self::clip(table, &bounds);
        Self::fill_neutral(table);
        bounds.covering_neutral_fills()
    }

    /// Same steps with externally supplied bounds.
    pub fn normalize_with(table: &mut FeatureTable, bounds: &ClipBounds) {
        Self::replace_non_finite(table);
        Self::clip(table, bounds);
        Self::fill_neutral(table);
    }

    pub fn apply(table: &mut FeatureTable, policy: ClipPolicy<'_>) {
        match policy {
            ClipPolicy::PerCall => {
                Self::normalize(table);
            }
            ClipPolicy::Frozen(bounds) => Self::normalize_with(table, bounds),
        }
    }

    /// Percentile bounds of every column's finite values.
    pub fn fit(table: &FeatureTable) -> ClipBounds {
        let bounds = Feature::ALL
            .iter()
            .map(|f| {
                let mut values: Vec<f64> = table
                    .column(*f)
                    .iter()
                    .flatten()
                    .copied()
                    .filter(|v| v.is_finite())
                    .collect();
                if values.is_empty() {
                    return None;
                }
                values.sort_by(f64::total_cmp);
                Some((
                    quantile_sorted(&values, LOWER_QUANTILE),
                    quantile_sorted(&values, UPPER_QUANTILE),
                ))
            })
            .collect();
        ClipBounds { bounds }
    }

    fn replace_non_finite(table: &mut FeatureTable) {
        for (_, column) in table.columns_mut() {
            for cell in column.iter_mut() {
                if cell.is_some_and(|v| !v.is_finite()) {
                    *cell = None;
                }
            }
        }
    }

    fn clip(table: &mut FeatureTable, bounds: &ClipBounds) {
        for (feature, column) in table.columns_mut() {
            let Some((low, high)) = bounds.get(feature) else {
                continue;
            };
            for value in column.iter_mut().flatten() {
                *value = clip(*value, low, high);
            }
        }
    }

    fn fill_neutral(table: &mut FeatureTable) {
        for feature in Feature::NEUTRAL_RATIOS.into_iter().chain(Feature::PRICE_TO_MA) {
            fill_missing(table.column_mut(feature), NEUTRAL_RATIO);
        }
        for feature in Feature::PCT_CHANGES {
            fill_missing(table.column_mut(feature), NEUTRAL_CHANGE);
        }

        let rsi = table.column_mut(Feature::Rsi);
        fill_missing(rsi, NEUTRAL_RSI);
        for value in rsi.iter_mut().flatten() {
            *value = clip(*value, 0.0, 100.0);
        }
    }
}

fn fill_missing(column: &mut [Option<f64>], neutral: f64) {
    for cell in column.iter_mut() {
        cell.get_or_insert(neutral);
    }
}

fn clip(value: f64, low: f64, high: f64) -> f64 {
    if value < low {
        low
    } else if value > high {
        high
    } else {
        value
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
///
/// Interpolates from whichever neighbour is closer, which keeps the result
/// monotonic in `q` and bit-stable with common array libraries.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let t = pos - lo as f64;
    let (a, b) = (sorted[lo], sorted[hi]);
    let diff = b - a;
    if t >= 0.5 { b - diff * (1.0 - t) } else { a + diff * t }
}
