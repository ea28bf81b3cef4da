//! Feature engineering shared by training, evaluation and live inference.

pub mod chunked_builder;
pub mod feature_table;
pub mod indicator_engine;
pub mod labeling;
pub mod outlier_normalizer;
pub mod rolling;

use crate::domain::market::candle::Candle;
use feature_table::FeatureTable;
use indicator_engine::IndicatorEngine;
use outlier_normalizer::{ClipPolicy, OutlierNormalizer};

/// Indicator engine followed by the outlier normalizer over `candles`.
///
/// This is the single entry point every front end uses to turn raw candles
/// into model features.
pub fn engineer_features(candles: &[Candle], policy: ClipPolicy<'_>) -> FeatureTable {
    let mut table = IndicatorEngine::compute(candles);
    OutlierNormalizer::apply(&mut table, policy);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::{Feature, FEATURE_COUNT};
    use indicator_engine::MAX_LOOKBACK;

    #[test]
    fn test_flat_series_neutral_values() {
        let candles: Vec<Candle> = (0..25).map(|i| Candle::flat(i * 60_000, 100.0, 5.0)).collect();
        let table = engineer_features(&candles, ClipPolicy::PerCall);
        let last = table.len() - 1;

        assert_eq!(table.cell(last, Feature::Rsi), Some(50.0));
        assert_eq!(table.cell(last, Feature::BbPosition), Some(1.0));
        for feature in Feature::PRICE_TO_MA {
            assert_eq!(table.cell(last, feature), Some(1.0));
        }
        assert_eq!(table.cell(last, Feature::Volatility10), Some(0.0));
        assert_eq!(table.cell(last, Feature::Macd), Some(0.0));
    }

    #[test]
    fn test_mature_rows_are_complete() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let close = 50.0 + ((i * 13) % 7) as f64;
                Candle::new(i * 60_000, close, close + 1.0, close - 1.0, close, (i % 3) as f64)
            })
            .collect();
        let table = engineer_features(&candles, ClipPolicy::PerCall);

        for row in (MAX_LOOKBACK - 1)..table.len() {
            assert_eq!(table.available_count(row, &Feature::ALL), FEATURE_COUNT, "row {}", row);
        }
    }
}
