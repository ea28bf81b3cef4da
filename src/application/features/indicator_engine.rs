use super::feature_table::{FeatureTable, RawRow};
use super::rolling::{AdjustedEwm, RollingWindow};
use crate::domain::market::candle::{Candle, sort_by_open_time};
use crate::domain::ml::feature_registry::{FEATURE_COUNT, Feature};

pub const MA_PERIODS: [usize; 3] = [5, 10, 20];
pub const VOLATILITY_PERIODS: [usize; 2] = [5, 10];
pub const VOLUME_MA_PERIOD: usize = 5;
pub const RSI_PERIOD: usize = 10;
pub const MACD_FAST_SPAN: usize = 8;
pub const MACD_SLOW_SPAN: usize = 18;
pub const MACD_SIGNAL_SPAN: usize = 6;
pub const BB_PERIOD: usize = 15;
pub const BB_STD_MULTIPLIER: f64 = 2.0;

/// Longest trailing window used by any column.
pub const MAX_LOOKBACK: usize = 20;

/// Streaming indicator engine.
///
/// Every column is strictly causal: the row emitted for a candle depends only
/// on that candle and the candles pushed before it. Feeding a sequence in
/// pieces through one engine yields exactly the rows of a single pass.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    prev_close: Option<f64>,
    prev_volume: Option<f64>,
    ma: [RollingWindow; 3],
    volatility: [RollingWindow; 2],
    volume_ma: RollingWindow,
    gains: RollingWindow,
    losses: RollingWindow,
    ema_fast: AdjustedEwm,
    ema_slow: AdjustedEwm,
    macd_signal: AdjustedEwm,
    bb: RollingWindow,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self {
            prev_close: None,
            prev_volume: None,
            ma: MA_PERIODS.map(RollingWindow::new),
            volatility: VOLATILITY_PERIODS.map(RollingWindow::new),
            volume_ma: RollingWindow::new(VOLUME_MA_PERIOD),
            gains: RollingWindow::new(RSI_PERIOD),
            losses: RollingWindow::new(RSI_PERIOD),
            ema_fast: AdjustedEwm::with_span(MACD_FAST_SPAN),
            ema_slow: AdjustedEwm::with_span(MACD_SLOW_SPAN),
            macd_signal: AdjustedEwm::with_span(MACD_SIGNAL_SPAN),
            bb: RollingWindow::new(BB_PERIOD),
        }
    }

    /// Runs a fresh engine over `candles` after sorting them by open time.
    pub fn compute(candles: &[Candle]) -> FeatureTable {
        let mut sorted = candles.to_vec();
        sort_by_open_time(&mut sorted);
        let mut engine = Self::new();
        let mut table = FeatureTable::with_capacity(sorted.len());
        engine.extend(&sorted, &mut table);
        table
    }

    /// Appends one row per candle, in the given order, to `table`.
    pub fn extend(&mut self, candles: &[Candle], table: &mut FeatureTable) {
        for candle in candles {
            let row = self.next(candle);
            table.push_row(candle.open_time, row);
        }
    }

    pub fn next(&mut self, candle: &Candle) -> RawRow {
        let mut row: RawRow = [None; FEATURE_COUNT];
        let close = candle.close;
        let volume = candle.volume;

        let mut set = |feature: Feature, value: Option<f64>| row[feature.index()] = value;

        set(Feature::Open, Some(candle.open));
        set(Feature::High, Some(candle.high));
        set(Feature::Low, Some(candle.low));
        set(Feature::Close, Some(close));
        set(Feature::Volume, Some(volume));

        set(Feature::PriceChange, self.prev_close.map(|p| close / p - 1.0));
        set(Feature::HighLowRatio, Some(candle.high / candle.low));
        set(Feature::CloseOpenRatio, Some(close / candle.open));
        set(Feature::VolumeChange, self.prev_volume.map(|p| volume / p - 1.0));

        // Moving averages and price-to-MA ratios
        let ma_features = [
            (Feature::Ma5, Feature::PriceToMa5),
            (Feature::Ma10, Feature::PriceToMa10),
            (Feature::Ma20, Feature::PriceToMa20),
        ];
        for (window, (ma_feature, ratio_feature)) in self.ma.iter_mut().zip(ma_features) {
            window.push(close);
            let ma = window.mean();
            set(ma_feature, ma);
            set(ratio_feature, ma.map(|m| close / m));
        }

        for (window, feature) in self
            .volatility
            .iter_mut()
            .zip([Feature::Volatility5, Feature::Volatility10])
        {
            window.push(close);
            set(feature, window.std_dev());
        }

        self.volume_ma.push(volume);
        let volume_ma = self.volume_ma.mean();
        set(Feature::VolumeMa5, volume_ma);
        set(Feature::VolumeRatio, volume_ma.map(|m| volume / m));

        // RSI over trailing mean gain / loss. The first row has no delta and
        // counts as zero movement in both windows.
        let delta = self.prev_close.map(|p| close - p);
        let gain = delta.filter(|d| *d > 0.0).unwrap_or(0.0);
        let loss = delta.filter(|d| *d < 0.0).map(|d| -d).unwrap_or(0.0);
        self.gains.push(gain);
        self.losses.push(loss);
        let rsi = match (self.gains.mean(), self.losses.mean()) {
            (Some(avg_gain), Some(avg_loss)) => {
                let rs = avg_gain / avg_loss;
                Some(100.0 - 100.0 / (1.0 + rs))
            }
            _ => None,
        };
        set(Feature::Rsi, rsi);

        // MACD family
        let fast = self.ema_fast.next(close);
        let slow = self.ema_slow.next(close);
        let macd = fast.zip(slow).map(|(f, s)| f - s);
        let signal = self.macd_signal.next(macd.unwrap_or(f64::NAN));
        set(Feature::Macd, macd);
        set(Feature::MacdSignal, signal);
        set(Feature::MacdHistogram, macd.zip(signal).map(|(m, s)| m - s));

        // Bollinger bands
        self.bb.push(close);
        let middle = self.bb.mean();
        let std = self.bb.std_dev();
        let upper = middle.zip(std).map(|(m, s)| m + s * BB_STD_MULTIPLIER);
        let lower = middle.zip(std).map(|(m, s)| m - s * BB_STD_MULTIPLIER);
        set(Feature::BbMiddle, middle);
        set(Feature::BbUpper, upper);
        set(Feature::BbLower, lower);
        set(
            Feature::BbPosition,
            upper.zip(lower).map(|(u, l)| (close - l) / (u - l)),
        );

        self.prev_close = Some(close);
        self.prev_volume = Some(volume);
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle::new(i as i64 * 60_000, close - 0.5, close + 1.0, close - 1.0, close, 10.0 + i as f64)
            })
            .collect()
    }

    #[test]
    fn test_leading_rows_are_missing_until_windows_fill() {
        let table = IndicatorEngine::compute(&ramp(25));

        assert_eq!(table.cell(0, Feature::PriceChange), None);
        assert_eq!(table.cell(3, Feature::Ma5), None);
        assert!(table.cell(4, Feature::Ma5).is_some());
        assert_eq!(table.cell(18, Feature::Ma20), None);
        assert!(table.cell(19, Feature::Ma20).is_some());
        assert_eq!(table.cell(13, Feature::BbMiddle), None);
        assert!(table.cell(14, Feature::BbMiddle).is_some());
        assert_eq!(table.cell(8, Feature::Rsi), None);
        assert!(table.cell(9, Feature::Rsi).is_some());
        // EWM columns are defined from the first row
        assert_eq!(table.cell(0, Feature::Macd), Some(0.0));
    }

    #[test]
    fn test_simple_columns() {
        let table = IndicatorEngine::compute(&ramp(25));

        assert_relative_eq!(table.cell(1, Feature::PriceChange).unwrap(), 101.0 / 100.0 - 1.0);
        assert_relative_eq!(table.cell(1, Feature::HighLowRatio).unwrap(), 102.0 / 100.0);
        assert_relative_eq!(table.cell(1, Feature::CloseOpenRatio).unwrap(), 101.0 / 100.5);
        assert_relative_eq!(table.cell(4, Feature::Ma5).unwrap(), 102.0);
        assert_relative_eq!(table.cell(4, Feature::PriceToMa5).unwrap(), 104.0 / 102.0);
        assert_relative_eq!(table.cell(4, Feature::VolumeMa5).unwrap(), 12.0);
        assert_relative_eq!(
            table.cell(4, Feature::Volatility5).unwrap(),
            2.5f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rsi_saturates_on_monotonic_rise() {
        let table = IndicatorEngine::compute(&ramp(25));
        // No losses at all: rs is infinite and RSI pins at 100.
        assert_eq!(table.cell(12, Feature::Rsi), Some(100.0));
    }

    #[test]
    fn test_rsi_balanced_moves() {
        let closes = [100.0, 101.0, 100.0, 101.0, 100.0, 101.0, 100.0, 101.0, 100.0, 101.0, 100.0];
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| Candle::flat(i as i64, *c, 1.0))
            .collect();
        let table = IndicatorEngine::compute(&candles);
        // Window at row 10 holds five +1 and five -1 deltas.
        assert_relative_eq!(table.cell(10, Feature::Rsi).unwrap(), 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bollinger_band_geometry() {
        let table = IndicatorEngine::compute(&ramp(25));
        let mid = table.cell(20, Feature::BbMiddle).unwrap();
        let upper = table.cell(20, Feature::BbUpper).unwrap();
        let lower = table.cell(20, Feature::BbLower).unwrap();
        assert_relative_eq!(upper - mid, mid - lower, epsilon = 1e-9);
        let pos = table.cell(20, Feature::BbPosition).unwrap();
        assert!(pos > 0.5 && pos < 1.0);
    }

    #[test]
    fn test_input_is_sorted_by_open_time() {
        let mut candles = ramp(25);
        candles.reverse();
        let table = IndicatorEngine::compute(&candles);
        assert!(table.open_time().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table.cell(24, Feature::Close), Some(124.0));
    }

    #[test]
    fn test_split_feed_equals_single_pass() {
        let candles = ramp(60);
        let whole = IndicatorEngine::compute(&candles);

        let mut engine = IndicatorEngine::new();
        let mut pieces = FeatureTable::new();
        for part in candles.chunks(7) {
            engine.extend(part, &mut pieces);
        }
        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_zero_volume_yields_non_finite_change() {
        let candles = vec![
            Candle::new(0, 1.0, 1.0, 1.0, 1.0, 0.0),
            Candle::new(1, 1.0, 1.0, 1.0, 1.0, 5.0),
        ];
        let table = IndicatorEngine::compute(&candles);
        assert!(table.cell(1, Feature::VolumeChange).unwrap().is_infinite());
    }
}
