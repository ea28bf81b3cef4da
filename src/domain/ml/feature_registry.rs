use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 27;

/// Ordered list of feature names.
/// This order is the column contract with the scaler and classifier; any
/// change here is a breaking change for persisted models.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "price_change",
    "high_low_ratio",
    "close_open_ratio",
    "volume_change",
    "ma_5",
    "ma_10",
    "ma_20",
    "price_to_ma_5",
    "price_to_ma_10",
    "price_to_ma_20",
    "volatility_5",
    "volatility_10",
    "volume_ma_5",
    "volume_ratio",
    "rsi",
    "macd",
    "macd_signal",
    "macd_histogram",
    "bb_middle",
    "bb_upper",
    "bb_lower",
    "bb_position",
];

/// One engineered column. Discriminants are column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Open,
    High,
    Low,
    Close,
    Volume,
    PriceChange,
    HighLowRatio,
    CloseOpenRatio,
    VolumeChange,
    Ma5,
    Ma10,
    Ma20,
    PriceToMa5,
    PriceToMa10,
    PriceToMa20,
    Volatility5,
    Volatility10,
    VolumeMa5,
    VolumeRatio,
    Rsi,
    Macd,
    MacdSignal,
    MacdHistogram,
    BbMiddle,
    BbUpper,
    BbLower,
    BbPosition,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Open,
        Feature::High,
        Feature::Low,
        Feature::Close,
        Feature::Volume,
        Feature::PriceChange,
        Feature::HighLowRatio,
        Feature::CloseOpenRatio,
        Feature::VolumeChange,
        Feature::Ma5,
        Feature::Ma10,
        Feature::Ma20,
        Feature::PriceToMa5,
        Feature::PriceToMa10,
        Feature::PriceToMa20,
        Feature::Volatility5,
        Feature::Volatility10,
        Feature::VolumeMa5,
        Feature::VolumeRatio,
        Feature::Rsi,
        Feature::Macd,
        Feature::MacdSignal,
        Feature::MacdHistogram,
        Feature::BbMiddle,
        Feature::BbUpper,
        Feature::BbLower,
        Feature::BbPosition,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        FEATURE_NAMES[self as usize]
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Feature::ALL[i])
    }

    /// Ratio columns whose neutral value is 1.0.
    pub const NEUTRAL_RATIOS: [Feature; 4] = [
        Feature::HighLowRatio,
        Feature::CloseOpenRatio,
        Feature::VolumeRatio,
        Feature::BbPosition,
    ];

    /// Percentage-change columns whose neutral value is 0.0.
    pub const PCT_CHANGES: [Feature; 2] = [Feature::PriceChange, Feature::VolumeChange];

    pub const PRICE_TO_MA: [Feature; 3] =
        [Feature::PriceToMa5, Feature::PriceToMa10, Feature::PriceToMa20];
}

/// Fully computed feature vector in registry order. Every value is finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    values: [f64; FEATURE_COUNT],
}

impl FeatureRow {
    /// Builds a row from raw cells; `None` if any cell is missing or non-finite.
    pub fn from_cells(cells: &[Option<f64>; FEATURE_COUNT]) -> Option<Self> {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, cell) in values.iter_mut().zip(cells.iter()) {
            match cell {
                Some(v) if v.is_finite() => *slot = *v,
                _ => return None,
            }
        }
        Some(Self { values })
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Selects `columns` in the given order.
    pub fn select(&self, columns: &[Feature]) -> Vec<f64> {
        columns.iter().map(|f| self.get(*f)).collect()
    }
}

/// Resolves persisted column names into registry features.
pub fn resolve_columns<S: AsRef<str>>(names: &[S]) -> Result<Vec<Feature>, String> {
    names
        .iter()
        .map(|n| Feature::from_name(n.as_ref()).ok_or_else(|| n.as_ref().to_string()))
        .collect()
}

pub fn default_columns() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_order_matches_names() {
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
            assert_eq!(Feature::from_name(feature.name()), Some(*feature));
        }
        assert_eq!(Feature::BbPosition.name(), "bb_position");
        assert_eq!(Feature::Open.name(), "Open");
    }

    #[test]
    fn test_row_rejects_missing_and_non_finite() {
        let mut cells = [Some(1.0); FEATURE_COUNT];
        assert!(FeatureRow::from_cells(&cells).is_some());

        cells[Feature::Rsi.index()] = None;
        assert!(FeatureRow::from_cells(&cells).is_none());

        cells[Feature::Rsi.index()] = Some(f64::INFINITY);
        assert!(FeatureRow::from_cells(&cells).is_none());
    }

    #[test]
    fn test_select_respects_requested_order() {
        let mut cells = [Some(0.0); FEATURE_COUNT];
        cells[Feature::Close.index()] = Some(10.0);
        cells[Feature::Rsi.index()] = Some(70.0);
        let row = FeatureRow::from_cells(&cells).unwrap();

        assert_eq!(row.select(&[Feature::Rsi, Feature::Close]), vec![70.0, 10.0]);
    }

    #[test]
    fn test_resolve_columns_reports_unknown_name() {
        let err = resolve_columns(&["Close", "hurst"]).unwrap_err();
        assert_eq!(err, "hurst");
        assert_eq!(resolve_columns(&default_columns()).unwrap(), Feature::ALL.to_vec());
    }
}
