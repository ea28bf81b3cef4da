use serde::{Deserialize, Serialize};
use std::fmt;

pub const BUY_PROBABILITY: f64 = 0.7;
pub const SELL_PROBABILITY: f64 = 0.3;
pub const HIGH_CONFIDENCE_UPPER: f64 = 0.8;
pub const HIGH_CONFIDENCE_LOWER: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Sell,
    Wait,
}

impl Recommendation {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= BUY_PROBABILITY {
            Recommendation::Buy
        } else if probability <= SELL_PROBABILITY {
            Recommendation::Sell
        } else {
            Recommendation::Wait
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Buy => write!(f, "BUY"),
            Recommendation::Sell => write!(f, "SELL"),
            Recommendation::Wait => write!(f, "WAIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= HIGH_CONFIDENCE_UPPER || probability <= HIGH_CONFIDENCE_LOWER {
            ConfidenceLevel::High
        } else if probability >= BUY_PROBABILITY || probability <= SELL_PROBABILITY {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSummary {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub bb_position: Option<f64>,
    pub volatility: Option<f64>,
}

/// Response payload of one live prediction.
///
/// The four decision fields are always present; the market context fields
/// only on success, `error` only on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub prediction: u8,
    pub probability: f64,
    pub confidence: ConfidenceLevel,
    pub recommendation: Recommendation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features_available: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change_24h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_summary: Option<TechnicalSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_points: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl PredictionResponse {
    /// Universal WAIT fallback carrying an error message.
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            prediction: 0,
            probability: 0.5,
            confidence: ConfidenceLevel::Low,
            recommendation: Recommendation::Wait,
            features_available: None,
            current_price: None,
            price_change_24h: None,
            technical_summary: None,
            data_points: None,
            timestamp: None,
        }
    }

    pub fn insufficient_data(features_available: usize) -> Self {
        Self {
            features_available: Some(features_available),
            ..Self::fallback("Insufficient data for prediction")
        }
    }

    /// Decision fields derived from a model output.
    pub fn decision(prediction: u8, probability: f64) -> Self {
        Self {
            error: None,
            prediction,
            probability,
            confidence: ConfidenceLevel::from_probability(probability),
            recommendation: Recommendation::from_probability(probability),
            ..Self::fallback("")
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_thresholds() {
        assert_eq!(Recommendation::from_probability(0.7), Recommendation::Buy);
        assert_eq!(Recommendation::from_probability(0.69), Recommendation::Wait);
        assert_eq!(Recommendation::from_probability(0.3), Recommendation::Sell);
        assert_eq!(Recommendation::from_probability(0.5), Recommendation::Wait);
    }

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(ConfidenceLevel::from_probability(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_probability(0.2), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_probability(0.75), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_probability(0.25), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_probability(0.5), ConfidenceLevel::Low);
    }

    #[test]
    fn test_fallback_serializes_minimal_payload() {
        let json = serde_json::to_value(PredictionResponse::fallback("boom")).unwrap();
        assert_eq!(json["error"], "boom");
        assert_eq!(json["prediction"], 0);
        assert_eq!(json["probability"], 0.5);
        assert_eq!(json["confidence"], "low");
        assert_eq!(json["recommendation"], "WAIT");
        assert!(json.get("current_price").is_none());
    }

    #[test]
    fn test_decision_has_no_error_field() {
        let response = PredictionResponse::decision(1, 0.9);
        assert!(!response.is_error());
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["recommendation"], "BUY");
        assert_eq!(json["confidence"], "high");
    }
}
