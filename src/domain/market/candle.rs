use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// One OHLCV observation.
///
/// Field names follow the service payload (`open_time`, `open`, ...) but the
/// exchange-export headers (`Open time`, `Open`, ...) are accepted as aliases
/// so the same type reads both CSV dumps and live kline JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(alias = "Open time", alias = "openTime", deserialize_with = "de_open_time")]
    pub open_time: i64,
    #[serde(alias = "Open", deserialize_with = "de_number")]
    pub open: f64,
    #[serde(alias = "High", deserialize_with = "de_number")]
    pub high: f64,
    #[serde(alias = "Low", deserialize_with = "de_number")]
    pub low: f64,
    #[serde(alias = "Close", deserialize_with = "de_number")]
    pub close: f64,
    #[serde(alias = "Volume", deserialize_with = "de_number")]
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Flat candle where every price equals `price`.
    pub fn flat(open_time: i64, price: f64, volume: f64) -> Self {
        Self::new(open_time, price, price, price, price, volume)
    }
}

/// Stable sort by open time. Duplicate timestamps are kept in input order.
pub fn sort_by_open_time(candles: &mut [Candle]) {
    candles.sort_by_key(|c| c.open_time);
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Float(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Int(i64),
    Float(f64),
    Text(String),
}

fn de_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawNumber::deserialize(deserializer)? {
        RawNumber::Float(v) => Ok(v),
        RawNumber::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid number {:?}: {}", s, e))),
    }
}

fn de_open_time<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTime::deserialize(deserializer)? {
        RawTime::Int(ms) => Ok(ms),
        RawTime::Float(ms) => Ok(ms as i64),
        RawTime::Text(s) => parse_timestamp_ms(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid open time {:?}", s))),
    }
}

/// Parses epoch milliseconds or an ISO-like timestamp into epoch milliseconds.
///
/// Naive timestamps are read as UTC.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
