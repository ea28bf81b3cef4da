//! Streaming accumulators behind every windowed indicator.
//!
//! Each accumulator consumes one observation at a time and reports its value
//! for the row just pushed, so a column can be extended across chunk
//! boundaries without recomputing history.

use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Fixed-size trailing window (ring buffer) over the last `period` values.
///
/// Statistics are recomputed from the buffered values on every call, so the
/// result for a row depends only on the window contents and never on how many
/// rows were pushed before it.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    period: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::with_capacity(period),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.period {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn is_full(&self) -> bool {
        self.period > 0 && self.values.len() == self.period
    }

    /// Trailing mean, `None` until `period` values have been seen.
    pub fn mean(&self) -> Option<f64> {
        self.is_full().then(|| self.values.iter().mean())
    }

    /// Trailing sample standard deviation (n - 1 denominator).
    pub fn std_dev(&self) -> Option<f64> {
        self.is_full().then(|| self.values.iter().std_dev())
    }
}

/// Bias-adjusted exponentially weighted mean (`adjust = true`).
///
/// Weights decay as `(1 - alpha)^i` and the average is normalized by the sum
/// of weights, so early values are not biased toward the first observation.
/// Missing observations still decay the weights.
#[derive(Debug, Clone)]
pub struct AdjustedEwm {
    decay: f64,
    weighted: Option<f64>,
    old_weight: f64,
}

impl AdjustedEwm {
    pub fn with_span(span: usize) -> Self {
        let alpha = 2.0 / (span as f64 + 1.0);
        Self {
            decay: 1.0 - alpha,
            weighted: None,
            old_weight: 1.0,
        }
    }

    pub fn next(&mut self, value: f64) -> Option<f64> {
        let observed = !value.is_nan();
        match self.weighted {
            None => {
                if observed {
                    self.weighted = Some(value);
                    self.old_weight = 1.0;
                }
            }
            Some(current) => {
                self.old_weight *= self.decay;
                if observed {
                    // Equal values short-circuit to avoid accumulating rounding error.
                    if current != value {
                        self.weighted = Some(
                            (self.old_weight * current + value) / (self.old_weight + 1.0),
                        );
                    }
                    self.old_weight += 1.0;
                }
            }
        }
        self.weighted
    }
}
