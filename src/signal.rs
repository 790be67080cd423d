//! Signal generation — SMA crossover math and pluggable run plans.
//!
//! The worker never decides sides itself; it pulls them from a
//! `SignalSource`. Run length and side order live entirely in the source,
//! so demo scripts and live strategies are interchangeable.

use std::collections::VecDeque;

use crate::types::Signal;

/// Simple Moving Average over the last `period` prices.
/// Returns None when there is not enough data.
pub fn compute_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let window = &prices[prices.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// SMA crossover detection.
///
/// Compares the short and long SMAs at the current and previous time step:
/// short crossing above long is BUY, crossing below is SELL, otherwise HOLD.
/// Needs at least `long_period + 1` prices for crossover detection.
pub fn evaluate_crossover(prices: &[f64], short_period: usize, long_period: usize) -> Signal {
    if prices.len() < long_period + 1 {
        return Signal::Hold;
    }

    let prev = &prices[..prices.len() - 1];
    let (short_now, long_now, short_prev, long_prev) = match (
        compute_sma(prices, short_period),
        compute_sma(prices, long_period),
        compute_sma(prev, short_period),
        compute_sma(prev, long_period),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return Signal::Hold,
    };

    if short_prev <= long_prev && short_now > long_now {
        Signal::Buy
    } else if short_prev >= long_prev && short_now < long_now {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

// ---------------------------------------------------------------------------
// Signal sources
// ---------------------------------------------------------------------------

/// Pluggable side decider for the execution loop.
///
/// `next` is called once per loop iteration with the price history
/// oldest-first. Returning `None` ends the run as COMPLETED.
pub trait SignalSource: Send + Sync {
    fn next(&mut self, history: &[f64]) -> Option<Signal>;
}

/// Live SMA crossover source, bounded by a maximum iteration count.
pub struct SmaCrossover {
    short_period: usize,
    long_period: usize,
    remaining: usize,
}

impl SmaCrossover {
    pub fn new(short_period: usize, long_period: usize, max_iterations: usize) -> Self {
        Self {
            short_period,
            long_period,
            remaining: max_iterations,
        }
    }
}

impl SignalSource for SmaCrossover {
    fn next(&mut self, history: &[f64]) -> Option<Signal> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(evaluate_crossover(
            history,
            self.short_period,
            self.long_period,
        ))
    }
}

/// Predetermined finite side sequence. Used for demo plans and tests;
/// exhaustion ends the run gracefully.
pub struct ScriptedPlan {
    sides: VecDeque<Signal>,
}

impl ScriptedPlan {
    pub fn new(sides: impl IntoIterator<Item = Signal>) -> Self {
        Self {
            sides: sides.into_iter().collect(),
        }
    }

    /// Parse a plan from config strings ("BUY" / "SELL" / "HOLD").
    /// Unknown entries are treated as HOLD.
    pub fn from_strs<S: AsRef<str>>(sides: &[S]) -> Self {
        Self::new(sides.iter().map(|s| match s.as_ref() {
            "BUY" => Signal::Buy,
            "SELL" => Signal::Sell,
            _ => Signal::Hold,
        }))
    }
}

impl SignalSource for ScriptedPlan {
    fn next(&mut self, _history: &[f64]) -> Option<Signal> {
        self.sides.pop_front()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
