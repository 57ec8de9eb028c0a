//! ═══════════════════════════════════════════════════════════════════════════════
//! STATS — Smoothing and Windowing Primitives
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! The two building blocks every estimator in this crate sits on:
//! - EWMA for slow baselines and score smoothing
//! - RollingWindow for bounded short/long sample histories
//! ═══════════════════════════════════════════════════════════════════════════════

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// EWMA — Exponentially Weighted Moving Average
// ═══════════════════════════════════════════════════════════════════════════════

/// Exponentially weighted moving average.
/// New value weighted by α, history by (1-α).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ewma {
    /// Smoothing factor (0 < α ≤ 1)
    alpha: f64,
    /// Current smoothed value
    value: f64,
    /// Whether initialized with at least one sample
    initialized: bool,
}

impl Ewma {
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "Alpha must be in (0, 1]");
        Self {
            alpha,
            value: 0.0,
            initialized: false,
        }
    }

    /// Update with a new sample. The first sample seeds the value directly.
    pub fn update(&mut self, sample: f64) {
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            self.value += (sample - self.value) * self.alpha;
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Value if initialized, else the supplied neutral default.
    pub fn value_or(&self, neutral: f64) -> f64 {
        if self.initialized {
            self.value
        } else {
            neutral
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLLING WINDOW — Bounded ordered sample history
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded FIFO of samples. Pushing beyond the cap drops the oldest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    cap: usize,
}

impl RollingWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() >= self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ewma_seed_and_blend() {
        let mut ewma = Ewma::new(0.5);
        assert!(!ewma.is_initialized());
        ewma.update(10.0);
        assert_eq!(ewma.value(), 10.0);
        ewma.update(20.0);
        assert_eq!(ewma.value(), 15.0);
    }

    #[test]
    fn test_ewma_neutral_default() {
        let ewma = Ewma::new(0.1);
        assert_eq!(ewma.value_or(0.25), 0.25);
    }

    #[test]
    fn test_window_cap_drops_oldest() {
        let mut w = RollingWindow::new(3);
        for i in 1..=5 {
            w.push(i as f64);
        }
        assert_eq!(w.len(), 3);
        let collected: Vec<f64> = w.iter().collect();
        assert_eq!(collected, vec![3.0, 4.0, 5.0]);
        assert_eq!(w.latest(), Some(5.0));
    }

    #[test]
    fn test_window_mean() {
        let mut w = RollingWindow::new(10);
        assert_eq!(w.mean(), None);
        w.push(2.0);
        w.push(4.0);
        assert_eq!(w.mean(), Some(3.0));
    }

    #[test]
    fn test_window_serde_round_trip() {
        let mut w = RollingWindow::new(4);
        for i in 0..6 {
            w.push(i as f64);
        }
        let json = serde_json::to_string(&w).unwrap();
        let restored: RollingWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cap(), 4);
        let collected: Vec<f64> = restored.iter().collect();
        assert_eq!(collected, vec![2.0, 3.0, 4.0, 5.0]);
    }
}
