//! ═══════════════════════════════════════════════════════════════════════════════
//! FUSION — Field Reading from Raw Sensors
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Folds motion, orientation and magnetometer samples into the 0..100 "field
//! reading" plus the two gating signals derived from it:
//! - stability score: how still the device is (1.0 = resting)
//! - deviation count: sensor groups currently far from their long average
//!
//! Two reading models, chosen by hardware presence:
//! - magnetometer: slow baseline subtraction, gain, critically-damped chase
//! - decay: exponential falloff fed by jerk/spin spikes
//!
//! A sensor class that never reports simply leaves its windows empty; every
//! derived value degrades to a neutral default instead of failing.
//! ═══════════════════════════════════════════════════════════════════════════════

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::sensors::{alpha_delta, motion_magnitude, SensorGroup, SensorSample};
use crate::stats::RollingWindow;

// ═══════════════════════════════════════════════════════════════════════════════
// FIELD STATE — The persistable output record
// ═══════════════════════════════════════════════════════════════════════════════

/// Published field state. Serializable so a collaborator can persist the
/// bounded history across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldState {
    /// Current smoothed reading, always within 0..100
    pub reading: f64,
    /// Bounded per-tick reading history (cap 120)
    pub history: RollingWindow,
    /// Highest reading seen this session, monotone
    pub highest: f64,
    /// Slowly-adapting ambient magnetic baseline; unset until the first sample
    pub baseline: Option<f64>,
}

impl FieldState {
    fn new(history_cap: usize) -> Self {
        Self {
            reading: 0.0,
            history: RollingWindow::new(history_cap),
            highest: 0.0,
            baseline: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GROUP WINDOWS — Short/long variance tracking per sensor class
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct GroupWindows {
    short: RollingWindow,
    long: RollingWindow,
}

impl GroupWindows {
    fn new(short_cap: usize, long_cap: usize) -> Self {
        Self {
            short: RollingWindow::new(short_cap),
            long: RollingWindow::new(long_cap),
        }
    }

    fn push(&mut self, value: f64) {
        self.short.push(value);
        self.long.push(value);
    }

    /// Is the short-window level far from the long-term average?
    /// A zero average is treated as 1 to avoid dividing by zero.
    fn deviates(&self, ratio: f64) -> bool {
        let (Some(current), Some(average)) = (self.short.mean(), self.long.mean()) else {
            return false;
        };
        let denom = if average == 0.0 { 1.0 } else { average };
        ((current - average) / denom).abs() > ratio
    }

    fn is_empty(&self) -> bool {
        self.long.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNAL FUSION
// ═══════════════════════════════════════════════════════════════════════════════

pub struct SignalFusion {
    config: FusionConfig,
    rng: StdRng,
    state: FieldState,
    accel: GroupWindows,
    gyro: GroupWindows,
    mag: GroupWindows,
    last_motion: Option<(f64, f64, f64)>,
    last_alpha: Option<f64>,
    latest_accel_mag: Option<f64>,
    latest_mag: Option<f64>,
    /// Spike energy accumulated from jerks/spins since the last tick
    pending_spike: f64,
}

impl SignalFusion {
    pub fn new(config: FusionConfig, rng: StdRng) -> Self {
        let state = FieldState::new(config.history_cap);
        let accel = GroupWindows::new(config.short_window, config.long_window);
        let gyro = GroupWindows::new(config.short_window, config.long_window);
        let mag = GroupWindows::new(config.short_window, config.long_window);
        Self {
            config,
            rng,
            state,
            accel,
            gyro,
            mag,
            last_motion: None,
            last_alpha: None,
            latest_accel_mag: None,
            latest_mag: None,
            pending_spike: 0.0,
        }
    }

    /// Record one raw sample. Cheap; called at whatever rate the platform
    /// delivers (~10 Hz assumed, but nothing depends on it exactly).
    pub fn ingest(&mut self, sample: SensorSample) {
        match sample {
            SensorSample::Motion { x, y, z } => {
                let magnitude = motion_magnitude(x, y, z);
                self.accel.push(magnitude);
                self.latest_accel_mag = Some(magnitude);

                if let Some((lx, ly, lz)) = self.last_motion {
                    let delta = (x - lx).abs() + (y - ly).abs() + (z - lz).abs();
                    if delta > self.config.jerk_threshold {
                        self.pending_spike +=
                            (delta * self.config.jerk_gain).min(self.config.jerk_cap);
                    }
                }
                self.last_motion = Some((x, y, z));
            }
            SensorSample::Orientation { alpha, .. } => {
                if let Some(last) = self.last_alpha {
                    let delta = alpha_delta(alpha, last);
                    self.gyro.push(delta);
                    if delta > self.config.spin_threshold {
                        self.pending_spike += delta.min(self.config.spin_cap);
                    }
                }
                self.last_alpha = Some(alpha);
            }
            SensorSample::Magnetometer { magnitude } => {
                self.mag.push(magnitude);
                self.latest_mag = Some(magnitude);
                self.state.baseline = Some(match self.state.baseline {
                    None => magnitude,
                    Some(baseline) => {
                        baseline + (magnitude - baseline) * self.config.baseline_alpha
                    }
                });
            }
        }
    }

    /// Advance the field state one step. Called on a fixed ~100 ms cadence.
    pub fn tick(&mut self) {
        let previous = self.state.reading;

        let next = if let Some(sample) = self.latest_mag {
            // Magnetometer model: chase a baseline-relative target, then jitter.
            let baseline = self.state.baseline.unwrap_or(sample);
            let target = ((sample - baseline) * self.config.mag_gain).clamp(0.0, 100.0);
            let chased = previous + (target - previous) * self.config.reading_chase;
            let span = self.config.jitter_base + self.config.jitter_scale * target;
            let jitter = (self.rng.gen::<f64>() * 2.0 - 1.0) * span;
            (chased + jitter).clamp(0.0, 100.0)
        } else {
            // Decay model: exponential falloff plus spike energy.
            let noise = (self.rng.gen::<f64>() - 0.5) * self.config.noise_span;
            let decayed = (previous * self.config.decay + noise).max(0.0);
            if self.pending_spike > 0.0 {
                // A spike tick never lowers the reading.
                (previous + self.pending_spike).min(100.0).max(decayed)
            } else {
                decayed
            }
        };
        self.pending_spike = 0.0;

        self.state.reading = next;
        self.state.history.push(next);
        if next > self.state.highest {
            self.state.highest = next;
        }
    }

    /// 1.0 when the accelerometer reads resting gravity, falling off linearly.
    /// Neutral 1.0 before any motion sample arrives.
    pub fn stability_score(&self) -> f64 {
        match self.latest_accel_mag {
            None => 1.0,
            Some(magnitude) => {
                let deviation = (magnitude - self.config.gravity).abs();
                (1.0 - deviation / self.config.stability_span).clamp(0.0, 1.0)
            }
        }
    }

    /// Number of sensor groups whose recent level sits far from the long
    /// rolling average. 0 until data accumulates.
    pub fn deviation_count(&self) -> u8 {
        let ratio = self.config.deviation_ratio;
        [&self.accel, &self.gyro, &self.mag]
            .iter()
            .filter(|group| group.deviates(ratio))
            .count() as u8
    }

    pub fn reading(&self) -> f64 {
        self.state.reading
    }

    pub fn highest(&self) -> f64 {
        self.state.highest
    }

    pub fn history(&self) -> &RollingWindow {
        &self.state.history
    }

    pub fn field_state(&self) -> &FieldState {
        &self.state
    }

    /// Restore a previously persisted field state (session resume).
    pub fn restore_state(&mut self, state: FieldState) {
        self.state = state;
        self.state.reading = self.state.reading.clamp(0.0, 100.0);
    }

    /// Pull the reading down after a detection event so it does not
    /// immediately re-trigger.
    pub fn suppress_to(&mut self, value: f64) {
        self.state.reading = value.clamp(0.0, 100.0);
    }

    /// Sensor groups that have not reported yet (for one-shot degradation logs).
    pub fn silent_groups(&self) -> Vec<SensorGroup> {
        let mut silent = Vec::new();
        if self.accel.is_empty() {
            silent.push(SensorGroup::Accelerometer);
        }
        if self.gyro.is_empty() {
            silent.push(SensorGroup::Gyro);
        }
        if self.mag.is_empty() {
            silent.push(SensorGroup::Magnetometer);
        }
        silent
    }
}
