//! ═══════════════════════════════════════════════════════════════════════════════
//! SENSORS — Raw Sample Contract
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! The input surface of the core. Samples arrive from platform collaborators
//! at roughly 10 Hz; any sensor class may be absent for the whole session
//! (no permission, no hardware) and the rest of the pipeline degrades to
//! neutral values rather than failing.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

/// One raw reading from a device sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SensorSample {
    /// Acceleration including gravity, m/s² per axis.
    Motion { x: f64, y: f64, z: f64 },
    /// Device orientation angles in degrees (alpha 0..360, beta/gamma ±90/±180).
    Orientation { alpha: f64, beta: f64, gamma: f64 },
    /// Magnetic field magnitude in microteslas.
    Magnetometer { magnitude: f64 },
}

/// Sensor classes used for per-group variance tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorGroup {
    Accelerometer,
    /// Derived from orientation-sample deltas; there is no raw gyroscope class.
    Gyro,
    Magnetometer,
}

impl SensorSample {
    pub fn group(&self) -> SensorGroup {
        match self {
            SensorSample::Motion { .. } => SensorGroup::Accelerometer,
            SensorSample::Orientation { .. } => SensorGroup::Gyro,
            SensorSample::Magnetometer { .. } => SensorGroup::Magnetometer,
        }
    }
}

/// Euclidean magnitude of a motion sample.
pub fn motion_magnitude(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

/// Absolute heading change, accounting for the 360° → 0° wrap.
pub fn alpha_delta(current: f64, previous: f64) -> f64 {
    let mut delta = (current - previous).abs();
    if delta > 180.0 {
        delta = 360.0 - delta;
    }
    delta
}

/// Tilt-derived gravity direction for the entity simulation.
/// gamma tips the device left/right, beta front/back; both map to [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tilt {
    pub gravity_x: f64,
    pub gravity_y: f64,
}

impl Tilt {
    pub fn from_orientation(beta: f64, gamma: f64) -> Self {
        Self {
            gravity_x: gamma / 90.0,
            gravity_y: beta.clamp(-90.0, 90.0) / 90.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_magnitude_at_rest() {
        // Device flat on a table reads gravity on one axis
        let mag = motion_magnitude(0.0, 0.0, 9.8);
        assert!((mag - 9.8).abs() < 1e-9);
    }

    #[test]
    fn test_alpha_delta_wraps() {
        assert!((alpha_delta(359.0, 1.0) - 2.0).abs() < 1e-9);
        assert!((alpha_delta(1.0, 359.0) - 2.0).abs() < 1e-9);
        assert!((alpha_delta(90.0, 60.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_tilt_clamps_beta() {
        let tilt = Tilt::from_orientation(170.0, 45.0);
        assert_eq!(tilt.gravity_y, 1.0);
        assert!((tilt.gravity_x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sample_serde_tags() {
        let s = SensorSample::Magnetometer { magnitude: 48.5 };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"magnetometer\""));
        let back: SensorSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
