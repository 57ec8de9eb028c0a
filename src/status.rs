//! ═══════════════════════════════════════════════════════════════════════════════
//! STATUS — Reading Bands and Detection Trigger
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Presentation-neutral interpretation of the field reading: the status line
//! shown on the meter, and the rate-limited detection trigger that fires when
//! the reading crosses the critical band.
//! ═══════════════════════════════════════════════════════════════════════════════

use serde::{Deserialize, Serialize};

/// Meter status line for a given reading.
pub fn status_line(reading: f64) -> &'static str {
    if reading < 10.0 {
        "SYSTEM NOMINAL"
    } else if reading < 40.0 {
        "TRACE ENERGY DETECTED"
    } else if reading < 75.0 {
        "MODERATE FIELD DISTURBANCE"
    } else if reading < 90.0 {
        "HIGH EMF WARNING"
    } else {
        "!!! CRITICAL EVENT IMMINENT !!!"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrength {
    Weak,
    Moderate,
    Strong,
    Critical,
}

impl DetectionStrength {
    pub fn grade(reading: f64) -> Self {
        if reading > 98.0 {
            DetectionStrength::Critical
        } else if reading > 95.0 {
            DetectionStrength::Strong
        } else if reading > 90.0 {
            DetectionStrength::Moderate
        } else {
            DetectionStrength::Weak
        }
    }
}

/// A detection fired by the trigger below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub timestamp_ms: u64,
    pub reading: f64,
    pub strength: DetectionStrength,
}

/// Fires a detection when the reading crosses the critical band, at most
/// once per cooldown window.
pub struct DetectionTrigger {
    threshold: f64,
    cooldown_ms: u64,
    last_fired_ms: Option<u64>,
}

impl Default for DetectionTrigger {
    fn default() -> Self {
        Self {
            threshold: 90.0,
            cooldown_ms: 10_000,
            last_fired_ms: None,
        }
    }
}

impl DetectionTrigger {
    /// Check the reading against the threshold and cooldown.
    pub fn check(&mut self, now_ms: u64, reading: f64) -> Option<DetectionEvent> {
        if reading <= self.threshold {
            return None;
        }
        if let Some(last) = self.last_fired_ms {
            if now_ms.saturating_sub(last) <= self.cooldown_ms {
                return None;
            }
        }
        self.last_fired_ms = Some(now_ms);
        Some(DetectionEvent {
            timestamp_ms: now_ms,
            reading,
            strength: DetectionStrength::grade(reading),
        })
    }

    pub fn reset(&mut self) {
        self.last_fired_ms = None;
    }
}
