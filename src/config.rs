//! ═══════════════════════════════════════════════════════════════════════════════
//! CONFIG — Tuned Constants
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Every magic number in the pipeline lives here. The values are tuned for
//! subjective feel, not physical accuracy; there is no model to re-derive
//! them from, so treat the defaults as canonical.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Signal fusion tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Fusion tick cadence in milliseconds
    pub tick_interval_ms: u64,
    /// Slow EWMA alpha tracking the ambient magnetic baseline
    pub baseline_alpha: f64,
    /// Per-tick fraction the reading moves toward its target
    pub reading_chase: f64,
    /// Gain applied to (sample - baseline) before clamping to 0..100
    pub mag_gain: f64,
    /// Jitter applied after the chase step: ±(jitter_base + jitter_scale·target)
    pub jitter_base: f64,
    pub jitter_scale: f64,
    /// Per-tick decay factor when no magnetometer is present
    pub decay: f64,
    /// Span of the centered base noise in decay mode
    pub noise_span: f64,
    /// Motion delta (summed axes) that counts as a jerk
    pub jerk_threshold: f64,
    /// Jerk spike: min(delta · jerk_gain, jerk_cap)
    pub jerk_gain: f64,
    pub jerk_cap: f64,
    /// Heading delta in degrees that counts as a fast spin
    pub spin_threshold: f64,
    /// Spin spike: min(delta, spin_cap)
    pub spin_cap: f64,
    /// Short rolling window per sensor group (~5 s at 10 Hz)
    pub short_window: usize,
    /// Long rolling window per sensor group (~30 s at 10 Hz)
    pub long_window: usize,
    /// Bounded reading history length
    pub history_cap: usize,
    /// Relative deviation from the long average that counts as elevated
    pub deviation_ratio: f64,
    /// Resting accelerometer magnitude (gravity)
    pub gravity: f64,
    /// Deviation from gravity that zeroes the stability score
    pub stability_span: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            baseline_alpha: 0.001,
            reading_chase: 0.1,
            mag_gain: 3.0,
            jitter_base: 0.15,
            jitter_scale: 0.025,
            decay: 0.95,
            noise_span: 0.5,
            jerk_threshold: 15.0,
            jerk_gain: 3.0,
            jerk_cap: 60.0,
            spin_threshold: 20.0,
            spin_cap: 40.0,
            short_window: 50,
            long_window: 300,
            history_cap: 120,
            deviation_ratio: 0.15,
            gravity: 9.8,
            stability_span: 10.0,
        }
    }
}

/// Visual noise estimation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualConfig {
    /// Analysis grid the incoming frame is sampled down to
    pub analysis_width: u32,
    pub analysis_height: u32,
    /// Luminance delta (0..255) that counts as an edge
    pub edge_threshold: u8,
    /// Weights combining brightness change and edge fluctuation
    pub brightness_weight: f64,
    pub edge_weight: f64,
    /// New-frame weight in the exponential score blend
    pub smoothing: f64,
    /// Score reported when capture fails
    pub neutral_score: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            analysis_width: 160,
            analysis_height: 120,
            edge_threshold: 30,
            brightness_weight: 2.0,
            edge_weight: 3.0,
            smoothing: 0.3,
            neutral_score: 0.25,
        }
    }
}

/// Anomaly gate tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Gate tick cadence in milliseconds
    pub tick_interval_ms: u64,
    /// Attention accumulated per idle tick
    pub attention_increment: f64,
    /// Minimum attention before an anomaly is possible
    pub attention_threshold: f64,
    /// Minimum stillness required
    pub stability_threshold: f64,
    /// Minimum sensor groups showing elevated variance
    pub deviation_threshold: u8,
    /// Visual noise band: neither perfectly static nor chaotic
    pub noise_min: f64,
    pub noise_max: f64,
    /// Trigger probability per tick is attention · trigger_scale
    pub trigger_scale: f64,
    /// Cooldown window after a completed cycle, uniform in this range
    pub cooldown_min_ms: u64,
    pub cooldown_max_ms: u64,
    /// Delay before a triggered anomaly becomes visible
    pub reveal_min_ms: u64,
    pub reveal_max_ms: u64,
    /// How long the anomaly stays visible
    pub duration_min_ms: u64,
    pub duration_max_ms: u64,
    /// Delay between hiding and committing to the log
    pub ack_min_ms: u64,
    pub ack_max_ms: u64,
    pub intensity_min: f64,
    pub intensity_max: f64,
    /// Position band within the viewport, percent
    pub position_min: f64,
    pub position_max: f64,
    /// Re-draw positions landing this close to the previous one on both axes
    pub min_separation: f64,
    /// Attention lost after a completed cycle, floored
    pub attention_drop: f64,
    pub attention_floor: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            attention_increment: 0.004,
            attention_threshold: 0.55,
            stability_threshold: 0.72,
            deviation_threshold: 2,
            noise_min: 0.12,
            noise_max: 0.45,
            trigger_scale: 0.035,
            cooldown_min_ms: 90_000,
            cooldown_max_ms: 180_000,
            reveal_min_ms: 220,
            reveal_max_ms: 680,
            duration_min_ms: 700,
            duration_max_ms: 1100,
            ack_min_ms: 350,
            ack_max_ms: 650,
            intensity_min: 0.18,
            intensity_max: 0.42,
            position_min: 20.0,
            position_max: 80.0,
            min_separation: 20.0,
            attention_drop: 0.65,
            attention_floor: 0.1,
        }
    }
}

/// Entity physics tuning. Units are viewport percent per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Acceleration per unit of device tilt
    pub gravity_tilt: f64,
    /// Constant downward acceleration
    pub downward_drift: f64,
    /// Per-frame velocity retention
    pub friction: f64,
    /// Random acceleration per unit of field reading
    pub field_agitation: f64,
    /// Hard speed clamp after integration
    pub max_speed: f64,
    /// Repulsion gain from scene vertices
    pub scene_repulsion: f64,
    /// Vertices within this radius repel
    pub repulsion_radius: f64,
    /// Spring gain toward the anchor rest point
    pub anchor_spring: f64,
    /// Velocity damping applied while anchored
    pub anchor_damping: f64,
    /// Tilt-driven positional offset, scaled by 1/depth
    pub parallax: f64,
    /// Minimum gap between interaction triggers
    pub interaction_cooldown_ms: u64,
    /// Probability a new entity spawns near scene geometry
    pub spawn_near_object_chance: f64,
    /// Jitter around the chosen spawn vertex
    pub spawn_jitter: f64,
    /// Screen focal point used for targeting
    pub focal_x: f64,
    pub focal_y: f64,
    /// Targeting distance threshold
    pub target_radius: f64,
    /// Velocity retention for contained entities (drift to stop)
    pub contained_drag: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity_tilt: 0.00005,
            downward_drift: 0.00002,
            friction: 0.97,
            field_agitation: 0.00015,
            max_speed: 0.2,
            scene_repulsion: 0.0001,
            repulsion_radius: 12.0,
            anchor_spring: 0.0008,
            anchor_damping: 0.995,
            parallax: 0.002,
            interaction_cooldown_ms: 500,
            spawn_near_object_chance: 0.7,
            spawn_jitter: 4.0,
            focal_x: 50.0,
            focal_y: 45.0,
            target_radius: 15.0,
            contained_drag: 0.9,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub visual: VisualConfig,
    pub gate: GateConfig,
    pub physics: PhysicsConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Reject configurations that would break pipeline invariants.
    pub fn validate(&self) -> EngineResult<()> {
        if self.fusion.tick_interval_ms == 0 || self.gate.tick_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick intervals must be non-zero".into(),
            ));
        }
        if self.gate.cooldown_min_ms > self.gate.cooldown_max_ms {
            return Err(EngineError::InvalidConfig(
                "cooldown_min_ms exceeds cooldown_max_ms".into(),
            ));
        }
        if self.physics.max_speed <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "max_speed must be positive".into(),
            ));
        }
        if !(self.visual.smoothing > 0.0 && self.visual.smoothing <= 1.0) {
            return Err(EngineError::InvalidConfig(
                "visual smoothing must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}
