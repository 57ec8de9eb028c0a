//! ═══════════════════════════════════════════════════════════════════════════════
//! ENGINE — Component Wiring and Lifecycle
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Owns the four pipeline components and drives them from a single
//! `advance(now_ms)` call: fusion on its own cadence, then the visual
//! estimator and the gate, then the entity simulation every frame. All
//! cross-component flow happens here, in dependency order; components
//! never reach into each other.
//!
//! Readers get a published snapshot behind an Arc<RwLock>. Writes happen
//! once per advance, so readers see a consistent frame, never a half-tick.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::anomaly::{AnomalyEvent, AnomalyGate, GateInputs};
use crate::config::EngineConfig;
use crate::entity::{Detection, EntitySimulator, SimEntity};
use crate::error::EngineResult;
use crate::fusion::{FieldState, SignalFusion};
use crate::scene::SceneObject;
use crate::sensors::{SensorSample, Tilt};
use crate::status::{status_line, DetectionEvent, DetectionTrigger};
use crate::visual::{FrameSource, VisualNoiseEstimator};

/// Field reading published right after a detection fires.
const POST_DETECTION_READING: f64 = 20.0;

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the presentation layer binds to, copied out per advance.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub timestamp_ms: u64,
    pub field_reading: f64,
    pub highest_field_reading: f64,
    pub stability_score: f64,
    pub deviation_count: u8,
    pub visual_noise: f64,
    pub attention_level: f64,
    pub status: &'static str,
    pub current_anomaly: Option<AnomalyEvent>,
    pub entities: Vec<SimEntity>,
    pub targeted: Option<SimEntity>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            field_reading: 0.0,
            highest_field_reading: 0.0,
            stability_score: 1.0,
            deviation_count: 0,
            visual_noise: 0.25,
            attention_level: 0.0,
            status: status_line(0.0),
            current_anomaly: None,
            entities: Vec::new(),
            targeted: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Engine {
    fusion: SignalFusion,
    estimator: VisualNoiseEstimator,
    gate: AnomalyGate,
    sim: EntitySimulator,
    trigger: DetectionTrigger,
    frames: Box<dyn FrameSource + Send>,
    detections_log: Vec<DetectionEvent>,
    tilt: Tilt,
    running: bool,
    next_fusion_ms: u64,
    next_visual_ms: u64,
    next_gate_ms: u64,
    fusion_interval_ms: u64,
    visual_interval_ms: u64,
    gate_interval_ms: u64,
    warned_silent: bool,
    state: Arc<RwLock<EngineSnapshot>>,
}

impl Engine {
    /// Build the whole pipeline from one config and one seed. The seed is
    /// split so each component owns an independent deterministic stream.
    pub fn new(
        config: EngineConfig,
        seed: u64,
        frames: Box<dyn FrameSource + Send>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let mut root = StdRng::seed_from_u64(seed);
        let fusion_rng = StdRng::seed_from_u64(root.gen());
        let gate_rng = StdRng::seed_from_u64(root.gen());
        let sim_rng = StdRng::seed_from_u64(root.gen());

        Ok(Self {
            fusion: SignalFusion::new(config.fusion.clone(), fusion_rng),
            estimator: VisualNoiseEstimator::new(config.visual.clone()),
            gate: AnomalyGate::new(config.gate.clone(), gate_rng),
            sim: EntitySimulator::new(config.physics.clone(), sim_rng),
            trigger: DetectionTrigger::default(),
            frames,
            detections_log: Vec::new(),
            tilt: Tilt::default(),
            running: false,
            next_fusion_ms: 0,
            next_visual_ms: 0,
            next_gate_ms: 0,
            fusion_interval_ms: config.fusion.tick_interval_ms,
            visual_interval_ms: config.gate.tick_interval_ms,
            gate_interval_ms: config.gate.tick_interval_ms,
            warned_silent: false,
            state: Arc::new(RwLock::new(EngineSnapshot::default())),
        })
    }

    pub fn start(&mut self, now_ms: u64) {
        self.running = true;
        self.next_fusion_ms = now_ms;
        self.next_visual_ms = now_ms;
        self.next_gate_ms = now_ms;
    }

    /// Halt the pipeline. In-flight gate delays are cancelled; nothing
    /// mutates or publishes until the next start().
    pub fn stop(&mut self) {
        self.running = false;
        self.gate.reset();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Feed one raw sensor sample. Orientation doubles as the tilt input
    /// for the entity simulation.
    pub fn ingest(&mut self, sample: SensorSample) {
        if !self.running {
            return;
        }
        if let SensorSample::Orientation { beta, gamma, .. } = sample {
            self.tilt = Tilt::from_orientation(beta, gamma);
        }
        self.fusion.ingest(sample);
    }

    /// Install a fresh scene-analysis snapshot.
    pub fn set_scene(&mut self, objects: Vec<SceneObject>) {
        self.sim.set_scene(objects);
    }

    /// Mirror the caller's logical detection list into the simulation.
    pub fn sync_detections(&mut self, detections: &[Detection]) {
        self.sim.sync(detections);
    }

    /// Drive everything due at `now_ms`. Called once per animation frame
    /// (~16 ms); component cadences are enforced internally.
    pub fn advance(&mut self, now_ms: u64) {
        if !self.running {
            return;
        }

        if now_ms >= self.next_fusion_ms {
            self.fusion.tick();
            self.next_fusion_ms =
                Self::next_deadline(self.next_fusion_ms, self.fusion_interval_ms, now_ms);

            if let Some(event) = self.trigger.check(now_ms, self.fusion.reading()) {
                self.fusion.suppress_to(POST_DETECTION_READING);
                self.detections_log.push(event);
            }
        }

        if now_ms >= self.next_visual_ms {
            let frame = self.frames.capture_low_res();
            self.estimator.analyze(frame.as_ref());
            self.next_visual_ms =
                Self::next_deadline(self.next_visual_ms, self.visual_interval_ms, now_ms);
        }

        if now_ms >= self.next_gate_ms {
            if !self.warned_silent {
                self.warned_silent = true;
                for group in self.fusion.silent_groups() {
                    eprintln!("[engine] no {:?} samples yet; gating without them", group);
                }
            }
            let inputs = GateInputs {
                stability: self.fusion.stability_score(),
                deviation_count: self.fusion.deviation_count(),
                visual_noise: self.estimator.visual_noise_score(),
            };
            self.gate.tick(now_ms, inputs);
            self.next_gate_ms =
                Self::next_deadline(self.next_gate_ms, self.gate_interval_ms, now_ms);
        }

        self.sim.tick(now_ms, self.tilt, self.fusion.reading());
        self.publish(now_ms);
    }

    /// Advance a deadline by whole intervals so frame-granular calls do not
    /// drift the cadence. A caller that stalls past a full interval realigns
    /// instead of replaying the missed ticks.
    fn next_deadline(previous_ms: u64, interval_ms: u64, now_ms: u64) -> u64 {
        let next = previous_ms + interval_ms;
        if now_ms >= next {
            now_ms + interval_ms
        } else {
            next
        }
    }

    fn publish(&mut self, now_ms: u64) {
        let mut state = self.state.write();
        state.timestamp_ms = now_ms;
        state.field_reading = self.fusion.reading();
        state.highest_field_reading = self.fusion.highest();
        state.stability_score = self.fusion.stability_score();
        state.deviation_count = self.fusion.deviation_count();
        state.visual_noise = self.estimator.visual_noise_score();
        state.attention_level = self.gate.attention_level();
        state.status = status_line(self.fusion.reading());
        state.current_anomaly = self.gate.current_anomaly().cloned();
        state.entities = self.sim.entities().to_vec();
        state.targeted = self.sim.targeted().cloned();
    }

    /// Shared handle for readers on other threads.
    pub fn state_handle(&self) -> Arc<RwLock<EngineSnapshot>> {
        Arc::clone(&self.state)
    }

    /// Copy of the last published snapshot.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.read().clone()
    }

    /// Receive anomaly events as they commit to the log.
    pub fn subscribe_anomalies(&mut self) -> Receiver<AnomalyEvent> {
        self.gate.subscribe()
    }

    pub fn anomaly_log(&self) -> &[AnomalyEvent] {
        self.gate.log()
    }

    pub fn detections_log(&self) -> &[DetectionEvent] {
        &self.detections_log
    }

    /// Session resume: reinstall a persisted field state.
    pub fn restore_field_state(&mut self, state: FieldState) {
        self.fusion.restore_state(state);
    }

    /// Session resume: seed the committed anomaly log.
    pub fn restore_anomaly_log(&mut self, events: Vec<AnomalyEvent>) {
        self.gate.restore_log(events);
    }

    /// The persistable slice of fusion state.
    pub fn field_state(&self) -> &FieldState {
        self.fusion.field_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::NoCamera;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default(), 42, Box::new(NoCamera)).unwrap()
    }

    fn shake(e: &mut Engine) {
        e.ingest(SensorSample::Motion { x: 0.0, y: 0.0, z: 9.8 });
        e.ingest(SensorSample::Motion { x: 30.0, y: 30.0, z: 9.8 });
        e.ingest(SensorSample::Orientation { alpha: 0.0, beta: 0.0, gamma: 0.0 });
        e.ingest(SensorSample::Orientation { alpha: 40.0, beta: 0.0, gamma: 0.0 });
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.physics.max_speed = 0.0;
        assert!(Engine::new(config, 1, Box::new(NoCamera)).is_err());
    }

    #[test]
    fn test_advance_before_start_is_inert() {
        let mut e = engine();
        e.ingest(SensorSample::Motion { x: 0.0, y: 0.0, z: 9.8 });
        e.advance(1_000);
        assert_eq!(e.snapshot().timestamp_ms, 0);
    }

    #[test]
    fn test_fusion_cadence_respected() {
        let mut e = engine();
        e.start(0);
        e.advance(0);
        e.advance(50);
        e.advance(100);
        e.advance(116);
        // Three advances were due on the 100 ms cadence, one was not
        assert_eq!(e.snapshot().timestamp_ms, 116);
        assert_eq!(e.fusion.history().len(), 2);
    }

    #[test]
    fn test_cadence_does_not_drift_at_frame_granularity() {
        let mut e = engine();
        e.start(0);
        // Ten seconds of 16 ms frames: fusion lands on every 100 ms
        // boundary (100 ticks) and the gate on every 500 ms boundary
        // (20 ticks), even though no frame hits those times exactly.
        let mut t = 0;
        while t < 10_000 {
            e.advance(t);
            t += 16;
        }
        assert_eq!(e.fusion.history().len(), 100);
        assert!((e.snapshot().attention_level - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_stalled_caller_realigns_instead_of_replaying() {
        let mut e = engine();
        e.start(0);
        e.advance(0);
        // A 5 s stall is one tick when it resumes, not fifty
        e.advance(5_000);
        e.advance(5_016);
        assert_eq!(e.fusion.history().len(), 2);
    }

    #[test]
    fn test_detection_suppresses_reading() {
        let mut e = engine();
        e.start(0);
        shake(&mut e);
        e.advance(0);
        let snap = e.snapshot();
        assert_eq!(e.detections_log().len(), 1);
        assert_eq!(snap.field_reading, 20.0);
        assert!(snap.highest_field_reading > 90.0);
    }

    #[test]
    fn test_snapshot_tracks_entities() {
        let mut e = engine();
        e.start(0);
        e.sync_detections(&[Detection {
            id: "wisp".into(),
            contained: false,
            instability: 0.5,
        }]);
        e.advance(0);
        let snap = e.snapshot();
        assert_eq!(snap.entities.len(), 1);
        assert_eq!(snap.entities[0].id, "wisp");
    }

    #[test]
    fn test_stop_silences_everything() {
        let mut e = engine();
        let rx = e.subscribe_anomalies();
        e.start(0);
        shake(&mut e);
        e.advance(0);
        e.stop();
        let frozen = e.snapshot();

        shake(&mut e);
        for t in 0..1000u64 {
            e.advance(1_000 + t * 16);
        }
        let after = e.snapshot();
        assert_eq!(after.timestamp_ms, frozen.timestamp_ms);
        assert_eq!(after.field_reading, frozen.field_reading);
        assert!(rx.try_recv().is_err());
        assert!(e.anomaly_log().is_empty());
        assert_eq!(e.detections_log().len(), 1);
    }

    #[test]
    fn test_field_state_survives_restore() {
        let mut e = engine();
        e.start(0);
        shake(&mut e);
        e.advance(0);
        let json = serde_json::to_string(e.field_state()).unwrap();

        let mut fresh = engine();
        fresh.restore_field_state(serde_json::from_str(&json).unwrap());
        assert_eq!(fresh.field_state().highest, e.field_state().highest);
        let a: Vec<f64> = fresh.field_state().history.iter().collect();
        let b: Vec<f64> = e.field_state().history.iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let run = || {
            let mut e = engine();
            e.start(0);
            for t in 0..200u64 {
                if t % 3 == 0 {
                    e.ingest(SensorSample::Motion {
                        x: (t as f64 * 0.7).sin() * 5.0,
                        y: 0.0,
                        z: 9.8,
                    });
                }
                e.advance(t * 16);
            }
            e.snapshot()
        };
        let a = run();
        let b = run();
        assert_eq!(a.field_reading, b.field_reading);
        assert_eq!(a.highest_field_reading, b.highest_field_reading);
    }
}
