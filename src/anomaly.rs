//! ═══════════════════════════════════════════════════════════════════════════════
//! ANOMALY — Timed Detection Gate
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! The state machine that decides when a visual anomaly "happens". It
//! accumulates attention while idle, and only fires when every gate agrees:
//! cooldown elapsed, attention high, device still, sensor variance elevated,
//! visual noise in the live-view band, and a final probability draw.
//!
//! Fired events move through staged delays (reveal → visible → acknowledge)
//! driven by the caller's clock, so stopping the engine cancels anything
//! in flight without dangling timers.
//!
//! There is no failure path here. Missing sensors leave the stillness and
//! variance gates unsatisfied, and the machine idles forever.
//! ═══════════════════════════════════════════════════════════════════════════════

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GateConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// The four anomaly renderings the presentation layer knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    Blur,
    Shadow,
    Distortion,
    EdgeArtifact,
}

const ALL_KINDS: [AnomalyKind; 4] = [
    AnomalyKind::Blur,
    AnomalyKind::Shadow,
    AnomalyKind::Distortion,
    AnomalyKind::EdgeArtifact,
];

const NOTE_POOL: [&str; 5] = [
    "Unclassified visual irregularity observed",
    "Anomalous pattern flagged",
    "Irregularity detected and resolved",
    "Visual distortion logged",
    "Transient anomaly recorded",
];

/// One detected anomaly. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub id: u64,
    pub timestamp_ms: u64,
    pub kind: AnomalyKind,
    /// Viewport position in percent
    pub x: f64,
    pub y: f64,
    pub duration_ms: u64,
    pub intensity: f64,
    pub note: String,
}

/// Gating signals sampled from the rest of the pipeline each tick.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs {
    pub stability: f64,
    pub deviation_count: u8,
    pub visual_noise: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    /// Event created, not yet shown (perceptual lag)
    PendingReveal { reveal_at_ms: u64 },
    Visible { until_ms: u64 },
    /// Hidden again, waiting to commit to the log
    PendingAck { ack_at_ms: u64 },
}

pub struct AnomalyGate {
    config: GateConfig,
    rng: StdRng,
    state: GateState,
    attention: f64,
    cooldown_until_ms: u64,
    last_position: Option<(f64, f64)>,
    /// The event working through the staged delays
    staged: Option<AnomalyEvent>,
    /// Externally visible only while the state is Visible
    current: Option<AnomalyEvent>,
    log: Vec<AnomalyEvent>,
    next_id: u64,
    subscribers: Vec<Sender<AnomalyEvent>>,
}

impl AnomalyGate {
    pub fn new(config: GateConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            state: GateState::Idle,
            attention: 0.0,
            cooldown_until_ms: 0,
            last_position: None,
            staged: None,
            current: None,
            log: Vec::new(),
            next_id: 1,
            subscribers: Vec::new(),
        }
    }

    /// Advance one gate tick (~500 ms cadence). `now_ms` is the caller's
    /// monotonic clock; all staged delays are deadlines against it.
    pub fn tick(&mut self, now_ms: u64, inputs: GateInputs) {
        match self.state {
            GateState::Idle => {
                self.attention =
                    (self.attention + self.config.attention_increment).min(1.0);
                if self.gates_pass(now_ms, inputs) {
                    let event = self.draw_event(now_ms);
                    let reveal_at_ms = now_ms
                        + self
                            .rng
                            .gen_range(self.config.reveal_min_ms..=self.config.reveal_max_ms);
                    self.staged = Some(event);
                    self.state = GateState::PendingReveal { reveal_at_ms };
                }
            }
            GateState::PendingReveal { reveal_at_ms } => {
                if now_ms >= reveal_at_ms {
                    let duration = self
                        .staged
                        .as_ref()
                        .map(|e| e.duration_ms)
                        .unwrap_or(self.config.duration_min_ms);
                    self.current = self.staged.clone();
                    self.state = GateState::Visible { until_ms: now_ms + duration };
                }
            }
            GateState::Visible { until_ms } => {
                if now_ms >= until_ms {
                    self.current = None;
                    let ack_at_ms = now_ms
                        + self
                            .rng
                            .gen_range(self.config.ack_min_ms..=self.config.ack_max_ms);
                    self.state = GateState::PendingAck { ack_at_ms };
                }
            }
            GateState::PendingAck { ack_at_ms } => {
                if now_ms >= ack_at_ms {
                    self.attention = (self.attention - self.config.attention_drop)
                        .max(self.config.attention_floor);
                    self.cooldown_until_ms = now_ms
                        + self
                            .rng
                            .gen_range(self.config.cooldown_min_ms..=self.config.cooldown_max_ms);
                    if let Some(event) = self.staged.take() {
                        self.commit(event);
                    }
                    self.state = GateState::Idle;
                }
            }
        }
    }

    /// All six gates, cheapest first.
    fn gates_pass(&mut self, now_ms: u64, inputs: GateInputs) -> bool {
        if now_ms < self.cooldown_until_ms {
            return false;
        }
        if self.attention < self.config.attention_threshold {
            return false;
        }
        if inputs.stability < self.config.stability_threshold {
            return false;
        }
        if inputs.deviation_count < self.config.deviation_threshold {
            return false;
        }
        if inputs.visual_noise < self.config.noise_min
            || inputs.visual_noise > self.config.noise_max
        {
            return false;
        }
        self.rng.gen::<f64>() < self.attention * self.config.trigger_scale
    }

    fn draw_event(&mut self, now_ms: u64) -> AnomalyEvent {
        let kind = ALL_KINDS[self.rng.gen_range(0..ALL_KINDS.len())];
        let (x, y) = self.draw_position();
        let duration_ms = self
            .rng
            .gen_range(self.config.duration_min_ms..=self.config.duration_max_ms);
        let intensity = self
            .rng
            .gen_range(self.config.intensity_min..=self.config.intensity_max);
        let note = NOTE_POOL[self.rng.gen_range(0..NOTE_POOL.len())].to_string();

        self.last_position = Some((x, y));
        let id = self.next_id;
        self.next_id += 1;
        AnomalyEvent {
            id,
            timestamp_ms: now_ms,
            kind,
            x,
            y,
            duration_ms,
            intensity,
            note,
        }
    }

    /// Uniform draw in the position band, re-drawn when it lands on top of
    /// the previous anomaly. Bounded retries; repetition beats a livelock.
    fn draw_position(&mut self) -> (f64, f64) {
        let min = self.config.position_min;
        let max = self.config.position_max;
        let mut x = self.rng.gen_range(min..=max);
        let mut y = self.rng.gen_range(min..=max);
        if let Some((px, py)) = self.last_position {
            for _ in 0..100 {
                if (x - px).abs() >= self.config.min_separation
                    || (y - py).abs() >= self.config.min_separation
                {
                    break;
                }
                x = self.rng.gen_range(min..=max);
                y = self.rng.gen_range(min..=max);
            }
        }
        (x, y)
    }

    fn commit(&mut self, event: AnomalyEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        self.log.push(event);
    }

    /// Receive committed events. Slow subscribers drop events rather than
    /// blocking the tick.
    pub fn subscribe(&mut self) -> Receiver<AnomalyEvent> {
        let (tx, rx) = bounded(64);
        self.subscribers.push(tx);
        rx
    }

    /// Cancel any staged delays and hide the current event. Attention and
    /// the committed log survive; the uncommitted event is discarded.
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.staged = None;
        self.current = None;
    }

    pub fn current_anomaly(&self) -> Option<&AnomalyEvent> {
        self.current.as_ref()
    }

    pub fn attention_level(&self) -> f64 {
        self.attention
    }

    pub fn log(&self) -> &[AnomalyEvent] {
        &self.log
    }

    /// Seed the committed log from a persisted session.
    pub fn restore_log(&mut self, events: Vec<AnomalyEvent>) {
        self.next_id = events.iter().map(|e| e.id + 1).max().unwrap_or(1);
        self.log = events;
    }

    pub fn is_idle(&self) -> bool {
        self.state == GateState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn passing_inputs() -> GateInputs {
        GateInputs {
            stability: 0.9,
            deviation_count: 3,
            visual_noise: 0.3,
        }
    }

    fn eager_config() -> GateConfig {
        // Deterministic trigger once attention clears its threshold.
        GateConfig {
            trigger_scale: 10.0,
            ..GateConfig::default()
        }
    }

    fn gate(config: GateConfig, seed: u64) -> AnomalyGate {
        AnomalyGate::new(config, StdRng::seed_from_u64(seed))
    }

    /// Tick until attention passes the threshold, on the 500 ms cadence.
    fn warm_up(g: &mut AnomalyGate, inputs: GateInputs, mut now: u64) -> u64 {
        for _ in 0..200 {
            if !g.is_idle() {
                break;
            }
            now += 500;
            g.tick(now, inputs);
        }
        now
    }

    #[test]
    fn test_attention_accrues_only_while_idle() {
        let mut g = gate(GateConfig::default(), 1);
        let calm = GateInputs {
            stability: 0.0,
            deviation_count: 0,
            visual_noise: 0.0,
        };
        for i in 0..10 {
            g.tick(i * 500, calm);
        }
        assert!((g.attention_level() - 0.04).abs() < 1e-9);
        assert!(g.current_anomaly().is_none());
    }

    #[test]
    fn test_no_trigger_when_any_gate_fails() {
        let cases = [
            GateInputs { stability: 0.5, deviation_count: 3, visual_noise: 0.3 },
            GateInputs { stability: 0.9, deviation_count: 1, visual_noise: 0.3 },
            GateInputs { stability: 0.9, deviation_count: 3, visual_noise: 0.05 },
            GateInputs { stability: 0.9, deviation_count: 3, visual_noise: 0.9 },
        ];
        for inputs in cases {
            let mut g = gate(eager_config(), 2);
            for i in 0..400 {
                g.tick(i * 500, inputs);
            }
            assert!(g.is_idle(), "gate fired on {:?}", inputs);
            assert!(g.log().is_empty());
        }
    }

    #[test]
    fn test_full_cycle_commits_event() {
        let mut g = gate(eager_config(), 3);
        let rx = g.subscribe();
        let mut now = warm_up(&mut g, passing_inputs(), 0);
        assert!(!g.is_idle(), "never triggered");

        let mut seen_visible = false;
        for _ in 0..20 {
            now += 500;
            g.tick(now, passing_inputs());
            if g.current_anomaly().is_some() {
                seen_visible = true;
            }
            if !g.log().is_empty() {
                break;
            }
        }
        assert!(seen_visible, "event never became visible");
        assert_eq!(g.log().len(), 1);
        assert!(g.current_anomaly().is_none());

        let event = &g.log()[0];
        assert!(event.x >= 20.0 && event.x <= 80.0);
        assert!(event.y >= 20.0 && event.y <= 80.0);
        assert!(event.duration_ms >= 700 && event.duration_ms <= 1100);
        assert!(event.intensity >= 0.18 && event.intensity <= 0.42);
        assert!(NOTE_POOL.contains(&event.note.as_str()));
        assert_eq!(rx.try_recv().unwrap(), *event);
    }

    #[test]
    fn test_cooldown_and_attention_drop_after_cycle() {
        let mut g = gate(eager_config(), 4);
        let mut now = warm_up(&mut g, passing_inputs(), 0);
        let attention_before = g.attention_level();
        while g.log().is_empty() {
            now += 500;
            g.tick(now, passing_inputs());
        }
        assert!(g.attention_level() < attention_before);
        assert!(g.attention_level() >= 0.1);

        // Cooldown holds for at least 90 s even with perfect inputs.
        for _ in 0..170 {
            now += 500;
            g.tick(now, passing_inputs());
            assert!(g.is_idle());
        }
    }

    #[test]
    fn test_consecutive_positions_are_separated() {
        let config = GateConfig {
            trigger_scale: 10.0,
            cooldown_min_ms: 0,
            cooldown_max_ms: 1,
            attention_drop: 0.0,
            ..GateConfig::default()
        };
        let mut g = gate(config, 5);
        let mut now = 0;
        while g.log().len() < 8 {
            now += 500;
            g.tick(now, passing_inputs());
        }
        for pair in g.log().windows(2) {
            let dx = (pair[1].x - pair[0].x).abs();
            let dy = (pair[1].y - pair[0].y).abs();
            assert!(
                dx >= 20.0 || dy >= 20.0,
                "events {:?} and {:?} overlap",
                (pair[0].x, pair[0].y),
                (pair[1].x, pair[1].y)
            );
        }
    }

    #[test]
    fn test_reset_cancels_staged_event() {
        let mut g = gate(eager_config(), 6);
        let mut now = warm_up(&mut g, passing_inputs(), 0);
        assert!(!g.is_idle());
        g.reset();
        assert!(g.is_idle());
        assert!(g.current_anomaly().is_none());
        // Ticks long after the staged deadlines commit nothing.
        let calm = GateInputs {
            stability: 0.0,
            deviation_count: 0,
            visual_noise: 0.0,
        };
        for _ in 0..10 {
            now += 500;
            g.tick(now + 1_000_000, calm);
        }
        assert!(g.log().is_empty());
    }

    #[test]
    fn test_restore_log_continues_ids() {
        let mut g = gate(eager_config(), 7);
        g.restore_log(vec![AnomalyEvent {
            id: 41,
            timestamp_ms: 0,
            kind: AnomalyKind::Shadow,
            x: 30.0,
            y: 30.0,
            duration_ms: 800,
            intensity: 0.2,
            note: NOTE_POOL[0].to_string(),
        }]);
        let mut now = warm_up(&mut g, passing_inputs(), 0);
        while g.log().len() < 2 {
            now += 500;
            g.tick(now, passing_inputs());
        }
        assert_eq!(g.log()[1].id, 42);
    }
}
