//! ═══════════════════════════════════════════════════════════════════════════════
//! ENTITY — Apparition Simulation
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Integrates a small swarm of on-screen entities against device tilt, the
//! field reading and the current scene geometry. The caller owns the logical
//! detection list; `sync` keeps the simulated set in 1:1 correspondence and
//! `tick` advances physics once per animation frame (~16 ms).
//!
//! Everything visual about an entity (bob, limbs, blink, mouth) is computed
//! deterministically from its motion state and the field reading, so two
//! runs with the same seed and inputs render identically.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::f64::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PhysicsConfig;
use crate::scene::{find_nearest_anchor, occlusion_level, revalidate_anchor, AnchorRef, SceneObject};
use crate::sensors::Tilt;

/// Reading at which entities visibly panic
const SHOCK_THRESHOLD: f64 = 75.0;
const SHOCK_MOUTH_OPEN: f64 = 0.9;
const SHOCK_LIMB_BOOST: f64 = 0.6;
/// Shock influence on the blended mouth value
const SHOCK_BLEND: f64 = 0.8;

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-owned logical detection. The simulator never creates or removes
/// these; it mirrors them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub contained: bool,
    /// 0..1, how erratic this entity should look
    pub instability: f64,
}

/// One simulated entity. Position and velocity in viewport percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEntity {
    pub id: String,
    pub contained: bool,
    pub instability: f64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub ax: f64,
    pub ay: f64,
    pub anchor: Option<AnchorRef>,
    pub occlusion_level: f64,
    pub occluded: bool,
    /// True only on the frame a geometry contact begins
    pub is_interacting: bool,
    // Cosmetic animation state
    pub bob_phase: f64,
    pub scale: f64,
    pub rotation: f64,
    pub limb_angles: [f64; 4],
    pub blink: f64,
    pub mouth_open: f64,
    #[serde(skip)]
    in_contact: bool,
    #[serde(skip)]
    last_interaction_ms: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct EntitySimulator {
    config: PhysicsConfig,
    rng: StdRng,
    scene: Vec<SceneObject>,
    entities: Vec<SimEntity>,
    targeted_id: Option<String>,
}

impl EntitySimulator {
    pub fn new(config: PhysicsConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            scene: Vec::new(),
            entities: Vec::new(),
            targeted_id: None,
        }
    }

    /// Install a fresh scene snapshot. Anchors hold indices into the old
    /// snapshot, so each one is re-resolved or dropped here.
    pub fn set_scene(&mut self, objects: Vec<SceneObject>) {
        self.scene = objects;
        for entity in &mut self.entities {
            entity.anchor = entity
                .anchor
                .and_then(|anchor| revalidate_anchor(&anchor, &self.scene));
        }
    }

    /// Reconcile the live set with the caller's detection list: keep
    /// survivors in their existing order, spawn newcomers in list order,
    /// drop the rest. Duplicate ids resolve to the last record.
    pub fn sync(&mut self, detections: &[Detection]) {
        let find = |id: &str| detections.iter().rev().find(|d| d.id == id);

        self.entities.retain(|e| find(&e.id).is_some());
        for entity in &mut self.entities {
            if let Some(detection) = find(&entity.id) {
                entity.contained = detection.contained;
                entity.instability = detection.instability;
            }
        }

        for detection in detections {
            if self.entities.iter().any(|e| e.id == detection.id) {
                continue;
            }
            let record = find(&detection.id).unwrap_or(detection);
            let entity = self.spawn(record);
            self.entities.push(entity);
        }
    }

    /// Place a new entity: usually near scene geometry, otherwise in the
    /// viewport periphery so it does not pop into the player's face.
    fn spawn(&mut self, detection: &Detection) -> SimEntity {
        let near_object = !self.scene.is_empty()
            && self.rng.gen::<f64>() < self.config.spawn_near_object_chance;

        let (x, y) = if near_object {
            let vertices: Vec<(f64, f64)> = self
                .scene
                .iter()
                .flat_map(|o| o.polylines.iter())
                .flat_map(|p| p.iter())
                .map(|p| (p.x, p.y))
                .collect();
            let (vx, vy) = vertices[self.rng.gen_range(0..vertices.len())];
            let jitter = self.config.spawn_jitter;
            (
                (vx + self.rng.gen_range(-jitter..=jitter)).clamp(5.0, 95.0),
                (vy + self.rng.gen_range(-jitter..=jitter)).clamp(5.0, 95.0),
            )
        } else {
            // Reject draws landing in the central stage
            let mut x = self.rng.gen_range(5.0..=95.0);
            let mut y = self.rng.gen_range(5.0..=95.0);
            for _ in 0..32 {
                if !(35.0..=65.0).contains(&x) || !(35.0..=65.0).contains(&y) {
                    break;
                }
                x = self.rng.gen_range(5.0..=95.0);
                y = self.rng.gen_range(5.0..=95.0);
            }
            (x, y)
        };

        let anchor = find_nearest_anchor(&self.scene, x, y);

        SimEntity {
            id: detection.id.clone(),
            contained: detection.contained,
            instability: detection.instability,
            x,
            y,
            vx: (self.rng.gen::<f64>() - 0.5) * 0.05,
            vy: (self.rng.gen::<f64>() - 0.5) * 0.05,
            ax: 0.0,
            ay: 0.0,
            anchor,
            occlusion_level: 0.0,
            occluded: false,
            is_interacting: false,
            bob_phase: 0.0,
            scale: 1.0,
            rotation: 0.0,
            limb_angles: [0.0; 4],
            blink: 0.0,
            mouth_open: 0.0,
            in_contact: false,
            last_interaction_ms: 0,
        }
    }

    /// Advance every entity one frame.
    pub fn tick(&mut self, now_ms: u64, tilt: Tilt, field_reading: f64) {
        let config = &self.config;
        let scene = &self.scene;
        let rng = &mut self.rng;

        for e in &mut self.entities {
            if e.contained {
                // Contained entities just bleed off velocity.
                e.vx *= config.contained_drag;
                e.vy *= config.contained_drag;
                e.x += e.vx;
                e.y += e.vy;
                e.ax = 0.0;
                e.ay = 0.0;
                e.is_interacting = false;
            } else {
                let mut ax = tilt.gravity_x * config.gravity_tilt;
                let mut ay = tilt.gravity_y * config.gravity_tilt + config.downward_drift;

                if let Some(anchor) = &e.anchor {
                    let rest_x = anchor.base_x + anchor.offset_x;
                    let rest_y = anchor.base_y + anchor.offset_y;
                    ax += (rest_x - e.x) * config.anchor_spring;
                    ay += (rest_y - e.y) * config.anchor_spring;
                    e.vx *= config.anchor_damping;
                    e.vy *= config.anchor_damping;
                }

                let agitation = field_reading * config.field_agitation;
                ax += (rng.gen::<f64>() - 0.5) * agitation;
                ay += (rng.gen::<f64>() - 0.5) * agitation;

                // Vertex repulsion, capped by construction at the gain
                let mut touching = false;
                for object in scene {
                    for polyline in &object.polylines {
                        for point in polyline {
                            let dx = e.x - point.x;
                            let dy = e.y - point.y;
                            let dist = (dx * dx + dy * dy).sqrt();
                            if dist < config.repulsion_radius {
                                touching = true;
                                let strength = config.scene_repulsion
                                    * (1.0 - dist / config.repulsion_radius);
                                let safe = dist.max(0.5);
                                ax += dx / safe * strength;
                                ay += dy / safe * strength;
                            }
                        }
                    }
                }
                e.is_interacting = touching
                    && !e.in_contact
                    && now_ms.saturating_sub(e.last_interaction_ms)
                        >= config.interaction_cooldown_ms;
                if e.is_interacting {
                    e.last_interaction_ms = now_ms;
                }
                e.in_contact = touching;

                e.vx += ax;
                e.vy += ay;
                e.vx *= config.friction;
                e.vy *= config.friction;
                let speed = (e.vx * e.vx + e.vy * e.vy).sqrt();
                if speed > config.max_speed {
                    e.vx = e.vx / speed * config.max_speed;
                    e.vy = e.vy / speed * config.max_speed;
                }
                e.x += e.vx;
                e.y += e.vy;

                if let Some(anchor) = &e.anchor {
                    e.x += tilt.gravity_x * config.parallax / anchor.depth;
                    e.y += tilt.gravity_y * config.parallax / anchor.depth;
                }
                e.ax = ax;
                e.ay = ay;

                // Fell off the world: respawn at the top edge
                if e.y > 105.0 || e.x < -5.0 || e.x > 105.0 {
                    e.x = rng.gen::<f64>() * 80.0 + 10.0;
                    e.y = -5.0;
                    e.vx = (rng.gen::<f64>() - 0.5) * 0.02;
                    e.vy = rng.gen::<f64>() * 0.05;
                    e.anchor = find_nearest_anchor(scene, e.x, e.y);
                }
            }

            if let Some(anchor) = &e.anchor {
                e.occlusion_level = occlusion_level(anchor, scene);
            } else {
                e.occlusion_level = 0.0;
            }
            e.occluded = e.occlusion_level > 0.25;

            Self::animate(e, field_reading, config.max_speed);
        }

        // Target the entity closest to the focal point, if close enough
        let mut best: Option<(f64, &SimEntity)> = None;
        for e in &self.entities {
            let dx = e.x - config.focal_x;
            let dy = e.y - config.focal_y;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < config.target_radius && best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, e));
            }
        }
        self.targeted_id = best.map(|(_, e)| e.id.clone());
    }

    /// Cosmetic state: a pure function of motion, instability and the
    /// field reading.
    fn animate(e: &mut SimEntity, field_reading: f64, max_speed: f64) {
        let speed = (e.vx * e.vx + e.vy * e.vy).sqrt();
        e.bob_phase = (e.bob_phase + 0.05 + speed * 0.8) % TAU;
        e.scale = 1.0 + 0.05 * e.bob_phase.sin();
        e.rotation = e.vx * 40.0;

        let shocked = field_reading >= SHOCK_THRESHOLD;
        let mut swing = (speed / max_speed).clamp(0.0, 1.0) * 0.6 + e.instability * 0.4;
        if shocked {
            swing += SHOCK_LIMB_BOOST;
        }
        for (i, angle) in e.limb_angles.iter_mut().enumerate() {
            *angle = swing * (e.bob_phase + i as f64 * PI / 2.0).sin();
        }

        e.blink = if (e.bob_phase * 1.7).sin() > 0.95 { 1.0 } else { 0.0 };
        let base_mouth = 0.15 + 0.2 * (0.5 + 0.5 * e.bob_phase.sin());
        let shock_mouth = if shocked { SHOCK_MOUTH_OPEN } else { 0.0 };
        e.mouth_open = (base_mouth + shock_mouth * SHOCK_BLEND).clamp(0.0, 1.0);
    }

    pub fn entities(&self) -> &[SimEntity] {
        &self.entities
    }

    pub fn targeted(&self) -> Option<&SimEntity> {
        let id = self.targeted_id.as_deref()?;
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn scene(&self) -> &[SceneObject] {
        &self.scene
    }
}
