//! ═══════════════════════════════════════════════════════════════════════════════
//! SPECTRAL CORE — Ghost-Hunting Simulation Engine
//! ═══════════════════════════════════════════════════════════════════════════════
//! Sensor fusion, anomaly gating and entity simulation for a handheld
//! "paranormal detector". Everything here is synthetic by design; the point
//! is a convincing instrument, not a physical one.
//! ═══════════════════════════════════════════════════════════════════════════════

// Clippy configuration - intentional style choices:
#![allow(clippy::too_many_arguments)] // Physics steps take many tuned inputs
#![allow(clippy::excessive_precision)] // Tuned constants kept verbatim
#![allow(clippy::new_without_default)] // Components require config + rng

// ═══════════════════════════════════════════════════════════════════════════════
// FOUNDATION MODULES — primitives and contracts
// ═══════════════════════════════════════════════════════════════════════════════

pub mod config;
pub mod error;
pub mod sensors;
pub mod stats;

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE MODULES — leaves first
// ═══════════════════════════════════════════════════════════════════════════════

pub mod anomaly;
pub mod entity;
pub mod fusion;
pub mod scene;
pub mod status;
pub mod visual;

// ═══════════════════════════════════════════════════════════════════════════════
// WIRING
// ═══════════════════════════════════════════════════════════════════════════════

pub mod engine;

// Re-export common error types
pub use error::{EngineError, EngineResult};
