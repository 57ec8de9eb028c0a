//! ═══════════════════════════════════════════════════════════════════════════════
//! SPECTRAL — Command-Line Entry Point
//! ═══════════════════════════════════════════════════════════════════════════════
//! Demo driver for the engine: a synthetic handheld scan, or a replay of a
//! recorded sensor trace (JSON lines of `{ "t_ms": .., "sample": .. }`).
//! ═══════════════════════════════════════════════════════════════════════════════

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use spectral_core::config::EngineConfig;
use spectral_core::engine::Engine;
use spectral_core::sensors::SensorSample;
use spectral_core::visual::NoCamera;
use spectral_core::EngineError;

#[derive(Parser)]
#[command(name = "spectral")]
#[command(about = "Spectral Core - handheld anomaly scanner", long_about = None)]
struct Cli {
    /// Optional JSON config file; defaults apply when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic scan with simulated device motion
    Scan {
        /// Scan length in seconds
        #[arg(short, long, default_value = "60")]
        seconds: u64,

        /// RNG seed (same seed, same session)
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Replay a recorded sensor trace through the engine
    Replay {
        /// Path to the JSON-lines trace
        path: PathBuf,

        /// RNG seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(Deserialize)]
struct TraceRecord {
    t_ms: u64,
    sample: SensorSample,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Scan { seconds, seed } => run_scan(config, seconds, seed),
        Commands::Replay { path, seed } => run_replay(config, &path, seed),
    }
}

/// Synthesize a plausible handheld session: mostly-still device, slow
/// heading wander, occasional deliberate shakes.
fn run_scan(config: EngineConfig, seconds: u64, seed: u64) -> Result<()> {
    let mut engine = Engine::new(config, seed, Box::new(NoCamera))?;
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    engine.start(0);

    let mut alpha: f64 = 0.0;
    let mut last_status = "";
    let mut last_anomaly_id = 0;
    let total_frames = seconds * 1000 / 16;

    for frame in 0..total_frames {
        let now_ms = frame * 16;

        // ~10 Hz sensor delivery
        if frame % 6 == 0 {
            let shaking = rng.gen::<f64>() < 0.01;
            let wobble = if shaking { 20.0 } else { 0.3 };
            engine.ingest(SensorSample::Motion {
                x: (rng.gen::<f64>() - 0.5) * wobble,
                y: (rng.gen::<f64>() - 0.5) * wobble,
                z: 9.8 + (rng.gen::<f64>() - 0.5) * wobble,
            });
            alpha = (alpha + (rng.gen::<f64>() - 0.5) * 4.0).rem_euclid(360.0);
            engine.ingest(SensorSample::Orientation {
                alpha,
                beta: (rng.gen::<f64>() - 0.5) * 10.0,
                gamma: (rng.gen::<f64>() - 0.5) * 10.0,
            });
        }

        engine.advance(now_ms);

        let snapshot = engine.snapshot();
        if snapshot.status != last_status {
            last_status = snapshot.status;
            println!(
                "[{:>6.1}s] reading {:5.1}  {}",
                now_ms as f64 / 1000.0,
                snapshot.field_reading,
                snapshot.status
            );
        }
        if let Some(anomaly) = snapshot.current_anomaly.as_ref().filter(|a| a.id != last_anomaly_id) {
            last_anomaly_id = anomaly.id;
            println!(
                "[{:>6.1}s] anomaly {:?} at ({:.0}, {:.0}) — {}",
                now_ms as f64 / 1000.0,
                anomaly.kind,
                anomaly.x,
                anomaly.y,
                anomaly.note
            );
        }
    }

    engine.stop();
    let snapshot = engine.snapshot();
    println!("\nscan complete:");
    println!("  highest reading : {:.1}", snapshot.highest_field_reading);
    println!("  detections      : {}", engine.detections_log().len());
    println!("  anomalies logged: {}", engine.anomaly_log().len());
    Ok(())
}

fn run_replay(config: EngineConfig, path: &PathBuf, seed: u64) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace {}", path.display()))?;

    let mut records = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: TraceRecord = serde_json::from_str(line)
            .map_err(|e| EngineError::Trace(format!("line {}: {}", number + 1, e)))?;
        records.push(record);
    }
    if records.is_empty() {
        return Err(EngineError::Trace("trace contains no samples".into()).into());
    }

    let mut engine = Engine::new(config, seed, Box::new(NoCamera))?;
    engine.start(0);

    let end_ms = records.last().map(|r| r.t_ms).unwrap_or(0);
    let mut cursor = 0;
    let mut now_ms = 0;
    while now_ms <= end_ms {
        while cursor < records.len() && records[cursor].t_ms <= now_ms {
            engine.ingest(records[cursor].sample);
            cursor += 1;
        }
        engine.advance(now_ms);
        now_ms += 16;
    }
    engine.stop();

    let snapshot = engine.snapshot();
    println!("replayed {} samples over {:.1}s", records.len(), end_ms as f64 / 1000.0);
    println!("  final reading   : {:.1}", snapshot.field_reading);
    println!("  highest reading : {:.1}", snapshot.highest_field_reading);
    println!("  detections      : {}", engine.detections_log().len());
    println!("  anomalies logged: {}", engine.anomaly_log().len());
    Ok(())
}
