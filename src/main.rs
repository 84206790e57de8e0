use std::{
    path::PathBuf,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::info;

use trackline::replay::{load_session, session_end_ms, synchronized_start_ms};
use trackline::{DistanceEngine, EngineConfig, TracklineError};

const DEFAULT_TICK_MS: u64 = 1000;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded session through the distance engine
    Replay {
        /// JSON-lines telemetry files, one sample per line
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, default_value_t = DEFAULT_TICK_MS)]
        tick_ms: u64,

        /// Simulation speed factor; 0 replays as fast as possible
        #[arg(short, long, default_value_t = 0.0)]
        speed: f64,

        /// Engine configuration file; defaults are used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print a monitoring snapshot every N seconds while replaying
        #[arg(short, long, default_value_t = 0)]
        monitor_every_s: u64,
    },
    /// Summarize the vehicles and signal quality of a recorded session
    Inspect {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn engine_config(path: Option<&PathBuf>) -> Result<EngineConfig, TracklineError> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => {
            let config = EngineConfig::from_local_file().unwrap_or_default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn replay(
    inputs: &[PathBuf],
    tick_ms: u64,
    speed: f64,
    config_path: Option<&PathBuf>,
    monitor_every_s: u64,
) -> Result<(), TracklineError> {
    let config = engine_config(config_path)?;
    let store = load_session(inputs)?;
    let start = synchronized_start_ms(&store).ok_or(TracklineError::EmptySession)?;
    let end = session_end_ms(&store).ok_or(TracklineError::EmptySession)?;

    let engine = Arc::new(RwLock::new(DistanceEngine::new(config, store)?));
    let running = Arc::new(AtomicBool::new(true));

    // concurrent read-only monitoring, snapshots only
    if monitor_every_s > 0 {
        let engine = Arc::clone(&engine);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(monitor_every_s));
                let status = engine.read().expect("engine lock poisoned").monitoring_status();
                info!(
                    "monitoring: {} resets, {} vehicles, avg call {:.4}s",
                    status.total_resets_detected,
                    status.vehicles_monitored,
                    status.avg_call_duration_s
                );
            }
        });
    }

    info!("replaying session from {start}ms to {end}ms at {tick_ms}ms per tick");
    let vehicles = engine.read().expect("engine lock poisoned").store().vehicles();
    let mut now = start;
    while now <= end && running.load(Ordering::Relaxed) {
        {
            let mut engine = engine.write().expect("engine lock poisoned");
            for vehicle_id in &vehicles {
                engine.distance_at(*vehicle_id, now);
            }
        }
        if speed > 0.0 {
            thread::sleep(Duration::from_millis((tick_ms as f64 / speed) as u64));
        }
        now += tick_ms;
    }
    running.store(false, Ordering::Relaxed);

    let engine = engine.read().expect("engine lock poisoned");
    let report = engine.monitoring_status();
    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("report is always serializable")
    );
    for vehicle_id in vehicles {
        let status = engine.vehicle_status(vehicle_id);
        println!(
            "{}",
            serde_json::to_string(&status).expect("report is always serializable")
        );
    }
    Ok(())
}

fn inspect(inputs: &[PathBuf]) -> Result<(), TracklineError> {
    let store = load_session(inputs)?;
    for vehicle_id in store.vehicles() {
        println!(
            "vehicle {vehicle_id}: {} records, {} with valid GPS, {}ms - {}ms",
            store.sample_count(vehicle_id),
            store.valid_gps_count(vehicle_id),
            store.first_timestamp_ms(vehicle_id).unwrap_or(0),
            store.last_timestamp_ms(vehicle_id).unwrap_or(0),
        );
    }
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    })
    .expect("Could not set Ctrl-C handler");

    match &cli.command {
        Commands::Replay {
            inputs,
            tick_ms,
            speed,
            config,
            monitor_every_s,
        } => replay(inputs, *tick_ms, *speed, config.as_ref(), *monitor_every_s)
            .expect("Error while replaying session"),
        Commands::Inspect { inputs } => {
            inspect(inputs).expect("Error while inspecting session")
        }
    };
}
