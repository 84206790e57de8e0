// Session replay: loads recorded telemetry from JSON-lines files and
// drives the engine's periodic update loop over simulated time

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde::Serialize;
use serde_jsonlines::json_lines;

use crate::engine::DistanceEngine;
use crate::errors::TracklineError;
use crate::samples::{SampleStore, TelemetrySample};

/// Reads one `TelemetrySample` per line from each file into a store.
/// Vehicles are identified by the `vehicle_id` field of the samples, so one
/// file per vehicle and a single combined file both work.
pub fn load_session<P: AsRef<Path>>(paths: &[P]) -> Result<SampleStore, TracklineError> {
    let mut store = SampleStore::new();
    let mut total = 0usize;

    for path in paths {
        let display = path.as_ref().display().to_string();
        let lines =
            json_lines::<TelemetrySample, _>(path).map_err(|e| TracklineError::SessionReadError {
                path: display.clone(),
                source: e,
            })?;
        let mut count = 0usize;
        for line in lines {
            let sample = line.map_err(|e| TracklineError::SessionReadError {
                path: display.clone(),
                source: e,
            })?;
            store.push(sample);
            count += 1;
        }
        info!("loaded {display}: {count} records");
        total += count;
    }

    if total == 0 {
        return Err(TracklineError::EmptySession);
    }

    for vehicle_id in store.vehicles() {
        info!(
            "vehicle {vehicle_id}: {} records, {} with valid GPS",
            store.sample_count(vehicle_id),
            store.valid_gps_count(vehicle_id)
        );
    }
    Ok(store)
}

/// Latest first-sample timestamp across vehicles. Starting every vehicle
/// here keeps the replay synchronized even when recordings began at
/// slightly different moments.
pub fn synchronized_start_ms(store: &SampleStore) -> Option<u64> {
    store
        .vehicles()
        .iter()
        .filter_map(|v| store.first_timestamp_ms(*v))
        .max()
}

pub fn session_end_ms(store: &SampleStore) -> Option<u64> {
    store
        .vehicles()
        .iter()
        .filter_map(|v| store.last_timestamp_ms(*v))
        .max()
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplaySummary {
    pub ticks: u64,
    pub final_distances_m: BTreeMap<u32, f64>,
}

/// Runs the whole session as fast as possible: one `distance_at` per
/// vehicle per tick from the synchronized start to the last sample.
pub fn replay_session(
    engine: &mut DistanceEngine,
    tick_ms: u64,
) -> Result<ReplaySummary, TracklineError> {
    let vehicles = engine.store().vehicles();
    let start = synchronized_start_ms(engine.store()).ok_or(TracklineError::EmptySession)?;
    let end = session_end_ms(engine.store()).ok_or(TracklineError::EmptySession)?;

    let mut ticks = 0u64;
    let mut now = start;
    while now <= end {
        for vehicle_id in &vehicles {
            engine.distance_at(*vehicle_id, now);
        }
        ticks += 1;
        now += tick_ms;
    }

    let final_distances_m = vehicles
        .iter()
        .map(|v| (*v, engine.vehicle_status(*v).current_distance_m))
        .collect();
    Ok(ReplaySummary {
        ticks,
        final_distances_m,
    })
}
