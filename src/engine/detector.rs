// Reset detection: compares a fresh preliminary estimate against the
// vehicle's accepted history and flags discontinuities

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::history::DistanceHistory;
use crate::engine::recovery::RecoveryMethod;
use crate::samples::{geodetic_distance_m, SampleStore};

/// Relative difference between the preliminary estimate and the independent
/// geodetic reference above which the two are considered inconsistent.
/// A flat percentage irrespective of session length; known to be prone to
/// over-triggering on long sessions where per-sample geodetic error
/// accumulates. Kept as-is deliberately.
const GPS_MISMATCH_PCT: f64 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetType {
    DistanceDrop,
    SpeedAnomaly,
    GpsMismatch,
}

/// A detected discontinuity in a vehicle's distance signal. Produced by the
/// detector, consumed by the recovery chain, then archived for monitoring.
#[derive(Clone, Debug, Serialize)]
pub struct ResetEvent {
    pub vehicle_id: u32,
    pub timestamp_ms: u64,
    pub previous_distance_m: f64,
    pub preliminary_distance_m: f64,
    /// Percentage drop for drop-type events, 0 otherwise
    pub drop_pct: f64,
    pub reset_type: ResetType,
    /// Filled in once the recovery chain has resolved the event
    pub recovery_method: Option<RecoveryMethod>,
    pub confidence: f64,
    pub details: BTreeMap<String, f64>,
}

/// Checks whether `preliminary_m` is consistent with the vehicle's history.
///
/// Returns the first matching anomaly, in fixed priority order: distance
/// drop, then speed anomaly, then GPS mismatch. An empty history or a gap
/// longer than the configured legitimate-interruption threshold yields no
/// event, and the caller records the point as-is.
pub(crate) fn detect(
    config: &EngineConfig,
    store: &SampleStore,
    history: &DistanceHistory,
    vehicle_id: u32,
    timestamp_ms: u64,
    preliminary_m: f64,
) -> Option<ResetEvent> {
    // No detection possible on the first reading
    let previous = history.last()?;
    let time_diff_s = (timestamp_ms as f64 - previous.timestamp_ms as f64) / 1000.0;

    // A long silence is a legitimate data interruption, not an anomaly
    if time_diff_s > config.large_gap_secs {
        warn!("large time gap for vehicle {vehicle_id}: {time_diff_s:.1}s");
        return None;
    }

    // Check 1: large distance drop
    if previous.meters > 0.0 && preliminary_m < previous.meters {
        let drop_m = previous.meters - preliminary_m;
        let drop_pct = drop_m / previous.meters * 100.0;

        if drop_pct > config.drop_threshold_pct {
            warn!(
                "distance drop detected for vehicle {vehicle_id}: {drop_pct:.1}% drop \
                 ({:.1}m -> {preliminary_m:.1}m)",
                previous.meters
            );
            let mut details = BTreeMap::new();
            details.insert("drop_m".to_string(), drop_m);
            details.insert("time_diff_s".to_string(), time_diff_s);
            details.insert("prev_timestamp_ms".to_string(), previous.timestamp_ms as f64);
            return Some(ResetEvent {
                vehicle_id,
                timestamp_ms,
                previous_distance_m: previous.meters,
                preliminary_distance_m: preliminary_m,
                drop_pct,
                reset_type: ResetType::DistanceDrop,
                recovery_method: None,
                confidence: (drop_pct / 100.0).min(1.0),
                details,
            });
        }
    }

    // Check 2: implied speed beyond the anomaly ceiling
    if time_diff_s > 0.0 {
        let distance_change_m = (preliminary_m - previous.meters).abs();
        let implied_speed_kmh = distance_change_m / time_diff_s * 3.6;

        if implied_speed_kmh > config.speed_anomaly_kmh {
            warn!(
                "speed anomaly detected for vehicle {vehicle_id}: \
                 implied speed {implied_speed_kmh:.1} km/h"
            );
            let mut details = BTreeMap::new();
            details.insert("implied_speed_kmh".to_string(), implied_speed_kmh);
            details.insert("time_diff_s".to_string(), time_diff_s);
            details.insert("distance_change_m".to_string(), distance_change_m);
            return Some(ResetEvent {
                vehicle_id,
                timestamp_ms,
                previous_distance_m: previous.meters,
                preliminary_distance_m: preliminary_m,
                drop_pct: 0.0,
                reset_type: ResetType::SpeedAnomaly,
                recovery_method: None,
                confidence: (implied_speed_kmh / 200.0).min(1.0),
                details,
            });
        }
    }

    // Check 3: preliminary estimate inconsistent with the geodetic reference
    let near_valid_fix = store
        .sample_nearest(vehicle_id, timestamp_ms)
        .is_some_and(|s| s.has_valid_position());
    if near_valid_fix {
        let gps_m = geodetic_distance_m(store.samples_up_to(vehicle_id, timestamp_ms));
        if gps_m > 0.0 {
            let diff_m = (preliminary_m - gps_m).abs();
            let diff_pct = diff_m / gps_m.max(1.0) * 100.0;

            if diff_pct > GPS_MISMATCH_PCT {
                warn!(
                    "GPS mismatch detected for vehicle {vehicle_id}: \
                     calculated {preliminary_m:.1}m vs GPS {gps_m:.1}m"
                );
                let mut details = BTreeMap::new();
                details.insert("gps_distance_m".to_string(), gps_m);
                details.insert("calculated_distance_m".to_string(), preliminary_m);
                details.insert("difference_m".to_string(), diff_m);
                return Some(ResetEvent {
                    vehicle_id,
                    timestamp_ms,
                    previous_distance_m: previous.meters,
                    preliminary_distance_m: preliminary_m,
                    drop_pct: diff_pct,
                    reset_type: ResetType::GpsMismatch,
                    recovery_method: None,
                    confidence: (diff_pct / 100.0).min(1.0),
                    details,
                });
            }
        }
    }

    None
}
