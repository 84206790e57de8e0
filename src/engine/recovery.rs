// Recovery chain: produces a corrected distance after a reset event
//
// Four strategies tried strictly in order; the first success wins and the
// final fallback cannot fail, so every event resolves to a usable value.
// Strategy failure is an expected branch, not an error: each strategy
// returns a tagged result and the chain simply moves on.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::Serialize;
use snafu::Snafu;

use crate::config::EngineConfig;
use crate::engine::detector::ResetEvent;
use crate::engine::history::DistanceHistory;
use crate::engine::preliminary::kmh_to_ms;
use crate::samples::{geodetic_distance_m, SampleStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    SpeedIntegration,
    GpsRecovery,
    LinearInterpolation,
    Fallback,
}

impl RecoveryMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SpeedIntegration => "speed_integration",
            Self::GpsRecovery => "gps_recovery",
            Self::LinearInterpolation => "linear_interpolation",
            Self::Fallback => "fallback",
        }
    }
}

/// Why a single strategy declined to produce a value.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum RecoveryFailure {
    #[snafu(display("insufficient data: {what}"))]
    InsufficientData { what: &'static str },
    #[snafu(display("unrealistic result"))]
    ImplausibleResult,
    #[snafu(display("GPS distance invalid or too low"))]
    InvalidGpsDistance,
    #[snafu(display("time gap too large for interpolation"))]
    GapTooLarge,
    #[snafu(display("invalid time range in history"))]
    InvalidTimeRange,
}

/// The corrected distance for a reset event. Transient: only the resulting
/// history point outlives the call.
#[derive(Clone, Debug)]
pub struct Recovery {
    pub distance_m: f64,
    pub method: RecoveryMethod,
    pub confidence: f64,
    pub metadata: BTreeMap<String, f64>,
}

type Strategy =
    fn(&EngineConfig, &SampleStore, &DistanceHistory, &ResetEvent) -> Result<Recovery, RecoveryFailure>;

/// Resolves `event` to a corrected distance. Never fails: the terminal
/// fallback strategy always produces a value.
pub(crate) fn recover(
    config: &EngineConfig,
    store: &SampleStore,
    history: &DistanceHistory,
    event: &ResetEvent,
) -> Recovery {
    info!(
        "attempting distance recovery for vehicle {} at {}ms",
        event.vehicle_id, event.timestamp_ms
    );

    let chain: [(RecoveryMethod, Strategy); 3] = [
        (RecoveryMethod::SpeedIntegration, by_speed_integration),
        (RecoveryMethod::GpsRecovery, by_gps),
        (RecoveryMethod::LinearInterpolation, by_interpolation),
    ];

    for (method, strategy) in chain {
        match strategy(config, store, history, event) {
            Ok(recovery) => {
                info!(
                    "{} recovery successful for vehicle {}: {:.1}m",
                    method.name(),
                    event.vehicle_id,
                    recovery.distance_m
                );
                return recovery;
            }
            Err(failure) => {
                debug!(
                    "{} recovery declined for vehicle {}: {failure}",
                    method.name(),
                    event.vehicle_id
                );
            }
        }
    }

    let recovery = by_fallback(history, event);
    warn!(
        "using fallback recovery for vehicle {}: {:.1}m",
        event.vehicle_id, recovery.distance_m
    );
    recovery
}

/// Strategy 1: re-integrate the speed trace from the last good history
/// point (the one before the flagged reading). Per-sample speeds are
/// clamped at the anomaly ceiling so a bad reading cannot compound. The
/// result must advance past the last good distance without tripling it.
fn by_speed_integration(
    config: &EngineConfig,
    store: &SampleStore,
    history: &DistanceHistory,
    event: &ResetEvent,
) -> Result<Recovery, RecoveryFailure> {
    let last_good = history
        .last_good()
        .ok_or(RecoveryFailure::InsufficientData { what: "history" })?;

    let window: Vec<_> = store
        .samples_up_to(event.vehicle_id, event.timestamp_ms)
        .iter()
        .filter(|s| s.timestamp_ms > last_good.timestamp_ms)
        .collect();
    if window.is_empty() {
        return Err(RecoveryFailure::InsufficientData { what: "speed samples" });
    }

    let mut recovered_m = last_good.meters;
    let mut prev_ms = last_good.timestamp_ms;
    let mut integration_points = 0usize;
    for sample in &window {
        let dt_s = sample.seconds_since(prev_ms);
        prev_ms = sample.timestamp_ms;

        if !sample.has_valid_speed() {
            continue;
        }
        let clamped_kmh = sample.speed_kmh.min(config.speed_anomaly_kmh);
        recovered_m += kmh_to_ms(clamped_kmh) * dt_s;
        integration_points += 1;
    }

    if recovered_m > last_good.meters && recovered_m < last_good.meters * 3.0 {
        let mut metadata = BTreeMap::new();
        metadata.insert("last_good_distance_m".to_string(), last_good.meters);
        metadata.insert("integration_points".to_string(), integration_points as f64);
        metadata.insert(
            "time_span_s".to_string(),
            (event.timestamp_ms as f64 - last_good.timestamp_ms as f64) / 1000.0,
        );
        return Ok(Recovery {
            distance_m: recovered_m,
            method: RecoveryMethod::SpeedIntegration,
            confidence: 0.9,
            metadata,
        });
    }

    Err(RecoveryFailure::ImplausibleResult)
}

/// Strategy 2: independent geodetic distance from session start. Accepted
/// only when it is positive and not wildly below the last known good value.
fn by_gps(
    _config: &EngineConfig,
    store: &SampleStore,
    history: &DistanceHistory,
    event: &ResetEvent,
) -> Result<Recovery, RecoveryFailure> {
    let gps_m = geodetic_distance_m(store.samples_up_to(event.vehicle_id, event.timestamp_ms));
    if gps_m <= 0.0 {
        return Err(RecoveryFailure::InvalidGpsDistance);
    }

    if let Some(last) = history.last() {
        if gps_m < last.meters * 0.5 {
            return Err(RecoveryFailure::InvalidGpsDistance);
        }
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("gps_distance_m".to_string(), gps_m);
    Ok(Recovery {
        distance_m: gps_m,
        method: RecoveryMethod::GpsRecovery,
        confidence: 0.8,
        metadata,
    })
}

/// Strategy 3: extrapolate from the average speed over the last three
/// accepted points. Declines on an implausible average or when the gap to
/// the event is too long to extrapolate honestly.
fn by_interpolation(
    config: &EngineConfig,
    _store: &SampleStore,
    history: &DistanceHistory,
    event: &ResetEvent,
) -> Result<Recovery, RecoveryFailure> {
    if history.len() < 3 {
        return Err(RecoveryFailure::InsufficientData { what: "history points" });
    }

    let recent = history.recent(3);
    let span_m = recent[2].meters - recent[0].meters;
    let span_s = (recent[2].timestamp_ms as f64 - recent[0].timestamp_ms as f64) / 1000.0;
    if span_s <= 0.0 {
        return Err(RecoveryFailure::InvalidTimeRange);
    }

    let avg_speed_ms = span_m / span_s;
    let avg_speed_kmh = avg_speed_ms * 3.6;
    if avg_speed_kmh > config.speed_anomaly_kmh || avg_speed_kmh < 0.0 {
        return Err(RecoveryFailure::ImplausibleResult);
    }

    let last = recent[2];
    let gap_s = (event.timestamp_ms as f64 - last.timestamp_ms as f64) / 1000.0;
    if gap_s > config.interpolation_max_gap_secs {
        return Err(RecoveryFailure::GapTooLarge);
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("avg_speed_kmh".to_string(), avg_speed_kmh);
    metadata.insert("time_gap_s".to_string(), gap_s);
    Ok(Recovery {
        distance_m: last.meters + avg_speed_ms * gap_s,
        method: RecoveryMethod::LinearInterpolation,
        confidence: 0.7,
        metadata,
    })
}

/// Strategy 4: hold the last good distance. Always succeeds.
fn by_fallback(history: &DistanceHistory, event: &ResetEvent) -> Recovery {
    let distance_m = history
        .last_good()
        .or_else(|| history.last())
        .map(|p| p.meters)
        .unwrap_or(event.previous_distance_m);

    let mut metadata = BTreeMap::new();
    metadata.insert("rejected_distance_m".to_string(), event.preliminary_distance_m);
    Recovery {
        distance_m,
        method: RecoveryMethod::Fallback,
        confidence: 0.5,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::detector::ResetType;
    use crate::engine::history::DistancePoint;
    use crate::samples::TelemetrySample;

    fn event_at(timestamp_ms: u64, previous_m: f64, preliminary_m: f64) -> ResetEvent {
        ResetEvent {
            vehicle_id: 1,
            timestamp_ms,
            previous_distance_m: previous_m,
            preliminary_distance_m: preliminary_m,
            drop_pct: 0.0,
            reset_type: ResetType::DistanceDrop,
            recovery_method: None,
            confidence: 1.0,
            details: BTreeMap::new(),
        }
    }

    fn history_with(points: &[(u64, f64)]) -> DistanceHistory {
        let mut history = DistanceHistory::new(1000);
        for (timestamp_ms, meters) in points {
            history.push(DistancePoint {
                timestamp_ms: *timestamp_ms,
                meters: *meters,
            });
        }
        history
    }

    fn speed_sample(timestamp_ms: u64, speed_kmh: f64) -> TelemetrySample {
        TelemetrySample {
            vehicle_id: 1,
            timestamp_ms,
            lat: f64::NAN,
            lon: f64::NAN,
            x: 0.0,
            y: 0.0,
            speed_kmh,
        }
    }

    fn gps_sample(timestamp_ms: u64, lat: f64, lon: f64) -> TelemetrySample {
        TelemetrySample {
            vehicle_id: 1,
            timestamp_ms,
            lat,
            lon,
            x: 0.0,
            y: 0.0,
            speed_kmh: f64::NAN,
        }
    }

    #[test]
    fn test_speed_integration_recovers_from_last_good() {
        // last good at t=10s, 1000m; flagged reading at t=12s
        let history = history_with(&[(10_000, 1000.0), (11_000, 1025.0)]);
        let mut store = SampleStore::new();
        // 90 km/h = 25 m/s for the two seconds after the good point
        store.push(speed_sample(11_000, 90.0));
        store.push(speed_sample(12_000, 90.0));

        let event = event_at(12_000, 1025.0, 50.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::SpeedIntegration);
        assert!((recovery.distance_m - 1050.0).abs() < 1e-9, "got {}", recovery.distance_m);
        assert_eq!(recovery.confidence, 0.9);
    }

    #[test]
    fn test_speed_integration_clamps_anomalous_speeds() {
        let history = history_with(&[(10_000, 1000.0), (11_000, 1025.0)]);
        let mut store = SampleStore::new();
        store.push(speed_sample(11_000, 900.0)); // clamped to 150 km/h
        store.push(speed_sample(12_000, 900.0));

        let event = event_at(12_000, 1025.0, 50.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::SpeedIntegration);
        // 150 km/h = 41.67 m/s over 2s on top of 1000m
        let expected = 1000.0 + 150.0 * 1000.0 / 3600.0 * 2.0;
        assert!((recovery.distance_m - expected).abs() < 1e-9);
    }

    #[test]
    fn test_speed_integration_preferred_over_viable_gps() {
        // Both strategy 1 and strategy 2 would succeed with different
        // values; the chain must return the speed integration result.
        let history = history_with(&[(10_000, 1000.0), (11_000, 1025.0)]);
        let mut store = SampleStore::new();
        let mut s1 = speed_sample(11_000, 90.0);
        s1.lat = 45.0;
        s1.lon = 7.0;
        let mut s2 = speed_sample(12_000, 90.0);
        s2.lat = 45.02; // ~2224m geodetic, within [0.5x, inf) of history
        s2.lon = 7.0;
        store.push(s1);
        store.push(s2);

        let event = event_at(12_000, 1025.0, 50.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::SpeedIntegration);
        assert!((recovery.distance_m - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrealistic_integration_falls_through_to_gps() {
        // Integration would more than triple the last good distance
        let history = history_with(&[(10_000, 100.0), (11_000, 125.0)]);
        let mut store = SampleStore::new();
        let mut s1 = gps_sample(11_000, 45.0, 7.0);
        s1.speed_kmh = 150.0;
        store.push(s1);
        let mut s2 = gps_sample(21_000, 45.002, 7.0); // ~222m geodetic
        s2.speed_kmh = 150.0;
        store.push(s2);

        // 150 km/h over 11s = ~458m on top of 100m -> >3x, rejected
        let event = event_at(21_000, 125.0, 10.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::GpsRecovery);
        assert!((recovery.distance_m - 222.4).abs() < 1.0, "got {}", recovery.distance_m);
        assert_eq!(recovery.confidence, 0.8);
    }

    #[test]
    fn test_gps_too_low_falls_through_to_interpolation() {
        // steady 10 m/s over the last three accepted points
        let history = history_with(&[(10_000, 1000.0), (11_000, 1010.0), (12_000, 1020.0)]);
        let mut store = SampleStore::new();
        // geodetic reference ~111m, far below 0.5 * 1020m
        store.push(gps_sample(11_000, 45.0, 7.0));
        store.push(gps_sample(12_000, 45.001, 7.0));

        let event = event_at(14_000, 1020.0, 50.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::LinearInterpolation);
        // 1020m + 10 m/s * 2s
        assert!((recovery.distance_m - 1040.0).abs() < 1e-9, "got {}", recovery.distance_m);
        assert_eq!(recovery.confidence, 0.7);
    }

    #[test]
    fn test_interpolation_rejects_large_gap() {
        let history = history_with(&[(10_000, 1000.0), (11_000, 1010.0), (12_000, 1020.0)]);
        let store = SampleStore::new();

        // 61s past the last point exceeds the 60s interpolation gap
        let event = event_at(73_000, 1020.0, 50.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::Fallback);
    }

    #[test]
    fn test_fallback_uses_last_good_point() {
        let history = history_with(&[(10_000, 1000.0), (11_000, 1010.0)]);
        let store = SampleStore::new();

        let event = event_at(12_000, 1010.0, 0.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::Fallback);
        assert_eq!(recovery.distance_m, 1000.0);
        assert_eq!(recovery.confidence, 0.5);
    }

    #[test]
    fn test_fallback_without_history_uses_event_previous() {
        let history = DistanceHistory::new(1000);
        let store = SampleStore::new();

        let event = event_at(12_000, 875.0, 0.0);
        let recovery = recover(&EngineConfig::default(), &store, &history, &event);
        assert_eq!(recovery.method, RecoveryMethod::Fallback);
        assert_eq!(recovery.distance_m, 875.0);
    }
}
