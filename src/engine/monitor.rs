// Reset/recovery bookkeeping and the read-only monitoring surface
//
// Everything exposed here is copied out into plain serializable structs so
// monitoring readers never hold a reference into the engine's mutable state.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::detector::{ResetEvent, ResetType};
use crate::engine::recovery::RecoveryMethod;

const RECENT_EVENTS_REPORTED: usize = 10;

#[derive(Clone, Debug, Default, Serialize)]
pub struct RecoveryStats {
    pub speed_integration: u64,
    pub gps_recovery: u64,
    pub linear_interpolation: u64,
    pub fallback: u64,
    pub total_resets: u64,
}

impl RecoveryStats {
    fn count_mut(&mut self, method: RecoveryMethod) -> &mut u64 {
        match method {
            RecoveryMethod::SpeedIntegration => &mut self.speed_integration,
            RecoveryMethod::GpsRecovery => &mut self.gps_recovery,
            RecoveryMethod::LinearInterpolation => &mut self.linear_interpolation,
            RecoveryMethod::Fallback => &mut self.fallback,
        }
    }

    fn count(&self, method: RecoveryMethod) -> u64 {
        match method {
            RecoveryMethod::SpeedIntegration => self.speed_integration,
            RecoveryMethod::GpsRecovery => self.gps_recovery,
            RecoveryMethod::LinearInterpolation => self.linear_interpolation,
            RecoveryMethod::Fallback => self.fallback,
        }
    }
}

#[derive(Debug, Default)]
struct VehicleResetStats {
    reset_count: u64,
    last_reset_ms: Option<u64>,
    methods_used: BTreeSet<RecoveryMethod>,
}

/// Archive of resolved reset events plus per-method counters. Bounded:
/// only the most recent events are retained, counters carry the totals.
#[derive(Debug)]
pub(crate) struct ResetMonitor {
    recent_events: VecDeque<ResetEvent>,
    retained: usize,
    stats: RecoveryStats,
    per_vehicle: HashMap<u32, VehicleResetStats>,
}

impl ResetMonitor {
    pub(crate) fn new(retained: usize) -> Self {
        Self {
            recent_events: VecDeque::new(),
            retained,
            stats: RecoveryStats::default(),
            per_vehicle: HashMap::new(),
        }
    }

    /// Archives a resolved event. `event.recovery_method` is expected to be
    /// filled in by the caller at this point.
    pub(crate) fn record(&mut self, event: ResetEvent) {
        self.stats.total_resets += 1;
        if let Some(method) = event.recovery_method {
            *self.stats.count_mut(method) += 1;
        }

        let vehicle = self.per_vehicle.entry(event.vehicle_id).or_default();
        vehicle.reset_count += 1;
        vehicle.last_reset_ms = Some(event.timestamp_ms);
        if let Some(method) = event.recovery_method {
            vehicle.methods_used.insert(method);
        }

        self.recent_events.push_back(event);
        while self.recent_events.len() > self.retained {
            self.recent_events.pop_front();
        }
    }

    pub(crate) fn stats(&self) -> &RecoveryStats {
        &self.stats
    }

    pub(crate) fn success_rates(&self) -> BTreeMap<String, f64> {
        let mut rates = BTreeMap::new();
        if self.stats.total_resets == 0 {
            return rates;
        }
        for method in [
            RecoveryMethod::SpeedIntegration,
            RecoveryMethod::GpsRecovery,
            RecoveryMethod::LinearInterpolation,
            RecoveryMethod::Fallback,
        ] {
            let rate = self.stats.count(method) as f64 / self.stats.total_resets as f64 * 100.0;
            rates.insert(method.name().to_string(), rate);
        }
        rates
    }

    pub(crate) fn recent_summaries(&self) -> Vec<ResetEventSummary> {
        let start = self.recent_events.len().saturating_sub(RECENT_EVENTS_REPORTED);
        self.recent_events
            .iter()
            .skip(start)
            .map(ResetEventSummary::from)
            .collect()
    }

    pub(crate) fn vehicle_reset_count(&self, vehicle_id: u32) -> u64 {
        self.per_vehicle
            .get(&vehicle_id)
            .map_or(0, |v| v.reset_count)
    }

    pub(crate) fn vehicle_last_reset_ms(&self, vehicle_id: u32) -> Option<u64> {
        self.per_vehicle.get(&vehicle_id)?.last_reset_ms
    }

    pub(crate) fn vehicle_methods_used(&self, vehicle_id: u32) -> Vec<RecoveryMethod> {
        self.per_vehicle
            .get(&vehicle_id)
            .map_or_else(Vec::new, |v| v.methods_used.iter().copied().collect())
    }

    pub(crate) fn clear(&mut self) {
        self.recent_events.clear();
        self.stats = RecoveryStats::default();
        self.per_vehicle.clear();
    }
}

/// Compact view of a reset event for status reports.
#[derive(Clone, Debug, Serialize)]
pub struct ResetEventSummary {
    pub vehicle_id: u32,
    pub timestamp_ms: u64,
    pub reset_type: ResetType,
    pub recovery_method: Option<RecoveryMethod>,
    pub drop_pct: f64,
    pub confidence: f64,
}

impl From<&ResetEvent> for ResetEventSummary {
    fn from(event: &ResetEvent) -> Self {
        Self {
            vehicle_id: event.vehicle_id,
            timestamp_ms: event.timestamp_ms,
            reset_type: event.reset_type,
            recovery_method: event.recovery_method,
            drop_pct: event.drop_pct,
            confidence: event.confidence,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DetectionThresholds {
    pub drop_threshold_pct: f64,
    pub speed_anomaly_kmh: f64,
    pub max_speed_increase_kmh_s: f64,
    pub large_gap_secs: f64,
    pub interpolation_max_gap_secs: f64,
}

impl From<&EngineConfig> for DetectionThresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            drop_threshold_pct: config.drop_threshold_pct,
            speed_anomaly_kmh: config.speed_anomaly_kmh,
            max_speed_increase_kmh_s: config.max_speed_increase_kmh_s,
            large_gap_secs: config.large_gap_secs,
            interpolation_max_gap_secs: config.interpolation_max_gap_secs,
        }
    }
}

/// Snapshot of the whole engine for the diagnostic surface.
#[derive(Clone, Debug, Serialize)]
pub struct MonitoringReport {
    pub total_resets_detected: u64,
    pub recovery_stats: RecoveryStats,
    /// Share of resets resolved by each method, percent
    pub success_rates: BTreeMap<String, f64>,
    pub recent_events: Vec<ResetEventSummary>,
    pub vehicles_monitored: usize,
    pub per_vehicle_history: BTreeMap<u32, usize>,
    pub detection_thresholds: DetectionThresholds,
    pub avg_call_duration_s: f64,
}

/// Snapshot of one vehicle's distance tracking state.
#[derive(Clone, Debug, Serialize)]
pub struct VehicleReport {
    pub vehicle_id: u32,
    pub history_points: usize,
    pub last_update_ms: Option<u64>,
    pub current_distance_m: f64,
    pub reset_count: u64,
    pub last_reset_ms: Option<u64>,
    pub recovery_methods_used: Vec<RecoveryMethod>,
}
