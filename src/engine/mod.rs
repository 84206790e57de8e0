pub(crate) mod cache;
pub(crate) mod detector;
pub(crate) mod history;
pub(crate) mod monitor;
pub(crate) mod perf;
pub(crate) mod preliminary;
pub(crate) mod recovery;

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use log::info;

use crate::config::EngineConfig;
use crate::samples::SampleStore;
use cache::DistanceCache;
pub use detector::{ResetEvent, ResetType};
pub use history::{DistanceHistory, DistancePoint};
use monitor::ResetMonitor;
pub use monitor::{DetectionThresholds, MonitoringReport, RecoveryStats, ResetEventSummary, VehicleReport};
use perf::CallTimer;
pub use preliminary::{DistanceTier, PreliminaryDistance};
pub use recovery::{Recovery, RecoveryFailure, RecoveryMethod};

/// Distance tracking engine for one session.
///
/// Owns all per-session mutable state: the accepted distance history per
/// vehicle, the result cache and the reset archive. The raw sample store is
/// injected at construction and only ever read. All mutation happens through
/// `distance_at`, which the session loop calls once per vehicle per tick;
/// status queries return copied snapshots, so an engine behind a
/// single-writer/multi-reader lock needs no further coordination.
#[derive(Debug)]
pub struct DistanceEngine {
    config: EngineConfig,
    store: SampleStore,
    histories: HashMap<u32, DistanceHistory>,
    cache: DistanceCache,
    monitor: ResetMonitor,
    timer: CallTimer,
}

impl DistanceEngine {
    pub fn new(config: EngineConfig, store: SampleStore) -> Result<Self, crate::TracklineError> {
        config.validate()?;
        let cache = DistanceCache::new(config.distance_cache_size, config.cache_cleanup_threshold);
        let monitor = ResetMonitor::new(config.recent_events_retained);
        let timer = CallTimer::new(config.slow_call_threshold_s);
        Ok(Self {
            config,
            store,
            histories: HashMap::new(),
            cache,
            monitor,
            timer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Ingestion access for live feeds; the engine itself never writes here.
    pub fn store_mut(&mut self) -> &mut SampleStore {
        &mut self.store
    }

    /// Cumulative distance in meters for `vehicle_id` at `timestamp_ms`.
    ///
    /// Computes a preliminary estimate from the best available signal tier,
    /// screens it against the vehicle's history for resets, and if one is
    /// flagged resolves it through the recovery chain. The accepted value
    /// (never the corrupted preliminary one) is recorded in history and
    /// cached. Fewer than two samples at the queried time yields 0 without
    /// touching history or cache.
    pub fn distance_at(&mut self, vehicle_id: u32, timestamp_ms: u64) -> f64 {
        let started = Instant::now();

        if let Some(cached) = self.cache.get(vehicle_id, timestamp_ms) {
            return cached;
        }

        let samples = self.store.samples_up_to(vehicle_id, timestamp_ms);
        if samples.len() < 2 {
            return 0.0;
        }

        let preliminary = preliminary::compute(vehicle_id, samples);

        let history = self
            .histories
            .entry(vehicle_id)
            .or_insert_with(|| DistanceHistory::new(self.config.max_history_size));

        let mut final_m = preliminary.meters;
        if let Some(mut event) = detector::detect(
            &self.config,
            &self.store,
            history,
            vehicle_id,
            timestamp_ms,
            preliminary.meters,
        ) {
            let recovery = recovery::recover(&self.config, &self.store, history, &event);
            info!(
                "distance recovered for vehicle {vehicle_id}: {:.1}m -> {:.1}m using {}",
                preliminary.meters,
                recovery.distance_m,
                recovery.method.name()
            );
            final_m = recovery.distance_m;
            event.recovery_method = Some(recovery.method);
            self.monitor.record(event);
        }

        history.push(DistancePoint {
            timestamp_ms,
            meters: final_m,
        });
        self.cache.insert(vehicle_id, timestamp_ms, final_m);

        self.timer.observe(started.elapsed(), vehicle_id);
        final_m
    }

    /// Read-only diagnostic snapshot of the whole engine.
    pub fn monitoring_status(&self) -> MonitoringReport {
        let per_vehicle_history: BTreeMap<u32, usize> = self
            .histories
            .iter()
            .map(|(id, h)| (*id, h.len()))
            .collect();

        MonitoringReport {
            total_resets_detected: self.monitor.stats().total_resets,
            recovery_stats: self.monitor.stats().clone(),
            success_rates: self.monitor.success_rates(),
            recent_events: self.monitor.recent_summaries(),
            vehicles_monitored: per_vehicle_history.len(),
            per_vehicle_history,
            detection_thresholds: DetectionThresholds::from(&self.config),
            avg_call_duration_s: self.timer.average_s(),
        }
    }

    /// Distance tracking snapshot for one vehicle.
    pub fn vehicle_status(&self, vehicle_id: u32) -> VehicleReport {
        let history = self.histories.get(&vehicle_id);
        let last = history.and_then(DistanceHistory::last);
        VehicleReport {
            vehicle_id,
            history_points: history.map_or(0, DistanceHistory::len),
            last_update_ms: last.map(|p| p.timestamp_ms),
            current_distance_m: last.map_or(0.0, |p| p.meters),
            reset_count: self.monitor.vehicle_reset_count(vehicle_id),
            last_reset_ms: self.monitor.vehicle_last_reset_ms(vehicle_id),
            recovery_methods_used: self.monitor.vehicle_methods_used(vehicle_id),
        }
    }

    /// Drops all per-session derived state (histories, cache, reset
    /// archive). The raw sample store is left untouched.
    pub fn clear(&mut self) {
        self.histories.clear();
        self.cache.clear();
        self.monitor.clear();
    }

    #[cfg(test)]
    pub(crate) fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
