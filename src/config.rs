// Engine configuration
//
// All thresholds are explicit fields with fixed defaults, validated once at
// construction. Partial config files are supported: any field missing from
// the JSON falls back to its default.

use serde::{Deserialize, Serialize};

use crate::TracklineError;

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Percentage drop between consecutive readings that flags a reset
    pub drop_threshold_pct: f64,
    /// Implied speed above this is treated as a sensor anomaly, km/h
    pub speed_anomaly_kmh: f64,
    /// Maximum realistic acceleration, km/h per second
    pub max_speed_increase_kmh_s: f64,
    /// Readings below this are not meaningful, meters
    pub min_valid_distance_m: f64,
    /// History window considered for recovery analysis, seconds
    pub history_window_secs: f64,
    /// A gap longer than this is a legitimate data interruption and
    /// bypasses anomaly detection, seconds
    pub large_gap_secs: f64,
    /// Maximum gap the interpolation recovery will extrapolate over, seconds
    pub interpolation_max_gap_secs: f64,
    /// GPS validation radius, meters
    pub gps_validation_radius_m: f64,
    /// Maximum accepted distance points retained per vehicle
    pub max_history_size: usize,
    /// Maximum distance cache entries before a cleanup runs
    pub distance_cache_size: usize,
    /// Number of insertion-ordered entries removed per cache cleanup
    pub cache_cleanup_threshold: usize,
    /// Reset events kept for the monitoring surface
    pub recent_events_retained: usize,
    /// Distance computations slower than this are logged, seconds
    pub slow_call_threshold_s: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drop_threshold_pct: 80.0,
            speed_anomaly_kmh: 150.0,
            max_speed_increase_kmh_s: 50.0,
            min_valid_distance_m: 10.0,
            history_window_secs: 300.0,
            large_gap_secs: 300.0,
            interpolation_max_gap_secs: 60.0,
            gps_validation_radius_m: 1000.0,
            max_history_size: 1000,
            distance_cache_size: 1000,
            cache_cleanup_threshold: 200,
            recent_events_retained: 100,
            slow_call_threshold_s: 0.5,
        }
    }
}

impl EngineConfig {
    /// Checks the configuration once, before the engine is built. A config
    /// that passes here can be used for the whole session without further
    /// checks on the hot path.
    pub fn validate(&self) -> Result<(), TracklineError> {
        let positive = [
            ("drop_threshold_pct", self.drop_threshold_pct),
            ("speed_anomaly_kmh", self.speed_anomaly_kmh),
            ("large_gap_secs", self.large_gap_secs),
            ("interpolation_max_gap_secs", self.interpolation_max_gap_secs),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(TracklineError::ConfigValidationError {
                    reason: format!("{name} must be positive, got {value}"),
                });
            }
        }
        if self.drop_threshold_pct > 100.0 {
            return Err(TracklineError::ConfigValidationError {
                reason: format!(
                    "drop_threshold_pct must be at most 100, got {}",
                    self.drop_threshold_pct
                ),
            });
        }
        if self.max_history_size == 0 {
            return Err(TracklineError::ConfigValidationError {
                reason: "max_history_size must be at least 1".to_string(),
            });
        }
        if self.cache_cleanup_threshold == 0
            || self.cache_cleanup_threshold > self.distance_cache_size
        {
            return Err(TracklineError::ConfigValidationError {
                reason: format!(
                    "cache_cleanup_threshold ({}) must be between 1 and distance_cache_size ({})",
                    self.cache_cleanup_threshold, self.distance_cache_size
                ),
            });
        }
        Ok(())
    }

    pub fn from_local_file() -> Option<Self> {
        let config_path = dirs::config_dir()?.join("trackline").join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            serde_json::from_reader(file).ok()
        } else {
            None
        }
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, TracklineError> {
        let file = std::fs::File::open(path)
            .map_err(|e| TracklineError::ConfigIOError { source: e })?;
        let config: Self = serde_json::from_reader(file)
            .map_err(|e| TracklineError::ConfigParseError { source: e })?;
        config.validate()?;
        Ok(config)
    }
}
