// Library interface for trackline
// This allows integration tests to access internal modules

pub mod config;
pub mod engine;
pub mod errors;
pub mod replay;
pub mod samples;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{
    DistanceEngine, DistanceTier, MonitoringReport, RecoveryMethod, ResetEvent, ResetType,
    VehicleReport,
};
pub use errors::TracklineError;
pub use samples::{SampleStore, TelemetrySample};
