// Error types for trackline

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum TracklineError {
    // Config management errors
    #[snafu(display("Invalid engine configuration: {reason}"))]
    ConfigValidationError { reason: String },
    #[snafu(display("Could not find application data directory for config file"))]
    NoConfigDir,
    #[snafu(display("Error reading config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error parsing config file"))]
    ConfigParseError { source: serde_json::Error },

    // Session replay errors
    #[snafu(display("Error reading session file: {path}"))]
    SessionReadError { path: String, source: io::Error },
    #[snafu(display("Session contains no telemetry samples"))]
    EmptySession,
    #[snafu(display("No telemetry recorded for vehicle {vehicle_id}"))]
    UnknownVehicle { vehicle_id: u32 },
}
