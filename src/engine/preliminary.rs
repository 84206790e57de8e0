// Preliminary distance estimate from the best available signal
//
// Three mutually exclusive tiers ordered by trust. The first tier with
// enough valid data wins outright; tiers are never blended, so a vehicle
// with a working GPS is measured geodetically even when its speed trace is
// also clean.

use itertools::Itertools;
use log::warn;
use serde::Serialize;
use uom::si::f64::Velocity;
use uom::si::velocity::{kilometer_per_hour, meter_per_second};

use crate::samples::TelemetrySample;

/// Meters per degree of latitude, flat-earth approximation.
const METERS_PER_DEGREE: f64 = 111_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceTier {
    /// Flat-earth lat/lon pairwise sum
    Geodetic,
    /// Speed integrated over inter-sample time
    SpeedIntegration,
    /// Raw planar x/y pairwise sum, least trusted
    PlanarFallback,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreliminaryDistance {
    pub meters: f64,
    pub tier: DistanceTier,
}

pub(crate) fn kmh_to_ms(speed_kmh: f64) -> f64 {
    Velocity::new::<kilometer_per_hour>(speed_kmh).get::<meter_per_second>()
}

/// Computes the cumulative distance covered by `samples`, which must be the
/// ascending time series of one vehicle up to the queried timestamp.
/// Returns 0 meters when fewer than two samples exist.
pub fn compute(vehicle_id: u32, samples: &[TelemetrySample]) -> PreliminaryDistance {
    if samples.len() < 2 {
        return PreliminaryDistance {
            meters: 0.0,
            tier: DistanceTier::PlanarFallback,
        };
    }

    if let Some(meters) = gps_distance(samples) {
        return PreliminaryDistance {
            meters,
            tier: DistanceTier::Geodetic,
        };
    }

    if let Some(meters) = speed_integration_distance(samples) {
        return PreliminaryDistance {
            meters,
            tier: DistanceTier::SpeedIntegration,
        };
    }

    warn!("vehicle {vehicle_id} falling back to x/y coordinates (least accurate method)");
    PreliminaryDistance {
        meters: planar_distance(samples),
        tier: DistanceTier::PlanarFallback,
    }
}

/// Tier 1: flat-earth sum over consecutive valid-GPS fixes. Gaps where the
/// GPS had no fix are skipped, not interpolated. None with fewer than two
/// valid fixes.
fn gps_distance(samples: &[TelemetrySample]) -> Option<f64> {
    let valid: Vec<&TelemetrySample> =
        samples.iter().filter(|s| s.has_valid_position()).collect();
    if valid.len() < 2 {
        return None;
    }

    let meters = valid
        .iter()
        .tuple_windows()
        .map(|(a, b)| {
            let north_m = (b.lat - a.lat) * METERS_PER_DEGREE;
            let east_m = (b.lon - a.lon) * METERS_PER_DEGREE * b.lat.to_radians().cos();
            north_m.hypot(east_m)
        })
        .sum();
    Some(meters)
}

/// Tier 2: speed integrated over the elapsed time since the previous
/// valid-speed sample. Invalid speeds and negative segments are dropped
/// entirely rather than zeroed. None with fewer than two valid readings.
fn speed_integration_distance(samples: &[TelemetrySample]) -> Option<f64> {
    let valid: Vec<&TelemetrySample> = samples.iter().filter(|s| s.has_valid_speed()).collect();
    if valid.len() < 2 {
        return None;
    }

    let meters = valid
        .iter()
        .tuple_windows()
        .map(|(prev, cur)| kmh_to_ms(cur.speed_kmh) * cur.seconds_since(prev.timestamp_ms))
        .filter(|segment| *segment >= 0.0)
        .sum();
    Some(meters)
}

/// Tier 3: unconditional Euclidean sum over the raw planar track.
fn planar_distance(samples: &[TelemetrySample]) -> f64 {
    samples
        .iter()
        .tuple_windows()
        .map(|(a, b)| (b.x - a.x).hypot(b.y - a.y))
        .sum()
}
