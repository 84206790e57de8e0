// Raw telemetry samples and the per-vehicle sample store

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine reference distance, meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

fn nan() -> f64 {
    f64::NAN
}

// serde_json writes non-finite floats as null; accept that back as NaN
fn nan_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// One raw telemetry reading for a vehicle. Positions and speed may be
/// missing or garbage: a lat/lon of NaN or exactly (0,0) means the GPS had
/// no fix, a NaN or negative speed means the sensor dropped out. The planar
/// x/y pair is always present but is the least trusted signal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub vehicle_id: u32,
    /// Epoch milliseconds, ascending within a vehicle's series
    pub timestamp_ms: u64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub lat: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub lon: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "nan", deserialize_with = "nan_if_null")]
    pub speed_kmh: f64,
}

impl TelemetrySample {
    /// GPS fix usable for geodetic math: finite, not the (0,0) no-fix
    /// marker, and within coordinate range.
    pub fn has_valid_position(&self) -> bool {
        is_valid_coordinate(self.lat, self.lon)
    }

    pub fn has_valid_speed(&self) -> bool {
        self.speed_kmh.is_finite() && self.speed_kmh >= 0.0
    }

    pub fn seconds_since(&self, earlier_ms: u64) -> f64 {
        (self.timestamp_ms as f64 - earlier_ms as f64) / 1000.0
    }
}

pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    if lat.is_nan() || lon.is_nan() {
        return false;
    }
    if lat == 0.0 && lon == 0.0 {
        return false;
    }
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Great-circle distance between two fixes, meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Cumulative haversine distance over the valid-GPS samples in `samples`.
/// Invalid fixes are excluded; the remaining fixes are chained pairwise, so
/// a GPS dropout in the middle of the series is bridged by a single
/// straight-line segment. Returns 0 with fewer than two valid fixes.
pub fn geodetic_distance_m(samples: &[TelemetrySample]) -> f64 {
    samples
        .iter()
        .filter(|s| s.has_valid_position())
        .tuple_windows()
        .map(|(a, b)| haversine_m(a.lat, a.lon, b.lat, b.lon))
        .sum()
}

/// Per-vehicle ordered time series of raw telemetry. The store is owned by
/// the ingestion side; the engine only ever reads prefixes of it.
#[derive(Debug, Default)]
pub struct SampleStore {
    series: HashMap<u32, Vec<TelemetrySample>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample to its vehicle's series. Samples are expected in
    /// ascending timestamp order per vehicle; an out-of-order sample is
    /// inserted at its sorted position to keep the series queryable.
    pub fn push(&mut self, sample: TelemetrySample) {
        let series = self.series.entry(sample.vehicle_id).or_default();
        match series.last() {
            Some(last) if last.timestamp_ms > sample.timestamp_ms => {
                let pos = series.partition_point(|s| s.timestamp_ms <= sample.timestamp_ms);
                series.insert(pos, sample);
            }
            _ => series.push(sample),
        }
    }

    pub fn vehicles(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.series.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn sample_count(&self, vehicle_id: u32) -> usize {
        self.series.get(&vehicle_id).map_or(0, Vec::len)
    }

    /// All samples for `vehicle_id` with `timestamp_ms <= up_to_ms`, in order.
    pub fn samples_up_to(&self, vehicle_id: u32, up_to_ms: u64) -> &[TelemetrySample] {
        match self.series.get(&vehicle_id) {
            Some(series) => {
                let end = series.partition_point(|s| s.timestamp_ms <= up_to_ms);
                &series[..end]
            }
            None => &[],
        }
    }

    /// The sample closest in time to `target_ms`, if the vehicle has any.
    pub fn sample_nearest(&self, vehicle_id: u32, target_ms: u64) -> Option<&TelemetrySample> {
        self.series.get(&vehicle_id)?.iter().min_by_key(|s| {
            s.timestamp_ms.abs_diff(target_ms)
        })
    }

    pub fn first_timestamp_ms(&self, vehicle_id: u32) -> Option<u64> {
        Some(self.series.get(&vehicle_id)?.first()?.timestamp_ms)
    }

    pub fn last_timestamp_ms(&self, vehicle_id: u32) -> Option<u64> {
        Some(self.series.get(&vehicle_id)?.last()?.timestamp_ms)
    }

    pub fn valid_gps_count(&self, vehicle_id: u32) -> usize {
        self.series
            .get(&vehicle_id)
            .map_or(0, |s| s.iter().filter(|p| p.has_valid_position()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(vehicle_id: u32, timestamp_ms: u64) -> TelemetrySample {
        TelemetrySample {
            vehicle_id,
            timestamp_ms,
            lat: f64::NAN,
            lon: f64::NAN,
            x: 0.0,
            y: 0.0,
            speed_kmh: f64::NAN,
        }
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(is_valid_coordinate(45.5, -73.6));
        assert!(!is_valid_coordinate(0.0, 0.0));
        assert!(!is_valid_coordinate(f64::NAN, 10.0));
        assert!(!is_valid_coordinate(10.0, f64::NAN));
        assert!(!is_valid_coordinate(91.0, 10.0));
        assert!(!is_valid_coordinate(10.0, 181.0));
        assert!(!is_valid_coordinate(-91.0, 0.5));
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude at the equator is ~111.2 km
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn test_geodetic_distance_skips_invalid_fixes() {
        let mut a = sample(1, 0);
        a.lat = 45.0;
        a.lon = 7.0;
        let dropout = sample(1, 1000); // NaN lat/lon
        let mut b = sample(1, 2000);
        b.lat = 45.001;
        b.lon = 7.0;

        let with_dropout = geodetic_distance_m(&[a.clone(), dropout, b.clone()]);
        let without = geodetic_distance_m(&[a, b]);
        assert_eq!(with_dropout, without);
    }

    #[test]
    fn test_samples_up_to_is_inclusive_prefix() {
        let mut store = SampleStore::new();
        for t in [1000, 2000, 3000, 4000] {
            store.push(sample(7, t));
        }
        assert_eq!(store.samples_up_to(7, 2500).len(), 2);
        assert_eq!(store.samples_up_to(7, 3000).len(), 3);
        assert_eq!(store.samples_up_to(7, 500).len(), 0);
        assert_eq!(store.samples_up_to(9, 3000).len(), 0);
    }

    #[test]
    fn test_out_of_order_push_keeps_series_sorted() {
        let mut store = SampleStore::new();
        store.push(sample(1, 2000));
        store.push(sample(1, 1000));
        store.push(sample(1, 3000));
        let series = store.samples_up_to(1, u64::MAX);
        let times: Vec<u64> = series.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(times, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_sample_nearest() {
        let mut store = SampleStore::new();
        for t in [1000, 2000, 5000] {
            store.push(sample(3, t));
        }
        assert_eq!(store.sample_nearest(3, 2400).unwrap().timestamp_ms, 2000);
        assert_eq!(store.sample_nearest(3, 4900).unwrap().timestamp_ms, 5000);
        assert!(store.sample_nearest(4, 0).is_none());
    }
}
