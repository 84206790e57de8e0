// Call-duration tracking for the distance hot path

use std::time::Duration;

use log::warn;
use simple_moving_average::{SMA, SumTreeSMA};

const WINDOW_SIZE: usize = 64;

/// Moving average of `distance_at` call durations with a slow-call warning.
/// The loop polls every vehicle every tick, so a sustained slowdown here is
/// the first sign the session is falling behind real time.
pub(crate) struct CallTimer {
    window: SumTreeSMA<f64, f64, WINDOW_SIZE>,
    slow_threshold_s: f64,
    calls: u64,
}

impl CallTimer {
    pub(crate) fn new(slow_threshold_s: f64) -> Self {
        Self {
            window: SumTreeSMA::new(),
            slow_threshold_s,
            calls: 0,
        }
    }

    pub(crate) fn observe(&mut self, elapsed: Duration, vehicle_id: u32) {
        let elapsed_s = elapsed.as_secs_f64();
        if elapsed_s > self.slow_threshold_s {
            warn!("slow distance computation for vehicle {vehicle_id}: {elapsed_s:.2}s");
        }
        self.window.add_sample(elapsed_s);
        self.calls += 1;
    }

    pub(crate) fn average_s(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.window.get_average()
    }
}

impl std::fmt::Debug for CallTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTimer")
            .field("calls", &self.calls)
            .field("average_s", &self.average_s())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_over_observations() {
        let mut timer = CallTimer::new(0.5);
        timer.observe(Duration::from_millis(10), 1);
        timer.observe(Duration::from_millis(30), 1);
        assert!((timer.average_s() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_zero_calls_average_is_zero() {
        let timer = CallTimer::new(0.5);
        assert_eq!(timer.average_s(), 0.0);
    }
}
