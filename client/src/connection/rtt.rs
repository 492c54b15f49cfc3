use std::time::Duration;

const SMOOTHING: f64 = 0.125;

/// Smoothed round-trip time from ping/pong samples, weighted the way TCP
/// weighs its srtt
#[derive(Clone, Copy, Debug, Default)]
pub struct RttEstimator {
    smoothed: Option<f64>,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sample in seconds. Negative samples come from a pong that
    /// answers a ping of an earlier connection and are ignored.
    pub fn record(&mut self, sample: f64) {
        if !sample.is_finite() || sample < 0.0 {
            return;
        }
        self.smoothed = Some(match self.smoothed {
            None => sample,
            Some(smoothed) => smoothed + SMOOTHING * (sample - smoothed),
        });
    }

    pub fn get(&self) -> Option<Duration> {
        self.smoothed.map(Duration::from_secs_f64)
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
    }
}
