use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cadence and bounds of a tracker's polling loop.
///
/// All fields carry defaults so a partial config file only needs to name the
/// knobs it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Delay between status polls (ms).
    pub poll_interval_ms: u64,
    /// Grace delay between observing `completed` and settling (ms).
    pub settle_delay_ms: u64,
    /// Upper bound on total time spent polling one job (ms). `None` polls
    /// until the job settles.
    pub max_poll_duration_ms: Option<u64>,
    /// Upper bound on the number of polls issued for one job.
    pub max_poll_ticks: Option<u64>,
    /// Buffer size of the event broadcast channel. Slow subscribers that fall
    /// further behind than this observe a lag.
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            settle_delay_ms: 1_000,
            max_poll_duration_ms: Some(30 * 60 * 1_000),
            max_poll_ticks: None,
            event_capacity: 256,
        }
    }
}

/// Shortest cadence the poll loop runs at; a zero interval reads as this.
const MIN_POLL_INTERVAL_MS: u64 = 1;

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn max_poll_duration(&self) -> Option<Duration> {
        self.max_poll_duration_ms.map(Duration::from_millis)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = duration_ms(delay);
        self
    }

    pub fn with_max_poll_duration(mut self, limit: Option<Duration>) -> Self {
        self.max_poll_duration_ms = limit.map(duration_ms);
        self
    }

    pub fn with_max_poll_ticks(mut self, limit: Option<u64>) -> Self {
        self.max_poll_ticks = limit;
        self
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
