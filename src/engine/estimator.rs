use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Nanosecond time source used for pacing measurements.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> i64;
}

static PROCESS_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Steady clock counted from one process-wide origin. Clocks built at
/// different moments report the same instant.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: *PROCESS_ORIGIN,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ns: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ns),
        }
    }

    pub fn set(&self, now_ns: i64) {
        self.now.store(now_ns, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ns: i64) {
        self.now.fetch_add(delta_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Which timestamp anchors the display-time prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayTimeSource {
    /// Local clock plus measured cadence. Some runtimes report a display time
    /// that drifts away from real time, so this is the default.
    #[default]
    LocalClock,
    /// The runtime's own last predicted display time.
    Runtime,
}

/// Everything the estimator reads for one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub frame_number: u64,
    pub last_rendered_frame: u64,
    pub now: i64,
    /// Local time at which the last frame finished Swap, if any has.
    pub last_rendered_at: Option<i64>,
    /// Interval between the two most recent Swap retirements.
    pub last_frame_interval: i64,
    pub display_period: i64,
    pub runtime_display_time: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayTimeEstimator {
    source: DisplayTimeSource,
}

impl DisplayTimeEstimator {
    pub fn new(source: DisplayTimeSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> DisplayTimeSource {
        self.source
    }

    pub fn predict(&self, timing: &FrameTiming) -> i64 {
        match self.source {
            DisplayTimeSource::LocalClock => Self::predict_local(timing),
            DisplayTimeSource::Runtime => Self::predict_runtime(timing),
        }
    }

    fn predict_local(timing: &FrameTiming) -> i64 {
        if timing.frame_number <= 1 || timing.display_period <= 0 {
            return timing.now;
        }

        let elapsed = timing
            .last_rendered_at
            .map_or(0, |rendered_at| timing.now.saturating_sub(rendered_at));
        timing.now.saturating_add(Self::lead_time(elapsed, timing))
    }

    fn predict_runtime(timing: &FrameTiming) -> i64 {
        if timing.runtime_display_time == 0 || timing.display_period <= 0 {
            return timing.now;
        }

        timing
            .runtime_display_time
            .saturating_add(Self::lead_time(timing.last_frame_interval, timing))
    }

    /// `intervals * backlog * period`, where `intervals` is the measured
    /// duration rounded to whole display periods (at least one).
    fn lead_time(measured: i64, timing: &FrameTiming) -> i64 {
        let intervals = (measured as f64 / timing.display_period as f64).round().max(1.0) as i64;
        let backlog = timing
            .frame_number
            .saturating_sub(timing.last_rendered_frame) as i64;
        intervals
            .saturating_mul(backlog)
            .saturating_mul(timing.display_period)
    }
}
