use serde::{Deserialize, Serialize};

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingTelemetry {
    pub frames_produced: u64,
    pub last_rendered_frame: u64,
    pub frames_in_flight: usize,
    pub occupied_phases: Vec<String>,
    pub last_frame_interval_ns: i64,
    pub last_fps: Option<f64>,
}

impl PacingTelemetry {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Default)]
pub struct TelemetrySurface {
    latest: Option<PacingTelemetry>,
    last_frame: Option<u64>,
    samples: u64,
}

impl TelemetrySurface {
    /// Stores the sample; returns true when it describes a newly retired frame.
    pub fn record(&mut self, telemetry: PacingTelemetry) -> bool {
        let frame = telemetry.last_rendered_frame;
        let changed = self.last_frame.map_or(true, |last| last != frame);
        self.last_frame = Some(frame);
        self.latest = Some(telemetry);
        self.samples += 1;
        changed
    }

    pub fn latest(&self) -> Option<&PacingTelemetry> {
        self.latest.as_ref()
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
