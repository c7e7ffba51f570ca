use super::pipeline::FrameDescriptor;
use crate::vr::{LayerRecord, RuntimeSession, Side, SurfaceHandle, VrResult};
use std::sync::Arc;

/// Graphics-side handle the render thread presents through.
pub trait PresentTarget {
    fn swapchain(&self, side: Side) -> SurfaceHandle;
    /// Platform buffer presentation (mirror window swap).
    fn present(&mut self) -> VrResult<()>;
}

/// Target with no window; counts presentations.
#[derive(Debug, Clone)]
pub struct HeadlessTarget {
    eye_resolution: [u32; 2],
    presented: u64,
}

impl HeadlessTarget {
    pub fn new(eye_resolution: [u32; 2]) -> Self {
        Self {
            eye_resolution,
            presented: 0,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Default for HeadlessTarget {
    fn default() -> Self {
        Self::new([1440, 1600])
    }
}

impl PresentTarget for HeadlessTarget {
    fn swapchain(&self, side: Side) -> SurfaceHandle {
        SurfaceHandle {
            id: side.index() as u64,
            size: self.eye_resolution,
        }
    }

    fn present(&mut self) -> VrResult<()> {
        self.presented += 1;
        Ok(())
    }
}

/// Submits a Swap-phase frame to the runtime.
pub struct SwapCoordinator {
    session: Arc<RuntimeSession>,
    player_scale: f32,
}

impl SwapCoordinator {
    pub fn new(session: Arc<RuntimeSession>, player_scale: f32) -> Self {
        Self {
            session,
            player_scale,
        }
    }

    /// Returns whether the frame reached the runtime. Submission failures are
    /// logged; they never hold up retirement.
    pub fn submit(&self, frame: &FrameDescriptor, target: &mut dyn PresentTarget) -> bool {
        if !frame.should_render() || !self.session.is_session_active() {
            log::debug!(
                "[swap] frame {} not rendered; skipping submission",
                frame.frame_number()
            );
            return false;
        }

        let layers = self.layers(frame, target);
        log::debug!(
            "[swap] frame {} end_frame at {}",
            frame.frame_number(),
            frame.predicted_display_time()
        );
        if let Err(err) = self
            .session
            .end_frame(frame.predicted_display_time(), &layers)
        {
            log::error!("[swap] frame {} end_frame failed: {err}", frame.frame_number());
        }

        if let Err(err) = target.present() {
            log::error!("[swap] frame {} presentation failed: {err}", frame.frame_number());
        }
        true
    }

    pub fn layers(&self, frame: &FrameDescriptor, target: &dyn PresentTarget) -> [LayerRecord; 2] {
        let poses = frame.poses();
        Side::ordered().map(|side| LayerRecord {
            side,
            swapchain: target.swapchain(side),
            pose: poses.eye(side).unscaled(self.player_scale),
            fov: poses.view(side).fov,
        })
    }
}

/// Retirement timing: inter-frame interval and a windowed fps average.
#[derive(Debug, Clone)]
pub struct FrameStatistics {
    report_interval: i64,
    last_rendered_at: Option<i64>,
    last_frame_interval: i64,
    window_start: i64,
    window_base_frame: u64,
    last_fps: Option<f64>,
}

impl FrameStatistics {
    pub fn new(report_interval: i64, start: i64) -> Self {
        Self {
            report_interval,
            last_rendered_at: None,
            last_frame_interval: 0,
            window_start: start,
            window_base_frame: 0,
            last_fps: None,
        }
    }

    /// Records a Swap retirement. Returns the fps average when a report
    /// window closes.
    pub fn record(&mut self, now: i64, frame_number: u64) -> Option<f64> {
        if let Some(previous) = self.last_rendered_at {
            self.last_frame_interval = now.saturating_sub(previous);
        }
        self.last_rendered_at = Some(now);

        let window = now.saturating_sub(self.window_start);
        if window <= self.report_interval || window <= 0 {
            return None;
        }

        let seconds = window as f64 / 1_000_000_000.0;
        let fps = frame_number.saturating_sub(self.window_base_frame) as f64 / seconds;
        self.window_start = now;
        self.window_base_frame = frame_number;
        self.last_fps = Some(fps);
        Some(fps)
    }

    pub fn last_rendered_at(&self) -> Option<i64> {
        self.last_rendered_at
    }

    pub fn last_frame_interval(&self) -> i64 {
        self.last_frame_interval
    }

    pub fn last_fps(&self) -> Option<f64> {
        self.last_fps
    }
}
