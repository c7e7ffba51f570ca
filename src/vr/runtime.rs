use super::{FieldOfView, Pose, ReferenceSpace, Side, SurfaceHandle, View, VrError, VrResult};
use glam::{Quat, Vec3};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Per-side projection layer handed to the runtime at end of frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerRecord {
    pub side: Side,
    pub swapchain: SurfaceHandle,
    pub pose: Pose,
    pub fov: FieldOfView,
}

/// The compositor/session service that paces frame submission.
///
/// `wait_frame`, `begin_frame` and `end_frame` may block on the physical
/// display; callers invoke them only from the render thread.
pub trait DisplayRuntime: Send + Sync {
    fn label(&self) -> &'static str;
    fn is_session_active(&self) -> bool;

    fn handle_events(&self) {}

    fn wait_frame(&self);
    fn begin_frame(&self);
    fn end_frame(&self, display_time: i64, layers: &[LayerRecord]) -> VrResult<()>;

    fn predicted_head_pose(&self, time: i64, space: ReferenceSpace) -> Pose;
    fn predicted_views(&self, time: i64, space: ReferenceSpace) -> [View; 2];

    /// Nanoseconds between display refreshes as last measured by the runtime.
    fn last_display_period(&self) -> i64;

    /// Runtime-reported display time of the last waited frame, 0 if unknown.
    fn last_predicted_display_time(&self) -> i64 {
        0
    }
}

impl<R: DisplayRuntime + ?Sized> DisplayRuntime for Arc<R> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn is_session_active(&self) -> bool {
        (**self).is_session_active()
    }

    fn handle_events(&self) {
        (**self).handle_events()
    }

    fn wait_frame(&self) {
        (**self).wait_frame()
    }

    fn begin_frame(&self) {
        (**self).begin_frame()
    }

    fn end_frame(&self, display_time: i64, layers: &[LayerRecord]) -> VrResult<()> {
        (**self).end_frame(display_time, layers)
    }

    fn predicted_head_pose(&self, time: i64, space: ReferenceSpace) -> Pose {
        (**self).predicted_head_pose(time, space)
    }

    fn predicted_views(&self, time: i64, space: ReferenceSpace) -> [View; 2] {
        (**self).predicted_views(time, space)
    }

    fn last_display_period(&self) -> i64 {
        (**self).last_display_period()
    }

    fn last_predicted_display_time(&self) -> i64 {
        (**self).last_predicted_display_time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmittedFrame {
    pub display_time: i64,
    pub layers: [LayerRecord; 2],
}

const DEFAULT_IPD_METERS: f32 = 0.064;
const DEFAULT_HEAD_HEIGHT: f32 = 1.6;

/// In-process runtime with a fixed refresh period and a stationary headset.
pub struct NullDisplayRuntime {
    display_period: AtomicI64,
    last_predicted_display_time: AtomicI64,
    session_active: AtomicBool,
    wait_duration: Duration,
    wait_frames: AtomicU64,
    begin_frames: AtomicU64,
    submissions: Mutex<Vec<SubmittedFrame>>,
}

impl NullDisplayRuntime {
    pub fn new(display_period: i64) -> Self {
        Self {
            display_period: AtomicI64::new(display_period),
            last_predicted_display_time: AtomicI64::new(0),
            session_active: AtomicBool::new(true),
            wait_duration: Duration::ZERO,
            wait_frames: AtomicU64::new(0),
            begin_frames: AtomicU64::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_session_active(self, active: bool) -> Self {
        self.session_active.store(active, Ordering::SeqCst);
        self
    }

    /// Makes `wait_frame` sleep, standing in for a vsync-bound runtime.
    pub fn with_wait_duration(mut self, wait: Duration) -> Self {
        self.wait_duration = wait;
        self
    }

    pub fn set_session_active(&self, active: bool) {
        self.session_active.store(active, Ordering::SeqCst);
    }

    pub fn set_display_period(&self, display_period: i64) {
        self.display_period.store(display_period, Ordering::SeqCst);
    }

    pub fn set_last_predicted_display_time(&self, time: i64) {
        self.last_predicted_display_time.store(time, Ordering::SeqCst);
    }

    pub fn wait_frame_count(&self) -> u64 {
        self.wait_frames.load(Ordering::SeqCst)
    }

    pub fn begin_frame_count(&self) -> u64 {
        self.begin_frames.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<SubmittedFrame> {
        match self.submissions.lock() {
            Ok(submissions) => submissions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn end_frame_count(&self) -> usize {
        self.submissions().len()
    }
}

impl Default for NullDisplayRuntime {
    fn default() -> Self {
        // 90 Hz
        Self::new(11_111_111)
    }
}

impl DisplayRuntime for NullDisplayRuntime {
    fn label(&self) -> &'static str {
        "Null Display Runtime"
    }

    fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    fn wait_frame(&self) {
        if !self.wait_duration.is_zero() {
            thread::sleep(self.wait_duration);
        }
        self.wait_frames.fetch_add(1, Ordering::SeqCst);
        let period = self.display_period.load(Ordering::SeqCst);
        self.last_predicted_display_time
            .fetch_add(period, Ordering::SeqCst);
    }

    fn begin_frame(&self) {
        self.begin_frames.fetch_add(1, Ordering::SeqCst);
    }

    fn end_frame(&self, display_time: i64, layers: &[LayerRecord]) -> VrResult<()> {
        let layers: [LayerRecord; 2] = layers.try_into().map_err(|_| {
            VrError::new(format!(
                "expected {} projection layers but received {}",
                Side::ordered().len(),
                layers.len()
            ))
        })?;

        let mut submissions = match self.submissions.lock() {
            Ok(submissions) => submissions,
            Err(poisoned) => poisoned.into_inner(),
        };
        submissions.push(SubmittedFrame {
            display_time,
            layers,
        });
        Ok(())
    }

    fn predicted_head_pose(&self, _time: i64, space: ReferenceSpace) -> Pose {
        match space {
            ReferenceSpace::View => Pose::IDENTITY,
            ReferenceSpace::Stage => {
                Pose::new(Vec3::new(0.0, DEFAULT_HEAD_HEIGHT, 0.0), Quat::IDENTITY)
            }
        }
    }

    fn predicted_views(&self, time: i64, space: ReferenceSpace) -> [View; 2] {
        let head = self.predicted_head_pose(time, space);
        Side::ordered().map(|side| {
            let offset = match side {
                Side::Left => -DEFAULT_IPD_METERS * 0.5,
                Side::Right => DEFAULT_IPD_METERS * 0.5,
            };
            View {
                pose: Pose::new(
                    head.position + head.orientation * Vec3::new(offset, 0.0, 0.0),
                    head.orientation,
                ),
                fov: FieldOfView::default(),
            }
        })
    }

    fn last_display_period(&self) -> i64 {
        self.display_period.load(Ordering::SeqCst)
    }

    fn last_predicted_display_time(&self) -> i64 {
        self.last_predicted_display_time.load(Ordering::SeqCst)
    }
}
