use super::estimator::{Clock, DisplayTimeEstimator, FrameTiming, MonotonicClock};
use super::swap::{FrameStatistics, PresentTarget, SwapCoordinator};
use super::telemetry::PacingTelemetry;
use crate::config::PacingConfig;
use crate::vr::{
    PoseOracle, PoseSet, ReferenceSpace, RuntimeSession, Side, TrackedLimb, View,
    to_world_orientation, to_world_position, yaw_pitch,
};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Update,
    Cull,
    Draw,
    Swap,
}

impl Phase {
    pub const COUNT: usize = 4;

    pub const fn ordered() -> [Phase; Phase::COUNT] {
        [Phase::Update, Phase::Cull, Phase::Draw, Phase::Swap]
    }

    pub fn index(self) -> usize {
        match self {
            Phase::Update => 0,
            Phase::Cull => 1,
            Phase::Draw => 2,
            Phase::Swap => 3,
        }
    }

    pub fn from_index(index: usize) -> PipelineResult<Phase> {
        Phase::ordered()
            .get(index)
            .copied()
            .ok_or(PipelineError::InvalidPhase(index))
    }

    pub fn previous(self) -> Option<Phase> {
        match self {
            Phase::Update => None,
            Phase::Cull => Some(Phase::Update),
            Phase::Draw => Some(Phase::Cull),
            Phase::Swap => Some(Phase::Draw),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Update => "Update",
            Phase::Cull => "Cull",
            Phase::Draw => "Draw",
            Phase::Swap => "Swap",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("sequence violation entering {phase:?}: {reason}")]
    SequenceViolation { phase: Phase, reason: &'static str },
    #[error("phase index {0} is out of range")]
    InvalidPhase(usize),
    #[error("no frame available in the {0:?} phase")]
    StateUnavailable(Phase),
}

impl PipelineError {
    /// Protocol breaches by the caller. The pipeline cannot continue after one.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SequenceViolation { .. } | PipelineError::InvalidPhase(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Timing and pose prediction for one frame. Only the pipeline creates these;
/// each lives in exactly one phase slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    frame_number: u64,
    predicted_display_time: i64,
    poses: PoseSet,
    should_render: bool,
}

impl FrameDescriptor {
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn predicted_display_time(&self) -> i64 {
        self.predicted_display_time
    }

    pub fn poses(&self) -> &PoseSet {
        &self.poses
    }

    pub fn should_render(&self) -> bool {
        self.should_render
    }
}

struct PipelineState {
    slots: [Option<FrameDescriptor>; Phase::COUNT],
    frames: u64,
    last_rendered_frame: u64,
    frames_in_flight: usize,
    statistics: FrameStatistics,
}

impl PipelineState {
    fn new(statistics: FrameStatistics) -> Self {
        Self {
            slots: Default::default(),
            frames: 0,
            last_rendered_frame: 0,
            frames_in_flight: 0,
            statistics,
        }
    }

    fn slot(&self, phase: Phase) -> Option<&FrameDescriptor> {
        self.slots[phase.index()].as_ref()
    }

    fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Four-slot frame state machine shared by the simulation and render threads.
///
/// The simulation thread enters `Update`; the render thread enters `Cull`,
/// `Draw` and finally retires the frame through [`FramePipeline::swap_buffers`].
/// One mutex guards every slot and counter. Entering `Cull` for a renderable
/// frame blocks until the previous frame has been retired, so the render
/// thread never runs more than one frame ahead of Swap.
pub struct FramePipeline {
    state: Mutex<PipelineState>,
    frame_retired: Condvar,
    session: Arc<RuntimeSession>,
    oracle: Option<Arc<dyn PoseOracle>>,
    clock: Arc<dyn Clock>,
    estimator: DisplayTimeEstimator,
    swap: SwapCoordinator,
    config: PacingConfig,
}

impl FramePipeline {
    pub fn new(session: Arc<RuntimeSession>, config: PacingConfig) -> Self {
        Self::with_clock(session, config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        session: Arc<RuntimeSession>,
        config: PacingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let statistics = FrameStatistics::new(config.fps_report_interval_ns(), clock.now_ns());
        Self {
            state: Mutex::new(PipelineState::new(statistics)),
            frame_retired: Condvar::new(),
            swap: SwapCoordinator::new(Arc::clone(&session), config.player_scale),
            estimator: DisplayTimeEstimator::new(config.display_time_source),
            session,
            oracle: None,
            clock,
            config,
        }
    }

    pub fn with_pose_oracle(mut self, oracle: Arc<dyn PoseOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn session(&self) -> &Arc<RuntimeSession> {
        &self.session
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Moves the pipeline into `phase`.
    ///
    /// Re-entering an occupied phase only logs a warning. Entering a phase
    /// whose predecessor holds no frame is a fatal sequence violation.
    pub fn begin_phase(&self, phase: Phase) -> PipelineResult<()> {
        log::debug!(
            "[pipeline] begin_phase({}) on {:?}",
            phase.label(),
            thread::current().id()
        );

        let mut state = self.lock_state();
        if state.slot(phase).is_some() {
            log::warn!(
                "[pipeline] begin_phase({}) called with a frame already in that phase",
                phase.label()
            );
            return Ok(());
        }

        let Some(previous) = phase.previous() else {
            self.prepare_frame(&mut state);
            return Ok(());
        };

        let frame = state.slots[previous.index()]
            .take()
            .ok_or(PipelineError::SequenceViolation {
                phase,
                reason: "predecessor phase holds no frame",
            })?;
        let frame_number = frame.frame_number;
        let should_render = frame.should_render;
        state.slots[phase.index()] = Some(frame);

        if phase == Phase::Cull && should_render {
            self.frame_sync(state, frame_number);
        }
        Ok(())
    }

    /// Poses predicted for the frame in `phase`. An empty Update slot is
    /// filled once on demand so early queries have a frame to read.
    pub fn predicted_poses(&self, phase: Phase) -> PipelineResult<PoseSet> {
        let mut state = self.lock_state();
        if phase == Phase::Update && state.slot(phase).is_none() {
            self.prepare_frame(&mut state);
        }
        state
            .slot(phase)
            .map(|frame| frame.poses)
            .ok_or(PipelineError::StateUnavailable(phase))
    }

    /// Enters Swap, submits the frame to the runtime when it should render,
    /// then retires it and wakes any thread blocked in the frame-sync wait.
    ///
    /// A frame already moved into Swap through [`FramePipeline::begin_phase`]
    /// is the one submitted and retired; only the phase entry is a no-op.
    pub fn swap_buffers(&self, target: &mut dyn PresentTarget) -> PipelineResult<()> {
        self.begin_phase(Phase::Swap)?;
        let frame = self
            .frame(Phase::Swap)
            .ok_or(PipelineError::StateUnavailable(Phase::Swap))?;

        self.swap.submit(&frame, target);
        self.retire(frame.frame_number);
        Ok(())
    }

    pub fn frames_in_flight(&self) -> usize {
        self.lock_state().frames_in_flight
    }

    pub fn last_rendered_frame(&self) -> u64 {
        self.lock_state().last_rendered_frame
    }

    /// Number of frames created so far.
    pub fn frame_count(&self) -> u64 {
        self.lock_state().frames
    }

    pub fn frame(&self, phase: Phase) -> Option<FrameDescriptor> {
        self.lock_state().slot(phase).cloned()
    }

    pub fn telemetry(&self) -> PacingTelemetry {
        let state = self.lock_state();
        PacingTelemetry {
            frames_produced: state.frames,
            last_rendered_frame: state.last_rendered_frame,
            frames_in_flight: state.frames_in_flight,
            occupied_phases: Phase::ordered()
                .into_iter()
                .filter(|phase| state.slot(*phase).is_some())
                .map(|phase| phase.label().to_string())
                .collect(),
            last_frame_interval_ns: state.statistics.last_frame_interval(),
            last_fps: state.statistics.last_fps(),
        }
    }

    pub fn projection_matrix(&self, phase: Phase, side: Side) -> PipelineResult<Mat4> {
        let poses = self.predicted_poses(phase)?;
        Ok(poses
            .view(side)
            .fov
            .perspective_matrix(self.config.near_clip, self.config.far_clip))
    }

    /// World-to-eye matrix in renderer units and z-up axes.
    pub fn view_matrix(&self, phase: Phase, side: Side) -> PipelineResult<Mat4> {
        let pose = self.predicted_poses(phase)?.view(side).pose;
        let position = to_world_position(pose.position * self.config.units_per_meter);
        let orientation = to_world_orientation(pose.orientation);
        Ok(Mat4::from_quat(orientation.conjugate()) * Mat4::from_translation(-position))
    }

    /// Yaw and pitch of the left hand relative to the head for the Update frame.
    pub fn movement_angles(&self) -> PipelineResult<(f32, f32)> {
        let poses = self.predicted_poses(Phase::Update)?;
        let (head_yaw, head_pitch) = yaw_pitch(poses.head.orientation);
        let (hand_yaw, hand_pitch) = yaw_pitch(poses.hand(Side::Left).orientation);
        Ok((hand_yaw - head_yaw, hand_pitch - head_pitch))
    }

    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prepare_frame(&self, state: &mut PipelineState) {
        self.session.handle_events();

        state.frames += 1;
        let frame_number = state.frames;
        let timing = FrameTiming {
            frame_number,
            last_rendered_frame: state.last_rendered_frame,
            now: self.clock.now_ns(),
            last_rendered_at: state.statistics.last_rendered_at(),
            last_frame_interval: state.statistics.last_frame_interval(),
            display_period: self.session.last_display_period(),
            runtime_display_time: self.session.last_predicted_display_time(),
        };
        let predicted_display_time = self.estimator.predict(&timing);

        state.slots[Phase::Update.index()] = Some(FrameDescriptor {
            frame_number,
            predicted_display_time,
            poses: self.predict_poses(predicted_display_time),
            should_render: self.session.is_session_active(),
        });
        state.frames_in_flight += 1;
        debug_assert_eq!(state.frames_in_flight, state.occupied());

        log::debug!(
            "[pipeline] frame {frame_number} prepared for display at {predicted_display_time}"
        );
    }

    fn predict_poses(&self, time: i64) -> PoseSet {
        let scale = self.config.player_scale;
        let hmd_views = self.session.predicted_views(time, ReferenceSpace::View);
        let stage_views = self.session.predicted_views(time, ReferenceSpace::Stage);

        PoseSet {
            head: self
                .session
                .predicted_head_pose(time, ReferenceSpace::Stage)
                .scaled(scale),
            view: hmd_views.map(|view| View {
                pose: view.pose.scaled(scale),
                fov: view.fov,
            }),
            eye: stage_views.map(|view| view.pose.scaled(scale)),
            hands: Side::ordered().map(|side| {
                self.oracle
                    .as_ref()
                    .map(|oracle| oracle.limb_pose(time, TrackedLimb::for_side(side)))
                    .unwrap_or_default()
                    .scaled(scale)
            }),
        }
    }

    /// Blocks until the frame before `frame_number` has been retired, then
    /// paces against the runtime with the frame lock released.
    fn frame_sync(&self, state: MutexGuard<'_, PipelineState>, frame_number: u64) {
        let state = self
            .frame_retired
            .wait_while(state, |state| state.last_rendered_frame + 1 < frame_number)
            .unwrap_or_else(PoisonError::into_inner);
        drop(state);

        log::debug!("[pipeline] frame {frame_number} wait_frame");
        self.session.wait_frame();
        log::debug!("[pipeline] frame {frame_number} begin_frame");
        self.session.begin_frame();
    }

    fn retire(&self, frame_number: u64) {
        {
            let mut state = self.lock_state();
            let now = self.clock.now_ns();
            if let Some(fps) = state.statistics.record(now, frame_number) {
                log::info!("[swap] {fps:.2} fps (frame {frame_number})");
            }
            state.last_rendered_frame = state.last_rendered_frame.max(frame_number);
            if state.slots[Phase::Swap.index()].take().is_some() {
                state.frames_in_flight -= 1;
            }
            debug_assert_eq!(state.frames_in_flight, state.occupied());
        }
        self.frame_retired.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::estimator::ManualClock;
    use crate::engine::swap::HeadlessTarget;
    use crate::vr::{DisplayRuntime, NullDisplayRuntime, SimulatedPoseOracle, VrError};
    use glam::{Quat, Vec3};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const PERIOD_90HZ: i64 = 11_111_111;

    fn pipeline_with(runtime: Arc<NullDisplayRuntime>) -> FramePipeline {
        let session = Arc::new(RuntimeSession::realized(runtime));
        FramePipeline::new(session, PacingConfig::default())
    }

    fn run_frame(pipeline: &FramePipeline, target: &mut HeadlessTarget) {
        pipeline.begin_phase(Phase::Update).unwrap();
        pipeline.begin_phase(Phase::Cull).unwrap();
        pipeline.begin_phase(Phase::Draw).unwrap();
        pipeline.swap_buffers(target).unwrap();
    }

    #[test]
    fn phases_are_totally_ordered() {
        let ordered = Phase::ordered();
        assert!(ordered.windows(2).all(|pair| pair[0] < pair[1]));
        for phase in ordered {
            assert_eq!(Phase::from_index(phase.index()), Ok(phase));
        }
        assert_eq!(Phase::from_index(4), Err(PipelineError::InvalidPhase(4)));
        assert!(PipelineError::InvalidPhase(4).is_fatal());
    }

    #[test]
    fn frame_advances_through_every_phase() {
        let runtime = Arc::new(NullDisplayRuntime::default());
        let pipeline = pipeline_with(Arc::clone(&runtime));

        pipeline.begin_phase(Phase::Update).unwrap();
        assert_eq!(pipeline.frame(Phase::Update).map(|f| f.frame_number()), Some(1));

        for phase in [Phase::Cull, Phase::Draw] {
            pipeline.begin_phase(phase).unwrap();
            let previous = phase.previous().unwrap();
            assert!(pipeline.frame(previous).is_none());
            assert_eq!(pipeline.frame(phase).map(|f| f.frame_number()), Some(1));
            assert_eq!(pipeline.frames_in_flight(), 1);
        }

        pipeline.swap_buffers(&mut HeadlessTarget::default()).unwrap();
        assert_eq!(pipeline.frames_in_flight(), 0);
        assert_eq!(pipeline.last_rendered_frame(), 1);
        assert_eq!(runtime.wait_frame_count(), 1);
        assert_eq!(runtime.begin_frame_count(), 1);
        assert_eq!(runtime.end_frame_count(), 1);
    }

    #[test]
    fn cull_without_update_is_a_sequence_violation() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        let err = pipeline.begin_phase(Phase::Cull).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SequenceViolation {
                phase: Phase::Cull,
                ..
            }
        ));
        assert!(err.is_fatal());
        assert_eq!(pipeline.frames_in_flight(), 0);
    }

    #[test]
    fn swap_without_draw_is_a_sequence_violation() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        pipeline.begin_phase(Phase::Update).unwrap();
        pipeline.begin_phase(Phase::Cull).unwrap();
        let err = pipeline
            .swap_buffers(&mut HeadlessTarget::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SequenceViolation {
                phase: Phase::Swap,
                ..
            }
        ));
        assert!(pipeline.frame(Phase::Cull).is_some());
    }

    #[test]
    fn repeated_update_changes_nothing() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        pipeline.begin_phase(Phase::Update).unwrap();
        let first = pipeline.frame(Phase::Update);

        pipeline.begin_phase(Phase::Update).unwrap();
        assert_eq!(pipeline.frame_count(), 1);
        assert_eq!(pipeline.frames_in_flight(), 1);
        assert_eq!(pipeline.frame(Phase::Update), first);
    }

    #[test]
    fn flight_is_bounded_by_pipeline_depth() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        pipeline.begin_phase(Phase::Update).unwrap();
        pipeline.begin_phase(Phase::Cull).unwrap();
        pipeline.begin_phase(Phase::Draw).unwrap();
        pipeline.begin_phase(Phase::Update).unwrap();
        assert_eq!(pipeline.frames_in_flight(), 2);

        pipeline.swap_buffers(&mut HeadlessTarget::default()).unwrap();
        assert_eq!(pipeline.frames_in_flight(), 1);
        assert_eq!(pipeline.telemetry().occupied_phases, vec!["Update"]);
    }

    #[test]
    fn non_rendering_frame_skips_submission_but_retires() {
        let runtime = Arc::new(NullDisplayRuntime::default().with_session_active(false));
        let pipeline = pipeline_with(Arc::clone(&runtime));
        let mut target = HeadlessTarget::default();

        pipeline.begin_phase(Phase::Update).unwrap();
        assert!(!pipeline.frame(Phase::Update).unwrap().should_render());
        pipeline.begin_phase(Phase::Cull).unwrap();
        pipeline.begin_phase(Phase::Draw).unwrap();
        pipeline.swap_buffers(&mut target).unwrap();

        assert_eq!(runtime.end_frame_count(), 0);
        assert_eq!(runtime.wait_frame_count(), 0);
        assert_eq!(target.presented(), 0);
        assert_eq!(pipeline.last_rendered_frame(), 1);
        assert!(pipeline.frame(Phase::Swap).is_none());
    }

    #[test]
    fn session_going_inactive_after_update_skips_submission() {
        let runtime = Arc::new(NullDisplayRuntime::default());
        let pipeline = pipeline_with(Arc::clone(&runtime));
        pipeline.begin_phase(Phase::Update).unwrap();
        pipeline.begin_phase(Phase::Cull).unwrap();
        pipeline.begin_phase(Phase::Draw).unwrap();
        runtime.set_session_active(false);

        pipeline.swap_buffers(&mut HeadlessTarget::default()).unwrap();
        assert_eq!(runtime.end_frame_count(), 0);
        assert_eq!(pipeline.last_rendered_frame(), 1);
    }

    #[test]
    fn predicted_display_time_follows_measured_cadence() {
        let runtime = Arc::new(NullDisplayRuntime::new(PERIOD_90HZ));
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let session = Arc::new(RuntimeSession::realized(Arc::clone(&runtime)));
        let pipeline =
            FramePipeline::with_clock(session, PacingConfig::default(), clock.clone());
        let mut target = HeadlessTarget::default();

        pipeline.begin_phase(Phase::Update).unwrap();
        assert_eq!(
            pipeline.frame(Phase::Update).unwrap().predicted_display_time(),
            1_000_000_000
        );
        pipeline.begin_phase(Phase::Cull).unwrap();
        pipeline.begin_phase(Phase::Draw).unwrap();
        pipeline.swap_buffers(&mut target).unwrap();

        clock.advance(22_222_222);
        pipeline.begin_phase(Phase::Update).unwrap();
        let frame = pipeline.frame(Phase::Update).unwrap();
        assert_eq!(frame.frame_number(), 2);
        assert_eq!(
            frame.predicted_display_time(),
            clock.now_ns() + 2 * (2 - 1) * PERIOD_90HZ
        );
    }

    #[test]
    fn display_period_changes_apply_to_the_next_frame() {
        let runtime = Arc::new(NullDisplayRuntime::new(PERIOD_90HZ));
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let session = Arc::new(RuntimeSession::realized(Arc::clone(&runtime)));
        let pipeline =
            FramePipeline::with_clock(session, PacingConfig::default(), clock.clone());
        let mut target = HeadlessTarget::default();
        run_frame(&pipeline, &mut target);

        // 90 Hz to 100 Hz refresh switch.
        runtime.set_display_period(10_000_000);
        clock.advance(20_000_000);
        pipeline.begin_phase(Phase::Update).unwrap();
        assert_eq!(
            pipeline.frame(Phase::Update).unwrap().predicted_display_time(),
            clock.now_ns() + 2 * 10_000_000
        );
    }

    #[test]
    fn swap_buffers_retires_a_frame_already_in_swap() {
        let runtime = Arc::new(NullDisplayRuntime::default());
        let pipeline = pipeline_with(Arc::clone(&runtime));
        let mut target = HeadlessTarget::default();

        pipeline.begin_phase(Phase::Update).unwrap();
        pipeline.begin_phase(Phase::Cull).unwrap();
        pipeline.begin_phase(Phase::Draw).unwrap();
        pipeline.begin_phase(Phase::Swap).unwrap();
        pipeline.swap_buffers(&mut target).unwrap();

        assert_eq!(runtime.end_frame_count(), 1);
        assert_eq!(pipeline.last_rendered_frame(), 1);
        assert_eq!(pipeline.frames_in_flight(), 0);

        let err = pipeline.swap_buffers(&mut target).unwrap_err();
        assert!(matches!(err, PipelineError::SequenceViolation { phase: Phase::Swap, .. }));
        assert_eq!(runtime.end_frame_count(), 1);
    }

    #[test]
    fn runtime_timestamp_source_is_honored_when_configured() {
        let runtime = Arc::new(NullDisplayRuntime::new(PERIOD_90HZ));
        runtime.set_last_predicted_display_time(7_000_000_000);
        let session = Arc::new(RuntimeSession::realized(Arc::clone(&runtime)));
        let config = PacingConfig {
            display_time_source: crate::engine::DisplayTimeSource::Runtime,
            ..PacingConfig::default()
        };
        let pipeline = FramePipeline::with_clock(session, config, Arc::new(ManualClock::new(5)));

        pipeline.begin_phase(Phase::Update).unwrap();
        assert_eq!(
            pipeline.frame(Phase::Update).unwrap().predicted_display_time(),
            7_000_000_000 + PERIOD_90HZ
        );
    }

    #[test]
    fn pose_query_bootstraps_update_once() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        let poses = pipeline.predicted_poses(Phase::Update).unwrap();
        assert_eq!(pipeline.frame_count(), 1);
        assert_eq!(poses, *pipeline.frame(Phase::Update).unwrap().poses());

        pipeline.predicted_poses(Phase::Update).unwrap();
        assert_eq!(pipeline.frame_count(), 1);
    }

    #[test]
    fn pose_query_on_empty_render_phase_is_unavailable() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        assert_eq!(
            pipeline.predicted_poses(Phase::Draw),
            Err(PipelineError::StateUnavailable(Phase::Draw))
        );
        assert!(!PipelineError::StateUnavailable(Phase::Draw).is_fatal());
    }

    #[test]
    fn unrealized_session_produces_identity_non_rendering_frames() {
        let session = Arc::new(RuntimeSession::new(|| Err(VrError::new("no headset"))));
        session.realize();
        let pipeline = FramePipeline::new(session, PacingConfig::default());

        let poses = pipeline.predicted_poses(Phase::Update).unwrap();
        assert_eq!(poses, PoseSet::default());
        assert!(!pipeline.frame(Phase::Update).unwrap().should_render());
    }

    #[test]
    fn player_scale_applies_to_poses_and_not_to_layers() {
        let runtime = Arc::new(NullDisplayRuntime::default());
        let session = Arc::new(RuntimeSession::realized(Arc::clone(&runtime)));
        let config = PacingConfig {
            player_scale: 2.0,
            ..PacingConfig::default()
        };
        let pipeline = FramePipeline::new(session, config)
            .with_pose_oracle(Arc::new(SimulatedPoseOracle::default()));

        let poses = pipeline.predicted_poses(Phase::Update).unwrap();
        let unscaled_head = runtime.predicted_head_pose(0, ReferenceSpace::Stage);
        assert_eq!(poses.head.position, unscaled_head.position * 2.0);
        assert!((poses.hand(Side::Right).position.y - 2.8).abs() < 1e-5);

        run_frame(&pipeline, &mut HeadlessTarget::default());
        let submitted = runtime.submissions();
        let stage_views = runtime.predicted_views(0, ReferenceSpace::Stage);
        for side in Side::ordered() {
            let layer = submitted[0].layers[side.index()];
            assert!((layer.pose.position - stage_views[side.index()].pose.position).length() < 1e-5);
        }
    }

    #[test]
    fn view_matrix_moves_eye_to_origin() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        let view = pipeline.view_matrix(Phase::Update, Side::Left).unwrap();
        let eye = pipeline.predicted_poses(Phase::Update).unwrap().view(Side::Left).pose;
        let world_eye = to_world_position(eye.position);
        assert!(view.transform_point3(world_eye).length() < 1e-5);
    }

    #[test]
    fn projection_uses_configured_clip_planes() {
        let pipeline = pipeline_with(Arc::new(NullDisplayRuntime::default()));
        let projection = pipeline.projection_matrix(Phase::Update, Side::Right).unwrap();
        let expected = crate::vr::FieldOfView::default().perspective_matrix(0.1, 1000.0);
        assert_eq!(projection, expected);
    }

    struct FixedHands;

    impl PoseOracle for FixedHands {
        fn limb_pose(&self, _time: i64, _limb: TrackedLimb) -> crate::vr::Pose {
            crate::vr::Pose::new(Vec3::ZERO, Quat::from_rotation_y(0.4))
        }
    }

    #[test]
    fn movement_angles_are_hand_relative_to_head() {
        let session = Arc::new(RuntimeSession::realized(NullDisplayRuntime::default()));
        let pipeline = FramePipeline::new(session, PacingConfig::default())
            .with_pose_oracle(Arc::new(FixedHands));
        let (yaw, pitch) = pipeline.movement_angles().unwrap();
        assert!((yaw + 0.4).abs() < 1e-5, "yaw was {yaw}");
        assert!(pitch.abs() < 1e-5);
    }

    #[test]
    fn cull_waits_for_previous_frame_to_retire() {
        let pipeline = Arc::new(pipeline_with(Arc::new(NullDisplayRuntime::default())));
        pipeline.begin_phase(Phase::Update).unwrap();
        pipeline.begin_phase(Phase::Cull).unwrap();
        pipeline.begin_phase(Phase::Draw).unwrap();
        pipeline.begin_phase(Phase::Update).unwrap();

        let entered = Arc::new(AtomicBool::new(false));
        let culler = {
            let pipeline = Arc::clone(&pipeline);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                pipeline.begin_phase(Phase::Cull).unwrap();
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));

        pipeline.swap_buffers(&mut HeadlessTarget::default()).unwrap();
        culler.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
        assert_eq!(pipeline.frame(Phase::Cull).map(|f| f.frame_number()), Some(2));
    }
}
