pub mod estimator;
pub mod pipeline;
pub mod swap;
pub mod telemetry;

pub use estimator::{
    Clock, DisplayTimeEstimator, DisplayTimeSource, FrameTiming, ManualClock, MonotonicClock,
};
pub use pipeline::{FrameDescriptor, FramePipeline, Phase, PipelineError, PipelineResult};
pub use swap::{FrameStatistics, HeadlessTarget, PresentTarget, SwapCoordinator};
pub use telemetry::{PacingTelemetry, TelemetrySurface};

use crate::config::PacingConfig;
use crate::vr::{RuntimeSession, SimulatedPoseOracle};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread;
use thiserror::Error;

const DEFAULT_MAX_FRAMES: u64 = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
    #[error("frame hand-off channel closed")]
    HandoffClosed,
}

#[derive(Debug, Clone)]
pub struct EngineReport {
    pub frames_simulated: u64,
    pub frames_presented: u64,
    pub telemetry: Option<PacingTelemetry>,
}

/// Drives a [`FramePipeline`] from a simulation thread and a render thread.
///
/// The simulation thread enters Update, reads the predicted poses for
/// gameplay and hands the frame over. The render thread takes it through
/// Cull, Draw and Swap. Hand-over is a rendezvous, so the simulation thread
/// prepares frame N+1 while frame N is drawn.
pub struct Engine {
    pipeline: Arc<FramePipeline>,
    max_frames: u64,
}

impl Engine {
    pub fn new(config: PacingConfig, session: Arc<RuntimeSession>) -> Self {
        let pipeline = FramePipeline::new(session, config)
            .with_pose_oracle(Arc::new(SimulatedPoseOracle::default()));
        Self::with_pipeline(Arc::new(pipeline))
    }

    pub fn with_pipeline(pipeline: Arc<FramePipeline>) -> Self {
        Self {
            pipeline,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }

    pub fn configure_max_frames(&mut self, frames: u64) {
        self.max_frames = frames.max(1);
    }

    pub fn pipeline(&self) -> &Arc<FramePipeline> {
        &self.pipeline
    }

    pub fn run(&mut self) -> Result<EngineReport, EngineError> {
        let pipeline = self.pipeline.as_ref();
        if !pipeline.session().realize() {
            log::warn!("[engine] display runtime unavailable; frames will not be submitted");
        }

        let frames = self.max_frames;
        let (ready_tx, ready_rx) = sync_channel::<u64>(0);
        let (taken_tx, taken_rx) = sync_channel::<()>(0);

        let (simulated, rendered) = thread::scope(|scope| {
            let simulation = scope.spawn(move || simulate(pipeline, frames, ready_tx, taken_rx));
            let render = scope.spawn(move || render(pipeline, ready_rx, taken_tx));
            (simulation.join(), render.join())
        });

        let rendered = rendered.map_err(|_| EngineError::ThreadPanicked("render"))?;
        let simulated = simulated.map_err(|_| EngineError::ThreadPanicked("simulation"))?;
        // A render failure closes the hand-off, so report it ahead of the
        // simulation side's channel error.
        let (frames_presented, surface) = rendered?;
        let frames_simulated = simulated?;

        let telemetry = surface.latest().cloned();
        if let Some(telemetry) = &telemetry {
            match telemetry.to_json() {
                Ok(json) => log::info!("[engine] finished: {json}"),
                Err(err) => log::error!("[engine] failed to serialize telemetry: {err}"),
            }
        }

        Ok(EngineReport {
            frames_simulated,
            frames_presented,
            telemetry,
        })
    }
}

fn simulate(
    pipeline: &FramePipeline,
    frames: u64,
    ready: SyncSender<u64>,
    taken: Receiver<()>,
) -> Result<u64, EngineError> {
    for _ in 0..frames {
        pipeline.begin_phase(Phase::Update)?;
        let (yaw, pitch) = pipeline.movement_angles()?;
        let frame_number = pipeline
            .frame(Phase::Update)
            .map(|frame| frame.frame_number())
            .ok_or(PipelineError::StateUnavailable(Phase::Update))?;
        log::trace!("[engine] frame {frame_number} hand yaw {yaw:.3} pitch {pitch:.3}");

        ready
            .send(frame_number)
            .map_err(|_| EngineError::HandoffClosed)?;
        taken.recv().map_err(|_| EngineError::HandoffClosed)?;
    }
    Ok(frames)
}

fn render(
    pipeline: &FramePipeline,
    ready: Receiver<u64>,
    taken: SyncSender<()>,
) -> Result<(u64, TelemetrySurface), EngineError> {
    let mut target = HeadlessTarget::new(pipeline.config().eye_resolution);
    let mut surface = TelemetrySurface::default();

    while let Ok(frame_number) = ready.recv() {
        pipeline.begin_phase(Phase::Cull)?;
        taken.send(()).map_err(|_| EngineError::HandoffClosed)?;
        pipeline.begin_phase(Phase::Draw)?;
        pipeline.swap_buffers(&mut target)?;

        if surface.record(pipeline.telemetry()) {
            log::trace!("[engine] frame {frame_number} retired");
        }
    }

    Ok((target.presented(), surface))
}
