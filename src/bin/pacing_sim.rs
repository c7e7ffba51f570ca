use stereo_pacing::config::PacingConfig;
use stereo_pacing::engine::Engine;
use stereo_pacing::vr::{DisplayRuntime, NullDisplayRuntime, RuntimeSession};
use std::env;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_FRAMES: u64 = 900;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("[pacing_sim] error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => PacingConfig::load(path)?,
        None => PacingConfig::default(),
    };
    let frames = match args.next() {
        Some(frames) => frames.parse()?,
        None => DEFAULT_FRAMES,
    };

    let session = Arc::new(RuntimeSession::new(|| {
        let runtime = NullDisplayRuntime::default();
        let period = runtime.last_display_period();
        let runtime = runtime.with_wait_duration(Duration::from_nanos(period as u64));
        Ok(Box::new(runtime) as Box<dyn DisplayRuntime>)
    }));

    let mut engine = Engine::new(config, session);
    engine.configure_max_frames(frames);
    let report = engine.run()?;

    log::info!(
        "[pacing_sim] simulated {} frames, presented {}",
        report.frames_simulated,
        report.frames_presented
    );
    Ok(())
}
