pub mod config;
pub mod engine;
pub mod vr;

use std::sync::Arc;

/// Runs the default engine against the in-process null runtime.
pub fn run() -> Result<engine::EngineReport, engine::EngineError> {
    let session = Arc::new(vr::RuntimeSession::realized(vr::NullDisplayRuntime::default()));
    let mut engine = engine::Engine::new(config::PacingConfig::default(), session);
    engine.run()
}
