use super::runtime::{DisplayRuntime, LayerRecord};
use super::{Pose, ReferenceSpace, View, VrError, VrResult};
use once_cell::sync::OnceCell;
use std::sync::Mutex;

type RuntimeFactory = Box<dyn FnOnce() -> VrResult<Box<dyn DisplayRuntime>> + Send>;

/// Owned handle to the display runtime, brought up on first use.
///
/// Realization runs the factory at most once. A failed bring-up is logged and
/// sticks for the lifetime of the session: every query then reports an
/// inactive session and identity poses, and pacing calls do nothing.
pub struct RuntimeSession {
    factory: Mutex<Option<RuntimeFactory>>,
    runtime: OnceCell<Option<Box<dyn DisplayRuntime>>>,
}

impl RuntimeSession {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> VrResult<Box<dyn DisplayRuntime>> + Send + 'static,
    {
        Self {
            factory: Mutex::new(Some(Box::new(factory))),
            runtime: OnceCell::new(),
        }
    }

    /// Session that is realized on construction.
    pub fn realized<R>(runtime: R) -> Self
    where
        R: DisplayRuntime + 'static,
    {
        let cell = OnceCell::new();
        let _ = cell.set(Some(Box::new(runtime) as Box<dyn DisplayRuntime>));
        Self {
            factory: Mutex::new(None),
            runtime: cell,
        }
    }

    pub fn realize(&self) -> bool {
        self.runtime
            .get_or_init(|| {
                let factory = match self.factory.lock() {
                    Ok(mut factory) => factory.take(),
                    Err(poisoned) => poisoned.into_inner().take(),
                };
                let result = match factory {
                    Some(factory) => factory(),
                    None => Err(VrError::new("no runtime factory registered")),
                };
                match result {
                    Ok(runtime) => {
                        log::info!("[session] realized {}", runtime.label());
                        Some(runtime)
                    }
                    Err(err) => {
                        log::error!("[session] runtime initialization failed: {err}");
                        None
                    }
                }
            })
            .is_some()
    }

    pub fn is_realized(&self) -> bool {
        matches!(self.runtime.get(), Some(Some(_)))
    }

    pub fn runtime(&self) -> Option<&dyn DisplayRuntime> {
        self.runtime.get().and_then(|runtime| runtime.as_deref())
    }

    pub fn label(&self) -> &'static str {
        self.runtime()
            .map_or("Unrealized Runtime", |runtime| runtime.label())
    }

    pub fn is_session_active(&self) -> bool {
        self.runtime()
            .is_some_and(|runtime| runtime.is_session_active())
    }

    pub fn handle_events(&self) {
        if let Some(runtime) = self.runtime() {
            runtime.handle_events();
        }
    }

    pub fn wait_frame(&self) {
        if let Some(runtime) = self.runtime() {
            runtime.wait_frame();
        }
    }

    pub fn begin_frame(&self) {
        if let Some(runtime) = self.runtime() {
            runtime.begin_frame();
        }
    }

    pub fn end_frame(&self, display_time: i64, layers: &[LayerRecord]) -> VrResult<()> {
        match self.runtime() {
            Some(runtime) => runtime.end_frame(display_time, layers),
            None => Ok(()),
        }
    }

    pub fn predicted_head_pose(&self, time: i64, space: ReferenceSpace) -> Pose {
        self.runtime()
            .map_or(Pose::IDENTITY, |runtime| runtime.predicted_head_pose(time, space))
    }

    pub fn predicted_views(&self, time: i64, space: ReferenceSpace) -> [View; 2] {
        self.runtime()
            .map_or_else(Default::default, |runtime| runtime.predicted_views(time, space))
    }

    pub fn last_display_period(&self) -> i64 {
        self.runtime()
            .map_or(0, |runtime| runtime.last_display_period())
    }

    pub fn last_predicted_display_time(&self) -> i64 {
        self.runtime()
            .map_or(0, |runtime| runtime.last_predicted_display_time())
    }
}
