use crate::config::{ConfigError, ServerConfig};
use crate::metrics::SyncMetrics;
use crate::registry::{SessionRegistry, UserInstance};
use parking_lot::Mutex;
use std::sync::Arc;
use tether_core::{
    AppConfig, InputProcessor, NoValidation, OutputProcessor, SyncError, SyncOutcome, SyncRequest,
    Synchronization, Validator, Window, WindowContext,
};
use tether_types::{SessionId, WindowId};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} already exists")]
    SessionExists(SessionId),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Entry point for a transport: sessions in, synchronizations out
pub struct SyncHost {
    config: ServerConfig,
    app_config: AppConfig,
    registry: SessionRegistry,
    metrics: Mutex<SyncMetrics>,
}

impl SyncHost {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            app_config: config.app_config(),
            metrics: Mutex::new(SyncMetrics::new(config.metrics_interval())),
            registry: SessionRegistry::new(),
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Create a session and its main window
    pub fn open_session(
        &self,
        session: SessionId,
        build: impl FnOnce(&mut Window) -> anyhow::Result<()>,
    ) -> Result<WindowId> {
        let instance = self
            .registry
            .create(session.clone(), self.app_config.clone())
            .ok_or_else(|| HostError::SessionExists(session.clone()))?;

        let window = match instance.app().open_window(build) {
            Ok(window) => window,
            Err(err) => {
                self.registry.remove(&session);
                return Err(err.into());
            }
        };
        self.metrics.lock().observe_sessions(self.registry.len());
        info!(session = %session, window = %window, "session opened");
        Ok(window)
    }

    pub fn session(&self, session: &SessionId) -> Result<Arc<UserInstance>> {
        self.registry
            .get(session)
            .ok_or_else(|| HostError::SessionNotFound(session.clone()))
    }

    /// Run one client request through a full transaction
    pub fn process<I, V, O>(
        &self,
        session: &SessionId,
        request: &SyncRequest,
        input: &mut I,
        validator: &mut V,
        output: &mut O,
    ) -> Result<SyncOutcome<O::Output>>
    where
        I: InputProcessor + ?Sized,
        V: Validator + ?Sized,
        O: OutputProcessor + ?Sized,
    {
        let instance = self.session(session)?;
        let result =
            Synchronization::new(instance.app()).process(request, input, validator, output);

        let mut metrics = self.metrics.lock();
        match &result {
            Ok(outcome) => metrics.record_commit(&outcome.summary),
            Err(_) => metrics.record_failure(),
        }
        metrics.maybe_emit();
        drop(metrics);

        Ok(result?)
    }

    /// Deliver queued work and pushed updates to a window without input
    ///
    /// Returns `None` when the window has nothing waiting.
    pub fn poll_async<O>(
        &self,
        session: &SessionId,
        window: &WindowId,
        output: &mut O,
    ) -> Result<Option<SyncOutcome<O::Output>>>
    where
        O: OutputProcessor + ?Sized,
    {
        let instance = self.session(session)?;
        if !instance.app().has_async_updates(window)? {
            return Ok(None);
        }
        self.metrics.lock().record_poll();
        debug!(session = %session, window = %window, "async poll");

        let mut no_input = |_cx: &mut WindowContext<'_>| -> anyhow::Result<()> { Ok(()) };
        let outcome = self.process(
            session,
            &SyncRequest::new(window.clone()),
            &mut no_input,
            &mut NoValidation,
            output,
        )?;
        Ok(Some(outcome))
    }

    /// Windows of a session whose clients should poll, oldest signal first
    pub fn pending_wakeups(&self, session: &SessionId) -> Result<Vec<WindowId>> {
        Ok(self.session(session)?.take_wakeups())
    }

    /// Forget a session and dispose its application
    pub fn close_session(&self, session: &SessionId) -> Result<()> {
        let instance = self
            .registry
            .remove(session)
            .ok_or_else(|| HostError::SessionNotFound(session.clone()))?;
        instance.app().dispose()?;
        info!(session = %session, "session closed");
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn with_metrics<R>(&self, f: impl FnOnce(&SyncMetrics) -> R) -> R {
        f(&self.metrics.lock())
    }
}

impl std::fmt::Debug for SyncHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHost")
            .field("config", &self.config)
            .field("sessions", &self.registry.len())
            .finish()
    }
}
