// ── Device abstraction ──
//
// Host-facing entry point for one device: authentication, routing
// commands, feature queries, and the keep-alive timer. Hosts never see
// session internals.

use std::sync::Arc;

use tracing::{debug, warn};

use tieline_api::{AuthSession, HttpTransport, SessionManager, SessionState, Transport};

use crate::command::{CommandPipeline, FeatureList};
use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::keepalive::KeepAliveLoop;

/// A connection to one device.
///
/// Cheaply cloneable via `Arc<DeviceInner>`.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    config: DeviceConfig,
    session: Arc<SessionManager>,
    commands: CommandPipeline,
    keep_alive: KeepAliveLoop,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.keep_alive.stop();
    }
}

impl Device {
    /// Build a device over the default HTTP transport. Does NOT connect.
    pub fn new(config: DeviceConfig) -> Result<Self, CoreError> {
        let transport = HttpTransport::new(&config.transport())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a device over a caller-supplied transport.
    pub fn with_transport(config: DeviceConfig, transport: Arc<dyn Transport>) -> Self {
        let session = Arc::new(SessionManager::new(config.credentials(), transport));
        let commands = CommandPipeline::new(Arc::clone(&session), config.features_path.clone());
        let keep_alive = KeepAliveLoop::new(Arc::clone(&session), config.keepalive_interval);

        Self {
            inner: Arc::new(DeviceInner {
                config,
                session,
                commands,
                keep_alive,
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Clone of the current session. Carries no password.
    pub fn session(&self) -> AuthSession {
        self.inner.session.snapshot()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Authenticate, then start the keep-alive timer.
    ///
    /// The timer starts even if authentication fails so later ticks keep
    /// retrying; the authentication result is still returned.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let result = self.authenticate().await;
        if let Err(ref e) = result {
            warn!(error = %e, "initial authentication failed");
        }
        self.start_keep_alive();
        result
    }

    /// Stop the keep-alive timer and wait for it to wind down.
    pub async fn shutdown(&self) {
        self.inner.keep_alive.shutdown().await;
        debug!("device shut down");
    }

    // ── Command API ──────────────────────────────────────────────

    /// Run a fresh challenge round-trip.
    pub async fn authenticate(&self) -> Result<(), CoreError> {
        self.inner.session.authenticate().await?;
        Ok(())
    }

    /// Route `input_ids` to `output_id`. Empty `input_ids` disables it.
    pub async fn set_route<S: AsRef<str>>(
        &self,
        output_id: &str,
        input_ids: &[S],
    ) -> Result<(), CoreError> {
        self.inner.commands.set_route(output_id, input_ids).await
    }

    pub async fn disable_output(&self, output_id: &str) -> Result<(), CoreError> {
        self.inner.commands.disable_output(output_id).await
    }

    pub async fn query_features(&self) -> Result<FeatureList, CoreError> {
        self.inner.commands.query_features().await
    }

    pub fn start_keep_alive(&self) {
        self.inner.keep_alive.start();
    }

    pub fn stop_keep_alive(&self) {
        self.inner.keep_alive.stop();
    }

    pub fn keep_alive_running(&self) -> bool {
        self.inner.keep_alive.is_running()
    }

    /// Direct access to the keep-alive loop (e.g. to drive a tick by hand).
    pub fn keep_alive(&self) -> &KeepAliveLoop {
        &self.inner.keep_alive
    }
}
