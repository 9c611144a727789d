// ── Session keep-alive ──
//
// A periodic authenticated meter poll that stops the device from timing
// the session out while idle. Failures are logged and never propagated;
// they only cost the next command a re-authentication.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA, REFERER};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tieline_api::wire::{METER_PATH, PROBE_PATH};
use tieline_api::{CommandRequest, SessionManager, SessionState};

/// What a single keep-alive tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Probe accepted; session refreshed.
    Refreshed,
    /// Probe got 401 and the inline re-authentication succeeded.
    Reauthenticated,
    /// Probe got 401 and the inline re-authentication failed.
    ReauthFailed,
    /// Probe answered with some other non-200 status.
    Rejected { status: u16 },
    /// Network failure; session state left untouched.
    TransportFailed,
    /// No session could be established before probing.
    Unavailable,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct KeepAliveInner {
    session: Arc<SessionManager>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

/// Timer-driven session keep-alive.
///
/// Cheaply cloneable; clones share one timer.
#[derive(Clone)]
pub struct KeepAliveLoop {
    inner: Arc<KeepAliveInner>,
}

impl KeepAliveLoop {
    pub fn new(session: Arc<SessionManager>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(KeepAliveInner {
                session,
                interval,
                running: Mutex::new(None),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start the timer, replacing any timer already running.
    ///
    /// Must be called from within a Tokio runtime. A zero interval
    /// leaves the loop stopped.
    pub fn start(&self) {
        let mut running = self.running();
        if let Some(prev) = running.take() {
            debug!("restarting keep-alive timer");
            prev.cancel.cancel();
        }

        if self.inner.interval.is_zero() {
            info!("keep-alive disabled (zero interval)");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(keepalive_task(self.clone(), cancel.clone()));
        *running = Some(Running { cancel, handle });
        info!(interval_secs = self.inner.interval.as_secs(), "keep-alive started");
    }

    /// Cancel the timer. A tick already in flight finishes; no new tick starts.
    pub fn stop(&self) {
        if let Some(prev) = self.running().take() {
            prev.cancel.cancel();
            info!("keep-alive stopped");
        }
    }

    /// [`stop`](Self::stop), then wait for the task to wind down.
    pub async fn shutdown(&self) {
        let prev = self.running().take();
        if let Some(prev) = prev {
            prev.cancel.cancel();
            if let Err(e) = prev.handle.await {
                warn!(error = %e, "keep-alive task ended abnormally");
            }
            info!("keep-alive stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running()
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.handle.is_finished())
    }

    /// Issue one keep-alive probe.
    pub async fn tick(&self) -> TickOutcome {
        let session = &self.inner.session;

        if session.state() != SessionState::Authenticated {
            if let Err(e) = session.ensure_authenticated().await {
                warn!(error = %e, "keep-alive could not establish a session");
                return TickOutcome::Unavailable;
            }
        }

        let referer = format!("{}{PROBE_PATH}", session.credentials().origin());
        let mut request = CommandRequest::get(METER_PATH)
            .with_header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .with_header(PRAGMA, HeaderValue::from_static("no-cache"));
        if let Ok(value) = HeaderValue::from_str(&referer) {
            request = request.with_header(REFERER, value);
        }

        let signed = match session.send(request).await {
            Ok(signed) => signed,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "keep-alive request failed");
                return TickOutcome::TransportFailed;
            }
            Err(e) => {
                warn!(error = %e, "keep-alive request not sent");
                return TickOutcome::Unavailable;
            }
        };

        match signed.response.status {
            200 => {
                debug!(nc = signed.nc, "keep-alive ok");
                TickOutcome::Refreshed
            }
            401 => {
                info!("keep-alive got 401; re-authenticating");
                match session.reauthenticate_from(signed.epoch).await {
                    Ok(()) => TickOutcome::Reauthenticated,
                    Err(e) => {
                        warn!(error = %e, "keep-alive re-authentication failed");
                        TickOutcome::ReauthFailed
                    }
                }
            }
            status => {
                warn!(status, "keep-alive rejected");
                TickOutcome::Rejected { status }
            }
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn keepalive_task(keep_alive: KeepAliveLoop, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(keep_alive.inner.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let outcome = keep_alive.tick().await;
                debug!(?outcome, "keep-alive tick");
            }
        }
    }
}
