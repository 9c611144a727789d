// Digest session lifecycle
//
// `SessionManager` is the single owner of realm, nonce, nonce-count and
// session token. Two locks guard it:
//
// - `state`: a short synchronous critical section around every mutation.
//   Never held across an await.
// - `exchange`: an async gate held from signing a request until the device
//   has answered, so nonce-counts reach the wire in the order they were
//   allocated.
//
// A third async gate, `auth_gate`, makes challenge round-trips single-flight.
// Lock order is always `auth_gate` -> `exchange` -> `state`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use reqwest::Method;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue,
};
use tracing::{debug, info, warn};

use crate::auth::{AuthSession, Credentials, SessionState};
use crate::digest::DigestCredential;
use crate::error::Error;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::wire::{self, CSRF_HEADER, Challenge, PROBE_PATH};

/// Identifies one authentication attempt. Bumped every time a challenge
/// round-trip completes, whether it succeeded or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionEpoch(u64);

/// A state-changing or polling request to issue under the current session.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub method: Method,
    pub path: String,
    /// Extra headers; `Authorization` and `X-CSRF-Token` are added on send.
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl CommandRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Response to a signed request plus the context it was signed under.
#[derive(Debug, Clone)]
pub struct SignedResponse {
    pub response: HttpResponse,
    pub epoch: SessionEpoch,
    /// Nonce-count the request carried.
    pub nc: u32,
}

struct Inner {
    session: AuthSession,
    epoch: u64,
    /// Failure of the latest challenge round-trip; handed unchanged to
    /// callers that were waiting on it.
    last_failure: Option<Error>,
}

struct Signature {
    header: String,
    token: Option<String>,
    nc: u32,
    epoch: SessionEpoch,
}

/// Owns the authenticated session with one device.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct SessionManager {
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    state: Mutex<Inner>,
    auth_gate: tokio::sync::Mutex<()>,
    exchange: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(credentials: Credentials, transport: Arc<dyn Transport>) -> Self {
        Self {
            credentials,
            transport,
            state: Mutex::new(Inner {
                session: AuthSession::default(),
                epoch: 0,
                last_failure: None,
            }),
            auth_gate: tokio::sync::Mutex::new(()),
            exchange: tokio::sync::Mutex::new(()),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn state(&self) -> SessionState {
        self.lock().session.state
    }

    /// Clone of the current session fields.
    pub fn snapshot(&self) -> AuthSession {
        self.lock().session.clone()
    }

    pub fn epoch(&self) -> SessionEpoch {
        SessionEpoch(self.lock().epoch)
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Run a full challenge round-trip, replacing any existing session.
    ///
    /// Probes [`PROBE_PATH`] unauthenticated, expects a `401` digest
    /// challenge, answers it, and requires `200`. Any failure leaves the
    /// session [`Unauthenticated`](SessionState::Unauthenticated).
    pub async fn authenticate(&self) -> Result<AuthSession, Error> {
        let _gate = self.auth_gate.lock().await;
        self.authenticate_locked().await
    }

    /// Authenticate unless a session is already established.
    ///
    /// Concurrent callers share one round-trip: whoever arrives while an
    /// authentication is in flight receives its outcome.
    pub async fn ensure_authenticated(&self) -> Result<(), Error> {
        let observed = {
            let inner = self.lock();
            if inner.session.is_authenticated() {
                return Ok(());
            }
            inner.epoch
        };

        let _gate = self.auth_gate.lock().await;

        {
            let inner = self.lock();
            if inner.session.is_authenticated() {
                return Ok(());
            }
            if inner.epoch != observed {
                if let Some(failure) = &inner.last_failure {
                    return Err(failure.clone());
                }
            }
        }

        self.authenticate_locked().await.map(|_| ())
    }

    /// Force a fresh challenge on next use and perform it now.
    pub async fn reauthenticate(&self) -> Result<(), Error> {
        self.mark_expired();
        self.ensure_authenticated().await
    }

    /// Re-authenticate after a `401` on a request signed under `epoch`.
    ///
    /// If the session was already renewed since then, the renewed session
    /// is reused instead of starting another round-trip.
    pub async fn reauthenticate_from(&self, epoch: SessionEpoch) -> Result<(), Error> {
        self.expire(epoch);
        self.ensure_authenticated().await
    }

    /// `Authenticated -> Expired`. No-op in any other state.
    pub fn mark_expired(&self) {
        let mut inner = self.lock();
        if inner.session.state == SessionState::Authenticated {
            inner.session.state = SessionState::Expired;
            info!("session marked expired");
        }
    }

    /// Expire the session only if it is still the one `epoch` refers to.
    pub fn expire(&self, epoch: SessionEpoch) -> bool {
        let mut inner = self.lock();
        if inner.epoch == epoch.0 && inner.session.state == SessionState::Authenticated {
            inner.session.state = SessionState::Expired;
            info!("session marked expired");
            true
        } else {
            false
        }
    }

    /// Drop the session `epoch` refers to after the device rejected it
    /// twice. The next command starts from `Unauthenticated`.
    pub fn invalidate(&self, epoch: SessionEpoch) -> bool {
        let mut inner = self.lock();
        if inner.epoch == epoch.0 && inner.session.state != SessionState::Unauthenticated {
            inner.session.state = SessionState::Unauthenticated;
            inner.session.session_token = None;
            warn!("session rejected after renewal; dropped");
            true
        } else {
            false
        }
    }

    async fn authenticate_locked(&self) -> Result<AuthSession, Error> {
        let result = self.challenge_round_trip().await;

        let mut inner = self.lock();
        inner.epoch += 1;
        match result {
            Ok(token) => {
                inner.session.state = SessionState::Authenticated;
                inner.session.session_token = token;
                inner.session.last_success_at = Some(Utc::now());
                inner.last_failure = None;
                info!(
                    realm = %inner.session.realm,
                    has_token = inner.session.session_token.is_some(),
                    "authenticated"
                );
                Ok(inner.session.clone())
            }
            Err(e) => {
                inner.session.state = SessionState::Unauthenticated;
                inner.last_failure = Some(e.clone());
                warn!(error = %e, "authentication failed");
                Err(e)
            }
        }
    }

    /// Probe, answer the challenge, and return the session token (if any).
    /// Stores realm/nonce and advances the counter as a side effect.
    async fn challenge_round_trip(&self) -> Result<Option<String>, Error> {
        if let Some(field) = self.credentials.missing_field() {
            return Err(Error::authentication(format!("{field} is not configured")));
        }

        self.lock().session.state = SessionState::Authenticating;
        debug!(host = %self.credentials.host, "requesting digest challenge");

        let probe = self.send_raw(probe_request()).await?;
        if probe.status != 401 {
            return Err(Error::protocol(format!(
                "unexpected response during authentication (HTTP {})",
                probe.status
            )));
        }
        let challenge = Challenge::from_headers(&probe.headers)?;

        let response = {
            let _wire = self.exchange.lock().await;
            let header = {
                let mut inner = self.lock();
                let session = &mut inner.session;
                if session.realm != challenge.realm || session.nonce != challenge.nonce {
                    session.realm.clone_from(&challenge.realm);
                    session.nonce.clone_from(&challenge.nonce);
                    session.request_counter = 1;
                }
                let nc = session.request_counter;
                session.request_counter = next_counter(nc)?;
                self.digest(&challenge.realm, &challenge.nonce)
                    .authorization("GET", PROBE_PATH, nc)
            };

            let mut request = probe_request();
            request
                .headers
                .insert(AUTHORIZATION, header_value(&header)?);
            debug!("answering digest challenge");
            self.send_raw(request).await?
        };

        match response.status {
            200 => Ok(wire::session_token(&response.headers)),
            401 => Err(Error::authentication("device rejected the credentials (HTTP 401)")),
            other => Err(Error::authentication(format!(
                "challenge response refused (HTTP {other})"
            ))),
        }
    }

    // ── Signed requests ──────────────────────────────────────────────

    /// Compute the `Authorization` value for the next request.
    ///
    /// Consumes one nonce-count. Fails with [`Error::NotAuthenticated`]
    /// unless the session is [`Authenticated`](SessionState::Authenticated).
    pub fn sign_request(&self, method: &str, path: &str) -> Result<String, Error> {
        self.sign(method, path).map(|s| s.header)
    }

    fn sign(&self, method: &str, path: &str) -> Result<Signature, Error> {
        let mut inner = self.lock();
        if !inner.session.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }

        let nc = inner.session.request_counter;
        let Ok(next) = next_counter(nc) else {
            inner.session.state = SessionState::Expired;
            warn!("nonce-count exhausted; forcing a new challenge");
            return Err(Error::NotAuthenticated);
        };
        inner.session.request_counter = next;

        let session = &inner.session;
        let header = self
            .digest(&session.realm, &session.nonce)
            .authorization(method, path, nc);
        Ok(Signature {
            header,
            token: session.session_token.clone(),
            nc,
            epoch: SessionEpoch(inner.epoch),
        })
    }

    /// Sign and send `request` under the current session.
    ///
    /// Does not authenticate on its own and does not interpret the status;
    /// callers decide what a `401` means for them. On `200` the success
    /// timestamp and any rotated session token are recorded.
    pub async fn send(&self, request: CommandRequest) -> Result<SignedResponse, Error> {
        let (signature, response) = {
            let _wire = self.exchange.lock().await;
            let signature = self.sign(request.method.as_str(), &request.path)?;

            let mut headers = request.headers;
            headers.insert(AUTHORIZATION, header_value(&signature.header)?);
            if let Some(token) = &signature.token {
                headers.insert(CSRF_HEADER, header_value(token)?);
            }

            debug!(method = %request.method, path = %request.path, nc = signature.nc, "signed request");
            let response = self
                .send_raw(HttpRequest {
                    method: request.method,
                    path: request.path,
                    headers,
                    body: request.body,
                })
                .await?;
            (signature, response)
        };

        if response.is_ok() {
            self.absorb_success(&response, signature.epoch);
        }

        Ok(SignedResponse {
            response,
            epoch: signature.epoch,
            nc: signature.nc,
        })
    }

    fn absorb_success(&self, response: &HttpResponse, epoch: SessionEpoch) {
        let mut inner = self.lock();
        if inner.epoch != epoch.0 {
            return;
        }
        inner.session.last_success_at = Some(Utc::now());
        if let Some(token) = wire::session_token(&response.headers) {
            if inner.session.session_token.as_deref() != Some(token.as_str()) {
                debug!("session token rotated");
            }
            inner.session.session_token = Some(token);
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn send_raw(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.transport
            .request(&self.credentials.host, self.credentials.port, request)
            .await
    }

    fn digest<'a>(&'a self, realm: &'a str, nonce: &'a str) -> DigestCredential<'a> {
        DigestCredential {
            username: &self.credentials.username,
            password: &self.credentials.password,
            realm,
            nonce,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn probe_request() -> HttpRequest {
    let mut request = HttpRequest::new(Method::GET, PROBE_PATH);
    request.headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    request
        .headers
        .insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    request
}

fn next_counter(nc: u32) -> Result<u32, Error> {
    nc.checked_add(1)
        .ok_or_else(|| Error::protocol("nonce-count exhausted"))
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::protocol(format!("value is not a valid header: {e}")))
}
