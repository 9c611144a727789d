use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Default control port of the device's embedded web server.
pub const DEFAULT_PORT: u16 = 8080;

/// Login credentials for one device.
///
/// Immutable once built. All fields must be non-empty before the
/// session layer will attempt a challenge round-trip.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password,
        }
    }

    /// Name of the first missing field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.host.trim().is_empty() {
            Some("host")
        } else if self.username.is_empty() {
            Some("username")
        } else if self.password.expose_secret().is_empty() {
            Some("password")
        } else {
            None
        }
    }

    /// `http://host:port` -- used for `Origin` and `Referer` headers.
    pub fn origin(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Lifecycle of the authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    /// A 401 was observed on an authenticated request. Realm and nonce are
    /// kept but the next use forces a full re-challenge.
    Expired,
}

/// Snapshot of the digest session.
///
/// Owned by [`SessionManager`](crate::SessionManager); callers only ever
/// see clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub realm: String,
    pub nonce: String,
    /// Value of the `csrfCookie` cookie, echoed as `X-CSRF-Token`.
    pub session_token: Option<String>,
    /// Next nonce-count to use. Always >= 1.
    pub request_counter: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub state: SessionState,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self {
            realm: String::new(),
            nonce: String::new(),
            session_token: None,
            request_counter: 1,
            last_success_at: None,
            state: SessionState::Unauthenticated,
        }
    }
}

impl AuthSession {
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }
}
