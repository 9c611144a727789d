use thiserror::Error;

/// Top-level error type for the `tieline-api` crate.
///
/// Covers every failure mode of the session layer: authentication,
/// challenge/protocol shape, and transport. `tieline-core` maps these
/// into operation-level diagnostics.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Challenge-response failed (wrong credentials, repeated 401, missing config).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A signed request was requested while no session is established.
    #[error("Not authenticated -- call authenticate() first")]
    NotAuthenticated,

    // ── Protocol ────────────────────────────────────────────────────
    /// The device answered with an unexpected status or challenge shape.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Connection refused, DNS failure, reset, unreadable body.
    #[error("HTTP transport error: {message}")]
    Transport { message: String },

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl Error {
    /// Returns `true` if this is a network-level error worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }
}
