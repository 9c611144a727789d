// ── Core error types ──
//
// Operation-level errors from tieline-core. The `From<tieline_api::Error>`
// impl folds session-layer failures into the transport / protocol / auth /
// command classes hosts act on.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach device: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Device request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Session errors ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Unexpected device response: {message}")]
    Protocol { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("{operation} rejected by device (HTTP {status})")]
    CommandRejected { operation: String, status: u16 },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status attached to the failure, if the device answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::CommandRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if fixing credentials is the likely remedy.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. }
                | Self::NotAuthenticated
                | Self::CommandRejected { status: 401, .. }
        )
    }

    /// Returns `true` for network-level failures worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }
}

// ── Conversion from session-layer errors ─────────────────────────────

impl From<tieline_api::Error> for CoreError {
    fn from(err: tieline_api::Error) -> Self {
        match err {
            tieline_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            tieline_api::Error::NotAuthenticated => CoreError::NotAuthenticated,
            tieline_api::Error::Protocol { message } => CoreError::Protocol { message },
            tieline_api::Error::Transport { message } => {
                CoreError::ConnectionFailed { reason: message }
            }
            tieline_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            tieline_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid device address: {e}"),
            },
            tieline_api::Error::Client(msg) => CoreError::Internal(msg),
        }
    }
}
