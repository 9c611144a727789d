// ── Runtime device configuration ──
//
// Describes *how* to reach one device. Carries credential data and
// connection tuning, but never touches disk. The CLI (or any host)
// builds a `DeviceConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

use tieline_api::{Credentials, DEFAULT_PORT, TransportConfig};

/// Keep-alive period used by the device's own web UI.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Request timeout applied by the HTTP transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resource answering with the matrix feature list.
pub const DEFAULT_FEATURES_PATH: &str = "/api/matrix-features";

/// Configuration for one device connection.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device address (IP or hostname, no scheme).
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Per-request transport timeout.
    pub timeout: Duration,
    /// How often the keep-alive probe fires. Zero disables it.
    pub keepalive_interval: Duration,
    /// Path of the feature-list document.
    pub features_path: String,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password,
            ..Self::default()
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.host.clone(),
            self.port,
            self.username.clone(),
            self.password.clone(),
        )
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: SecretString::from(String::new()),
            timeout: DEFAULT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            features_path: DEFAULT_FEATURES_PATH.into(),
        }
    }
}
