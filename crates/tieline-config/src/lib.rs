//! Shared configuration for the Tieline CLI.
//!
//! TOML device profiles, password resolution (env + plaintext), and
//! translation to `tieline_core::DeviceConfig`. The CLI layers its
//! `GlobalOpts` flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tieline_core::DeviceConfig;

/// Environment variable consulted for the password when a profile
/// names no `password_env` (or that variable is unset).
pub const PASSWORD_ENV: &str = "TIELINE_PASSWORD";

/// Environment variable consulted when a profile has no username.
pub const USERNAME_ENV: &str = "TIELINE_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: the explicit one, else `default_profile`.
    pub fn profile_name<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Values applied to every profile that does not override them.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Keep-alive period in seconds. Zero disables the keep-alive.
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            keepalive_interval: default_keepalive(),
        }
    }
}

fn default_timeout() -> u64 {
    tieline_core::config::DEFAULT_TIMEOUT.as_secs()
}
fn default_keepalive() -> u64 {
    tieline_core::config::DEFAULT_KEEPALIVE_INTERVAL.as_secs()
}

/// A named device profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Device address, IP or hostname without scheme.
    pub host: String,

    /// HTTP port; the device default when unset.
    pub port: Option<u16>,

    pub username: Option<String>,

    /// Password in plaintext. Prefer `password_env`.
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,

    pub timeout: Option<u64>,

    pub keepalive_interval: Option<u64>,

    /// Override for the feature-list resource path.
    pub features_path: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "tieline", "tieline").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("tieline");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then overlay `TIELINE_*` environment variables.
///
/// A missing file is not an error; defaults apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TIELINE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve the username: profile first, then `TIELINE_USERNAME`.
pub fn resolve_username(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Resolve the password from the credential chain (no CLI flag step).
pub fn resolve_password(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. TIELINE_PASSWORD
    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Reject addresses the transport would misinterpret.
pub fn validate_host(host: &str) -> Result<(), ConfigError> {
    let reason = if host.is_empty() {
        "must not be empty"
    } else if host.contains("://") {
        "must not include a scheme"
    } else if host.contains(['/', ' ']) {
        "must be a bare IP or hostname"
    } else {
        return Ok(());
    };
    Err(ConfigError::Validation {
        field: "host".into(),
        reason: reason.into(),
    })
}

/// Build a `DeviceConfig` from a profile, no CLI flag overrides.
pub fn profile_to_device_config(
    profile: &Profile,
    defaults: &Defaults,
    profile_name: &str,
) -> Result<DeviceConfig, ConfigError> {
    validate_host(&profile.host)?;

    let username = resolve_username(profile, profile_name)?;
    let password = resolve_password(profile, profile_name)?;

    let mut config = DeviceConfig::new(profile.host.clone(), username, password);
    if let Some(port) = profile.port {
        config.port = port;
    }
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.keepalive_interval = Duration::from_secs(
        profile
            .keepalive_interval
            .unwrap_or(defaults.keepalive_interval),
    );
    if let Some(ref path) = profile.features_path {
        config.features_path.clone_from(path);
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "studio"

[defaults]
timeout = 10

[profiles.studio]
host = "192.168.1.50"
username = "admin"
password = "plain"
keepalive_interval = 30

[profiles.remote]
host = "10.0.0.7"
port = 8443
username = "ops"
password_env = "REMOTE_PW"
"#;

    #[test]
    fn load_merges_file_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let cfg = load_config_from(Path::new("config.toml")).unwrap();

            assert_eq!(cfg.profile_name(None), "studio");
            assert_eq!(cfg.defaults.timeout, 10);
            assert_eq!(cfg.defaults.keepalive_interval, 60);
            assert_eq!(cfg.profile("remote").unwrap().port, Some(8443));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let cfg = load_config_from(Path::new("absent.toml")).unwrap();
            assert_eq!(cfg.profile_name(None), "default");
            assert!(cfg.profiles.is_empty());
            assert!(matches!(
                cfg.profile("default"),
                Err(ConfigError::UnknownProfile { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("TIELINE_PROFILES__STUDIO__HOST", "192.168.1.99");
            jail.set_env("TIELINE_DEFAULTS__TIMEOUT", "5");

            let cfg = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(cfg.profile("studio").unwrap().host, "192.168.1.99");
            assert_eq!(cfg.defaults.timeout, 5);
            Ok(())
        });
    }

    #[test]
    fn password_chain_order() {
        Jail::expect_with(|jail| {
            let mut profile = Profile {
                host: "h".into(),
                password: Some("plain".into()),
                password_env: Some("MY_PW".into()),
                ..Profile::default()
            };

            let pw = resolve_password(&profile, "p").unwrap();
            assert_eq!(pw.expose_secret(), "plain");

            jail.set_env(PASSWORD_ENV, "global");
            let pw = resolve_password(&profile, "p").unwrap();
            assert_eq!(pw.expose_secret(), "global");

            jail.set_env("MY_PW", "named");
            let pw = resolve_password(&profile, "p").unwrap();
            assert_eq!(pw.expose_secret(), "named");

            profile.password_env = Some("UNSET_PW".into());
            let pw = resolve_password(&profile, "p").unwrap();
            assert_eq!(pw.expose_secret(), "global", "unset named var falls through");
            Ok(())
        });
    }

    #[test]
    fn no_password_anywhere_is_an_error() {
        Jail::expect_with(|_| {
            let profile = Profile {
                host: "h".into(),
                username: Some("admin".into()),
                ..Profile::default()
            };
            assert!(matches!(
                resolve_password(&profile, "studio"),
                Err(ConfigError::NoCredentials { profile }) if profile == "studio"
            ));
            Ok(())
        });
    }

    #[test]
    fn profile_translates_to_device_config() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("REMOTE_PW", "secret");
            let cfg = load_config_from(Path::new("config.toml")).unwrap();

            let studio =
                profile_to_device_config(cfg.profile("studio").unwrap(), &cfg.defaults, "studio")
                    .unwrap();
            assert_eq!(studio.host, "192.168.1.50");
            assert_eq!(studio.port, 8080);
            assert_eq!(studio.timeout, Duration::from_secs(10));
            assert_eq!(studio.keepalive_interval, Duration::from_secs(30));
            assert_eq!(studio.features_path, "/api/matrix-features");

            let remote =
                profile_to_device_config(cfg.profile("remote").unwrap(), &cfg.defaults, "remote")
                    .unwrap();
            assert_eq!(remote.port, 8443);
            assert_eq!(remote.username, "ops");
            assert_eq!(remote.password.expose_secret(), "secret");
            assert_eq!(remote.keepalive_interval, Duration::from_secs(60));
            Ok(())
        });
    }

    #[test]
    fn host_must_be_bare() {
        assert!(validate_host("192.168.1.50").is_ok());
        assert!(validate_host("tieline.local").is_ok());
        for bad in ["", "http://10.0.0.1", "10.0.0.1/api"] {
            assert!(
                matches!(validate_host(bad), Err(ConfigError::Validation { .. })),
                "{bad:?} accepted"
            );
        }
    }
}
