//! `GlobalOpts`-aware wrappers over `tieline_config`.
//!
//! Flags win over the profile, the profile wins over defaults. Core
//! receives a finished `DeviceConfig` and never sees these types.

use std::time::Duration;

use secrecy::SecretString;

use tieline_config::{Config, Profile, config_path, profile_to_device_config, validate_host};
use tieline_core::DeviceConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Build a `DeviceConfig` from the config file, profile, and CLI overrides.
pub fn build_device_config(global: &GlobalOpts) -> Result<DeviceConfig, CliError> {
    let cfg = tieline_config::load_config()?;
    resolve(&cfg, global)
}

pub fn resolve(cfg: &Config, global: &GlobalOpts) -> Result<DeviceConfig, CliError> {
    let profile_name = cfg.profile_name(global.profile.as_deref());

    match cfg.profiles.get(profile_name) {
        Some(profile) => resolve_profile(profile, cfg, profile_name, global),
        // Asking for a profile by name and not finding it is an error;
        // otherwise fall back to flags / env vars alone.
        None if global.profile.is_some() => Err(CliError::ProfileNotFound {
            name: profile_name.into(),
            available: available_profiles(cfg),
        }),
        None => from_flags(cfg, profile_name, global),
    }
}

fn resolve_profile(
    profile: &Profile,
    cfg: &Config,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<DeviceConfig, CliError> {
    // Flags replace profile fields before credential resolution runs.
    let merged = Profile {
        host: global.host.clone().unwrap_or_else(|| profile.host.clone()),
        port: global.port.or(profile.port),
        username: global.username.clone().or_else(|| profile.username.clone()),
        password: global.password.clone().or_else(|| profile.password.clone()),
        password_env: if global.password.is_some() {
            None
        } else {
            profile.password_env.clone()
        },
        timeout: global.timeout.or(profile.timeout),
        keepalive_interval: profile.keepalive_interval,
        features_path: profile.features_path.clone(),
    };
    let mut config = profile_to_device_config(&merged, &cfg.defaults, profile_name)?;
    if let Some(ref password) = global.password {
        config.password = SecretString::from(password.clone());
    }
    Ok(config)
}

fn from_flags(
    cfg: &Config,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<DeviceConfig, CliError> {
    let host = global.host.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    validate_host(host)?;

    let (Some(username), Some(password)) = (&global.username, &global.password) else {
        return Err(CliError::NoCredentials {
            profile: profile_name.into(),
        });
    };

    let mut config = DeviceConfig::new(
        host,
        username.clone(),
        SecretString::from(password.clone()),
    );
    if let Some(port) = global.port {
        config.port = port;
    }
    config.timeout = Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout));
    config.keepalive_interval = Duration::from_secs(cfg.defaults.keepalive_interval);
    Ok(config)
}

fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn opts() -> GlobalOpts {
        GlobalOpts {
            profile: None,
            host: None,
            port: None,
            username: None,
            password: None,
            timeout: None,
            verbose: 0,
            log_json: false,
        }
    }

    fn config_with_studio() -> Config {
        let mut cfg = Config {
            default_profile: Some("studio".into()),
            ..Config::default()
        };
        cfg.profiles.insert(
            "studio".into(),
            Profile {
                host: "192.168.1.50".into(),
                username: Some("admin".into()),
                password: Some("plain".into()),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn flags_override_profile() {
        let cfg = config_with_studio();
        let global = GlobalOpts {
            host: Some("10.0.0.9".into()),
            port: Some(9000),
            password: Some("flag".into()),
            timeout: Some(3),
            ..opts()
        };

        let device = resolve(&cfg, &global).unwrap();
        assert_eq!(device.host, "10.0.0.9");
        assert_eq!(device.port, 9000);
        assert_eq!(device.username, "admin");
        assert_eq!(device.password.expose_secret(), "flag");
        assert_eq!(device.timeout, Duration::from_secs(3));
    }

    #[test]
    fn unknown_explicit_profile_lists_available() {
        let cfg = config_with_studio();
        let global = GlobalOpts {
            profile: Some("nope".into()),
            ..opts()
        };

        match resolve(&cfg, &global) {
            Err(CliError::ProfileNotFound { name, available }) => {
                assert_eq!(name, "nope");
                assert_eq!(available, "studio");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flags_alone_need_host_and_credentials() {
        let cfg = Config::default();

        assert!(matches!(
            resolve(&cfg, &opts()),
            Err(CliError::NoConfig { .. })
        ));

        let host_only = GlobalOpts {
            host: Some("10.0.0.9".into()),
            ..opts()
        };
        assert!(matches!(
            resolve(&cfg, &host_only),
            Err(CliError::NoCredentials { .. })
        ));

        let full = GlobalOpts {
            host: Some("10.0.0.9".into()),
            username: Some("admin".into()),
            password: Some("pw".into()),
            ..opts()
        };
        let device = resolve(&cfg, &full).unwrap();
        assert_eq!(device.port, 8080);
        assert_eq!(device.keepalive_interval, Duration::from_secs(60));
    }

    #[test]
    fn scheme_in_host_is_rejected() {
        let global = GlobalOpts {
            host: Some("http://10.0.0.9".into()),
            username: Some("admin".into()),
            password: Some("pw".into()),
            ..opts()
        };
        assert!(matches!(
            resolve(&Config::default(), &global),
            Err(CliError::Validation { .. })
        ));
    }
}
