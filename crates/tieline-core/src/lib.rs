// tieline-core: Session keep-alive and command pipeline between tieline-api and hosts.

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod keepalive;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{CommandPipeline, FeatureList, RouteUpdate};
pub use config::DeviceConfig;
pub use device::Device;
pub use error::CoreError;
pub use keepalive::{KeepAliveLoop, TickOutcome};

pub use tieline_api::{AuthSession, SessionState};
