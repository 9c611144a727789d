//! Clap derive structures for the `tieline` CLI.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tieline -- route audio on Tieline codecs from the command line
#[derive(Debug, Parser)]
#[command(
    name = "tieline",
    version,
    about = "Control the audio routing matrix of a Tieline device",
    long_about = "Authenticates to a Tieline device with HTTP Digest, keeps the\n\
        session alive, and issues routing commands against its matrix API.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "TIELINE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device address, IP or hostname (overrides profile)
    #[arg(long, short = 'H', env = "TIELINE_HOST", global = true)]
    pub host: Option<String>,

    /// Device HTTP port (overrides profile)
    #[arg(long, env = "TIELINE_PORT", global = true)]
    pub port: Option<u16>,

    /// Username (overrides profile)
    #[arg(long, short = 'u', env = "TIELINE_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password (overrides profile)
    #[arg(long, env = "TIELINE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "TIELINE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate once and report the session
    Auth,

    /// Route one or more inputs to an output
    #[command(alias = "r")]
    Route(RouteArgs),

    /// Disable an output (route nothing to it)
    Disable(DisableArgs),

    /// Print the device's matrix feature list
    Features,

    /// Stay connected and keep the session alive until Ctrl-C
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// Output id (e.g. "hpl")
    pub output: String,

    /// Input ids; none disables the output
    pub inputs: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DisableArgs {
    /// Output id
    pub output: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Keep-alive period in seconds (overrides profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
