//! Command dispatch: one handler per subcommand.

use std::time::Duration;

use tieline_core::{Device, DeviceConfig};

use crate::cli::{Command, RouteArgs, WatchArgs};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, mut config: DeviceConfig) -> Result<(), CliError> {
    if let Command::Watch(WatchArgs {
        interval: Some(secs),
    }) = &cmd
    {
        config.keepalive_interval = Duration::from_secs(*secs);
    }

    let device = Device::new(config)?;
    let result = run(cmd, &device).await;
    device.shutdown().await;
    result
}

async fn run(cmd: Command, device: &Device) -> Result<(), CliError> {
    match cmd {
        Command::Auth => auth(device).await,
        Command::Route(args) => route(device, args).await,
        Command::Disable(args) => {
            device.disable_output(&args.output).await?;
            println!("Output {} disabled", args.output);
            Ok(())
        }
        Command::Features => {
            let features = device.query_features().await?;
            println!("{}", features.as_str());
            Ok(())
        }
        Command::Watch(_) => watch(device).await,
        Command::Completions(_) => Err(CliError::Internal(
            "completions are generated without a device".into(),
        )),
    }
}

async fn auth(device: &Device) -> Result<(), CliError> {
    device.authenticate().await?;
    let session = device.session();
    let config = device.config();
    println!(
        "Authenticated to {}:{} as {} (realm \"{}\")",
        config.host,
        config.port,
        config.username,
        session.realm
    );
    if session.session_token.is_none() {
        println!("Device issued no session token");
    }
    Ok(())
}

async fn route(device: &Device, args: RouteArgs) -> Result<(), CliError> {
    device.set_route(&args.output, &args.inputs).await?;
    if args.inputs.is_empty() {
        println!("Output {} disabled", args.output);
    } else {
        println!("Routed {} -> {}", args.inputs.join(","), args.output);
    }
    Ok(())
}

async fn watch(device: &Device) -> Result<(), CliError> {
    device.connect().await?;
    let interval = device.config().keepalive_interval;
    if interval.is_zero() {
        println!("Connected; keep-alive disabled. Press Ctrl-C to exit.");
    } else {
        println!(
            "Connected; keep-alive every {}s. Press Ctrl-C to exit.",
            interval.as_secs()
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted; shutting down");
    Ok(())
}
