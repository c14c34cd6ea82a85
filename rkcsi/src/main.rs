//! `rkcsi` runs the ephemeral inline volume node plugin and offers a few
//! diagnostic calls against a running instance.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use libcsi::transport::{CsiClient, CsiServer};
use libcsi::{
    CsiMessage, FilesystemStore, IdentityServer, NodeServer, SystemMounter, VolumeLifecycle,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, info_span};

mod cli;

use cli::{ClientArgs, Cli, Command, LogFormat, ServeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::NodeInfo(args) => call(args, CsiMessage::GetNodeInfo).await,
        Command::PluginInfo(args) => call(args, CsiMessage::GetPluginInfo).await,
        Command::Probe(args) => call(args, CsiMessage::Probe).await,
    }
}

fn init_logging(format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!(
        node_id = %args.node_id,
        driver = %args.driver_name,
        version = %args.driver_version,
        "starting CSI node plugin"
    );

    let mounter = SystemMounter::new();
    let storage = FilesystemStore::new(
        &args.storage_dir,
        &mounter,
        info_span!("storage", subsystem = "filesystem"),
    )
    .with_context(|| format!("failed to set up storage at {}", args.storage_dir.display()))?;

    let identity = Arc::new(IdentityServer::new(args.driver_name, args.driver_version));
    let lifecycle = VolumeLifecycle::new(storage.into(), mounter, info_span!("lifecycle"));
    let node = Arc::new(NodeServer::new(args.node_id, lifecycle));

    let server = CsiServer::bind(&args.socket_path, identity, node)
        .context("failed to start CSI server")?;

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let outcome = tokio::select! {
        res = server.serve() => res.context("CSI server stopped"),
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!(error = %e, "serve loop failed");
    }
    server
        .shutdown()
        .await
        .context("failed to shut down CSI server")?;
    outcome
}

async fn call(args: ClientArgs, request: CsiMessage) -> Result<()> {
    let client = CsiClient::connect(&args.socket_path)
        .await
        .with_context(|| format!("failed to reach plugin at {}", args.socket_path.display()))?;
    let response = client
        .request(&request)
        .await
        .with_context(|| format!("{request} failed"))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if let CsiMessage::Error(e) = response {
        bail!("{request} returned {:?}: {e}", e.code());
    }
    Ok(())
}
