use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// rkcsi - CSI node plugin for ephemeral inline volumes
#[derive(Parser, Debug)]
#[command(name = "rkcsi")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log output format
    #[arg(
        long,
        global = true,
        env = "RKCSI_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the node plugin on a unix socket
    Serve(ServeArgs),
    /// Print the NodeGetInfo response of a running plugin
    NodeInfo(ClientArgs),
    /// Print the GetPluginInfo response of a running plugin
    PluginInfo(ClientArgs),
    /// Check that a running plugin answers Probe
    Probe(ClientArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Identifier of this node, reported verbatim by NodeGetInfo
    #[arg(long, env = "NODE_ID", default_value = "")]
    pub node_id: String,

    /// Unix socket the plugin listens on
    #[arg(long, env = "CSI_SOCKET_PATH", value_name = "PATH")]
    pub socket_path: PathBuf,

    /// Directory holding the tmpfs with volume payloads
    #[arg(
        long,
        env = "RKCSI_STORAGE_DIR",
        value_name = "DIR",
        default_value = "/var/lib/rkcsi/volumes"
    )]
    pub storage_dir: PathBuf,

    /// Driver name reported by GetPluginInfo
    #[arg(long, env = "RKCSI_DRIVER_NAME", default_value = "csi-driver.rk8s.io")]
    pub driver_name: String,

    /// Driver version reported by GetPluginInfo
    #[arg(long, env = "RKCSI_DRIVER_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub driver_version: String,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Unix socket of the running plugin
    #[arg(long, env = "CSI_SOCKET_PATH", value_name = "PATH")]
    pub socket_path: PathBuf,
}
