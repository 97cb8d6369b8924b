use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "p2pkit", author = "Lambdaclass", about = "RLPx/SSB peer-to-peer session toolkit")]
pub struct Cli {
    #[arg(long, default_value = "info", value_name = "LOG_LEVEL")]
    pub log_level: String,

    #[arg(long, default_value = "p2pkit.toml", value_name = "CONFIG_PATH")]
    pub config: String,

    #[arg(long, value_name = "DATA_DIRECTORY")]
    pub datadir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Listen for inbound RLPx connections and run the ECIES handshake,
    /// Hello exchange, and main peer loop against whoever dials in.
    RlpxListen,
    /// Dial a remote RLPx node and run the same handshake/loop as the
    /// initiator.
    RlpxDial {
        #[arg(value_name = "HOST:PORT")]
        addr: String,
        #[arg(value_name = "REMOTE_NODE_ID_HEX")]
        remote_node_id: String,
    },
    /// Listen for inbound SSB connections and run the secret-handshake
    /// protocol against whoever dials in.
    SsbListen,
}

pub fn cli() -> Cli {
    Cli::parse()
}
