use std::net::SocketAddr;
use std::path::PathBuf;

use ballot::ElectionMode;
use clap::{ArgAction, Parser};

#[derive(Debug, Parser)]
#[command(name = "ballotd", version, about, long_about = None)]
pub struct Cli {
    /// TOML node configuration
    #[arg(short, long, value_name = "FILE", env = "BALLOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the HTTP API listens on
    #[arg(long, env = "BALLOT_BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Numeric node id, overrides the config file
    #[arg(long, env = "BALLOT_NODE_ID")]
    pub node_id: Option<String>,

    /// Base URL peers use to reach this node
    #[arg(long, env = "BALLOT_URL")]
    pub url: Option<String>,

    /// Election protocol (anel/ring or valentao/bully)
    #[arg(long, env = "BALLOT_ELECTION_MODE")]
    pub mode: Option<ElectionMode>,

    /// Remote audit log collector
    #[arg(long, env = "BALLOT_LOG_SERVER")]
    pub log_server: Option<String>,

    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, action = ArgAction::Count)]
    pub verbosity: u8,
}

impl Cli {
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub fn log_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
