#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod config;
pub mod election;
pub mod error;
pub mod lease;
pub mod liveness;
pub mod message;
pub mod node;
pub mod peer;
pub mod time;
pub mod transport;

pub mod test_utils;

pub use error::{Error, GoneReason, Result};
pub use peer::{Peer, PeerId};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Self-reported availability of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Online,
    Offline,
}

impl NodeStatus {
    pub fn is_online(self) -> bool {
        self == NodeStatus::Online
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => f.write_str("online"),
            NodeStatus::Offline => f.write_str("offline"),
        }
    }
}

/// Which election protocol a node runs when it starts or joins an election.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectionMode {
    #[default]
    #[serde(rename = "anel", alias = "ring")]
    Ring,
    #[serde(rename = "valentao", alias = "bully")]
    Bully,
}

impl fmt::Display for ElectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElectionMode::Ring => f.write_str("anel"),
            ElectionMode::Bully => f.write_str("valentao"),
        }
    }
}

impl FromStr for ElectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anel" | "ring" => Ok(ElectionMode::Ring),
            "valentao" | "bully" => Ok(ElectionMode::Bully),
            other => Err(Error::InvalidRequest(format!(
                "unknown election mode {other:?}"
            ))),
        }
    }
}
