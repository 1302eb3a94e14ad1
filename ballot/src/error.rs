use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Why a lease release reported `Gone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoneReason {
    Missing,
    Expired,
}

impl fmt::Display for GoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoneReason::Missing => f.write_str("does not exist"),
            GoneReason::Expired => f.write_str("had already expired"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid lease key {0:?}")]
    InvalidKey(String),

    #[error("Lease expired or not found")]
    Unauthorized,

    #[error("Lease {0} is currently held")]
    Conflict(Uuid),

    #[error("Lease {id} {reason}")]
    Gone { id: Uuid, reason: GoneReason },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport failure talking to {peer}: {reason}")]
    Transport { peer: String, reason: String },

    #[error("Node is offline")]
    Offline,

    #[error("Malformed peer: {0}")]
    InvalidPeer(String),

    #[error("A peer with id or name {0:?} already exists")]
    DuplicatePeer(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn transport(peer: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::Transport {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
