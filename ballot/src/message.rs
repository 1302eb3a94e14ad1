use crate::{NodeStatus, PeerId};
use serde::{Deserialize, Serialize};

/// Election message delivered to a peer's election inbox.
///
/// In ring mode `path` carries the identities visited so far; bully probes
/// send an empty path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionRequest {
    #[serde(rename = "id")]
    pub election_id: String,
    #[serde(rename = "dados", default)]
    pub path: Option<Vec<PeerId>>,
}

impl ElectionRequest {
    pub fn ring(election_id: impl Into<String>, path: Vec<PeerId>) -> Self {
        Self {
            election_id: election_id.into(),
            path: Some(path),
        }
    }

    pub fn probe(election_id: impl Into<String>) -> Self {
        Self {
            election_id: election_id.into(),
            path: Some(Vec::new()),
        }
    }
}

/// Result of an election, broadcast by the node that concluded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorAnnouncement {
    #[serde(rename = "coordenador")]
    pub coordinator: PeerId,
    #[serde(rename = "id_eleicao")]
    pub election_id: String,
}

/// The part of a peer's `/info` document the liveness probe cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub status: String,
}

impl StatusReport {
    /// Anything other than "online" counts as offline.
    pub fn node_status(&self) -> NodeStatus {
        if self.status.eq_ignore_ascii_case("online") {
            NodeStatus::Online
        } else {
            NodeStatus::Offline
        }
    }
}
