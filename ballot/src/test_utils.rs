use crate::{
    config::NodeConfig,
    error::Error,
    message::{CoordinatorAnnouncement, ElectionRequest},
    node::Node,
    transport::Transport,
    ElectionMode, NodeStatus, Peer, PeerId, Result,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Transport that records every call and fails for peers marked down.
///
/// Calls to a down peer are still recorded, so tests can see the attempt.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    elections: Mutex<Vec<(String, ElectionRequest)>>,
    announcements: Mutex<Vec<(String, CoordinatorAnnouncement)>>,
    probes: Mutex<Vec<String>>,
    down: DashSet<String>,
    statuses: Mutex<HashMap<String, NodeStatus>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, peer_id: &str) {
        self.down.insert(peer_id.to_string());
    }

    pub fn set_up(&self, peer_id: &str) {
        self.down.remove(peer_id);
    }

    /// Status reported by probes of `peer_id`. Unset peers report online.
    pub fn set_status(&self, peer_id: &str, status: NodeStatus) {
        self.statuses.lock().insert(peer_id.to_string(), status);
    }

    pub fn elections(&self) -> Vec<(String, ElectionRequest)> {
        self.elections.lock().clone()
    }

    pub fn announcements(&self) -> Vec<(String, CoordinatorAnnouncement)> {
        self.announcements.lock().clone()
    }

    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().clone()
    }

    fn reachable(&self, peer: &Peer) -> Result<()> {
        if self.down.contains(peer.id.as_str()) {
            Err(Error::transport(peer.url.clone(), "peer marked down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_election(&self, peer: &Peer, request: &ElectionRequest) -> Result<()> {
        self.elections
            .lock()
            .push((peer.id.to_string(), request.clone()));
        self.reachable(peer)
    }

    async fn announce_coordinator(
        &self,
        peer: &Peer,
        announcement: &CoordinatorAnnouncement,
    ) -> Result<()> {
        self.announcements
            .lock()
            .push((peer.id.to_string(), announcement.clone()));
        self.reachable(peer)
    }

    async fn probe_status(&self, peer: &Peer) -> Result<NodeStatus> {
        self.probes.lock().push(peer.id.to_string());
        self.reachable(peer)?;
        Ok(self
            .statuses
            .lock()
            .get(peer.id.as_str())
            .copied()
            .unwrap_or_default())
    }
}

/// In-memory network delivering calls straight to registered nodes.
///
/// Nodes are looked up by their advertised url. A node switched down, or
/// one that was dropped, is unreachable.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    nodes: DashMap<String, Weak<Node>>,
    down: DashSet<String>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: &Arc<Node>) {
        self.nodes
            .insert(node.config().advertised_url.clone(), Arc::downgrade(node));
    }

    /// Cuts every link to and from the node with this url.
    pub fn take_down(&self, url: &str) {
        self.down.insert(url.to_string());
    }

    pub fn bring_up(&self, url: &str) {
        self.down.remove(url);
    }

    fn route(&self, peer: &Peer) -> Result<Arc<Node>> {
        if self.down.contains(&peer.url) {
            return Err(Error::transport(peer.url.clone(), "link down"));
        }
        self.nodes
            .get(&peer.url)
            .and_then(|entry| entry.upgrade())
            .ok_or_else(|| Error::transport(peer.url.clone(), "no such node"))
    }
}

#[async_trait]
impl Transport for LocalNetwork {
    async fn send_election(&self, peer: &Peer, request: &ElectionRequest) -> Result<()> {
        self.route(peer)?
            .elections()
            .receive_election(request.clone())
            .map_err(|e| Error::transport(peer.url.clone(), e))
    }

    async fn announce_coordinator(
        &self,
        peer: &Peer,
        announcement: &CoordinatorAnnouncement,
    ) -> Result<()> {
        self.route(peer)?
            .elections()
            .receive_announcement(announcement.clone())
            .map_err(|e| Error::transport(peer.url.clone(), e))
    }

    async fn probe_status(&self, peer: &Peer) -> Result<NodeStatus> {
        Ok(self.route(peer)?.info().status)
    }
}

pub fn node_url(id: u64) -> String {
    format!("http://node{id}.test/")
}

/// Builds one node per id, every node knowing every other (and itself).
/// Nodes are registered on the returned network but not started.
pub fn create_test_cluster(
    ids: &[u64],
    mode: ElectionMode,
) -> Result<(Vec<Arc<Node>>, Arc<LocalNetwork>)> {
    let network = Arc::new(LocalNetwork::new());
    let peers: Vec<Peer> = ids
        .iter()
        .map(|id| Peer::new(id.to_string(), format!("node{id}"), node_url(*id)))
        .collect();

    let nodes = ids
        .iter()
        .map(|id| {
            let mut config = NodeConfig {
                node_id: PeerId::new(id.to_string()),
                advertised_url: node_url(*id),
                election_mode: mode,
                peers: peers.clone(),
                ..NodeConfig::default()
            };
            config.service.name = format!("node{id}");
            let node = Arc::new(Node::new(config, network.clone())?);
            network.register(&node);
            Ok(node)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((nodes, network))
}

/// Polls until `node` records `expected` as coordinator or `timeout` passes.
pub async fn wait_for_coordinator(node: &Node, expected: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if node.elections().coordinator().current.as_str() == expected {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}
