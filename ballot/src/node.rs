use crate::{
    audit::AuditLog,
    config::NodeConfig,
    election::ElectionCoordinator,
    lease::LeaseManager,
    liveness::LivenessMonitor,
    peer::PeerDirectory,
    transport::Transport,
    ElectionMode, Error, NodeStatus, Result,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Self-description served on `/info`. Peers read `status` from it when
/// probing the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub server_name: String,
    pub server_endpoint: String,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "versao")]
    pub version: f64,
    pub status: NodeStatus,
    #[serde(rename = "tipo_de_eleicao_ativa")]
    pub election_mode: ElectionMode,
}

impl ServiceInfo {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            server_name: config.service.name.clone(),
            server_endpoint: config.service_endpoint(),
            description: config.service.description.clone(),
            version: config.service.version,
            status: NodeStatus::Online,
            election_mode: config.election_mode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let blank = [
            ("server_name", &self.server_name),
            ("server_endpoint", &self.server_endpoint),
            ("descricao", &self.description),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());
        if let Some((field, _)) = blank {
            return Err(Error::InvalidRequest(format!("{field} must not be empty")));
        }
        if !(self.version.is_finite() && self.version > 0.0) {
            return Err(Error::InvalidRequest(format!(
                "versao must be positive, got {}",
                self.version
            )));
        }
        Ok(())
    }
}

pub type SharedInfo = Arc<RwLock<ServiceInfo>>;

/// One participant: info, peers, elections, leases and the liveness loop.
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    info: SharedInfo,
    peers: Arc<PeerDirectory>,
    elections: ElectionCoordinator,
    leases: Arc<LeaseManager>,
    liveness: LivenessMonitor,
    audit: AuditLog,
}

impl Node {
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let audit = match &config.log_server_url {
            Some(url) => AuditLog::with_collector(
                config.advertised_url.clone(),
                url.clone(),
                config.request_timeout(),
            )?,
            None => AuditLog::local(config.advertised_url.clone()),
        };

        let peers = Arc::new(PeerDirectory::new());
        for peer in &config.peers {
            peers.add(peer.clone())?;
        }

        let info: SharedInfo = Arc::new(RwLock::new(ServiceInfo::from_config(&config)));
        let elections = ElectionCoordinator::new(
            &config,
            info.clone(),
            peers.clone(),
            transport.clone(),
            audit.clone(),
        );
        let liveness = LivenessMonitor::new(
            config.liveness_interval(),
            config.jitter_range(),
            info.clone(),
            peers.clone(),
            transport,
            Arc::new(elections.clone()),
            audit.clone(),
        );
        let leases = Arc::new(LeaseManager::new(config.lease_ttl()));

        Ok(Self {
            config,
            info,
            peers,
            elections,
            leases,
            liveness,
            audit,
        })
    }

    /// Starts the liveness loop and, when online, announces the node and
    /// kicks off the first election. The loop idles while the node is
    /// offline and picks up once it comes back.
    pub fn start(&self) {
        self.liveness.start();
        if !self.info.read().status.is_online() {
            info!(node_id = %self.config.node_id, "node starting offline");
            return;
        }
        self.audit
            .attention("Service started", format!("Node {} is up", self.config.node_id));
        self.elections.start_election();
        info!(node_id = %self.config.node_id, "node started");
    }

    pub async fn shutdown(&self) {
        self.liveness.stop().await;
        info!(node_id = %self.config.node_id, "node stopped");
    }

    pub fn info(&self) -> ServiceInfo {
        self.info.read().clone()
    }

    /// Replaces the service description wholesale. Coming back online this
    /// way starts a new election.
    pub fn replace_info(&self, info: ServiceInfo) -> Result<ServiceInfo> {
        info.validate()?;
        let revived = {
            let mut current = self.info.write();
            let revived = !current.status.is_online() && info.status.is_online();
            *current = info.clone();
            revived
        };
        info!(status = %info.status, mode = %info.election_mode, "service info replaced");
        if revived {
            self.elections.start_election();
        }
        Ok(info)
    }

    /// Flips the status flag. Going back online does not start an election
    /// by itself; the liveness loop takes care of that.
    pub fn set_offline(&self, offline: bool) -> NodeStatus {
        let status = if offline {
            NodeStatus::Offline
        } else {
            NodeStatus::Online
        };
        self.info.write().status = status;
        info!(%status, "node status changed");
        status
    }

    pub fn set_election_mode(&self, mode: ElectionMode) {
        self.info.write().election_mode = mode;
        info!(%mode, "election mode changed");
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn peers(&self) -> &Arc<PeerDirectory> {
        &self.peers
    }

    pub fn elections(&self) -> &ElectionCoordinator {
        &self.elections
    }

    pub fn leases(&self) -> &Arc<LeaseManager> {
        &self.leases
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }
}
