// Coordinator election
//
// Two interchangeable protocols share one coordinator record:
// - ring: the request walks the peers in rank order collecting identities
//   until it reaches a node already on the path; the highest rank wins.
// - bully: a node probes every higher-ranked peer and declares itself
//   coordinator only when none of them answers.
//
// Participation always runs on a spawned task. Callers only pay for the
// bookkeeping done before dispatch.

use crate::{
    audit::AuditLog,
    config::NodeConfig,
    message::{CoordinatorAnnouncement, ElectionRequest},
    node::SharedInfo,
    peer::PeerDirectory,
    transport::Transport,
    ElectionMode, Error, Peer, PeerId, Result,
};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Who the cluster currently follows. An empty `current` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorState {
    #[serde(rename = "coordenador")]
    pub is_self: bool,
    #[serde(rename = "coordenador_atual")]
    pub current: PeerId,
}

impl CoordinatorState {
    pub fn is_known(&self) -> bool {
        !self.current.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionRecord {
    pub id: String,
    pub mode: ElectionMode,
    /// Ring mode only: identities visited so far, in visiting order
    pub path: Vec<PeerId>,
}

#[derive(Debug, Default)]
struct ElectionState {
    coordinator: CoordinatorState,
    in_flight: HashMap<String, ElectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionSnapshot {
    #[serde(rename = "tipo_de_eleicao_ativa")]
    pub mode: ElectionMode,
    #[serde(rename = "eleicoes_em_andamento")]
    pub in_flight: Vec<String>,
}

/// Winner of a completed ring circuit: the highest-ranked entry on the path,
/// kept exactly as it travelled.
pub fn ring_winner(path: &[PeerId]) -> PeerId {
    path.iter()
        .max_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.cmp(b)))
        .cloned()
        .unwrap_or_else(|| PeerId::from("0"))
}

/// Ring order rotated so it starts right after `local` and ends with it.
/// `local` is slotted in by rank when the directory does not list it.
pub fn ring_successors(mut ring: Vec<Peer>, local: &Peer) -> Vec<Peer> {
    if !ring.iter().any(|p| p.id == local.id) {
        ring.push(local.clone());
        ring.sort_by(|a, b| a.id.rank().cmp(&b.id.rank()).then_with(|| a.id.cmp(&b.id)));
    }
    let position = ring.iter().position(|p| p.id == local.id).unwrap_or(0);
    ring.rotate_left(position + 1);
    ring
}

#[derive(Debug, Clone)]
pub struct ElectionCoordinator {
    local: Peer,
    info: SharedInfo,
    peers: Arc<PeerDirectory>,
    transport: Arc<dyn Transport>,
    state: Arc<Mutex<ElectionState>>,
    audit: AuditLog,
    ring_max_attempts: Option<usize>,
}

impl ElectionCoordinator {
    pub fn new(
        config: &NodeConfig,
        info: SharedInfo,
        peers: Arc<PeerDirectory>,
        transport: Arc<dyn Transport>,
        audit: AuditLog,
    ) -> Self {
        Self {
            local: config.local_peer(),
            info,
            peers,
            transport,
            state: Arc::new(Mutex::new(ElectionState::default())),
            audit,
            ring_max_attempts: config.ring_max_attempts,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local.id
    }

    pub fn mode(&self) -> ElectionMode {
        self.info.read().election_mode
    }

    fn is_online(&self) -> bool {
        self.info.read().status.is_online()
    }

    /// Starts a fresh election from this node.
    pub fn start_election(&self) -> Option<String> {
        self.trigger(None, None, false)
    }

    /// Bookkeeping plus dispatch of one round of participation.
    ///
    /// Without `election_id` a new id is minted and tracked. Returns the id
    /// the round runs under, or `None` when the node is offline.
    pub fn trigger(
        &self,
        election_id: Option<String>,
        seed_path: Option<Vec<PeerId>>,
        received: bool,
    ) -> Option<String> {
        if !self.is_online() {
            debug!("node offline, election trigger dropped");
            return None;
        }
        let mode = self.mode();

        let election_id = match election_id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                self.state.lock().in_flight.insert(
                    id.clone(),
                    ElectionRecord {
                        id: id.clone(),
                        mode,
                        path: Vec::new(),
                    },
                );
                id
            }
        };

        let comment = if received {
            "Received election"
        } else {
            "Started new election"
        };
        self.audit
            .success(comment, format!("Election: {election_id}. Mode: {mode}"));
        info!(election_id = %election_id, %mode, received, "election round dispatched");

        let coordinator = self.clone();
        let id = election_id.clone();
        let path = seed_path.unwrap_or_default();
        tokio::spawn(async move {
            match mode {
                ElectionMode::Ring => coordinator.run_ring(id, path).await,
                ElectionMode::Bully => coordinator.run_bully(id).await,
            }
        });

        Some(election_id)
    }

    /// Inbound election message from a peer.
    ///
    /// Ring mode always re-enters the protocol; bully mode ignores ids it is
    /// already working on.
    pub fn receive_election(&self, request: ElectionRequest) -> Result<()> {
        if !self.is_online() {
            return Err(Error::Offline);
        }
        let mode = self.mode();
        let path = request.path.unwrap_or_default();

        let accepted = {
            let mut state = self.state.lock();
            let tracked = state.in_flight.contains_key(&request.election_id);
            if mode == ElectionMode::Ring || !tracked {
                state.in_flight.insert(
                    request.election_id.clone(),
                    ElectionRecord {
                        id: request.election_id.clone(),
                        mode,
                        path: path.clone(),
                    },
                );
                true
            } else {
                false
            }
        };

        if accepted {
            self.trigger(Some(request.election_id), Some(path), true);
        } else {
            debug!(election_id = %request.election_id, "bully probe for tracked election ignored");
        }
        Ok(())
    }

    async fn run_ring(&self, election_id: String, path: Vec<PeerId>) {
        if path.contains(&self.local.id) {
            let winner = ring_winner(&path);
            self.conclude(&election_id, winner).await;
            return;
        }

        let mut path = path;
        path.push(self.local.id.clone());
        if let Some(record) = self.state.lock().in_flight.get_mut(&election_id) {
            record.path.clone_from(&path);
        }

        let successors = ring_successors(self.peers.ring_order(), &self.local);
        let max_attempts = self
            .ring_max_attempts
            .unwrap_or(successors.len())
            .max(1);
        let request = ElectionRequest::ring(election_id.clone(), path.clone());

        for peer in successors.iter().cycle().take(max_attempts) {
            if peer.id == self.local.id {
                // A whole lap without a taker; the path already holds us.
                let winner = ring_winner(&path);
                self.conclude(&election_id, winner).await;
                return;
            }
            match self.transport.send_election(peer, &request).await {
                Ok(()) => {
                    info!(election_id = %election_id, peer = %peer.id, "ring election passed on");
                    return;
                }
                Err(e) => {
                    warn!(election_id = %election_id, peer = %peer.id, "ring delivery failed: {}", e);
                    self.audit.error(
                        format!("Failed to pass election on to {}", peer.url),
                        e.to_string(),
                    );
                }
            }
        }

        warn!(election_id = %election_id, max_attempts, "ring election stalled, abandoning");
        self.audit.error(
            "Ring election stalled",
            format!("Election: {election_id}. No peer accepted after {max_attempts} attempts"),
        );
        self.state.lock().in_flight.remove(&election_id);
    }

    async fn run_bully(&self, election_id: String) {
        let rank = self.local.id.rank();
        let higher: Vec<Peer> = self
            .peers
            .ring_order()
            .into_iter()
            .filter(|p| p.id.rank() > rank)
            .collect();

        let request = ElectionRequest::probe(election_id.clone());
        let results = join_all(
            higher
                .iter()
                .map(|peer| self.transport.send_election(peer, &request)),
        )
        .await;

        let mut answered = 0usize;
        for (peer, result) in higher.iter().zip(results) {
            match result {
                Ok(()) => {
                    debug!(election_id = %election_id, peer = %peer.id, "higher peer answered");
                    answered += 1;
                }
                Err(e) => {
                    warn!(election_id = %election_id, peer = %peer.id, "bully probe failed: {}", e);
                    self.audit.error(
                        format!("Failed to probe {} for election", peer.url),
                        e.to_string(),
                    );
                }
            }
        }

        if answered == 0 {
            let me = self.local.id.clone();
            self.conclude(&election_id, me).await;
        } else {
            info!(election_id = %election_id, answered, "deferring to higher peers");
        }
    }

    /// Broadcasts the result and records it locally.
    pub async fn conclude(&self, election_id: &str, winner: PeerId) {
        let announcement = CoordinatorAnnouncement {
            coordinator: winner.clone(),
            election_id: election_id.to_string(),
        };
        let targets: Vec<Peer> = self
            .peers
            .list()
            .into_iter()
            .filter(|p| p.id != self.local.id)
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|peer| self.transport.announce_coordinator(peer, &announcement)),
        )
        .await;
        for (peer, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                warn!(election_id, peer = %peer.id, "coordinator announcement failed: {}", e);
            }
        }

        self.apply_coordinator(election_id, &winner);

        let message = if winner == self.local.id {
            "This node is now the coordinator".to_string()
        } else {
            format!("New coordinator elected: {winner}")
        };
        self.audit.success(
            format!("Election {election_id} concluded. Coordinator: {winner}"),
            message,
        );
    }

    /// Result broadcast by the node that concluded an election.
    pub fn receive_announcement(&self, announcement: CoordinatorAnnouncement) -> Result<()> {
        if !self.is_online() {
            return Err(Error::Offline);
        }
        self.apply_coordinator(&announcement.election_id, &announcement.coordinator);
        self.audit.success(
            "Election concluded",
            format!(
                "Election: {}. New coordinator: {}",
                announcement.election_id, announcement.coordinator
            ),
        );
        Ok(())
    }

    fn apply_coordinator(&self, election_id: &str, winner: &PeerId) {
        let mut state = self.state.lock();
        state.coordinator = CoordinatorState {
            is_self: *winner == self.local.id,
            current: winner.clone(),
        };
        state.in_flight.remove(election_id);
        info!(election_id, coordinator = %winner, "coordinator recorded");
    }

    /// Forgets the coordinator and every in-flight election.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.coordinator = CoordinatorState::default();
        state.in_flight.clear();
        info!("election state reset");
    }

    pub fn coordinator(&self) -> CoordinatorState {
        self.state.lock().coordinator.clone()
    }

    pub fn is_tracking(&self, election_id: &str) -> bool {
        self.state.lock().in_flight.contains_key(election_id)
    }

    pub fn record(&self, election_id: &str) -> Option<ElectionRecord> {
        self.state.lock().in_flight.get(election_id).cloned()
    }

    pub fn snapshot(&self) -> ElectionSnapshot {
        let mut in_flight: Vec<String> = self.state.lock().in_flight.keys().cloned().collect();
        in_flight.sort();
        ElectionSnapshot {
            mode: self.mode(),
            in_flight,
        }
    }
}
