// Coordinator liveness monitor
//
// One periodic task per node. Each tick looks at the coordinator record and
// either starts an election (coordinator unknown), probes the coordinator,
// or does nothing. An unresponsive coordinator is re-elected after a random
// back-off so peers noticing the failure together do not all start
// elections at once.

use crate::{
    audit::AuditLog,
    election::{CoordinatorState, ElectionCoordinator},
    node::SharedInfo,
    peer::PeerDirectory,
    transport::Transport,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(2);

/// What the monitor needs from the election side.
pub trait ElectionControl: Send + Sync + std::fmt::Debug {
    fn coordinator(&self) -> CoordinatorState;
    fn start_election(&self);
}

impl ElectionControl for ElectionCoordinator {
    fn coordinator(&self) -> CoordinatorState {
        ElectionCoordinator::coordinator(self)
    }

    fn start_election(&self) {
        ElectionCoordinator::start_election(self);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Node is offline, nothing checked
    Offline,
    /// No coordinator recorded; an election was started
    CoordinatorUnknown,
    SelfCoordinator,
    CoordinatorHealthy,
    /// The recorded coordinator is not in the peer directory
    CoordinatorUnlisted,
    /// Probe failed; an election was started after the back-off
    CoordinatorUnreachable,
}

#[derive(Debug)]
struct Watch {
    period: Duration,
    jitter: (Duration, Duration),
    info: SharedInfo,
    peers: Arc<PeerDirectory>,
    transport: Arc<dyn Transport>,
    elections: Arc<dyn ElectionControl>,
    audit: AuditLog,
}

impl Watch {
    async fn tick(&self) -> TickOutcome {
        if !self.info.read().status.is_online() {
            return TickOutcome::Offline;
        }

        let state = self.elections.coordinator();
        if !state.is_known() {
            self.audit
                .attention("Coordinator not identified", "Starting new election");
            self.elections.start_election();
            return TickOutcome::CoordinatorUnknown;
        }
        if state.is_self {
            return TickOutcome::SelfCoordinator;
        }

        let peer = match self.peers.get(state.current.as_str()) {
            Ok(peer) => peer,
            Err(e) => {
                debug!(coordinator = %state.current, "coordinator not probed: {}", e);
                return TickOutcome::CoordinatorUnlisted;
            }
        };

        let healthy = match self.transport.probe_status(&peer).await {
            Ok(status) => status.is_online(),
            Err(e) => {
                debug!(coordinator = %peer.id, "coordinator probe failed: {}", e);
                false
            }
        };
        if healthy {
            return TickOutcome::CoordinatorHealthy;
        }

        let backoff = self.backoff();
        info!(coordinator = %peer.id, ?backoff, "coordinator unresponsive, re-electing after back-off");
        tokio::time::sleep(backoff).await;

        self.audit.attention("Coordinator offline", "Starting new election");
        self.elections.start_election();
        TickOutcome::CoordinatorUnreachable
    }

    fn backoff(&self) -> Duration {
        let (low, high) = self.jitter;
        let low_ms = u64::try_from(low.as_millis()).unwrap_or(u64::MAX);
        let high_ms = u64::try_from(high.as_millis()).unwrap_or(u64::MAX);
        if high_ms <= low_ms {
            return low;
        }
        Duration::from_millis(rand::rng().random_range(low_ms..=high_ms))
    }
}

#[derive(Debug)]
struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct LivenessMonitor {
    watch: Arc<Watch>,
    running: Mutex<Option<Running>>,
}

impl LivenessMonitor {
    pub fn new(
        period: Duration,
        jitter: (Duration, Duration),
        info: SharedInfo,
        peers: Arc<PeerDirectory>,
        transport: Arc<dyn Transport>,
        elections: Arc<dyn ElectionControl>,
        audit: AuditLog,
    ) -> Self {
        Self {
            watch: Arc::new(Watch {
                period,
                jitter,
                info,
                peers,
                transport,
                elections,
                audit,
            }),
            running: Mutex::new(None),
        }
    }

    /// Runs one check immediately, outside the periodic loop.
    pub async fn tick(&self) -> TickOutcome {
        self.watch.tick().await
    }

    /// Starts the periodic task. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let watch = self.watch.clone();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + watch.period, watch.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    outcome = watch.tick() => debug!(?outcome, "liveness tick"),
                }
            }
            debug!("liveness monitor stopped");
        });

        info!(period = ?self.watch.period, "liveness monitor started");
        *running = Some(Running { token, handle });
        true
    }

    /// Stops the periodic task, abandoning any wait in progress. Safe to call
    /// more than once.
    pub async fn stop(&self) {
        let Some(Running { token, handle }) = self.running.lock().take() else {
            return;
        };
        token.cancel();
        if let Err(e) = handle.await {
            debug!("liveness task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}
