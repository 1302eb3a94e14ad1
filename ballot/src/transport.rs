use crate::{
    message::{CoordinatorAnnouncement, ElectionRequest, StatusReport},
    Error, NodeStatus, Peer, Result,
};
use async_trait::async_trait;
use std::time::Duration;

pub const ELECTION_PATH: &str = "eleicao";
pub const COORDINATOR_PATH: &str = "eleicao/coordenador";
pub const INFO_PATH: &str = "info";

/// Outbound point-to-point calls between nodes.
///
/// Every method is best effort: an `Err` means "that peer is unreachable"
/// and is never fatal to the caller.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send_election(&self, peer: &Peer, request: &ElectionRequest) -> Result<()>;
    async fn announce_coordinator(
        &self,
        peer: &Peer,
        announcement: &CoordinatorAnnouncement,
    ) -> Result<()>;
    async fn probe_status(&self, peer: &Peer) -> Result<NodeStatus>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    async fn post_json<T: serde::Serialize + Sync>(
        &self,
        peer: &Peer,
        path: &str,
        body: &T,
    ) -> Result<()> {
        let url = peer.endpoint(path);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::transport(url, e))?;
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_election(&self, peer: &Peer, request: &ElectionRequest) -> Result<()> {
        self.post_json(peer, ELECTION_PATH, request).await
    }

    async fn announce_coordinator(
        &self,
        peer: &Peer,
        announcement: &CoordinatorAnnouncement,
    ) -> Result<()> {
        self.post_json(peer, COORDINATOR_PATH, announcement).await
    }

    async fn probe_status(&self, peer: &Peer) -> Result<NodeStatus> {
        let url = peer.endpoint(INFO_PATH);
        let report: StatusReport = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::transport(url.clone(), e))?
            .json()
            .await
            .map_err(|e| Error::transport(url, e))?;
        Ok(report.node_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_peer_is_a_transport_error() {
        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        let peer = Peer::new("1", "ghost", "http://127.0.0.1:9/");

        let err = transport
            .send_election(&peer, &ElectionRequest::probe("e"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));

        let err = transport.probe_status(&peer).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }
}
