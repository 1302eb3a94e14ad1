use crate::{ElectionMode, Error, Peer, PeerId, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static description of the service, reported on `/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Public endpoint reported to clients. Empty means "use the advertised url".
    pub endpoint: String,
    pub description: String,
    pub version: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "ballot".to_string(),
            endpoint: String::new(),
            description: "Peer node with ring/bully coordinator election and timed resource leases"
                .to_string(),
            version: 0.1,
        }
    }
}

/// Configuration for a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Numeric identity of this node
    pub node_id: PeerId,

    /// Base URL other peers use to reach this node
    pub advertised_url: String,

    pub election_mode: ElectionMode,

    /// Period of the coordinator liveness check
    pub liveness_interval_secs: f64,

    /// Bounds of the random back-off before re-electing an unresponsive coordinator
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,

    pub lease_ttl_secs: f64,

    /// Maximum deliveries attempted while walking the ring. The walk ends after
    /// one lap anyway, so only a cap below the ring size has any effect.
    pub ring_max_attempts: Option<usize>,

    pub request_timeout_secs: f64,

    /// Remote audit collector, if any
    pub log_server_url: Option<String>,

    pub service: ServiceConfig,

    /// Initial peer directory
    pub peers: Vec<Peer>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: PeerId::from("1"),
            advertised_url: "http://127.0.0.1:8000/".to_string(),
            election_mode: ElectionMode::Ring,
            liveness_interval_secs: 2.0,
            jitter_min_secs: 5.0,
            jitter_max_secs: 10.0,
            lease_ttl_secs: 5.0,
            ring_max_attempts: None,
            request_timeout_secs: 5.0,
            log_server_url: None,
            service: ServiceConfig::default(),
            peers: Vec::new(),
        }
    }
}

fn secs(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(fallback)
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be a positive number of seconds, got {value}")))
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        self.node_id
            .check()
            .map_err(|reason| Error::Config(format!("node_id: {reason}")))?;
        if !self.advertised_url.starts_with("http") {
            return Err(Error::Config(format!(
                "advertised_url {:?} must start with a scheme",
                self.advertised_url
            )));
        }
        positive("liveness_interval_secs", self.liveness_interval_secs)?;
        positive("lease_ttl_secs", self.lease_ttl_secs)?;
        positive("request_timeout_secs", self.request_timeout_secs)?;
        if !(self.jitter_min_secs.is_finite()
            && self.jitter_max_secs.is_finite()
            && self.jitter_min_secs >= 0.0
            && self.jitter_min_secs <= self.jitter_max_secs)
        {
            return Err(Error::Config(format!(
                "jitter range {}..{} is invalid",
                self.jitter_min_secs, self.jitter_max_secs
            )));
        }
        if self.ring_max_attempts == Some(0) {
            return Err(Error::Config("ring_max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn liveness_interval(&self) -> Duration {
        secs(self.liveness_interval_secs, Duration::from_secs(2))
    }

    pub fn jitter_range(&self) -> (Duration, Duration) {
        (
            secs(self.jitter_min_secs, Duration::from_secs(5)),
            secs(self.jitter_max_secs, Duration::from_secs(10)),
        )
    }

    pub fn lease_ttl(&self) -> Duration {
        secs(self.lease_ttl_secs, Duration::from_secs(5))
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs, Duration::from_secs(5))
    }

    pub fn service_endpoint(&self) -> String {
        if self.service.endpoint.is_empty() {
            self.advertised_url.clone()
        } else {
            self.service.endpoint.clone()
        }
    }

    /// Identity of this node as it appears in the peer directory.
    pub fn local_peer(&self) -> Peer {
        Peer::new(self.node_id.clone(), self.service.name.clone(), self.advertised_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.liveness_interval(), Duration::from_secs(2));
        assert_eq!(config.lease_ttl(), Duration::from_secs(5));
        assert_eq!(
            config.jitter_range(),
            (Duration::from_secs(5), Duration::from_secs(10))
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.node_id = PeerId::from("abc");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = NodeConfig::default();
        config.node_id = PeerId::from("0040");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = NodeConfig::default();
        config.jitter_min_secs = 11.0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.lease_ttl_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.ring_max_attempts = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: NodeConfig = serde_json::from_str(
            r#"{"node_id":"40","election_mode":"valentao","peers":[{"id":"10","nome":"a","url":"http://a/"}]}"#,
        )
        .unwrap();
        assert_eq!(config.election_mode, ElectionMode::Bully);
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.lease_ttl_secs, 5.0);
        assert_eq!(config.service_endpoint(), config.advertised_url);
    }
}
