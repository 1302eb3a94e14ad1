// Peer directory - the known members of the cluster
//
// Election logic only ever reads snapshots from here; the HTTP surface is
// the only writer.

use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identity of a peer, kept as the string it travels as on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Rank used for ring order and winner selection.
    /// Empty or unparseable ids rank as 0.
    pub fn rank(&self) -> u64 {
        self.0.trim().parse().unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical decimal that fits a `u64`, so `rank` maps it back
    /// one-to-one: digits only, no leading zero, at most 19 digits.
    pub fn check(&self) -> std::result::Result<(), String> {
        let id = self.as_str();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("id {id:?} must be numeric"));
        }
        if id.len() > MAX_ID_DIGITS {
            return Err(format!("id {id:?} is longer than {MAX_ID_DIGITS} digits"));
        }
        if id.len() > 1 && id.starts_with('0') {
            return Err(format!("id {id:?} must not have leading zeros"));
        }
        Ok(())
    }
}

/// Any decimal of this many digits fits a `u64`.
pub const MAX_ID_DIGITS: usize = 19;

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Peer {
    pub id: PeerId,
    #[serde(rename = "nome")]
    pub name: String,
    pub url: String,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Full URL of one of the peer's endpoints.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Outcome of checking a candidate peer against the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerValidity {
    Valid,
    Invalid(String),
    Duplicate,
}

fn check_format(peer: &Peer) -> std::result::Result<(), String> {
    peer.id.check()?;
    if peer.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if peer.name.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("name {:?} must not be numeric", peer.name));
    }
    if !peer.url.starts_with("http") {
        return Err(format!("url {:?} must start with a scheme", peer.url));
    }
    Ok(())
}

fn classify<'a>(existing: impl IntoIterator<Item = &'a Peer>, peer: &Peer) -> PeerValidity {
    if let Err(reason) = check_format(peer) {
        return PeerValidity::Invalid(reason);
    }
    let clash = existing
        .into_iter()
        .any(|other| other.id == peer.id || other.name == peer.name);
    if clash {
        PeerValidity::Duplicate
    } else {
        PeerValidity::Valid
    }
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: RwLock<Vec<Peer>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, peer: &Peer) -> PeerValidity {
        classify(self.peers.read().iter(), peer)
    }

    pub fn add(&self, peer: Peer) -> Result<()> {
        let mut peers = self.peers.write();
        match classify(peers.iter(), &peer) {
            PeerValidity::Valid => {
                peers.push(peer);
                Ok(())
            }
            PeerValidity::Invalid(reason) => Err(Error::InvalidPeer(reason)),
            PeerValidity::Duplicate => Err(Error::DuplicatePeer(peer.id.0)),
        }
    }

    /// Replaces the entry with id `id`. The replacement may carry a new id
    /// as long as it does not collide with another entry.
    pub fn update(&self, id: &str, peer: Peer) -> Result<Peer> {
        let mut peers = self.peers.write();
        let index = peers
            .iter()
            .position(|p| p.id.as_str() == id)
            .ok_or_else(|| Error::NotFound(format!("peer {id}")))?;

        let others = peers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, p)| p);
        match classify(others, &peer) {
            PeerValidity::Valid => {
                peers[index] = peer.clone();
                Ok(peer)
            }
            PeerValidity::Invalid(reason) => Err(Error::InvalidPeer(reason)),
            PeerValidity::Duplicate => Err(Error::DuplicatePeer(peer.id.0)),
        }
    }

    pub fn remove(&self, id: &str) -> Result<Peer> {
        let mut peers = self.peers.write();
        let index = peers
            .iter()
            .position(|p| p.id.as_str() == id)
            .ok_or_else(|| Error::NotFound(format!("peer {id}")))?;
        Ok(peers.remove(index))
    }

    pub fn get(&self, id: &str) -> Result<Peer> {
        self.peers
            .read()
            .iter()
            .find(|p| p.id.as_str() == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("peer {id}")))
    }

    pub fn list(&self) -> Vec<Peer> {
        self.peers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Snapshot sorted ascending by rank, ties broken by the id string.
    pub fn ring_order(&self) -> Vec<Peer> {
        let mut peers = self.list();
        peers.sort_by(|a, b| a.id.rank().cmp(&b.id.rank()).then_with(|| a.id.cmp(&b.id)));
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, name: &str) -> Peer {
        Peer::new(id, name, format!("http://{name}.local/"))
    }

    #[test]
    fn test_rank_treats_garbage_as_zero() {
        assert_eq!(PeerId::from("201710396").rank(), 201_710_396);
        assert_eq!(PeerId::from("").rank(), 0);
        assert_eq!(PeerId::from("abc").rank(), 0);
    }

    #[test]
    fn test_id_must_rank_back_to_itself() {
        assert!(PeerId::from("0").check().is_ok());
        assert!(PeerId::from("9999999999999999999").check().is_ok());
        assert!(PeerId::from("0040").check().is_err());
        assert!(PeerId::from("123456789012345678901").check().is_err());

        let dir = PeerDirectory::new();
        assert!(matches!(dir.validate(&peer("0040", "zoe")), PeerValidity::Invalid(_)));
        assert!(matches!(
            dir.add(peer("123456789012345678901", "huge")),
            Err(Error::InvalidPeer(_))
        ));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_validity_variants() {
        let dir = PeerDirectory::new();
        dir.add(peer("10", "alice")).unwrap();

        assert_eq!(dir.validate(&peer("20", "bob")), PeerValidity::Valid);
        assert_eq!(dir.validate(&peer("10", "carol")), PeerValidity::Duplicate);
        assert_eq!(dir.validate(&peer("30", "alice")), PeerValidity::Duplicate);
        assert!(matches!(dir.validate(&peer("x1", "dave")), PeerValidity::Invalid(_)));
        assert!(matches!(dir.validate(&peer("40", "1234")), PeerValidity::Invalid(_)));
        assert!(matches!(
            dir.validate(&Peer::new("50", "erin", "ftp://erin")),
            PeerValidity::Invalid(_)
        ));
    }

    #[test]
    fn test_add_rejects_duplicates_and_bad_format() {
        let dir = PeerDirectory::new();
        dir.add(peer("10", "alice")).unwrap();

        assert!(matches!(dir.add(peer("10", "zed")), Err(Error::DuplicatePeer(_))));
        assert!(matches!(dir.add(peer("", "zed")), Err(Error::InvalidPeer(_))));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_update_and_remove() {
        let dir = PeerDirectory::new();
        dir.add(peer("10", "alice")).unwrap();
        dir.add(peer("20", "bob")).unwrap();

        let updated = dir.update("10", peer("11", "alice")).unwrap();
        assert_eq!(updated.id.as_str(), "11");
        assert!(dir.get("10").is_err());

        assert!(matches!(dir.update("11", peer("20", "x")), Err(Error::DuplicatePeer(_))));
        assert!(matches!(dir.update("99", peer("99", "y")), Err(Error::NotFound(_))));

        dir.remove("20").unwrap();
        assert!(matches!(dir.remove("20"), Err(Error::NotFound(_))));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_ring_order_is_numeric() {
        let dir = PeerDirectory::new();
        for (id, name) in [("100", "c"), ("9", "a"), ("20", "b")] {
            dir.add(peer(id, name)).unwrap();
        }
        let order: Vec<_> = dir.ring_order().into_iter().map(|p| p.id.0).collect();
        assert_eq!(order, vec!["9", "20", "100"]);
    }

    #[test]
    fn test_endpoint_joins_with_single_slash() {
        let p = Peer::new("1", "a", "https://a.example.com/");
        assert_eq!(p.endpoint("/eleicao"), "https://a.example.com/eleicao");
        let q = Peer::new("2", "b", "https://b.example.com");
        assert_eq!(q.endpoint("info"), "https://b.example.com/info");
    }

    #[test]
    fn test_peer_wire_format() {
        let p: Peer = serde_json::from_str(r#"{"id":"7","nome":"gina","url":"http://g/"}"#).unwrap();
        assert_eq!(p.name, "gina");
        assert!(serde_json::from_str::<Peer>(r#"{"id":"7","nome":"g","url":"http://g/","x":"1"}"#).is_err());
    }
}
