//! In-memory peerstore: `(peer_id, multiaddrs[], last_seen)` records with
//! per-entry TTL (§3 "Peer record").

use dashmap::DashMap;
use libp2p::{Multiaddr, PeerId};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct PeerRecord {
    addrs: Vec<Multiaddr>,
    expires_at: Instant,
}

/// Thread-safe peer address book. A record for `local_peer_id` is never
/// inserted — callers filter self-dials before calling `upsert`, and
/// `upsert` defends against it a second time as a belt-and-suspenders
/// invariant check.
pub struct PeerStore {
    local_peer_id: PeerId,
    records: DashMap<PeerId, PeerRecord>,
}

impl PeerStore {
    pub fn new(local_peer_id: PeerId) -> Self {
        Self {
            local_peer_id,
            records: DashMap::new(),
        }
    }

    /// Insert or refresh a peer's known addresses with the given TTL.
    /// No-ops for the local peer id (§3 invariant).
    pub fn upsert(&self, peer_id: PeerId, addrs: Vec<Multiaddr>, ttl: Duration) {
        if peer_id == self.local_peer_id {
            return;
        }
        self.records.insert(
            peer_id,
            PeerRecord {
                addrs,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn addrs(&self, peer_id: &PeerId) -> Option<Vec<Multiaddr>> {
        self.records.get(peer_id).and_then(|rec| {
            if rec.expires_at > Instant::now() {
                Some(rec.addrs.clone())
            } else {
                None
            }
        })
    }

    pub fn contains_live(&self, peer_id: &PeerId) -> bool {
        self.addrs(peer_id).is_some()
    }

    /// Drop every entry whose TTL has elapsed.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.records.retain(|_, rec| rec.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_dial_is_never_stored() {
        let local = PeerId::random();
        let store = PeerStore::new(local);
        store.upsert(local, vec![], Duration::from_secs(60));
        assert!(!store.contains_live(&local));
    }

    #[test]
    fn expired_entries_disappear() {
        let store = PeerStore::new(PeerId::random());
        let peer = PeerId::random();
        store.upsert(peer, vec![], Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!store.contains_live(&peer));
    }
}
