//! Peer-exchange announcer and consumer (§4.1 "Peer exchange").
//!
//! Every node publishes its own `{peer_id, listen_addrs, ts}` on
//! `peer-discovery/v1` every `ANNOUNCE_INTERVAL`, after an initial
//! `ANNOUNCE_WARMUP` delay. Every node also consumes that topic, discarding
//! self-announcements, announcements older than `ANNOUNCE_MAX_AGE`, and
//! addresses already known live, then opportunistically dialing anything
//! new.

use crate::config::{
    ANNOUNCE_INTERVAL, ANNOUNCE_MAX_AGE, ANNOUNCE_WARMUP, OPPORTUNISTIC_DIAL_TIMEOUT,
    PEER_RECORD_TTL, TOPIC_PEER_DISCOVERY,
};
use crate::host::P2pHost;
use crate::multiaddr_util::{is_self, peer_id_of};
use crate::peerstore::PeerStore;
use libp2p::{Multiaddr, PeerId};
use orama_core::unix_now;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Announcement {
    peer_id: String,
    listen_addrs: Vec<String>,
    ts: i64,
}

/// Periodically publish this node's own address set.
pub async fn announce(
    host: P2pHost,
    listen_addrs: Vec<Multiaddr>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(ANNOUNCE_WARMUP) => {}
    }

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let announcement = Announcement {
            peer_id: host.local_peer_id().to_string(),
            listen_addrs: listen_addrs.iter().map(|a| a.to_string()).collect(),
            ts: unix_now(),
        };
        match serde_json::to_vec(&announcement) {
            Ok(payload) => {
                if let Err(e) = host.publish(TOPIC_PEER_DISCOVERY, payload).await {
                    warn!(error = %e, "failed to publish peer-exchange announcement");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode peer-exchange announcement"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(ANNOUNCE_INTERVAL) => {}
        }
    }
}

/// Consume announcements from peers, update the peerstore, and
/// opportunistically dial anything new and not already connected.
pub async fn consume(
    host: P2pHost,
    peerstore: Arc<PeerStore>,
    cancel: CancellationToken,
) {
    let mut events = host.subscribe_events();
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            msg = events.recv() => msg,
        };
        let msg = match msg {
            Ok(msg) => msg,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "peer-exchange consumer lagged behind event stream");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        };
        if msg.topic != TOPIC_PEER_DISCOVERY {
            continue;
        }
        let announcement: Announcement = match serde_json::from_slice(&msg.data) {
            Ok(a) => a,
            Err(e) => {
                trace!(error = %e, "discarding malformed peer-exchange announcement");
                continue;
            }
        };

        let Some((peer_id, addrs)) = accept_announcement(announcement, unix_now(), host.local_peer_id()) else {
            continue;
        };

        peerstore.upsert(peer_id, addrs.clone(), PEER_RECORD_TTL);

        // Property 4: a fresh announcement is recorded unconditionally, but
        // only ever dialed opportunistically while this peer is currently
        // disconnected — a peer we already hold a live connection to is
        // never redialed just because it announced again.
        if host.is_connected(&peer_id) {
            continue;
        }

        debug!(%peer_id, "discovered peer via peer exchange, dialing opportunistically");
        let Some(addr) = addrs.into_iter().find_map(|a| peer_id_of(&a).map(|_| a)) else {
            continue;
        };
        let dial = tokio::time::timeout(OPPORTUNISTIC_DIAL_TIMEOUT, host.dial(peer_id, addr));
        match dial.await {
            Ok(Ok(())) => debug!(%peer_id, "opportunistic dial succeeded"),
            Ok(Err(e)) => trace!(%peer_id, error = %e, "opportunistic dial failed"),
            Err(_) => trace!(%peer_id, "opportunistic dial timed out"),
        }
    }
}

/// Validate and normalize a parsed announcement: reject stale timestamps,
/// self-announcements, and unparseable peer ids; strip any address that
/// names `local_peer_id`. Returns `None` if nothing usable is left.
fn accept_announcement(announcement: Announcement, now: i64, local_peer_id: PeerId) -> Option<(PeerId, Vec<Multiaddr>)> {
    if now - announcement.ts > ANNOUNCE_MAX_AGE.as_secs() as i64 {
        trace!(peer_id = %announcement.peer_id, "discarding stale announcement");
        return None;
    }

    let peer_id: PeerId = announcement.peer_id.parse().ok()?;
    if peer_id == local_peer_id {
        return None;
    }

    let addrs: Vec<Multiaddr> = announcement
        .listen_addrs
        .iter()
        .filter_map(|s| s.parse().ok())
        .filter(|a| !is_self(a, local_peer_id))
        .collect();
    if addrs.is_empty() {
        return None;
    }

    Some((peer_id, addrs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::identity::Keypair;

    fn announcement(peer_id: PeerId, addrs: &[&str], ts: i64) -> Announcement {
        Announcement {
            peer_id: peer_id.to_string(),
            listen_addrs: addrs.iter().map(|s| s.to_string()).collect(),
            ts,
        }
    }

    // Property 4 (half): a fresh, well-formed announcement from another peer
    // is accepted and its addresses kept. The other half (dial only while
    // disconnected) lives entirely in `consume`'s post-`is_connected` check,
    // since it needs a live `P2pHost`.
    #[test]
    fn fresh_announcement_from_another_peer_is_accepted() {
        let local = PeerId::from(Keypair::generate_ed25519().public());
        let other = PeerId::from(Keypair::generate_ed25519().public());
        let ann = announcement(other, &["/ip4/203.0.113.5/tcp/4001"], unix_now());

        let accepted = accept_announcement(ann, unix_now(), local);

        let (peer_id, addrs) = accepted.expect("should be accepted");
        assert_eq!(peer_id, other);
        assert_eq!(addrs.len(), 1);
    }

    #[test]
    fn self_announcement_is_rejected() {
        let local = PeerId::from(Keypair::generate_ed25519().public());
        let ann = announcement(local, &["/ip4/203.0.113.5/tcp/4001"], unix_now());

        assert!(accept_announcement(ann, unix_now(), local).is_none());
    }

    #[test]
    fn stale_announcement_is_rejected() {
        let local = PeerId::from(Keypair::generate_ed25519().public());
        let other = PeerId::from(Keypair::generate_ed25519().public());
        let old_ts = unix_now() - ANNOUNCE_MAX_AGE.as_secs() as i64 - 10;
        let ann = announcement(other, &["/ip4/203.0.113.5/tcp/4001"], old_ts);

        assert!(accept_announcement(ann, unix_now(), local).is_none());
    }

    #[test]
    fn announcement_with_only_self_addrs_is_rejected() {
        let local = PeerId::from(Keypair::generate_ed25519().public());
        let other = PeerId::from(Keypair::generate_ed25519().public());
        let ann = announcement(other, &[&format!("/ip4/127.0.0.1/tcp/4001/p2p/{local}")], unix_now());

        assert!(accept_announcement(ann, unix_now(), local).is_none());
    }
}
