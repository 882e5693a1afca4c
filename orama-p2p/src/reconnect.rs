//! Bootstrap reconnection loop (§4.1).
//!
//! One task per node, running for the whole node lifetime: while at least
//! one bootstrap peer is connected it just polls every
//! `CONNECTIVITY_POLL_INTERVAL`; once none are connected it dials bootstrap
//! peers in configured order, backing off on total failure and resetting
//! the backoff as soon as any dial succeeds.

use crate::backoff::BackoffState;
use crate::config::{CONNECTIVITY_POLL_INTERVAL, DIAL_TIMEOUT};
use crate::host::P2pHost;
use crate::multiaddr_util::peer_id_of;
use libp2p::Multiaddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drive reconnection to `bootstrap_addrs` until `cancel` fires. Addresses
/// without a `/p2p/<peer-id>` suffix are skipped — §4.1 requires bootstrap
/// entries to name a peer id. Entries naming this node's own peer id are
/// skipped too (property 2: a self-referential bootstrap entry never
/// becomes a dial target).
pub async fn run(host: P2pHost, bootstrap_addrs: Vec<Multiaddr>, cancel: CancellationToken) {
    let targets = filter_targets(bootstrap_addrs, host.local_peer_id());

    if targets.is_empty() {
        debug!("no bootstrap peers configured, reconnection loop idle");
        cancel.cancelled().await;
        return;
    }

    let mut backoff = BackoffState::new();

    loop {
        if targets.iter().any(|(peer_id, _)| host.is_connected(peer_id)) {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(CONNECTIVITY_POLL_INTERVAL) => continue,
            }
        }

        let mut any_succeeded = false;
        for (peer_id, addr) in &targets {
            if cancel.is_cancelled() {
                return;
            }
            if host.is_connected(peer_id) {
                any_succeeded = true;
                continue;
            }
            let attempt = tokio::time::timeout(DIAL_TIMEOUT, host.dial(*peer_id, addr.clone()));
            match attempt.await {
                Ok(Ok(())) => {
                    info!(%peer_id, "connected to bootstrap peer");
                    any_succeeded = true;
                }
                Ok(Err(e)) => warn!(%peer_id, error = %e, "bootstrap dial failed"),
                Err(_) => warn!(%peer_id, "bootstrap dial timed out"),
            }
        }

        if any_succeeded {
            backoff.on_success();
            continue;
        }

        let sleep_for = backoff.on_failure();
        warn!(
            consecutive_failures = backoff.consecutive_failures(),
            next_attempt_in = ?sleep_for,
            "all bootstrap dials failed"
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}

/// Bootstrap addresses that name a peer id other than `local_peer_id`, in
/// the order given (§3 "Bootstrap target" preference order).
fn filter_targets(bootstrap_addrs: Vec<Multiaddr>, local_peer_id: libp2p::PeerId) -> Vec<(libp2p::PeerId, Multiaddr)> {
    bootstrap_addrs
        .into_iter()
        .filter_map(|addr| peer_id_of(&addr).map(|peer_id| (peer_id, addr)))
        .filter(|(peer_id, _)| *peer_id != local_peer_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::identity::Keypair;

    fn addr_for(peer_id: libp2p::PeerId) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/4001/p2p/{peer_id}").parse().unwrap()
    }

    // Property 2: a bootstrap list containing the node's own peer id never
    // becomes a dial target.
    #[test]
    fn self_bootstrap_entry_is_filtered_out() {
        let local = libp2p::PeerId::from(Keypair::generate_ed25519().public());
        let other = libp2p::PeerId::from(Keypair::generate_ed25519().public());

        let targets = filter_targets(vec![addr_for(local), addr_for(other)], local);

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, other);
    }

    #[test]
    fn addresses_without_a_peer_id_suffix_are_skipped() {
        let local = libp2p::PeerId::from(Keypair::generate_ed25519().public());
        let bare: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();

        let targets = filter_targets(vec![bare], local);

        assert!(targets.is_empty());
    }
}
