//! The SQL join-address decision function (§4.2), evaluated once per start.

use anyhow::{anyhow, Result};
use libp2p::{Multiaddr, PeerId};
use orama_core::AdvertiseMode;
use orama_p2p::multiaddr_util::{host_and_port, peer_id_of, resolves_to_local_interface, translate_loopback};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDecision {
    /// Empty join address: forms a new cluster.
    Primary,
    /// `host:port` to join.
    Join(String),
}

/// Evaluate the four-branch decision described in §4.2. `bootstrap_addrs`
/// is the effective ordered bootstrap list; `local_peer_id` is used to
/// exclude this node's own entry when checking whether another configured
/// bootstrap resolves locally.
pub fn decide_join_address(
    bootstrap_addrs: &[Multiaddr],
    local_peer_id: PeerId,
    is_bootstrap: bool,
    advertise_mode: AdvertiseMode,
    raft_port: u16,
    explicit_join_addr: Option<&str>,
) -> Result<JoinDecision> {
    if let Some(addr) = explicit_join_addr {
        return Ok(JoinDecision::Join(addr.to_string()));
    }

    let other_resolves_locally = bootstrap_addrs
        .iter()
        .filter(|addr| peer_id_of(addr) != Some(local_peer_id))
        .filter_map(host_and_port)
        .any(|(host, _)| resolves_to_local_interface(&host));

    if is_bootstrap && !other_resolves_locally {
        return Ok(JoinDecision::Primary);
    }

    let first = bootstrap_addrs
        .first()
        .ok_or_else(|| anyhow!("no bootstrap peers configured and no explicit join address"))?;
    let (host, _) = host_and_port(first)
        .ok_or_else(|| anyhow!("bootstrap address {first} has no host/port"))?;

    if other_resolves_locally {
        // Secondary bootstrap co-located with another on this machine (test
        // rigs): derive verbatim, no loopback translation.
        return Ok(JoinDecision::Join(format!("{host}:{raft_port}")));
    }

    let force_localhost = matches!(advertise_mode, AdvertiseMode::Localhost);
    let host = translate_loopback(&host, force_localhost);
    Ok(JoinDecision::Join(format!("{host}:{raft_port}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn explicit_join_address_wins() {
        let decision = decide_join_address(
            &[],
            PeerId::random(),
            false,
            AdvertiseMode::Auto,
            4201,
            Some("10.0.0.9:4201"),
        )
        .unwrap();
        assert_eq!(decision, JoinDecision::Join("10.0.0.9:4201".to_string()));
    }

    #[test]
    fn sole_bootstrap_becomes_primary() {
        let local = PeerId::random();
        let decision = decide_join_address(&[], local, true, AdvertiseMode::Auto, 4201, None).unwrap();
        assert_eq!(decision, JoinDecision::Primary);
    }

    #[test]
    fn regular_node_derives_from_first_bootstrap() {
        let local = PeerId::random();
        let other = PeerId::random();
        let bootstrap = vec![addr(&format!("/ip4/203.0.113.5/tcp/4001/p2p/{other}"))];
        let decision =
            decide_join_address(&bootstrap, local, false, AdvertiseMode::Auto, 4201, None).unwrap();
        assert_eq!(decision, JoinDecision::Join("203.0.113.5:4201".to_string()));
    }
}
