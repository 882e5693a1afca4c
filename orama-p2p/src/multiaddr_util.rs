//! Multiaddr parsing helpers shared by the peer-connectivity controller and
//! (via re-export) the cluster-membership decision function.

use anyhow::{Context, Result};
use libp2p::{Multiaddr, PeerId};
use std::net::IpAddr;
use std::str::FromStr;

/// Parse a single bootstrap multiaddr string, failing fast on invalid
/// syntax (§4.1 "Start ... fails fast on invalid syntax").
pub fn parse_multiaddr(raw: &str) -> Result<Multiaddr> {
    Multiaddr::from_str(raw).with_context(|| format!("invalid multiaddr: {raw}"))
}

/// Parse every entry in an ordered bootstrap list, preserving order.
pub fn parse_bootstrap_list(raw: &[String]) -> Result<Vec<Multiaddr>> {
    raw.iter().map(|s| parse_multiaddr(s)).collect()
}

/// Extract the trailing `/p2p/<PEERID>` component, if present.
pub fn peer_id_of(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|proto| match proto {
        libp2p::multiaddr::Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

/// Whether `addr` names `local_peer_id` — used to filter self-dials (§3
/// invariant: "a peer record never points to this node's own peer id").
pub fn is_self(addr: &Multiaddr, local_peer_id: PeerId) -> bool {
    peer_id_of(addr) == Some(local_peer_id)
}

/// Extract the host (IP or DNS name) and first TCP/UDP port found in a
/// multiaddr, used by the cluster decision function to derive
/// `host:raft_port` from a bootstrap address (§4.2 steps 3/4).
pub fn host_and_port(addr: &Multiaddr) -> Option<(String, u16)> {
    let mut host = None;
    let mut port = None;
    for proto in addr.iter() {
        match proto {
            libp2p::multiaddr::Protocol::Ip4(ip) => host = Some(ip.to_string()),
            libp2p::multiaddr::Protocol::Ip6(ip) => host = Some(ip.to_string()),
            libp2p::multiaddr::Protocol::Dns(name)
            | libp2p::multiaddr::Protocol::Dns4(name)
            | libp2p::multiaddr::Protocol::Dns6(name) => host = Some(name.to_string()),
            libp2p::multiaddr::Protocol::Tcp(p) | libp2p::multiaddr::Protocol::Udp(p) => {
                port = Some(p)
            }
            _ => {}
        }
    }
    match (host, port) {
        (Some(h), Some(p)) => Some((h, p)),
        _ => None,
    }
}

/// Whether `host` resolves to one of this machine's local interfaces.
/// `127.0.0.1`/`localhost` always count as local; other hosts are checked
/// against the machine's actual interface addresses.
pub fn resolves_to_local_interface(host: &str) -> bool {
    if host == "127.0.0.1" || host == "localhost" || host == "::1" {
        return true;
    }
    let Ok(ip) = host.parse::<IpAddr>() else {
        return false;
    };
    local_interface_addrs().contains(&ip)
}

/// Best-effort enumeration of this machine's non-loopback interface
/// addresses, used both by `resolves_to_local_interface` and by the
/// `auto` advertise-mode loopback translation (§4.2 step 4).
pub fn local_interface_addrs() -> Vec<IpAddr> {
    // `local-ip-address`-style enumeration without adding a dependency:
    // open a UDP socket "connected" to a public address and read back the
    // local address the OS would actually use. This is the standard
    // no-syscall-extra trick for discovering the outbound-facing address.
    let mut addrs = Vec::new();
    if let Ok(socket) = std::net::UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(local) = socket.local_addr() {
                addrs.push(local.ip());
            }
        }
    }
    addrs
}

/// Translate `127.0.0.1`/`localhost` to a non-loopback local interface
/// address, unless `advertise_mode` is explicitly `localhost` (§4.2 step 4).
pub fn translate_loopback(host: &str, force_localhost: bool) -> String {
    if force_localhost {
        return host.to_string();
    }
    if host == "127.0.0.1" || host == "localhost" {
        if let Some(real) = local_interface_addrs().into_iter().next() {
            return real.to_string();
        }
    }
    host.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host_and_port() {
        let addr: Multiaddr = "/ip4/10.0.0.5/tcp/9000/p2p/12D3KooWRoBSfCjJQ2JSZ6kxfZ2rhDBzS5YpmRT6bQh5fQ3vK4ue"
            .parse()
            .unwrap();
        let (host, port) = host_and_port(&addr).unwrap();
        assert_eq!(host, "10.0.0.5");
        assert_eq!(port, 9000);
    }

    #[test]
    fn detects_self_dial() {
        let keypair = libp2p::identity::Keypair::generate_ed25519();
        let peer_id = PeerId::from(keypair.public());
        let addr: Multiaddr = format!("/ip4/127.0.0.1/tcp/4001/p2p/{peer_id}")
            .parse()
            .unwrap();
        assert!(is_self(&addr, peer_id));

        let other = PeerId::random();
        assert!(!is_self(&addr, other));
    }

    #[test]
    fn loopback_and_localhost_are_always_local() {
        assert!(resolves_to_local_interface("127.0.0.1"));
        assert!(resolves_to_local_interface("localhost"));
    }
}
