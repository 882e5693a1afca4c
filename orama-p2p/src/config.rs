//! P2P-specific configuration and the reserved fabric topic names (§6).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reserved pubsub topics every node subscribes to (§6 "Pubsub topics").
pub const TOPIC_PEER_DISCOVERY: &str = "peer-discovery/v1";
pub const TOPIC_CLUSTER_MEMBERS: &str = "cluster-members/v1";
pub const TOPIC_MONITORING: &str = "monitoring";

/// Initial backoff interval for the reconnection loop (§3).
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
/// Backoff cap (§3).
pub const MAX_BACKOFF: Duration = Duration::from_secs(600);
/// Multiplicative backoff factor on failure (§3).
pub const BACKOFF_MULTIPLIER: f64 = 1.5;
/// Jitter fraction applied to every computed interval (§3).
pub const BACKOFF_JITTER: f64 = 0.2;
/// Floor below which a jittered interval is never allowed to fall (§3).
pub const BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Poll interval while at least one bootstrap peer is connected (§4.1).
pub const CONNECTIVITY_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Dial bound for a single bootstrap dial attempt (§4.1).
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
/// Dial bound for an opportunistic dial triggered by peer exchange (§4.1).
pub const OPPORTUNISTIC_DIAL_TIMEOUT: Duration = Duration::from_secs(15);
/// Peer-exchange announcement interval (§4.1).
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);
/// Warm-up delay before the first peer-exchange announcement (§4.1).
pub const ANNOUNCE_WARMUP: Duration = Duration::from_secs(2);
/// Peer-exchange announcements older than this are discarded (§4.1).
pub const ANNOUNCE_MAX_AGE: Duration = Duration::from_secs(5 * 60);
/// TTL applied to peerstore entries learned via announcement or configured
/// as bootstrap peers (§3 "Peer record").
pub const PEER_RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2pConfig {
    /// Maximum number of peer connections the swarm keeps concurrently.
    pub max_connections: usize,
    /// Idle-connection timeout before libp2p closes an unused connection.
    pub idle_connection_timeout: Duration,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            max_connections: 200,
            idle_connection_timeout: Duration::from_secs(60),
        }
    }
}
