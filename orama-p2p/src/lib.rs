//! Node lifecycle and peer connectivity (§2, §3, §4.1).
//!
//! `P2pHost::start` brings up the libp2p swarm; `P2pNetwork::start` wraps it
//! with the reconnection loop, peer-exchange announcer/consumer, and the
//! shared peerstore, giving callers one handle for the whole subsystem.

pub mod backoff;
pub mod config;
pub mod host;
pub mod multiaddr_util;
pub mod peer_exchange;
pub mod peerstore;
pub mod reconnect;

pub use config::P2pConfig;
pub use host::{P2pHost, PubsubMessage};
pub use peerstore::PeerStore;

use anyhow::Result;
use libp2p::identity::Keypair;
use orama_core::TaskSupervisor;
use std::sync::Arc;

/// The assembled peer-connectivity subsystem: a running swarm plus its
/// reconnection and peer-exchange background tasks.
#[derive(Clone)]
pub struct P2pNetwork {
    pub host: P2pHost,
    pub peerstore: Arc<PeerStore>,
}

impl P2pNetwork {
    /// Parse configuration, start the swarm, and spawn the reconnection and
    /// peer-exchange tasks on `supervisor`. Fails fast on invalid multiaddr
    /// syntax (§4.1).
    pub async fn start(
        keypair: Keypair,
        config: P2pConfig,
        listen_addrs: Vec<String>,
        bootstrap_peers: Vec<String>,
        supervisor: &TaskSupervisor,
    ) -> Result<P2pNetwork> {
        let listen_addrs = multiaddr_util::parse_bootstrap_list(&listen_addrs)?;
        let bootstrap_addrs = multiaddr_util::parse_bootstrap_list(&bootstrap_peers)?;

        let local_peer_id = libp2p::PeerId::from(keypair.public());
        let peerstore = Arc::new(PeerStore::new(local_peer_id));

        let host = P2pHost::start(keypair, config, listen_addrs.clone(), supervisor).await?;

        let cancel = supervisor.cancellation_token();
        supervisor.spawn(reconnect::run(host.clone(), bootstrap_addrs, cancel.clone()));

        let cancel = supervisor.cancellation_token();
        supervisor.spawn(peer_exchange::announce(
            host.clone(),
            listen_addrs,
            cancel.clone(),
        ));

        let cancel = supervisor.cancellation_token();
        supervisor.spawn(peer_exchange::consume(
            host.clone(),
            peerstore.clone(),
            cancel,
        ));

        Ok(P2pNetwork { host, peerstore })
    }

    pub fn local_peer_id(&self) -> libp2p::PeerId {
        self.host.local_peer_id()
    }

    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        self.host.publish(topic, data).await
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<PubsubMessage> {
        self.host.subscribe_events()
    }
}
