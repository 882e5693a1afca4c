//! Swarm construction and the driver task that owns it (§2, §4.1).
//!
//! `P2pHost` is the facade the rest of the node talks to: a cheap-to-clone
//! handle around a command channel plus a broadcast channel of inbound
//! pubsub messages. The actual `Swarm` never leaves the driver task, so
//! nothing outside this module ever touches libp2p types directly.

use crate::config::{P2pConfig, TOPIC_CLUSTER_MEMBERS, TOPIC_MONITORING, TOPIC_PEER_DISCOVERY};
use anyhow::{anyhow, Context, Result};
use dashmap::DashSet;
use futures::StreamExt;
use libp2p::{
    gossipsub, identify, identity::Keypair, noise, ping, swarm::NetworkBehaviour,
    swarm::SwarmEvent, tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use orama_core::TaskSupervisor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};

/// An inbound message received on one of the reserved pubsub topics.
#[derive(Debug, Clone)]
pub struct PubsubMessage {
    pub topic: String,
    pub source: Option<PeerId>,
    pub data: Vec<u8>,
}

#[derive(NetworkBehaviour)]
pub(crate) struct OramaBehaviour {
    gossipsub: gossipsub::Behaviour,
    identify: identify::Behaviour,
    ping: ping::Behaviour,
}

impl OramaBehaviour {
    fn new(keypair: &Keypair) -> Result<Self> {
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(1))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .message_id_fn(|msg: &gossipsub::Message| {
                use std::hash::{Hash, Hasher};
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                msg.data.hash(&mut hasher);
                if let Some(src) = msg.source {
                    src.hash(&mut hasher);
                }
                gossipsub::MessageId::from(hasher.finish().to_string())
            })
            .build()
            .map_err(|e| anyhow!("invalid gossipsub config: {e}"))?;

        let mut gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(keypair.clone()),
            gossipsub_config,
        )
        .map_err(|e| anyhow!("failed to build gossipsub behaviour: {e}"))?;

        for topic in [TOPIC_PEER_DISCOVERY, TOPIC_CLUSTER_MEMBERS, TOPIC_MONITORING] {
            gossipsub
                .subscribe(&gossipsub::IdentTopic::new(topic))
                .map_err(|e| anyhow!("failed to subscribe to {topic}: {e}"))?;
        }

        let identify = identify::Behaviour::new(identify::Config::new(
            "orama/1.0.0".to_string(),
            keypair.public(),
        ));
        let ping = ping::Behaviour::new(ping::Config::new());

        Ok(Self {
            gossipsub,
            identify,
            ping,
        })
    }
}

enum Command {
    ListenOn {
        addr: Multiaddr,
        respond: oneshot::Sender<Result<()>>,
    },
    Dial {
        peer_id: PeerId,
        addr: Multiaddr,
        respond: oneshot::Sender<Result<()>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        respond: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a running libp2p host. Cloning is cheap; every clone shares the
/// same underlying swarm driver task.
#[derive(Clone)]
pub struct P2pHost {
    local_peer_id: PeerId,
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<PubsubMessage>,
    connected: Arc<DashSet<PeerId>>,
}

impl P2pHost {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connected.contains(peer_id)
    }

    pub fn connected_peer_count(&self) -> usize {
        self.connected.len()
    }

    /// A fresh receiver over every inbound pubsub message on any reserved
    /// topic. Consumers filter by `msg.topic`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PubsubMessage> {
        self.events.subscribe()
    }

    pub async fn listen_on(&self, addr: Multiaddr) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ListenOn { addr, respond: tx })
            .await
            .map_err(|_| anyhow!("p2p driver task has stopped"))?;
        rx.await.map_err(|_| anyhow!("p2p driver task dropped response"))?
    }

    /// Dial a known peer at `addr`, resolving once the connection is
    /// established or definitively fails. Callers apply their own timeout
    /// (DIAL_TIMEOUT / OPPORTUNISTIC_DIAL_TIMEOUT per §4.1).
    pub async fn dial(&self, peer_id: PeerId, addr: Multiaddr) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Dial {
                peer_id,
                addr,
                respond: tx,
            })
            .await
            .map_err(|_| anyhow!("p2p driver task has stopped"))?;
        rx.await.map_err(|_| anyhow!("p2p driver task dropped response"))?
    }

    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Publish {
                topic: topic.to_string(),
                data,
                respond: tx,
            })
            .await
            .map_err(|_| anyhow!("p2p driver task has stopped"))?;
        rx.await.map_err(|_| anyhow!("p2p driver task dropped response"))?
    }

    /// Build the swarm, spawn its driver task on `supervisor`, and return a
    /// handle once every `listen_addrs` entry has either started listening
    /// or the attempt has definitively failed.
    pub async fn start(
        keypair: Keypair,
        config: P2pConfig,
        listen_addrs: Vec<Multiaddr>,
        supervisor: &TaskSupervisor,
    ) -> Result<P2pHost> {
        let local_peer_id = PeerId::from(keypair.public());
        let idle_timeout = config.idle_connection_timeout;

        let mut swarm: Swarm<OramaBehaviour> = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .context("failed to build tcp transport")?
            .with_quic()
            .with_behaviour(|key| OramaBehaviour::new(key).map_err(|e| e.into()))
            .map_err(|e| anyhow!("failed to build swarm behaviour: {e}"))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        for addr in &listen_addrs {
            swarm
                .listen_on(addr.clone())
                .with_context(|| format!("failed to listen on {addr}"))?;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (events_tx, _) = broadcast::channel(1024);
        let connected = Arc::new(DashSet::new());

        let driver = Driver {
            swarm,
            cmd_rx,
            events: events_tx.clone(),
            connected: connected.clone(),
            pending_dials: HashMap::new(),
        };

        let cancel = supervisor.cancellation_token();
        supervisor.spawn(driver.run(cancel));

        Ok(P2pHost {
            local_peer_id,
            cmd_tx,
            events: events_tx,
            connected,
        })
    }
}

struct Driver {
    swarm: Swarm<OramaBehaviour>,
    cmd_rx: mpsc::Receiver<Command>,
    events: broadcast::Sender<PubsubMessage>,
    connected: Arc<DashSet<PeerId>>,
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<Result<()>>>>,
}

impl Driver {
    async fn run(mut self, cancel: tokio_util::sync::CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("p2p driver task shutting down");
                    break;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::ListenOn { addr, respond } => {
                let result = self
                    .swarm
                    .listen_on(addr)
                    .map(|_| ())
                    .map_err(|e| anyhow!("listen failed: {e}"));
                let _ = respond.send(result);
            }
            Command::Dial {
                peer_id,
                addr,
                respond,
            } => {
                self.swarm.add_peer_address(peer_id, addr.clone());
                match self.swarm.dial(addr) {
                    Ok(()) => self
                        .pending_dials
                        .entry(peer_id)
                        .or_default()
                        .push(respond),
                    Err(e) => {
                        let _ = respond.send(Err(anyhow!("dial failed: {e}")));
                    }
                }
            }
            Command::Publish {
                topic,
                data,
                respond,
            } => {
                let ident = gossipsub::IdentTopic::new(topic);
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(ident, data)
                    .map(|_| ())
                    .map_err(|e| anyhow!("publish failed: {e}"));
                let _ = respond.send(result);
            }
        }
    }

    fn resolve_pending_dial(&mut self, peer_id: &PeerId, result: Result<()>) {
        if let Some(waiters) = self.pending_dials.remove(peer_id) {
            for waiter in waiters {
                let cloned = match &result {
                    Ok(()) => Ok(()),
                    Err(e) => Err(anyhow!(e.to_string())),
                };
                let _ = waiter.send(cloned);
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<OramaBehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                self.connected.insert(peer_id);
                self.resolve_pending_dial(&peer_id, Ok(()));
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                self.connected.remove(&peer_id);
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer_id) = peer_id {
                    self.resolve_pending_dial(&peer_id, Err(anyhow!("{error}")));
                }
            }
            SwarmEvent::Behaviour(OramaBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                let msg = PubsubMessage {
                    topic: message.topic.into_string(),
                    source: message.source.or(Some(propagation_source)),
                    data: message.data,
                };
                trace!(topic = %msg.topic, "received pubsub message");
                let _ = self.events.send(msg);
            }
            SwarmEvent::Behaviour(OramaBehaviourEvent::Ping(ping::Event { peer, result, .. })) => {
                if let Err(e) = result {
                    warn!(%peer, error = %e, "ping failed, disconnecting");
                    let _ = self.swarm.disconnect_peer_id(peer);
                }
            }
            SwarmEvent::Behaviour(OramaBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    self.swarm.add_peer_address(peer_id, addr);
                }
            }
            other => trace!(?other, "swarm event"),
        }
    }
}
