//! WS session manager (§4.4): dual index over live clients and the topics
//! they subscribe to, each behind its own reader-writer lock.

use crate::connection::ConnectionHandle;
use crate::error::WsError;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

#[derive(Default)]
pub struct WsSessionManager {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
    topics: RwLock<HashMap<String, HashSet<String>>>,
}

impl WsSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any existing record under `client_id`; the previous
    /// connection, if any, is closed exactly once.
    pub async fn register(&self, conn: ConnectionHandle) {
        let client_id = conn.client_id().to_string();
        let previous = self.connections.write().await.insert(client_id, conn);
        if let Some(previous) = previous {
            previous.close();
        }
    }

    /// Removes `client_id` from every topic index and closes its connection
    /// exactly once.
    pub async fn unregister(&self, client_id: &str) {
        let removed = self.connections.write().await.remove(client_id);
        {
            let mut topics = self.topics.write().await;
            topics.retain(|_, members| {
                members.remove(client_id);
                !members.is_empty()
            });
        }
        if let Some(conn) = removed {
            conn.close();
        }
    }

    pub async fn send(&self, client_id: &str, msg: Message) -> Result<(), WsError> {
        let conn = self.connections.read().await.get(client_id).cloned();
        match conn {
            Some(conn) => conn.send(msg),
            None => Err(WsError::ClientNotFound {
                client_id: client_id.to_string(),
            }),
        }
    }

    /// Snapshots the subscriber set under the topic lock, then sends to each
    /// without holding it. Returns the number of recipients the message was
    /// successfully handed to; per-recipient failures are counted, not
    /// surfaced.
    pub async fn broadcast(&self, topic: &str, msg: Message) -> usize {
        let members: Vec<String> = self
            .topics
            .read()
            .await
            .get(topic)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for client_id in &members {
            match self.send(client_id, msg.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(%topic, %client_id, error = %e, "broadcast recipient failed"),
            }
        }
        delivered
    }

    pub async fn subscribe(&self, client_id: &str, topic: &str) {
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    /// Removes `client_id` from `topic`'s subscriber set; an empty set is
    /// removed from the topic map entirely.
    pub async fn unsubscribe(&self, client_id: &str, topic: &str) {
        let mut topics = self.topics.write().await;
        if let Some(members) = topics.get_mut(topic) {
            members.remove(client_id);
            if members.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Closes every connection and drops both indices.
    pub async fn close(&self) {
        let connections = std::mem::take(&mut *self.connections.write().await);
        for (_, conn) in connections {
            conn.close();
        }
        self.topics.write().await.clear();
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn topic_subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map(HashSet::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(client_id: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(client_id.to_string(), tx), rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers_exactly_once() {
        let manager = WsSessionManager::new();
        let (c1, mut rx1) = handle("c1");
        let (c2, mut rx2) = handle("c2");
        manager.register(c1).await;
        manager.register(c2).await;
        manager.subscribe("c1", "topic").await;
        manager.subscribe("c2", "topic").await;

        let delivered = manager.broadcast("topic", Message::Text("X".to_string())).await;
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await, Some(Message::Text("X".to_string())));
        assert_eq!(rx2.recv().await, Some(Message::Text("X".to_string())));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_removes_from_topic_index_and_closes_once() {
        let manager = WsSessionManager::new();
        let (c1, mut rx1) = handle("c1");
        let (c2, mut rx2) = handle("c2");
        manager.register(c1).await;
        manager.register(c2).await;
        manager.subscribe("c1", "topic").await;
        manager.subscribe("c2", "topic").await;

        manager.unregister("c1").await;
        assert_eq!(rx1.recv().await, Some(Message::Close(None)));
        assert_eq!(manager.topic_subscriber_count("topic").await, 1);

        let delivered = manager.broadcast("topic", Message::Text("Y".to_string())).await;
        assert_eq!(delivered, 1);
        assert_eq!(rx2.recv().await, Some(Message::Text("Y".to_string())));
    }

    #[tokio::test]
    async fn send_to_unknown_client_is_not_found() {
        let manager = WsSessionManager::new();
        let result = manager.send("ghost", Message::Text("hi".to_string())).await;
        assert!(matches!(result, Err(WsError::ClientNotFound { .. })));
    }

    #[tokio::test]
    async fn register_replaces_and_closes_previous_connection() {
        let manager = WsSessionManager::new();
        let (c1a, mut rx1a) = handle("c1");
        let (c1b, _rx1b) = handle("c1");
        manager.register(c1a).await;
        manager.register(c1b).await;
        assert_eq!(rx1a.recv().await, Some(Message::Close(None)));
        assert_eq!(manager.connection_count().await, 1);
    }
}
