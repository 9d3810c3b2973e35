use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use island_common::PlayerId;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

/// Outbound messages buffered per connection before sends start failing.
const CONNECTION_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConnection {
    pub player_id: PlayerId,
    pub current_zone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("player {0} is not connected")]
    NotConnected(String),
    #[error("outbound buffer for {0} is full")]
    Backpressure(String),
}

/// Push channel to connected players. Delivery is best effort.
#[async_trait]
pub trait BroadcastPort: Send + Sync {
    async fn send_to_player(&self, player_id: &str, payload: &str) -> Result<(), BroadcastError>;

    /// Send to every player in the zone except `except`. Returns how many
    /// players the payload was handed to.
    async fn broadcast_to_zone(
        &self,
        zone_id: &str,
        payload: &str,
        except: Option<&str>,
    ) -> Result<usize, BroadcastError>;

    async fn get_player_connection(&self, player_id: &str) -> Option<PlayerConnection>;
}

/// Zone everyone looking at an island joins by default.
pub fn island_zone(island_id: &str) -> String {
    format!("island:{island_id}")
}

struct Connection {
    id: u64,
    sender: mpsc::Sender<String>,
    zone: Option<String>,
}

/// In-process registry of WebSocket connections, one per player.
#[derive(Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<PlayerId, Connection>>,
    next_id: AtomicU64,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player's connection, replacing any older one. Returns the
    /// connection id and the stream of messages to write to the socket.
    pub async fn register(&self, player_id: &str) -> (u64, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.connections.write().await.insert(
            player_id.to_string(),
            Connection {
                id,
                sender,
                zone: None,
            },
        );
        if previous.is_some() {
            tracing::info!("Replaced existing connection for {}", player_id);
        }
        (id, receiver)
    }

    /// Remove a connection, unless it has already been replaced by a newer one.
    pub async fn unregister(&self, player_id: &str, connection_id: u64) {
        let mut connections = self.connections.write().await;
        if connections.get(player_id).is_some_and(|c| c.id == connection_id) {
            connections.remove(player_id);
        }
    }

    pub async fn join_zone(&self, player_id: &str, zone_id: &str) -> bool {
        match self.connections.write().await.get_mut(player_id) {
            Some(connection) => {
                connection.zone = Some(zone_id.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn leave_zone(&self, player_id: &str) {
        if let Some(connection) = self.connections.write().await.get_mut(player_id) {
            connection.zone = None;
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[async_trait]
impl BroadcastPort for ConnectionHub {
    async fn send_to_player(&self, player_id: &str, payload: &str) -> Result<(), BroadcastError> {
        let connections = self.connections.read().await;
        let connection = connections
            .get(player_id)
            .ok_or_else(|| BroadcastError::NotConnected(player_id.to_string()))?;
        connection
            .sender
            .try_send(payload.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    BroadcastError::Backpressure(player_id.to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    BroadcastError::NotConnected(player_id.to_string())
                }
            })
    }

    async fn broadcast_to_zone(
        &self,
        zone_id: &str,
        payload: &str,
        except: Option<&str>,
    ) -> Result<usize, BroadcastError> {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (player_id, connection) in connections.iter() {
            if connection.zone.as_deref() != Some(zone_id) || except == Some(player_id.as_str()) {
                continue;
            }
            match connection.sender.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Dropped zone message for {}: {}", player_id, e),
            }
        }
        Ok(delivered)
    }

    async fn get_player_connection(&self, player_id: &str) -> Option<PlayerConnection> {
        self.connections
            .read()
            .await
            .get(player_id)
            .map(|c| PlayerConnection {
                player_id: player_id.to_string(),
                current_zone: c.zone.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zone_broadcast_reaches_only_members() {
        let hub = ConnectionHub::new();
        let (_, mut alice) = hub.register("alice").await;
        let (_, mut bob) = hub.register("bob").await;
        let (_, mut carol) = hub.register("carol").await;

        assert!(hub.join_zone("alice", "island:island_alice").await);
        assert!(hub.join_zone("bob", "island:island_alice").await);
        hub.join_zone("carol", "island:island_carol").await;

        let delivered = hub
            .broadcast_to_zone("island:island_alice", "hello", None)
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(alice.recv().await.as_deref(), Some("hello"));
        assert_eq!(bob.recv().await.as_deref(), Some("hello"));
        assert!(carol.try_recv().is_err());

        let delivered = hub
            .broadcast_to_zone("island:island_alice", "again", Some("alice"))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(bob.recv().await.as_deref(), Some("again"));
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_unregister_keeps_new_connection() {
        let hub = ConnectionHub::new();
        let (old_id, _old) = hub.register("alice").await;
        let (_, mut new) = hub.register("alice").await;

        hub.unregister("alice", old_id).await;
        assert_eq!(hub.connected_count().await, 1);
        hub.send_to_player("alice", "still here").await.unwrap();
        assert_eq!(new.recv().await.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn connection_reports_zone() {
        let hub = ConnectionHub::new();
        assert!(hub.get_player_connection("alice").await.is_none());
        assert!(matches!(
            hub.send_to_player("alice", "x").await,
            Err(BroadcastError::NotConnected(_))
        ));

        let _rx = hub.register("alice").await;
        hub.join_zone("alice", "market").await;
        let connection = hub.get_player_connection("alice").await.unwrap();
        assert_eq!(connection.current_zone.as_deref(), Some("market"));

        hub.leave_zone("alice").await;
        let connection = hub.get_player_connection("alice").await.unwrap();
        assert_eq!(connection.current_zone, None);
    }
}
