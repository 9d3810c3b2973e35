use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::broadcast::ConnectionHub;

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    JoinZone { zone: String },
    LeaveZone,
}

pub async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>, player_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (connection_id, mut rx) = hub.register(&player_id).await;
    tracing::info!("WebSocket connected: {}", player_id);

    // Task: forward hub messages to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages from client
    let recv_hub = hub.clone();
    let recv_player = player_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => handle_client_message(&text, &recv_hub, &recv_player).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either side to finish
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.unregister(&player_id, connection_id).await;
    tracing::info!("WebSocket disconnected: {}", player_id);
}

async fn handle_client_message(text: &str, hub: &ConnectionHub, player_id: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Ignoring message from {}: {}", player_id, e);
            return;
        }
    };

    match msg {
        ClientMessage::JoinZone { zone } => {
            tracing::debug!("{} joined zone {}", player_id, zone);
            hub.join_zone(player_id, &zone).await;
        }
        ClientMessage::LeaveZone => hub.leave_zone(player_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastPort;

    #[test]
    fn parses_zone_messages() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"type":"join_zone","zone":"island:island_alice"}"#).unwrap();
        assert_eq!(
            join,
            ClientMessage::JoinZone {
                zone: "island:island_alice".into()
            }
        );
        let leave: ClientMessage = serde_json::from_str(r#"{"type":"leave_zone"}"#).unwrap();
        assert_eq!(leave, ClientMessage::LeaveZone);
    }

    #[tokio::test]
    async fn client_messages_move_player_between_zones() {
        let hub = ConnectionHub::new();
        let _rx = hub.register("alice").await;

        handle_client_message(r#"{"type":"join_zone","zone":"market"}"#, &hub, "alice").await;
        let zone = hub.get_player_connection("alice").await.unwrap().current_zone;
        assert_eq!(zone.as_deref(), Some("market"));

        handle_client_message("not json", &hub, "alice").await;
        handle_client_message(r#"{"type":"leave_zone"}"#, &hub, "alice").await;
        let zone = hub.get_player_connection("alice").await.unwrap().current_zone;
        assert_eq!(zone, None);
    }
}
