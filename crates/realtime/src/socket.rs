//! The per-connection socket pump: one writer task draining the session
//! queue, one reader loop handling client frames with an idle deadline.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::hub::Hub;
use crate::messages::{parse_client_message, ClientMessage, ParsedClientMessage, ServerMessage};

/// Server-initiated ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);
/// A session silent for this long is closed.
const IDLE_DEADLINE: Duration = Duration::from_secs(90);

/// Drive an authenticated socket until it closes. The caller has already
/// validated the bearer token and resolved the user.
pub async fn serve_socket(hub: Arc<Hub>, socket: WebSocket, user_id: i64) {
    let (session_id, mut frames) = hub.attach(user_id).await;
    let (mut sink, mut stream) = socket.split();

    // Writer: session queue → socket, plus the keepalive ping. Lagged
    // receivers lose the oldest frames; that is the backpressure policy.
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(message) => {
                        if sink.send(Message::Text(message.to_json())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(user_id, skipped = n, "session queue overflowed, dropped oldest frames");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: client frames with an idle deadline.
    loop {
        let next = tokio::time::timeout(IDLE_DEADLINE, stream.next()).await;
        let message = match next {
            Err(_) => {
                info!(user_id, %session_id, "closing idle session");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(user_id, %session_id, error = %e, "socket error");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                handle_client_frame(&hub, user_id, session_id, &text).await;
            }
            Message::Close(_) => break,
            // Pongs and pings only refresh the idle deadline.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    writer.abort();
    hub.detach(user_id, session_id).await;
}

async fn handle_client_frame(hub: &Hub, user_id: i64, session_id: uuid::Uuid, text: &str) {
    match parse_client_message(text) {
        ParsedClientMessage::Known(ClientMessage::Subscribe { channel }) => {
            hub.subscribe_channel(user_id, &channel).await;
            hub.send_to_session(
                user_id,
                session_id,
                ServerMessage::SubscriptionSuccess {
                    channel,
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
        ParsedClientMessage::Known(ClientMessage::Unsubscribe { channel }) => {
            hub.unsubscribe_channel(user_id, &channel).await;
            hub.send_to_session(
                user_id,
                session_id,
                ServerMessage::UnsubscriptionSuccess {
                    channel,
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
        ParsedClientMessage::Known(ClientMessage::Ping) => {
            hub.send_to_session(
                user_id,
                session_id,
                ServerMessage::Pong {
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
        ParsedClientMessage::Known(ClientMessage::GetStatus) => {
            let stats = hub.stats().await;
            hub.send_to_session(
                user_id,
                session_id,
                ServerMessage::Status {
                    active_users: stats.active_users,
                    total_connections: stats.total_connections,
                    channels: hub.user_channels(user_id).await,
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
        ParsedClientMessage::Unknown(kind) => {
            warn!(user_id, kind, "ignoring unknown client frame");
        }
        ParsedClientMessage::Invalid => {
            warn!(user_id, "ignoring unparseable client frame");
        }
    }
}
