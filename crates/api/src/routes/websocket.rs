//! Realtime hub entry point.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use tracing::{instrument, warn};

use crate::auth::resolve_token;
use crate::state::AppState;
use crate::types::SocketQuery;

/// `GET /websocket/connect?token=...`. The token is validated after the
/// upgrade so an invalid one gets a proper policy-violation close frame
/// instead of a failed handshake.
#[instrument(skip_all)]
pub async fn connect(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        match resolve_token(&state, &query.token).await {
            Ok(user) => {
                sentinel_realtime::serve_socket(state.hub.clone(), socket, user.id).await;
            }
            Err(e) => {
                warn!(error = %e, "socket rejected");
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::POLICY,
                        reason: "authentication failed".into(),
                    })))
                    .await;
            }
        }
    })
}
