//! Conversational endpoint over the LLM adapter.

use axum::extract::State;
use axum::Json;
use tracing::instrument;

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{ChatRequest, ChatResponse};

#[instrument(skip(state, req), fields(message_len = req.message.len()))]
pub async fn chat(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let reply = state
        .llm
        .chat(user.id, &req.message, req.context.as_deref())
        .await;
    Ok(Json(ChatResponse { reply }))
}
