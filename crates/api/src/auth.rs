//! Opaque bearer-token authentication.
//!
//! Tokens resolve against the user table. The `demo` token is honored only
//! when `app.dev_mode` is set; production configurations refuse it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use sentinel_common::types::User;
use sentinel_common::SentinelError;

use crate::error::ApiError;
use crate::state::AppState;

pub const DEMO_TOKEN: &str = "demo";

pub struct AuthedUser(pub User);

pub async fn resolve_token(state: &AppState, token: &str) -> Result<User, SentinelError> {
    if token.is_empty() {
        return Err(SentinelError::Unauthorized("missing bearer token".to_string()));
    }
    if token == DEMO_TOKEN {
        let dev_mode = state.config.read().await.app.dev_mode;
        if !dev_mode {
            return Err(SentinelError::Unauthorized(
                "demo token is disabled outside dev mode".to_string(),
            ));
        }
        // Dev convenience: the demo token acts as the first user.
        let users = state.store.list_users(1, 0).await?;
        return users
            .into_iter()
            .next()
            .ok_or_else(|| SentinelError::Unauthorized("no users exist yet".to_string()));
    }
    state.store.get_user_by_token(token).await
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .unwrap_or_default();
        let user = resolve_token(state, token).await?;
        Ok(AuthedUser(user))
    }
}
