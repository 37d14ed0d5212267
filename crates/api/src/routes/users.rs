//! User management endpoints

use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;
use uuid::Uuid;

use sentinel_common::types::User;
use sentinel_storage::NewUser;

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{CreateUserRequest, CreateUserResponse, UpdateUserRequest, UserCountResponse};

/// Unauthenticated on purpose: this is the bootstrap path for a fresh
/// deployment. The generated token is shown exactly once.
#[instrument(skip(state, req), fields(handle = %req.handle))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<Json<CreateUserResponse>> {
    let api_token = Uuid::new_v4().to_string();
    let user = state
        .store
        .create_user(NewUser {
            handle: req.handle,
            email: req.email,
            display_name: req.display_name,
            api_token: Some(api_token.clone()),
        })
        .await?;
    Ok(Json(CreateUserResponse { user, api_token }))
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.store.list_users(200, 0).await?))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.store.get_user(id).await?))
}

#[instrument(skip(state, req))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    let user = state
        .store
        .update_user(id, req.display_name, req.active, req.preferences)
        .await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete_user(id).await?;
    Ok(Json(serde_json::json!({"deleted": id})))
}

#[instrument(skip_all)]
pub async fn user_stats(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
) -> ApiResult<Json<UserCountResponse>> {
    let (total, active) = state.store.count_users().await?;
    Ok(Json(UserCountResponse { total, active }))
}
