//! Settings: read the active config (secrets redacted) and persist
//! updates back to the YAML file.

use axum::extract::State;
use axum::Json;
use tracing::{info, instrument};

use sentinel_common::{SentinelConfig, SentinelError};

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[instrument(skip_all)]
pub async fn get_settings(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
) -> ApiResult<Json<SentinelConfig>> {
    let config = state.config.read().await;
    Ok(Json(config.redacted()))
}

/// Replace the configuration. The new value is written to the YAML file
/// and applied in memory; components constructed at startup pick it up on
/// restart.
#[instrument(skip_all)]
pub async fn put_settings(
    State(state): State<AppState>,
    AuthedUser(_): AuthedUser,
    Json(incoming): Json<SentinelConfig>,
) -> ApiResult<Json<SentinelConfig>> {
    let yaml = incoming.to_yaml()?;
    std::fs::create_dir_all("config").map_err(SentinelError::Io)?;
    std::fs::write(sentinel_common::config::CONFIG_PATHS[0], yaml).map_err(SentinelError::Io)?;

    let mut config = state.config.write().await;
    *config = incoming;
    info!("configuration updated");
    Ok(Json(config.redacted()))
}
