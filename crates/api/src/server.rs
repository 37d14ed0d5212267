//! Router assembly and the serve loop.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use sentinel_common::Result;

use crate::error::ApiResult;
use crate::routes;
use crate::state::AppState;
use crate::types::HealthResponse;

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let config = state.config.read().await;
    Ok(Json(HealthResponse {
        service: config.app.name.clone(),
        version: config.app.version.clone(),
        status: "ok",
    }))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/users", post(routes::users::create_user).get(routes::users::list_users))
        .route("/users/stats/count", get(routes::users::user_stats))
        .route(
            "/users/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route(
            "/subscriptions",
            post(routes::subscriptions::create_subscription)
                .get(routes::subscriptions::list_subscriptions),
        )
        .route(
            "/subscriptions/:id",
            get(routes::subscriptions::get_subscription)
                .put(routes::subscriptions::update_subscription)
                .delete(routes::subscriptions::delete_subscription),
        )
        .route(
            "/subscriptions/:id/activities",
            get(routes::subscriptions::list_activities),
        )
        .route(
            "/subscriptions/:id/sync",
            post(routes::subscriptions::sync_subscription),
        )
        .route(
            "/reports",
            get(routes::reports::list_reports),
        )
        .route("/reports/generate", post(routes::reports::generate_report))
        .route(
            "/reports/:id",
            get(routes::reports::get_report).delete(routes::reports::delete_report),
        )
        .route("/reports/:id/cancel", post(routes::reports::cancel_report))
        .route("/reports/:id/download", get(routes::reports::download_report))
        .route(
            "/settings",
            get(routes::settings::get_settings).put(routes::settings::put_settings),
        )
        .route("/dashboard/overview", get(routes::dashboard::overview))
        .route("/llm/chat", post(routes::llm::chat))
        .route("/websocket/connect", get(routes::websocket::connect));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(sentinel_common::SentinelError::Io)?;
    info!(%addr, "http server listening");
    axum::serve(listener, app)
        .await
        .map_err(sentinel_common::SentinelError::Io)?;
    Ok(())
}
