use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use shared::{
    domain::{AgentId, Command, CommandId},
    error::{ApiError, ErrorCode},
    protocol::{CreateCommandRequest, CreateCommandResponse},
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

mod api;
mod config;
mod lifecycle;

use api::{advance_commands, command_route, commands_route, ApiContext};
use config::load_settings;

const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let state = AppState {
        api: ApiContext::default(),
    };
    tokio::spawn(advance_loop(state.api.clone(), settings.advance_interval));
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(
        %addr,
        advance_interval_ms = settings.advance_interval.as_millis() as u64,
        "command server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            commands_route(),
            get(http_list_commands).post(http_create_command),
        )
        .route(command_route(), get(http_get_command))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .with_state(state)
}

async fn advance_loop(api: ApiContext, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;
    loop {
        interval.tick().await;
        let advanced = advance_commands(&api, Utc::now()).await;
        if advanced > 0 {
            debug!(advanced, "lifecycle tick");
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_create_command(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(req): Json<CreateCommandRequest>,
) -> ApiResult<(StatusCode, Json<CreateCommandResponse>)> {
    let created = api::create_command(&state.api, AgentId::new(agent_id), req, Utc::now())
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn http_get_command(
    State(state): State<Arc<AppState>>,
    Path((agent_id, command_id)): Path<(String, String)>,
) -> ApiResult<Json<Command>> {
    api::get_command(
        &state.api,
        &AgentId::new(agent_id),
        &CommandId::new(command_id),
    )
    .await
    .map(Json)
    .map_err(api_error)
}

async fn http_list_commands(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Json<Vec<Command>> {
    Json(api::list_commands(&state.api, &AgentId::new(agent_id)).await)
}

fn api_error(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
    };
    (status, Json(error))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
