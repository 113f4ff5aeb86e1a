use super::*;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use shared::{domain::CommandStatus, error::ErrorCode};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    created: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn create_command(
    State(state): State<ServerState>,
    Path(agent_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.created.lock().await.push((agent_id, body));
    (StatusCode::CREATED, Json(json!({ "command_id": "cmd_42" })))
}

async fn list_commands(Path(agent_id): Path<String>) -> Json<Value> {
    if agent_id != "agent-7" {
        return Json(json!([]));
    }
    Json(json!([
        {
            "id": "cmd_43",
            "status": "RUNNING",
            "params": { "targets": ["10.0.0.0/24"], "shield": false },
            "created_at": "2026-03-01T12:05:00Z",
            "started_at": "2026-03-01T12:05:02Z"
        },
        {
            "id": "cmd_42",
            "status": "completed",
            "params": { "targets": ["192.168.1.0/24"], "shield": true },
            "created_at": "2026-03-01T12:00:00Z",
            "started_at": "2026-03-01T12:00:03Z",
            "completed_at": "2026-03-01T12:00:45Z",
            "result": { "assets_discovered": 12, "targets_scanned": 1 }
        }
    ]))
}

async fn get_command(
    Path((_agent_id, command_id)): Path<(String, String)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match command_id.as_str() {
        "cmd_42" => Ok(Json(json!({
            "id": "cmd_42",
            "status": "verifying",
            "params": { "targets": ["192.168.1.0/24"] },
            "created_at": "2026-03-01T12:00:00Z",
            "started_at": "2026-03-01T12:00:03Z",
            "result": { "step": "Ag taraniyor", "assets_discovered": "twelve", "errors": "nope" }
        }))),
        "cmd_broken" => Err((StatusCode::BAD_GATEWAY, Json(json!("upstream exploded")))),
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "not_found", "message": format!("command {command_id} not found") })),
        )),
    }
}

async fn spawn_command_server() -> Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route(
            "/api/agents/:agent_id/commands",
            get(list_commands).post(create_command),
        )
        .route(
            "/api/agents/:agent_id/commands/:command_id",
            get(get_command),
        )
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

#[test]
fn rejects_non_http_server_urls() {
    assert!(HttpCommandRepository::new("ftp://scanner.local").is_err());
    assert!(HttpCommandRepository::new("mailto:ops@example.com").is_err());
    assert!(HttpCommandRepository::new("not a url").is_err());
    assert!(HttpCommandRepository::new(" https://scanner.local ").is_ok());
}

#[test]
fn commands_url_appends_to_base_path() {
    let agent = AgentId::from("agent-7");
    let command = CommandId::from("cmd_42");

    let repository = HttpCommandRepository::new("http://scanner.local/api/").expect("repository");
    assert_eq!(
        repository.commands_url(&agent, None).expect("url").as_str(),
        "http://scanner.local/api/agents/agent-7/commands"
    );
    assert_eq!(
        repository
            .commands_url(&agent, Some(&command))
            .expect("url")
            .as_str(),
        "http://scanner.local/api/agents/agent-7/commands/cmd_42"
    );

    let bare = HttpCommandRepository::new("http://scanner.local").expect("repository");
    assert_eq!(
        bare.commands_url(&agent, None).expect("url").as_str(),
        "http://scanner.local/agents/agent-7/commands"
    );
}

#[tokio::test]
async fn create_command_posts_scan_request() {
    let (server_url, state) = spawn_command_server().await.expect("spawn server");
    let repository = HttpCommandRepository::new(&server_url).expect("repository");

    let command_id = repository
        .create_command(
            &AgentId::from("agent-7"),
            &ScanParams::new(["192.168.1.0/24", "10.0.0.0/24"], true),
        )
        .await
        .expect("create");
    assert_eq!(command_id, CommandId::from("cmd_42"));

    let created = state.created.lock().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0, "agent-7");
    assert_eq!(
        created[0].1,
        json!({
            "type": "scan",
            "targets": ["192.168.1.0/24", "10.0.0.0/24"],
            "shield": true
        })
    );
}

#[tokio::test]
async fn get_command_tolerates_unknown_status_and_malformed_result() {
    let (server_url, _state) = spawn_command_server().await.expect("spawn server");
    let repository = HttpCommandRepository::new(&server_url).expect("repository");

    let command = repository
        .get_command(&AgentId::from("agent-7"), &CommandId::from("cmd_42"))
        .await
        .expect("get");
    assert_eq!(command.status, CommandStatus::Unknown("verifying".to_string()));
    assert!(!command.params.shield);
    assert_eq!(command.completed_at, None);
    let result = command.result.expect("result");
    assert_eq!(result.step.as_deref(), Some("Ag taraniyor"));
    assert_eq!(result.assets_discovered, None);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn list_commands_preserves_newest_first_order() {
    let (server_url, _state) = spawn_command_server().await.expect("spawn server");
    let repository = HttpCommandRepository::new(&server_url).expect("repository");

    let commands = repository
        .list_commands(&AgentId::from("agent-7"))
        .await
        .expect("list");
    let ids: Vec<_> = commands.iter().map(|command| command.id.as_str()).collect();
    assert_eq!(ids, vec!["cmd_43", "cmd_42"]);
    assert_eq!(commands[0].status, CommandStatus::Running);
    assert!(commands[1].is_terminal());
    assert_eq!(
        commands[1]
            .result
            .as_ref()
            .and_then(|result| result.assets_discovered),
        Some(12)
    );

    let empty = repository
        .list_commands(&AgentId::from("agent-unknown"))
        .await
        .expect("list");
    assert!(empty.is_empty());
}

#[tokio::test]
async fn api_errors_surface_as_api_exceptions() {
    let (server_url, _state) = spawn_command_server().await.expect("spawn server");
    let repository = HttpCommandRepository::new(&server_url).expect("repository");

    let err = repository
        .get_command(&AgentId::from("agent-7"), &CommandId::from("cmd_missing"))
        .await
        .expect_err("missing command");
    let api = err
        .downcast_ref::<ApiException>()
        .expect("api exception in chain");
    assert_eq!(api.code, ErrorCode::NotFound);
    assert_eq!(api.message, "command cmd_missing not found");
    assert!(format!("{err:#}").contains("404"));

    let err = repository
        .get_command(&AgentId::from("agent-7"), &CommandId::from("cmd_broken"))
        .await
        .expect_err("non api error body");
    assert!(err.downcast_ref::<ApiException>().is_none());
    let rendered = err.to_string();
    assert!(rendered.contains("502"));
    assert!(rendered.contains("upstream exploded"));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let repository = HttpCommandRepository::new(&format!("http://{addr}")).expect("repository");
    let err = repository
        .list_commands(&AgentId::from("agent-7"))
        .await
        .expect_err("nothing listening");
    assert!(err.to_string().contains("failed to reach agent-command API"));
}
