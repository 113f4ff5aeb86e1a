use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use shared::{
    domain::{AgentId, Command, CommandId, ScanParams},
    error::{ApiError, ErrorCode},
    protocol::{CreateCommandRequest, CreateCommandResponse},
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::lifecycle::{SimulatedCommand, Transition};

/// In-memory agent-command store shared by the routes and the lifecycle driver.
#[derive(Clone, Default)]
pub struct ApiContext {
    commands: Arc<RwLock<HashMap<AgentId, Vec<SimulatedCommand>>>>,
}

pub fn commands_route() -> &'static str {
    "/agents/:agent_id/commands"
}

pub fn command_route() -> &'static str {
    "/agents/:agent_id/commands/:command_id"
}

pub async fn create_command(
    ctx: &ApiContext,
    agent_id: AgentId,
    request: CreateCommandRequest,
    now: DateTime<Utc>,
) -> Result<CreateCommandResponse, ApiError> {
    if agent_id.as_str().trim().is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "agent_id must not be empty"));
    }
    let params = ScanParams::new(request.params.targets, request.params.shield);
    if params.targets.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "scan requires at least one target",
        ));
    }

    let command_id = CommandId::new(format!("cmd_{}", Uuid::new_v4().simple()));
    info!(
        agent_id = %agent_id,
        command_id = %command_id,
        targets = params.targets.len(),
        shield = params.shield,
        "command created"
    );
    ctx.commands
        .write()
        .await
        .entry(agent_id)
        .or_default()
        .push(SimulatedCommand::new(command_id.clone(), params, now));
    Ok(CreateCommandResponse { command_id })
}

pub async fn get_command(
    ctx: &ApiContext,
    agent_id: &AgentId,
    command_id: &CommandId,
) -> Result<Command, ApiError> {
    ctx.commands
        .read()
        .await
        .get(agent_id)
        .and_then(|commands| {
            commands
                .iter()
                .find(|stored| &stored.command().id == command_id)
        })
        .map(|stored| stored.command().clone())
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!("command {command_id} not found for agent {agent_id}"),
            )
        })
}

/// Commands for `agent_id`, newest first. Unknown agents have none.
pub async fn list_commands(ctx: &ApiContext, agent_id: &AgentId) -> Vec<Command> {
    ctx.commands
        .read()
        .await
        .get(agent_id)
        .map(|commands| {
            commands
                .iter()
                .rev()
                .map(|stored| stored.command().clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Moves every in-flight command one lifecycle step. Returns how many moved.
pub async fn advance_commands(ctx: &ApiContext, now: DateTime<Utc>) -> usize {
    let mut commands = ctx.commands.write().await;
    let mut advanced = 0;
    for (agent_id, stored) in commands.iter_mut() {
        for simulated in stored.iter_mut() {
            let Some(transition) = simulated.advance(now) else {
                continue;
            };
            advanced += 1;
            let command = simulated.command();
            match transition {
                Transition::Completed | Transition::Failed => info!(
                    agent_id = %agent_id,
                    command_id = %command.id,
                    status = %command.status,
                    errors = command.errors().len(),
                    "command finished"
                ),
                _ => info!(
                    agent_id = %agent_id,
                    command_id = %command.id,
                    status = %command.status,
                    "command advanced"
                ),
            }
        }
    }
    advanced
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
