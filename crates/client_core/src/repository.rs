use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AgentId, Command, CommandId, ScanParams},
    error::{ApiError, ApiException},
    protocol::{CreateCommandRequest, CreateCommandResponse},
};
use tracing::debug;
use url::Url;

/// Agent-command API as consumed by the tracker.
#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn create_command(&self, agent_id: &AgentId, params: &ScanParams) -> Result<CommandId>;
    async fn get_command(&self, agent_id: &AgentId, command_id: &CommandId) -> Result<Command>;
    /// Commands for the agent, newest first.
    async fn list_commands(&self, agent_id: &AgentId) -> Result<Vec<Command>>;
}

pub struct MissingCommandRepository;

#[async_trait]
impl CommandRepository for MissingCommandRepository {
    async fn create_command(&self, agent_id: &AgentId, _params: &ScanParams) -> Result<CommandId> {
        Err(anyhow!(
            "command repository unavailable for agent {agent_id}"
        ))
    }

    async fn get_command(&self, agent_id: &AgentId, command_id: &CommandId) -> Result<Command> {
        Err(anyhow!(
            "command repository unavailable for agent {agent_id} command {command_id}"
        ))
    }

    async fn list_commands(&self, agent_id: &AgentId) -> Result<Vec<Command>> {
        Err(anyhow!(
            "command repository unavailable for agent {agent_id}"
        ))
    }
}

pub struct HttpCommandRepository {
    http: Client,
    base_url: Url,
}

impl HttpCommandRepository {
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self> {
        let base_url = Url::parse(server_url.trim())
            .with_context(|| format!("invalid agent-command API url: {server_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(anyhow!(
                "server_url must start with http:// or https://, got {server_url}"
            ));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn commands_url(&self, agent_id: &AgentId, command_id: Option<&CommandId>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("agent-command API url cannot be a base"))?;
            segments
                .pop_if_empty()
                .extend(["agents", agent_id.as_str(), "commands"]);
            if let Some(command_id) = command_id {
                segments.push(command_id.as_str());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CommandRepository for HttpCommandRepository {
    async fn create_command(&self, agent_id: &AgentId, params: &ScanParams) -> Result<CommandId> {
        let url = self.commands_url(agent_id, None)?;
        let response = self
            .http
            .post(url.clone())
            .json(&CreateCommandRequest::scan(params.clone()))
            .send()
            .await
            .with_context(|| format!("failed to reach agent-command API: {url}"))?;
        let body: CreateCommandResponse = decode(response).await?;
        debug!(agent_id = %agent_id, command_id = %body.command_id, "repository: command created");
        Ok(body.command_id)
    }

    async fn get_command(&self, agent_id: &AgentId, command_id: &CommandId) -> Result<Command> {
        let url = self.commands_url(agent_id, Some(command_id))?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("failed to reach agent-command API: {url}"))?;
        decode(response).await
    }

    async fn list_commands(&self, agent_id: &AgentId) -> Result<Vec<Command>> {
        let url = self.commands_url(agent_id, None)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("failed to reach agent-command API: {url}"))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .context("invalid agent-command API response body");
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(anyhow::Error::new(ApiException::from(api_error))
            .context(format!("agent-command API returned {status}"))),
        Err(_) => Err(anyhow!("agent-command API returned {status}: {body}")),
    }
}

#[cfg(test)]
#[path = "tests/repository_tests.rs"]
mod tests;
