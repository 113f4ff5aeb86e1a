use shared::domain::CommandId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("already tracking command {command_id}; dismiss it before starting another")]
    AlreadyTracking { command_id: CommandId },
    #[error("command {command_id} is still in flight and cannot be dismissed")]
    StillInFlight { command_id: CommandId },
    #[error("a scan command is already being created for this agent")]
    DispatchInProgress,
    #[error("scan requires at least one target")]
    EmptyScan,
    #[error("command repository {operation} failed: {source}")]
    Repository {
        operation: &'static str,
        source: anyhow::Error,
    },
}

impl TrackerError {
    pub(crate) fn repository(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Repository { operation, source }
    }
}
