//! Projection of a command's raw lifecycle status into the four user-facing steps.

use std::cmp::Ordering;

use shared::domain::{Command, CommandStatus};

pub const TOTAL_STEPS: usize = 4;

const QUEUED: usize = 0;
const RUNNING: usize = 2;
const COMPLETED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Queued,
    Acknowledged,
    Running,
    Completed,
}

impl StepKind {
    pub const ALL: [StepKind; TOTAL_STEPS] = [
        StepKind::Queued,
        StepKind::Acknowledged,
        StepKind::Running,
        StepKind::Completed,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Queued => 0,
            Self::Acknowledged => 1,
            Self::Running => 2,
            Self::Completed => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Acknowledged => "Acknowledged by agent",
            Self::Running => "Scanning network",
            Self::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub status: StepStatus,
}

impl Step {
    pub fn name(&self) -> &'static str {
        self.kind.label()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub steps: Vec<Step>,
    /// Index of the step the command has reached; the failed step for failed commands.
    pub current_index: usize,
    pub active_message: Option<String>,
}

impl Projection {
    /// Steps for a freshly created command that has not been observed yet.
    pub fn initial() -> Self {
        Self {
            steps: steps_for(QUEUED, StepStatus::Active),
            current_index: QUEUED,
            active_message: None,
        }
    }

    pub fn progress_percent(&self) -> u8 {
        progress_percent(self.current_index)
    }

    pub fn failed_step(&self) -> Option<StepKind> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Failed)
            .map(|step| step.kind)
    }
}

pub fn progress_percent(index: usize) -> u8 {
    let index = index.min(TOTAL_STEPS - 1);
    (index * 100 / (TOTAL_STEPS - 1)) as u8
}

pub fn project(command: &Command) -> Projection {
    project_with_floor(command, None)
}

/// Projects `command`, treating `floor` as the highest lifecycle index already observed
/// for it. The floor only matters where the command alone is ambiguous: locating the
/// failed step and degrading unknown statuses. It never raises a position past running.
pub fn project_with_floor(command: &Command, floor: Option<usize>) -> Projection {
    let inferred = if command.started_at.is_some() {
        RUNNING
    } else {
        QUEUED
    };
    let last_observed = floor.map_or(inferred, |floor| inferred.max(floor.min(RUNNING)));

    let (current_index, current_status) = match &command.status {
        CommandStatus::Completed => (COMPLETED, StepStatus::Complete),
        CommandStatus::Failed => (last_observed, StepStatus::Failed),
        status => (
            status.lifecycle_index().unwrap_or(last_observed),
            StepStatus::Active,
        ),
    };

    Projection {
        steps: steps_for(current_index, current_status),
        current_index,
        active_message: active_message(command),
    }
}

fn steps_for(current_index: usize, current_status: StepStatus) -> Vec<Step> {
    StepKind::ALL
        .iter()
        .map(|kind| {
            let status = match kind.index().cmp(&current_index) {
                Ordering::Less => StepStatus::Complete,
                Ordering::Equal => current_status,
                Ordering::Greater => StepStatus::Pending,
            };
            Step {
                kind: *kind,
                status,
            }
        })
        .collect()
}

fn active_message(command: &Command) -> Option<String> {
    if command.status != CommandStatus::Running {
        return None;
    }
    command
        .result
        .as_ref()?
        .step
        .as_deref()
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[path = "tests/projector_tests.rs"]
mod tests;
