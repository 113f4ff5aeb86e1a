//! Contract between the tracker and whatever renders it: user intents in, a
//! render-ready view out. Renderers never touch tracker state directly.

use std::sync::Arc;

use shared::domain::{CommandId, ScanParams};
use tracing::debug;

use crate::{
    error::TrackerError,
    projector::StepStatus,
    tracker::{CommandTracker, Outcome, ResumeOutcome, TrackerSnapshot},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    TriggerScan(ScanParams),
    Resume,
    Dismiss,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TriggerScan(_) => "trigger_scan",
            Self::Resume => "resume",
            Self::Dismiss => "dismiss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    ScanStarted(CommandId),
    Resume(ResumeOutcome),
    Dismissed,
}

impl CommandTracker {
    pub async fn handle_intent(
        self: &Arc<Self>,
        intent: Intent,
    ) -> Result<IntentOutcome, TrackerError> {
        debug!(intent = intent.name(), agent_id = %self.agent_id(), "tracker: handling intent");
        match intent {
            Intent::TriggerScan(params) => self
                .dispatch_scan(params)
                .await
                .map(IntentOutcome::ScanStarted),
            Intent::Resume => self.resume_if_active().await.map(IntentOutcome::Resume),
            Intent::Dismiss => self.dismiss().await.map(|()| IntentOutcome::Dismissed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLine {
    pub label: &'static str,
    pub status: StepStatus,
}

impl StepLine {
    pub fn marker(&self) -> &'static str {
        match self.status {
            StepStatus::Pending => "[ ]",
            StepStatus::Active => "[>]",
            StepStatus::Complete => "[x]",
            StepStatus::Failed => "[!]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerView {
    pub headline: String,
    pub steps: Vec<StepLine>,
    pub progress_percent: u8,
    pub message: Option<String>,
    pub elapsed: Option<String>,
    pub summary_line: Option<String>,
    pub error_lines: Vec<String>,
    pub can_trigger_scan: bool,
    pub can_dismiss: bool,
    pub can_view_assets: bool,
}

impl From<&TrackerSnapshot> for TrackerView {
    fn from(snapshot: &TrackerSnapshot) -> Self {
        let headline = match (&snapshot.tracked_command_id, snapshot.outcome) {
            (None, _) => "No scan in progress".to_string(),
            (Some(id), None) => format!("Scan {id} in progress"),
            (Some(id), Some(Outcome::Completed)) => format!("Scan {id} completed"),
            (Some(id), Some(Outcome::Failed)) => format!("Scan {id} failed"),
            (Some(id), Some(Outcome::Stalled)) => {
                format!("Scan {id} stopped reporting progress")
            }
        };
        let summary = snapshot.summary();
        let summary_line = summary.as_ref().map(|summary| {
            let mut line = format!(
                "{} devices / {} subnets",
                summary.assets_discovered, summary.targets_scanned
            );
            if let Some(duration) = &summary.duration {
                line.push_str(&format!(" in {duration}"));
            }
            line
        });

        Self {
            headline,
            steps: snapshot
                .steps
                .iter()
                .map(|step| StepLine {
                    label: step.name(),
                    status: step.status,
                })
                .collect(),
            progress_percent: snapshot.progress_percent,
            message: snapshot.active_step_message.clone(),
            elapsed: snapshot.elapsed.clone(),
            summary_line,
            error_lines: snapshot.errors().to_vec(),
            can_trigger_scan: !snapshot.is_tracking(),
            can_dismiss: snapshot.is_done(),
            can_view_assets: summary
                .as_ref()
                .is_some_and(|summary| summary.can_view_assets()),
        }
    }
}
