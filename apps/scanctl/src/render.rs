use client_core::{Outcome, StepStatus, TrackerView};

/// One-line status for a snapshot that is still in flight.
pub fn progress_line(view: &TrackerView) -> String {
    let current = view
        .steps
        .iter()
        .rev()
        .find(|step| step.status != StepStatus::Pending)
        .or_else(|| view.steps.first());
    let mut line = match current {
        Some(step) => format!("[{:>3}%] {} {}", view.progress_percent, step.marker(), step.label),
        None => format!("[{:>3}%]", view.progress_percent),
    };
    if let Some(message) = &view.message {
        line.push_str(&format!(": {message}"));
    }
    if let Some(elapsed) = &view.elapsed {
        line.push_str(&format!(" ({elapsed})"));
    }
    line
}

pub fn final_report(view: &TrackerView) -> Vec<String> {
    let mut lines = vec![view.headline.clone()];
    lines.extend(
        view.steps
            .iter()
            .map(|step| format!("  {} {}", step.marker(), step.label)),
    );
    if let Some(summary) = &view.summary_line {
        lines.push(format!("  {summary}"));
    }
    lines.extend(view.error_lines.iter().map(|error| format!("  error: {error}")));
    if view.can_view_assets {
        lines.push("  discovered assets are ready to view".to_string());
    }
    lines
}

pub fn exit_status(outcome: Option<Outcome>) -> u8 {
    match outcome {
        Some(Outcome::Completed) | None => 0,
        Some(Outcome::Failed) => 1,
        Some(Outcome::Stalled) => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_core::StepLine;

    fn view(statuses: [StepStatus; 4]) -> TrackerView {
        let labels = [
            "Queued",
            "Acknowledged by agent",
            "Scanning network",
            "Completed",
        ];
        TrackerView {
            headline: "Scan cmd_42 in progress".to_string(),
            steps: labels
                .into_iter()
                .zip(statuses)
                .map(|(label, status)| StepLine { label, status })
                .collect(),
            progress_percent: 66,
            message: Some("Ag taraniyor".to_string()),
            elapsed: Some("1m 5s".to_string()),
            summary_line: None,
            error_lines: Vec::new(),
            can_trigger_scan: false,
            can_dismiss: false,
            can_view_assets: false,
        }
    }

    #[test]
    fn progress_line_names_the_current_step() {
        let running = view([
            StepStatus::Complete,
            StepStatus::Complete,
            StepStatus::Active,
            StepStatus::Pending,
        ]);
        assert_eq!(
            progress_line(&running),
            "[ 66%] [>] Scanning network: Ag taraniyor (1m 5s)"
        );
    }

    #[test]
    fn final_report_lists_summary_and_errors() {
        let mut failed = view([
            StepStatus::Complete,
            StepStatus::Complete,
            StepStatus::Failed,
            StepStatus::Pending,
        ]);
        failed.headline = "Scan cmd_42 failed".to_string();
        failed.summary_line = Some("0 devices / 1 subnets in 12s".to_string());
        failed.error_lines = vec!["invalid target: printer.lan".to_string()];

        let report = final_report(&failed);
        assert_eq!(report[0], "Scan cmd_42 failed");
        assert_eq!(report[3], "  [!] Scanning network");
        assert_eq!(report[5], "  0 devices / 1 subnets in 12s");
        assert_eq!(report[6], "  error: invalid target: printer.lan");
        assert_eq!(report.len(), 7);
    }

    #[test]
    fn exit_status_reflects_outcome() {
        assert_eq!(exit_status(Some(Outcome::Completed)), 0);
        assert_eq!(exit_status(Some(Outcome::Failed)), 1);
        assert_eq!(exit_status(Some(Outcome::Stalled)), 2);
    }
}
