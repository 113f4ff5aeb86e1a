use super::*;
use chrono::{TimeZone, Utc};
use shared::domain::{CommandId, CommandResult, ScanParams};

fn command(status: CommandStatus) -> Command {
    let created_at = Utc
        .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("timestamp");
    Command {
        id: CommandId::from("cmd_42"),
        status,
        params: ScanParams::new(["192.168.1.0/24", "10.0.0.0/24"], false),
        created_at,
        started_at: None,
        completed_at: None,
        result: None,
    }
}

fn started(mut command: Command) -> Command {
    command.started_at = Some(command.created_at + chrono::Duration::seconds(3));
    command
}

fn statuses(projection: &Projection) -> Vec<StepStatus> {
    projection.steps.iter().map(|step| step.status).collect()
}

#[test]
fn pending_marks_first_step_active() {
    let projection = project(&command(CommandStatus::Pending));
    assert_eq!(
        statuses(&projection),
        vec![
            StepStatus::Active,
            StepStatus::Pending,
            StepStatus::Pending,
            StepStatus::Pending
        ]
    );
    assert_eq!(projection.progress_percent(), 0);
    assert_eq!(projection.active_message, None);
}

#[test]
fn running_completes_earlier_steps_and_exposes_message() {
    let mut running = started(command(CommandStatus::Running));
    running.result = Some(CommandResult {
        step: Some("Ag taraniyor".to_string()),
        ..CommandResult::default()
    });

    let projection = project(&running);
    assert_eq!(
        statuses(&projection),
        vec![
            StepStatus::Complete,
            StepStatus::Complete,
            StepStatus::Active,
            StepStatus::Pending
        ]
    );
    assert_eq!(projection.progress_percent(), 66);
    assert_eq!(projection.active_message.as_deref(), Some("Ag taraniyor"));
}

#[test]
fn completed_marks_every_step_complete() {
    let projection = project(&started(command(CommandStatus::Completed)));
    assert!(projection
        .steps
        .iter()
        .all(|step| step.status == StepStatus::Complete));
    assert_eq!(projection.progress_percent(), 100);
}

#[test]
fn progress_is_monotonic_along_the_lifecycle() {
    let mut last = 0;
    for status in [
        CommandStatus::Pending,
        CommandStatus::Ack,
        CommandStatus::Running,
        CommandStatus::Completed,
    ] {
        let is_completed = status == CommandStatus::Completed;
        let percent = project(&command(status)).progress_percent();
        assert!(percent >= last);
        assert_eq!(percent == 100, is_completed);
        last = percent;
    }
}

#[test]
fn failure_after_running_marks_running_step_failed() {
    let mut failed = started(command(CommandStatus::Failed));
    failed.result = Some(CommandResult {
        errors: vec!["agent lost connectivity".to_string()],
        ..CommandResult::default()
    });

    let projection = project(&failed);
    assert_eq!(
        statuses(&projection),
        vec![
            StepStatus::Complete,
            StepStatus::Complete,
            StepStatus::Failed,
            StepStatus::Pending
        ]
    );
    assert_eq!(projection.failed_step(), Some(StepKind::Running));
    assert_eq!(projection.progress_percent(), 66);
    assert_eq!(projection.active_message, None);
}

#[test]
fn failure_before_start_uses_observed_floor() {
    let failed = command(CommandStatus::Failed);
    assert_eq!(project(&failed).failed_step(), Some(StepKind::Queued));

    let projection = project_with_floor(&failed, Some(1));
    assert_eq!(projection.failed_step(), Some(StepKind::Acknowledged));
    assert_eq!(
        statuses(&projection),
        vec![
            StepStatus::Complete,
            StepStatus::Failed,
            StepStatus::Pending,
            StepStatus::Pending
        ]
    );
}

#[test]
fn failure_never_lands_on_the_completed_step() {
    let projection = project_with_floor(&command(CommandStatus::Failed), Some(3));
    assert_eq!(projection.failed_step(), Some(StepKind::Running));
    assert_ne!(projection.progress_percent(), 100);
}

#[test]
fn unknown_status_degrades_to_nearest_lower_step() {
    let unknown = command(CommandStatus::Unknown("verifying".to_string()));
    assert_eq!(project(&unknown).current_index, 0);
    assert_eq!(project_with_floor(&unknown, Some(1)).current_index, 1);

    let unknown_started = started(unknown);
    let projection = project(&unknown_started);
    assert_eq!(projection.current_index, 2);
    assert_eq!(projection.steps[2].status, StepStatus::Active);
    assert_eq!(projection.steps[3].status, StepStatus::Pending);
}

#[test]
fn message_requires_running_and_non_blank_step() {
    let mut ack = command(CommandStatus::Ack);
    ack.result = Some(CommandResult {
        step: Some("warming up".to_string()),
        ..CommandResult::default()
    });
    assert_eq!(project(&ack).active_message, None);

    let mut running = started(command(CommandStatus::Running));
    running.result = Some(CommandResult {
        step: Some("   ".to_string()),
        ..CommandResult::default()
    });
    assert_eq!(project(&running).active_message, None);

    running.result = None;
    assert_eq!(project(&running).active_message, None);
}

#[test]
fn at_most_one_step_is_active() {
    for status in [
        CommandStatus::Pending,
        CommandStatus::Ack,
        CommandStatus::Running,
        CommandStatus::Completed,
        CommandStatus::Failed,
        CommandStatus::Unknown("x".to_string()),
    ] {
        let projection = project(&started(command(status)));
        let active = projection
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::Active)
            .count();
        assert!(active <= 1);
        assert_eq!(projection.steps.len(), TOTAL_STEPS);
    }
}
