use chrono::{DateTime, Duration, Utc};
use shared::domain::Command;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `"Ns"` under a minute, `"Mm Ss"` from a minute on. Negative spans read as zero.
pub fn format_elapsed(span: Duration) -> String {
    let total = span.num_seconds().max(0);
    if total < 60 {
        format!("{total}s")
    } else {
        format!("{}m {}s", total / 60, total % 60)
    }
}

pub fn completion_duration(command: &Command) -> Option<String> {
    let started_at = command.started_at?;
    let completed_at = command.completed_at?;
    Some(format_elapsed(completed_at - started_at))
}

/// Live duration of the tracked command, frozen into a one-shot duration once it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElapsedTimer {
    started_at: Option<DateTime<Utc>>,
    live: Option<String>,
    duration: Option<String>,
}

impl ElapsedTimer {
    pub fn observe(&mut self, command: &Command) {
        if command.started_at.is_some() {
            self.started_at = command.started_at;
        }
    }

    /// Recomputes the live value. Returns whether the formatted string changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.duration.is_some() {
            return false;
        }
        let Some(started_at) = self.started_at else {
            return false;
        };
        let next = Some(format_elapsed(now - started_at));
        if next == self.live {
            return false;
        }
        self.live = next;
        true
    }

    pub fn finish(&mut self, command: &Command) {
        if self.duration.is_none() {
            self.duration = completion_duration(command);
        }
        self.live = None;
    }

    pub fn stop(&mut self) {
        self.live = None;
    }

    pub fn live(&self) -> Option<&str> {
        self.live.as_deref()
    }

    pub fn duration(&self) -> Option<&str> {
        self.duration.as_deref()
    }
}
