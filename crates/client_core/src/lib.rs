pub mod elapsed;
pub mod error;
pub mod presentation;
pub mod projector;
pub mod repository;
pub mod tracker;

pub use elapsed::{format_elapsed, Clock, ElapsedTimer, SystemClock};
pub use error::TrackerError;
pub use presentation::{Intent, IntentOutcome, StepLine, TrackerView};
pub use projector::{project, project_with_floor, Projection, Step, StepKind, StepStatus};
pub use repository::{CommandRepository, HttpCommandRepository, MissingCommandRepository};
pub use tracker::{
    CommandTracker, CompletionSummary, Outcome, PollOutcome, ResumeOutcome, TrackerOptions,
    TrackerSnapshot,
};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
