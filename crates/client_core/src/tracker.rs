use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use shared::domain::{AgentId, Command, CommandId, CommandStatus, ScanParams};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    elapsed::{Clock, ElapsedTimer, SystemClock},
    error::TrackerError,
    projector::{project_with_floor, Projection, Step},
    repository::CommandRepository,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerOptions {
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    /// A fetch that has not answered by then counts as a transport failure.
    pub request_timeout: Duration,
    /// A command whose observed state has not changed for this long ends as stalled.
    /// `None` waits forever.
    pub stall_timeout: Option<Duration>,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            tick_interval: DEFAULT_TICK_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stall_timeout: Some(DEFAULT_STALL_TIMEOUT),
        }
    }
}

impl TrackerOptions {
    /// Zero periods would panic the timer tasks; they are raised to one millisecond.
    fn normalized(mut self) -> Self {
        self.poll_interval = self.poll_interval.max(MIN_PERIOD);
        self.tick_interval = self.tick_interval.max(MIN_PERIOD);
        self.request_timeout = self.request_timeout.max(MIN_PERIOD);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No session to poll, or the session this poll belonged to is gone.
    Idle,
    /// The session had already finished; nothing was fetched.
    AlreadyDone,
    Applied,
    Unchanged,
    /// The response was superseded, stale, or for another command and was dropped.
    Discarded,
    /// Transport failure or timeout; state untouched until the next tick.
    Retrying,
    Concluded(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed(CommandId),
    AlreadyTracking(CommandId),
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSummary {
    pub assets_discovered: u64,
    pub targets_scanned: u64,
    pub errors: Vec<String>,
    pub duration: Option<String>,
}

impl CompletionSummary {
    pub fn can_view_assets(&self) -> bool {
        self.assets_discovered > 0
    }
}

/// Read-only view of the tracker published to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub tracked_command_id: Option<CommandId>,
    pub active_command: Option<Command>,
    pub steps: Vec<Step>,
    pub progress_percent: u8,
    pub active_step_message: Option<String>,
    pub elapsed: Option<String>,
    pub duration: Option<String>,
    pub outcome: Option<Outcome>,
}

impl TrackerSnapshot {
    pub fn is_tracking(&self) -> bool {
        self.tracked_command_id.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn errors(&self) -> &[String] {
        self.active_command
            .as_ref()
            .map(Command::errors)
            .unwrap_or_default()
    }

    pub fn summary(&self) -> Option<CompletionSummary> {
        if !matches!(self.outcome, Some(Outcome::Completed | Outcome::Failed)) {
            return None;
        }
        let result = self
            .active_command
            .as_ref()
            .and_then(|command| command.result.clone())
            .unwrap_or_default();
        Some(CompletionSummary {
            assets_discovered: result.assets_discovered.unwrap_or(0),
            targets_scanned: result.targets_scanned.unwrap_or(0),
            errors: result.errors,
            duration: self.duration.clone(),
        })
    }
}

struct SessionTimers {
    poll: JoinHandle<()>,
    tick: JoinHandle<()>,
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.poll.abort();
        self.tick.abort();
    }
}

struct TrackerSession {
    command_id: CommandId,
    command: Option<Command>,
    projection: Projection,
    reached_index: usize,
    elapsed: ElapsedTimer,
    outcome: Option<Outcome>,
    issued_polls: u64,
    last_change_at: Instant,
    timers: Option<SessionTimers>,
}

impl TrackerSession {
    fn new(command_id: CommandId) -> Self {
        Self {
            command_id,
            command: None,
            projection: Projection::initial(),
            reached_index: 0,
            elapsed: ElapsedTimer::default(),
            outcome: None,
            issued_polls: 0,
            last_change_at: Instant::now(),
            timers: None,
        }
    }

    fn observe(&mut self, command: Command, stall_timeout: Option<Duration>) -> PollOutcome {
        if command.id != self.command_id {
            warn!(
                expected = %self.command_id,
                received = %command.id,
                "tracker: ignoring response for a different command"
            );
            return PollOutcome::Discarded;
        }
        if self.outcome.is_some() {
            return PollOutcome::AlreadyDone;
        }
        if let Some(index) = command.status.lifecycle_index() {
            if index < self.reached_index {
                debug!(
                    command_id = %self.command_id,
                    status = %command.status,
                    reached_index = self.reached_index,
                    "tracker: ignoring stale status report"
                );
                return match self.check_stall(stall_timeout) {
                    PollOutcome::Unchanged => PollOutcome::Discarded,
                    concluded => concluded,
                };
            }
        }
        if self.command.as_ref() == Some(&command) {
            return self.check_stall(stall_timeout);
        }

        let projection = project_with_floor(&command, Some(self.reached_index));
        self.reached_index = self.reached_index.max(projection.current_index);
        self.last_change_at = Instant::now();
        self.elapsed.observe(&command);
        self.outcome = match command.status {
            CommandStatus::Completed => Some(Outcome::Completed),
            CommandStatus::Failed => Some(Outcome::Failed),
            _ => None,
        };
        if self.outcome.is_some() {
            self.elapsed.finish(&command);
        }
        self.projection = projection;
        self.command = Some(command);

        match self.outcome {
            Some(outcome) => PollOutcome::Concluded(outcome),
            None => PollOutcome::Applied,
        }
    }

    fn check_stall(&mut self, stall_timeout: Option<Duration>) -> PollOutcome {
        match stall_timeout {
            Some(timeout) if self.last_change_at.elapsed() >= timeout => {
                self.outcome = Some(Outcome::Stalled);
                self.elapsed.stop();
                PollOutcome::Concluded(Outcome::Stalled)
            }
            _ => PollOutcome::Unchanged,
        }
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            tracked_command_id: Some(self.command_id.clone()),
            active_command: self.command.clone(),
            steps: self.projection.steps.clone(),
            progress_percent: self.projection.progress_percent(),
            active_step_message: self.projection.active_message.clone(),
            elapsed: self.elapsed.live().map(str::to_string),
            duration: self.elapsed.duration().map(str::to_string),
            outcome: self.outcome,
        }
    }
}

struct TrackerState {
    generation: u64,
    session: Option<TrackerSession>,
}

/// Tracks one remote scan command per agent from dispatch to a terminal state.
pub struct CommandTracker {
    agent_id: AgentId,
    repository: Arc<dyn CommandRepository>,
    clock: Arc<dyn Clock>,
    options: TrackerOptions,
    state: Mutex<TrackerState>,
    /// Set while `dispatch_scan` waits on `create_command`; blocks other sessions.
    dispatching: AtomicBool,
    snapshots: watch::Sender<TrackerSnapshot>,
}

impl CommandTracker {
    pub fn new(agent_id: AgentId, repository: Arc<dyn CommandRepository>) -> Arc<Self> {
        Self::new_with_options(agent_id, repository, TrackerOptions::default())
    }

    pub fn new_with_options(
        agent_id: AgentId,
        repository: Arc<dyn CommandRepository>,
        options: TrackerOptions,
    ) -> Arc<Self> {
        Self::new_with_dependencies(agent_id, repository, Arc::new(SystemClock), options)
    }

    pub fn new_with_dependencies(
        agent_id: AgentId,
        repository: Arc<dyn CommandRepository>,
        clock: Arc<dyn Clock>,
        options: TrackerOptions,
    ) -> Arc<Self> {
        let (snapshots, _) = watch::channel(TrackerSnapshot::default());
        Arc::new(Self {
            agent_id,
            repository,
            clock,
            options: options.normalized(),
            state: Mutex::new(TrackerState {
                generation: 0,
                session: None,
            }),
            dispatching: AtomicBool::new(false),
            snapshots,
        })
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn tracked_command_id(&self) -> Option<CommandId> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|session| session.command_id.clone())
    }

    /// Begins tracking a newly created command: immediate poll, then recurring polls
    /// and the elapsed ticker. Rejected while any session exists, finished or not.
    pub async fn start(self: &Arc<Self>, command_id: CommandId) -> Result<(), TrackerError> {
        let generation = {
            let mut state = self.state.lock().await;
            self.ensure_idle(&state)?;
            self.open_session(&mut state, &command_id)
        };
        self.run_session(generation, &command_id).await;
        Ok(())
    }

    fn ensure_idle(&self, state: &TrackerState) -> Result<(), TrackerError> {
        if let Some(session) = &state.session {
            return Err(TrackerError::AlreadyTracking {
                command_id: session.command_id.clone(),
            });
        }
        if self.dispatching.load(Ordering::SeqCst) {
            return Err(TrackerError::DispatchInProgress);
        }
        Ok(())
    }

    fn open_session(&self, state: &mut TrackerState, command_id: &CommandId) -> u64 {
        state.generation += 1;
        state.session = Some(TrackerSession::new(command_id.clone()));
        self.publish(state);
        info!(agent_id = %self.agent_id, command_id = %command_id, "tracker: session started");
        state.generation
    }

    async fn run_session(self: &Arc<Self>, generation: u64, command_id: &CommandId) {
        let outcome = self.poll_session(Some(generation)).await;
        debug!(command_id = %command_id, ?outcome, "tracker: initial poll");
        self.arm_timers(generation).await;
    }

    /// Picks up the agent's most recent command if it is still in flight, producing the
    /// same session `start` would have built by now. Leaves the tracker idle otherwise.
    pub async fn resume_if_active(self: &Arc<Self>) -> Result<ResumeOutcome, TrackerError> {
        if let Some(command_id) = self.tracked_command_id().await {
            return Ok(ResumeOutcome::AlreadyTracking(command_id));
        }

        let commands = self
            .repository
            .list_commands(&self.agent_id)
            .await
            .map_err(TrackerError::repository("list_commands"))?;
        let Some(latest) = commands.into_iter().next() else {
            debug!(agent_id = %self.agent_id, "tracker: no commands to resume");
            return Ok(ResumeOutcome::Idle);
        };
        if latest.is_terminal() {
            debug!(
                agent_id = %self.agent_id,
                command_id = %latest.id,
                status = %latest.status,
                "tracker: latest command already finished; staying idle"
            );
            return Ok(ResumeOutcome::Idle);
        }

        let command_id = latest.id.clone();
        let generation = {
            let mut state = self.state.lock().await;
            if let Some(session) = &state.session {
                return Ok(ResumeOutcome::AlreadyTracking(session.command_id.clone()));
            }
            if self.dispatching.load(Ordering::SeqCst) {
                return Err(TrackerError::DispatchInProgress);
            }
            state.generation += 1;
            let mut session = TrackerSession::new(command_id.clone());
            session.observe(latest, self.options.stall_timeout);
            state.session = Some(session);
            self.publish(&state);
            state.generation
        };
        info!(agent_id = %self.agent_id, command_id = %command_id, "tracker: session resumed");

        self.arm_timers(generation).await;
        Ok(ResumeOutcome::Resumed(command_id))
    }

    /// Fetches the tracked command once and applies it. Transport failures leave state
    /// untouched; responses superseded by a later poll are dropped.
    pub async fn poll(&self) -> PollOutcome {
        self.poll_session(None).await
    }

    /// Clears a finished session so a new scan can be started. Never contacts the
    /// repository. Both session timers are stopped before this returns.
    pub async fn dismiss(&self) -> Result<(), TrackerError> {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.as_ref() else {
            return Ok(());
        };
        if session.outcome.is_none() {
            return Err(TrackerError::StillInFlight {
                command_id: session.command_id.clone(),
            });
        }

        let session = state.session.take();
        state.generation += 1;
        if let Some(session) = session {
            info!(
                agent_id = %self.agent_id,
                command_id = %session.command_id,
                "tracker: session dismissed"
            );
        }
        self.publish(&state);
        Ok(())
    }

    /// Creates a scan command for this agent and starts tracking it. The tracker is
    /// reserved before the command is created, so a concurrent `start` or resume
    /// cannot leave the new command untracked.
    pub async fn dispatch_scan(
        self: &Arc<Self>,
        params: ScanParams,
    ) -> Result<CommandId, TrackerError> {
        if params.targets.is_empty() {
            return Err(TrackerError::EmptyScan);
        }
        let reservation = {
            let state = self.state.lock().await;
            self.ensure_idle(&state)?;
            self.dispatching.store(true, Ordering::SeqCst);
            DispatchReservation(&self.dispatching)
        };

        let command_id = self
            .repository
            .create_command(&self.agent_id, &params)
            .await
            .map_err(TrackerError::repository("create_command"))?;
        info!(
            agent_id = %self.agent_id,
            command_id = %command_id,
            targets = params.targets.len(),
            shield = params.shield,
            "tracker: scan command created"
        );
        let generation = {
            let mut state = self.state.lock().await;
            let generation = self.open_session(&mut state, &command_id);
            drop(reservation);
            generation
        };
        self.run_session(generation, &command_id).await;
        Ok(command_id)
    }

    async fn poll_session(&self, expected_generation: Option<u64>) -> PollOutcome {
        let (generation, sequence, command_id) = {
            let mut state = self.state.lock().await;
            let generation = state.generation;
            if expected_generation.is_some_and(|expected| expected != generation) {
                return PollOutcome::Idle;
            }
            let Some(session) = state.session.as_mut() else {
                return PollOutcome::Idle;
            };
            if session.outcome.is_some() {
                return PollOutcome::AlreadyDone;
            }
            session.issued_polls += 1;
            (generation, session.issued_polls, session.command_id.clone())
        };

        let fetched = tokio::time::timeout(
            self.options.request_timeout,
            self.repository.get_command(&self.agent_id, &command_id),
        )
        .await
        .unwrap_or_else(|_| {
            Err(anyhow::anyhow!(
                "no response within {:?}",
                self.options.request_timeout
            ))
        });

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(command_id = %command_id, "tracker: dropping poll response for ended session");
            return PollOutcome::Idle;
        }
        let outcome = {
            let Some(session) = state.session.as_mut() else {
                return PollOutcome::Idle;
            };
            if sequence != session.issued_polls {
                debug!(
                    command_id = %command_id,
                    sequence,
                    latest = session.issued_polls,
                    "tracker: dropping superseded poll response"
                );
                return PollOutcome::Discarded;
            }
            match fetched {
                Ok(command) => session.observe(command, self.options.stall_timeout),
                Err(err) => {
                    warn!(
                        agent_id = %self.agent_id,
                        command_id = %command_id,
                        "tracker: poll failed; retrying on next tick: {err:#}"
                    );
                    match session.check_stall(self.options.stall_timeout) {
                        PollOutcome::Unchanged => PollOutcome::Retrying,
                        concluded => concluded,
                    }
                }
            }
        };

        match outcome {
            PollOutcome::Applied => self.publish(&state),
            PollOutcome::Concluded(result) => {
                if let Some(session) = state.session.as_mut() {
                    session.timers.take();
                }
                info!(
                    agent_id = %self.agent_id,
                    command_id = %command_id,
                    outcome = ?result,
                    "tracker: command tracking concluded"
                );
                self.publish(&state);
            }
            _ => {}
        }
        outcome
    }

    async fn refresh_elapsed(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return false;
        }
        let now = self.clock.now();
        let changed = match state.session.as_mut() {
            Some(session) if session.outcome.is_none() => session.elapsed.tick(now),
            _ => false,
        };
        if changed {
            self.publish(&state);
        }
        changed
    }

    async fn arm_timers(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return;
        }
        let Some(session) = state.session.as_mut() else {
            return;
        };
        if session.outcome.is_some() || session.timers.is_some() {
            return;
        }
        let tracker = Arc::downgrade(self);
        session.timers = Some(SessionTimers {
            poll: tokio::spawn(poll_loop(
                tracker.clone(),
                generation,
                self.options.poll_interval,
            )),
            tick: tokio::spawn(tick_loop(tracker, generation, self.options.tick_interval)),
        });
    }

    fn publish(&self, state: &TrackerState) {
        let next = state
            .session
            .as_ref()
            .map(TrackerSession::snapshot)
            .unwrap_or_default();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Clears the dispatch flag when creation finishes, fails, or is cancelled.
struct DispatchReservation<'a>(&'a AtomicBool);

impl Drop for DispatchReservation<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn poll_loop(tracker: Weak<CommandTracker>, generation: u64, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(tracker) = tracker.upgrade() else {
            break;
        };
        match tracker.poll_session(Some(generation)).await {
            PollOutcome::Idle | PollOutcome::AlreadyDone | PollOutcome::Concluded(_) => break,
            _ => {}
        }
    }
}

async fn tick_loop(tracker: Weak<CommandTracker>, generation: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(tracker) = tracker.upgrade() else {
            break;
        };
        tracker.refresh_elapsed(generation).await;
    }
}

#[cfg(test)]
#[path = "tests/tracker_tests.rs"]
mod tests;
