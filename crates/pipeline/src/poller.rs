//! Bounded-retry status polling for a single remote job.
//!
//! [`JobPoller`] is single-flight: it follows exactly one job at a time.
//! Each session reads the job immediately, then on a fixed interval,
//! until the job is terminal, the read budget is spent, a read fails,
//! or the session is stopped. Exactly one of the completion handlers
//! fires per session, guarded by [`PollState`]'s one-shot flag. The same
//! outcome is published on a `watch` channel so that later callers of
//! [`JobPoller::wait_for_terminal`] can join a running session.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atelier_core::job::{Job, JobStatus, PollOptions};
use atelier_core::store::JobStore;
use atelier_core::types::RecordId;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::PollError;

/// Shortest interval a session ticks at.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

type Outcome = Option<Result<Job, PollError>>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

type CompleteFn = Arc<dyn Fn(Job) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(PollError) + Send + Sync>;

/// Completion callbacks of a poll session.
///
/// Kept by the poller so that [`JobPoller::retry`] can restart with the
/// same handlers.
#[derive(Clone)]
pub struct PollHandlers {
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

impl PollHandlers {
    pub fn new<C, E>(on_complete: C, on_error: E) -> Self
    where
        C: Fn(Job) + Send + Sync + 'static,
        E: Fn(PollError) + Send + Sync + 'static,
    {
        Self {
            on_complete: Arc::new(on_complete),
            on_error: Arc::new(on_error),
        }
    }
}

// ---------------------------------------------------------------------------
// PollState
// ---------------------------------------------------------------------------

/// Per-session counters, dropped when the session ends.
#[derive(Debug)]
pub struct PollState {
    job_id: RecordId,
    options: PollOptions,
    attempts_used: AtomicU32,
    completed: AtomicBool,
    outcome: watch::Sender<Outcome>,
}

impl PollState {
    fn new(job_id: RecordId, options: PollOptions) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            job_id,
            options: PollOptions::new(
                options.interval.max(MIN_POLL_INTERVAL),
                options.max_attempts,
            ),
            attempts_used: AtomicU32::new(0),
            completed: AtomicBool::new(false),
            outcome,
        }
    }

    pub fn job_id(&self) -> RecordId {
        self.job_id
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Receiver of the session's outcome; `None` until it delivers.
    fn subscribe(&self) -> watch::Receiver<Outcome> {
        self.outcome.subscribe()
    }

    fn record_attempt(&self) -> u32 {
        self.attempts_used.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Claim the session's single completion. Returns `false` if it was
    /// already claimed (by a terminal read or by `stop`).
    fn try_complete(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }
}

/// Fire exactly one handler for the session, at most once.
fn deliver(state: &PollState, handlers: &PollHandlers, outcome: Result<Job, PollError>) {
    if !state.try_complete() {
        tracing::debug!(job_id = %state.job_id, "Poll session already completed, dropping outcome");
        return;
    }
    state.outcome.send_replace(Some(outcome.clone()));
    match outcome {
        Ok(job) => (handlers.on_complete)(job),
        Err(err) => (handlers.on_error)(err),
    }
}

// ---------------------------------------------------------------------------
// JobPoller
// ---------------------------------------------------------------------------

/// A running poll task and its cancellation token.
struct Session {
    state: Arc<PollState>,
    cancel: CancellationToken,
}

impl Session {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// End the session locally. Claims the completion so that a read
    /// already in flight cannot fire a handler afterwards.
    fn halt(&self) {
        self.state.completed.store(true, Ordering::Release);
        self.cancel.cancel();
    }
}

/// What was last passed to `start`, replayed by `retry`.
#[derive(Clone)]
struct PollRequest {
    job_id: RecordId,
    handlers: PollHandlers,
    options: PollOptions,
}

#[derive(Default)]
struct PollerSlots {
    session: Option<Session>,
    last_request: Option<PollRequest>,
}

/// Single-flight status poller.
pub struct JobPoller {
    jobs: Arc<dyn JobStore>,
    slots: Mutex<PollerSlots>,
}

impl JobPoller {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            jobs,
            slots: Mutex::new(PollerSlots::default()),
        }
    }

    /// Start following `job_id`.
    ///
    /// A no-op if that job is already being polled. Any session for a
    /// different job is stopped first.
    pub async fn start(&self, job_id: RecordId, handlers: PollHandlers, options: PollOptions) {
        self.start_session(job_id, handlers, options).await;
    }

    /// Stop local polling. No further reads occur and no handler fires.
    pub async fn stop(&self) {
        let mut slots = self.slots.lock().await;
        if let Some(session) = slots.session.take() {
            session.halt();
            tracing::info!(
                job_id = %session.state.job_id,
                attempts = session.state.attempts_used(),
                "Polling stopped",
            );
        }
    }

    /// Restart the last request with a fresh attempt budget.
    ///
    /// Returns `false` if nothing was ever started.
    pub async fn retry(&self) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(request) = slots.last_request.clone() else {
            return false;
        };
        if let Some(previous) = slots.session.take() {
            previous.halt();
        }
        tracing::info!(job_id = %request.job_id, "Retrying job polling");
        slots.session = Some(self.spawn_session(&request));
        true
    }

    /// Poll `job_id` and wait for the session's outcome.
    ///
    /// Joins the running session if `job_id` is already being polled, in
    /// which case `options` are ignored. Returns [`PollError::Cancelled`]
    /// when the session is stopped (or superseded) before it delivers.
    pub async fn wait_for_terminal(
        &self,
        job_id: RecordId,
        options: PollOptions,
    ) -> Result<Job, PollError> {
        let noop = PollHandlers::new(|_| {}, |_| {});
        let (cancel, mut outcome) = self.start_session(job_id, noop, options).await;

        tokio::select! {
            biased;
            settled = outcome.wait_for(Option::is_some) => settled
                .ok()
                .and_then(|o| (*o).clone())
                .unwrap_or(Err(PollError::Cancelled)),
            _ = cancel.cancelled() => Err(PollError::Cancelled),
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.slots
            .lock()
            .await
            .session
            .as_ref()
            .is_some_and(Session::is_active)
    }

    /// Job followed by the active session.
    pub async fn current_job(&self) -> Option<RecordId> {
        let slots = self.slots.lock().await;
        slots
            .session
            .as_ref()
            .filter(|s| s.is_active())
            .map(|s| s.state.job_id)
    }

    /// Reads performed by the latest session.
    pub async fn attempts_used(&self) -> Option<u32> {
        let slots = self.slots.lock().await;
        slots.session.as_ref().map(|s| s.state.attempts_used())
    }

    // ---- private helpers ----

    /// Start (or join) a session. Returns its cancellation token and a
    /// receiver of its outcome.
    ///
    /// When joining, `handlers` are dropped; the running session keeps the
    /// handlers it was started with.
    async fn start_session(
        &self,
        job_id: RecordId,
        handlers: PollHandlers,
        options: PollOptions,
    ) -> (CancellationToken, watch::Receiver<Outcome>) {
        let mut slots = self.slots.lock().await;

        if let Some(session) = slots.session.as_ref() {
            if session.state.job_id == job_id && session.is_active() {
                tracing::debug!(job_id = %job_id, "Already polling this job");
                return (session.cancel.clone(), session.state.subscribe());
            }
        }

        if let Some(previous) = slots.session.take() {
            tracing::info!(
                previous_job_id = %previous.state.job_id,
                job_id = %job_id,
                "Switching poller to a new job",
            );
            previous.halt();
        }

        let request = PollRequest {
            job_id,
            handlers,
            options,
        };
        let session = self.spawn_session(&request);
        let joined = (session.cancel.clone(), session.state.subscribe());
        slots.session = Some(session);
        slots.last_request = Some(request);
        joined
    }

    fn spawn_session(&self, request: &PollRequest) -> Session {
        let state = Arc::new(PollState::new(request.job_id, request.options));
        let cancel = CancellationToken::new();

        tokio::spawn(run_session(
            Arc::clone(&self.jobs),
            Arc::clone(&state),
            request.handlers.clone(),
            cancel.clone(),
        ));

        Session { state, cancel }
    }
}

/// Session loop: read immediately, then once per interval.
///
/// Each tick runs to completion before the next one is taken. The token
/// is cancelled on exit so the session reads as inactive.
async fn run_session(
    jobs: Arc<dyn JobStore>,
    state: Arc<PollState>,
    handlers: PollHandlers,
    cancel: CancellationToken,
) {
    let job_id = state.job_id;
    let options = state.options;
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status: Option<JobStatus> = None;

    tracing::info!(
        job_id = %job_id,
        interval_ms = options.interval.as_millis() as u64,
        max_attempts = options.max_attempts,
        ceiling_secs = options.ceiling().as_secs(),
        "Polling started",
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let attempt = state.record_attempt();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = jobs.get_job_fresh(job_id) => read,
        };

        if let (Ok(job), Some(previous)) = (&read, last_status) {
            if !previous.can_transition_to(job.status) {
                tracing::warn!(
                    job_id = %job_id,
                    attempt,
                    from = %previous,
                    to = %job.status,
                    "Unexpected job status transition",
                );
            }
        }
        if let Ok(job) = &read {
            last_status = Some(job.status);
        }

        match read {
            Ok(job) if job.status == JobStatus::Succeeded => {
                tracing::info!(job_id = %job_id, attempt, "Job succeeded");
                deliver(&state, &handlers, Ok(job));
                break;
            }
            Ok(job) if job.status == JobStatus::Failed => {
                let message = job.failure_message();
                tracing::warn!(job_id = %job_id, attempt, error = %message, "Job failed");
                deliver(
                    &state,
                    &handlers,
                    Err(PollError::JobFailed {
                        job_id,
                        message,
                        code: job.error_code,
                    }),
                );
                break;
            }
            Ok(job) => {
                tracing::debug!(job_id = %job_id, attempt, status = %job.status, "Job not finished");
                if attempt >= options.max_attempts {
                    tracing::warn!(job_id = %job_id, attempts = attempt, "Polling timed out");
                    deliver(
                        &state,
                        &handlers,
                        Err(PollError::Timeout {
                            job_id,
                            attempts: attempt,
                        }),
                    );
                    break;
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, attempt, error = %e, "Status read failed");
                deliver(
                    &state,
                    &handlers,
                    Err(PollError::Transport {
                        job_id,
                        message: e.to_string(),
                    }),
                );
                break;
            }
        }
    }

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
