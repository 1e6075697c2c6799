use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use exam_core::answers::SheetProgress;
use exam_core::model::{AttemptId, AttemptStatus, ExamResult};
use exam_core::navigation::PaletteGroup;
use exam_core::{Clock, ExamSession, QuestionStatus, SessionStateError, TimerEngine, TimerTick};
use storage::repository::AnswerDraft;

use crate::api::ExamApi;
use crate::error::ExamError;
use crate::retry::RetryPolicy;

use super::drafts::DraftStore;
use super::phase::{PhaseGuard, SessionPhase};
use super::submission::{SubmissionCoordinator, SubmissionStatus, SubmitTrigger};
use super::timer::TimerHandle;
use super::{SharedSession, lock_session};

/// Server clocks further apart than this are compensated for.
const SKEW_TOLERANCE_MS: i64 = 2_000;
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

struct ActiveAttempt {
    session: SharedSession,
    coordinator: Arc<SubmissionCoordinator>,
    clock: Clock,
    timer: Option<TimerHandle>,
}

/// Facade over one exam session at a time: loading, starting, answering, navigating
/// and submitting an attempt.
///
/// Loading another attempt replaces the active one. Its timer stops at once; a
/// submission it had in flight still runs to completion.
pub struct ExamSessionService {
    api: Arc<dyn ExamApi>,
    clock: Clock,
    drafts: Option<DraftStore>,
    tick_interval: Duration,
    auto_submit: RetryPolicy,
    phase: Arc<watch::Sender<SessionPhase>>,
    ticks: Arc<watch::Sender<Option<TimerTick>>>,
    active: Mutex<Option<ActiveAttempt>>,
}

impl ExamSessionService {
    #[must_use]
    pub fn new(api: Arc<dyn ExamApi>, clock: Clock) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        let (ticks, _) = watch::channel(None);
        Self {
            api,
            clock,
            drafts: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            auto_submit: RetryPolicy::default(),
            phase: Arc::new(phase),
            ticks: Arc::new(ticks),
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_drafts(mut self, drafts: DraftStore) -> Self {
        self.drafts = Some(drafts);
        self
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(MIN_TICK_INTERVAL);
        self
    }

    #[must_use]
    pub fn with_auto_submit_policy(mut self, policy: RetryPolicy) -> Self {
        self.auto_submit = policy;
        self
    }

    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Latest timer reading of the active attempt; `None` while no timer runs.
    #[must_use]
    pub fn subscribe_ticks(&self) -> watch::Receiver<Option<TimerTick>> {
        self.ticks.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Fetch an attempt and make it the active one.
    ///
    /// An ongoing attempt resumes with its timer and any saved draft; a completed
    /// one is read-only.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Forbidden` as reported by the exam service; the previously active
    /// attempt is kept in that case.
    pub async fn load(&self, id: &AttemptId) -> Result<AttemptStatus, ExamError> {
        let _phase = PhaseGuard::enter(&self.phase, SessionPhase::LoadingExam);
        let reply = self
            .api
            .fetch_attempt(id)
            .await
            .inspect_err(|err| warn!(attempt_id = %id, error = %err, "failed to load attempt"))?;

        let clock = reply
            .server_time
            .map_or(self.clock, |server_now| self.skew_adjusted(server_now));
        let attempt = reply.value;
        let attempt_id = attempt.id().clone();
        let status = attempt.status();
        let session: SharedSession = Arc::new(Mutex::new(ExamSession::new(attempt)));

        if let Some(drafts) = &self.drafts {
            match status {
                AttemptStatus::Ongoing => {
                    drafts.restore(&attempt_id, &session).await;
                }
                AttemptStatus::Completed => drafts.discard(&attempt_id).await,
                AttemptStatus::Created => {}
            }
        }

        let coordinator = Arc::new(SubmissionCoordinator::new(
            Arc::clone(&session),
            Arc::clone(&self.api),
            Arc::clone(&self.phase),
            self.auto_submit.clone(),
            self.drafts.clone(),
        ));
        self.install(ActiveAttempt {
            session,
            coordinator,
            clock,
            timer: None,
        });

        info!(%attempt_id, %status, "attempt loaded");
        Ok(status)
    }

    /// Start the loaded attempt and begin the countdown from the server's start time.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the attempt is `Created`; service errors otherwise.
    pub async fn start(&self) -> Result<DateTime<Utc>, ExamError> {
        let session = self.active_session()?;
        let attempt_id = {
            let guard = lock_session(&session);
            let from = guard.status();
            if from != AttemptStatus::Created {
                return Err(SessionStateError::InvalidTransition {
                    from,
                    to: AttemptStatus::Ongoing,
                }
                .into());
            }
            guard.id().clone()
        };

        let _phase = PhaseGuard::enter(&self.phase, SessionPhase::Starting);
        let reply = self
            .api
            .start_attempt(&attempt_id)
            .await
            .inspect_err(|err| warn!(%attempt_id, error = %err, "failed to start attempt"))?;

        let (started_at, server_time) = match reply.value {
            Some(started_at) => (started_at, reply.server_time),
            None => {
                debug!(%attempt_id, "start time not echoed, re-fetching attempt");
                let refreshed = self.api.fetch_attempt(&attempt_id).await?;
                let started_at = refreshed.value.started_at().ok_or_else(|| {
                    ExamError::Rejected("exam service did not report a start time".into())
                })?;
                (started_at, refreshed.server_time.or(reply.server_time))
            }
        };

        lock_session(&session).transition_to_ongoing(started_at)?;

        {
            let mut slot = self.lock_active();
            if let Some(active) = slot
                .as_mut()
                .filter(|active| Arc::ptr_eq(&active.session, &session))
            {
                if let Some(server_now) = server_time {
                    active.clock = self.skew_adjusted(server_now);
                }
                active.timer = self.spawn_timer(active);
            }
        }

        info!(%attempt_id, %started_at, "attempt started");
        Ok(started_at)
    }

    /// Submit the current answers, or wait for the submission already in flight.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the attempt is ongoing; `Transient` failures may be
    /// retried by calling again; `Rejected` is final.
    pub async fn submit(&self) -> Result<ExamResult, ExamError> {
        let coordinator = self.active_coordinator()?;
        coordinator.submit(SubmitTrigger::Manual).await
    }

    /// Scored result of the active attempt.
    ///
    /// # Errors
    ///
    /// Service errors when the result has to be fetched.
    pub async fn fetch_result(&self) -> Result<ExamResult, ExamError> {
        let coordinator = self.active_coordinator()?;
        if let Some(result) = coordinator.result() {
            return Ok(result);
        }
        self.api.fetch_result(coordinator.attempt_id()).await
    }

    /// Tear down the active attempt. No tick is published afterwards.
    pub fn close(&self) {
        let previous = self.lock_active().take();
        if let Some(previous) = previous {
            info!(attempt_id = %previous.coordinator.attempt_id(), "session closed");
            drop(previous);
        }
        self.ticks.send_replace(None);
    }

    //
    // ─── ANSWERS & NAVIGATION ──────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// `InvalidState` unless ongoing and both indices are in range.
    pub async fn select_answer(&self, index: usize, option: usize) -> Result<(), ExamError> {
        self.mutate(|session| session.set_answer(index, option))
            .await
    }

    /// Returns the option that was selected, if any.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless ongoing and the index is in range.
    pub async fn clear_answer(&self, index: usize) -> Result<Option<usize>, ExamError> {
        self.mutate(|session| session.clear_answer(index)).await
    }

    /// Returns whether the question is now marked.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless ongoing and the index is in range.
    pub async fn toggle_review(&self, index: usize) -> Result<bool, ExamError> {
        self.mutate(|session| session.toggle_review(index)).await
    }

    /// # Errors
    ///
    /// `InvalidState` unless ongoing and the index is in range.
    pub async fn go_to(&self, index: usize) -> Result<(), ExamError> {
        self.mutate(|session| session.go_to(index)).await
    }

    /// Returns `false` at the last question.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless ongoing.
    pub async fn next(&self) -> Result<bool, ExamError> {
        self.mutate(ExamSession::next).await
    }

    /// Returns `false` at the first question.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless ongoing.
    pub async fn previous(&self) -> Result<bool, ExamError> {
        self.mutate(ExamSession::previous).await
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// `InvalidState` when nothing is loaded.
    pub fn status(&self) -> Result<AttemptStatus, ExamError> {
        self.read(|session| Ok(session.status()))
    }

    /// Run `f` against the active session, e.g. to render question text.
    ///
    /// # Errors
    ///
    /// `InvalidState` when nothing is loaded.
    pub fn with_session<R>(&self, f: impl FnOnce(&ExamSession) -> R) -> Result<R, ExamError> {
        self.read(|session| Ok(f(session)))
    }

    /// # Errors
    ///
    /// `InvalidState` unless ongoing.
    pub fn current(&self) -> Result<usize, ExamError> {
        self.read(|session| {
            session
                .sheet()
                .map(|sheet| sheet.current())
                .ok_or(SessionStateError::NotOngoing {
                    status: session.status(),
                })
        })
    }

    /// # Errors
    ///
    /// `InvalidState` unless ongoing and the index is in range.
    pub fn status_of(&self, index: usize) -> Result<QuestionStatus, ExamError> {
        self.read(|session| session.status_of(index))
    }

    /// # Errors
    ///
    /// `InvalidState` unless ongoing.
    pub fn palette(&self) -> Result<Vec<PaletteGroup>, ExamError> {
        self.read(ExamSession::palette)
    }

    /// Counts for the submit confirmation.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless ongoing.
    pub fn progress(&self) -> Result<SheetProgress, ExamError> {
        self.read(ExamSession::progress)
    }

    /// Seconds left, recomputed from the start time; `None` before the attempt starts.
    ///
    /// # Errors
    ///
    /// `InvalidState` when nothing is loaded.
    pub fn remaining_seconds(&self) -> Result<Option<u32>, ExamError> {
        let (countdown, clock) = {
            let slot = self.lock_active();
            let active = slot.as_ref().ok_or(SessionStateError::NotLoaded)?;
            (lock_session(&active.session).countdown(), active.clock)
        };
        Ok(countdown.map(|countdown| countdown.remaining_seconds(clock.now())))
    }

    /// # Errors
    ///
    /// `InvalidState` when nothing is loaded.
    pub fn submission_status(&self) -> Result<SubmissionStatus, ExamError> {
        Ok(self.active_coordinator()?.status())
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn install(&self, mut active: ActiveAttempt) {
        let mut slot = self.lock_active();
        if let Some(previous) = slot.take() {
            debug!(attempt_id = %previous.coordinator.attempt_id(), "replacing active attempt");
            drop(previous);
        }
        self.ticks.send_replace(None);
        active.timer = self.spawn_timer(&active);
        *slot = Some(active);
    }

    fn spawn_timer(&self, active: &ActiveAttempt) -> Option<TimerHandle> {
        let countdown = {
            let session = lock_session(&active.session);
            if session.status() != AttemptStatus::Ongoing {
                return None;
            }
            session.countdown()?
        };
        Some(TimerHandle::spawn(
            TimerEngine::new(countdown),
            Arc::clone(&active.session),
            Arc::clone(&active.coordinator),
            active.clock,
            self.tick_interval,
            Arc::clone(&self.ticks),
        ))
    }

    fn skew_adjusted(&self, server_now: DateTime<Utc>) -> Clock {
        let offset = server_now - self.clock.now();
        if offset.num_milliseconds().abs() > SKEW_TOLERANCE_MS {
            info!(offset_ms = offset.num_milliseconds(), "compensating for server clock skew");
            self.clock.with_offset(offset)
        } else {
            self.clock
        }
    }

    async fn mutate<R>(
        &self,
        op: impl FnOnce(&mut ExamSession) -> Result<R, SessionStateError>,
    ) -> Result<R, ExamError> {
        let (session, coordinator) = {
            let slot = self.lock_active();
            let active = slot.as_ref().ok_or(SessionStateError::NotLoaded)?;
            (Arc::clone(&active.session), Arc::clone(&active.coordinator))
        };
        let (value, draft) = {
            let mut guard = lock_session(&session);
            let value = op(&mut *guard)?;
            let draft = match (&self.drafts, guard.sheet()) {
                (Some(_), Some(sheet)) => Some(AnswerDraft::from_sheet(
                    guard.id().clone(),
                    sheet,
                    self.clock.now(),
                )),
                _ => None,
            };
            (value, draft)
        };

        if let Some(draft) = draft {
            coordinator.save_draft(&draft).await;
        }
        Ok(value)
    }

    fn read<R>(
        &self,
        op: impl FnOnce(&ExamSession) -> Result<R, SessionStateError>,
    ) -> Result<R, ExamError> {
        let session = self.active_session()?;
        let guard = lock_session(&session);
        Ok(op(&*guard)?)
    }

    fn active_session(&self) -> Result<SharedSession, ExamError> {
        let slot = self.lock_active();
        let active = slot.as_ref().ok_or(SessionStateError::NotLoaded)?;
        Ok(Arc::clone(&active.session))
    }

    fn active_coordinator(&self) -> Result<Arc<SubmissionCoordinator>, ExamError> {
        let slot = self.lock_active();
        let active = slot.as_ref().ok_or(SessionStateError::NotLoaded)?;
        Ok(Arc::clone(&active.coordinator))
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveAttempt>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
