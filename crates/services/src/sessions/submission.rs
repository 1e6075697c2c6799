use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use exam_core::AnswerSnapshot;
use exam_core::model::{AttemptId, ExamResult};
use storage::repository::AnswerDraft;

use crate::api::ExamApi;
use crate::error::ExamError;
use crate::retry::{RetryPolicy, retry_transient};

use super::drafts::DraftStore;
use super::phase::{self, SessionPhase};
use super::{SharedSession, lock_session};

/// What asked for the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Auto,
}

/// Observable state of the one-submission-in-flight guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    Submitting,
    Submitted,
    Refused,
}

type Outcome = Option<Result<ExamResult, ExamError>>;

enum SubmissionState {
    Idle,
    Submitting {
        trigger: SubmitTrigger,
        outcome: watch::Receiver<Outcome>,
    },
    Submitted(ExamResult),
    Refused(ExamError),
}

enum Begin {
    Settled(Result<ExamResult, ExamError>),
    Pending {
        outcome: watch::Receiver<Outcome>,
        joined: Option<SubmitTrigger>,
    },
}

//
// ─── COORDINATOR ───────────────────────────────────────────────────────────────
//

/// Turns the answers of one attempt into exactly one accepted submission.
///
/// Concurrent callers share the in-flight request and its outcome. The request runs on
/// its own task, so dropping a caller never cancels it.
pub(crate) struct SubmissionCoordinator {
    attempt_id: AttemptId,
    api: Arc<dyn ExamApi>,
    session: SharedSession,
    drafts: Option<DraftStore>,
    /// Set once the attempt completed; draft writes and the final discard serialize on it.
    drafts_closed: tokio::sync::Mutex<bool>,
    auto_policy: RetryPolicy,
    state: Mutex<SubmissionState>,
    halt: watch::Sender<bool>,
    phase: Arc<watch::Sender<SessionPhase>>,
}

impl SubmissionCoordinator {
    pub(crate) fn new(
        session: SharedSession,
        api: Arc<dyn ExamApi>,
        phase: Arc<watch::Sender<SessionPhase>>,
        auto_policy: RetryPolicy,
        drafts: Option<DraftStore>,
    ) -> Self {
        let attempt_id = lock_session(&session).id().clone();
        let (halt, _) = watch::channel(false);
        Self {
            attempt_id,
            api,
            session,
            drafts,
            drafts_closed: tokio::sync::Mutex::new(false),
            auto_policy,
            state: Mutex::new(SubmissionState::Idle),
            halt,
            phase,
        }
    }

    pub(crate) fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    /// Flips to `true` once a terminal outcome is reached.
    pub(crate) fn subscribe_halt(&self) -> watch::Receiver<bool> {
        self.halt.subscribe()
    }

    pub(crate) fn status(&self) -> SubmissionStatus {
        match &*self.lock_state() {
            SubmissionState::Idle => SubmissionStatus::Idle,
            SubmissionState::Submitting { .. } => SubmissionStatus::Submitting,
            SubmissionState::Submitted(_) => SubmissionStatus::Submitted,
            SubmissionState::Refused(_) => SubmissionStatus::Refused,
        }
    }

    pub(crate) fn result(&self) -> Option<ExamResult> {
        match &*self.lock_state() {
            SubmissionState::Submitted(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Persist a draft unless the attempt has already been completed.
    pub(crate) async fn save_draft(&self, draft: &AnswerDraft) {
        let Some(drafts) = &self.drafts else {
            return;
        };
        let closed = self.drafts_closed.lock().await;
        if *closed {
            debug!(attempt_id = %self.attempt_id, "attempt completed, draft not saved");
            return;
        }
        drafts.save(draft).await;
    }

    async fn close_drafts(&self) {
        let Some(drafts) = &self.drafts else {
            return;
        };
        let mut closed = self.drafts_closed.lock().await;
        *closed = true;
        drafts.discard(&self.attempt_id).await;
    }

    /// Submit the current answers, or join the submission already in flight.
    ///
    /// Manual submissions make a single attempt. Automatic ones retry transient
    /// failures under the configured policy, and take over when the manual request
    /// they joined fails transiently.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the attempt is not ongoing, otherwise the classified
    /// failure of the submission.
    pub(crate) async fn submit(
        self: &Arc<Self>,
        trigger: SubmitTrigger,
    ) -> Result<ExamResult, ExamError> {
        loop {
            let (mut outcome, joined) = match self.begin(trigger)? {
                Begin::Settled(result) => return result,
                Begin::Pending { outcome, joined } => (outcome, joined),
            };

            let settled = outcome
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|value| value.clone());
            let Some(result) = settled else {
                self.abandon_stale();
                return Err(ExamError::Transient(
                    "submission ended without an outcome".into(),
                ));
            };

            match result {
                Err(err)
                    if err.is_transient()
                        && trigger == SubmitTrigger::Auto
                        && joined == Some(SubmitTrigger::Manual) =>
                {
                    debug!(attempt_id = %self.attempt_id, "joined manual submission failed, retrying automatically");
                }
                other => return other,
            }
        }
    }

    fn begin(self: &Arc<Self>, trigger: SubmitTrigger) -> Result<Begin, ExamError> {
        let mut state = self.lock_state();
        match &*state {
            SubmissionState::Submitted(result) => return Ok(Begin::Settled(Ok(result.clone()))),
            SubmissionState::Refused(err) => return Ok(Begin::Settled(Err(err.clone()))),
            SubmissionState::Submitting {
                trigger: running,
                outcome,
            } => {
                debug!(attempt_id = %self.attempt_id, ?trigger, running = ?running, "joining in-flight submission");
                return Ok(Begin::Pending {
                    outcome: outcome.clone(),
                    joined: Some(*running),
                });
            }
            SubmissionState::Idle => {}
        }

        let answers = lock_session(&self.session).snapshot()?;
        let (tx, rx) = watch::channel(None);
        *state = SubmissionState::Submitting {
            trigger,
            outcome: rx.clone(),
        };
        drop(state);

        self.phase.send_replace(SessionPhase::Submitting);
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run(trigger, answers, tx).await });

        Ok(Begin::Pending {
            outcome: rx,
            joined: None,
        })
    }

    async fn run(
        self: Arc<Self>,
        trigger: SubmitTrigger,
        answers: AnswerSnapshot,
        outcome: watch::Sender<Outcome>,
    ) {
        let policy = match trigger {
            SubmitTrigger::Manual => RetryPolicy::single(),
            SubmitTrigger::Auto => self.auto_policy.clone(),
        };
        info!(attempt_id = %self.attempt_id, ?trigger, answered = answers.len(), "submitting answers");

        let result = retry_transient(&policy, |attempt| {
            debug!(attempt_id = %self.attempt_id, attempt, "sending submission");
            self.api.submit_answers(&self.attempt_id, &answers)
        })
        .await;

        let result = self.settle(result).await;
        outcome.send_replace(Some(result));
    }

    async fn settle(
        &self,
        result: Result<ExamResult, ExamError>,
    ) -> Result<ExamResult, ExamError> {
        match result {
            Ok(exam_result) => {
                let completed = lock_session(&self.session).transition_to_completed();
                match completed {
                    Ok(true) => info!(
                        attempt_id = %self.attempt_id,
                        score = exam_result.score,
                        percentage = exam_result.percentage,
                        "attempt completed"
                    ),
                    Ok(false) => debug!(attempt_id = %self.attempt_id, "attempt was already completed"),
                    Err(err) => {
                        warn!(attempt_id = %self.attempt_id, error = %err, "could not mark attempt completed");
                    }
                }
                *self.lock_state() = SubmissionState::Submitted(exam_result.clone());
                self.finish();
                self.close_drafts().await;
                Ok(exam_result)
            }
            Err(err) if err.is_transient() => {
                warn!(attempt_id = %self.attempt_id, error = %err, "submission failed, answers kept");
                *self.lock_state() = SubmissionState::Idle;
                phase::leave(&self.phase, SessionPhase::Submitting);
                Err(err)
            }
            Err(err) => {
                warn!(attempt_id = %self.attempt_id, error = %err, "submission refused");
                *self.lock_state() = SubmissionState::Refused(err.clone());
                self.finish();
                Err(err)
            }
        }
    }

    fn finish(&self) {
        self.halt.send_replace(true);
        phase::leave(&self.phase, SessionPhase::Submitting);
    }

    /// Reset a submission whose task went away without reporting.
    fn abandon_stale(&self) {
        let mut state = self.lock_state();
        let stale = matches!(
            &*state,
            SubmissionState::Submitting { outcome, .. } if outcome.has_changed().is_err()
        );
        if stale {
            *state = SubmissionState::Idle;
            phase::leave(&self.phase, SessionPhase::Submitting);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SubmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
