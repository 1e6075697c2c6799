use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::answers::{AnswerError, AnswerSheet, AnswerSnapshot, QuestionStatus, SheetProgress};
use crate::model::{Attempt, AttemptId, AttemptStatus, Question};
use crate::navigation::{self, PaletteGroup};
use crate::timer::Countdown;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("illegal transition from {from} to {to}")]
    InvalidTransition {
        from: AttemptStatus,
        to: AttemptStatus,
    },

    #[error("attempt is {status}, not ongoing")]
    NotOngoing { status: AttemptStatus },

    #[error("no attempt is loaded")]
    NotLoaded,

    #[error(transparent)]
    Answer(#[from] AnswerError),
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Authoritative in-memory copy of one attempt plus its session-local state.
///
/// The answer sheet exists only while the attempt is ongoing: it is created on the
/// transition to `Ongoing` and discarded the moment the attempt completes.
pub struct ExamSession {
    attempt: Attempt,
    sheet: Option<AnswerSheet>,
}

impl ExamSession {
    /// Wrap a freshly fetched attempt.
    #[must_use]
    pub fn new(attempt: Attempt) -> Self {
        let sheet = (attempt.status() == AttemptStatus::Ongoing)
            .then(|| AnswerSheet::for_questions(attempt.questions()));
        Self { attempt, sheet }
    }

    /// Replace the held attempt and drop all session-local state.
    pub fn load(&mut self, attempt: Attempt) {
        *self = Self::new(attempt);
    }

    #[must_use]
    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    #[must_use]
    pub fn id(&self) -> &AttemptId {
        self.attempt.id()
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.attempt.status()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        self.attempt.questions()
    }

    /// Deadline arithmetic, available once the attempt has a start time.
    #[must_use]
    pub fn countdown(&self) -> Option<Countdown> {
        self.attempt
            .started_at()
            .map(|at| Countdown::new(at, self.attempt.duration_seconds()))
    }

    /// `Created → Ongoing` with the server-assigned start instant.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` unless the attempt is `Created`.
    pub fn transition_to_ongoing(
        &mut self,
        started_at: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        let from = self.status();
        if from != AttemptStatus::Created {
            return Err(SessionStateError::InvalidTransition {
                from,
                to: AttemptStatus::Ongoing,
            });
        }
        self.attempt.mark_ongoing(started_at);
        self.sheet = Some(AnswerSheet::for_questions(self.attempt.questions()));
        Ok(())
    }

    /// `Ongoing → Completed`; a no-op when already completed.
    ///
    /// Returns `true` when the status actually changed.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTransition` from `Created`.
    pub fn transition_to_completed(&mut self) -> Result<bool, SessionStateError> {
        match self.status() {
            AttemptStatus::Completed => Ok(false),
            AttemptStatus::Ongoing => {
                self.attempt.mark_completed();
                self.sheet = None;
                Ok(true)
            }
            from @ AttemptStatus::Created => Err(SessionStateError::InvalidTransition {
                from,
                to: AttemptStatus::Completed,
            }),
        }
    }

    /// Swap in a restored sheet for an ongoing attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotOngoing` unless the attempt is ongoing.
    pub fn restore_sheet(&mut self, sheet: AnswerSheet) -> Result<(), SessionStateError> {
        let slot = self.sheet_mut()?;
        *slot = sheet;
        Ok(())
    }

    #[must_use]
    pub fn sheet(&self) -> Option<&AnswerSheet> {
        self.sheet.as_ref()
    }

    fn ongoing_sheet(&self) -> Result<&AnswerSheet, SessionStateError> {
        self.sheet.as_ref().ok_or(SessionStateError::NotOngoing {
            status: self.status(),
        })
    }

    fn sheet_mut(&mut self) -> Result<&mut AnswerSheet, SessionStateError> {
        let status = self.attempt.status();
        self.sheet
            .as_mut()
            .ok_or(SessionStateError::NotOngoing { status })
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` when not ongoing or the indices are out of range.
    pub fn set_answer(&mut self, index: usize, option: usize) -> Result<(), SessionStateError> {
        Ok(self.sheet_mut()?.set_answer(index, option)?)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` when not ongoing or the index is out of range.
    pub fn clear_answer(&mut self, index: usize) -> Result<Option<usize>, SessionStateError> {
        Ok(self.sheet_mut()?.clear_answer(index)?)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` when not ongoing or the index is out of range.
    pub fn toggle_review(&mut self, index: usize) -> Result<bool, SessionStateError> {
        Ok(self.sheet_mut()?.toggle_review(index)?)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` when not ongoing or the index is out of range.
    pub fn go_to(&mut self, index: usize) -> Result<(), SessionStateError> {
        Ok(self.sheet_mut()?.go_to(index)?)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::NotOngoing` when not ongoing.
    pub fn next(&mut self) -> Result<bool, SessionStateError> {
        Ok(self.sheet_mut()?.next())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::NotOngoing` when not ongoing.
    pub fn previous(&mut self) -> Result<bool, SessionStateError> {
        Ok(self.sheet_mut()?.previous())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` when not ongoing or the index is out of range.
    pub fn status_of(&self, index: usize) -> Result<QuestionStatus, SessionStateError> {
        Ok(self.ongoing_sheet()?.status_of(index)?)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::NotOngoing` when not ongoing.
    pub fn snapshot(&self) -> Result<AnswerSnapshot, SessionStateError> {
        Ok(self.ongoing_sheet()?.snapshot())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::NotOngoing` when not ongoing.
    pub fn progress(&self) -> Result<SheetProgress, SessionStateError> {
        Ok(self.ongoing_sheet()?.progress())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::NotOngoing` when not ongoing.
    pub fn palette(&self) -> Result<Vec<PaletteGroup>, SessionStateError> {
        Ok(navigation::palette(self.questions(), self.ongoing_sheet()?))
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("id", self.attempt.id())
            .field("status", &self.attempt.status())
            .field("started_at", &self.attempt.started_at())
            .field("questions_len", &self.attempt.question_count())
            .field("answered", &self.sheet.as_ref().map(AnswerSheet::answered_count))
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionId;
    use crate::time::fixed_now;

    fn attempt(id: &str) -> Attempt {
        let questions = (0..3)
            .map(|i| {
                let options = vec!["a".into(), "b".into(), "c".into(), "d".into()];
                Question::new(QuestionId::new(format!("q{i}")), "?", "Physics", options)
                    .unwrap()
            })
            .collect();
        Attempt::new(AttemptId::new(id), 60, questions).unwrap()
    }

    #[test]
    fn start_then_complete() {
        let mut session = ExamSession::new(attempt("a1"));
        assert!(session.sheet().is_none());
        assert!(session.countdown().is_none());

        session.transition_to_ongoing(fixed_now()).unwrap();
        assert_eq!(session.status(), AttemptStatus::Ongoing);
        assert_eq!(session.countdown().unwrap().started_at(), fixed_now());
        session.set_answer(0, 1).unwrap();

        assert!(session.transition_to_completed().unwrap());
        assert_eq!(session.status(), AttemptStatus::Completed);
        assert!(session.sheet().is_none());
    }

    #[test]
    fn double_start_is_invalid_state() {
        let mut session = ExamSession::new(attempt("a1"));
        session.transition_to_ongoing(fixed_now()).unwrap();
        let err = session.transition_to_ongoing(fixed_now()).unwrap_err();
        assert_eq!(
            err,
            SessionStateError::InvalidTransition {
                from: AttemptStatus::Ongoing,
                to: AttemptStatus::Ongoing
            }
        );
        assert_eq!(session.countdown().unwrap().started_at(), fixed_now());
    }

    #[test]
    fn completing_twice_is_a_no_op() {
        let mut session = ExamSession::new(attempt("a1"));
        session.transition_to_ongoing(fixed_now()).unwrap();
        assert!(session.transition_to_completed().unwrap());
        assert!(!session.transition_to_completed().unwrap());
    }

    #[test]
    fn completing_from_created_is_invalid() {
        let mut session = ExamSession::new(attempt("a1"));
        assert!(matches!(
            session.transition_to_completed(),
            Err(SessionStateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn answers_require_ongoing() {
        let mut session = ExamSession::new(attempt("a1"));
        assert_eq!(
            session.set_answer(0, 0).unwrap_err(),
            SessionStateError::NotOngoing {
                status: AttemptStatus::Created
            }
        );
        assert!(session.palette().is_err());
    }

    #[test]
    fn load_replaces_previous_attempt() {
        let mut session = ExamSession::new(attempt("a1"));
        session.transition_to_ongoing(fixed_now()).unwrap();
        session.set_answer(1, 2).unwrap();

        session.load(attempt("a2"));
        assert_eq!(session.id(), &AttemptId::new("a2"));
        assert_eq!(session.status(), AttemptStatus::Created);
        assert!(session.sheet().is_none());
    }

    #[test]
    fn loading_an_ongoing_attempt_starts_with_an_empty_sheet() {
        let base = attempt("a1");
        let ongoing = Attempt::from_persisted(
            base.id().clone(),
            AttemptStatus::Ongoing,
            Some(fixed_now()),
            base.duration_seconds(),
            base.questions().to_vec(),
        )
        .unwrap();
        let session = ExamSession::new(ongoing);
        assert_eq!(session.snapshot().unwrap().len(), 0);
        assert_eq!(session.status_of(0).unwrap(), QuestionStatus::NotAnswered);
    }
}
