use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::AttemptId;
use crate::model::question::Question;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt duration must be > 0 seconds")]
    InvalidDuration,

    #[error("attempt has no questions")]
    NoQuestions,

    #[error("ongoing attempt is missing its start time")]
    MissingStartTime,

    #[error("attempt that has not started cannot carry a start time")]
    UnexpectedStartTime,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt: `Created → Ongoing → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Created,
    Ongoing,
    #[serde(alias = "submitted")]
    Completed,
}

impl AttemptStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Completed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Created => "created",
            AttemptStatus::Ongoing => "ongoing",
            AttemptStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One instance of a student taking a configured exam.
///
/// `id`, `duration_seconds` and `questions` never change after creation.
/// `started_at` is set once, by the server, when the attempt becomes ongoing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    status: AttemptStatus,
    started_at: Option<DateTime<Utc>>,
    duration_seconds: u32,
    questions: Vec<Question>,
}

impl Attempt {
    /// Creates a fresh attempt in `Created` status.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the duration is zero or there are no questions.
    pub fn new(
        id: AttemptId,
        duration_seconds: u32,
        questions: Vec<Question>,
    ) -> Result<Self, AttemptError> {
        Self::from_persisted(id, AttemptStatus::Created, None, duration_seconds, questions)
    }

    /// Rehydrate an attempt as reported by the exam service.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the duration is zero, there are no questions,
    /// or the start time disagrees with the status.
    pub fn from_persisted(
        id: AttemptId,
        status: AttemptStatus,
        started_at: Option<DateTime<Utc>>,
        duration_seconds: u32,
        questions: Vec<Question>,
    ) -> Result<Self, AttemptError> {
        if duration_seconds == 0 {
            return Err(AttemptError::InvalidDuration);
        }
        if questions.is_empty() {
            return Err(AttemptError::NoQuestions);
        }
        match (status, started_at) {
            (AttemptStatus::Ongoing, None) => return Err(AttemptError::MissingStartTime),
            (AttemptStatus::Created, Some(_)) => return Err(AttemptError::UnexpectedStartTime),
            _ => {}
        }

        Ok(Self {
            id,
            status,
            started_at,
            duration_seconds,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> &AttemptId {
        &self.id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub(crate) fn mark_ongoing(&mut self, started_at: DateTime<Utc>) {
        self.status = AttemptStatus::Ongoing;
        self.started_at = Some(started_at);
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = AttemptStatus::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionId;
    use crate::time::fixed_now;

    fn question() -> Question {
        let options = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        Question::new(QuestionId::new("q"), "?", "Physics", options).unwrap()
    }

    #[test]
    fn new_attempt_starts_created() {
        let attempt = Attempt::new(AttemptId::new("a1"), 60, vec![question()]).unwrap();
        assert_eq!(attempt.status(), AttemptStatus::Created);
        assert_eq!(attempt.started_at(), None);
        assert_eq!(attempt.question_count(), 1);
    }

    #[test]
    fn rejects_zero_duration_and_empty_questions() {
        assert_eq!(
            Attempt::new(AttemptId::new("a1"), 0, vec![question()]).unwrap_err(),
            AttemptError::InvalidDuration
        );
        assert_eq!(
            Attempt::new(AttemptId::new("a1"), 60, Vec::new()).unwrap_err(),
            AttemptError::NoQuestions
        );
    }

    #[test]
    fn ongoing_requires_start_time() {
        let err = Attempt::from_persisted(
            AttemptId::new("a1"),
            AttemptStatus::Ongoing,
            None,
            60,
            vec![question()],
        )
        .unwrap_err();
        assert_eq!(err, AttemptError::MissingStartTime);

        let ok = Attempt::from_persisted(
            AttemptId::new("a1"),
            AttemptStatus::Ongoing,
            Some(fixed_now()),
            60,
            vec![question()],
        )
        .unwrap();
        assert_eq!(ok.started_at(), Some(fixed_now()));
    }

    #[test]
    fn submitted_status_reads_as_completed() {
        let status: AttemptStatus = serde_json::from_str("\"submitted\"").unwrap();
        assert_eq!(status, AttemptStatus::Completed);
        assert!(status.is_terminal());
    }
}
