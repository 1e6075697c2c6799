use async_trait::async_trait;
use chrono::{DateTime, Utc};

use exam_core::AnswerSnapshot;
use exam_core::model::{Attempt, AttemptId, ExamResult};

use crate::error::ExamError;

/// A response value plus the server's notion of "now", when it sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerReply<T> {
    pub value: T,
    pub server_time: Option<DateTime<Utc>>,
}

impl<T> ServerReply<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            server_time: None,
        }
    }

    #[must_use]
    pub fn with_server_time(mut self, at: DateTime<Utc>) -> Self {
        self.server_time = Some(at);
        self
    }
}

/// Contract of the remote exam service.
#[async_trait]
pub trait ExamApi: Send + Sync {
    /// Fetch an attempt with its questions.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown attempt, `Forbidden` for another user's attempt.
    async fn fetch_attempt(&self, id: &AttemptId) -> Result<ServerReply<Attempt>, ExamError>;

    /// Move the attempt to ongoing.
    ///
    /// Yields the server-assigned start instant when the service reports it.
    ///
    /// # Errors
    ///
    /// `Rejected` when the attempt has already been started or completed.
    async fn start_attempt(
        &self,
        id: &AttemptId,
    ) -> Result<ServerReply<Option<DateTime<Utc>>>, ExamError>;

    /// Submit the final answers and receive the scored result.
    ///
    /// # Errors
    ///
    /// `Rejected` for a second submission of a completed attempt.
    async fn submit_answers(
        &self,
        id: &AttemptId,
        answers: &AnswerSnapshot,
    ) -> Result<ExamResult, ExamError>;

    /// Fetch the stored result of a completed attempt.
    ///
    /// # Errors
    ///
    /// `NotFound` when no result exists.
    async fn fetch_result(&self, id: &AttemptId) -> Result<ExamResult, ExamError>;
}
