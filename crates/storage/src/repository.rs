use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::AnswerSheet;
use exam_core::answers::AnswerError;
use exam_core::model::{AttemptId, Question};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape of an in-progress answer sheet.
///
/// Mirrors `AnswerSheet` so repositories can store and reload it without leaking
/// storage concerns into the domain layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerDraft {
    pub attempt_id: AttemptId,
    pub selections: BTreeMap<usize, usize>,
    pub marked: BTreeSet<usize>,
    pub current: usize,
    pub furthest: usize,
    pub saved_at: DateTime<Utc>,
}

impl AnswerDraft {
    #[must_use]
    pub fn from_sheet(attempt_id: AttemptId, sheet: &AnswerSheet, saved_at: DateTime<Utc>) -> Self {
        Self {
            attempt_id,
            selections: sheet.snapshot().as_map().clone(),
            marked: sheet.flags().iter().collect(),
            current: sheet.current(),
            furthest: sheet.furthest(),
            saved_at,
        }
    }

    /// Convert the draft back into an `AnswerSheet` for the given questions.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the draft does not fit the question set.
    pub fn into_sheet(self, questions: &[Question]) -> Result<AnswerSheet, AnswerError> {
        AnswerSheet::restore(
            questions,
            self.selections,
            self.marked,
            self.current,
            self.furthest,
        )
    }
}

/// Repository contract for in-progress answer drafts, one per attempt.
#[async_trait]
pub trait DraftRepository: Send + Sync {
    /// Insert or replace the draft for its attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the draft cannot be stored.
    async fn save_draft(&self, draft: &AnswerDraft) -> Result<(), StorageError>;

    /// Fetch the draft for an attempt, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn load_draft(&self, attempt_id: &AttemptId) -> Result<Option<AnswerDraft>, StorageError>;

    /// Remove the draft for an attempt. Removing a missing draft is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_draft(&self, attempt_id: &AttemptId) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    drafts: Arc<Mutex<HashMap<AttemptId, AnswerDraft>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftRepository for InMemoryRepository {
    async fn save_draft(&self, draft: &AnswerDraft) -> Result<(), StorageError> {
        let mut guard = self
            .drafts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(draft.attempt_id.clone(), draft.clone());
        Ok(())
    }

    async fn load_draft(&self, attempt_id: &AttemptId) -> Result<Option<AnswerDraft>, StorageError> {
        let guard = self
            .drafts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(attempt_id).cloned())
    }

    async fn delete_draft(&self, attempt_id: &AttemptId) -> Result<(), StorageError> {
        let mut guard = self
            .drafts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(attempt_id);
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub drafts: Arc<dyn DraftRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let drafts: Arc<dyn DraftRepository> = Arc::new(InMemoryRepository::new());
        Self { drafts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::QuestionId;
    use exam_core::time::fixed_now;

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                let options = vec!["a".into(), "b".into(), "c".into(), "d".into()];
                Question::new(QuestionId::new(format!("q{i}")), "?", "Physics", options).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn round_trips_draft_through_sheet() {
        let repo = InMemoryRepository::new();
        let qs = questions(4);
        let mut sheet = AnswerSheet::for_questions(&qs);
        sheet.set_answer(1, 3).unwrap();
        sheet.toggle_review(2).unwrap();
        sheet.go_to(2).unwrap();
        sheet.previous();

        let id = AttemptId::new("a1");
        let draft = AnswerDraft::from_sheet(id.clone(), &sheet, fixed_now());
        repo.save_draft(&draft).await.unwrap();

        let restored = repo
            .load_draft(&id)
            .await
            .unwrap()
            .expect("draft saved")
            .into_sheet(&qs)
            .unwrap();
        assert_eq!(restored, sheet);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = InMemoryRepository::new();
        let id = AttemptId::new("a1");
        repo.delete_draft(&id).await.unwrap();
        assert!(repo.load_draft(&id).await.unwrap().is_none());
    }

    #[test]
    fn draft_for_other_question_set_is_rejected() {
        let qs = questions(4);
        let mut sheet = AnswerSheet::for_questions(&qs);
        sheet.set_answer(3, 0).unwrap();
        let draft = AnswerDraft::from_sheet(AttemptId::new("a1"), &sheet, fixed_now());
        assert!(draft.into_sheet(&questions(2)).is_err());
    }
}
