use std::sync::Arc;

use exam_core::model::AttemptId;
use storage::repository::{AnswerDraft, DraftRepository};
use tracing::{debug, info, warn};

use super::{SharedSession, lock_session};

/// Best-effort persistence of in-progress answers.
///
/// Storage failures are logged and swallowed; a draft never blocks an exam.
#[derive(Clone)]
pub struct DraftStore {
    repo: Arc<dyn DraftRepository>,
}

impl DraftStore {
    #[must_use]
    pub fn new(repo: Arc<dyn DraftRepository>) -> Self {
        Self { repo }
    }

    pub(crate) async fn save(&self, draft: &AnswerDraft) {
        if let Err(err) = self.repo.save_draft(draft).await {
            warn!(attempt_id = %draft.attempt_id, error = %err, "failed to save answer draft");
        }
    }

    /// Apply a stored draft to an ongoing session. Returns whether one was applied.
    pub(crate) async fn restore(&self, attempt_id: &AttemptId, session: &SharedSession) -> bool {
        let draft = match self.repo.load_draft(attempt_id).await {
            Ok(Some(draft)) => draft,
            Ok(None) => return false,
            Err(err) => {
                warn!(%attempt_id, error = %err, "failed to load answer draft");
                return false;
            }
        };

        let restored = {
            let mut guard = lock_session(session);
            draft
                .into_sheet(guard.questions())
                .map_err(|e| e.to_string())
                .and_then(|sheet| guard.restore_sheet(sheet).map_err(|e| e.to_string()))
        };

        match restored {
            Ok(()) => {
                info!(%attempt_id, "restored answer draft");
                true
            }
            Err(reason) => {
                warn!(%attempt_id, %reason, "discarding answer draft that does not fit the attempt");
                self.discard(attempt_id).await;
                false
            }
        }
    }

    pub(crate) async fn discard(&self, attempt_id: &AttemptId) {
        match self.repo.delete_draft(attempt_id).await {
            Ok(()) => debug!(%attempt_id, "answer draft removed"),
            Err(err) => warn!(%attempt_id, error = %err, "failed to delete answer draft"),
        }
    }
}
