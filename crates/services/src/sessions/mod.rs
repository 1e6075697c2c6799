mod drafts;
mod phase;
mod service;
mod submission;
mod timer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use exam_core::ExamSession;

pub use drafts::DraftStore;
pub use phase::SessionPhase;
pub use service::ExamSessionService;
pub use submission::{SubmissionStatus, SubmitTrigger};

/// One attempt's session, shared by the facade, its timer and its submission.
pub(crate) type SharedSession = Arc<Mutex<ExamSession>>;

/// Session state stays consistent between statements, so a poisoned lock is still usable.
pub(crate) fn lock_session(session: &SharedSession) -> MutexGuard<'_, ExamSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
