use std::sync::Arc;

use storage::repository::Storage;
use tracing::info;

use crate::Clock;
use crate::api::ExamApi;
use crate::config::ExamClientConfig;
use crate::error::AppServicesError;
use crate::http::HttpExamApi;
use crate::retry::RetryPolicy;
use crate::sessions::{DraftStore, ExamSessionService};

/// Assembles app-facing services from configuration.
#[derive(Clone)]
pub struct AppServices {
    exam_sessions: Arc<ExamSessionService>,
}

impl AppServices {
    /// Build services talking HTTP to the exam service.
    ///
    /// Answer drafts go to `SQLite` when `drafts_db` is set and stay in memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the HTTP client or draft storage cannot be set up.
    pub async fn from_config(
        config: &ExamClientConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let api: Arc<dyn ExamApi> = Arc::new(HttpExamApi::new(config)?);
        let storage = match &config.drafts_db {
            Some(url) => {
                info!(drafts_db = %url, "persisting answer drafts");
                Storage::sqlite(url).await?
            }
            None => Storage::in_memory(),
        };
        Ok(Self::assemble(api, clock, config, &storage))
    }

    /// Wire services around an arbitrary `ExamApi`.
    #[must_use]
    pub fn assemble(
        api: Arc<dyn ExamApi>,
        clock: Clock,
        config: &ExamClientConfig,
        storage: &Storage,
    ) -> Self {
        let auto_submit = RetryPolicy::default().with_max_attempts(config.auto_submit_attempts);
        let exam_sessions = ExamSessionService::new(api, clock)
            .with_tick_interval(config.tick_interval)
            .with_auto_submit_policy(auto_submit)
            .with_drafts(DraftStore::new(Arc::clone(&storage.drafts)));
        Self {
            exam_sessions: Arc::new(exam_sessions),
        }
    }

    #[must_use]
    pub fn exam_sessions(&self) -> Arc<ExamSessionService> {
        Arc::clone(&self.exam_sessions)
    }
}
