#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;
pub mod sessions;

pub use exam_core::Clock;

pub use api::{ExamApi, ServerReply};
pub use app_services::AppServices;
pub use config::ExamClientConfig;
pub use error::{AppServicesError, ConfigError, ExamError};
pub use http::HttpExamApi;
pub use retry::RetryPolicy;
pub use sessions::{
    DraftStore, ExamSessionService, SessionPhase, SubmissionStatus, SubmitTrigger,
};
