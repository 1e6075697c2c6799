#![forbid(unsafe_code)]

pub mod answers;
pub mod error;
pub mod model;
pub mod navigation;
pub mod session;
pub mod time;
pub mod timer;

pub use answers::{AnswerError, AnswerSheet, AnswerSnapshot, QuestionStatus, ReviewFlags};
pub use error::Error;
pub use session::{ExamSession, SessionStateError};
pub use time::Clock;
pub use timer::{Countdown, TickAction, TimerEngine, TimerTick};
