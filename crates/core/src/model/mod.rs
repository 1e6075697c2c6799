mod attempt;
mod ids;
mod question;
mod result;

pub use ids::{AttemptId, ParseIdError, QuestionId};

pub use attempt::{Attempt, AttemptError, AttemptStatus};
pub use question::{OPTION_COUNT, Question, QuestionError};
pub use result::{ExamResult, QuestionAnalysis, SubjectScore};
