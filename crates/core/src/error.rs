use thiserror::Error;

use crate::answers::AnswerError;
use crate::model::{AttemptError, QuestionError};
use crate::session::SessionStateError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
}
