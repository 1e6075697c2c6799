use thiserror::Error;

use crate::model::ids::QuestionId;

/// Every question offers exactly this many options.
pub const OPTION_COUNT: usize = 4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question subject cannot be empty")]
    EmptySubject,

    #[error("question must have exactly {OPTION_COUNT} options, found {found}")]
    OptionCount { found: usize },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Read-only multiple-choice question content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    subject: String,
    topic: Option<String>,
    difficulty: Option<String>,
    options: [String; OPTION_COUNT],
}

impl Question {
    /// Creates a question from its text, subject label and options.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptySubject` if the subject is blank.
    /// Returns `QuestionError::OptionCount` unless exactly four options are given.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        subject: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, QuestionError> {
        let subject = subject.into().trim().to_owned();
        if subject.is_empty() {
            return Err(QuestionError::EmptySubject);
        }
        let found = options.len();
        let options: [String; OPTION_COUNT] = options
            .try_into()
            .map_err(|_| QuestionError::OptionCount { found })?;

        Ok(Self {
            id,
            text: text.into(),
            subject,
            topic: None,
            difficulty: None,
            options,
        })
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Label used to group questions in the palette.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Option<&str> {
        self.difficulty.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }
}
