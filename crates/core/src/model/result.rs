use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-subject tally inside a scored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub correct: u32,
    pub total: u32,
}

impl SubjectScore {
    /// Share of correct answers in `[0, 100]`; zero when the subject is empty.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.correct) * 100.0 / f64::from(self.total)
    }
}

/// Review of a single question after scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnalysis {
    pub question_id: String,
    pub subject: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub question: String,
    pub options: Vec<String>,
    pub user_answer: Option<usize>,
    pub correct_answer: usize,
    pub is_correct: bool,
    #[serde(default)]
    pub solution: String,
}

/// Scored outcome of a submitted attempt, as returned by the exam service.
///
/// `time_taken` is expressed in whole minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub score: f64,
    pub percentage: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub time_taken: u32,
    #[serde(default)]
    pub subject_wise_score: BTreeMap<String, SubjectScore>,
    #[serde(default)]
    pub detailed_analysis: Vec<QuestionAnalysis>,
}

impl ExamResult {
    /// Number of questions left without an answer at submission.
    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.detailed_analysis
            .iter()
            .filter(|q| q.user_answer.is_none())
            .count()
    }
}
