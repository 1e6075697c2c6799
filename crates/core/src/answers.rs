//! Per-attempt answer bookkeeping: selections, review flags and navigation reach.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::model::Question;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("question index {index} is out of range (attempt has {len} questions)")]
    QuestionOutOfRange { index: usize, len: usize },

    #[error("option {option} is out of range for question {index} ({count} options)")]
    OptionOutOfRange {
        index: usize,
        option: usize,
        count: usize,
    },
}

//
// ─── QUESTION STATUS ───────────────────────────────────────────────────────────
//

/// Display status of a question in the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionStatus {
    AnsweredMarked,
    Answered,
    Marked,
    NotAnswered,
    NotVisited,
}

impl QuestionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionStatus::AnsweredMarked => "answered-marked",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Marked => "marked",
            QuestionStatus::NotAnswered => "not-answered",
            QuestionStatus::NotVisited => "not-visited",
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── REVIEW FLAGS ──────────────────────────────────────────────────────────────
//

/// Set of question indices marked for revisit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFlags {
    marked: BTreeSet<usize>,
}

impl ReviewFlags {
    /// Flip membership of `index`; returns whether it is marked afterwards.
    pub fn toggle(&mut self, index: usize) -> bool {
        if self.marked.remove(&index) {
            false
        } else {
            self.marked.insert(index);
            true
        }
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.marked.contains(&index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.marked.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.marked.iter().copied()
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Immutable copy of the selections, keyed by question index.
///
/// Serializes as a JSON object with stringified indices (`{"0": 2}`), which is the
/// shape the exam service expects in a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSnapshot(BTreeMap<usize, usize>);

impl AnswerSnapshot {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<usize> {
        self.0.get(&index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<usize, usize> {
        &self.0
    }
}

/// Counts shown before a submission is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetProgress {
    pub total: usize,
    pub answered: usize,
    pub marked: usize,
    pub not_answered: usize,
    pub not_visited: usize,
}

//
// ─── ANSWER SHEET ──────────────────────────────────────────────────────────────
//

/// Selections, review flags and the navigation pointer of one attempt.
///
/// Every stored selection is a valid option index for its question. `furthest` is the
/// highest index ever made current; questions at or below it are "reached".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSheet {
    option_counts: Vec<usize>,
    selections: BTreeMap<usize, usize>,
    flags: ReviewFlags,
    current: usize,
    furthest: usize,
}

impl AnswerSheet {
    /// Empty sheet positioned on the first question.
    #[must_use]
    pub fn for_questions(questions: &[Question]) -> Self {
        Self {
            option_counts: questions.iter().map(|q| q.options().len()).collect(),
            selections: BTreeMap::new(),
            flags: ReviewFlags::default(),
            current: 0,
            furthest: 0,
        }
    }

    /// Rebuild a sheet from previously saved state, validating every entry.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if any index or option does not fit the question set.
    pub fn restore(
        questions: &[Question],
        selections: BTreeMap<usize, usize>,
        marked: impl IntoIterator<Item = usize>,
        current: usize,
        furthest: usize,
    ) -> Result<Self, AnswerError> {
        let mut sheet = Self::for_questions(questions);
        for (index, option) in selections {
            sheet.set_answer(index, option)?;
        }
        for index in marked {
            sheet.check_index(index)?;
            sheet.flags.marked.insert(index);
        }
        sheet.check_index(furthest)?;
        sheet.go_to(current)?;
        sheet.furthest = sheet.furthest.max(furthest);
        Ok(sheet)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.option_counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.option_counts.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<(), AnswerError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(AnswerError::QuestionOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    /// Record `option` for `index`, overwriting any previous selection.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the question or option index is out of range.
    pub fn set_answer(&mut self, index: usize, option: usize) -> Result<(), AnswerError> {
        self.check_index(index)?;
        let count = self.option_counts[index];
        if option >= count {
            return Err(AnswerError::OptionOutOfRange {
                index,
                option,
                count,
            });
        }
        self.selections.insert(index, option);
        Ok(())
    }

    /// Remove the selection for `index`, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::QuestionOutOfRange` for an unknown index.
    pub fn clear_answer(&mut self, index: usize) -> Result<Option<usize>, AnswerError> {
        self.check_index(index)?;
        Ok(self.selections.remove(&index))
    }

    #[must_use]
    pub fn answer(&self, index: usize) -> Option<usize> {
        self.selections.get(&index).copied()
    }

    /// Flip the review flag of `index`; returns whether it is marked afterwards.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::QuestionOutOfRange` for an unknown index.
    pub fn toggle_review(&mut self, index: usize) -> Result<bool, AnswerError> {
        self.check_index(index)?;
        Ok(self.flags.toggle(index))
    }

    #[must_use]
    pub fn flags(&self) -> &ReviewFlags {
        &self.flags
    }

    #[must_use]
    pub fn is_marked(&self, index: usize) -> bool {
        self.flags.contains(index)
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn furthest(&self) -> usize {
        self.furthest
    }

    /// Make `index` the current question.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::QuestionOutOfRange` for an unknown index.
    pub fn go_to(&mut self, index: usize) -> Result<(), AnswerError> {
        self.check_index(index)?;
        self.current = index;
        self.furthest = self.furthest.max(index);
        Ok(())
    }

    /// Advance one question; returns `false` when already on the last one.
    pub fn next(&mut self) -> bool {
        if self.current + 1 >= self.len() {
            return false;
        }
        self.current += 1;
        self.furthest = self.furthest.max(self.current);
        true
    }

    /// Step back one question; returns `false` when already on the first one.
    pub fn previous(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        true
    }

    /// Derive the palette status of `index`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::QuestionOutOfRange` for an unknown index.
    pub fn status_of(&self, index: usize) -> Result<QuestionStatus, AnswerError> {
        self.check_index(index)?;
        let answered = self.selections.contains_key(&index);
        let marked = self.flags.contains(index);
        let status = match (answered, marked) {
            (true, true) => QuestionStatus::AnsweredMarked,
            (true, false) => QuestionStatus::Answered,
            (false, true) => QuestionStatus::Marked,
            (false, false) if index <= self.furthest => QuestionStatus::NotAnswered,
            (false, false) => QuestionStatus::NotVisited,
        };
        Ok(status)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.selections.len()
    }

    #[must_use]
    pub fn progress(&self) -> SheetProgress {
        let mut progress = SheetProgress {
            total: self.len(),
            answered: self.answered_count(),
            marked: self.flags.len(),
            not_answered: 0,
            not_visited: 0,
        };
        for index in 0..self.len() {
            if self.selections.contains_key(&index) {
                continue;
            }
            if index <= self.furthest {
                progress.not_answered += 1;
            } else {
                progress.not_visited += 1;
            }
        }
        progress
    }

    #[must_use]
    pub fn snapshot(&self) -> AnswerSnapshot {
        AnswerSnapshot(self.selections.clone())
    }
}
