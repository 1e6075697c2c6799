//! Subject-grouped view of the question order, for palette rendering.

use crate::answers::{AnswerSheet, QuestionStatus};
use crate::model::Question;

/// Question indices sharing a subject, in original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectGroup {
    pub subject: String,
    pub indices: Vec<usize>,
}

/// One palette cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    pub index: usize,
    pub status: QuestionStatus,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteGroup {
    pub subject: String,
    pub entries: Vec<PaletteEntry>,
}

/// Group indices by subject, keeping first-seen subject order.
#[must_use]
pub fn group_by_subject(questions: &[Question]) -> Vec<SubjectGroup> {
    let mut groups: Vec<SubjectGroup> = Vec::new();
    for (index, question) in questions.iter().enumerate() {
        match groups.iter_mut().find(|g| g.subject == question.subject()) {
            Some(group) => group.indices.push(index),
            None => groups.push(SubjectGroup {
                subject: question.subject().to_owned(),
                indices: vec![index],
            }),
        }
    }
    groups
}

/// Palette groups with the status of every question.
#[must_use]
pub fn palette(questions: &[Question], sheet: &AnswerSheet) -> Vec<PaletteGroup> {
    group_by_subject(questions)
        .into_iter()
        .map(|group| PaletteGroup {
            entries: group
                .indices
                .iter()
                .map(|&index| PaletteEntry {
                    index,
                    status: sheet
                        .status_of(index)
                        .unwrap_or(QuestionStatus::NotVisited),
                    is_current: index == sheet.current(),
                })
                .collect(),
            subject: group.subject,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionId;

    fn question(i: usize, subject: &str) -> Question {
        let options = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        Question::new(QuestionId::new(format!("q{i}")), "?", subject, options).unwrap()
    }

    #[test]
    fn groups_in_first_seen_order() {
        let qs = vec![
            question(0, "Physics"),
            question(1, "Physics"),
            question(2, "Chemistry"),
            question(3, "Chemistry"),
        ];
        let groups = group_by_subject(&qs);
        assert_eq!(
            groups,
            vec![
                SubjectGroup {
                    subject: "Physics".into(),
                    indices: vec![0, 1]
                },
                SubjectGroup {
                    subject: "Chemistry".into(),
                    indices: vec![2, 3]
                },
            ]
        );
    }

    #[test]
    fn interleaved_subjects_keep_index_order() {
        let qs = vec![
            question(0, "Maths"),
            question(1, "Biology"),
            question(2, "Maths"),
            question(3, "Biology"),
            question(4, "Maths"),
        ];
        let groups = group_by_subject(&qs);
        assert_eq!(groups[0].subject, "Maths");
        assert_eq!(groups[0].indices, vec![0, 2, 4]);
        assert_eq!(groups[1].indices, vec![1, 3]);
    }

    #[test]
    fn palette_reports_status_and_current() {
        let qs = vec![question(0, "Physics"), question(1, "Chemistry")];
        let mut sheet = AnswerSheet::for_questions(&qs);
        sheet.set_answer(0, 1).unwrap();
        sheet.go_to(1).unwrap();

        let groups = palette(&qs, &sheet);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].entries[0].status, QuestionStatus::Answered);
        assert!(!groups[0].entries[0].is_current);
        assert_eq!(groups[1].entries[0].status, QuestionStatus::NotAnswered);
        assert!(groups[1].entries[0].is_current);
    }
}
