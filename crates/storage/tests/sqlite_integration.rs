use chrono::Duration;
use exam_core::AnswerSheet;
use exam_core::model::{AttemptId, Question, QuestionId};
use exam_core::time::fixed_now;
use storage::repository::{AnswerDraft, DraftRepository};
use storage::sqlite::SqliteRepository;

fn questions(n: usize) -> Vec<Question> {
    (0..n)
        .map(|i| {
            let options = vec!["a".into(), "b".into(), "c".into(), "d".into()];
            Question::new(QuestionId::new(format!("q{i}")), "?", "Chemistry", options).unwrap()
        })
        .collect()
}

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_persists_selections_and_flags() {
    let repo = repo("memdb_draft_roundtrip").await;
    let qs = questions(5);
    let mut sheet = AnswerSheet::for_questions(&qs);
    sheet.set_answer(0, 2).unwrap();
    sheet.set_answer(4, 1).unwrap();
    sheet.toggle_review(3).unwrap();
    sheet.go_to(4).unwrap();
    sheet.go_to(1).unwrap();

    let id = AttemptId::new("attempt-1");
    repo.save_draft(&AnswerDraft::from_sheet(id.clone(), &sheet, fixed_now()))
        .await
        .unwrap();

    let draft = repo.load_draft(&id).await.unwrap().expect("draft stored");
    assert_eq!(draft.saved_at, fixed_now());
    assert_eq!(draft.current, 1);
    assert_eq!(draft.furthest, 4);

    let restored = draft.into_sheet(&qs).unwrap();
    assert_eq!(restored, sheet);
}

#[tokio::test]
async fn sqlite_save_replaces_previous_draft() {
    let repo = repo("memdb_draft_replace").await;
    let qs = questions(3);
    let id = AttemptId::new("attempt-2");

    let mut sheet = AnswerSheet::for_questions(&qs);
    sheet.set_answer(0, 0).unwrap();
    repo.save_draft(&AnswerDraft::from_sheet(id.clone(), &sheet, fixed_now()))
        .await
        .unwrap();

    sheet.set_answer(0, 3).unwrap();
    let later = fixed_now() + Duration::seconds(5);
    repo.save_draft(&AnswerDraft::from_sheet(id.clone(), &sheet, later))
        .await
        .unwrap();

    let draft = repo.load_draft(&id).await.unwrap().unwrap();
    assert_eq!(draft.selections.get(&0), Some(&3));
    assert_eq!(draft.saved_at, later);
}

#[tokio::test]
async fn sqlite_delete_removes_draft() {
    let repo = repo("memdb_draft_delete").await;
    let qs = questions(2);
    let id = AttemptId::new("attempt-3");
    let sheet = AnswerSheet::for_questions(&qs);
    repo.save_draft(&AnswerDraft::from_sheet(id.clone(), &sheet, fixed_now()))
        .await
        .unwrap();

    repo.delete_draft(&id).await.unwrap();
    repo.delete_draft(&id).await.unwrap();
    assert!(repo.load_draft(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = repo("memdb_draft_migrate").await;
    repo.migrate().await.expect("second migrate");
}
