use exam_core::model::AttemptId;
use sqlx::Row;
use std::collections::{BTreeMap, BTreeSet};

use super::SqliteRepository;
use crate::repository::{AnswerDraft, DraftRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn index_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn index_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn map_draft_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerDraft, StorageError> {
    let attempt_id = AttemptId::new(row.try_get::<String, _>("attempt_id").map_err(ser)?);
    let selections: BTreeMap<usize, usize> =
        serde_json::from_str(&row.try_get::<String, _>("selections").map_err(ser)?)
            .map_err(ser)?;
    let marked: BTreeSet<usize> =
        serde_json::from_str(&row.try_get::<String, _>("marked").map_err(ser)?).map_err(ser)?;
    let current = index_from_i64(
        "current_index",
        row.try_get::<i64, _>("current_index").map_err(ser)?,
    )?;
    let furthest = index_from_i64(
        "furthest_index",
        row.try_get::<i64, _>("furthest_index").map_err(ser)?,
    )?;
    let saved_at = row.try_get("saved_at").map_err(ser)?;

    Ok(AnswerDraft {
        attempt_id,
        selections,
        marked,
        current,
        furthest,
        saved_at,
    })
}

#[async_trait::async_trait]
impl DraftRepository for SqliteRepository {
    async fn save_draft(&self, draft: &AnswerDraft) -> Result<(), StorageError> {
        let selections = serde_json::to_string(&draft.selections).map_err(ser)?;
        let marked = serde_json::to_string(&draft.marked).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO answer_drafts (
                    attempt_id, selections, marked, current_index, furthest_index, saved_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(attempt_id) DO UPDATE SET
                    selections = excluded.selections,
                    marked = excluded.marked,
                    current_index = excluded.current_index,
                    furthest_index = excluded.furthest_index,
                    saved_at = excluded.saved_at
            ",
        )
        .bind(draft.attempt_id.as_str())
        .bind(selections)
        .bind(marked)
        .bind(index_to_i64("current_index", draft.current)?)
        .bind(index_to_i64("furthest_index", draft.furthest)?)
        .bind(draft.saved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn load_draft(&self, attempt_id: &AttemptId) -> Result<Option<AnswerDraft>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT attempt_id, selections, marked, current_index, furthest_index, saved_at
                FROM answer_drafts
                WHERE attempt_id = ?1
            ",
        )
        .bind(attempt_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_draft_row).transpose()
    }

    async fn delete_draft(&self, attempt_id: &AttemptId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM answer_drafts WHERE attempt_id = ?1")
            .bind(attempt_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
