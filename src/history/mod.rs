/// Prompt history store: append-only records for authenticated users.
///
/// Appends are best-effort from the caller's point of view: the access
/// controller logs and swallows failures here so a history problem never
/// blocks a response or reverses a credit deduction.
use crate::db::models::PromptRecord;
use crate::error::{ApiError, ApiResult};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct HistoryStore {
    db: SqlitePool,
}

impl HistoryStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append a prompt record for an account
    pub async fn append(
        &self,
        account_id: &str,
        input_text: &str,
        output_text: &str,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO prompt_history (id, user_id, input_text, output_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(input_text)
        .bind(output_text)
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(())
    }

    /// Most recent records for an account, newest first
    pub async fn list_recent(
        &self,
        account_id: &str,
        limit: i64,
    ) -> ApiResult<Vec<PromptRecord>> {
        let records = sqlx::query_as::<_, PromptRecord>(
            "SELECT id, user_id, input_text, output_text, created_at
             FROM prompt_history WHERE user_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(records)
    }

    /// Delete records older than the retention window. Returns the number
    /// of rows removed.
    pub async fn prune_older_than(&self, days: i64) -> ApiResult<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = sqlx::query("DELETE FROM prompt_history WHERE created_at < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    #[tokio::test]
    async fn test_append_and_list() {
        let history = HistoryStore::new(memory_pool().await);

        history.append("u1", "in-1", "out-1").await.unwrap();
        history.append("u1", "in-2", "out-2").await.unwrap();
        history.append("u2", "other", "other").await.unwrap();

        let records = history.list_recent("u1", 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.user_id == "u1"));
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_rows() {
        let history = HistoryStore::new(memory_pool().await);
        history.append("u1", "fresh", "fresh").await.unwrap();

        // Backdate one row past the retention window
        sqlx::query(
            "INSERT INTO prompt_history (id, user_id, input_text, output_text, created_at)
             VALUES ('old', 'u1', 'old', 'old', ?1)",
        )
        .bind(Utc::now() - Duration::days(120))
        .execute(&history.db)
        .await
        .unwrap();

        assert_eq!(history.prune_older_than(90).await.unwrap(), 1);
        assert_eq!(history.list_recent("u1", 10).await.unwrap().len(), 1);
    }
}
