/// Account tier resolution. Pro accounts bypass all credit checks; the
/// resolver never consults balance fields.
use crate::error::{ApiError, ApiResult};
use sqlx::{Row, SqlitePool};

pub struct TierResolver {
    db: SqlitePool,
}

impl TierResolver {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Whether the account is on the Pro tier. Missing rows are free
    /// accounts.
    pub async fn is_pro(&self, account_id: &str) -> ApiResult<bool> {
        let row = sqlx::query("SELECT is_pro FROM users WHERE id = ?1")
            .bind(account_id)
            .fetch_optional(&self.db)
            .await
            .map_err(ApiError::Database)?;

        Ok(row.map(|r| r.get("is_pro")).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::CreditLedger;
    use crate::db::testing::memory_pool;

    #[tokio::test]
    async fn test_missing_account_is_not_pro() {
        let tiers = TierResolver::new(memory_pool().await);
        assert!(!tiers.is_pro("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_pro_flag_round_trip() {
        let pool = memory_pool().await;
        let ledger = CreditLedger::new(pool.clone());
        let tiers = TierResolver::new(pool.clone());

        ledger.ensure_account("u1", "u1@example.com").await.unwrap();
        assert!(!tiers.is_pro("u1").await.unwrap());

        sqlx::query("UPDATE users SET is_pro = 1 WHERE id = 'u1'")
            .execute(&pool)
            .await
            .unwrap();
        assert!(tiers.is_pro("u1").await.unwrap());
    }
}
