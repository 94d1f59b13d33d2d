/// One-time signup bonus.
///
/// The grant is gated by a persisted flag and executed as a single
/// conditional update, so retries and concurrent first-calls for the same
/// account resolve to exactly one grant.
use crate::credits::SIGNUP_BONUS;
use crate::error::{ApiError, ApiResult};
use sqlx::SqlitePool;

pub struct SignupBonusGranter {
    db: SqlitePool,
}

impl SignupBonusGranter {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Grant the signup bonus if this account has never received it.
    /// Returns true when the grant was applied on this call.
    ///
    /// The account row must already exist; the ledger's `ensure_account`
    /// runs before this in the request flow.
    pub async fn grant_if_needed(&self, account_id: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET bonus_credits = bonus_credits + ?1, signup_bonus_given = 1
             WHERE id = ?2 AND signup_bonus_given = 0",
        )
        .bind(SIGNUP_BONUS)
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        let granted = result.rows_affected() == 1;
        if granted {
            tracing::info!(
                "Granted {} signup bonus credits to account {}",
                SIGNUP_BONUS,
                account_id
            );
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::CreditLedger;
    use crate::db::testing::memory_pool;

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let pool = memory_pool().await;
        let ledger = CreditLedger::new(pool.clone());
        let granter = SignupBonusGranter::new(pool);

        ledger.ensure_account("u1", "u1@example.com").await.unwrap();

        assert!(granter.grant_if_needed("u1").await.unwrap());
        assert!(!granter.grant_if_needed("u1").await.unwrap());

        let info = ledger.read_info("u1").await.unwrap();
        assert_eq!(info.bonus_credits, SIGNUP_BONUS);
        assert!(info.signup_bonus_given);
    }

    #[tokio::test]
    async fn test_grant_without_row_is_noop() {
        let granter = SignupBonusGranter::new(memory_pool().await);
        assert!(!granter.grant_if_needed("missing").await.unwrap());
    }
}
