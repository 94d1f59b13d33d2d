/// Per-account credit ledger.
///
/// Every registered account draws from two sources: a daily allowance that
/// replenishes once the 24-hour window elapses, and a non-expiring bonus
/// pool. Deductions consume the daily allowance first and draw any
/// shortfall from bonus credits, persisting both counters in a single
/// statement guarded by a compare-and-set so concurrent deductions against
/// one account cannot double-spend.
use crate::credits::DAILY_ALLOWANCE;
use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Retry budget for the optimistic deduction update
const DEDUCT_MAX_ATTEMPTS: u32 = 5;

/// Snapshot of an account's credit fields
#[derive(Debug, Clone, Default)]
pub struct CreditInfo {
    pub bonus_credits: i64,
    pub daily_credits_used: i64,
    pub daily_reset_at: Option<DateTime<Utc>>,
    pub signup_bonus_given: bool,
}

impl CreditInfo {
    /// Credits still available in the current daily window
    pub fn daily_available(&self) -> i64 {
        (DAILY_ALLOWANCE - self.daily_credits_used).max(0)
    }

    /// Total credits available across both sources
    pub fn available_balance(&self) -> i64 {
        self.daily_available() + self.bonus_credits
    }
}

/// Which source(s) a deduction drew from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeductionSource {
    /// Fully covered by the daily allowance
    Daily,
    /// Bonus credits were also consumed
    Mixed,
}

/// Outcome of a successful deduction
#[derive(Debug, Clone)]
pub struct Deduction {
    pub remaining_bonus: i64,
    pub remaining_daily: i64,
    pub source: DeductionSource,
}

impl Deduction {
    pub fn remaining_total(&self) -> i64 {
        self.remaining_bonus + self.remaining_daily
    }
}

/// Credit ledger service
pub struct CreditLedger {
    db: SqlitePool,
}

impl CreditLedger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a fresh free-account row if none exists. A missing row is
    /// treated as a fresh free account everywhere, so this only matters
    /// before the first mutation.
    pub async fn ensure_account(&self, account_id: &str, email: &str) -> ApiResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO users (id, email, created_at, daily_reset_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(account_id)
        .bind(email)
        .bind(now)
        .bind(now + Duration::hours(24))
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        Ok(())
    }

    /// Read an account's credit fields. A missing row reads as all-zero
    /// defaults rather than an error.
    pub async fn read_info(&self, account_id: &str) -> ApiResult<CreditInfo> {
        let row = sqlx::query(
            "SELECT bonus_credits, daily_credits_used, daily_reset_at, signup_bonus_given
             FROM users WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await
        .map_err(ApiError::Database)?;

        match row {
            Some(row) => Ok(CreditInfo {
                bonus_credits: row.get("bonus_credits"),
                daily_credits_used: row.get("daily_credits_used"),
                daily_reset_at: row.get("daily_reset_at"),
                signup_bonus_given: row.get("signup_bonus_given"),
            }),
            None => Ok(CreditInfo::default()),
        }
    }

    /// Roll the daily window if it has expired: zero the usage counter and
    /// push the deadline out 24 hours. Returns true when a reset happened.
    ///
    /// The reset is deliberately independent of any deduction that follows
    /// it in the same request: it only zeroes usage and extends the
    /// deadline, never reduces available balance, so it is kept even when
    /// the deduction then fails.
    pub async fn reset_window_if_expired(&self, account_id: &str) -> ApiResult<bool> {
        let info = self.read_info(account_id).await?;

        let expired = match info.daily_reset_at {
            None => true,
            Some(reset_at) => Utc::now() >= reset_at,
        };
        if !expired {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE users SET daily_credits_used = 0, daily_reset_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now() + Duration::hours(24))
        .bind(account_id)
        .execute(&self.db)
        .await
        .map_err(ApiError::Database)?;

        tracing::debug!("Reset daily window for account {}", account_id);
        Ok(true)
    }

    /// Reset-aware available balance, used by the read-only credits view
    pub async fn available_balance(&self, account_id: &str) -> ApiResult<i64> {
        self.reset_window_if_expired(account_id).await?;
        let info = self.read_info(account_id).await?;
        Ok(info.available_balance())
    }

    /// Atomically reserve `cost` credits for an account.
    ///
    /// Draw order: the daily allowance first, any shortfall from bonus
    /// credits. Fails with `InsufficientCredits` (no mutation) when the
    /// combined balance is below the cost. Never applicable to Pro
    /// accounts; callers check tier first.
    pub async fn deduct(&self, account_id: &str, cost: i64) -> ApiResult<Deduction> {
        if cost <= 0 {
            return Err(ApiError::Validation("Deduction cost must be positive".to_string()));
        }

        for _ in 0..DEDUCT_MAX_ATTEMPTS {
            self.reset_window_if_expired(account_id).await?;
            let info = self.read_info(account_id).await?;

            let daily_available = info.daily_available();
            let total = daily_available + info.bonus_credits;
            if total < cost {
                return Err(ApiError::InsufficientCredits { available: total });
            }

            let from_daily = cost.min(daily_available);
            let from_bonus = cost - from_daily;
            let new_used = info.daily_credits_used + from_daily;
            let new_bonus = info.bonus_credits - from_bonus;

            // Compare-and-set on both counters; a concurrent deduction or
            // top-up between the read and this update makes it a no-op and
            // we re-read.
            let result = sqlx::query(
                "UPDATE users SET daily_credits_used = ?1, bonus_credits = ?2
                 WHERE id = ?3 AND daily_credits_used = ?4 AND bonus_credits = ?5",
            )
            .bind(new_used)
            .bind(new_bonus)
            .bind(account_id)
            .bind(info.daily_credits_used)
            .bind(info.bonus_credits)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

            if result.rows_affected() == 1 {
                let source = if from_bonus == 0 {
                    DeductionSource::Daily
                } else {
                    DeductionSource::Mixed
                };
                return Ok(Deduction {
                    remaining_bonus: new_bonus,
                    remaining_daily: daily_available - from_daily,
                    source,
                });
            }

            tracing::debug!(
                "Deduction for account {} lost a concurrent update, retrying",
                account_id
            );
        }

        Err(ApiError::Internal(format!(
            "Credit deduction for account {} exhausted {} attempts under contention",
            account_id, DEDUCT_MAX_ATTEMPTS
        )))
    }

    /// Administrative top-up: unconditional additive increment to the
    /// bonus pool. Not used by the prompt-rewrite flow itself.
    pub async fn add_bonus(&self, account_id: &str, amount: i64) -> ApiResult<i64> {
        if amount <= 0 {
            return Err(ApiError::Validation(
                "Top-up amount must be a positive integer".to_string(),
            ));
        }

        self.ensure_account(account_id, "").await?;

        sqlx::query("UPDATE users SET bonus_credits = bonus_credits + ?1 WHERE id = ?2")
            .bind(amount)
            .bind(account_id)
            .execute(&self.db)
            .await
            .map_err(ApiError::Database)?;

        let info = self.read_info(account_id).await?;
        tracing::info!(
            "Added {} bonus credits to account {} (now {})",
            amount,
            account_id,
            info.bonus_credits
        );
        Ok(info.bonus_credits)
    }
}
