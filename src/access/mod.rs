/// Access control and credit reservation for prompt-rewrite requests.
///
/// Every request walks one explicit path: resolve identity, apply
/// mode-specific gating, reserve the mode's credit cost, call the
/// completion provider, then best-effort history. Reservation is the point
/// of no return: a provider failure after a successful reservation does
/// not refund credits.
use crate::{
    credits::{AnonymousCreditPool, CreditLedger, SignupBonusGranter, TierResolver},
    error::{ApiError, ApiResult},
    history::HistoryStore,
    identity::{TokenVerifier, VerifiedAccount},
    llm::{prompts, Generator},
    metrics,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The three rewrite modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    Improve,
    Refine,
    Followup,
}

impl RewriteMode {
    /// Credit cost of one operation in this mode
    pub fn cost(self) -> i64 {
        match self {
            RewriteMode::Improve => 1,
            RewriteMode::Refine => 1,
            RewriteMode::Followup => 2,
        }
    }

    /// Gated modes require a verified Pro account
    pub fn is_gated(self) -> bool {
        matches!(self, RewriteMode::Followup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RewriteMode::Improve => "improve",
            RewriteMode::Refine => "refine",
            RewriteMode::Followup => "followup",
        }
    }
}

/// A prompt-rewrite request as seen by the access controller
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub mode: RewriteMode,
    pub original_prompt: String,
    /// Only meaningful for follow-up mode
    pub previous_prompt: Option<String>,
    /// Explicit token field or bearer header, already merged by the caller
    pub token: Option<String>,
}

/// Post-reservation balance reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditsRemaining {
    Limited(i64),
    /// Pro accounts bypass balance checks entirely
    Unlimited,
}

impl Serialize for CreditsRemaining {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CreditsRemaining::Limited(n) => serializer.serialize_i64(*n),
            CreditsRemaining::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Successful terminal outcome of a rewrite request
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub output: String,
    pub credits_remaining: CreditsRemaining,
}

/// Resolved caller identity
#[derive(Debug, Clone)]
enum Identity {
    Anonymous { key: String },
    Account(VerifiedAccount),
}

/// Orchestrates identity resolution, tier gating, credit reservation, and
/// the generation call for every rewrite request.
pub struct AccessController {
    verifier: Arc<dyn TokenVerifier>,
    generator: Arc<dyn Generator>,
    anonymous: Arc<AnonymousCreditPool>,
    ledger: Arc<CreditLedger>,
    granter: Arc<SignupBonusGranter>,
    tiers: Arc<TierResolver>,
    history: Arc<HistoryStore>,
}

impl AccessController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        generator: Arc<dyn Generator>,
        anonymous: Arc<AnonymousCreditPool>,
        ledger: Arc<CreditLedger>,
        granter: Arc<SignupBonusGranter>,
        tiers: Arc<TierResolver>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            verifier,
            generator,
            anonymous,
            ledger,
            granter,
            tiers,
            history,
        }
    }

    /// Handle one rewrite request end to end.
    ///
    /// `client_key` identifies the caller when no verified account is
    /// present; it is derived from request metadata by the HTTP layer.
    pub async fn handle(
        &self,
        request: RewriteRequest,
        client_key: String,
    ) -> ApiResult<RewriteOutcome> {
        let mode = request.mode;
        metrics::REWRITE_REQUESTS_TOTAL
            .with_label_values(&[mode.as_str()])
            .inc();

        let prompt = request.original_prompt.trim().to_string();
        if prompt.is_empty() {
            return self.deny(mode, ApiError::Validation("Prompt cannot be empty".to_string()));
        }

        let identity = match self.resolve_identity(&request, client_key).await {
            Ok(identity) => identity,
            Err(err) => return self.deny(mode, err),
        };

        // Tier gating happens before any balance check or mutation
        let is_pro = match &identity {
            Identity::Anonymous { .. } => false,
            Identity::Account(account) => self.tiers.is_pro(&account.id).await?,
        };
        if mode.is_gated() && !is_pro {
            return self.deny(
                mode,
                ApiError::Authorization(
                    "Follow-up mode requires a Pro subscription".to_string(),
                ),
            );
        }

        let credits_remaining = match self.reserve(&identity, is_pro, mode.cost()).await {
            Ok(remaining) => remaining,
            Err(err) => return self.deny(mode, err),
        };

        // Point of no return: credits stay spent even if generation fails
        let system_prompt = prompts::system_prompt(mode);
        let user_turn = prompts::user_turn(mode, &prompt, request.previous_prompt.as_deref());
        let output = self.generator.generate(system_prompt, &user_turn).await?;

        if let Identity::Account(account) = &identity {
            // Best-effort: a history failure never surfaces to the caller
            if let Err(e) = self.history.append(&account.id, &prompt, &output).await {
                tracing::warn!(
                    "Failed to append prompt history for account {}: {}",
                    account.id,
                    e
                );
            }
        }

        Ok(RewriteOutcome {
            output,
            credits_remaining,
        })
    }

    /// Resolve the caller's identity per the degradation rules: no token
    /// means anonymous; a token that fails verification degrades to
    /// anonymous for ungated modes and is a hard denial for gated ones.
    async fn resolve_identity(
        &self,
        request: &RewriteRequest,
        client_key: String,
    ) -> ApiResult<Identity> {
        let token = match &request.token {
            Some(token) if !token.trim().is_empty() => token,
            _ => {
                if request.mode.is_gated() {
                    return Err(ApiError::Authentication(
                        "Follow-up mode requires authentication".to_string(),
                    ));
                }
                return Ok(Identity::Anonymous { key: client_key });
            }
        };

        match self.verifier.verify(token).await {
            Ok(account) => Ok(Identity::Account(account)),
            Err(err) => {
                if request.mode.is_gated() {
                    Err(err)
                } else {
                    tracing::debug!("Token verification failed, degrading to anonymous");
                    Ok(Identity::Anonymous { key: client_key })
                }
            }
        }
    }

    /// Reserve the operation's cost against the caller's credit source
    async fn reserve(
        &self,
        identity: &Identity,
        is_pro: bool,
        cost: i64,
    ) -> ApiResult<CreditsRemaining> {
        match identity {
            Identity::Anonymous { key } => {
                let remaining = self.anonymous.reserve(key, cost).await?;
                metrics::CREDITS_SPENT_TOTAL
                    .with_label_values(&["anonymous"])
                    .inc_by(cost as u64);
                Ok(CreditsRemaining::Limited(remaining))
            }
            Identity::Account(_) if is_pro => Ok(CreditsRemaining::Unlimited),
            Identity::Account(account) => {
                self.ledger.ensure_account(&account.id, &account.email).await?;

                // Best-effort signup bonus refresh; a failure here must not
                // block the request
                if let Err(e) = self.granter.grant_if_needed(&account.id).await {
                    tracing::warn!(
                        "Signup bonus check failed for account {}: {}",
                        account.id,
                        e
                    );
                }

                let deduction = self.ledger.deduct(&account.id, cost).await?;
                metrics::CREDITS_SPENT_TOTAL
                    .with_label_values(&[match deduction.source {
                        crate::credits::DeductionSource::Daily => "daily",
                        crate::credits::DeductionSource::Mixed => "mixed",
                    }])
                    .inc_by(cost as u64);
                Ok(CreditsRemaining::Limited(deduction.remaining_total()))
            }
        }
    }

    fn deny<T>(&self, mode: RewriteMode, err: ApiError) -> ApiResult<T> {
        let reason = match &err {
            ApiError::Validation(_) => "invalid_request",
            ApiError::Authentication(_) => "auth_required",
            ApiError::Authorization(_) => "pro_required",
            ApiError::InsufficientCredits { .. } => "insufficient_credits",
            _ => "internal",
        };
        metrics::REWRITE_DENIALS_TOTAL
            .with_label_values(&[mode.as_str(), reason])
            .inc();
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::{AnonymousPoolConfig, ANONYMOUS_ALLOWANCE, DAILY_ALLOWANCE, SIGNUP_BONUS};
    use crate::db::testing::memory_pool;
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Verifier backed by a fixed token table
    struct MockVerifier {
        accounts: HashMap<String, VerifiedAccount>,
    }

    impl MockVerifier {
        fn new(tokens: &[(&str, &str)]) -> Self {
            let accounts = tokens
                .iter()
                .map(|(token, id)| {
                    (
                        token.to_string(),
                        VerifiedAccount {
                            id: id.to_string(),
                            email: format!("{}@example.com", id),
                        },
                    )
                })
                .collect();
            Self { accounts }
        }
    }

    #[async_trait]
    impl TokenVerifier for MockVerifier {
        async fn verify(&self, token: &str) -> ApiResult<VerifiedAccount> {
            self.accounts
                .get(token)
                .cloned()
                .ok_or_else(|| ApiError::Authentication("Invalid or expired token".to_string()))
        }
    }

    /// Generator that either echoes or fails, counting invocations
    struct MockGenerator {
        fail: bool,
        calls: AtomicUsize,
    }

    impl MockGenerator {
        fn ok() -> Self {
            Self {
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Generator for MockGenerator {
        async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> ApiResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ApiError::Generation("provider unavailable".to_string()))
            } else {
                Ok(format!("rewritten: {}", user_prompt))
            }
        }
    }

    struct Harness {
        controller: AccessController,
        pool: SqlitePool,
        anonymous: Arc<AnonymousCreditPool>,
    }

    async fn harness(tokens: &[(&str, &str)], generator: MockGenerator) -> Harness {
        let pool = memory_pool().await;
        let anonymous = Arc::new(AnonymousCreditPool::new(AnonymousPoolConfig::default()));
        let controller = AccessController::new(
            Arc::new(MockVerifier::new(tokens)),
            Arc::new(generator),
            Arc::clone(&anonymous),
            Arc::new(CreditLedger::new(pool.clone())),
            Arc::new(SignupBonusGranter::new(pool.clone())),
            Arc::new(TierResolver::new(pool.clone())),
            Arc::new(HistoryStore::new(pool.clone())),
        );
        Harness {
            controller,
            pool,
            anonymous,
        }
    }

    fn request(mode: RewriteMode, token: Option<&str>) -> RewriteRequest {
        RewriteRequest {
            mode,
            original_prompt: "write a poem about rust".to_string(),
            previous_prompt: None,
            token: token.map(|t| t.to_string()),
        }
    }

    async fn credit_row(pool: &SqlitePool, id: &str) -> Option<(i64, i64, bool)> {
        use sqlx::Row;
        sqlx::query(
            "SELECT bonus_credits, daily_credits_used, signup_bonus_given FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .unwrap()
        .map(|r| {
            (
                r.get("bonus_credits"),
                r.get("daily_credits_used"),
                r.get("signup_bonus_given"),
            )
        })
    }

    async fn make_pro(pool: &SqlitePool, id: &str, bonus: i64) {
        sqlx::query(
            "INSERT INTO users (id, email, is_pro, bonus_credits, created_at)
             VALUES (?1, '', 1, ?2, ?3)",
        )
        .bind(id)
        .bind(bonus)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_anonymous_improve_decrements_pool() {
        let h = harness(&[], MockGenerator::ok()).await;

        let outcome = h
            .controller
            .handle(request(RewriteMode::Improve, None), "1.2.3.4".to_string())
            .await
            .unwrap();

        assert_eq!(
            outcome.credits_remaining,
            CreditsRemaining::Limited(ANONYMOUS_ALLOWANCE - 1)
        );
        assert!(outcome.output.starts_with("rewritten:"));
    }

    #[tokio::test]
    async fn test_anonymous_exhaustion_denies_with_402() {
        let h = harness(&[], MockGenerator::ok()).await;
        h.anonymous.reserve("1.2.3.4", ANONYMOUS_ALLOWANCE).await.unwrap();

        let err = h
            .controller
            .handle(request(RewriteMode::Improve, None), "1.2.3.4".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientCredits { available: 0 }));
    }

    #[tokio::test]
    async fn test_blank_prompt_is_rejected() {
        let h = harness(&[], MockGenerator::ok()).await;
        let mut req = request(RewriteMode::Improve, None);
        req.original_prompt = "   ".to_string();

        let err = h.controller.handle(req, "1.2.3.4".to_string()).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        // No balance was touched
        assert_eq!(h.anonymous.peek("1.2.3.4").await, ANONYMOUS_ALLOWANCE);
    }

    #[tokio::test]
    async fn test_invalid_token_degrades_to_anonymous_for_improve() {
        let h = harness(&[("good", "u1")], MockGenerator::ok()).await;

        let outcome = h
            .controller
            .handle(
                request(RewriteMode::Improve, Some("bad-token")),
                "1.2.3.4".to_string(),
            )
            .await
            .unwrap();

        // Anonymous path, never a 401
        assert_eq!(
            outcome.credits_remaining,
            CreditsRemaining::Limited(ANONYMOUS_ALLOWANCE - 1)
        );
        // No account row was created for anyone
        assert!(credit_row(&h.pool, "u1").await.is_none());
    }

    #[tokio::test]
    async fn test_authenticated_first_request_gets_signup_bonus() {
        let h = harness(&[("tok", "u1")], MockGenerator::ok()).await;

        let outcome = h
            .controller
            .handle(request(RewriteMode::Improve, Some("tok")), "1.2.3.4".to_string())
            .await
            .unwrap();

        // Fresh account: 3 daily + 10 bonus - 1 spent = 12
        assert_eq!(
            outcome.credits_remaining,
            CreditsRemaining::Limited(DAILY_ALLOWANCE + SIGNUP_BONUS - 1)
        );
        let (bonus, used, given) = credit_row(&h.pool, "u1").await.unwrap();
        assert_eq!(bonus, SIGNUP_BONUS);
        assert_eq!(used, 1);
        assert!(given);
    }

    #[tokio::test]
    async fn test_signup_bonus_not_granted_twice() {
        let h = harness(&[("tok", "u1")], MockGenerator::ok()).await;

        for _ in 0..2 {
            h.controller
                .handle(request(RewriteMode::Improve, Some("tok")), "1.2.3.4".to_string())
                .await
                .unwrap();
        }

        let (bonus, used, _) = credit_row(&h.pool, "u1").await.unwrap();
        assert_eq!(bonus, SIGNUP_BONUS);
        assert_eq!(used, 2);
    }

    #[tokio::test]
    async fn test_followup_without_token_is_401_with_no_mutation() {
        let h = harness(&[], MockGenerator::ok()).await;

        let err = h
            .controller
            .handle(request(RewriteMode::Followup, None), "1.2.3.4".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Authentication(_)));
        // Pool entry was never created, let alone charged
        assert_eq!(h.anonymous.len().await, 0);
    }

    #[tokio::test]
    async fn test_followup_with_invalid_token_is_401_not_anonymous() {
        let h = harness(&[("good", "u1")], MockGenerator::ok()).await;

        let err = h
            .controller
            .handle(
                request(RewriteMode::Followup, Some("bad")),
                "1.2.3.4".to_string(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Authentication(_)));
        assert_eq!(h.anonymous.len().await, 0);
    }

    #[tokio::test]
    async fn test_followup_non_pro_is_403_with_no_mutation() {
        let h = harness(&[("tok", "u1")], MockGenerator::ok()).await;

        let err = h
            .controller
            .handle(request(RewriteMode::Followup, Some("tok")), "1.2.3.4".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Authorization(_)));
        // Denied before any ledger write: no row exists yet
        assert!(credit_row(&h.pool, "u1").await.is_none());
    }

    #[tokio::test]
    async fn test_followup_pro_bypasses_balances() {
        let h = harness(&[("tok", "pro-1")], MockGenerator::ok()).await;
        make_pro(&h.pool, "pro-1", 2).await;

        let outcome = h
            .controller
            .handle(request(RewriteMode::Followup, Some("tok")), "1.2.3.4".to_string())
            .await
            .unwrap();

        assert_eq!(outcome.credits_remaining, CreditsRemaining::Unlimited);
        // Balance fields untouched, signup bonus not granted
        let (bonus, used, given) = credit_row(&h.pool, "pro-1").await.unwrap();
        assert_eq!(bonus, 2);
        assert_eq!(used, 0);
        assert!(!given);
    }

    #[tokio::test]
    async fn test_pro_improve_skips_reservation() {
        let h = harness(&[("tok", "pro-1")], MockGenerator::ok()).await;
        make_pro(&h.pool, "pro-1", 0).await;

        let outcome = h
            .controller
            .handle(request(RewriteMode::Improve, Some("tok")), "1.2.3.4".to_string())
            .await
            .unwrap();
        assert_eq!(outcome.credits_remaining, CreditsRemaining::Unlimited);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_deduction() {
        let h = harness(&[("tok", "u1")], MockGenerator::failing()).await;

        let err = h
            .controller
            .handle(request(RewriteMode::Improve, Some("tok")), "1.2.3.4".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Generation(_)));
        // Credits stay spent: 1 daily unit consumed
        let (_, used, _) = credit_row(&h.pool, "u1").await.unwrap();
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn test_anonymous_generation_failure_keeps_pool_deduction() {
        let h = harness(&[], MockGenerator::failing()).await;

        let err = h
            .controller
            .handle(request(RewriteMode::Improve, None), "1.2.3.4".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Generation(_)));
        assert_eq!(h.anonymous.peek("1.2.3.4").await, ANONYMOUS_ALLOWANCE - 1);
    }

    #[tokio::test]
    async fn test_history_written_for_accounts_only() {
        let h = harness(&[("tok", "u1")], MockGenerator::ok()).await;
        let history = HistoryStore::new(h.pool.clone());

        h.controller
            .handle(request(RewriteMode::Improve, None), "1.2.3.4".to_string())
            .await
            .unwrap();
        h.controller
            .handle(request(RewriteMode::Improve, Some("tok")), "1.2.3.4".to_string())
            .await
            .unwrap();

        let records = history.list_recent("u1", 10).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_cost_table() {
        assert_eq!(RewriteMode::Improve.cost(), 1);
        assert_eq!(RewriteMode::Refine.cost(), 1);
        assert_eq!(RewriteMode::Followup.cost(), 2);
    }

    #[test]
    fn test_only_followup_is_gated() {
        assert!(!RewriteMode::Improve.is_gated());
        assert!(!RewriteMode::Refine.is_gated());
        assert!(RewriteMode::Followup.is_gated());
    }

    #[test]
    fn test_credits_remaining_serialization() {
        let limited = serde_json::to_value(CreditsRemaining::Limited(4)).unwrap();
        assert_eq!(limited, serde_json::json!(4));

        let unlimited = serde_json::to_value(CreditsRemaining::Unlimited).unwrap();
        assert_eq!(unlimited, serde_json::json!("unlimited"));
    }
}
