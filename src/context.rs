/// Application context and dependency injection
use crate::{
    access::AccessController,
    config::ServerConfig,
    credits::{
        AnonymousCreditPool, AnonymousPoolConfig, CreditLedger, SignupBonusGranter, TierResolver,
    },
    db,
    error::ApiResult,
    history::HistoryStore,
    identity::{JwtVerifier, TokenVerifier},
    llm::{Generator, OpenAiGenerator},
    rate_limit::{RateLimitConfig, RateLimiter},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub verifier: Arc<dyn TokenVerifier>,
    pub anonymous_pool: Arc<AnonymousCreditPool>,
    pub ledger: Arc<CreditLedger>,
    pub tiers: Arc<TierResolver>,
    pub history: Arc<HistoryStore>,
    pub access: Arc<AccessController>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize database
        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(JwtVerifier::new(config.authentication.jwt_secret.clone()));
        let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::new(config.llm.clone()));

        let anonymous_pool = Arc::new(AnonymousCreditPool::new(AnonymousPoolConfig {
            max_entries: config.credits.anonymous_max_entries,
            idle_expiry: Duration::from_secs(config.credits.anonymous_idle_expiry_secs),
        }));
        let ledger = Arc::new(CreditLedger::new(pool.clone()));
        let granter = Arc::new(SignupBonusGranter::new(pool.clone()));
        let tiers = Arc::new(TierResolver::new(pool.clone()));
        let history = Arc::new(HistoryStore::new(pool.clone()));

        let access = Arc::new(AccessController::new(
            Arc::clone(&verifier),
            generator,
            Arc::clone(&anonymous_pool),
            Arc::clone(&ledger),
            granter,
            Arc::clone(&tiers),
            Arc::clone(&history),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            authenticated_rps: config.rate_limit.authenticated_rps,
            unauthenticated_rps: config.rate_limit.unauthenticated_rps,
            burst_size: config.rate_limit.burst_size,
        }));

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            verifier,
            anonymous_pool,
            ledger,
            tiers,
            history,
            access,
            rate_limiter,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
