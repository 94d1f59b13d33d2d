/// Reprompt - credit-metered prompt improvement backend
///
/// Authenticates callers, tracks consumable credit balances for anonymous,
/// free, and Pro tiers, and proxies rewrite requests to an LLM completion
/// provider.

mod access;
mod api;
mod config;
mod context;
mod credits;
mod db;
mod error;
mod history;
mod identity;
mod jobs;
mod llm;
mod metrics;
mod rate_limit;
mod server;

use config::ServerConfig;
use context::AppContext;
use error::ApiResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reprompt=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}
