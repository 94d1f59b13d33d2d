/// Background task implementations
use crate::{context::AppContext, error::ApiResult, metrics};

/// Drop anonymous pool entries idle past the configured expiry
pub async fn prune_anonymous_pool(ctx: &AppContext) -> usize {
    let pruned = ctx.anonymous_pool.prune_idle().await;
    metrics::ANONYMOUS_POOL_SIZE.set(ctx.anonymous_pool.len().await as i64);
    metrics::BACKGROUND_JOBS_TOTAL
        .with_label_values(&["anonymous_pool_prune", "ok"])
        .inc();
    pruned
}

/// Delete prompt history rows older than the retention window
pub async fn sweep_history(ctx: &AppContext) -> ApiResult<u64> {
    let days = ctx.config.credits.history_retention_days;
    let result = ctx.history.prune_older_than(days).await;

    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::BACKGROUND_JOBS_TOTAL
        .with_label_values(&["history_retention", status])
        .inc();

    result
}
