/// Account-facing endpoints: credit balance view and prompt history
use crate::{
    access::CreditsRemaining,
    context::AppContext,
    db::models::PromptRecord,
    error::{ApiError, ApiResult},
    identity::{client_key, extract_bearer_token},
};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;

const HISTORY_PAGE_SIZE: i64 = 50;

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/credits", get(credits))
        .route("/api/history", get(history))
}

/// Credit balance response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub tier: &'static str,
    pub credits_remaining: CreditsRemaining,
}

/// Current balance for the caller. Anonymous callers see their pool
/// balance; accounts see the window-reset-aware combined balance; Pro
/// accounts see the unlimited sentinel. An invalid token degrades to
/// anonymous, matching the rewrite flow for ungated modes.
async fn credits(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> ApiResult<Json<CreditsResponse>> {
    if let Some(token) = extract_bearer_token(&headers) {
        if let Ok(account) = ctx.verifier.verify(&token).await {
            if ctx.tiers.is_pro(&account.id).await? {
                return Ok(Json(CreditsResponse {
                    tier: "pro",
                    credits_remaining: CreditsRemaining::Unlimited,
                }));
            }

            let available = ctx.ledger.available_balance(&account.id).await?;
            return Ok(Json(CreditsResponse {
                tier: "free",
                credits_remaining: CreditsRemaining::Limited(available),
            }));
        }
    }

    let key = client_key(&headers, Some(addr));
    let remaining = ctx.anonymous_pool.peek(&key).await;
    Ok(Json(CreditsResponse {
        tier: "anonymous",
        credits_remaining: CreditsRemaining::Limited(remaining),
    }))
}

/// History response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub records: Vec<PromptRecord>,
}

/// Recent prompt records for the authenticated caller
async fn history(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> ApiResult<Json<HistoryResponse>> {
    let token = extract_bearer_token(&headers)
        .ok_or_else(|| ApiError::Authentication("Missing authorization header".to_string()))?;
    let account = ctx.verifier.verify(&token).await?;

    let records = ctx.history.list_recent(&account.id, HISTORY_PAGE_SIZE).await?;
    Ok(Json(HistoryResponse { records }))
}
