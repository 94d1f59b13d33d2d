/// Prompt rewrite endpoints
use crate::{
    access::{CreditsRemaining, RewriteMode, RewriteRequest},
    context::AppContext,
    error::{ApiError, ApiResult},
    identity::{client_key, extract_bearer_token},
};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Build prompt rewrite routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/prompt/improve", post(improve))
        .route("/api/prompt/refine", post(refine))
        .route("/api/prompt/followup", post(followup))
}

/// Rewrite request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    #[serde(default)]
    pub original_prompt: String,
    pub previous_prompt: Option<String>,
    /// Explicit token field; the Authorization header is the fallback
    pub token: Option<String>,
}

/// Rewrite response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub success: bool,
    pub output: String,
    pub credits_remaining: CreditsRemaining,
}

async fn improve(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<PromptResponse>> {
    rewrite(ctx, RewriteMode::Improve, addr, headers, req).await
}

async fn refine(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<PromptResponse>> {
    rewrite(ctx, RewriteMode::Refine, addr, headers, req).await
}

async fn followup(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<PromptResponse>> {
    rewrite(ctx, RewriteMode::Followup, addr, headers, req).await
}

async fn rewrite(
    ctx: AppContext,
    mode: RewriteMode,
    addr: SocketAddr,
    headers: HeaderMap,
    req: PromptRequest,
) -> ApiResult<Json<PromptResponse>> {
    if req.original_prompt.trim().is_empty() {
        return Err(ApiError::Validation("originalPrompt is required".to_string()));
    }

    let token = req.token.clone().or_else(|| extract_bearer_token(&headers));
    let key = client_key(&headers, Some(addr));

    let outcome = ctx
        .access
        .handle(
            RewriteRequest {
                mode,
                original_prompt: req.original_prompt,
                previous_prompt: req.previous_prompt,
                token,
            },
            key,
        )
        .await?;

    Ok(Json(PromptResponse {
        success: true,
        output: outcome.output,
        credits_remaining: outcome.credits_remaining,
    }))
}
