/// Administrative endpoints. Credit top-ups are an out-of-band grant path,
/// never part of the rewrite flow; access is restricted to the account ids
/// configured as admins.
use crate::{
    context::AppContext,
    error::{ApiError, ApiResult},
    identity::extract_bearer_token,
};
use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/admin/credits/add", post(add_credits))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsRequest {
    pub account_id: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsResponse {
    pub account_id: String,
    pub bonus_credits: i64,
}

async fn add_credits(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<AddCreditsRequest>,
) -> ApiResult<Json<AddCreditsResponse>> {
    let token = extract_bearer_token(&headers)
        .ok_or_else(|| ApiError::Authentication("Missing authorization header".to_string()))?;
    let caller = ctx.verifier.verify(&token).await?;

    if !ctx.config.authentication.admin_ids.contains(&caller.id) {
        tracing::warn!("Non-admin account {} attempted a credit top-up", caller.id);
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    if req.account_id.trim().is_empty() {
        return Err(ApiError::Validation("accountId is required".to_string()));
    }

    let bonus_credits = ctx.ledger.add_bonus(&req.account_id, req.amount).await?;
    Ok(Json(AddCreditsResponse {
        account_id: req.account_id,
        bonus_credits,
    }))
}
