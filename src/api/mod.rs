/// HTTP API routes
use crate::context::AppContext;
use axum::Router;

pub mod account;
pub mod admin;
pub mod prompt;

/// Build all API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(prompt::routes())
        .merge(account::routes())
        .merge(admin::routes())
}
