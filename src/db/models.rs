/// Database models for the Reprompt backend
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Prompt history record, append-only, authenticated users only
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub user_id: String,
    pub input_text: String,
    pub output_text: String,
    pub created_at: DateTime<Utc>,
}
