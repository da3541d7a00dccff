use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Dream {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub enhanced_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DreamAnalysisRow {
    pub id: Uuid,
    pub dream_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub themes: Vec<String>,
    pub symbols: Vec<String>,
    pub emotions: Vec<String>,
    pub interpretation: String,
    pub created_at: DateTime<Utc>,
}
