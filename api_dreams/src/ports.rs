use std::sync::Arc;

use async_trait::async_trait;
use classifier::DreamAnalysis;
use common::{error::Res, misc::UsageKind};
use db::dtos::dream::DreamAnalysisCreateRequest;
use sqlx::PgPool;
use uuid::Uuid;

/// Persistence used by the edge functions.
#[async_trait]
pub trait DreamStore: Send + Sync {
    /// Owner of the dream, `None` when it does not exist.
    async fn dream_owner(&self, dream_id: Uuid) -> Res<Option<Uuid>>;

    async fn save_analysis(
        &self,
        user_id: Uuid,
        dream_id: Uuid,
        analysis: &DreamAnalysis,
    ) -> Res<()>;

    async fn set_image(&self, dream_id: Uuid, image_url: &str, enhanced: &str) -> Res<()>;

    async fn record_usage(&self, user_id: Uuid, kind: UsageKind) -> Res<()>;
}

pub struct PgDreamStore {
    pool: Arc<PgPool>,
}

impl PgDreamStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        PgDreamStore { pool }
    }
}

#[async_trait]
impl DreamStore for PgDreamStore {
    async fn dream_owner(&self, dream_id: Uuid) -> Res<Option<Uuid>> {
        let dream = db::dream::get_dream(&*self.pool, dream_id).await?;
        Ok(dream.map(|d| d.user_id))
    }

    async fn save_analysis(
        &self,
        user_id: Uuid,
        dream_id: Uuid,
        analysis: &DreamAnalysis,
    ) -> Res<()> {
        let row = db::dream::insert_analysis(
            &*self.pool,
            DreamAnalysisCreateRequest {
                dream_id,
                user_id,
                rating: i16::from(analysis.rating),
                themes: analysis.themes.clone(),
                symbols: analysis.symbols.clone(),
                emotions: analysis.emotions.clone(),
                interpretation: analysis.interpretation.clone(),
            },
        )
        .await?;
        log::debug!("Stored analysis {} for dream {}", row.id, dream_id);
        Ok(())
    }

    async fn set_image(&self, dream_id: Uuid, image_url: &str, enhanced: &str) -> Res<()> {
        db::dream::set_image(&*self.pool, dream_id, image_url, enhanced).await
    }

    async fn record_usage(&self, user_id: Uuid, kind: UsageKind) -> Res<()> {
        db::usage::insert_usage(&*self.pool, user_id, kind).await
    }
}
