use crate::{
    dtos::dream::DreamAnalysisCreateRequest,
    models::dream::{Dream, DreamAnalysisRow},
};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

pub async fn get_dream<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    dream_id: Uuid,
) -> Res<Option<Dream>> {
    sqlx::query_as::<_, Dream>("SELECT * FROM dreams WHERE id = $1")
        .bind(dream_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn set_image<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    dream_id: Uuid,
    image_url: &str,
    enhanced_description: &str,
) -> Res<()> {
    let result = sqlx::query(
        "UPDATE dreams SET image_url = $2, enhanced_description = $3 WHERE id = $1",
    )
    .bind(dream_id)
    .bind(image_url)
    .bind(enhanced_description)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Dream {} not found", dream_id)));
    }
    Ok(())
}

pub async fn insert_analysis<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: DreamAnalysisCreateRequest,
) -> Res<DreamAnalysisRow> {
    sqlx::query_as::<_, DreamAnalysisRow>(
        r#"
        INSERT INTO dream_analyses (dream_id, user_id, rating, themes, symbols, emotions, interpretation)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(data.dream_id)
    .bind(data.user_id)
    .bind(data.rating)
    .bind(data.themes)
    .bind(data.symbols)
    .bind(data.emotions)
    .bind(data.interpretation)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}
