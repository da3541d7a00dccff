use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    misc::UsageKind,
};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

/// Number of metered calls of `kind` made by the user at or after `since`.
pub async fn count_since<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    kind: UsageKind,
    since: DateTime<Utc>,
) -> Res<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM usage_logs WHERE user_id = $1 AND kind = $2 AND created_at >= $3",
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(since)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn insert_usage<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    kind: UsageKind,
) -> Res<()> {
    sqlx::query("INSERT INTO usage_logs (user_id, kind) VALUES ($1, $2)")
        .bind(user_id)
        .bind(kind.as_str())
        .execute(executor)
        .await?;
    Ok(())
}
