use crate::{dtos::subscription::SubscriptionUpsert, models::subscription::SubscriptionRecord};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

pub async fn get_by_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<SubscriptionRecord>> {
    sqlx::query_as::<_, SubscriptionRecord>("SELECT * FROM subscriptions WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_by_customer<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    customer_id: &str,
) -> Res<Option<SubscriptionRecord>> {
    sqlx::query_as::<_, SubscriptionRecord>(
        "SELECT * FROM subscriptions WHERE stripe_customer_id = $1",
    )
    .bind(customer_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}

/// Links a Stripe customer to the user, creating the row on first use.
pub async fn set_customer_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    customer_id: &str,
) -> Res<()> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (user_id, stripe_customer_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET stripe_customer_id = EXCLUDED.stripe_customer_id, updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(customer_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn upsert_from_billing<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    data: SubscriptionUpsert,
) -> Res<SubscriptionRecord> {
    sqlx::query_as::<_, SubscriptionRecord>(
        r#"
        INSERT INTO subscriptions (user_id, stripe_customer_id, stripe_subscription_id, status,
                                   plan_name, current_period_end, cancel_at_period_end, canceled_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id) DO UPDATE SET
            stripe_customer_id = EXCLUDED.stripe_customer_id,
            stripe_subscription_id = EXCLUDED.stripe_subscription_id,
            status = EXCLUDED.status,
            plan_name = EXCLUDED.plan_name,
            current_period_end = EXCLUDED.current_period_end,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end,
            canceled_at = EXCLUDED.canceled_at,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(data.user_id)
    .bind(data.stripe_customer_id)
    .bind(data.stripe_subscription_id)
    .bind(data.status)
    .bind(data.plan_name)
    .bind(data.current_period_end)
    .bind(data.cancel_at_period_end)
    .bind(data.canceled_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

/// Flips the cancel flag ahead of the provider confirming it.
pub async fn set_cancel_at_period_end<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    cancel_at_period_end: bool,
) -> Res<Option<SubscriptionRecord>> {
    sqlx::query_as::<_, SubscriptionRecord>(
        r#"
        UPDATE subscriptions
        SET cancel_at_period_end = $2, updated_at = NOW()
        WHERE user_id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(cancel_at_period_end)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}
