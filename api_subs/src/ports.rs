use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    misc::UsageKind,
    stripe::parse_customer_id,
};
use db::models::subscription::SubscriptionRecord;
use sqlx::PgPool;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, Client,
    CreateBillingPortalSession, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    ListSubscriptions, Subscription, SubscriptionId, SubscriptionStatusFilter, UpdateSubscription,
};
use uuid::Uuid;

use crate::{
    dtos::sub::CheckoutRequest,
    models::sub::{BillingStatus, LiveBilling},
};

/// Persistent subscription and usage data.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn subscription(&self, user_id: Uuid) -> Res<Option<SubscriptionRecord>>;

    async fn usage_since(&self, user_id: Uuid, kind: UsageKind, since: DateTime<Utc>)
    -> Res<i64>;

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> Res<()>;

    async fn set_cancel_at_period_end(
        &self,
        user_id: Uuid,
        cancel_at_period_end: bool,
    ) -> Res<Option<SubscriptionRecord>>;
}

pub struct PgSubscriptionSource {
    pool: Arc<PgPool>,
}

impl PgSubscriptionSource {
    pub fn new(pool: Arc<PgPool>) -> Self {
        PgSubscriptionSource { pool }
    }
}

#[async_trait]
impl SubscriptionSource for PgSubscriptionSource {
    async fn subscription(&self, user_id: Uuid) -> Res<Option<SubscriptionRecord>> {
        db::subscription::get_by_user(&*self.pool, user_id).await
    }

    async fn usage_since(
        &self,
        user_id: Uuid,
        kind: UsageKind,
        since: DateTime<Utc>,
    ) -> Res<i64> {
        db::usage::count_since(&*self.pool, user_id, kind, since).await
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> Res<()> {
        db::subscription::set_customer_id(&*self.pool, user_id, customer_id).await
    }

    async fn set_cancel_at_period_end(
        &self,
        user_id: Uuid,
        cancel_at_period_end: bool,
    ) -> Res<Option<SubscriptionRecord>> {
        db::subscription::set_cancel_at_period_end(&*self.pool, user_id, cancel_at_period_end)
            .await
    }
}

/// The billing provider, source of truth for subscription status.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Latest subscription of the customer, if any.
    async fn live_status(&self, customer_id: &str) -> Res<Option<LiveBilling>>;

    /// Creates a customer and returns its id.
    async fn create_customer(&self, email: &str) -> Res<String>;

    async fn checkout_url(
        &self,
        user_id: Uuid,
        customer_id: &str,
        req: &CheckoutRequest,
    ) -> Res<String>;

    async fn portal_url(&self, customer_id: &str, return_url: &str) -> Res<String>;

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Res<LiveBilling>;
}

pub struct StripeBilling {
    client: Client,
}

impl StripeBilling {
    pub fn new(client: Client) -> Self {
        StripeBilling { client }
    }
}

fn timestamp(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

/// Flattens a Stripe subscription into the fields reconciliation needs.
pub fn live_billing(subscription: &Subscription) -> LiveBilling {
    LiveBilling {
        status: BillingStatus::parse(subscription.status.as_str()),
        cancel_at_period_end: subscription.cancel_at_period_end,
        current_period_end: timestamp(subscription.current_period_end),
        canceled_at: subscription.canceled_at.and_then(timestamp),
        subscription_id: Some(subscription.id.to_string()),
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn live_status(&self, customer_id: &str) -> Res<Option<LiveBilling>> {
        let customer_id = parse_customer_id(customer_id)?;
        let subscriptions = Subscription::list(
            &self.client,
            &ListSubscriptions {
                customer: Some(customer_id),
                status: Some(SubscriptionStatusFilter::All),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .map_err(AppError::from)?;

        Ok(subscriptions.data.first().map(live_billing))
    }

    async fn create_customer(&self, email: &str) -> Res<String> {
        let customer = common::stripe::create_customer(&self.client, email).await?;
        Ok(customer.id.to_string())
    }

    async fn checkout_url(
        &self,
        user_id: Uuid,
        customer_id: &str,
        req: &CheckoutRequest,
    ) -> Res<String> {
        let reference = user_id.to_string();
        let params = CreateCheckoutSession {
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(req.price_id.clone()),
                quantity: Some(1),
                ..Default::default()
            }]),
            mode: Some(CheckoutSessionMode::Subscription),
            success_url: Some(req.success_url.as_str()),
            cancel_url: Some(req.cancel_url.as_str()),
            customer: Some(parse_customer_id(customer_id)?),
            client_reference_id: Some(reference.as_str()),
            ..Default::default()
        };

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(AppError::from)?;

        session
            .url
            .ok_or_else(|| AppError::Internal("Stripe returned no checkout URL".to_string()))
    }

    async fn portal_url(&self, customer_id: &str, return_url: &str) -> Res<String> {
        let mut params = CreateBillingPortalSession::new(parse_customer_id(customer_id)?);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(&self.client, params)
            .await
            .map_err(AppError::from)?;
        Ok(session.url)
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> Res<LiveBilling> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| AppError::BadRequest(format!("Invalid subscription ID: {}", e)))?;

        let subscription = Subscription::update(
            &self.client,
            &sub_id,
            UpdateSubscription {
                cancel_at_period_end: Some(cancel_at_period_end),
                ..Default::default()
            },
        )
        .await
        .map_err(AppError::from)?;

        Ok(live_billing(&subscription))
    }
}
