use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use common::{
    clock::Clock,
    env_config::UsageConfig,
    error::{AppError, Res},
    misc::UsageKind,
};
use db::models::subscription::SubscriptionRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dtos::sub::CheckoutRequest,
    models::sub::{CurrentSubscription, DisplayStatus, LiveBilling, SubscriptionView, UsageCounters},
    ports::{BillingProvider, SubscriptionSource},
    services::{
        reconcile::{active_equivalent, entered_active, reconcile},
        usage::{remaining, week_start},
    },
    store::KeyValueStore,
};

fn view_key(user_id: Uuid) -> String {
    format!("subscription:{}:view", user_id)
}

fn status_key(user_id: Uuid) -> String {
    format!("subscription:{}:status", user_id)
}

fn notice_key(user_id: Uuid) -> String {
    format!("subscription:{}:notified_at", user_id)
}

fn status_log_key(user_id: Uuid) -> String {
    format!("subscription:{}:logged_at", user_id)
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedView {
    subscription: SubscriptionView,
    usage: UsageCounters,
    cached_at: DateTime<Utc>,
}

/// Keeps the per-user subscription view in line with Stripe.
///
/// All state between calls (cache, previous status, debounce timestamps)
/// goes through the injected [`KeyValueStore`]; all time reads go through the
/// injected [`Clock`].
pub struct SubscriptionService {
    source: Arc<dyn SubscriptionSource>,
    billing: Arc<dyn BillingProvider>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: UsageConfig,
}

impl SubscriptionService {
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        billing: Arc<dyn BillingProvider>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: UsageConfig,
    ) -> Self {
        SubscriptionService {
            source,
            billing,
            store,
            clock,
            settings,
        }
    }

    /// Reconciled view and remaining usage for `user_id`.
    ///
    /// Never fails: database and provider errors degrade to the free tier,
    /// and an anonymous caller always gets exhausted counters.
    pub async fn current(&self, user_id: Option<Uuid>, refresh: bool) -> CurrentSubscription {
        let Some(user_id) = user_id else {
            return CurrentSubscription::anonymous();
        };
        let now = self.clock.now();

        if !refresh {
            if let Some(cached) = self.cached(user_id, now).await {
                return CurrentSubscription {
                    subscription: cached.subscription,
                    usage: cached.usage,
                    premium_activated: false,
                };
            }
        }

        let record = match self.source.subscription(user_id).await {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Subscription lookup failed for {}, using free tier: {}", user_id, e);
                None
            }
        };

        let live = self.live_for_record(record.as_ref(), now).await;
        let reconciled = reconcile(record.as_ref(), live.as_ref(), now);
        let view = reconciled.view;

        let usage = if reconciled.unlimited {
            UsageCounters::unlimited()
        } else {
            self.free_tier_usage(user_id, now).await
        };

        let previous = self
            .read(&status_key(user_id))
            .await
            .and_then(|s| DisplayStatus::parse(&s));
        let premium_activated = entered_active(previous, view.display_status)
            && self
                .debounce(&notice_key(user_id), self.settings.notice_debounce, now)
                .await;
        if premium_activated {
            log::info!("Premium activated for {}", user_id);
        }

        self.write(&status_key(user_id), view.display_status.as_str(), None)
            .await;

        if self
            .debounce(&status_log_key(user_id), self.settings.status_log_debounce, now)
            .await
        {
            log::info!(
                "Subscription for {} reconciled as {} (status: {:?}, cancel at period end: {})",
                user_id,
                view.display_status.as_str(),
                view.status,
                view.cancel_at_period_end
            );
        }

        let cached = CachedView {
            subscription: view,
            usage,
            cached_at: now,
        };
        match serde_json::to_string(&cached) {
            Ok(json) => {
                self.write(&view_key(user_id), &json, Some(self.settings.cache_ttl))
                    .await
            }
            Err(e) => log::warn!("Failed to serialize subscription view: {}", e),
        }

        CurrentSubscription {
            subscription: cached.subscription,
            usage: cached.usage,
            premium_activated,
        }
    }

    /// Returns the checkout URL for `req`, creating the Stripe customer on first use.
    pub async fn subscribe(&self, user_id: Uuid, email: &str, req: &CheckoutRequest) -> Res<String> {
        let record = self.source.subscription(user_id).await?;
        let customer_id = match record.and_then(|r| r.stripe_customer_id) {
            Some(customer_id) => customer_id,
            None => {
                let customer_id = self.billing.create_customer(email).await?;
                log::info!("Created Stripe customer {} for {}", customer_id, user_id);
                self.source.set_customer_id(user_id, &customer_id).await?;
                customer_id
            }
        };

        let url = self.billing.checkout_url(user_id, &customer_id, req).await?;
        self.invalidate(user_id).await;
        Ok(url)
    }

    /// Marks the subscription as canceling right away, then hands out a
    /// portal URL where the user confirms with Stripe.
    pub async fn cancel(
        &self,
        user_id: Uuid,
        return_url: &str,
    ) -> Res<(String, Option<SubscriptionView>)> {
        let customer_id = self.customer_id(user_id).await?;
        let updated = self.source.set_cancel_at_period_end(user_id, true).await?;
        let url = self.billing.portal_url(&customer_id, return_url).await?;
        self.invalidate(user_id).await;

        let now = self.clock.now();
        let view = updated.map(|record| reconcile(Some(&record), None, now).view);
        Ok((url, view))
    }

    pub async fn renew(&self, user_id: Uuid) -> Res<SubscriptionView> {
        let record = self
            .source
            .subscription(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No subscription found".to_string()))?;

        let subscription_id = match (&record.stripe_subscription_id, &record.stripe_customer_id) {
            (Some(subscription_id), _) => subscription_id.clone(),
            (None, Some(customer_id)) => self
                .billing
                .live_status(customer_id)
                .await?
                .and_then(|live| live.subscription_id)
                .ok_or_else(|| AppError::NotFound("No subscription found".to_string()))?,
            (None, None) => return Err(AppError::NotFound("No subscription found".to_string())),
        };

        let live = self
            .billing
            .set_cancel_at_period_end(&subscription_id, false)
            .await?;
        let updated = self.source.set_cancel_at_period_end(user_id, false).await?;
        self.invalidate(user_id).await;

        let now = self.clock.now();
        Ok(reconcile(updated.as_ref().or(Some(&record)), Some(&live), now).view)
    }

    pub async fn portal(&self, user_id: Uuid, return_url: &str) -> Res<String> {
        let customer_id = self.customer_id(user_id).await?;
        let url = self.billing.portal_url(&customer_id, return_url).await?;
        self.invalidate(user_id).await;
        Ok(url)
    }

    /// Live Stripe state for `customer_id`, which must belong to `user_id`.
    pub async fn live_status(&self, user_id: Uuid, customer_id: &str) -> Res<LiveBilling> {
        if self.customer_id(user_id).await? != customer_id {
            return Err(AppError::Forbidden(
                "Customer does not belong to this user".to_string(),
            ));
        }
        Ok(self
            .billing
            .live_status(customer_id)
            .await?
            .unwrap_or_default())
    }

    pub async fn record(&self, user_id: Uuid) -> Res<Option<SubscriptionRecord>> {
        self.source.subscription(user_id).await
    }

    /// Drops the cached view so the next read reconciles again.
    pub async fn invalidate(&self, user_id: Uuid) {
        if let Err(e) = self.store.delete(&view_key(user_id)).await {
            log::warn!("Failed to invalidate subscription cache for {}: {}", user_id, e);
        }
    }

    async fn customer_id(&self, user_id: Uuid) -> Res<String> {
        self.source
            .subscription(user_id)
            .await?
            .and_then(|r| r.stripe_customer_id)
            .ok_or_else(|| AppError::NotFound("No billing account for this user".to_string()))
    }

    async fn cached(&self, user_id: Uuid, now: DateTime<Utc>) -> Option<CachedView> {
        let raw = self.read(&view_key(user_id)).await?;
        let cached = match serde_json::from_str::<CachedView>(&raw) {
            Ok(cached) => cached,
            Err(e) => {
                log::warn!("Discarding unreadable subscription cache for {}: {}", user_id, e);
                return None;
            }
        };
        within(cached.cached_at, now, self.settings.cache_ttl).then_some(cached)
    }

    async fn live_for_record(
        &self,
        record: Option<&SubscriptionRecord>,
        now: DateTime<Utc>,
    ) -> Option<LiveBilling> {
        let customer_id = record
            .filter(|r| active_equivalent(r, now))
            .and_then(|r| r.stripe_customer_id.as_deref())?;

        match self.billing.live_status(customer_id).await {
            Ok(live) => Some(live.unwrap_or_default()),
            Err(e) => {
                log::warn!(
                    "Live billing lookup failed for customer {}, using free tier: {}",
                    customer_id,
                    e
                );
                Some(LiveBilling::default())
            }
        }
    }

    async fn free_tier_usage(&self, user_id: Uuid, now: DateTime<Utc>) -> UsageCounters {
        let since = week_start(now);
        let images = self.used(user_id, UsageKind::Image, since).await;
        let analyses = self.used(user_id, UsageKind::Analysis, since).await;
        UsageCounters::limited(
            remaining(self.settings.weekly_image_limit, images),
            remaining(self.settings.weekly_analysis_limit, analyses),
        )
    }

    async fn used(&self, user_id: Uuid, kind: UsageKind, since: DateTime<Utc>) -> i64 {
        self.source
            .usage_since(user_id, kind, since)
            .await
            .unwrap_or_else(|e| {
                log::warn!("Failed to count {} usage for {}: {}", kind, user_id, e);
                0
            })
    }

    /// True, and the stored timestamp moved to `now`, when at least `window`
    /// has passed since the last time this returned true for `key`.
    async fn debounce(&self, key: &str, window: Duration, now: DateTime<Utc>) -> bool {
        let last = self
            .read(key)
            .await
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));

        if last.is_some_and(|last| within(last, now, window)) {
            return false;
        }
        self.write(key, &now.to_rfc3339(), None).await;
        true
    }

    async fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).await.unwrap_or_else(|e| {
            log::warn!("Failed to read {}: {}", key, e);
            None
        })
    }

    async fn write(&self, key: &str, value: &str, ttl: Option<Duration>) {
        if let Err(e) = self.store.set(key, value, ttl).await {
            log::warn!("Failed to write {}: {}", key, e);
        }
    }
}

/// Whether `now` is less than `window` after `since`.
fn within(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match chrono::Duration::from_std(window) {
        Ok(window) => now - since < window,
        Err(_) => true,
    }
}
