use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription status as reported by Stripe. Anything Stripe reports
/// outside this set (incomplete, paused, ...) is treated as no status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Active,
    Canceled,
    Trialing,
    PastDue,
    Unpaid,
}

impl BillingStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(BillingStatus::Active),
            "canceled" => Some(BillingStatus::Canceled),
            "trialing" => Some(BillingStatus::Trialing),
            "past_due" => Some(BillingStatus::PastDue),
            "unpaid" => Some(BillingStatus::Unpaid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Active => "active",
            BillingStatus::Canceled => "canceled",
            BillingStatus::Trialing => "trialing",
            BillingStatus::PastDue => "past_due",
            BillingStatus::Unpaid => "unpaid",
        }
    }
}

/// Three-valued simplification of [`BillingStatus`] shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Active,
    Canceling,
    Inactive,
}

impl DisplayStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(DisplayStatus::Active),
            "canceling" => Some(DisplayStatus::Canceling),
            "inactive" => Some(DisplayStatus::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::Active => "active",
            DisplayStatus::Canceling => "canceling",
            DisplayStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub status: Option<BillingStatus>,
    pub display_status: DisplayStatus,
    pub plan_name: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub customer_portal_url: Option<String>,
}

impl SubscriptionView {
    pub fn inactive() -> Self {
        SubscriptionView {
            status: None,
            display_status: DisplayStatus::Inactive,
            plan_name: FREE_PLAN.to_string(),
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            customer_portal_url: None,
        }
    }
}

pub const FREE_PLAN: &str = "Free";

/// Remaining weekly quota for one metered feature.
///
/// Unlimited is carried over JSON as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<i64>")]
pub enum Quota {
    Limited(i64),
    Unlimited,
}

impl Quota {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Quota::Limited(n) if *n <= 0)
    }
}

impl From<Option<i64>> for Quota {
    fn from(value: Option<i64>) -> Self {
        value.map(Quota::Limited).unwrap_or(Quota::Unlimited)
    }
}

impl From<Quota> for Option<i64> {
    fn from(quota: Quota) -> Self {
        match quota {
            Quota::Limited(n) => Some(n),
            Quota::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub image_generations: Quota,
    pub dream_analyses: Quota,
    pub unlimited: bool,
}

impl UsageCounters {
    pub fn unlimited() -> Self {
        UsageCounters {
            image_generations: Quota::Unlimited,
            dream_analyses: Quota::Unlimited,
            unlimited: true,
        }
    }

    /// What anonymous callers see.
    pub fn exhausted() -> Self {
        UsageCounters::limited(0, 0)
    }

    pub fn limited(image_generations: i64, dream_analyses: i64) -> Self {
        UsageCounters {
            image_generations: Quota::Limited(image_generations),
            dream_analyses: Quota::Limited(dream_analyses),
            unlimited: false,
        }
    }
}

/// Live subscription state fetched from Stripe for one customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveBilling {
    pub status: Option<BillingStatus>,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
}

/// Reconciled view plus usage, as returned by `GET /subscription/current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSubscription {
    pub subscription: SubscriptionView,
    pub usage: UsageCounters,
    pub premium_activated: bool,
}

impl CurrentSubscription {
    pub fn anonymous() -> Self {
        CurrentSubscription {
            subscription: SubscriptionView::inactive(),
            usage: UsageCounters::exhausted(),
            premium_activated: false,
        }
    }
}
