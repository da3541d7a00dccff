use chrono::{DateTime, Utc};
use db::models::subscription::SubscriptionRecord;

use crate::models::sub::{BillingStatus, DisplayStatus, FREE_PLAN, LiveBilling, SubscriptionView};

/// Output of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub view: SubscriptionView,
    /// Whether usage counters are unlimited for this view.
    pub unlimited: bool,
}

/// A row worth asking Stripe about: active, or canceled while the paid
/// period is still running.
pub fn active_equivalent(record: &SubscriptionRecord, now: DateTime<Utc>) -> bool {
    match record.status.as_deref().and_then(BillingStatus::parse) {
        Some(BillingStatus::Active) => true,
        Some(BillingStatus::Canceled) => record.current_period_end.is_some_and(|end| now < end),
        _ => false,
    }
}

/// Derives the user-facing view from the stored row and, when available, the
/// live Stripe state. Live values take precedence over the row.
///
/// `canceled` with a period end in the future counts as active and
/// canceling: Stripe's terminal state lags the period the user already paid for.
pub fn reconcile(
    record: Option<&SubscriptionRecord>,
    live: Option<&LiveBilling>,
    now: DateTime<Utc>,
) -> Reconciled {
    let Some(record) = record else {
        return Reconciled {
            view: SubscriptionView::inactive(),
            unlimited: false,
        };
    };

    let (status, cancel_at_period_end, current_period_end, canceled_at) = match live {
        Some(live) => (
            live.status,
            live.cancel_at_period_end,
            live.current_period_end,
            live.canceled_at,
        ),
        None => (
            record.status.as_deref().and_then(BillingStatus::parse),
            record.cancel_at_period_end,
            record.current_period_end,
            record.canceled_at,
        ),
    };

    let period_running = current_period_end.is_some_and(|end| now < end);
    let period_over = current_period_end.is_some_and(|end| now >= end);

    let is_active = match status {
        Some(BillingStatus::Active) => !(cancel_at_period_end && period_over),
        Some(BillingStatus::Canceled) => period_running,
        _ => false,
    };
    let is_canceling =
        is_active && (cancel_at_period_end || status == Some(BillingStatus::Canceled));

    let display_status = if is_canceling {
        DisplayStatus::Canceling
    } else if is_active {
        DisplayStatus::Active
    } else {
        DisplayStatus::Inactive
    };

    let unlimited = match display_status {
        DisplayStatus::Active => true,
        DisplayStatus::Canceling => period_running,
        DisplayStatus::Inactive => false,
    };

    let plan_name = if is_active {
        record.plan_name.clone()
    } else {
        FREE_PLAN.to_string()
    };

    Reconciled {
        view: SubscriptionView {
            status,
            display_status,
            plan_name,
            current_period_end,
            cancel_at_period_end: cancel_at_period_end || is_canceling,
            canceled_at,
            customer_portal_url: None,
        },
        unlimited,
    }
}

/// True when `current` is active and `previous` was neither active nor
/// canceling. Without a previous status there is no transition to report.
pub fn entered_active(previous: Option<DisplayStatus>, current: DisplayStatus) -> bool {
    current == DisplayStatus::Active
        && matches!(previous, Some(DisplayStatus::Inactive))
}
