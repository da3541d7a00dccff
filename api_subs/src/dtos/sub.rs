use db::models::subscription::SubscriptionRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::sub::SubscriptionView;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalRequest {
    pub return_url: String,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub url: String,
    pub subscription: Option<SubscriptionView>,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub subscription: SubscriptionView,
}

#[derive(Debug, Deserialize)]
pub struct CurrentQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeSubscriptionRequest {
    pub user_id: Uuid,
    pub stripe_customer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionLookupRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionLookupResponse {
    pub subscription: Option<SubscriptionRecord>,
}
