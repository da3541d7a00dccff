use actix_web::{Responder, post, web};
use common::{
    error::{AppError, Res},
    http::Success,
    jwt::JwtClaims,
};
use uuid::Uuid;

use crate::{
    dtos::sub::{StripeSubscriptionRequest, SubscriptionLookupRequest, SubscriptionLookupResponse},
    services::sub::SubscriptionService,
};

fn ensure_same_user(claims: &JwtClaims, user_id: Uuid) -> Res<()> {
    if claims.user_id != user_id {
        return Err(AppError::Forbidden(
            "userId does not match the authenticated user".to_string(),
        ));
    }
    Ok(())
}

/// Live Stripe status for the caller's customer.
///
/// Responds with `{status, cancel_at_period_end, current_period_end, canceled_at, subscription_id}`;
/// every field is empty when the customer has no subscription.
#[post("/get-stripe-subscription")]
pub async fn post_get_stripe_subscription(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<StripeSubscriptionRequest>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    ensure_same_user(&claims, req.user_id)?;
    let live = service
        .live_status(req.user_id, &req.stripe_customer_id)
        .await?;
    Success::ok(live)
}

/// Stored subscription row, used by clients as the free-tier fallback lookup.
#[post("/get-subscription")]
pub async fn post_get_subscription(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<SubscriptionLookupRequest>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    ensure_same_user(&claims, req.user_id)?;
    let subscription = service.record(req.user_id).await?;
    Success::ok(SubscriptionLookupResponse { subscription })
}
