use actix_web::{Responder, get, post, web};
use common::{error::Res, http::Success, jwt::JwtClaims};

use crate::{
    dtos::sub::{
        CancelResponse, CheckoutRequest, CurrentQuery, PortalRequest, RenewResponse, UrlResponse,
    },
    services::sub::SubscriptionService,
};

/// Returns the caller's reconciled subscription and remaining weekly usage.
///
/// Authentication is optional here: anonymous callers get an inactive view
/// with `0/0` usage. Pass `refresh=true` after returning from the billing
/// portal to skip the 5 minute cache.
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/subscription/current?refresh=true', {
///   headers: {
///     'Authorization': `Bearer ${localStorage.getItem('authToken')}`
///   }
/// });
///
/// const data = await response.json();
/// // {
/// //   subscription: { status: "active", displayStatus: "canceling", planName: "Premium", ... },
/// //   usage: { imageGenerations: null, dreamAnalyses: null, unlimited: true },
/// //   premiumActivated: false
/// // }
/// if (data.premiumActivated) showToast('Premium Active');
/// ```
#[get("/current")]
pub async fn get_current(
    claims: Option<web::ReqData<JwtClaims>>,
    query: web::Query<CurrentQuery>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    let user_id = claims.map(|claims| claims.user_id);
    Success::ok(service.current(user_id, query.refresh).await)
}

/// Creates a Stripe checkout session for the chosen price and returns its URL.
///
/// # Frontend Example
/// ```javascript
/// const response = await fetch('/api/subscription/create-checkout', {
///   method: 'POST',
///   headers: {
///     'Content-Type': 'application/json',
///     'Authorization': `Bearer ${localStorage.getItem('authToken')}`
///   },
///   body: JSON.stringify({
///     priceId: "price_1234567890",
///     successUrl: "https://dreamlog.app/subscription?success=true",
///     cancelUrl: "https://dreamlog.app/subscription"
///   })
/// });
///
/// if (response.ok) {
///   const { url } = await response.json();
///   window.location.href = url;
/// }
/// ```
#[post("/create-checkout")]
pub async fn post_create_checkout(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<CheckoutRequest>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    let url = service
        .subscribe(claims.user_id, &claims.email, &req)
        .await?;
    Success::created(UrlResponse { url })
}

/// Creates a billing portal session for the caller.
#[post("/create-portal")]
pub async fn post_create_portal(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<PortalRequest>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    let url = service.portal(claims.user_id, &req.return_url).await?;
    Success::created(UrlResponse { url })
}

/// Marks the subscription as canceling and returns the portal URL where the
/// user confirms the cancellation.
#[post("/cancel")]
pub async fn post_cancel(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<PortalRequest>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    let (url, subscription) = service.cancel(claims.user_id, &req.return_url).await?;
    Success::ok(CancelResponse { url, subscription })
}

#[post("/renew")]
pub async fn post_renew(
    claims: web::ReqData<JwtClaims>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    let subscription = service.renew(claims.user_id).await?;
    Success::ok(RenewResponse { subscription })
}
