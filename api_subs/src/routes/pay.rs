use std::sync::Arc;

use actix_web::{Responder, post, web};
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use sqlx::PgPool;

use crate::services::{self, sub::SubscriptionService};

/// Handles Stripe webhook events for subscription changes.
///
/// # Output
/// - Success: Returns 200 OK when webhook is processed successfully
/// - Error: Returns 400 Bad Request for invalid signature or 500 for processing errors
///
/// # Note
/// This endpoint is not called directly from the frontend application.
/// It's called by Stripe's servers when subscription events occur.
///
/// # Stripe Configuration Example
/// 1. Go to Stripe Dashboard → Developers → Webhooks
/// 2. Add Endpoint: https://yourapp.com/api/pay/webhook
/// 3. Select `customer.subscription.*` and `checkout.session.completed`
/// 4. Get the webhook signing secret and set it in your environment as STRIPE_WEBHOOK_SECRET
#[post("/webhook")]
async fn post_webhook(
    payload: String,
    req: actix_web::HttpRequest,
    config: web::Data<Arc<Config>>,
    pool: web::Data<Arc<PgPool>>,
    client: web::Data<stripe::Client>,
    service: web::Data<SubscriptionService>,
) -> Res<impl Responder> {
    let signature = match req.headers().get("stripe-signature") {
        Some(signature) => signature.to_str().unwrap_or(""),
        None => return Err(AppError::BadRequest("Stripe signature missing".to_string())),
    };

    let event =
        services::pay::construct_event(&payload, signature, &config.stripe_webhook_secret)?;
    if let Some(user_id) = services::pay::process_webhook_event(&client, &pool, event).await? {
        service.invalidate(user_id).await;
    }

    Success::ok("Webhook processed successfully")
}
