use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    web,
};
use api_subs::{SubscriptionService, models::sub::Quota};
use classifier::{AiErrorClassification, ErrorType};
use common::{error::AppError, jwt::get_jwt_claims_or_error, misc::UsageKind};

/// Gate in front of a metered edge function.
///
/// Rejects the call with a `RATE_LIMIT` classification once the caller's
/// weekly free-tier quota for `kind` is used up. Premium callers and
/// requests without claims pass through; the latter are left to the auth
/// middleware.
pub struct QuotaGate {
    kind: UsageKind,
}

impl QuotaGate {
    pub fn new(kind: UsageKind) -> Self {
        QuotaGate { kind }
    }
}

impl<S, B> Transform<S, ServiceRequest> for QuotaGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = QuotaGateService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(QuotaGateService {
            service: Rc::new(service),
            kind: self.kind,
        }))
    }
}

pub struct QuotaGateService<S> {
    service: Rc<S>,
    kind: UsageKind,
}

fn quota_for(usage: &api_subs::models::sub::UsageCounters, kind: UsageKind) -> Quota {
    match kind {
        UsageKind::Image => usage.image_generations,
        UsageKind::Analysis => usage.dream_analyses,
    }
}

fn limit_reached(kind: UsageKind) -> AiErrorClassification {
    let feature = match kind {
        UsageKind::Image => "image generation",
        UsageKind::Analysis => "dream analysis",
    };
    AiErrorClassification {
        error: format!("Weekly {} limit reached", feature),
        error_type: ErrorType::RateLimit,
        details: None,
        suggested_action: Some(
            "Upgrade to Premium for unlimited use, or wait until your quota resets on Sunday."
                .to_string(),
        ),
    }
}

impl<S, B> Service<ServiceRequest> for QuotaGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = Rc::clone(&self.service);
        let kind = self.kind;

        Box::pin(async move {
            let Ok(claims) = get_jwt_claims_or_error(&req) else {
                return srv.call(req).await.map(|res| res.map_into_boxed_body());
            };

            let Some(service) = req.app_data::<web::Data<SubscriptionService>>().cloned() else {
                return Ok(req.error_response(AppError::Internal(
                    "Subscription service is not configured".to_string(),
                )));
            };

            let current = service.current(Some(claims.user_id), false).await;
            if quota_for(&current.usage, kind).is_exhausted() {
                log::info!("Weekly {} quota exhausted for {}", kind, claims.user_id);
                return Ok(req.error_response(limit_reached(kind).into_error(429)));
            }

            srv.call(req).await.map(|res| res.map_into_boxed_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use actix_web::{App, HttpMessage, http::StatusCode, test};
    use api_subs::{
        dtos::sub::CheckoutRequest,
        models::sub::LiveBilling,
        ports::{BillingProvider, SubscriptionSource},
        store::MemoryStore,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use common::{
        clock::SystemClock,
        env_config::UsageConfig,
        error::Res,
        jwt::JwtClaims,
    };
    use db::models::subscription::SubscriptionRecord;
    use uuid::Uuid;

    struct FreeTier {
        used: i64,
    }

    #[async_trait]
    impl SubscriptionSource for FreeTier {
        async fn subscription(&self, _user_id: Uuid) -> Res<Option<SubscriptionRecord>> {
            Ok(None)
        }

        async fn usage_since(
            &self,
            _user_id: Uuid,
            _kind: UsageKind,
            _since: DateTime<Utc>,
        ) -> Res<i64> {
            Ok(self.used)
        }

        async fn set_customer_id(&self, _user_id: Uuid, _customer_id: &str) -> Res<()> {
            Ok(())
        }

        async fn set_cancel_at_period_end(
            &self,
            _user_id: Uuid,
            _cancel_at_period_end: bool,
        ) -> Res<Option<SubscriptionRecord>> {
            Ok(None)
        }
    }

    struct NoBilling;

    #[async_trait]
    impl BillingProvider for NoBilling {
        async fn live_status(&self, _customer_id: &str) -> Res<Option<LiveBilling>> {
            Ok(None)
        }

        async fn create_customer(&self, _email: &str) -> Res<String> {
            Err(AppError::Internal("unused".to_string()))
        }

        async fn checkout_url(
            &self,
            _user_id: Uuid,
            _customer_id: &str,
            _req: &CheckoutRequest,
        ) -> Res<String> {
            Err(AppError::Internal("unused".to_string()))
        }

        async fn portal_url(&self, _customer_id: &str, _return_url: &str) -> Res<String> {
            Err(AppError::Internal("unused".to_string()))
        }

        async fn set_cancel_at_period_end(
            &self,
            _subscription_id: &str,
            _cancel_at_period_end: bool,
        ) -> Res<LiveBilling> {
            Err(AppError::Internal("unused".to_string()))
        }
    }

    fn service(used: i64) -> web::Data<SubscriptionService> {
        let clock = Arc::new(SystemClock);
        let settings = UsageConfig {
            weekly_image_limit: 2,
            ..UsageConfig::default()
        };
        web::Data::new(SubscriptionService::new(
            Arc::new(FreeTier { used }),
            Arc::new(NoBilling),
            Arc::new(MemoryStore::new(clock.clone())),
            clock,
            settings,
        ))
    }

    async fn call_generate(used: i64, signed_in: bool) -> StatusCode {
        let app = test::init_service(
            App::new()
                .app_data(service(used))
                .wrap(QuotaGate::new(UsageKind::Image))
                .wrap_fn(move |req, srv| {
                    if signed_in {
                        let claims = JwtClaims {
                            user_id: Uuid::new_v4(),
                            email: "dreamer@example.com".to_string(),
                            exp: usize::MAX,
                        };
                        req.extensions_mut().insert::<Res<JwtClaims>>(Ok(claims));
                    }
                    srv.call(req)
                })
                .route("/generate-image", web::post().to(|| async { "generated" })),
        )
        .await;

        let req = test::TestRequest::post().uri("/generate-image").to_request();
        test::call_service(&app, req).await.status()
    }

    #[actix_web::test]
    async fn free_tier_with_quota_left_passes() {
        assert_eq!(call_generate(1, true).await, StatusCode::OK);
    }

    #[actix_web::test]
    async fn exhausted_quota_is_rate_limited() {
        assert_eq!(call_generate(2, true).await, StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn requests_without_claims_are_left_to_auth() {
        assert_eq!(call_generate(99, false).await, StatusCode::OK);
    }

    #[actix_web::test]
    async fn limit_message_names_the_feature() {
        let classification = limit_reached(UsageKind::Analysis);
        assert_eq!(classification.error, "Weekly dream analysis limit reached");
        assert_eq!(classification.status(500), 429);
    }
}
