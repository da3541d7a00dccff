use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use common::jwt::get_jwt_claims_or_error;
use futures::future::{Ready, ok};

/// Rejects requests that carry no valid JWT claims.
///
/// Claims are decoded earlier by the extractor middleware; this only checks
/// the outcome. Paths ending in one of the anonymous suffixes pass through
/// without a token, but a present and invalid token is still rejected.
pub struct AuthMiddleware {
    anonymous_paths: Rc<Vec<String>>,
}

impl AuthMiddleware {
    pub fn new() -> Self {
        AuthMiddleware {
            anonymous_paths: Rc::new(Vec::new()),
        }
    }

    pub fn allow_anonymous(self, path_suffix: &str) -> Self {
        let mut paths = (*self.anonymous_paths).clone();
        paths.push(path_suffix.to_string());
        AuthMiddleware {
            anonymous_paths: Rc::new(paths),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            anonymous_paths: self.anonymous_paths.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    anonymous_paths: Rc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
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
        let anonymous = self
            .anonymous_paths
            .iter()
            .any(|suffix| req.path().ends_with(suffix.as_str()));
        let has_token = req.headers().contains_key("Authorization");

        Box::pin(async move {
            if anonymous && !has_token {
                return srv.call(req).await.map(|res| res.map_into_boxed_body());
            }
            match get_jwt_claims_or_error(&req) {
                Ok(_) => srv.call(req).await.map(|res| res.map_into_boxed_body()),
                Err(response) => Ok(req.into_response(response)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test, web};

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new().allow_anonymous("/current"))
                .route("/current", web::get().to(|| async { "anyone" }))
                .route("/renew", web::post().to(|| async { "members" })),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::post().uri("/renew").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = test::call_service(&app, test::TestRequest::get().uri("/current").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn undecoded_token_on_anonymous_path_is_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new().allow_anonymous("/current"))
                .route("/current", web::get().to(|| async { "anyone" })),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/current")
            .insert_header(("Authorization", "Bearer nope"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
