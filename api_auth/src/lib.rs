use middleware::auth::AuthMiddleware;

pub mod middleware {
    pub mod auth;
}

/// Requires valid JWT claims on every request of the wrapped scope.
pub fn auth_middleware() -> AuthMiddleware {
    AuthMiddleware::new()
}
