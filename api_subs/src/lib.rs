use actix_web::web::{self};

pub mod ports;
pub mod store;

pub mod routes {
    pub mod functions;
    pub mod pay;
    pub mod sub;
}

pub mod services {
    pub mod pay;
    pub mod reconcile;
    pub mod sub;
    pub mod usage;
}

pub mod dtos {
    pub mod sub;
}

pub mod models {
    pub mod sub;
}

pub use services::sub::SubscriptionService;

pub fn mount_subscription() -> actix_web::Scope {
    web::scope("/subscription")
        .service(routes::sub::get_current)
        .service(routes::sub::post_create_checkout)
        .service(routes::sub::post_create_portal)
        .service(routes::sub::post_cancel)
        .service(routes::sub::post_renew)
}

/// Registers the subscription lookups served under `/functions/v1`.
pub fn configure_functions(cfg: &mut web::ServiceConfig) {
    cfg.service(routes::functions::post_get_stripe_subscription)
        .service(routes::functions::post_get_subscription);
}

pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/pay").service(routes::pay::post_webhook)
}
