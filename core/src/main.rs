mod cors;
mod redis;

use std::sync::Arc;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use api_dreams::{
    DreamService,
    clients::{
        chat::ChatClient, http_client, image::ImageClient, storage::StorageClient,
        transcription::TranscriptionClient,
    },
    ports::PgDreamStore,
};
use api_subs::{
    SubscriptionService,
    ports::{PgSubscriptionSource, StripeBilling},
    store::RedisStore,
};
use common::{clock::SystemClock, env_config::Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    // get info
    let is_production = config.environment == "production";
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");

    // init Redis
    let redis_pool =
        redis::setup_redis(&config).expect("Failed to create pool of Redis connections");

    let stripe_client = common::stripe::create_client(&config.stripe_secret_key);
    let http = http_client().expect("Failed to build provider HTTP client");

    let subscriptions = web::Data::new(SubscriptionService::new(
        Arc::new(PgSubscriptionSource::new(pool.clone())),
        Arc::new(StripeBilling::new(stripe_client.clone())),
        Arc::new(RedisStore::new(redis_pool)),
        Arc::new(SystemClock),
        config.usage.clone(),
    ));
    let dreams = web::Data::new(DreamService::new(
        ChatClient::new(http.clone(), &config.openai),
        ImageClient::new(http.clone(), &config.image_provider),
        StorageClient::new(http.clone(), &config.storage),
        TranscriptionClient::new(http, &config.openai),
        Arc::new(PgDreamStore::new(pool.clone())),
    ));
    let global_limiter = limiter::global_middleware(config.global_requests_per_second);

    log::info!(
        "Starting server on {}:{} ({} workers)",
        config.server_host,
        config.server_port,
        config.num_workers
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(stripe_client.clone()))
            .app_data(subscriptions.clone())
            .app_data(dreams.clone())
            .wrap(global_limiter.clone()) // 4th
            .wrap(logger::middleware()) // 3rd
            .wrap(extractor::middleware()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(api_subs::mount_webhook())
                    .service(
                        api_subs::mount_subscription()
                            .wrap(api_auth::auth_middleware().allow_anonymous("/current")),
                    )
                    .service(
                        web::scope("/functions/v1")
                            .wrap(api_auth::auth_middleware())
                            .configure(api_subs::configure_functions)
                            .configure(api_dreams::configure_functions),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
