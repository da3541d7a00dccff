use actix_web::web;
use classifier::AiErrorClassification;
use common::misc::UsageKind;

pub mod ports;

pub mod clients {
    pub mod chat;
    pub mod image;
    pub mod storage;
    pub mod transcription;

    use std::time::Duration;

    use common::error::Res;

    /// Status for a classified provider failure whose category has none of its own.
    pub const PROVIDER_DEFAULT_STATUS: u16 = 400;

    /// Shared HTTP client for every provider; image generation can take a while.
    pub fn http_client() -> Res<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?)
    }
}

pub mod routes {
    pub mod functions;
}

pub mod services {
    pub mod dream;
}

pub mod dtos {
    pub mod dream;
}

pub use services::dream::DreamService;

/// Request bodies up to 1 MiB; audio uploads get more room.
const JSON_LIMIT: usize = 1024 * 1024;
const AUDIO_JSON_LIMIT: usize = 25 * 1024 * 1024;

/// JSON extractor settings that report malformed bodies as `INVALID_REQUEST`.
fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            AiErrorClassification::invalid_request(format!("Invalid request body: {}", err))
                .into_error(400)
                .into()
        })
}

/// Registers the AI edge functions served under `/functions/v1`.
///
/// Metered functions sit behind the weekly quota gate.
pub fn configure_functions(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/analyze-dream")
            .app_data(json_config(JSON_LIMIT))
            .wrap(limiter::quota_middleware(UsageKind::Analysis))
            .route(web::post().to(routes::functions::post_analyze_dream)),
    )
    .service(
        web::resource("/generate-image")
            .app_data(json_config(JSON_LIMIT))
            .wrap(limiter::quota_middleware(UsageKind::Image))
            .route(web::post().to(routes::functions::post_generate_image)),
    )
    .service(
        web::resource("/transcribe")
            .app_data(json_config(AUDIO_JSON_LIMIT))
            .route(web::post().to(routes::functions::post_transcribe)),
    );
}
