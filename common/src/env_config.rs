use std::{env, sync::Arc, time::Duration};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// This struct holds all the necessary configuration parameters
/// required to initialize and run the server.
/// It includes database and Redis connection details, JWT configuration,
/// server host and port, number of worker threads, CORS settings,
/// logging preferences, Stripe credentials, the AI provider clients
/// and the knobs of the subscription reconciler.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The URL of Redis server to connect to.
    pub redis_url: String,
    /// Configuration for JWT (JSON Web Token) authentication.
    pub jwt_config: JwtConfig,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Maximum number of requests per second accepted by the whole server.
    pub global_requests_per_second: u32,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook secret
    pub stripe_webhook_secret: String,
    /// Chat completion and speech-to-text provider.
    pub openai: OpenAiConfig,
    /// Image generation provider.
    pub image_provider: ImageProviderConfig,
    /// Object storage holding the generated dream images.
    pub storage: StorageConfig,
    /// Free tier limits and reconciliation timing.
    pub usage: UsageConfig,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) authentication.
///
/// Holds the secret used to verify bearer tokens issued by the auth provider.
pub struct JwtConfig {
    /// The secret key used to verify JWTs.
    pub secret: String,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub transcription_model: String,
}

#[derive(Clone, Debug)]
pub struct ImageProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Base URL of the storage API, e.g. `https://<project>.supabase.co/storage/v1`.
    pub url: String,
    pub service_key: String,
    pub bucket: String,
}

#[derive(Clone, Debug)]
pub struct UsageConfig {
    /// Weekly free-tier image generations.
    pub weekly_image_limit: i64,
    /// Weekly free-tier dream analyses.
    pub weekly_analysis_limit: i64,
    /// How long a reconciled subscription view stays cached.
    pub cache_ttl: Duration,
    /// Minimum gap between two "premium active" notices.
    pub notice_debounce: Duration,
    /// Minimum gap between two status log lines for the same user.
    pub status_log_debounce: Duration,
}

impl Default for UsageConfig {
    fn default() -> Self {
        UsageConfig {
            weekly_image_limit: 5,
            weekly_analysis_limit: 7,
            cache_ttl: Duration::from_secs(300),
            notice_debounce: Duration::from_secs(5),
            status_log_debounce: Duration::from_secs(30),
        }
    }
}

impl JwtConfig {
    /// Creates a new `JwtConfig` instance from environment variables.
    ///
    /// Reads `JWT_SECRET` from the environment.
    ///
    /// # Panics
    ///
    /// This function will panic if `JWT_SECRET` is not set.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        JwtConfig {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
        }
    }
}

impl UsageConfig {
    fn from_env() -> Self {
        let defaults = UsageConfig::default();
        let secs = |name: &str, default: Duration| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        UsageConfig {
            weekly_image_limit: env::var("WEEKLY_IMAGE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.weekly_image_limit),
            weekly_analysis_limit: env::var("WEEKLY_ANALYSIS_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.weekly_analysis_limit),
            cache_ttl: secs("SUBSCRIPTION_CACHE_TTL_SECS", defaults.cache_ttl),
            notice_debounce: secs("PREMIUM_NOTICE_DEBOUNCE_SECS", defaults.notice_debounce),
            status_log_debounce: secs("STATUS_LOG_DEBOUNCE_SECS", defaults.status_log_debounce),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// Loads all configuration values from environment variables with sensible defaults
    /// for most optional settings.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: `development` or `production`
    /// - `DATABASE_URL`: Connection string for the database
    /// - `REDIS_URL`: Connection string for Redis
    /// - `JWT_SECRET`: Secret key for JWT signing (via `JwtConfig::from_env()`)
    ///
    /// Optional (with defaults):
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGIN`: Allowed CORS origin (default: "http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `GLOBAL_REQUESTS_PER_SECOND`: Global limiter budget (default: 10)
    /// - `OPENAI_*`, `IMAGE_API_*`, `STORAGE_*`: provider credentials and endpoints
    /// - `WEEKLY_IMAGE_LIMIT` / `WEEKLY_ANALYSIS_LIMIT`: free tier limits (default: 5 / 7)
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let stripe_webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            jwt_config: JwtConfig::from_env(),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            global_requests_per_second: env::var("GLOBAL_REQUESTS_PER_SECOND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            stripe_secret_key,
            stripe_webhook_secret,
            openai: OpenAiConfig {
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                chat_model: env::var("OPENAI_CHAT_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                transcription_model: env::var("OPENAI_TRANSCRIPTION_MODEL")
                    .unwrap_or_else(|_| "whisper-1".to_string()),
            },
            image_provider: ImageProviderConfig {
                api_key: env::var("IMAGE_API_KEY").unwrap_or_default(),
                base_url: env::var("IMAGE_API_BASE_URL").unwrap_or_else(|_| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
                model: env::var("IMAGE_API_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash-exp-image-generation".to_string()),
            },
            storage: StorageConfig {
                url: env::var("STORAGE_URL").unwrap_or_default(),
                service_key: env::var("STORAGE_SERVICE_KEY").unwrap_or_default(),
                bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "dream-images".to_string()),
            },
            usage: UsageConfig::from_env(),
        })
    }
}
