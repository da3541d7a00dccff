use common::env_config::Config;

/// Connection pool behind the subscription view cache.
pub fn setup_redis(config: &Config) -> Result<deadpool_redis::Pool, deadpool_redis::CreatePoolError> {
    deadpool_redis::Config::from_url(&config.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
}
