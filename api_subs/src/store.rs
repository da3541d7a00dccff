use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    clock::Clock,
    error::{AppError, Res},
};
use redis::AsyncCommands;

/// String key-value storage holding per-user reconciliation state: the cached
/// view, the last display status and the debounce timestamps.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Res<Option<String>>;

    /// Stores `value`, expiring it after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Res<()>;

    async fn delete(&self, key: &str) -> Res<()>;
}

/// In-process store. Expiry is checked against the injected clock on read.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Option<DateTime<Utc>>)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Option<DateTime<Utc>>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Res<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some((_, Some(expires_at))) if now >= *expires_at => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Res<()> {
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| AppError::Internal(format!("Invalid TTL: {}", e)))?;
                Some(self.clock.now() + ttl)
            }
            None => None,
        };
        self.entries()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Res<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store shared by all workers, backed by a Redis connection pool.
pub struct RedisStore {
    pool: deadpool_redis::Pool,
}

impl RedisStore {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        RedisStore { pool }
    }

    async fn connection(&self) -> Res<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Res<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Res<()> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Res<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::clock::ManualClock;
    use pretty_assertions::assert_eq;

    #[actix_web::test]
    async fn memory_store_honours_ttl() {
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let store = MemoryStore::new(Arc::new(clock.clone()));

        store
            .set("a", "1", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store.set("b", "2", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));

        store.delete("b").await.unwrap();
        assert_eq!(store.get("b").await.unwrap(), None);
    }
}
