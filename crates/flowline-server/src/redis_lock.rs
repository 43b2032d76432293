//! Flow lock backed by Redis keys
//!
//! A holder owns `LOCK:<key>` set with `NX PX` to a random token. Release
//! deletes the key only while it still carries that token. The key expires
//! after the lease even if its holder never releases it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use flowline_core::{CoreError, LockHandle, LockService};

const LOCK_NAMESPACE: &str = "LOCK";
const LEASE: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

fn redis_key(key: &str) -> String {
    format!("{}:{}", LOCK_NAMESPACE, key)
}

fn redis_error(context: &str, e: redis::RedisError) -> CoreError {
    CoreError::StateStore(format!("{}: {}", context, e))
}

/// [`LockService`] over a Redis connection
#[derive(Clone)]
pub struct RedisLockService {
    conn: ConnectionManager,
}

impl RedisLockService {
    /// Connect to `url`
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let client =
            redis::Client::open(url).map_err(|e| redis_error("Invalid Redis URL", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_error("Failed to connect to Redis", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl LockService for RedisLockService {
    async fn acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Box<dyn LockHandle>, CoreError> {
        let deadline = Instant::now() + timeout;
        let namespaced = redis_key(key);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();

        loop {
            let set: Option<String> = redis::cmd("SET")
                .arg(&namespaced)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(LEASE.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("Failed to take Redis lock", e))?;

            if set.is_some() {
                debug!(lock_key = %key, "Redis lock taken");
                return Ok(Box::new(RedisLockHandle {
                    key: key.to_string(),
                    token,
                    conn,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(lock_key = %key, timeout_ms = timeout.as_millis() as u64, "Redis lock acquisition timed out");
                return Err(CoreError::LockTimeout {
                    key: key.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

struct RedisLockHandle {
    key: String,
    token: String,
    conn: ConnectionManager,
}

#[async_trait]
impl LockHandle for RedisLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(mut self: Box<Self>) -> Result<(), CoreError> {
        let script = redis::Script::new(RELEASE_SCRIPT);
        let deleted: i64 = script
            .key(redis_key(&self.key))
            .arg(&self.token)
            .invoke_async(&mut self.conn)
            .await
            .map_err(|e| redis_error("Failed to release Redis lock", e))?;

        if deleted == 0 {
            warn!(lock_key = %self.key, "Redis lock expired before release");
        }
        Ok(())
    }
}
