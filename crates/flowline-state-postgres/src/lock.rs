//! Flow lock backed by Postgres session advisory locks
//!
//! Each held key pins one pooled connection for the lifetime of the handle,
//! since advisory locks belong to the session that took them.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use flowline_core::{CoreError, LockHandle, LockService};

use crate::PostgresConnection;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

fn lock_timeout(key: &str, timeout: Duration) -> CoreError {
    CoreError::LockTimeout {
        key: key.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    }
}

/// [`LockService`] shared by every node connected to the same database
#[derive(Clone)]
pub struct PgAdvisoryLockService {
    conn: PostgresConnection,
}

impl PgAdvisoryLockService {
    /// Create a lock service over the given connection pool
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl LockService for PgAdvisoryLockService {
    async fn acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Box<dyn LockHandle>, CoreError> {
        let deadline = Instant::now() + timeout;

        let mut conn = match tokio::time::timeout(timeout, self.conn.pool().acquire()).await {
            Ok(conn) => conn.map_err(|e| {
                CoreError::StateStore(format!("Failed to acquire connection for lock: {}", e))
            })?,
            Err(_) => return Err(lock_timeout(key, timeout)),
        };

        loop {
            let locked: bool =
                sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
                    .bind(key)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(|e| {
                        conn.close_on_drop();
                        CoreError::StateStore(format!("Failed to take advisory lock: {}", e))
                    })?;

            if locked {
                debug!(lock_key = %key, "Advisory lock taken");
                return Ok(Box::new(PgAdvisoryLockHandle {
                    key: key.to_string(),
                    conn: Mutex::new(Some(conn)),
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(lock_key = %key, timeout_ms = timeout.as_millis() as u64, "Advisory lock acquisition timed out");
                return Err(lock_timeout(key, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

struct PgAdvisoryLockHandle {
    key: String,
    conn: Mutex<Option<PoolConnection<Postgres>>>,
}

#[async_trait]
impl LockHandle for PgAdvisoryLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(mut self: Box<Self>) -> Result<(), CoreError> {
        let Some(mut conn) = self.conn.get_mut().take() else {
            return Ok(());
        };

        let unlocked: bool = sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
            .bind(&self.key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                conn.close_on_drop();
                CoreError::StateStore(format!("Failed to release advisory lock: {}", e))
            })?;

        if !unlocked {
            warn!(lock_key = %self.key, "Advisory lock was not held at release");
        }
        Ok(())
    }
}

impl Drop for PgAdvisoryLockHandle {
    fn drop(&mut self) {
        // Closing the session is the only way to free the lock without awaiting
        if let Some(conn) = self.conn.get_mut().as_mut() {
            conn.close_on_drop();
        }
    }
}
