//! Keyed mutual exclusion
//!
//! [`LockService`] admits one holder per key. Acquisition waits at most the
//! given timeout and then fails with [`CoreError::LockTimeout`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::ids::FlowId;
use crate::CoreError;

/// Lock key guarding a flow's version chain
pub fn flow_lock_key(flow_id: &FlowId) -> String {
    format!("flow:{}", flow_id)
}

/// A held lock
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Key this handle holds
    fn key(&self) -> &str;

    /// Release the lock
    async fn release(self: Box<Self>) -> Result<(), CoreError>;
}

/// Keyed lock capability
#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquire `key`, waiting at most `timeout`
    async fn acquire(&self, key: &str, timeout: Duration)
        -> Result<Box<dyn LockHandle>, CoreError>;
}

/// Run `operation` while holding `key`
///
/// The lock is released on every path. A failed release is logged and
/// never replaces the operation's own result.
pub async fn with_lock<T, F, Fut>(
    lock: &dyn LockService,
    key: &str,
    timeout: Duration,
    operation: F,
) -> Result<T, CoreError>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, CoreError>> + Send,
    T: Send,
{
    let handle = lock.acquire(key, timeout).await?;
    tracing::debug!(lock_key = %key, "Lock acquired");

    let result = operation().await;

    if let Err(e) = handle.release().await {
        tracing::error!(lock_key = %key, error = %e, "Failed to release lock");
    } else {
        tracing::debug!(lock_key = %key, "Lock released");
    }

    result
}

pub(crate) fn timeout_error(key: &str, timeout: Duration) -> CoreError {
    CoreError::LockTimeout {
        key: key.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    }
}

/// Single-node lock: a table of async mutexes keyed by lock key
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockService {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl InMemoryLockService {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Box<dyn LockHandle>, CoreError> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(Box::new(InMemoryLockHandle {
                key: key.to_string(),
                guard: Some(guard),
                locks: self.locks.clone(),
            })),
            Err(_) => {
                tracing::warn!(lock_key = %key, timeout_ms = timeout.as_millis() as u64, "Lock acquisition timed out");
                Err(timeout_error(key, timeout))
            }
        }
    }
}

struct InMemoryLockHandle {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

#[async_trait]
impl LockHandle for InMemoryLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(mut self: Box<Self>) -> Result<(), CoreError> {
        drop(self.guard.take());
        // Drop the table entry once nobody else holds or waits on it
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let service = InMemoryLockService::new();
        let handle = service
            .acquire("flow:a", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(handle.key(), "flow:a");
        assert_eq!(service.tracked_keys(), 1);

        handle.release().await.unwrap();
        assert_eq!(service.tracked_keys(), 0);

        let again = service
            .acquire("flow:a", Duration::from_millis(100))
            .await
            .unwrap();
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_holder_times_out() {
        let service = InMemoryLockService::new();
        let held = service
            .acquire("flow:a", Duration::from_millis(100))
            .await
            .unwrap();

        let result = service.acquire("flow:a", Duration::from_millis(20)).await;
        assert_eq!(
            result.err(),
            Some(CoreError::LockTimeout {
                key: "flow:a".to_string(),
                timeout_ms: 20
            })
        );

        held.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let service = InMemoryLockService::new();
        let a = service
            .acquire("flow:a", Duration::from_millis(50))
            .await
            .unwrap();
        let b = service
            .acquire("flow:b", Duration::from_millis(50))
            .await
            .unwrap();
        a.release().await.unwrap();
        b.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let service = InMemoryLockService::new();
        let result: Result<(), CoreError> =
            with_lock(&service, "flow:a", Duration::from_millis(50), || async {
                Err(CoreError::Validation("boom".to_string()))
            })
            .await;
        assert_eq!(result, Err(CoreError::Validation("boom".to_string())));

        let handle = service
            .acquire("flow:a", Duration::from_millis(50))
            .await
            .unwrap();
        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let service = InMemoryLockService::new();
        let held = service
            .acquire("flow:a", Duration::from_millis(50))
            .await
            .unwrap();

        let waiter = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .acquire("flow:a", Duration::from_secs(2))
                    .await
                    .map(|_| ())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        held.release().await.unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }
}
