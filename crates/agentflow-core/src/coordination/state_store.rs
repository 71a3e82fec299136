//! TTL key-value store port used for cross-process coordination.

use std::time::Duration;

use thiserror::Error;

/// Errors from state store adapters.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("state store error: {0}")]
    Store(String),
}

/// Shared string store with per-key expiry.
///
/// Every operation must be atomic with respect to other callers, including
/// callers in other processes sharing the same backing store. Expired keys
/// behave as absent.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionStateStore: Send + Sync {
    /// Create `key` only if absent. Returns whether this call created it.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool, CoordinationError>> + Send;

    /// Remove `key` if present.
    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), CoordinationError>> + Send;

    /// Increment an integer counter (absent counts as 0) and refresh its TTL.
    /// Returns the new value.
    fn increment(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<i64, CoordinationError>> + Send;

    /// Overwrite `key` unconditionally.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), CoordinationError>> + Send;

    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, CoordinationError>> + Send;
}
