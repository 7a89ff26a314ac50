// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Circuit breaker for the remote tier, using the recloser crate.
//!
//! When the remote keeps failing, every sync tick would otherwise wait on
//! the network error again. Once tripped, calls are rejected immediately
//! until the recovery timeout lets a probe through.
//!
//! States:
//! - Closed: normal operation, calls pass through
//! - Open: remote unhealthy, calls fail fast
//! - HalfOpen: probing whether the remote recovered
//!
//! A rejected call surfaces to the tier as [`StorageError::RemoteUnreachable`],
//! the same as a network failure, so callers never special-case the breaker.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use tracing::{debug, warn};

use crate::storage::traits::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The breaker is open; the operation was not attempted
    #[error("circuit breaker open, request rejected")]
    Rejected,

    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

impl From<CircuitError<StorageError>> for StorageError {
    fn from(err: CircuitError<StorageError>) -> Self {
        match err {
            CircuitError::Rejected => StorageError::RemoteUnreachable("circuit open".to_string()),
            CircuitError::Inner(e) => e,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Window of recent calls judged while closed; all failing trips the breaker
    pub failure_threshold: u32,
    /// Probe calls allowed while half-open
    pub success_threshold: u32,
    /// How long to stay open before probing
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitConfig {
    /// Fast recovery for tests
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            success_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

/// Call counters since the breaker was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitStats {
    pub calls: u64,
    pub failures: u64,
    /// Calls refused while open
    pub rejections: u64,
}

pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,
    calls: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        // Trip only when every call in the closed window failed
        let recloser = Recloser::custom()
            .error_rate(0.99)
            .closed_len(config.failure_threshold.max(1) as usize)
            .half_open_len(config.success_threshold.max(1) as usize)
            .open_wait(config.recovery_timeout)
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` through the breaker. The returned future is never polled while the breaker is open.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let outcome = self.inner.call(f()).await;
        let status = match &outcome {
            Ok(_) => "success",
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                warn!(circuit = %self.name, "Circuit open, call rejected");
                "rejected"
            }
            Err(RecloserError::Inner(_)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "Circuit call failed");
                "failure"
            }
        };
        crate::metrics::record_circuit_call(&self.name, status);

        outcome.map_err(|err| match err {
            RecloserError::Rejected => CircuitError::Rejected,
            RecloserError::Inner(e) => CircuitError::Inner(e),
        })
    }

    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_successful_calls() {
        let cb = CircuitBreaker::new("remote", CircuitConfig::test());
        let result: Result<u8, CircuitError<String>> = cb.call(|| async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(cb.stats(), CircuitStats { calls: 1, failures: 0, rejections: 0 });
    }

    #[tokio::test]
    async fn test_trips_after_repeated_failures() {
        let cb = CircuitBreaker::new("remote", CircuitConfig::test());

        let mut rejected = false;
        for _ in 0..6 {
            let result: Result<(), CircuitError<String>> =
                cb.call(|| async { Err("offline".to_string()) }).await;
            if matches!(result, Err(CircuitError::Rejected)) {
                rejected = true;
                break;
            }
        }

        assert!(rejected, "breaker never opened");
        let stats = cb.stats();
        assert!(stats.failures >= 2);
        assert_eq!(stats.rejections, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_does_not_invoke_operation() {
        let cb = CircuitBreaker::new("remote", CircuitConfig::test());
        for _ in 0..2 {
            let _: Result<(), CircuitError<String>> =
                cb.call(|| async { Err("offline".to_string()) }).await;
        }

        let invoked = AtomicU64::new(0);
        let result: Result<(), CircuitError<String>> = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CircuitError::Rejected)));
        assert_eq!(invoked.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_storage_error_flattening() {
        let rejected: StorageError = CircuitError::Rejected.into();
        assert!(matches!(rejected, StorageError::RemoteUnreachable(_)));

        let inner: StorageError = CircuitError::Inner(StorageError::RemoteUnconfigured).into();
        assert_eq!(inner, StorageError::RemoteUnconfigured);
    }
}
