//! Resilience Layer
//!
//! Circuit breaking and bounded retries around calls to the storage
//! collaborator.
//!
//! - [`CircuitBreaker`]: CLOSED / OPEN / HALF_OPEN state machine over a count-based window
//! - [`RetryConfig`]: bounded attempts with fixed or exponential delay
//! - [`ResiliencePolicy`]: breaker wrapped around retries; one instance per operation family
//!
//! Retries run to completion before the breaker sees a single success or
//! failure for the call.

mod circuit_breaker;
mod retry;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryConfig;

/// Why a protected call did not produce a value.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The breaker refused the call; the collaborator was not invoked.
    #[error("circuit '{0}' is open")]
    CircuitOpen(String),

    /// Every attempt failed; carries the last error.
    #[error("retries exhausted: {0}")]
    Exhausted(#[source] StorageError),
}

/// Breaker and retry settings shared by every operation family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

/// Circuit breaker plus retry policy for one operation family.
#[derive(Debug)]
pub struct ResiliencePolicy {
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl ResiliencePolicy {
    pub fn new(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(name, config.circuit_breaker.clone()),
            retry: config.retry.clone(),
        }
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `op` through the breaker and the retry loop.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let Some(permit) = self.breaker.try_acquire() else {
            return Err(ResilienceError::CircuitOpen(self.name().to_string()));
        };

        match self.retry.run(self.name(), op).await {
            Ok(value) => {
                self.breaker.on_success(permit);
                Ok(value)
            }
            Err(e) => {
                self.breaker.on_failure(permit);
                Err(ResilienceError::Exhausted(e))
            }
        }
    }
}
