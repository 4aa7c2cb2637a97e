//! Retry configuration for conflicting transactions

use std::time::Duration;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for [`InMemoryDataStore::commit_with_retry`]
///
/// Only Conflict failures are retried; each retry runs the closure again on
/// a fresh transaction.
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new().with_max_retries(5).with_base_delay_ms(1);
/// store.commit_with_retry(config, |tx| tx.merge(&path, DataNode::leaf(1)))?;
/// ```
///
/// [`InMemoryDataStore::commit_with_retry`]: crate::InMemoryDataStore::commit_with_retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Default retry settings
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before retry number `attempt` (0-based), doubling each time
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        let shift = attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
