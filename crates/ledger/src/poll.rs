//! Bounded polling of ledger state.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// How often and how many times a condition is polled before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl PollPolicy {
    /// Quorum and weight-threshold polling: 100ms, ten minutes total.
    pub fn quorum() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_polls: 6_000,
        }
    }

    /// Event-log polling: 300ms, ten minutes total.
    pub fn events() -> Self {
        Self {
            interval: Duration::from_millis(300),
            max_polls: 2_000,
        }
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll `probe` until it yields `Some`, returning the value.
    ///
    /// Transient read errors are logged and polling continues; other
    /// errors are returned immediately. Exhausting the budget yields
    /// [`LedgerError::Timeout`].
    pub async fn wait_for<F, Fut, T>(&self, what: &str, mut probe: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<Option<T>>>,
    {
        for poll in 1..=self.max_polls {
            match probe().await {
                Ok(Some(value)) => {
                    debug!(what, polls = poll, "condition met");
                    return Ok(value);
                }
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    warn!(what, poll, error = %err, "ledger read failed");
                }
                Err(err) => return Err(err),
            }
            if poll < self.max_polls {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(LedgerError::Timeout {
            what: what.to_string(),
            polls: self.max_polls,
        })
    }

    /// Poll `condition` until it returns `true`.
    pub async fn wait_until<F, Fut>(&self, what: &str, mut condition: F) -> LedgerResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<bool>>,
    {
        self.wait_for(what, || {
            let fut = condition();
            async move { fut.await.map(|done| done.then_some(())) }
        })
        .await
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::quorum()
    }
}
