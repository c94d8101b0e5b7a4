//! Cancellation and deadline checks for a migration run.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{MigrateError, Result};

/// Operator cancellation plus an optional upper bound for the invocation.
///
/// Every store call of the engine runs under [`RunControl::guard`], so an
/// abort also interrupts a call that never returns.
#[derive(Debug, Clone)]
pub struct RunControl {
    cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl RunControl {
    /// Control with no deadline.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Abort once `limit` has elapsed from now.
    pub fn with_max_duration(mut self, limit: Option<Duration>) -> Self {
        self.deadline = limit.map(|d| (Instant::now() + d, d));
        self
    }

    /// A control that never aborts.
    pub fn unbounded() -> Self {
        Self::new(CancellationToken::new())
    }

    /// The underlying token, for signal handlers.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail with `Cancelled` or `DeadlineExceeded` if the run must stop.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        if let Some((at, limit)) = self.deadline {
            if Instant::now() >= at {
                return Err(MigrateError::DeadlineExceeded(limit));
            }
        }
        Ok(())
    }

    /// Run one store call, abandoning it on cancellation or at the deadline.
    pub async fn guard<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some((at, limit)) => {
                    tokio::time::sleep_until(at).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MigrateError::Cancelled),
            limit = deadline => Err(MigrateError::DeadlineExceeded(limit)),
            out = call => out,
        }
    }
}
