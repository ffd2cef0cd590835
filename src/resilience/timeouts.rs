//! Timeout enforcement.
//!
//! # Responsibilities
//! - Carry one wall-clock deadline through an upstream exchange
//! - Bound both the time-to-headers and the body transfer with the same instant
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the timed-out future drops the
//!   in-flight connection
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

use tokio::time::{error::Elapsed, Instant, Sleep};

/// A fixed point in time by which an operation must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    budget: Duration,
    expires_at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            budget,
            expires_at: Instant::now() + budget,
        }
    }

    /// The total time this deadline allowed.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run `fut` until it completes or the deadline passes.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Elapsed>
    where
        F: Future,
    {
        tokio::time::timeout_at(self.expires_at, fut).await
    }

    /// A timer that fires when the deadline passes.
    pub fn expiry(&self) -> Sleep {
        tokio::time::sleep_until(self.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_budget() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let value = deadline.run(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(deadline.budget(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_elapses() {
        let deadline = Deadline::after(Duration::from_millis(20));
        let result = deadline
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert!(result.is_err());
        assert!(Instant::now() >= deadline.expires_at);
    }

    #[tokio::test]
    async fn test_expiry_timer_fires() {
        let deadline = Deadline::after(Duration::from_millis(10));
        deadline.expiry().await;
        assert!(Instant::now() >= deadline.expires_at);
    }
}
