//! Propagation delay between the last deployment and the first verification

use std::time::Duration;

use async_trait::async_trait;

/// Delay observed by default before verification starts
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(60);

#[async_trait]
pub trait PropagationWaiter: Send + Sync {
    async fn wait(&self);
}

/// Sleeps for a fixed duration; no polling of the explorer
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    duration: Duration,
}

impl FixedDelay {
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_PROPAGATION_DELAY)
    }
}

#[async_trait]
impl PropagationWaiter for FixedDelay {
    async fn wait(&self) {
        if self.duration.is_zero() {
            return;
        }
        tracing::info!(delay = ?self.duration, "Waiting for explorer to index deployments");
        tokio::time::sleep(self.duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_default_is_sixty_seconds() {
        assert_eq!(FixedDelay::default().duration(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_waits_at_least_duration() {
        let waiter = FixedDelay::new(Duration::from_millis(20));
        let start = Instant::now();
        waiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_zero_delay_returns_immediately() {
        let waiter = FixedDelay::new(Duration::ZERO);
        let start = Instant::now();
        waiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
