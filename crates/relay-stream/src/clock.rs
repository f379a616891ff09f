//! Injectable time source.
//!
//! The throttle timer and retry backoff sleep through a [`Clock`] rather than
//! calling tokio directly. [`TokioClock`] honours tokio's paused test clock,
//! so `#[tokio::test(start_paused = true)]` advances virtual time
//! deterministically.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

/// Source of time and sleeps.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Sleep until `deadline`.
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()>;

    /// Sleep for `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleep_until(self.now() + duration)
    }
}

/// Clock backed by `tokio::time`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_virtual_time() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(500)).await;
        assert!(clock.now() - start >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_until_past_deadline_returns() {
        let clock = TokioClock;
        let past = clock.now();
        clock.sleep(Duration::from_millis(10)).await;
        clock.sleep_until(past).await;
    }
}
