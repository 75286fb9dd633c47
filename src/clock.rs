//! Clock abstraction
//!
//! Retry backoff, notification expiry and the periodic sweep all go through
//! a [`Clock`] so that callers can swap in a deterministic time source.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Source of time and delays for the resilience layer
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend for `duration`
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Clock backed by the tokio timer wheel.
///
/// Works with `tokio::time::pause()` so tests can advance time manually.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Default shared clock
pub fn default_clock() -> SharedClock {
    Arc::new(TokioClock)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Clock that records every requested sleep and returns immediately
    #[derive(Default)]
    pub struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingClock {
        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().clone()
        }
    }

    impl Clock for RecordingClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            self.sleeps.lock().push(duration);
            Box::pin(async {})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();

        clock.sleep(Duration::from_secs(30)).await;

        assert!(clock.now() - start >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_pending_until_advanced() {
        let mut sleep = tokio_test::task::spawn(TokioClock.sleep(Duration::from_secs(5)));
        tokio_test::assert_pending!(sleep.poll());

        tokio::time::advance(Duration::from_secs(5)).await;

        tokio_test::assert_ready!(sleep.poll());
    }
}
