// ABOUTME: Injectable sleeping (Sleeper/TokioSleeper) and the Pacer that enforces politeness delays.
// ABOUTME: The Pacer serializes request starts so any detail concurrency still honors the delay budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::options::PolitenessPolicy;

/// Clock abstraction for every deliberate suspension (politeness delay,
/// retry backoff, scroll settle). Tests inject a recording implementation.
pub trait Sleeper: fmt::Debug + Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Spaces out requests of one crawl.
///
/// The first request goes out immediately; every later one waits
/// `base + random(jitter)`. The gate is held while sleeping, so concurrent
/// callers start their requests one delay apart.
pub struct Pacer {
    policy: PolitenessPolicy,
    sleeper: Arc<dyn Sleeper>,
    started: Mutex<bool>,
}

impl fmt::Debug for Pacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pacer")
            .field("policy", &self.policy)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl Pacer {
    pub fn new(policy: PolitenessPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            sleeper,
            started: Mutex::new(false),
        }
    }

    /// Waits until the next request may start.
    pub async fn pause(&self) {
        let mut started = self.started.lock().await;
        if *started {
            let delay = self.policy.next_delay();
            if !delay.is_zero() {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "politeness delay");
                self.sleeper.sleep(delay).await;
            }
        }
        *started = true;
    }
}
