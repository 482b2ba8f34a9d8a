use std::pin::Pin;
use std::task::Context;
use std::time::Duration;

use futures::Future;
use tokio::time::{sleep, Instant, Sleep};

/// A background job run periodically while the handler is being polled.
#[derive(Debug)]
pub(crate) struct PeriodicJob {
    interval: Duration,
    delay: Pin<Box<Sleep>>,
}

impl PeriodicJob {
    pub fn new(interval: Duration) -> Self {
        Self {
            delay: Box::pin(sleep(interval)),
            interval,
        }
    }

    /// Returns `true` if the job is currently not running but ready to be
    /// run, `false` otherwise.
    pub fn is_ready(&mut self, cx: &mut Context<'_>) -> bool {
        if self.delay.as_mut().poll(cx).is_ready() {
            self.delay.as_mut().reset(Instant::now() + self.interval);
            return true;
        }
        false
    }
}
