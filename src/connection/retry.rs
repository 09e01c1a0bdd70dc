use std::{pin::Pin, time::Duration};
use tokio::time::{sleep, Sleep};

/// One shot fixed delay timer. Error, close and timeout transitions all
/// schedule their reconnect through this.
pub struct RetryTimer {
    delay: Duration,
    pending: Option<Pin<Box<Sleep>>>,
}

impl RetryTimer {
    pub fn new(delay: Duration) -> Self {
        RetryTimer {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule the retry. Re-arming replaces a pending one.
    pub fn arm(&mut self) {
        self.pending = Some(Box::pin(sleep(self.delay)));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Resolves once the armed delay has elapsed and disarms the timer.
    /// Never resolves while disarmed.
    pub async fn fired(&mut self) {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.as_mut().await;
                self.pending = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
