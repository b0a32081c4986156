use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot broadcast flag. Once set it stays set.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Resolves once [`StopSignal::stop`] has been called, including before this call.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `stop` cannot be missed.
            notified.as_mut().enable();

            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_stopped() {
        let s = StopSignal::new();
        s.stop();
        tokio::time::timeout(Duration::from_millis(100), s.wait())
            .await
            .unwrap_or_else(|_| panic!("wait did not return"));
    }

    #[tokio::test]
    async fn wait_wakes_all_waiters() {
        let s = Arc::new(StopSignal::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let s = s.clone();
                tokio::spawn(async move { s.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!s.is_stopped());
        s.stop();

        for w in waiters {
            tokio::time::timeout(Duration::from_millis(500), w)
                .await
                .unwrap_or_else(|_| panic!("waiter did not wake"))
                .unwrap_or_else(|e| panic!("waiter panicked: {e}"));
        }
    }
}
