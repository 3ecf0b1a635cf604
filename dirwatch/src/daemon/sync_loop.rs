use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Work performed once per loop iteration.
#[async_trait]
pub trait CycleHandler: Send {
    async fn on_cycle(&mut self);
}

/// Repeat-with-fixed-delay driver for a [`CycleHandler`].
///
/// # Note
/// Cycles never overlap: the delay starts when the previous cycle returns, so a
/// slow cycle pushes the next one back instead of piling up. The first cycle
/// runs immediately.
///
/// Cancelling the token stops the loop once the running cycle completes; an
/// in-flight cycle is never interrupted.
///
/// # Example
/// ```ignore
/// let sync_loop = SyncLoop::new(poller, Duration::from_millis(100));
/// let token = sync_loop.cancellation_token();
/// tokio::spawn(async move { shutdown_signal().await; token.cancel() });
/// sync_loop.run().await;
/// ```
pub struct SyncLoop<H> {
    handler: H,
    interval: Duration,
    cancel: CancellationToken,
}

impl<H: CycleHandler> SyncLoop<H> {
    pub fn new(handler: H, interval: Duration) -> Self {
        Self {
            handler,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Share an existing token instead of the loop's own.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled and hand the handler back.
    pub async fn run(mut self) -> H {
        let mut cycles: u64 = 0;
        while !self.cancel.is_cancelled() {
            self.handler.on_cycle().await;
            cycles += 1;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }
        info!(cycles, "sync loop stopped");
        self.handler
    }
}
