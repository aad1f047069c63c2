//! Debounced refresh
//!
//! Bursts of change notifications collapse into one refresh pass run with
//! the latest snapshot, once no notification has arrived for a full window.
//! A single worker task runs the passes, so they never overlap; a
//! notification that arrives during a pass leads to exactly one more pass.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ingest::CatalogIngestor;
use crate::schema::CatalogSource;

/// Work run when the debounce window elapses
#[async_trait]
pub trait RefreshHandler<S>: Send + Sync {
    /// Run one refresh pass with the latest snapshot
    async fn refresh(&self, snapshot: S);
}

#[async_trait]
impl RefreshHandler<Vec<CatalogSource>> for CatalogIngestor {
    async fn refresh(&self, snapshot: Vec<CatalogSource>) {
        match self.ingest(&snapshot).await {
            Ok(report) => info!(
                items = report.items_derived,
                failed_sources = report.failed_sources().count(),
                "Catalog refreshed"
            ),
            Err(e) => warn!(code = e.code(), error = %e, "Catalog refresh failed"),
        }
    }
}

/// Trailing-edge debouncer in front of a [`RefreshHandler`]
pub struct DebouncedRefreshTrigger<S> {
    tx: mpsc::UnboundedSender<S>,
    cancel: CancellationToken,
}

impl<S: Send + 'static> DebouncedRefreshTrigger<S> {
    /// Start the worker task. Must be called from within a Tokio runtime.
    pub fn new(window: Duration, handler: Arc<dyn RefreshHandler<S>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(worker(window, handler, rx, cancel.clone()));
        Self { tx, cancel }
    }

    /// Record a snapshot and restart the window.
    ///
    /// Returns `false` once the trigger has been shut down.
    pub fn notify(&self, snapshot: S) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(snapshot).is_ok()
    }

    /// Cancel any pending pass; no pass starts after this returns.
    /// A pass already running is left to finish.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Shutting down refresh trigger");
            self.cancel.cancel();
        }
    }

    /// Whether `shutdown` has been called
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<S> Drop for DebouncedRefreshTrigger<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn worker<S>(
    window: Duration,
    handler: Arc<dyn RefreshHandler<S>>,
    mut rx: mpsc::UnboundedReceiver<S>,
    cancel: CancellationToken,
) {
    loop {
        let mut pending = tokio::select! {
            _ = cancel.cancelled() => return,
            next = rx.recv() => match next {
                Some(snapshot) => snapshot,
                None => return,
            },
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = rx.recv() => match next {
                    Some(snapshot) => pending = snapshot,
                    None => return,
                },
                _ = tokio::time::sleep(window) => break,
            }
        }

        if cancel.is_cancelled() {
            return;
        }
        debug!("Debounce window elapsed, refreshing");
        handler.refresh(pending).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const WINDOW: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
        pass_duration: Duration,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl Recorder {
        fn slow(pass_duration: Duration) -> Self {
            Self {
                pass_duration,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RefreshHandler<&'static str> for Recorder {
        async fn refresh(&self, snapshot: &'static str) {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            self.calls.lock().unwrap().push(snapshot);
            if !self.pass_duration.is_zero() {
                tokio::time::sleep(self.pass_duration).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_snapshot_wins() {
        let recorder = Arc::new(Recorder::default());
        let trigger = DebouncedRefreshTrigger::new(WINDOW, recorder.clone());

        trigger.notify("s1");
        tokio::time::sleep(secs(1.0)).await;
        trigger.notify("s2");
        tokio::time::sleep(secs(5.1)).await;

        assert_eq!(recorder.calls(), vec!["s2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_runs_before_window_elapses() {
        let recorder = Arc::new(Recorder::default());
        let trigger = DebouncedRefreshTrigger::new(WINDOW, recorder.clone());

        trigger.notify("s1");
        tokio::time::sleep(secs(4.9)).await;
        assert!(recorder.calls().is_empty());

        tokio::time::sleep(secs(0.2)).await;
        assert_eq!(recorder.calls(), vec!["s1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_notification_restarts_window() {
        let recorder = Arc::new(Recorder::default());
        let trigger = DebouncedRefreshTrigger::new(WINDOW, recorder.clone());

        for snapshot in ["a", "b", "c", "d"] {
            trigger.notify(snapshot);
            tokio::time::sleep(secs(4.0)).await;
        }
        assert!(recorder.calls().is_empty());

        tokio::time::sleep(secs(1.1)).await;
        assert_eq!(recorder.calls(), vec!["d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_during_pass_runs_once_more() {
        let recorder = Arc::new(Recorder::slow(secs(10.0)));
        let trigger = DebouncedRefreshTrigger::new(WINDOW, recorder.clone());

        trigger.notify("s1");
        // pass runs from t=5 to t=15
        tokio::time::sleep(secs(7.0)).await;
        trigger.notify("s2");
        tokio::time::sleep(secs(1.0)).await;
        trigger.notify("s3");

        tokio::time::sleep(secs(30.0)).await;
        assert_eq!(recorder.calls(), vec!["s1", "s3"]);
        assert_eq!(recorder.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_pass() {
        let recorder = Arc::new(Recorder::default());
        let trigger = DebouncedRefreshTrigger::new(WINDOW, recorder.clone());

        trigger.notify("s1");
        tokio::time::sleep(secs(1.0)).await;
        trigger.shutdown();
        assert!(trigger.is_shutdown());
        assert!(!trigger.notify("s2"));

        tokio::time::sleep(secs(30.0)).await;
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_pass() {
        let recorder = Arc::new(Recorder::default());
        let trigger = DebouncedRefreshTrigger::new(WINDOW, recorder.clone());

        trigger.notify("s1");
        drop(trigger);

        tokio::time::sleep(secs(30.0)).await;
        assert!(recorder.calls().is_empty());
    }
}
