//! Activity heartbeat
//!
//! Terminal workspaces are culled by the backend when idle. The
//! [`ActivityTicker`] tells the backend a user is still there, at most once
//! per interval, no matter how often it is poked (every keystroke, every
//! focus event).

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ClusterEndpoint;
use crate::error::{Error, Result};

/// Dispatches a heartbeat for a workspace
#[cfg_attr(test, mockall::automock)]
pub trait HeartbeatSender: Send + Sync {
    /// Fire a heartbeat. Must not block; delivery is best effort.
    fn send_heartbeat(&self, workspace: &str, namespace: &str);
}

/// Rate-limited heartbeat for one (workspace, namespace) pair
pub struct ActivityTicker {
    workspace: String,
    namespace: String,
    interval: Duration,
    last_sent: Mutex<Option<Instant>>,
    sender: std::sync::Arc<dyn HeartbeatSender>,
}

impl ActivityTicker {
    /// Create a ticker; nothing has been sent yet
    #[must_use]
    pub fn new(
        workspace: impl Into<String>,
        namespace: impl Into<String>,
        interval: Duration,
        sender: std::sync::Arc<dyn HeartbeatSender>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            namespace: namespace.into(),
            interval,
            last_sent: Mutex::new(None),
            sender,
        }
    }

    /// Minimum interval between heartbeats
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record activity now. Returns whether a heartbeat was dispatched.
    pub fn tick(&self) -> bool {
        self.tick_at(Instant::now())
    }

    /// Record activity at `now`. A heartbeat goes out when none has been sent
    /// yet or at least one interval has passed since the last one; otherwise
    /// the tick is dropped and the timer is left alone.
    pub fn tick_at(&self, now: Instant) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        let due = match *last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if !due {
            return false;
        }
        *last_sent = Some(now);
        drop(last_sent);

        debug!(workspace = %self.workspace, namespace = %self.namespace, "Sending activity heartbeat");
        self.sender.send_heartbeat(&self.workspace, &self.namespace);
        true
    }
}

/// Heartbeat over HTTP: `POST .../activity/tick`, response ignored
#[derive(Clone)]
pub struct HttpHeartbeat {
    endpoint: ClusterEndpoint,
    client: reqwest::Client,
}

impl HttpHeartbeat {
    /// Create a heartbeat client for the console backend
    #[must_use]
    pub fn new(endpoint: ClusterEndpoint) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    /// Heartbeat URL for a workspace
    #[must_use]
    pub fn tick_url(&self, workspace: &str, namespace: &str) -> String {
        format!(
            "{}/api/terminal/proxy/{}/{}/exec/activity/tick",
            self.endpoint.base_url.trim_end_matches('/'),
            urlencoding::encode(namespace),
            urlencoding::encode(workspace),
        )
    }

    /// Send one heartbeat and wait for the response
    pub async fn post(&self, workspace: &str, namespace: &str) -> Result<()> {
        let mut request = self.client.post(self.tick_url(workspace, namespace));
        if let Some(token) = &self.endpoint.token {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| Error::Heartbeat(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Heartbeat(format!("HTTP {}", resp.status())));
        }
        Ok(())
    }
}

impl HeartbeatSender for HttpHeartbeat {
    fn send_heartbeat(&self, workspace: &str, namespace: &str) {
        let this = self.clone();
        let workspace = workspace.to_string();
        let namespace = namespace.to_string();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available for activity heartbeat");
            return;
        };
        handle.spawn(async move {
            if let Err(e) = this.post(&workspace, &namespace).await {
                warn!(error = %e, workspace = %workspace, "Activity heartbeat failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(60_000);

    #[derive(Default)]
    struct CountingSender {
        sent: AtomicUsize,
    }

    impl HeartbeatSender for CountingSender {
        fn send_heartbeat(&self, _workspace: &str, _namespace: &str) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ticker(sender: Arc<CountingSender>) -> ActivityTicker {
        ActivityTicker::new("ws", "ns", INTERVAL, sender)
    }

    #[test]
    fn test_throttling_sequence() {
        let sender = Arc::new(CountingSender::default());
        let ticker = ticker(sender.clone());
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        assert!(ticker.tick_at(at(0)));
        assert!(!ticker.tick_at(at(59_000)));
        // boundary is inclusive: exactly one interval later is due
        assert!(ticker.tick_at(at(60_000)));
        assert!(!ticker.tick_at(at(60_001)));
        assert!(ticker.tick_at(at(660_001)));

        assert_eq!(sender.sent.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_boundary_one_millisecond_short() {
        let sender = Arc::new(CountingSender::default());
        let ticker = ticker(sender.clone());
        let t0 = Instant::now();

        assert!(ticker.tick_at(t0));
        assert!(!ticker.tick_at(t0 + Duration::from_millis(59_999)));
        // the dropped tick did not move the timer
        assert!(ticker.tick_at(t0 + Duration::from_millis(60_001)));
        assert_eq!(sender.sent.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_skipped_ticks_are_not_deferred() {
        let sender = Arc::new(CountingSender::default());
        let ticker = ticker(sender.clone());
        let t0 = Instant::now();

        ticker.tick_at(t0);
        for ms in (1_000..60_000).step_by(1_000) {
            ticker.tick_at(t0 + Duration::from_millis(ms));
        }
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconstruction_resets_state() {
        let sender = Arc::new(CountingSender::default());
        let t0 = Instant::now();

        assert!(ticker(sender.clone()).tick_at(t0));
        assert!(ticker(sender.clone()).tick_at(t0 + Duration::from_millis(1)));
        assert_eq!(sender.sent.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sender_receives_workspace_and_namespace() {
        let mut sender = MockHeartbeatSender::new();
        sender
            .expect_send_heartbeat()
            .withf(|workspace, namespace| workspace == "terminal-abc" && namespace == "dev")
            .times(1)
            .return_const(());

        let ticker = ActivityTicker::new("terminal-abc", "dev", INTERVAL, Arc::new(sender));
        assert!(ticker.tick());
        assert!(!ticker.tick());
    }

    #[test]
    fn test_tick_url() {
        let heartbeat = HttpHeartbeat::new(ClusterEndpoint::new("https://console.example.com/"));
        assert_eq!(
            heartbeat.tick_url("terminal-abc", "dev"),
            "https://console.example.com/api/terminal/proxy/dev/terminal-abc/exec/activity/tick"
        );
    }
}
