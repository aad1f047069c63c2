//! Terminal relay configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default maximum number of concurrent terminal tabs
pub const DEFAULT_MAX_TABS: usize = 8;

/// Default minimum interval between activity heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Command-line client named in user-facing guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CliClient {
    /// Upstream Kubernetes client
    #[default]
    Kubectl,
    /// OpenShift client
    Oc,
}

impl fmt::Display for CliClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kubectl => write!(f, "kubectl"),
            Self::Oc => write!(f, "oc"),
        }
    }
}

/// Where the cluster API proxy lives and how to authenticate against it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    /// Base URL of the console backend (`http(s)://host[:port][/prefix]`)
    pub base_url: String,
    /// Optional bearer token sent on every request
    #[serde(default)]
    pub token: Option<String>,
}

impl ClusterEndpoint {
    /// Create an endpoint without credentials
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
        }
    }

    /// Attach a bearer token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Tunables for terminal tabs and exec sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Maximum number of tabs a manager will hold
    #[serde(default = "default_max_tabs")]
    pub max_tabs: usize,
    /// Minimum seconds between two activity heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Client named in the "no shell" guidance
    #[serde(default)]
    pub cli_client: CliClient,
    /// Extra sub-protocols offered before the channel protocol
    /// (impersonation tokens, for example)
    #[serde(default)]
    pub subprotocols: Vec<String>,
    /// Seconds to wait for the WebSocket handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Workspace that activity heartbeats are attributed to
    #[serde(default)]
    pub workspace: Option<String>,
}

fn default_max_tabs() -> usize {
    DEFAULT_MAX_TABS
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_connect_timeout() -> u64 {
    30
}

impl TerminalConfig {
    /// Heartbeat interval as a `Duration`
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Handshake timeout as a `Duration`
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_tabs: default_max_tabs(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            cli_client: CliClient::default(),
            subprotocols: Vec::new(),
            connect_timeout_secs: default_connect_timeout(),
            workspace: None,
        }
    }
}
