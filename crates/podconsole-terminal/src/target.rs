//! Exec target description and WebSocket URL construction

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::config::CliClient;
use crate::error::{Error, Result};

/// Command run when the caller does not specify one
pub const DEFAULT_COMMAND: &[&str] = &["sh", "-i", "-c", "TERM=xterm sh"];

/// The container process a terminal attaches to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTarget {
    /// Namespace of the pod
    pub namespace: String,
    /// Pod name
    pub pod: String,
    /// Container name
    pub container: String,
    /// Command vector executed in the container
    pub command: Vec<String>,
}

impl ExecTarget {
    /// Create a target running the default interactive shell
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
            command: DEFAULT_COMMAND.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Replace the command vector
    #[must_use]
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Path and query of the exec endpoint, relative to the console base URL
    #[must_use]
    pub fn exec_path(&self) -> String {
        let mut path = format!(
            "api/kubernetes/api/v1/namespaces/{}/pods/{}/exec?stdout=1&stdin=1&stderr=1&tty=1&container={}",
            urlencoding::encode(&self.namespace),
            urlencoding::encode(&self.pod),
            urlencoding::encode(&self.container),
        );
        for arg in &self.command {
            path.push_str("&command=");
            path.push_str(&urlencoding::encode(arg));
        }
        path
    }

    /// Full WebSocket URL for this target.
    ///
    /// `http` bases become `ws`, `https` bases become `wss`.
    pub fn websocket_url(&self, base_url: &str) -> Result<Url> {
        let mut base = Url::parse(base_url)?;
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::InvalidTarget(format!(
                    "unsupported scheme {other:?} in {base_url}"
                )))
            }
        };
        base.set_scheme(scheme)
            .map_err(|()| Error::InvalidTarget(format!("cannot use {scheme} with {base_url}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(&self.exec_path())?)
    }

    /// The command a user can run by hand to reach the same container
    #[must_use]
    pub fn manual_exec_command(&self, client: CliClient) -> String {
        format!(
            "{client} -n {} exec {} -c {} -ti <command>",
            self.namespace, self.pod, self.container
        )
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}
