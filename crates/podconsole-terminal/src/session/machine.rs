//! Pure exec session state machine
//!
//! Socket events go in, sink actions come out. Nothing here touches the
//! network, so every transition can be exercised directly.

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, warn};

use crate::codec::{self, Channel};
use crate::config::CliClient;
use crate::error::Error;
use crate::target::ExecTarget;

/// Error text the exec endpoint reports when the container has no `sh`
pub const NO_SH: &str =
    "starting container process caused \"exec: \\\"sh\\\": executable file not found in $PATH\"";

/// Notice shown when the server drops the connection without a reason
pub const DEFAULT_CLOSE_REASON: &str = "The terminal connection has closed.";

/// Connection state of one exec attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no socket yet
    Idle,
    /// WebSocket handshake in progress
    Connecting,
    /// Frames are flowing
    Open,
    /// Socket gone; a new attempt is needed to continue
    Closed,
    /// Force-closed because of an unrecoverable exec error
    Erroring,
}

impl SessionState {
    /// Whether no further events will be processed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Erroring)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Erroring => write!(f, "erroring"),
        }
    }
}

/// Something the attached terminal sink must do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAction {
    /// Render output bytes
    Write(Vec<u8>),
    /// Clear the display
    Reset,
    /// Render an error-styled notice line
    Notice(String),
}

/// Result of feeding one event to the machine
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    /// Actions for the sink, in order
    pub actions: Vec<SinkAction>,
    /// The socket must be closed by the driver
    pub force_close: bool,
}

impl Step {
    fn none() -> Self {
        Self::default()
    }

    fn action(action: SinkAction) -> Self {
        Self {
            actions: vec![action],
            force_close: false,
        }
    }
}

/// How the socket ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code, if the peer sent one
    pub code: Option<u16>,
    /// Close reason sent by the peer or derived from the transport error
    pub reason: String,
}

impl CloseInfo {
    /// Close code for a connection that dropped without a close frame
    pub const ABNORMAL: u16 = 1006;

    /// A normal close handshake
    #[must_use]
    pub fn normal() -> Self {
        Self {
            code: Some(1000),
            reason: String::new(),
        }
    }

    /// The transport ended without a close handshake
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Some(Self::ABNORMAL),
            reason: reason.into(),
        }
    }

    /// Build from a received close frame
    #[must_use]
    pub fn from_frame(frame: Option<&CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.to_string(),
            },
            None => Self {
                code: None,
                reason: String::new(),
            },
        }
    }

    /// A clean close carries no code or the normal code
    #[must_use]
    pub fn is_clean(&self) -> bool {
        match self.code {
            None => true,
            Some(code) => code == u16::from(CloseCode::Normal),
        }
    }
}

/// One connection attempt's state and one frame of look-behind
#[derive(Debug)]
pub struct SessionMachine {
    target: ExecTarget,
    cli_client: CliClient,
    state: SessionState,
    last_output: Option<Vec<u8>>,
}

impl SessionMachine {
    /// Create an idle machine for a target
    #[must_use]
    pub fn new(target: ExecTarget, cli_client: CliClient) -> Self {
        Self {
            target,
            cli_client,
            state: SessionState::Idle,
            last_output: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Target of this attempt
    #[must_use]
    pub fn target(&self) -> &ExecTarget {
        &self.target
    }

    /// Most recent stdout/stderr payload, if any
    #[must_use]
    pub fn last_output(&self) -> Option<&[u8]> {
        self.last_output.as_deref()
    }

    /// The handshake has started
    pub fn on_connecting(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Connecting;
        }
    }

    /// The handshake failed
    pub fn on_connect_failed(&mut self, reason: &str) -> Step {
        if self.state.is_terminal() {
            return Step::none();
        }
        let err = Error::Connect {
            target: self.target.to_string(),
            reason: reason.to_string(),
        };
        warn!(code = err.code(), error = %err, "Exec connection failed");
        self.state = SessionState::Closed;
        Step::action(SinkAction::Notice(err.to_string()))
    }

    /// The socket opened
    pub fn on_open(&mut self) -> Step {
        if self.state.is_terminal() {
            return Step::none();
        }
        self.state = SessionState::Open;
        self.last_output = None;
        Step::action(SinkAction::Reset)
    }

    /// A text message arrived
    pub fn on_message(&mut self, raw: &str) -> Step {
        if self.state != SessionState::Open {
            debug!(state = %self.state, "Dropping frame outside open state");
            return Step::none();
        }

        let frame = match codec::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(code = e.code(), error = %e, "Dropping malformed frame");
                return Step::none();
            }
        };

        match frame.channel {
            Channel::Stdout | Channel::Stderr => {
                self.last_output = Some(frame.payload.clone());
                Step::action(SinkAction::Write(frame.payload))
            }
            Channel::Error => self.on_error_channel(&frame.payload),
            Channel::Stdin | Channel::Resize => {
                warn!(channel = %frame.channel, "Server wrote a client-only channel");
                Step::none()
            }
        }
    }

    fn on_error_channel(&mut self, payload: &[u8]) -> Step {
        let previous_has_no_sh = self
            .last_output
            .as_deref()
            .is_some_and(|prev| String::from_utf8_lossy(prev).contains(NO_SH));
        let status = String::from_utf8_lossy(payload);

        if !previous_has_no_sh && !status.contains(NO_SH) {
            debug!(status = %status, "Exec status on error channel");
            return Step::none();
        }

        let err = Error::NoShellAvailable {
            pod: self.target.pod.clone(),
            container: self.target.container.clone(),
        };
        warn!(code = err.code(), error = %err, "Closing exec session");

        self.last_output = None;
        self.state = SessionState::Erroring;
        Step {
            actions: vec![SinkAction::Notice(self.no_shell_message())],
            force_close: true,
        }
    }

    /// Guidance shown when the container has no shell
    #[must_use]
    pub fn no_shell_message(&self) -> String {
        format!(
            "This container doesn't have a /bin/sh shell. Try specifying your command in a terminal with:\r\n\r\n  {}",
            self.target.manual_exec_command(self.cli_client)
        )
    }

    /// The socket closed
    pub fn on_close(&mut self, close: &CloseInfo) -> Step {
        if self.state.is_terminal() {
            return Step::none();
        }
        self.state = SessionState::Closed;
        if close.is_clean() {
            debug!(target = %self.target, "Exec socket closed cleanly");
            return Step::none();
        }
        let reason = if close.reason.trim().is_empty() {
            DEFAULT_CLOSE_REASON.to_string()
        } else {
            close.reason.clone()
        };
        Step::action(SinkAction::Notice(reason))
    }

    /// A transport error was reported; the close event that follows decides the state
    pub fn on_error(&self, error: &str) {
        warn!(target = %self.target, error = %error, "Exec socket error");
    }

    /// The owner tore the session down
    pub fn on_teardown(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Closed;
        }
        self.last_output = None;
    }

    /// Encode terminal input, only while open
    #[must_use]
    pub fn encode_input(&self, data: &[u8]) -> Option<String> {
        if self.state != SessionState::Open {
            return None;
        }
        codec::encode(Channel::Stdin, data).ok()
    }

    /// Encode a size update, only while open
    #[must_use]
    pub fn encode_resize(&self, cols: u16, rows: u16) -> Option<String> {
        if self.state != SessionState::Open {
            return None;
        }
        codec::encode_resize(cols, rows).ok()
    }
}
