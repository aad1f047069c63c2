//! Exec Session
//!
//! An [`ExecSession`] is the per-tab handle on a container exec connection.
//! Each call to [`ExecSession::open`] starts a fresh connection attempt with
//! its own [`SessionMachine`]; the previous socket is always destroyed first,
//! so a tab never has two live sockets.
//!
//! Socket I/O runs in a spawned task. Sink actions are applied while holding
//! the machine lock, and teardown moves the machine to a terminal state under
//! that same lock, so no frame from a destroyed socket reaches the sink once
//! [`ExecSession::close`] has returned.

mod machine;
mod socket;


pub use machine::{
    CloseInfo, SessionMachine, SessionState, SinkAction, Step, DEFAULT_CLOSE_REASON, NO_SH,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ClusterEndpoint, TerminalConfig};
use crate::error::Result;
use crate::sink::TerminalSink;
use crate::target::ExecTarget;

pub(crate) type SharedMachine = Arc<Mutex<SessionMachine>>;

pub(crate) fn lock(machine: &Mutex<SessionMachine>) -> MutexGuard<'_, SessionMachine> {
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply a machine step to the sink while the machine lock is held
pub(crate) fn dispatch<F>(machine: &Mutex<SessionMachine>, sink: &dyn TerminalSink, f: F) -> Step
where
    F: FnOnce(&mut SessionMachine) -> Step,
{
    let mut guard = lock(machine);
    let step = f(&mut guard);
    for action in &step.actions {
        match action {
            SinkAction::Write(data) => sink.write(data),
            SinkAction::Reset => sink.reset(),
            SinkAction::Notice(message) => sink.connection_closed(message),
        }
    }
    step
}

/// One connection attempt owned by a session
struct Attempt {
    machine: SharedMachine,
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Attempt {
    fn is_live(&self) -> bool {
        !lock(&self.machine).state().is_terminal()
    }

    fn destroy(&self) {
        lock(&self.machine).on_teardown();
        self.cancel.cancel();
    }
}

/// Exec connection for one terminal tab
pub struct ExecSession {
    endpoint: ClusterEndpoint,
    config: TerminalConfig,
    sink: Arc<dyn TerminalSink>,
    attempt: Option<Attempt>,
}

impl ExecSession {
    /// Create an idle session rendering into `sink`
    #[must_use]
    pub fn new(
        endpoint: ClusterEndpoint,
        config: TerminalConfig,
        sink: Arc<dyn TerminalSink>,
    ) -> Self {
        Self {
            endpoint,
            config,
            sink,
            attempt: None,
        }
    }

    /// Connect to `target`, offering `subprotocols` before the channel protocol.
    ///
    /// Any live socket is torn down first, after telling the sink that a new
    /// connection is on its way. Must be called from within a Tokio runtime.
    pub fn open(&mut self, target: ExecTarget, subprotocols: Vec<String>) -> Result<()> {
        let url = target.websocket_url(&self.endpoint.base_url)?;

        if let Some(previous) = self.attempt.take() {
            if previous.is_live() {
                self.sink
                    .connection_closed(&format!("connecting to {}", target.container));
            }
            previous.destroy();
        }

        info!(target = %target, "Opening exec session");

        let mut machine = SessionMachine::new(target, self.config.cli_client);
        machine.on_connecting();
        let machine = Arc::new(Mutex::new(machine));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(socket::run(socket::SocketParams {
            url,
            subprotocols,
            token: self.endpoint.token.clone(),
            connect_timeout: self.config.connect_timeout(),
            machine: machine.clone(),
            sink: self.sink.clone(),
            outbound: outbound_rx,
            cancel: cancel.clone(),
        }));

        self.attempt = Some(Attempt {
            machine,
            outbound,
            cancel,
            task,
        });
        Ok(())
    }

    /// Send terminal input. Returns `false` (and does nothing) unless the
    /// session is open.
    pub fn send(&self, data: &[u8]) -> bool {
        let Some(attempt) = &self.attempt else {
            return false;
        };
        let Some(frame) = lock(&attempt.machine).encode_input(data) else {
            return false;
        };
        attempt.outbound.send(Message::Text(frame)).is_ok()
    }

    /// Send a terminal size update. Returns `false` unless the session is open.
    pub fn resize(&self, cols: u16, rows: u16) -> bool {
        let Some(attempt) = &self.attempt else {
            return false;
        };
        let Some(frame) = lock(&attempt.machine).encode_resize(cols, rows) else {
            return false;
        };
        attempt.outbound.send(Message::Text(frame)).is_ok()
    }

    /// Destroy the socket. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(attempt) = &self.attempt {
            if !attempt.cancel.is_cancelled() {
                debug!("Closing exec session");
                attempt.destroy();
            }
        }
    }

    /// State of the current attempt (`Idle` before the first `open`)
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.attempt
            .as_ref()
            .map_or(SessionState::Idle, |a| lock(&a.machine).state())
    }

    /// Target of the current attempt
    #[must_use]
    pub fn target(&self) -> Option<ExecTarget> {
        self.attempt
            .as_ref()
            .map(|a| lock(&a.machine).target().clone())
    }

    /// Whether the socket task of the current attempt has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.attempt.as_ref().is_none_or(|a| a.task.is_finished())
    }
}

impl Drop for ExecSession {
    fn drop(&mut self) {
        self.close();
    }
}
