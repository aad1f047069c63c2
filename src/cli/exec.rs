//! `podconsole exec`: attach the local terminal to a container
//!
//! The local tty is switched to raw mode and every key press is forwarded to
//! the remote shell. `Ctrl+]` detaches.

use anyhow::{Context, Result};
use clap::Args;
use crossterm::cursor::MoveTo;
use crossterm::event::{
    self, DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange,
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
};
use crossterm::execute;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode, Clear, ClearType};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use podconsole_terminal::{
    ExecTarget, HeartbeatSender, HttpHeartbeat, SessionState, TabId, TerminalSessionManager,
    TerminalSink, WorkspaceRef,
};

use crate::config::AppConfig;

/// Event poll timeout of the input thread
const INPUT_POLL: Duration = Duration::from_millis(100);

/// How often the session state is checked when the user is idle
const STATE_POLL: Duration = Duration::from_millis(100);

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Namespace of the pod
    #[arg(short, long)]
    pub namespace: String,
    /// Pod name
    #[arg(short, long)]
    pub pod: String,
    /// Container name
    #[arg(short, long)]
    pub container: String,
    /// Workspace that activity heartbeats are attributed to
    #[arg(long)]
    pub workspace: Option<String>,
    /// Command to run instead of the default shell
    #[arg(last = true)]
    pub command: Vec<String>,
}

// ── Sink ────────────────────────────────────────────────────────────

/// Renders session output straight onto the local terminal
struct StdoutSink;

impl TerminalSink for StdoutSink {
    fn write(&self, data: &[u8]) {
        let mut out = std::io::stdout().lock();
        out.write_all(data).ok();
        out.flush().ok();
    }

    fn reset(&self) {
        execute!(std::io::stdout(), Clear(ClearType::All), MoveTo(0, 0)).ok();
    }

    fn connection_closed(&self, message: &str) {
        execute!(
            std::io::stdout(),
            Print("\r\n"),
            SetForegroundColor(Color::Red),
            Print(message),
            ResetColor,
            Print("\r\n")
        )
        .ok();
    }
}

/// Heartbeat sender used when no workspace is configured
struct NoHeartbeat;

impl HeartbeatSender for NoHeartbeat {
    fn send_heartbeat(&self, _workspace: &str, _namespace: &str) {}
}

// ── Raw mode ────────────────────────────────────────────────────────

/// Keeps the tty in raw mode until dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        execute!(std::io::stdout(), EnableBracketedPaste, EnableFocusChange).ok();
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        execute!(std::io::stdout(), DisableBracketedPaste, DisableFocusChange).ok();
        disable_raw_mode().ok();
    }
}

/// Read crossterm events on a blocking thread until the receiver goes away
fn spawn_input_thread() -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(INPUT_POLL) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Ok(false) => {}
                Err(_) => break,
            }
        }
    });
    rx
}

// ── Command ─────────────────────────────────────────────────────────

pub async fn run(args: ExecArgs, config: &AppConfig) -> Result<()> {
    let terminal_config = config.terminal_config();
    let subprotocols = terminal_config.subprotocols.clone();

    let workspace_name = args.workspace.clone().or(terminal_config.workspace.clone());
    let heartbeat: Arc<dyn HeartbeatSender> = match &workspace_name {
        Some(_) => Arc::new(HttpHeartbeat::new(config.cluster.endpoint())),
        None => Arc::new(NoHeartbeat),
    };
    let workspace = WorkspaceRef::new(workspace_name.unwrap_or_default(), args.namespace.clone());

    let mut manager = TerminalSessionManager::new(
        config.cluster.endpoint(),
        terminal_config,
        workspace,
        Box::new(|_: TabId| Arc::new(StdoutSink) as Arc<dyn TerminalSink>),
        heartbeat,
    );

    let target = exec_target(&args);
    info!(target = %target, "Attaching terminal");

    let guard = RawModeGuard::enter()?;
    manager
        .active_tab_mut()
        .context("No active terminal tab")?
        .session_mut()
        .open(target, subprotocols)?;

    let result = attach(&manager).await;

    manager.close_all();
    drop(guard);
    println!();
    result
}

/// Target for `args`; without a trailing command the default shell runs
fn exec_target(args: &ExecArgs) -> ExecTarget {
    let target = ExecTarget::new(&args.namespace, &args.pod, &args.container);
    if args.command.is_empty() {
        target
    } else {
        target.with_command(args.command.iter())
    }
}

/// Pump input into the active session until it ends or the user detaches
async fn attach(manager: &TerminalSessionManager) -> Result<()> {
    let mut events = spawn_input_thread();
    let mut state_poll = tokio::time::interval(STATE_POLL);
    let mut sized = false;

    loop {
        let tab = manager.active_tab().context("No active terminal tab")?;
        let session = tab.session();

        tokio::select! {
            ev = events.recv() => {
                let Some(ev) = ev else {
                    debug!("Input stream ended");
                    return Ok(());
                };
                match ev {
                    Event::Key(key) if key.kind != KeyEventKind::Release => {
                        if is_detach(&key) {
                            info!("Detached from terminal");
                            return Ok(());
                        }
                        if let Some(bytes) = key_bytes(&key) {
                            session.send(&bytes);
                        }
                        tab.ticker().tick();
                    }
                    Event::Paste(text) => {
                        session.send(text.as_bytes());
                        tab.ticker().tick();
                    }
                    Event::Resize(cols, rows) => {
                        session.resize(cols, rows);
                    }
                    Event::FocusGained => {
                        tab.ticker().tick();
                    }
                    _ => {}
                }
            }
            _ = state_poll.tick() => {}
        }

        let state = session.state();
        if !sized && state == SessionState::Open {
            if let Ok((cols, rows)) = terminal::size() {
                session.resize(cols, rows);
            }
            sized = true;
        }
        if state.is_terminal() || session.is_finished() {
            debug!(state = %state, "Session ended");
            return Ok(());
        }
    }
}

fn is_detach(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(']')
}

/// Bytes a VT100-style terminal would send for `key`
fn key_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let csi = |tail: &str| format!("\x1b[{tail}").into_bytes();

    let bytes = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            vec![control_byte(c)?]
        }
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            let encoded = c.encode_utf8(&mut buf).as_bytes();
            if key.modifiers.contains(KeyModifiers::ALT) {
                [&[0x1b], encoded].concat()
            } else {
                encoded.to_vec()
            }
        }
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => csi("Z"),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => csi("A"),
        KeyCode::Down => csi("B"),
        KeyCode::Right => csi("C"),
        KeyCode::Left => csi("D"),
        KeyCode::Home => csi("H"),
        KeyCode::End => csi("F"),
        KeyCode::Insert => csi("2~"),
        KeyCode::Delete => csi("3~"),
        KeyCode::PageUp => csi("5~"),
        KeyCode::PageDown => csi("6~"),
        KeyCode::F(n @ 1..=4) => vec![0x1b, b'O', b'P' + (n - 1)],
        KeyCode::F(n) => {
            let code = match n {
                5 => 15,
                6 => 17,
                7 => 18,
                8 => 19,
                9 => 20,
                10 => 21,
                11 => 23,
                12 => 24,
                _ => return None,
            };
            csi(&format!("{code}~"))
        }
        _ => return None,
    };
    Some(bytes)
}

fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a' + 1),
        'A'..='Z' => Some(c as u8 - b'A' + 1),
        '@' | ' ' => Some(0),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_plain_characters() {
        assert_eq!(
            key_bytes(&key(KeyCode::Char('a'), KeyModifiers::NONE)),
            Some(b"a".to_vec())
        );
        assert_eq!(
            key_bytes(&key(KeyCode::Char('é'), KeyModifiers::SHIFT)),
            Some("é".as_bytes().to_vec())
        );
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(
            key_bytes(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(vec![0x03])
        );
        assert_eq!(
            key_bytes(&key(KeyCode::Char('D'), KeyModifiers::CONTROL)),
            Some(vec![0x04])
        );
        assert_eq!(
            key_bytes(&key(KeyCode::Char('1'), KeyModifiers::CONTROL)),
            None
        );
    }

    #[test]
    fn test_alt_prefixes_escape() {
        assert_eq!(
            key_bytes(&key(KeyCode::Char('b'), KeyModifiers::ALT)),
            Some(vec![0x1b, b'b'])
        );
    }

    #[test]
    fn test_special_keys() {
        let none = KeyModifiers::NONE;
        assert_eq!(key_bytes(&key(KeyCode::Enter, none)), Some(vec![b'\r']));
        assert_eq!(key_bytes(&key(KeyCode::Backspace, none)), Some(vec![0x7f]));
        assert_eq!(key_bytes(&key(KeyCode::Up, none)), Some(b"\x1b[A".to_vec()));
        assert_eq!(key_bytes(&key(KeyCode::Delete, none)), Some(b"\x1b[3~".to_vec()));
        assert_eq!(key_bytes(&key(KeyCode::F(1), none)), Some(b"\x1bOP".to_vec()));
        assert_eq!(key_bytes(&key(KeyCode::F(12), none)), Some(b"\x1b[24~".to_vec()));
        assert_eq!(key_bytes(&key(KeyCode::F(13), none)), None);
    }

    fn args(command: &[&str]) -> ExecArgs {
        ExecArgs {
            namespace: "demo".to_string(),
            pod: "web-0".to_string(),
            container: "app".to_string(),
            workspace: None,
            command: command.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_target_without_command_keeps_default_shell() {
        let target = exec_target(&args(&[]));
        assert_eq!(
            target.command,
            podconsole_terminal::target::DEFAULT_COMMAND.to_vec()
        );
        assert!(target.exec_path().contains("&command=sh&command=-i"));
    }

    #[test]
    fn test_target_with_command() {
        let target = exec_target(&args(&["ls", "-la"]));
        assert_eq!(target.command, vec!["ls", "-la"]);
        assert!(target.exec_path().ends_with("&command=ls&command=-la"));
    }

    #[test]
    fn test_detach_key() {
        assert!(is_detach(&key(KeyCode::Char(']'), KeyModifiers::CONTROL)));
        assert!(!is_detach(&key(KeyCode::Char(']'), KeyModifiers::NONE)));
    }
}
