//! Podconsole Terminal - Container Exec Relay
//!
//! This crate attaches terminal emulators to processes running in
//! containers, over the channel-multiplexed exec WebSocket sub-protocol.
//! It provides:
//! - Codec: `digit + base64` channel frames
//! - Session: per-tab exec connection with an explicit state machine
//! - Activity: rate-limited liveness heartbeat for terminal workspaces
//! - Manager: bounded set of tabs with exactly one active tab

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod activity;
pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod session;
pub mod sink;
pub mod target;

pub use activity::{ActivityTicker, HeartbeatSender, HttpHeartbeat};
pub use codec::{Channel, Frame, CHANNEL_PROTOCOL};
pub use config::{CliClient, ClusterEndpoint, TerminalConfig};
pub use error::{Error, Result};
pub use manager::{SinkFactory, TabId, TerminalSessionManager, TerminalTab, WorkspaceRef};
pub use session::{ExecSession, SessionState};
pub use sink::TerminalSink;
pub use target::ExecTarget;
