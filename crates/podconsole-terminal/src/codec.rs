//! Channel codec for the `base64.channel.k8s.io` exec sub-protocol
//!
//! Every WebSocket text message is one ASCII digit naming the channel,
//! immediately followed by the standard (padded) base64 encoding of the
//! channel payload.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// Sub-protocol token that selects the base64 channel framing
pub const CHANNEL_PROTOCOL: &str = "base64.channel.k8s.io";

/// Logical stream multiplexed onto the exec socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    /// Input typed into the terminal
    Stdin = 0,
    /// Process stdout
    Stdout = 1,
    /// Process stderr
    Stderr = 2,
    /// Structured error status from the exec endpoint
    Error = 3,
    /// Terminal size updates
    Resize = 4,
}

impl Channel {
    /// Parse a channel id
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            3 => Some(Self::Error),
            4 => Some(Self::Resize),
            _ => None,
        }
    }

    /// Numeric channel id
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Whether the client is allowed to write this channel
    #[must_use]
    pub fn is_client_writable(self) -> bool {
        matches!(self, Self::Stdin | Self::Resize)
    }

    /// Whether this channel carries process output
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, Self::Stdout | Self::Stderr)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Error => "error",
            Self::Resize => "resize",
        };
        f.write_str(name)
    }
}

/// A decoded exec frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Channel the payload belongs to
    pub channel: Channel,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// Encode a client frame.
///
/// Only [`Channel::Stdin`] and [`Channel::Resize`] may be written by the client.
pub fn encode(channel: Channel, payload: &[u8]) -> Result<String> {
    if !channel.is_client_writable() {
        return Err(Error::InvalidOutboundChannel(channel.id()));
    }
    let mut frame = String::with_capacity(1 + payload.len().div_ceil(3) * 4);
    frame.push(char::from(b'0' + channel.id()));
    STANDARD.encode_string(payload, &mut frame);
    Ok(frame)
}

/// Decode a frame received from the server.
pub fn decode(frame: &str) -> Result<Frame> {
    let bytes = frame.as_bytes();
    let Some(&first) = bytes.first() else {
        return Err(Error::malformed("empty frame"));
    };
    if !first.is_ascii_digit() {
        return Err(Error::malformed(format!(
            "channel indicator {:?} is not a digit",
            char::from(first)
        )));
    }
    let channel = Channel::from_id(first - b'0')
        .ok_or_else(|| Error::malformed(format!("unknown channel {}", char::from(first))))?;
    let payload = STANDARD
        .decode(&bytes[1..])
        .map_err(|e| Error::malformed(format!("invalid base64 on {channel}: {e}")))?;
    Ok(Frame { channel, payload })
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResizePayload {
    width: u16,
    height: u16,
}

/// Encode a terminal size update for the control channel
pub fn encode_resize(cols: u16, rows: u16) -> Result<String> {
    let payload = serde_json::to_vec(&ResizePayload {
        width: cols,
        height: rows,
    })?;
    encode(Channel::Resize, &payload)
}
