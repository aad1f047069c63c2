//! Socket task driving one exec connection attempt

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::{dispatch, lock, CloseInfo, SharedMachine};
use crate::codec::CHANNEL_PROTOCOL;
use crate::error::{Error, Result};
use crate::sink::TerminalSink;

pub(crate) struct SocketParams {
    pub url: Url,
    pub subprotocols: Vec<String>,
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub machine: SharedMachine,
    pub sink: Arc<dyn TerminalSink>,
    pub outbound: mpsc::UnboundedReceiver<Message>,
    pub cancel: CancellationToken,
}

/// Sub-protocol header value: caller protocols, then the channel protocol
pub(crate) fn protocol_header(subprotocols: &[String]) -> String {
    subprotocols
        .iter()
        .map(String::as_str)
        .filter(|p| !p.is_empty() && *p != CHANNEL_PROTOCOL)
        .chain(std::iter::once(CHANNEL_PROTOCOL))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn build_request(
    url: &Url,
    subprotocols: &[String],
    token: Option<&str>,
) -> Result<Request> {
    let mut request = url.as_str().into_client_request()?;
    let protocols = HeaderValue::from_str(&protocol_header(subprotocols))
        .map_err(|e| Error::InvalidTarget(format!("invalid sub-protocol: {e}")))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocols);
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::InvalidTarget(format!("invalid bearer token: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

pub(crate) async fn run(params: SocketParams) {
    let SocketParams {
        url,
        subprotocols,
        token,
        connect_timeout,
        machine,
        sink,
        mut outbound,
        cancel,
    } = params;

    let request = match build_request(&url, &subprotocols, token.as_deref()) {
        Ok(request) => request,
        Err(e) => {
            dispatch(&machine, sink.as_ref(), |m| m.on_connect_failed(&e.to_string()));
            return;
        }
    };

    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(connect_timeout, connect_async(request)) => result,
    };

    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            dispatch(&machine, sink.as_ref(), |m| m.on_connect_failed(&e.to_string()));
            return;
        }
        Err(_) => {
            let reason = format!("handshake timed out after {}s", connect_timeout.as_secs());
            dispatch(&machine, sink.as_ref(), |m| m.on_connect_failed(&reason));
            return;
        }
    };

    if cancel.is_cancelled() {
        return;
    }
    info!(url = %url.path(), "Exec socket open");
    dispatch(&machine, sink.as_ref(), |m| m.on_open());

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Exec socket cancelled");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            Some(message) = outbound.recv() => {
                if let Err(e) = write.send(message).await {
                    lock(&machine).on_error(&e.to_string());
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let step = dispatch(&machine, sink.as_ref(), |m| m.on_message(&text));
                        if step.force_close {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let close = CloseInfo::from_frame(frame.as_ref());
                        dispatch(&machine, sink.as_ref(), |m| m.on_close(&close));
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "Ignoring binary exec frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        lock(&machine).on_error(&reason);
                        let close = CloseInfo::abnormal(reason);
                        dispatch(&machine, sink.as_ref(), |m| m.on_close(&close));
                        break;
                    }
                    None => {
                        let close = CloseInfo::abnormal("");
                        dispatch(&machine, sink.as_ref(), |m| m.on_close(&close));
                        break;
                    }
                }
            }
        }
    }
}
