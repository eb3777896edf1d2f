//! Real-time channel client.
//!
//! A `ChannelTransport` produces a stream of low-level transport events;
//! `ChannelClient` runs a task that converts those into connection status
//! changes and decoded session events on the engine mailbox. Transport
//! reconnects are the transport's business; the client only reports the
//! lifecycle and re-subscribes after every (re)connect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ensembleproto::{ChannelEvent, ConnectionStatus, SessionId, SubscribeToUpdates};

use crate::coordinator::EngineMsg;
use crate::error::EngineError;

/// Low-level events from a channel transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Reconnecting,
    ConnectionError(String),
    /// A named message with an optional JSON payload.
    Message {
        name: String,
        payload: Option<Value>,
    },
}

/// Bidirectional real-time transport to the coordination service.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open the transport and return its event stream. The transport owns
    /// reconnection; the stream stays alive across reconnects.
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, EngineError>;

    /// Send a named message to the service.
    async fn emit(&self, name: &str, payload: Value) -> Result<(), EngineError>;
}

/// Per-session channel consumer.
pub struct ChannelClient;

impl ChannelClient {
    /// Spawn the channel loop for one session. The task ends when the
    /// transport stream closes or the engine mailbox goes away.
    pub fn spawn(
        transport: Arc<dyn ChannelTransport>,
        session_id: SessionId,
        mailbox: mpsc::Sender<EngineMsg>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut events = match transport.connect().await {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "channel transport failed to open");
                    let _ = mailbox
                        .send(EngineMsg::Connection(ConnectionStatus::Failed))
                        .await;
                    return;
                }
            };

            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Connected => {
                        info!(session.id = %session_id, "channel connected");
                        if mailbox
                            .send(EngineMsg::Connection(ConnectionStatus::Connected))
                            .await
                            .is_err()
                        {
                            return;
                        }
                        let subscribe = SubscribeToUpdates::for_session(&session_id);
                        if let Err(e) = transport
                            .emit(
                                SubscribeToUpdates::NAME,
                                serde_json::to_value(&subscribe).unwrap_or(Value::Null),
                            )
                            .await
                        {
                            warn!(error = %e, "subscribe request failed");
                        }
                    }
                    TransportEvent::Reconnecting => {
                        if mailbox
                            .send(EngineMsg::Connection(ConnectionStatus::Connecting))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    TransportEvent::Disconnected => {
                        if mailbox
                            .send(EngineMsg::Connection(ConnectionStatus::Disconnected))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    TransportEvent::ConnectionError(reason) => {
                        warn!(reason, "channel connection error");
                        if mailbox
                            .send(EngineMsg::Connection(ConnectionStatus::Failed))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    TransportEvent::Message { name, payload } => {
                        match ChannelEvent::decode(&name, payload.as_ref()) {
                            Ok(ChannelEvent::Unknown { name }) => {
                                debug!(event = %name, "ignoring unknown channel event");
                            }
                            Ok(event) => {
                                if mailbox.send(EngineMsg::Channel(event)).await.is_err() {
                                    return;
                                }
                            }
                            // A bad payload never takes the channel down.
                            Err(e) => warn!(error = %e, "dropping undecodable channel event"),
                        }
                    }
                }
            }

            debug!(session.id = %session_id, "channel stream ended");
        })
    }
}

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const CHANNEL_BUFFER: usize = 64;

/// Server-sent-events transport.
///
/// Messages arrive as SSE frames on `{channel_url}/stream`; outbound
/// messages go over plain POSTs to `{channel_url}/emit`.
pub struct SseChannel {
    stream_url: String,
    emit_url: String,
    client: reqwest::Client,
}

impl SseChannel {
    pub fn new(channel_url: &str) -> Self {
        let base = channel_url.trim_end_matches('/');
        Self {
            stream_url: format!("{base}/stream"),
            emit_url: format!("{base}/emit"),
            client: reqwest::Client::new(),
        }
    }

    async fn run_stream(self: Arc<Self>, events: mpsc::Sender<TransportEvent>) {
        let mut first_attempt = true;
        loop {
            if !first_attempt {
                if events.send(TransportEvent::Reconnecting).await.is_err() {
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            first_attempt = false;

            let response = match self.client.get(&self.stream_url).send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    let report = format!("HTTP {}", r.status());
                    if events
                        .send(TransportEvent::ConnectionError(report))
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }
                Err(e) => {
                    if events
                        .send(TransportEvent::ConnectionError(e.to_string()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }
            };

            if events.send(TransportEvent::Connected).await.is_err() {
                return;
            }

            let mut stream = response.bytes_stream();
            let mut parser = SseParser::default();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for frame in parser.push(&bytes) {
                            let payload = frame
                                .data
                                .as_deref()
                                .and_then(|d| serde_json::from_str::<Value>(d).ok());
                            let message = TransportEvent::Message {
                                name: frame.event,
                                payload,
                            };
                            if events.send(message).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "channel stream read error");
                        break;
                    }
                }
            }

            if events.send(TransportEvent::Disconnected).await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl ChannelTransport for SseChannel {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, EngineError> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let this = Arc::new(Self {
            stream_url: self.stream_url.clone(),
            emit_url: self.emit_url.clone(),
            client: self.client.clone(),
        });
        tokio::spawn(this.run_stream(tx));
        Ok(rx)
    }

    async fn emit(&self, name: &str, payload: Value) -> Result<(), EngineError> {
        let body = serde_json::json!({ "event": name, "payload": payload });
        let response = self
            .client
            .post(&self.emit_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Channel(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Channel(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

/// One complete SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: Option<String>,
}

/// Incremental SSE line parser. Frames complete on a blank line; a frame
/// without an `event:` field gets the protocol default name `message`.
#[derive(Default)]
struct SseParser {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
            } else if let Some(value) = line.strip_prefix("event:") {
                self.event = Some(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data_lines.push(value.trim_start().to_string());
            }
            // Comments (`:`) and fields we do not use fall through.
        }
        frames
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data_lines.is_empty() {
            return None;
        }
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = if self.data_lines.is_empty() {
            None
        } else {
            Some(self.data_lines.drain(..).collect::<Vec<_>>().join("\n"))
        };
        Some(SseFrame { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_named_event_with_payload() {
        let mut parser = SseParser::default();
        let frames = parser.push(b"event: sessionUpdated\ndata: {\"x\":1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "sessionUpdated".to_string(),
                data: Some("{\"x\":1}".to_string()),
            }]
        );
    }

    #[test]
    fn frame_without_event_name_defaults_to_message() {
        let mut parser = SseParser::default();
        let frames = parser.push(b"data: hello\n\n");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn frames_survive_chunk_boundaries() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: startRec").is_empty());
        assert!(parser.push(b"ording\nda").is_empty());
        let frames = parser.push(b"ta: {}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "startRecording");
        assert_eq!(frames[0].data.as_deref(), Some("{}"));
    }

    #[test]
    fn multiline_data_joins_with_newlines() {
        let mut parser = SseParser::default();
        let frames = parser.push(b"data: a\ndata: b\n\n");
        assert_eq!(frames[0].data.as_deref(), Some("a\nb"));
    }

    #[test]
    fn blank_lines_between_frames_produce_nothing() {
        let mut parser = SseParser::default();
        let frames = parser.push(b"\n\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let mut parser = SseParser::default();
        let frames = parser.push(b"event: stopRecording\r\ndata: {}\r\n\r\n");
        assert_eq!(frames[0].event, "stopRecording");
    }
}
