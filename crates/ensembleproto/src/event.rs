//! Typed events carried over the real-time session channel.
//!
//! Inbound events arrive as (name, JSON payload) pairs. Decoding is total:
//! unknown names are reported as such, and a malformed payload for a known
//! name is a typed soft error so the caller can keep its previous state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::session::{Session, SessionId};
use crate::source::Source;

/// Wire names of the inbound events this device understands.
pub const EVENT_SESSION_UPDATED: &str = "sessionUpdated";
pub const EVENT_SOURCE_ADDED: &str = "sourceAdded";
pub const EVENT_START_RECORDING: &str = "startRecording";
pub const EVENT_STOP_RECORDING: &str = "stopRecording";

/// Failure to decode a known event's payload.
///
/// Soft error: the receiver keeps its previous state and waits for the next
/// authoritative update.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("event '{event}' arrived without a payload")]
    MissingPayload { event: &'static str },

    #[error("malformed '{event}' payload: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded inbound channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Full session replacement; the payload wholesale-replaces local state.
    SessionUpdated(Session),
    /// A peer announced a source. The server does not tag origin, so the
    /// receiver must force it to Remote before appending.
    SourceAdded(Source),
    /// Begin recording under the session's current mode.
    StartRecording,
    /// Finish recording; finalize callbacks may still fire afterward.
    StopRecording,
    /// An event name this device does not understand. Logged and dropped,
    /// never fatal.
    Unknown { name: String },
}

impl ChannelEvent {
    /// Decode a named event and its optional payload.
    pub fn decode(name: &str, payload: Option<&Value>) -> Result<Self, EventDecodeError> {
        match name {
            EVENT_SESSION_UPDATED => {
                let value = payload.ok_or(EventDecodeError::MissingPayload {
                    event: EVENT_SESSION_UPDATED,
                })?;
                let session: Session =
                    serde_json::from_value(value.clone()).map_err(|source| {
                        EventDecodeError::Malformed {
                            event: EVENT_SESSION_UPDATED,
                            source,
                        }
                    })?;
                Ok(ChannelEvent::SessionUpdated(session))
            }
            EVENT_SOURCE_ADDED => {
                let value = payload.ok_or(EventDecodeError::MissingPayload {
                    event: EVENT_SOURCE_ADDED,
                })?;
                let source: Source =
                    serde_json::from_value(value.clone()).map_err(|source| {
                        EventDecodeError::Malformed {
                            event: EVENT_SOURCE_ADDED,
                            source,
                        }
                    })?;
                Ok(ChannelEvent::SourceAdded(source))
            }
            EVENT_START_RECORDING => Ok(ChannelEvent::StartRecording),
            EVENT_STOP_RECORDING => Ok(ChannelEvent::StopRecording),
            other => Ok(ChannelEvent::Unknown {
                name: other.to_string(),
            }),
        }
    }
}

/// Outbound command emitted after every successful connect, subscribing this
/// device to updates for its session. Idempotent server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeToUpdates {
    pub session_id: String,
}

impl SubscribeToUpdates {
    pub const NAME: &'static str = "subscribeToUpdates";

    pub fn for_session(id: &SessionId) -> Self {
        Self {
            session_id: id.path_segment(),
        }
    }
}
