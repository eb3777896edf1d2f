//! Session types: the shared recording context joined by one or more devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::source::Source;

/// Unique identifier for a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Lower-cased hyphenated form for embedding in request paths.
    pub fn path_segment(&self) -> String {
        self.0.as_hyphenated().to_string().to_lowercase()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Short human-shareable code used to join an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinCode(pub String);

impl JoinCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JoinCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a session, as seen by this device.
///
/// Local transitions only ever advance Idle → Ready → Recording → Stopped.
/// A server-asserted session replacement may install any value; the client
/// does not validate server transitions. `Loading` is a decoded value with
/// no local transition logic - it means "awaiting next authoritative update".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Ready,
    Loading,
    Recording,
    Stopped,
}

/// The recording mode selected for a session layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingMode {
    #[serde(rename = "PiP")]
    PictureInPicture,
    Facecam,
    Screen,
}

impl RecordingMode {
    /// Capture quality preset appropriate for this mode.
    pub fn quality_preset(&self) -> QualityPreset {
        match self {
            RecordingMode::PictureInPicture => QualityPreset::Medium,
            RecordingMode::Facecam => QualityPreset::High,
            RecordingMode::Screen => QualityPreset::Low,
        }
    }
}

/// Capture quality preset, applied to the pipeline on mode switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityPreset {
    Low,
    Medium,
    High,
}

/// Corner placement for the picture-in-picture camera feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Selected recording mode plus camera placement.
///
/// Mutated only by local user action; peers learn about it through the
/// authoritative session replacement broadcast by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingLayout {
    pub pip_position: PipPosition,
    pub recording_mode: RecordingMode,
}

impl Default for RecordingLayout {
    fn default() -> Self {
        Self {
            pip_position: PipPosition::BottomRight,
            recording_mode: RecordingMode::PictureInPicture,
        }
    }
}

/// The shared recording context.
///
/// One session is live per device at a time. It is replaced wholesale on
/// each authoritative update from the channel, or field-mutated locally for
/// optimistic actions such as adding a local source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub code: JoinCode,
    pub status: SessionStatus,
    pub sources: Vec<Source>,
    pub layout: RecordingLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.status == SessionStatus::Recording
    }
}

/// Status of the real-time channel connection, independent of session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn session_id_path_segment_is_lowercase() {
        let id = SessionId::generate();
        let segment = id.path_segment();
        assert_eq!(segment, segment.to_lowercase());
        assert_eq!(segment.len(), 36);
    }

    #[test]
    fn recording_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&RecordingMode::PictureInPicture).unwrap(),
            "\"PiP\""
        );
        assert_eq!(
            serde_json::to_string(&RecordingMode::Facecam).unwrap(),
            "\"Facecam\""
        );
    }

    #[test]
    fn quality_presets_per_mode() {
        assert_eq!(
            RecordingMode::PictureInPicture.quality_preset(),
            QualityPreset::Medium
        );
        assert_eq!(RecordingMode::Facecam.quality_preset(), QualityPreset::High);
        assert_eq!(RecordingMode::Screen.quality_preset(), QualityPreset::Low);
    }

    #[test]
    fn session_decodes_from_wire_shape() {
        let json = serde_json::json!({
            "id": "f3b9c6f0-7f0a-4a6f-9f57-0d6f3f1c2a4b",
            "code": "AB12",
            "status": "Idle",
            "sources": [],
            "layout": { "pipPosition": "BottomRight", "recordingMode": "PiP" },
            "createdAt": "2020-05-07T12:30:45.123Z"
        });

        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.code.as_str(), "AB12");
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(
            session.layout.recording_mode,
            RecordingMode::PictureInPicture
        );
        assert!(session.created_at.is_some());
        assert!(session.updated_at.is_none());
        assert!(!session.has_sources());
    }

    #[test]
    fn layout_round_trips_camel_case() {
        let layout = RecordingLayout {
            pip_position: PipPosition::TopLeft,
            recording_mode: RecordingMode::Screen,
        };
        let value = serde_json::to_value(layout).unwrap();
        assert_eq!(value["pipPosition"], "TopLeft");
        assert_eq!(value["recordingMode"], "Screen");

        let back: RecordingLayout = serde_json::from_value(value).unwrap();
        assert_eq!(back, layout);
    }

    #[test]
    fn connection_status_defaults_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }
}
