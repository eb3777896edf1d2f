//! Capture source types: camera, microphone, and screen inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionId;

/// Stable identity of a source. Sources are matched by identity for
/// mutation, never by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub Uuid);

impl SourceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Kind of capturable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Camera,
    Microphone,
    Screen,
}

impl SourceType {
    /// Human-facing display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceType::Camera => "Camera",
            SourceType::Microphone => "Microphone",
            SourceType::Screen => "Screen share",
        }
    }
}

/// OS-level permission state for a local source. Meaningless for remote
/// sources, hence optional on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Idle,
    Pending,
    Allowed,
    Denied,
}

/// Whether the source participates in the session recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Enabled,
    Disabled,
}

/// Where a source lives: on this device or on a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginKind {
    Local,
    Remote,
}

/// Source origin with the owning device's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(rename = "type")]
    pub kind: OriginKind,
    pub name: String,
}

impl Origin {
    pub fn local(device_name: impl Into<String>) -> Self {
        Self {
            kind: OriginKind::Local,
            name: device_name.into(),
        }
    }
}

/// A capturable input registered with a session.
///
/// The trailing optional fields are server bookkeeping present in the wire
/// shape; this device never sets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: SourceId,
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_status: Option<PermissionStatus>,
    pub status: SourceStatus,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Source {
    /// Construct a disabled local source of the given kind.
    pub fn local(kind: SourceType, permission: PermissionStatus, device_name: &str) -> Self {
        Self {
            id: SourceId::generate(),
            kind,
            name: kind.display_name().to_string(),
            permission_status: Some(permission),
            status: SourceStatus::Disabled,
            origin: Origin::local(device_name),
            created_at: None,
            updated_at: None,
            session_id: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == SourceStatus::Enabled
    }

    pub fn is_local(&self) -> bool {
        self.origin.kind == OriginKind::Local
    }
}
