//! ensembleproto - Wire and domain types for Ensemble recording sessions.
//!
//! An Ensemble session groups several devices recording time-aligned clips
//! that are merged server-side. This crate defines the JSON shapes exchanged
//! with the coordination service: the session itself, capture sources, clips,
//! and the named events delivered over the real-time channel.
//!
//! Field names are camelCase on the wire. Dates are ISO-8601 with fractional
//! seconds. Identities are UUIDs, lower-cased when embedded in request paths.

pub mod clip;
pub mod event;
pub mod session;
pub mod source;

pub use clip::{Clip, ClipId, ClipState};
pub use event::{ChannelEvent, EventDecodeError, SubscribeToUpdates};
pub use session::{
    ConnectionStatus, JoinCode, PipPosition, QualityPreset, RecordingLayout, RecordingMode,
    Session, SessionId, SessionStatus,
};
pub use source::{Origin, OriginKind, PermissionStatus, Source, SourceId, SourceStatus, SourceType};
