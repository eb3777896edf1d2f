//! Multi-device collaborative recording session engine.
//!
//! One device creates a session, peers join with a short code, and the
//! coordination service broadcasts synchronized start and stop over a
//! real-time channel. Each device records its own clips against a shared
//! timeline and uploads them as they finish; when every clip has landed
//! the final list is reported back to the service.
//!
//! The engine runs as a single task consuming one mailbox. Embedders hold
//! an [`EngineHandle`] and build the engine from the seams in
//! [`EngineDeps`]: a [`api::SessionApi`] for request/response traffic, a
//! [`channel::ChannelTransport`] for the real-time channel, a
//! [`conductor::CapturePipeline`] for media capture, and an
//! [`uploader::UploadTransport`] for moving bytes.

pub mod api;
pub mod channel;
pub mod conductor;
pub mod coordinator;
pub mod error;
pub mod sources;
pub mod telemetry;
pub mod test_support;
pub mod uploader;

pub use coordinator::{Command, EngineDeps, EngineHandle, EngineMsg, EngineSnapshot};
pub use error::EngineError;
