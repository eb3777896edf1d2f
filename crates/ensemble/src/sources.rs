//! Local capture source enumeration and permission handling.

use async_trait::async_trait;
use tracing::debug;

use ensembleproto::{PermissionStatus, Source, SourceId, SourceStatus, SourceType};

/// Capture source types this device can offer.
pub const LOCAL_SOURCE_TYPES: [SourceType; 2] = [SourceType::Camera, SourceType::Microphone];

/// Platform permission seam.
#[async_trait]
pub trait PermissionProbe: Send + Sync {
    /// Current permission state without prompting.
    fn current_status(&self, kind: SourceType) -> PermissionStatus;

    /// Prompt the user if needed and return the resolved state.
    async fn request(&self, kind: SourceType) -> PermissionStatus;
}

/// A probe for platforms without a permission model. Everything is allowed.
pub struct OpenPermissionProbe;

#[async_trait]
impl PermissionProbe for OpenPermissionProbe {
    fn current_status(&self, _kind: SourceType) -> PermissionStatus {
        PermissionStatus::Allowed
    }

    async fn request(&self, _kind: SourceType) -> PermissionStatus {
        PermissionStatus::Allowed
    }
}

/// The device's own sources, keyed by stable identity for the lifetime of
/// the engine. Enable and disable flip status in place; identities never
/// change once built.
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Build one source per local type, disabled, stamped with the current
    /// permission state.
    pub fn new(probe: &dyn PermissionProbe, device_name: &str) -> Self {
        let sources = LOCAL_SOURCE_TYPES
            .iter()
            .map(|&kind| Source::local(kind, probe.current_status(kind), device_name))
            .collect();
        Self { sources }
    }

    pub fn get(&self, id: &SourceId) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == *id)
    }

    /// Flip a source to Enabled. Returns the updated source.
    pub fn enable(&mut self, id: &SourceId) -> Option<Source> {
        self.set_status(id, SourceStatus::Enabled)
    }

    /// Flip a source to Disabled. Returns the updated source.
    pub fn disable(&mut self, id: &SourceId) -> Option<Source> {
        self.set_status(id, SourceStatus::Disabled)
    }

    fn set_status(&mut self, id: &SourceId, status: SourceStatus) -> Option<Source> {
        let source = self.sources.iter_mut().find(|s| s.id == *id)?;
        source.status = status;
        debug!(source.id = %source.id, ?status, "local source status changed");
        Some(source.clone())
    }

    /// Record a resolved permission for a source.
    pub fn set_permission(&mut self, id: &SourceId, status: PermissionStatus) -> Option<Source> {
        let source = self.sources.iter_mut().find(|s| s.id == *id)?;
        source.permission_status = Some(status);
        Some(source.clone())
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }
}
