//! Call-recording fakes for the engine's dependency seams.
//!
//! These live in the library so integration tests and embedder test suites
//! can share them. Every mock records the calls it receives behind a mutex
//! and plays back scripted responses.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use ensembleproto::{
    Clip, JoinCode, PermissionStatus, QualityPreset, RecordingLayout, Session, SessionId,
    SessionStatus, Source, SourceId, SourceType,
};

use crate::api::SessionApi;
use crate::channel::{ChannelTransport, TransportEvent};
use crate::conductor::{CapturePipeline, PipelineEvent};
use crate::error::EngineError;
use crate::sources::PermissionProbe;
use crate::uploader::UploadTransport;

/// A bare session for driving tests.
pub fn test_session(code: &str) -> Session {
    Session {
        id: SessionId::generate(),
        code: JoinCode::new(code),
        status: SessionStatus::Idle,
        sources: Vec::new(),
        layout: RecordingLayout::default(),
        created_at: None,
        updated_at: None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCall {
    Configure { enabled: usize },
    SetPreset(QualityPreset),
    StartClip(PathBuf),
    Stop,
}

/// Pipeline fake that confirms clip starts and stops through the event
/// channel the way a real capture backend would.
pub struct MockPipeline {
    pub calls: Arc<Mutex<Vec<PipelineCall>>>,
    events: mpsc::Sender<PipelineEvent>,
    current_clip: Option<PathBuf>,
    fail_next_clip: Option<String>,
}

impl MockPipeline {
    pub fn new(events: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            events,
            current_clip: None,
            fail_next_clip: None,
        }
    }

    /// The next finished clip reports the given pipeline error.
    pub fn fail_next_clip(&mut self, reason: &str) {
        self.fail_next_clip = Some(reason.to_string());
    }

    fn finish_current(&mut self) {
        if let Some(path) = self.current_clip.take() {
            let error = self.fail_next_clip.take();
            let _ = self.events.try_send(PipelineEvent::ClipFinished { path, error });
        }
    }
}

impl CapturePipeline for MockPipeline {
    fn configure(&mut self, sources: &[Source]) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(PipelineCall::Configure {
            enabled: sources.len(),
        });
        Ok(())
    }

    fn set_preset(&mut self, preset: QualityPreset) {
        self.calls.lock().unwrap().push(PipelineCall::SetPreset(preset));
    }

    fn start_clip(&mut self, path: &Path) -> Result<(), EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push(PipelineCall::StartClip(path.to_path_buf()));
        self.finish_current();
        self.current_clip = Some(path.to_path_buf());
        let _ = self.events.try_send(PipelineEvent::ClipStarted {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.lock().unwrap().push(PipelineCall::Stop);
        self.finish_current();
    }
}

/// Channel transport fake driven by the test through `push`.
#[derive(Default)]
pub struct MockChannelTransport {
    senders: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    pub emitted: Mutex<Vec<(String, Value)>>,
}

impl MockChannelTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver a transport event to every connected client.
    pub async fn push(&self, event: TransportEvent) {
        let senders: Vec<_> = self.senders.lock().unwrap().clone();
        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }

    /// Names of emitted messages, in order.
    pub fn emitted_names(&self) -> Vec<String> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelTransport for MockChannelTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>, EngineError> {
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn emit(&self, name: &str, payload: Value) -> Result<(), EngineError> {
        self.emitted.lock().unwrap().push((name.to_string(), payload));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreateSession,
    SessionByCode(String),
    AddSource { source: SourceId },
    RemoveSource { source: SourceId },
    RequestStart,
    RequestStop,
    SignedUploadUrl,
    ReportClips { count: usize },
}

/// Scripted request/response API.
pub struct MockSessionApi {
    session: Mutex<Option<Session>>,
    signed_url: Mutex<Option<String>>,
    pub calls: Mutex<Vec<ApiCall>>,
    pub added_sources: Mutex<Vec<Source>>,
    pub reported_clips: Mutex<Vec<Vec<Clip>>>,
}

impl MockSessionApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(None),
            signed_url: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            added_sources: Mutex::new(Vec::new()),
            reported_clips: Mutex::new(Vec::new()),
        })
    }

    pub fn with_session(self: Arc<Self>, session: Session) -> Arc<Self> {
        *self.session.lock().unwrap() = Some(session);
        self
    }

    pub fn with_signed_url(self: Arc<Self>, url: &str) -> Arc<Self> {
        *self.signed_url.lock().unwrap() = Some(url.to_string());
        self
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn scripted_session(&self, operation: &'static str) -> Result<Session, EngineError> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or(EngineError::communication(operation, "no scripted session"))
    }
}

#[async_trait]
impl SessionApi for MockSessionApi {
    async fn create_session(&self) -> Result<Session, EngineError> {
        self.record(ApiCall::CreateSession);
        self.scripted_session("create session")
    }

    async fn session_by_code(&self, code: &str) -> Result<Session, EngineError> {
        self.record(ApiCall::SessionByCode(code.to_string()));
        self.scripted_session("fetch session")
    }

    async fn add_source(&self, _session: &SessionId, source: &Source) -> Result<(), EngineError> {
        self.record(ApiCall::AddSource { source: source.id });
        self.added_sources.lock().unwrap().push(source.clone());
        Ok(())
    }

    async fn remove_source(
        &self,
        _session: &SessionId,
        source: &SourceId,
    ) -> Result<(), EngineError> {
        self.record(ApiCall::RemoveSource { source: *source });
        Ok(())
    }

    async fn request_start(&self, _session: &SessionId) -> Result<(), EngineError> {
        self.record(ApiCall::RequestStart);
        Ok(())
    }

    async fn request_stop(&self, _session: &SessionId) -> Result<(), EngineError> {
        self.record(ApiCall::RequestStop);
        Ok(())
    }

    async fn signed_upload_url(&self) -> Result<String, EngineError> {
        self.record(ApiCall::SignedUploadUrl);
        self.signed_url
            .lock()
            .unwrap()
            .clone()
            .ok_or(EngineError::communication("signed upload url", "not scripted"))
    }

    async fn report_clips(&self, _session: &SessionId, clips: &[Clip]) -> Result<(), EngineError> {
        self.record(ApiCall::ReportClips { count: clips.len() });
        self.reported_clips.lock().unwrap().push(clips.to_vec());
        Ok(())
    }
}

/// Upload transport that succeeds with two progress ticks, or fails for
/// paths registered through `fail_path`.
#[derive(Default)]
pub struct MockUploadTransport {
    fail_paths: Mutex<HashSet<PathBuf>>,
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl MockUploadTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_path(&self, path: &Path) {
        self.fail_paths.lock().unwrap().insert(path.to_path_buf());
    }
}

#[async_trait]
impl UploadTransport for MockUploadTransport {
    async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        progress: mpsc::Sender<f64>,
    ) -> Result<(), EngineError> {
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), destination.to_string()));

        let fail = self.fail_paths.lock().unwrap().contains(local_path);
        let _ = progress.send(0.5).await;
        if fail {
            return Err(EngineError::Upload("scripted failure".to_string()));
        }
        let _ = progress.send(1.0).await;
        Ok(())
    }
}

/// Permission probe with a fixed current status, recording prompt requests.
pub struct MockPermissionProbe {
    current: PermissionStatus,
    resolved: PermissionStatus,
    pub requested: Mutex<Vec<SourceType>>,
}

impl MockPermissionProbe {
    pub fn new(current: PermissionStatus, resolved: PermissionStatus) -> Arc<Self> {
        Arc::new(Self {
            current,
            resolved,
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn allowing() -> Arc<Self> {
        Self::new(PermissionStatus::Allowed, PermissionStatus::Allowed)
    }
}

#[async_trait]
impl PermissionProbe for MockPermissionProbe {
    fn current_status(&self, _kind: SourceType) -> PermissionStatus {
        self.current
    }

    async fn request(&self, kind: SourceType) -> PermissionStatus {
        self.requested.lock().unwrap().push(kind);
        self.resolved
    }
}
