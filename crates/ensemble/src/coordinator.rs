//! Single-task engine coordinator.
//!
//! Everything that mutates engine state flows through one mailbox consumed
//! by one task: commands from the embedder, connection and event traffic
//! from the channel client, pipeline callbacks, and upload updates. Network
//! calls are spawned so the loop never blocks on I/O.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ensembleproto::{
    ChannelEvent, ConnectionStatus, OriginKind, PermissionStatus, RecordingMode, Session,
    SessionStatus, Source, SourceId, SourceStatus,
};

use crate::api::SessionApi;
use crate::channel::{ChannelClient, ChannelTransport};
use crate::conductor::{CapturePipeline, Conductor, PipelineEvent};
use crate::error::EngineError;
use crate::sources::{PermissionProbe, SourceRegistry};
use crate::uploader::{UploadTransport, Uploader, UploadUpdate};

const MAILBOX_BUFFER: usize = 256;

/// Everything the engine task can react to.
pub enum EngineMsg {
    Command(Command),
    Connection(ConnectionStatus),
    Channel(ChannelEvent),
    Pipeline(PipelineEvent),
    Upload(UploadUpdate),
    PermissionResolved {
        source: SourceId,
        status: PermissionStatus,
    },
    /// Result of a spawned create or join request.
    SessionFetched {
        result: Result<Session, EngineError>,
        reply: oneshot::Sender<Result<Session, EngineError>>,
    },
}

/// Embedder-facing commands.
pub enum Command {
    Create {
        reply: oneshot::Sender<Result<Session, EngineError>>,
    },
    Join {
        code: String,
        reply: oneshot::Sender<Result<Session, EngineError>>,
    },
    Prepare {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SwitchMode {
        mode: RecordingMode,
    },
    EnableSource {
        id: SourceId,
    },
    DisableSource {
        id: SourceId,
    },
    RequestPermission {
        id: SourceId,
    },
    RequestStart {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    RequestStop {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    Shutdown,
}

/// Point-in-time view of engine state, for embedders and tests.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub session: Option<Session>,
    pub connection: ConnectionStatus,
    pub clips: Vec<ensembleproto::Clip>,
    pub local_sources: Vec<Source>,
    pub completion_reported: bool,
}

/// Dependency seams the engine is built from.
pub struct EngineDeps {
    pub api: Arc<dyn SessionApi>,
    pub channel: Arc<dyn ChannelTransport>,
    pub pipeline: Box<dyn CapturePipeline>,
    pub pipeline_events: mpsc::Receiver<PipelineEvent>,
    pub uploads: Arc<dyn UploadTransport>,
    pub permissions: Arc<dyn PermissionProbe>,
    pub device_name: String,
    pub upload_base_url: String,
    pub clip_dir: PathBuf,
}

impl EngineDeps {
    /// Live transports from configuration. The embedder supplies the
    /// platform pieces: a capture pipeline, its event channel, and a
    /// permission probe.
    pub fn from_config(
        config: &ensembleconf::EnsembleConfig,
        pipeline: Box<dyn CapturePipeline>,
        pipeline_events: mpsc::Receiver<PipelineEvent>,
        permissions: Arc<dyn PermissionProbe>,
        clip_dir: PathBuf,
    ) -> Self {
        Self {
            api: Arc::new(crate::api::HttpSessionApi::new(&config.service.api_base_url)),
            channel: Arc::new(crate::channel::SseChannel::new(&config.service.channel_url)),
            pipeline,
            pipeline_events,
            uploads: Arc::new(crate::uploader::HttpUploadTransport::new()),
            permissions,
            device_name: config.device.name.clone(),
            upload_base_url: config.service.upload_base_url.clone(),
            clip_dir,
        }
    }
}

struct Engine {
    api: Arc<dyn SessionApi>,
    channel: Arc<dyn ChannelTransport>,
    permissions: Arc<dyn PermissionProbe>,
    conductor: Conductor,
    registry: SourceRegistry,
    uploader: Uploader,
    mailbox: mpsc::Sender<EngineMsg>,

    session: Option<Session>,
    connection: ConnectionStatus,
    channel_task: Option<JoinHandle<()>>,
    completion_reported: bool,
}

impl Engine {
    /// Spawn the engine task and return a handle to it.
    pub fn spawn(deps: EngineDeps) -> EngineHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_BUFFER);

        // Pipeline callbacks join the same mailbox as everything else.
        let pipeline_tx = tx.clone();
        let mut pipeline_events = deps.pipeline_events;
        tokio::spawn(async move {
            while let Some(event) = pipeline_events.recv().await {
                if pipeline_tx.send(EngineMsg::Pipeline(event)).await.is_err() {
                    return;
                }
            }
        });

        let engine = Engine {
            conductor: Conductor::new(deps.pipeline, deps.clip_dir),
            registry: SourceRegistry::new(deps.permissions.as_ref(), &deps.device_name),
            uploader: Uploader::new(
                deps.uploads,
                Arc::clone(&deps.api),
                &deps.upload_base_url,
                tx.clone(),
            ),
            api: deps.api,
            channel: deps.channel,
            permissions: deps.permissions,
            mailbox: tx.clone(),
            session: None,
            connection: ConnectionStatus::default(),
            channel_task: None,
            completion_reported: false,
        };

        tokio::spawn(engine.run(rx));
        EngineHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<EngineMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                EngineMsg::Command(Command::Shutdown) => break,
                EngineMsg::Command(command) => self.handle_command(command),
                EngineMsg::Connection(status) => {
                    debug!(?status, "connection status changed");
                    self.connection = status;
                }
                EngineMsg::Channel(event) => self.handle_channel_event(event),
                EngineMsg::Pipeline(event) => self.handle_pipeline_event(event),
                EngineMsg::Upload(update) => self.handle_upload_update(update),
                EngineMsg::PermissionResolved { source, status } => {
                    self.registry.set_permission(&source, status);
                    if let Some(session) = &mut self.session {
                        if let Some(s) = session.sources.iter_mut().find(|s| s.id == source) {
                            s.permission_status = Some(status);
                        }
                    }
                }
                EngineMsg::SessionFetched { result, reply } => {
                    if let Ok(session) = &result {
                        self.install_session(session.clone());
                    }
                    let _ = reply.send(result);
                }
            }
        }

        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
        info!("engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Create { reply } => {
                let api = Arc::clone(&self.api);
                let mailbox = self.mailbox.clone();
                tokio::spawn(async move {
                    let result = api.create_session().await;
                    let _ = mailbox.send(EngineMsg::SessionFetched { result, reply }).await;
                });
            }
            Command::Join { code, reply } => {
                let api = Arc::clone(&self.api);
                let mailbox = self.mailbox.clone();
                tokio::spawn(async move {
                    let result = api.session_by_code(&code).await;
                    let _ = mailbox.send(EngineMsg::SessionFetched { result, reply }).await;
                });
            }
            Command::Prepare { reply } => {
                if let Some(session) = &mut self.session {
                    // Nothing to configure until the session has a source.
                    if session.has_sources() {
                        self.conductor.prepare(&session.sources);
                        session.status = SessionStatus::Ready;
                    }
                }
                let _ = reply.send(Ok(()));
            }
            Command::SwitchMode { mode } => self.switch_mode(mode),
            Command::EnableSource { id } => self.enable_source(id),
            Command::DisableSource { id } => self.disable_source(id),
            Command::RequestPermission { id } => {
                let Some(source) = self.registry.get(&id) else {
                    warn!(source.id = %id, "permission requested for unknown source");
                    return;
                };
                let kind = source.kind;
                let probe = Arc::clone(&self.permissions);
                let mailbox = self.mailbox.clone();
                tokio::spawn(async move {
                    let status = probe.request(kind).await;
                    let _ = mailbox
                        .send(EngineMsg::PermissionResolved { source: id, status })
                        .await;
                });
            }
            Command::RequestStart { reply } => self.request_recording(reply, true),
            Command::RequestStop { reply } => self.request_recording(reply, false),
            Command::Snapshot { reply } => {
                let _ = reply.send(EngineSnapshot {
                    session: self.session.clone(),
                    connection: self.connection,
                    clips: self.conductor.clips(),
                    local_sources: self.registry.sources().to_vec(),
                    completion_reported: self.completion_reported,
                });
            }
            Command::Shutdown => unreachable!("handled in run"),
        }
    }

    /// Ask the server to broadcast start or stop. The actual state change
    /// happens when the broadcast comes back over the channel.
    fn request_recording(
        &self,
        reply: oneshot::Sender<Result<(), EngineError>>,
        start: bool,
    ) {
        let Some(session) = &self.session else {
            let operation = if start { "request start" } else { "request stop" };
            let _ = reply.send(Err(EngineError::communication(
                operation,
                "no active session",
            )));
            return;
        };
        let id = session.id;
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            let result = if start {
                api.request_start(&id).await
            } else {
                api.request_stop(&id).await
            };
            let _ = reply.send(result);
        });
    }

    fn install_session(&mut self, session: Session) {
        info!(session.id = %session.id, code = %session.code, "session installed");
        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
        self.completion_reported = false;
        let task = ChannelClient::spawn(
            Arc::clone(&self.channel),
            session.id,
            self.mailbox.clone(),
        );
        self.channel_task = Some(task);
        self.session = Some(session);
    }

    fn switch_mode(&mut self, mode: RecordingMode) {
        let Some(session) = &mut self.session else {
            return;
        };
        session.layout.recording_mode = mode;
        self.conductor.set_preset_for(mode);

        // Switching mid-recording cuts over to a new clip in the new mode.
        if session.is_recording() {
            self.conductor.start(mode);
        }
    }

    fn enable_source(&mut self, id: SourceId) {
        let Some(source) = self.registry.enable(&id) else {
            warn!(source.id = %id, "enable requested for unknown source");
            return;
        };
        let Some(session) = &mut self.session else {
            return;
        };

        // Optimistic append; the authoritative session replacement will
        // reconcile later.
        if !session.sources.iter().any(|s| s.id == id) {
            session.sources.push(source.clone());
        }

        let api = Arc::clone(&self.api);
        let session_id = session.id;
        tokio::spawn(async move {
            if let Err(e) = api.add_source(&session_id, &source).await {
                warn!(source.id = %source.id, error = %e, "source registration failed");
            }
        });
    }

    fn disable_source(&mut self, id: SourceId) {
        if self.registry.disable(&id).is_none() {
            warn!(source.id = %id, "disable requested for unknown source");
            return;
        }
        let Some(session) = &mut self.session else {
            return;
        };

        if let Some(s) = session.sources.iter_mut().find(|s| s.id == id) {
            s.status = SourceStatus::Disabled;
        }

        let api = Arc::clone(&self.api);
        let session_id = session.id;
        tokio::spawn(async move {
            if let Err(e) = api.remove_source(&session_id, &id).await {
                warn!(source.id = %id, error = %e, "source removal failed");
            }
        });
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::SessionUpdated(session) => {
                debug!(session.id = %session.id, status = ?session.status, "session replaced");
                self.session = Some(session);
            }
            ChannelEvent::SourceAdded(mut source) => {
                // The channel does not distinguish origin; anything arriving
                // here belongs to a peer. Appended as-is; the next full
                // session replacement reconciles duplicates.
                source.origin.kind = OriginKind::Remote;
                if let Some(session) = &mut self.session {
                    session.sources.push(source);
                }
            }
            ChannelEvent::StartRecording => {
                let Some(session) = &mut self.session else {
                    warn!("start broadcast with no active session");
                    return;
                };
                let mode = session.layout.recording_mode;
                session.status = SessionStatus::Recording;
                self.conductor.start(mode);
            }
            ChannelEvent::StopRecording => {
                if let Some(session) = &mut self.session {
                    session.status = SessionStatus::Stopped;
                }
                self.conductor.stop();
            }
            ChannelEvent::Unknown { name } => {
                debug!(event = %name, "unknown channel event reached coordinator");
            }
        }
    }

    fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::ClipStarted { path } => self.conductor.clip_started(&path),
            PipelineEvent::ClipFinished { path, error } => {
                if let Some(clip) = self.conductor.clip_finished(&path, error) {
                    self.uploader.begin(&clip);
                }
            }
        }
    }

    fn handle_upload_update(&mut self, update: UploadUpdate) {
        match update {
            UploadUpdate::Progress { clip, fraction } => {
                if let Some(clip) = self.conductor.clip_mut(&clip) {
                    clip.progress = fraction;
                }
            }
            UploadUpdate::Completed { clip, url } => {
                if let Some(clip) = self.conductor.clip_mut(&clip) {
                    clip.mark_uploaded(url);
                }
                self.check_completion();
            }
            UploadUpdate::Failed { clip, reason } => {
                error!(clip.id = %clip, reason, "clip upload failed permanently");
                if let Some(clip) = self.conductor.clip_mut(&clip) {
                    clip.mark_upload_failed();
                }
            }
        }
    }

    /// Report the final clip list exactly once, when every clip has landed.
    fn check_completion(&mut self) {
        if self.completion_reported || !self.conductor.all_uploaded() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        self.completion_reported = true;

        let api = Arc::clone(&self.api);
        let session_id = session.id;
        let clips = self.conductor.clips();
        info!(session.id = %session_id, count = clips.len(), "all clips uploaded, reporting");
        tokio::spawn(async move {
            if let Err(e) = api.report_clips(&session_id, &clips).await {
                warn!(error = %e, "clip report failed");
            }
        });
    }
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMsg>,
}

impl EngineHandle {
    /// Spawn a new engine from its dependency seams.
    pub fn spawn(deps: EngineDeps) -> Self {
        Engine::spawn(deps)
    }

    async fn send(&self, msg: EngineMsg) -> Result<(), EngineError> {
        self.tx.send(msg).await.map_err(|_| EngineError::Unavailable)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineMsg::Command(build(reply))).await?;
        rx.await.map_err(|_| EngineError::Unavailable)
    }

    /// Create a new session and connect its channel.
    pub async fn create_session(&self) -> Result<Session, EngineError> {
        self.request(|reply| Command::Create { reply }).await?
    }

    /// Join an existing session by code and connect its channel.
    pub async fn join_session(&self, code: &str) -> Result<Session, EngineError> {
        let code = code.to_string();
        self.request(|reply| Command::Join { code, reply }).await?
    }

    /// Configure the capture pipeline against the session's enabled sources.
    pub async fn prepare(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Prepare { reply }).await?
    }

    /// Change the recording mode, cutting to a new clip if recording.
    pub async fn switch_mode(&self, mode: RecordingMode) -> Result<(), EngineError> {
        self.send(EngineMsg::Command(Command::SwitchMode { mode })).await
    }

    /// Enable a local source and register it with the session.
    pub async fn enable_source(&self, id: SourceId) -> Result<(), EngineError> {
        self.send(EngineMsg::Command(Command::EnableSource { id })).await
    }

    /// Disable a local source and ask the server to drop it.
    pub async fn disable_source(&self, id: SourceId) -> Result<(), EngineError> {
        self.send(EngineMsg::Command(Command::DisableSource { id })).await
    }

    /// Prompt for a source's capture permission.
    pub async fn request_permission(&self, id: SourceId) -> Result<(), EngineError> {
        self.send(EngineMsg::Command(Command::RequestPermission { id })).await
    }

    /// Ask the server to start recording on every device in the session.
    pub async fn request_start(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::RequestStart { reply }).await?
    }

    /// Ask the server to stop recording on every device in the session.
    pub async fn request_stop(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::RequestStop { reply }).await?
    }

    /// Current engine state.
    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop the engine task.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineMsg::Command(Command::Shutdown)).await
    }
}
