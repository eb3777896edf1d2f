//! Clip upload coordination.
//!
//! Each finished clip gets its own upload task. Tasks report progress and a
//! single terminal outcome back into the engine mailbox; the coordinator
//! owns the ledger mutation and the whole-session completion check.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use ensembleproto::{Clip, ClipId};

use crate::api::SessionApi;
use crate::coordinator::EngineMsg;
use crate::error::EngineError;

/// Progress and outcome of one clip upload.
#[derive(Debug, Clone)]
pub enum UploadUpdate {
    /// Bytes-sent fraction in `0.0..=1.0`. Last write wins.
    Progress { clip: ClipId, fraction: f64 },
    /// The clip landed at `url`.
    Completed { clip: ClipId, url: String },
    /// Terminal failure. No automatic retry.
    Failed { clip: ClipId, reason: String },
}

/// Byte-moving seam for uploads.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Stream the file at `local_path` to `destination`, reporting
    /// fractional progress on `progress` as bytes go out.
    async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        progress: mpsc::Sender<f64>,
    ) -> Result<(), EngineError>;
}

const PROGRESS_BUFFER: usize = 16;

/// Fans finished clips out to upload tasks.
pub struct Uploader {
    transport: Arc<dyn UploadTransport>,
    api: Arc<dyn SessionApi>,
    fallback_base: String,
    updates: mpsc::Sender<EngineMsg>,
}

impl Uploader {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        api: Arc<dyn SessionApi>,
        fallback_base: &str,
        updates: mpsc::Sender<EngineMsg>,
    ) -> Self {
        Self {
            transport,
            api,
            fallback_base: fallback_base.trim_end_matches('/').to_string(),
            updates,
        }
    }

    /// Start uploading a clip. Returns immediately; progress and the
    /// terminal outcome arrive as `UploadUpdate`s on the engine mailbox.
    pub fn begin(&self, clip: &Clip) {
        let transport = Arc::clone(&self.transport);
        let api = Arc::clone(&self.api);
        let fallback = format!("{}/{}.mp4", self.fallback_base, clip.id.path_segment());
        let updates = self.updates.clone();
        let clip_id = clip.id;
        let local_path = clip.local_path.clone();

        tokio::spawn(async move {
            let destination = match api.signed_upload_url().await {
                Ok(url) => url,
                Err(e) => {
                    debug!(clip.id = %clip_id, error = %e, "no signed url, using fallback destination");
                    fallback
                }
            };
            info!(clip.id = %clip_id, destination, "upload starting");

            let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER);
            let forwarder_updates = updates.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(fraction) = progress_rx.recv().await {
                    let update = UploadUpdate::Progress {
                        clip: clip_id,
                        fraction,
                    };
                    if forwarder_updates
                        .send(EngineMsg::Upload(update))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            });

            let outcome = transport
                .upload(&local_path, &destination, progress_tx)
                .await;
            let _ = forwarder.await;

            let terminal = match outcome {
                Ok(()) => UploadUpdate::Completed {
                    clip: clip_id,
                    url: destination,
                },
                Err(e) => {
                    warn!(clip.id = %clip_id, error = %e, "upload failed");
                    UploadUpdate::Failed {
                        clip: clip_id,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = updates.send(EngineMsg::Upload(terminal)).await;
        });
    }
}

/// Streaming HTTP PUT transport with byte-counting progress.
pub struct HttpUploadTransport {
    client: reqwest::Client,
}

impl HttpUploadTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpUploadTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        progress: mpsc::Sender<f64>,
    ) -> Result<(), EngineError> {
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| EngineError::Upload(format!("open {}: {e}", local_path.display())))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| EngineError::Upload(e.to_string()))?
            .len();

        let mut reader = ReaderStream::new(file);
        let counted = async_stream::stream! {
            let mut sent: u64 = 0;
            while let Some(chunk) = reader.next().await {
                match chunk {
                    Ok(bytes) => {
                        sent += bytes.len() as u64;
                        let fraction = if total == 0 {
                            1.0
                        } else {
                            sent as f64 / total as f64
                        };
                        let _ = progress.try_send(fraction);
                        yield Ok::<Bytes, std::io::Error>(bytes);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        let response = self
            .client
            .put(destination)
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(counted))
            .send()
            .await
            .map_err(|e| EngineError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Upload(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}
