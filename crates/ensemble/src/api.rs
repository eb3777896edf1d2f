//! Request/response client for the session-coordination service.
//!
//! This is the slow path: session creation and join, source registration,
//! start/stop requests, signed upload destinations, and the final clip
//! report. Live session synchronization travels over the real-time channel
//! instead (see `channel`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use ensembleproto::{Clip, Session, SessionId, Source, SourceId, SourceStatus};

use crate::error::EngineError;

/// Typed operations against the coordination service.
///
/// Transport failures and response-decode failures both collapse into
/// `EngineError::Communication`; the transport does not distinguish them.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Create a fresh session and return it (status Idle, join code assigned).
    async fn create_session(&self) -> Result<Session, EngineError>;

    /// Fetch an existing session by its join code.
    async fn session_by_code(&self, code: &str) -> Result<Session, EngineError>;

    /// Register a source with the session. The source is sent with status
    /// forced to Enabled.
    async fn add_source(&self, session: &SessionId, source: &Source) -> Result<(), EngineError>;

    /// Ask the server to drop a source from the session.
    async fn remove_source(&self, session: &SessionId, source: &SourceId)
        -> Result<(), EngineError>;

    /// Ask the server to broadcast a synchronized recording start.
    async fn request_start(&self, session: &SessionId) -> Result<(), EngineError>;

    /// Ask the server to broadcast a synchronized recording stop.
    async fn request_stop(&self, session: &SessionId) -> Result<(), EngineError>;

    /// Fetch a signed upload destination for a clip.
    async fn signed_upload_url(&self) -> Result<String, EngineError>;

    /// Report the final clip list once every upload has finished.
    async fn report_clips(&self, session: &SessionId, clips: &[Clip]) -> Result<(), EngineError>;
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    url: String,
}

/// `SessionApi` over HTTP, mirroring the coordination service's REST paths.
pub struct HttpSessionApi {
    base_url: String,
    client: Client,
}

impl HttpSessionApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn expect_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, EngineError> {
        if !response.status().is_success() {
            return Err(EngineError::communication(
                operation,
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create_session(&self) -> Result<Session, EngineError> {
        let response = self
            .client
            .post(self.url("session"))
            .send()
            .await
            .map_err(|e| EngineError::communication("create session", e))?;

        Self::expect_success(response, "create session")
            .await?
            .json::<Session>()
            .await
            .map_err(|e| EngineError::communication("create session", e))
    }

    async fn session_by_code(&self, code: &str) -> Result<Session, EngineError> {
        let response = self
            .client
            .get(self.url("session"))
            .query(&[("code", code)])
            .send()
            .await
            .map_err(|e| EngineError::communication("fetch session", e))?;

        Self::expect_success(response, "fetch session")
            .await?
            .json::<Session>()
            .await
            .map_err(|e| EngineError::communication("fetch session", e))
    }

    async fn add_source(&self, session: &SessionId, source: &Source) -> Result<(), EngineError> {
        // The server expects enrolled sources to arrive enabled.
        let mut source = source.clone();
        source.status = SourceStatus::Enabled;

        let path = format!("session/{}/sources", session.path_segment());
        let response = self
            .client
            .post(self.url(&path))
            .json(&source)
            .send()
            .await
            .map_err(|e| EngineError::communication("add source", e))?;

        Self::expect_success(response, "add source").await?;
        debug!(source.id = %source.id, "source registered with session");
        Ok(())
    }

    async fn remove_source(
        &self,
        session: &SessionId,
        source: &SourceId,
    ) -> Result<(), EngineError> {
        let path = format!("session/{}/sources", session.path_segment());
        let response = self
            .client
            .delete(self.url(&path))
            .json(&serde_json::json!({ "sourceId": source }))
            .send()
            .await
            .map_err(|e| EngineError::communication("remove source", e))?;

        Self::expect_success(response, "remove source").await?;
        Ok(())
    }

    async fn request_start(&self, session: &SessionId) -> Result<(), EngineError> {
        let path = format!("session/{}/start", session.path_segment());
        let response = self
            .client
            .post(self.url(&path))
            .send()
            .await
            .map_err(|e| EngineError::communication("request start", e))?;

        Self::expect_success(response, "request start").await?;
        Ok(())
    }

    async fn request_stop(&self, session: &SessionId) -> Result<(), EngineError> {
        let path = format!("session/{}/stop", session.path_segment());
        let response = self
            .client
            .post(self.url(&path))
            .send()
            .await
            .map_err(|e| EngineError::communication("request stop", e))?;

        Self::expect_success(response, "request stop").await?;
        Ok(())
    }

    async fn signed_upload_url(&self) -> Result<String, EngineError> {
        let response = self
            .client
            .get(self.url("session/upload"))
            .send()
            .await
            .map_err(|e| EngineError::communication("signed upload url", e))?;

        let signed = Self::expect_success(response, "signed upload url")
            .await?
            .json::<SignedUrlResponse>()
            .await
            .map_err(|e| EngineError::communication("signed upload url", e))?;

        Ok(signed.url)
    }

    async fn report_clips(&self, session: &SessionId, clips: &[Clip]) -> Result<(), EngineError> {
        let path = format!("session/{}/media", session.path_segment());
        let response = self
            .client
            .post(self.url(&path))
            .json(clips)
            .send()
            .await
            .map_err(|e| EngineError::communication("report clips", e))?;

        Self::expect_success(response, "report clips").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = HttpSessionApi::new("https://sessions.example/api/");
        assert_eq!(api.url("session"), "https://sessions.example/api/session");
    }

    #[test]
    fn session_paths_use_lowercased_ids() {
        let api = HttpSessionApi::new("https://sessions.example/api");
        let id = SessionId::generate();
        let path = format!("session/{}/start", id.path_segment());
        let url = api.url(&path);
        assert_eq!(url, url.to_lowercase());
    }
}
