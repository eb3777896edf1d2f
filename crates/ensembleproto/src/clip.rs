//! Clip types: one recorded file segment with timing relative to the
//! session's reference instant.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::RecordingMode;

/// Unique identifier for a recorded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub Uuid);

impl ClipId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Lower-cased hyphenated form for file names and upload paths.
    pub fn path_segment(&self) -> String {
        self.0.as_hyphenated().to_string().to_lowercase()
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Lifecycle of a clip: Idle → Recording → Uploading → Uploaded | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipState {
    Idle,
    Recording,
    Uploading,
    Uploaded,
    Failed,
}

/// One recorded file segment.
///
/// `start_time` and `end_time` are milliseconds relative to the session's
/// reference instant, so clips recorded at different wall-clock times across
/// devices stay comparable once the server aligns them. `duration` is
/// defined iff both ends are set, and equals their difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_url: Option<String>,
    pub local_path: PathBuf,
    pub mode: RecordingMode,
    pub state: ClipState,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl Clip {
    /// A fresh clip awaiting its pipeline start callback.
    pub fn new(id: ClipId, local_path: PathBuf, mode: RecordingMode) -> Self {
        Self {
            id,
            uploaded_url: None,
            local_path,
            mode,
            state: ClipState::Idle,
            progress: 0.0,
            start_time: None,
            end_time: None,
            duration: None,
        }
    }

    /// The pipeline began writing this clip at the given offset.
    ///
    /// The start callback can arrive after the finish callback; a clip that
    /// already finalized keeps its state and gains the now-computable
    /// `duration` instead.
    pub fn mark_recording(&mut self, offset_ms: i64) {
        self.start_time = Some(offset_ms);
        match self.end_time {
            Some(end) => self.duration = Some(end - offset_ms),
            None => self.state = ClipState::Recording,
        }
    }

    /// The pipeline finalized this clip's file at the given offset.
    /// Computes `duration` when the start offset is known.
    pub fn mark_finished(&mut self, offset_ms: i64) {
        self.end_time = Some(offset_ms);
        self.duration = self.start_time.map(|start| offset_ms - start);
        self.state = ClipState::Uploading;
    }

    pub fn mark_uploaded(&mut self, url: String) {
        self.uploaded_url = Some(url);
        self.progress = 1.0;
        self.state = ClipState::Uploaded;
    }

    pub fn mark_upload_failed(&mut self) {
        self.state = ClipState::Failed;
    }

    pub fn is_uploaded(&self) -> bool {
        self.state == ClipState::Uploaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clip() -> Clip {
        Clip::new(
            ClipId::generate(),
            PathBuf::from("/tmp/clip.mp4"),
            RecordingMode::Facecam,
        )
    }

    #[test]
    fn new_clip_is_idle_with_no_timing() {
        let clip = clip();
        assert_eq!(clip.state, ClipState::Idle);
        assert_eq!(clip.progress, 0.0);
        assert!(clip.start_time.is_none());
        assert!(clip.end_time.is_none());
        assert!(clip.duration.is_none());
    }

    #[test]
    fn duration_is_end_minus_start() {
        let mut clip = clip();
        clip.mark_recording(250);
        clip.mark_finished(1250);

        assert_eq!(clip.state, ClipState::Uploading);
        assert_eq!(clip.start_time, Some(250));
        assert_eq!(clip.end_time, Some(1250));
        assert_eq!(clip.duration, Some(1000));
    }

    #[test]
    fn finish_without_start_leaves_duration_unset() {
        let mut clip = clip();
        clip.mark_finished(900);

        assert_eq!(clip.end_time, Some(900));
        assert!(clip.duration.is_none());
        assert_eq!(clip.state, ClipState::Uploading);
    }

    #[test]
    fn late_start_fills_duration_without_regressing_state() {
        let mut clip = clip();
        clip.mark_finished(900);
        clip.mark_recording(100);

        assert_eq!(clip.state, ClipState::Uploading);
        assert_eq!(clip.start_time, Some(100));
        assert_eq!(clip.end_time, Some(900));
        assert_eq!(clip.duration, Some(800));
    }

    #[test]
    fn uploaded_clip_has_full_progress_and_url() {
        let mut clip = clip();
        clip.mark_recording(0);
        clip.mark_finished(100);
        clip.mark_uploaded("https://storage.example/videos/x.mp4".into());

        assert!(clip.is_uploaded());
        assert_eq!(clip.progress, 1.0);
        assert!(clip.uploaded_url.is_some());
    }

    #[test]
    fn clip_serializes_camel_case() {
        let mut clip = clip();
        clip.mark_recording(10);
        let value = serde_json::to_value(&clip).unwrap();

        assert_eq!(value["state"], "Recording");
        assert_eq!(value["startTime"], 10);
        assert_eq!(value["localPath"], "/tmp/clip.mp4");
        assert!(value.get("endTime").is_none());
        assert!(value.get("uploadedUrl").is_none());
    }
}
