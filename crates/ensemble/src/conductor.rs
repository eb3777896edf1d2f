//! Recording orchestration: the capture pipeline seam, the shared
//! recording clock, and the clip ledger.
//!
//! The conductor never talks to the network. It drives a `CapturePipeline`
//! and keeps per-clip bookkeeping; the coordinator feeds it commands and
//! pipeline events.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use ensembleproto::{Clip, ClipId, QualityPreset, RecordingMode, Source};

use crate::error::EngineError;

/// Events reported by a capture pipeline as it works through a clip.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The pipeline began writing the clip file at `path`.
    ClipStarted { path: PathBuf },
    /// The pipeline finished the clip file at `path`. `error` is set when
    /// the file is unusable.
    ClipFinished {
        path: PathBuf,
        error: Option<String>,
    },
}

/// Media capture seam.
///
/// Implementations wrap whatever capture machinery the platform offers.
/// They report lifecycle through the `PipelineEvent` channel handed to the
/// engine at construction.
pub trait CapturePipeline: Send {
    /// Point the pipeline at the given enabled sources. Called before any
    /// clip starts and again whenever the source set changes.
    fn configure(&mut self, sources: &[Source]) -> Result<(), EngineError>;

    /// Adjust output quality. Takes effect on the next clip.
    fn set_preset(&mut self, preset: QualityPreset);

    /// Begin writing a new clip to `path`. A pipeline already mid-clip
    /// finishes the current file first.
    fn start_clip(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Finish the current clip, if any.
    fn stop(&mut self);
}

/// Write-once reference instant shared by every clip in a recording run.
///
/// The first clip start arms the clock; later starts reuse it so that clip
/// offsets stay on one timeline.
#[derive(Debug, Default)]
pub struct RecordingClock {
    reference: Option<Instant>,
}

impl RecordingClock {
    /// Arm the clock if it is not armed yet.
    pub fn start_if_needed(&mut self) {
        if self.reference.is_none() {
            self.reference = Some(Instant::now());
        }
    }

    /// Milliseconds since the reference instant, or None before arming.
    pub fn offset_ms(&self) -> Option<i64> {
        self.reference
            .map(|reference| reference.elapsed().as_millis() as i64)
    }

    pub fn is_armed(&self) -> bool {
        self.reference.is_some()
    }
}

/// Keyed clip store preserving insertion order.
///
/// Pipeline events identify clips by file path, commands by id; the ledger
/// answers both.
#[derive(Debug, Default)]
pub struct ClipLedger {
    clips: HashMap<ClipId, Clip>,
    order: Vec<ClipId>,
    by_path: HashMap<PathBuf, ClipId>,
}

impl ClipLedger {
    pub fn insert(&mut self, clip: Clip) {
        // First clip registered for a path keeps the path mapping.
        if let Entry::Vacant(slot) = self.by_path.entry(clip.local_path.clone()) {
            slot.insert(clip.id);
        }
        self.order.push(clip.id);
        self.clips.insert(clip.id, clip);
    }

    pub fn get(&self, id: &ClipId) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn get_mut(&mut self, id: &ClipId) -> Option<&mut Clip> {
        self.clips.get_mut(id)
    }

    pub fn by_path_mut(&mut self, path: &Path) -> Option<&mut Clip> {
        let id = self.by_path.get(path)?;
        self.clips.get_mut(id)
    }

    /// Clips in the order they were started.
    pub fn in_order(&self) -> Vec<Clip> {
        self.order
            .iter()
            .filter_map(|id| self.clips.get(id).cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// True once at least one clip exists and every clip is Uploaded.
    pub fn all_uploaded(&self) -> bool {
        !self.clips.is_empty() && self.clips.values().all(Clip::is_uploaded)
    }
}

/// Drives the capture pipeline and owns clip bookkeeping for one session.
pub struct Conductor {
    pipeline: Box<dyn CapturePipeline>,
    clock: RecordingClock,
    ledger: ClipLedger,
    clip_dir: PathBuf,
}

impl Conductor {
    pub fn new(pipeline: Box<dyn CapturePipeline>, clip_dir: PathBuf) -> Self {
        Self {
            pipeline,
            clock: RecordingClock::default(),
            ledger: ClipLedger::default(),
            clip_dir,
        }
    }

    /// Configure the pipeline against the enabled subset of `sources`.
    /// Pipeline failures are logged and skipped; preparation itself never
    /// fails.
    pub fn prepare(&mut self, sources: &[Source]) {
        let enabled: Vec<Source> = sources.iter().filter(|s| s.is_enabled()).cloned().collect();
        debug!(count = enabled.len(), "configuring capture pipeline");
        if let Err(e) = self.pipeline.configure(&enabled) {
            warn!(error = %e, "pipeline configuration failed, continuing without");
        }
    }

    /// Start a new clip in the given mode. The recording clock is armed on
    /// the first start only. The clip is registered in the ledger even when
    /// the pipeline refuses to start, so its failure stays visible.
    pub fn start(&mut self, mode: RecordingMode) -> ClipId {
        self.clock.start_if_needed();

        let id = ClipId::generate();
        let path = self.clip_dir.join(format!("{}.mp4", id.path_segment()));
        let clip = Clip::new(id, path, mode);
        info!(clip.id = %id, ?mode, "starting clip");

        if let Err(e) = self.pipeline.start_clip(&clip.local_path) {
            error!(clip.id = %id, error = %e, "pipeline failed to start clip");
        }
        self.ledger.insert(clip);
        id
    }

    /// Push a quality preset derived from the recording mode.
    pub fn set_preset_for(&mut self, mode: RecordingMode) {
        self.pipeline.set_preset(mode.quality_preset());
    }

    /// Finish the current clip, if any.
    pub fn stop(&mut self) {
        self.pipeline.stop();
    }

    /// Pipeline confirmed a clip file began. Stamps the start offset on the
    /// shared timeline.
    pub fn clip_started(&mut self, path: &Path) {
        let Some(offset) = self.clock.offset_ms() else {
            warn!(?path, "clip started before clock armed");
            return;
        };
        match self.ledger.by_path_mut(path) {
            Some(clip) => clip.mark_recording(offset),
            None => error!(?path, "started clip not found in ledger"),
        }
    }

    /// Pipeline finished a clip file. Stamps end and duration and moves the
    /// clip to Uploading; returns the updated clip so the caller can hand
    /// it off. A pipeline error is logged but the clip is finalized and
    /// uploaded all the same; the upload outcome decides its fate.
    pub fn clip_finished(&mut self, path: &Path, error: Option<String>) -> Option<Clip> {
        let offset = self.clock.offset_ms();
        let Some(clip) = self.ledger.by_path_mut(path) else {
            error!(?path, "finished clip not found in ledger");
            return None;
        };

        if let Some(reason) = &error {
            warn!(clip.id = %clip.id, reason = %reason, "pipeline reported an error finalizing clip");
        }

        let Some(offset) = offset else {
            warn!(clip.id = %clip.id, "clip finished before clock armed");
            return None;
        };
        clip.mark_finished(offset);
        Some(clip.clone())
    }

    pub fn clip_mut(&mut self, id: &ClipId) -> Option<&mut Clip> {
        self.ledger.get_mut(id)
    }

    pub fn clips(&self) -> Vec<Clip> {
        self.ledger.in_order()
    }

    pub fn all_uploaded(&self) -> bool {
        self.ledger.all_uploaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensembleproto::ClipState;
    use pretty_assertions::assert_eq;

    struct NullPipeline;

    impl CapturePipeline for NullPipeline {
        fn configure(&mut self, _sources: &[Source]) -> Result<(), EngineError> {
            Ok(())
        }
        fn set_preset(&mut self, _preset: QualityPreset) {}
        fn start_clip(&mut self, _path: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    fn conductor() -> Conductor {
        Conductor::new(Box::new(NullPipeline), PathBuf::from("/tmp/clips"))
    }

    #[test]
    fn clock_arms_once() {
        let mut clock = RecordingClock::default();
        assert!(clock.offset_ms().is_none());

        clock.start_if_needed();
        let first = clock.reference;
        clock.start_if_needed();
        assert_eq!(clock.reference, first);
        assert!(clock.offset_ms().unwrap() >= 0);
    }

    fn ledger_clip(path: &str, mode: RecordingMode) -> Clip {
        Clip::new(ClipId::generate(), PathBuf::from(path), mode)
    }

    #[test]
    fn ledger_keeps_insertion_order() {
        let mut ledger = ClipLedger::default();
        let a = ledger_clip("/tmp/a.mp4", RecordingMode::Facecam);
        let b = ledger_clip("/tmp/b.mp4", RecordingMode::Screen);
        let (a_id, b_id) = (a.id, b.id);
        ledger.insert(a);
        ledger.insert(b);

        let ordered: Vec<ClipId> = ledger.in_order().iter().map(|c| c.id).collect();
        assert_eq!(ordered, vec![a_id, b_id]);
    }

    #[test]
    fn path_lookup_returns_first_match() {
        let mut ledger = ClipLedger::default();
        let first = ledger_clip("/tmp/shared.mp4", RecordingMode::Facecam);
        let second = ledger_clip("/tmp/shared.mp4", RecordingMode::Facecam);
        let first_id = first.id;
        ledger.insert(first);
        ledger.insert(second);

        let found = ledger.by_path_mut(Path::new("/tmp/shared.mp4")).unwrap();
        assert_eq!(found.id, first_id);
    }

    #[test]
    fn empty_ledger_is_never_complete() {
        let ledger = ClipLedger::default();
        assert!(!ledger.all_uploaded());
    }

    #[test]
    fn completion_requires_every_clip_uploaded() {
        let mut ledger = ClipLedger::default();
        let mut done = ledger_clip("/tmp/done.mp4", RecordingMode::Facecam);
        done.mark_uploaded("https://cdn.example/a.mp4".to_string());
        let pending = ledger_clip("/tmp/pending.mp4", RecordingMode::Facecam);
        ledger.insert(done);
        assert!(ledger.all_uploaded());

        ledger.insert(pending);
        assert!(!ledger.all_uploaded());
    }

    #[test]
    fn clip_stays_idle_until_pipeline_confirms() {
        let mut conductor = conductor();
        let id = conductor.start(RecordingMode::Facecam);
        conductor.stop();

        let clip = conductor.ledger.get(&id).unwrap();
        assert_eq!(clip.state, ClipState::Idle);
        assert!(clip.start_time.is_none());
    }

    #[test]
    fn start_then_finish_stamps_the_timeline() {
        let mut conductor = conductor();
        let id = conductor.start(RecordingMode::PictureInPicture);
        let path = conductor.ledger.get(&id).unwrap().local_path.clone();

        conductor.clip_started(&path);
        let clip = conductor.ledger.get(&id).unwrap();
        assert_eq!(clip.state, ClipState::Recording);
        assert!(clip.start_time.is_some());

        let finished = conductor.clip_finished(&path, None).unwrap();
        assert_eq!(finished.state, ClipState::Uploading);
        assert!(finished.end_time.unwrap() >= finished.start_time.unwrap());
        assert_eq!(
            finished.duration.unwrap(),
            finished.end_time.unwrap() - finished.start_time.unwrap()
        );
    }

    #[test]
    fn errored_finalize_is_stamped_and_handed_off() {
        let mut conductor = conductor();
        let id = conductor.start(RecordingMode::Screen);
        let path = conductor.ledger.get(&id).unwrap().local_path.clone();
        conductor.clip_started(&path);

        let clip = conductor
            .clip_finished(&path, Some("encoder died".to_string()))
            .unwrap();
        assert_eq!(clip.id, id);
        assert_eq!(clip.state, ClipState::Uploading);
        assert!(clip.end_time.is_some());
        assert!(clip.duration.is_some());
    }

    #[test]
    fn finish_before_start_still_reaches_uploading() {
        let mut conductor = conductor();
        let id = conductor.start(RecordingMode::Facecam);
        let path = conductor.ledger.get(&id).unwrap().local_path.clone();

        conductor.clip_finished(&path, None);
        conductor.clip_started(&path);

        let clip = conductor.ledger.get(&id).unwrap();
        assert_eq!(clip.state, ClipState::Uploading);
        assert!(clip.start_time.is_some());
        assert!(clip.end_time.is_some());
        assert_eq!(
            clip.duration.unwrap(),
            clip.end_time.unwrap() - clip.start_time.unwrap()
        );
    }

    #[test]
    fn unknown_path_is_ignored() {
        let mut conductor = conductor();
        conductor.start(RecordingMode::Facecam);
        assert!(conductor
            .clip_finished(Path::new("/tmp/unrelated.mp4"), None)
            .is_none());
    }

    #[test]
    fn second_start_reuses_the_clock() {
        let mut conductor = conductor();
        conductor.start(RecordingMode::Facecam);
        assert!(conductor.clock.is_armed());
        let reference = conductor.clock.reference;
        conductor.start(RecordingMode::Screen);
        assert_eq!(conductor.clock.reference, reference);
    }
}
