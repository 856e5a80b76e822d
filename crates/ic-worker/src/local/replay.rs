//! Detection recordings.
//!
//! A skull recording is a JSON array of sampled frames, each carrying the
//! raw predictions of the detection model:
//!
//! ```json
//! [{"time": "00:01:02.500",
//!   "predictions": [{"tag_name": "skull", "probability": 0.92,
//!                    "bounding_box": {"left": 10, "top": 20, "width": 5, "height": 5}}]}]
//! ```
//!
//! A face recording maps cached frame image names to the faces found in
//! them. Faces without a name were not recognised:
//!
//! ```json
//! {"7_00_01_02_500.jpg": [{"name": "alice",
//!                          "face_rectangle": {"left": 8, "top": 18, "width": 6, "height": 6}}]}
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ic_models::{BoundingBox, EntryKey, IdentifiedSubject, Timestamp, UNKNOWN_LABEL};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};
use crate::providers::{EventDetector, FrameEvents, SubjectIdentifier};

/// Rectangle in `left, top, width, height` form.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Rect> for BoundingBox {
    fn from(r: Rect) -> Self {
        BoundingBox::from_xywh(r.left, r.top, r.width, r.height)
    }
}

/// One raw prediction of the skull model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    pub tag_name: String,
    pub probability: f64,
    pub bounding_box: Rect,
}

/// One sampled frame of a skull recording.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameRecord {
    pub time: Timestamp,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

/// One face of a face recording.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FaceRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub face_rectangle: Rect,
}

/// Keep predictions with the given tag at or above `confidence` and convert
/// them to bounding boxes.
pub fn interpret_predictions(
    predictions: &[Prediction],
    tag: &str,
    confidence: f64,
) -> Vec<BoundingBox> {
    predictions
        .iter()
        .filter(|p| p.tag_name == tag && p.probability >= confidence)
        .map(|p| p.bounding_box.into())
        .collect()
}

/// Recording file for an episode inside a recordings directory.
pub fn recording_path(dir: &Path, episode: u32) -> PathBuf {
    dir.join(format!("episode{episode}.json"))
}

/// Cached image name of a frame, e.g. `7_00_01_02_500.jpg`.
pub fn frame_image_name(key: &EntryKey) -> String {
    format!("{}_{}.jpg", key.episode, key.time.with_delimiter("_"))
}

/// Inverse of [`frame_image_name`]. Any extension is accepted.
pub fn parse_frame_image_name(name: &str) -> Option<EntryKey> {
    let (stem, _ext) = name.rsplit_once('.')?;
    let (episode, time) = stem.split_once('_')?;
    let episode = episode.parse().ok()?;
    let time = Timestamp::from_delimited(time, "_").ok()?;
    Some(EntryKey::new(episode, time))
}

async fn read_recording<T: serde::de::DeserializeOwned>(path: &Path) -> WorkerResult<T> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        WorkerError::invalid_recording(path.display().to_string(), e.to_string())
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| WorkerError::invalid_recording(path.display().to_string(), e.to_string()))
}

/// Replays a skull recording.
#[derive(Debug, Clone)]
pub struct ReplayEventDetector {
    recordings_dir: PathBuf,
    tag: String,
    confidence: f64,
}

impl ReplayEventDetector {
    pub fn new(recordings_dir: impl Into<PathBuf>, tag: impl Into<String>, confidence: f64) -> Self {
        Self {
            recordings_dir: recordings_dir.into(),
            tag: tag.into(),
            confidence,
        }
    }
}

#[async_trait]
impl EventDetector for ReplayEventDetector {
    async fn detect_events(
        &self,
        episode: u32,
        video_path: &Path,
    ) -> WorkerResult<Vec<FrameEvents>> {
        let path = recording_path(&self.recordings_dir, episode);
        debug!(
            video = %video_path.display(),
            recording = %path.display(),
            "Replaying skull detections"
        );

        let frames: Vec<FrameRecord> = read_recording(&path).await?;
        let sampled = frames.len();
        let events: Vec<FrameEvents> = frames
            .into_iter()
            .filter_map(|frame| {
                let boxes = interpret_predictions(&frame.predictions, &self.tag, self.confidence);
                (!boxes.is_empty()).then_some(FrameEvents {
                    time: frame.time,
                    boxes,
                })
            })
            .collect();

        info!(
            episode,
            sampled_frames = sampled,
            frames_with_skulls = events.len(),
            "Replayed skull detections"
        );
        Ok(events)
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

/// Replays a face recording.
#[derive(Debug, Clone, Default)]
pub struct ReplaySubjectIdentifier {
    frames: HashMap<EntryKey, Vec<IdentifiedSubject>>,
}

impl ReplaySubjectIdentifier {
    /// Load a face recording. Fails on unreadable files and on frame names
    /// that do not encode an `(episode, time)` identity.
    pub async fn load(path: &Path) -> WorkerResult<Self> {
        let raw: HashMap<String, Vec<FaceRecord>> = read_recording(path).await?;

        let mut frames = HashMap::with_capacity(raw.len());
        for (name, faces) in raw {
            let key = parse_frame_image_name(&name).ok_or_else(|| {
                WorkerError::invalid_recording(
                    path.display().to_string(),
                    format!("'{name}' is not a frame image name"),
                )
            })?;
            let subjects = faces
                .into_iter()
                .map(|f| {
                    IdentifiedSubject::new(
                        f.name.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                        f.face_rectangle.into(),
                    )
                })
                .collect();
            frames.insert(key, subjects);
        }

        debug!(path = %path.display(), frames = frames.len(), "Loaded face recording");
        Ok(Self { frames })
    }

    /// Build from already-identified frames.
    pub fn from_frames(frames: HashMap<EntryKey, Vec<IdentifiedSubject>>) -> Self {
        Self { frames }
    }
}

#[async_trait]
impl SubjectIdentifier for ReplaySubjectIdentifier {
    async fn identify(&self, key: &EntryKey) -> WorkerResult<Vec<IdentifiedSubject>> {
        self.frames.get(key).cloned().ok_or_else(|| {
            WorkerError::identification_failed(format!(
                "no recorded frame {}",
                frame_image_name(key)
            ))
        })
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
