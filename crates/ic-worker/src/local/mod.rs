//! Local collaborator implementations.
//!
//! These let the pipeline run without any external service: detections
//! are replayed from JSON recordings, remote storage is a directory and
//! the relational sink is a CSV file per table.

mod replay;
mod sink;
mod storage;

pub use replay::{
    frame_image_name, interpret_predictions, parse_frame_image_name, recording_path,
    FaceRecord, FrameRecord, Prediction, Rect, ReplayEventDetector, ReplaySubjectIdentifier,
};
pub use sink::CsvResultsSink;
pub use storage::LocalDirStorage;
