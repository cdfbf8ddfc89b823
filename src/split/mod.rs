//! Segmentation engine: probe a media file, plan fixed-length chunks and cut
//! them with ffmpeg into the dated output directory.

pub mod engine;
pub mod extract;
pub mod plan;
pub mod probe;

pub use engine::{AbortHandle, SegmentationReport, Segmenter, SourcePolicy};
pub use extract::ExtractMode;
pub use plan::Naming;
