//! Face box post-processing: decodes anchor tensors from a mobile face
//! detector, suppresses duplicates, and maps the survivors onto the preview.

pub mod config;
pub mod error;
pub mod infer;
pub mod inference;
pub mod models;
pub mod protocol;
pub mod server;

pub use error::{Error, Result};
pub use infer::decode::{AnchorDecoder, RawDetectionTensor};
pub use infer::mapper::{CoordinateMapper, DisplayRect, FrameGeometry, InputCrop};
pub use infer::pipeline::FramePipeline;
pub use infer::prediction::{BoxPrediction, Rect};
pub use infer::suppression::{SuppressionEngine, SuppressionMode};
