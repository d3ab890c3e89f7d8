use std::path::PathBuf;

use thiserror::Error;

/// Failures that cross a process boundary: files, environment, models, images.
///
/// Contract violations inside the box engine are not represented here; they panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("rgb frame {width}x{height} expects {expected} bytes, got {found}")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        found: usize,
    },

    #[error("detector {detector} failed: {message}")]
    Detector {
        detector: &'static str,
        message: String,
    },

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn detector(detector: &'static str, message: impl Into<String>) -> Self {
        Error::Detector { detector, message: message.into() }
    }
}
