use crate::error::{Error, Result};

use super::decode::RawDetectionTensor;

/// A borrowed, tightly packed RGB8 frame.
#[derive(Debug, Clone, Copy)]
pub struct RgbFrame<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> RgbFrame<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(Error::FrameSize { width, height, expected, found: pixels.len() });
        }
        Ok(Self { pixels, width, height })
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Decodes a JPEG or PNG into a packed RGB8 buffer.
pub fn decode_image(bytes: &[u8]) -> Result<image::RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// The neural detector, seen from the box engine: one frame in, one tensor out.
///
/// Implementations must not keep the pixel slice beyond the `infer` call.
pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Anchors per inference; every returned tensor has exactly this length.
    fn anchor_count(&self) -> usize;

    fn infer(&self, frame: &RgbFrame<'_>) -> Result<RawDetectionTensor>;
}
