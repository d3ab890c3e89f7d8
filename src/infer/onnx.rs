use std::sync::Mutex;

use image::{RgbImage, imageops::FilterType};
use ndarray::Array3;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};

use super::decode::RawDetectionTensor;
use super::detector::{FaceDetector, RgbFrame};

const NAME: &str = "onnx";

/// Detector backed by an ONNX Runtime session.
///
/// Expects an NCHW float input and two outputs: per-anchor scores `[N]` and
/// interleaved `x, y, w, h` boxes `[N * 4]`.
pub struct OnnxDetector {
    pub session: Mutex<Session>,
    pub input_name: String,
    pub input_width: usize,
    pub input_height: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub scores_output: String,
    pub boxes_output: String,
    pub anchor_count: usize,
}

impl OnnxDetector {
    pub fn new(session: Session, input_width: usize, input_height: usize, anchor_count: usize) -> Self {
        Self {
            session: Mutex::new(session),
            input_name: "input".to_string(),
            input_width,
            input_height,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
            scores_output: "scores".to_string(),
            boxes_output: "boxes".to_string(),
            anchor_count,
        }
    }

    /// Center-crops to the model's aspect ratio, resizes, normalizes, and
    /// lays the result out as CHW.
    fn preprocess(&self, frame: &RgbFrame<'_>) -> Result<Vec<f32>> {
        let img = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| Error::detector(NAME, "frame buffer does not match its dimensions"))?;
        let (iw, ih) = (self.input_width as u32, self.input_height as u32);
        let (x, y, crop_w, crop_h) = center_crop(frame.width(), frame.height(), iw, ih)?;
        let cropped = image::imageops::crop_imm(&img, x, y, crop_w, crop_h).to_image();
        let resized = image::imageops::resize(&cropped, iw, ih, FilterType::Triangle);

        let (width, height) = (self.input_width, self.input_height);
        let mut hwc = Array3::<f32>::zeros((height, width, 3));
        for (x, y, p) in resized.enumerate_pixels() {
            for c in 0..3 {
                hwc[[y as usize, x as usize, c]] = (p[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }
        Ok(hwc.permuted_axes([2, 0, 1]).as_standard_layout().into_owned().into_raw_vec())
    }
}

/// Largest centered `(x, y, width, height)` window of a `w`x`h` frame with
/// the model input's aspect ratio.
fn center_crop(w: u32, h: u32, input_w: u32, input_h: u32) -> Result<(u32, u32, u32, u32)> {
    if w == 0 || h == 0 || input_w == 0 || input_h == 0 {
        return Err(Error::detector(NAME, format!("cannot crop a {w}x{h} frame to a {input_w}x{input_h} input")));
    }
    let target_aspect = input_w as f32 / input_h as f32;
    let (crop_w, crop_h) = if w as f32 / h as f32 > target_aspect {
        (((h as f32) * target_aspect).round() as u32, h)
    } else {
        (w, ((w as f32) / target_aspect).round() as u32)
    };
    let (crop_w, crop_h) = (crop_w.clamp(1, w), crop_h.clamp(1, h));
    Ok(((w - crop_w) / 2, (h - crop_h) / 2, crop_w, crop_h))
}

fn missing_output(name: &str) -> Error {
    Error::detector(NAME, format!("model has no output named {name:?}"))
}

impl FaceDetector for OnnxDetector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    fn infer(&self, frame: &RgbFrame<'_>) -> Result<RawDetectionTensor> {
        let chw = self.preprocess(frame)?;
        let input = Tensor::from_array(([1usize, 3, self.input_height, self.input_width], chw))
            .map_err(|e| Error::detector(NAME, e.to_string()))?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::detector(NAME, "session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| Error::detector(NAME, e.to_string()))?;

        let (_, scores) = outputs
            .get(self.scores_output.as_str())
            .ok_or_else(|| missing_output(&self.scores_output))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::detector(NAME, e.to_string()))?;
        let (_, boxes) = outputs
            .get(self.boxes_output.as_str())
            .ok_or_else(|| missing_output(&self.boxes_output))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::detector(NAME, e.to_string()))?;

        if scores.len() != self.anchor_count || boxes.len() != self.anchor_count * 4 {
            return Err(Error::detector(
                NAME,
                format!(
                    "output sizes scores={} boxes={} do not match {} anchors",
                    scores.len(),
                    boxes.len(),
                    self.anchor_count
                ),
            ));
        }
        Ok(RawDetectionTensor::from_interleaved(boxes, scores.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_frame_is_cropped_to_a_square_input() {
        assert_eq!(center_crop(200, 100, 128, 128).unwrap(), (50, 0, 100, 100));
        assert_eq!(center_crop(100, 300, 128, 128).unwrap(), (0, 100, 100, 100));
    }

    #[test]
    fn empty_frame_is_a_detector_error() {
        for (w, h) in [(0, 0), (0, 10), (10, 0)] {
            let err = center_crop(w, h, 128, 128).unwrap_err();
            assert!(matches!(err, Error::Detector { detector: "onnx", .. }));
        }
    }

    #[test]
    fn missing_output_names_the_output() {
        let err = missing_output("scores");
        assert!(err.to_string().contains("\"scores\""));
    }
}
