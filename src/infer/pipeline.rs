use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

use super::ScoredBox;
use super::decode::{AnchorDecoder, RawDetectionTensor};
use super::detector::{FaceDetector, RgbFrame};
use super::filter::ScoreFilter;
use super::mapper::{CoordinateMapper, DisplayRect, FrameGeometry};
use super::prediction::BoxPrediction;
use super::suppression::SuppressionEngine;

/// decode → filter → suppress → map, once per frame.
///
/// Holds only configuration; every call is independent, so one pipeline can be
/// shared across threads.
#[derive(Debug, Clone)]
pub struct FramePipeline {
    decoder: AnchorDecoder,
    filter: ScoreFilter,
    engine: SuppressionEngine,
    mapper: CoordinateMapper,
}

impl FramePipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let s = &config.suppression;
        Ok(Self {
            decoder: AnchorDecoder::new(s.anchor_count),
            filter: ScoreFilter::new(s.confidence_threshold),
            engine: SuppressionEngine::new(s.iou_threshold, s.mode),
            mapper: CoordinateMapper::new(config.input_crop, config.clip_to_display),
        })
    }

    pub fn anchor_count(&self) -> usize {
        self.decoder.anchor_count()
    }

    pub fn engine(&self) -> &SuppressionEngine {
        &self.engine
    }

    /// Survivors in model space. Panics if the tensor length differs from the
    /// configured anchor count.
    pub fn suppress(&self, tensor: &RawDetectionTensor) -> Vec<ScoredBox> {
        let boxes = self.decoder.decode_all(tensor);
        let candidates = self.filter.apply(&boxes, tensor.confidence());
        self.engine.suppress(candidates)
    }

    pub fn process(&self, tensor: &RawDetectionTensor, geometry: &FrameGeometry) -> Vec<BoxPrediction> {
        let survivors = self.suppress(tensor);
        let boxes = self.mapper.map(&survivors, geometry);
        debug!(
            "event" = "frame.processed",
            survivors = survivors.len(),
            boxes = boxes.len(),
            ready = geometry.is_ready()
        );
        boxes
    }

    /// Runs the detector on `frame` and maps its output into `display`, using
    /// the frame's own size as the source dimensions.
    pub fn detect<D>(&self, detector: &D, frame: &RgbFrame<'_>, display: DisplayRect) -> Result<Vec<BoxPrediction>>
    where
        D: FaceDetector + ?Sized,
    {
        let tensor = detector.infer(frame)?;
        if tensor.len() != self.anchor_count() {
            return Err(Error::detector(
                detector.name(),
                format!("returned {} anchors, pipeline expects {}", tensor.len(), self.anchor_count()),
            ));
        }
        let geometry = FrameGeometry::new(frame.width(), frame.height(), display);
        Ok(self.process(&tensor, &geometry))
    }
}
