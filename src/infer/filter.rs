use super::{DecodedBox, ScoredBox};

/// Drops boxes whose confidence does not exceed the threshold or lies outside `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct ScoreFilter {
    threshold: f32,
}

impl ScoreFilter {
    pub fn new(threshold: f32) -> Self {
        assert!(threshold.is_finite(), "confidence threshold must be finite");
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Pairs `boxes[i]` with `confidence[i]`, keeping anchor order. An empty
    /// result means no face in the frame.
    pub fn apply(&self, boxes: &[DecodedBox], confidence: &[f32]) -> Vec<ScoredBox> {
        assert_eq!(boxes.len(), confidence.len(), "boxes and confidences differ in length");
        boxes
            .iter()
            .zip(confidence)
            .enumerate()
            .filter(|(_, (_, score))| (0.0..=1.0).contains(*score) && **score > self.threshold)
            .map(|(anchor, (bounds, score))| ScoredBox { anchor, bounds: *bounds, confidence: *score })
            .collect()
    }
}
