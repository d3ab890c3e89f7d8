use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-left anchored rectangle in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn mid_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn mid_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Overlapping part of two rects, `None` when they share no area.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        if max_x > x && max_y > y {
            Some(Rect { x, y, width: max_x - x, height: max_y - y })
        } else {
            None
        }
    }
}

/// One face box ready for the rendering layer.
///
/// `id` only distinguishes boxes within a single frame; it is not a track id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxPrediction {
    pub id: Uuid,
    pub rect: Rect,
    pub confidence: f32,
}

impl BoxPrediction {
    pub fn new(rect: Rect, confidence: f32) -> Self {
        Self { id: Uuid::new_v4(), rect, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_clips_to_the_shared_area() {
        let display = Rect { x: 0.0, y: 0.0, width: 100.0, height: 50.0 };
        let straddling = Rect { x: 90.0, y: -10.0, width: 20.0, height: 20.0 };
        assert_eq!(
            straddling.intersection(&display),
            Some(Rect { x: 90.0, y: 0.0, width: 10.0, height: 10.0 })
        );
        let outside = Rect { x: 100.0, y: 0.0, width: 5.0, height: 5.0 };
        assert_eq!(outside.intersection(&display), None);
    }

    #[test]
    fn every_prediction_gets_its_own_id() {
        let rect = Rect { x: 1.0, y: 2.0, width: 3.0, height: 4.0 };
        let a = BoxPrediction::new(rect, 0.9);
        let b = BoxPrediction::new(rect, 0.9);
        assert_ne!(a.id, b.id);
        let value = serde_json::to_value(&a).unwrap();
        assert_eq!(value["rect"]["width"], 3.0);
        assert!(value["id"].is_string());
    }
}
