//! Box decoding and suppression.
//!
//! Raw anchor tensors flow through [`decode`], [`filter`], [`suppression`] and
//! [`mapper`]; [`pipeline::FramePipeline`] chains them for one frame.

use serde::{Deserialize, Serialize};

pub mod decode;
pub mod detector;
pub mod filter;
pub mod mapper;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod prediction;
pub mod suppression;

/// A box in model space, described by its center and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl DecodedBox {
    pub fn new(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self { center_x, center_y, width, height }
    }

    /// Zero or negative extent, or any non-finite component.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.center_x.is_finite()
            && self.center_y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite();
        !(finite && self.width > 0.0 && self.height > 0.0)
    }

    pub fn area(&self) -> f32 {
        if self.is_degenerate() { 0.0 } else { self.width * self.height }
    }

    pub fn corners(&self) -> Corners {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        Corners {
            x1: self.center_x - half_w,
            y1: self.center_y - half_h,
            x2: self.center_x + half_w,
            y2: self.center_y + half_h,
        }
    }
}

/// Axis-aligned `(xmin, ymin, xmax, ymax)` form of a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// A decoded box paired with its confidence and the anchor it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    pub anchor: usize,
    pub bounds: DecodedBox,
    pub confidence: f32,
}

/// Overlap ratio in `[0, 1]`. Zero whenever either box has no area.
pub fn intersection_over_union(a: &DecodedBox, b: &DecodedBox) -> f32 {
    let (area_a, area_b) = (a.area(), b.area());
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }
    let (ca, cb) = (a.corners(), b.corners());
    let x1 = ca.x1.max(cb.x1);
    let y1 = ca.y1.max(cb.y1);
    let x2 = ca.x2.min(cb.x2);
    let y2 = ca.y2.min(cb.y2);
    let w = (x2 - x1).max(0.0);
    let h = (y2 - y1).max(0.0);
    let inter = w * h;
    if inter <= 0.0 {
        return 0.0;
    }
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { (inter / union).min(1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn identical_boxes_overlap_fully() {
        let a = DecodedBox::new(0.5, 0.5, 0.2, 0.2);
        assert!(close(intersection_over_union(&a, &a), 1.0));
    }

    #[test]
    fn disjoint_boxes_do_not_overlap() {
        let a = DecodedBox::new(0.5, 0.5, 0.2, 0.2);
        let b = DecodedBox::new(0.1, 0.1, 0.1, 0.1);
        assert_eq!(intersection_over_union(&a, &b), 0.0);
    }

    #[test]
    fn touching_edges_have_no_overlap() {
        let a = DecodedBox::new(0.25, 0.5, 0.5, 0.5);
        let b = DecodedBox::new(0.75, 0.5, 0.5, 0.5);
        assert_eq!(intersection_over_union(&a, &b), 0.0);
    }

    #[test]
    fn shifted_box_overlap_matches_hand_computation() {
        // Intersection 0.18 x 0.2 = 0.036, union 0.04 + 0.04 - 0.036 = 0.044.
        let a = DecodedBox::new(0.5, 0.5, 0.2, 0.2);
        let b = DecodedBox::new(0.52, 0.5, 0.2, 0.2);
        assert!(close(intersection_over_union(&a, &b), 0.036 / 0.044));
        assert!(close(intersection_over_union(&b, &a), 0.036 / 0.044));
    }

    #[test]
    fn degenerate_boxes_never_overlap() {
        let flat = DecodedBox::new(0.5, 0.5, 0.2, 0.0);
        let thin = DecodedBox::new(0.5, 0.5, 0.0, 0.2);
        let nan = DecodedBox::new(f32::NAN, 0.5, 0.2, 0.2);
        let full = DecodedBox::new(0.5, 0.5, 1.0, 1.0);
        for d in [flat, thin, nan] {
            assert!(d.is_degenerate());
            assert_eq!(d.area(), 0.0);
            assert_eq!(intersection_over_union(&d, &full), 0.0);
            assert_eq!(intersection_over_union(&full, &d), 0.0);
            assert_eq!(intersection_over_union(&d, &d), 0.0);
        }
    }

    #[test]
    fn corners_span_the_box() {
        let c = DecodedBox::new(10.0, 20.0, 4.0, 6.0).corners();
        assert_eq!(c, Corners { x1: 8.0, y1: 17.0, x2: 12.0, y2: 23.0 });
    }
}
