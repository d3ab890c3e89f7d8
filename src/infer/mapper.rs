//! Model space → source image pixels → aspect-fill display coordinates.

use serde::{Deserialize, Serialize};

use super::prediction::{BoxPrediction, Rect};
use super::{DecodedBox, ScoredBox};

/// The preview rectangle boxes are drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayRect {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(width: f32, height: f32) -> Self {
        Self { x: 0.0, y: 0.0, width, height }
    }

    /// Checks the fields a client could have sent malformed.
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Panics on negative or non-finite sizes; zero area is legal and means
    /// the preview surface is not ready yet.
    pub fn has_area(&self) -> bool {
        assert!(self.is_well_formed(), "malformed display rect {self:?}");
        self.width > 0.0 && self.height > 0.0
    }

    fn as_rect(&self) -> Rect {
        Rect { x: self.x, y: self.y, width: self.width, height: self.height }
    }
}

/// Dimensions that may change between frames, passed explicitly per call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameGeometry {
    pub image_width: u32,
    pub image_height: u32,
    pub display: DisplayRect,
}

impl FrameGeometry {
    pub fn new(image_width: u32, image_height: u32, display: DisplayRect) -> Self {
        Self { image_width, image_height, display }
    }

    pub fn is_ready(&self) -> bool {
        self.image_width > 0 && self.image_height > 0 && self.display.has_area()
    }
}

/// Which part of the source frame the detector actually saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputCrop {
    /// Normalized coordinates span the whole frame.
    #[default]
    Full,
    /// Normalized coordinates span the centered `min(w, h)` square.
    CenterSquare,
}

/// Scale and crop offsets of an aspect-fill from a source size into a display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectFill {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl AspectFill {
    /// `None` when either side is empty.
    pub fn between(source_width: f32, source_height: f32, display: &DisplayRect) -> Option<Self> {
        if !(source_width > 0.0 && source_height > 0.0) || !display.has_area() {
            return None;
        }
        let scale = (display.width / source_width).max(display.height / source_height);
        Some(Self {
            scale,
            offset_x: (source_width * scale - display.width) / 2.0,
            offset_y: (source_height * scale - display.height) / 2.0,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    crop: InputCrop,
    clip: bool,
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self { crop: InputCrop::Full, clip: true }
    }
}

impl CoordinateMapper {
    pub fn new(crop: InputCrop, clip: bool) -> Self {
        Self { crop, clip }
    }

    /// Maps survivors into display space, keeping their order. Returns nothing
    /// until both the source frame and the display have non-zero area.
    pub fn map(&self, boxes: &[ScoredBox], geometry: &FrameGeometry) -> Vec<BoxPrediction> {
        let (w, h) = (geometry.image_width as f32, geometry.image_height as f32);
        let Some(fill) = AspectFill::between(w, h, &geometry.display) else {
            return Vec::new();
        };
        boxes
            .iter()
            .filter_map(|b| self.map_box(b, w, h, &fill, &geometry.display))
            .collect()
    }

    fn map_box(&self, b: &ScoredBox, w: f32, h: f32, fill: &AspectFill, display: &DisplayRect) -> Option<BoxPrediction> {
        let img = self.to_image(&b.bounds, w, h);
        let width = img.width * fill.scale;
        let height = img.height * fill.scale;
        let rect = Rect {
            x: display.x + img.center_x * fill.scale - fill.offset_x - width / 2.0,
            y: display.y + img.center_y * fill.scale - fill.offset_y - height / 2.0,
            width,
            height,
        };
        let rect = if self.clip { rect.intersection(&display.as_rect())? } else { rect };
        Some(BoxPrediction::new(rect, b.confidence))
    }

    /// Model coordinates to source pixels.
    fn to_image(&self, b: &DecodedBox, w: f32, h: f32) -> DecodedBox {
        match self.crop {
            InputCrop::Full => DecodedBox::new(b.center_x * w, b.center_y * h, b.width * w, b.height * h),
            InputCrop::CenterSquare => {
                let side = w.min(h);
                let ox = (w - side) / 2.0;
                let oy = (h - side) / 2.0;
                DecodedBox::new(b.center_x * side + ox, b.center_y * side + oy, b.width * side, b.height * side)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn scored(cx: f32, cy: f32, w: f32, h: f32) -> ScoredBox {
        ScoredBox { anchor: 0, bounds: DecodedBox::new(cx, cy, w, h), confidence: 0.9 }
    }

    #[test]
    fn landscape_sensor_into_portrait_display() {
        let display = DisplayRect::from_size(1080.0, 1920.0);
        let fill = AspectFill::between(1920.0, 1080.0, &display).unwrap();
        assert!(close(fill.scale, 1920.0 / 1080.0));
        assert!(close(fill.offset_x, (1920.0 * fill.scale - 1080.0) / 2.0));
        assert!(close(fill.offset_y, 0.0));

        let geometry = FrameGeometry::new(1920, 1080, display);
        let out = CoordinateMapper::new(InputCrop::Full, true).map(&[scored(0.5, 0.5, 0.1, 0.2)], &geometry);
        assert_eq!(out.len(), 1);
        let r = out[0].rect;
        assert!(close(r.mid_x(), 540.0));
        assert!(close(r.mid_y(), 960.0));
        assert!(r.x >= 0.0 && r.max_x() <= 1080.0 && r.y >= 0.0 && r.max_y() <= 1920.0);
        // 192x216 px in the source keeps its aspect ratio on screen.
        assert!(close(r.width / r.height, 192.0 / 216.0));
        assert!(close(r.width, 192.0 * fill.scale));
    }

    #[test]
    fn matching_aspect_is_a_pure_scale() {
        let geometry = FrameGeometry::new(1080, 1920, DisplayRect::from_size(540.0, 960.0));
        let out = CoordinateMapper::new(InputCrop::Full, false).map(&[scored(0.25, 0.25, 0.5, 0.5)], &geometry);
        let r = out[0].rect;
        assert!(close(r.x, 0.0) && close(r.y, 0.0));
        assert!(close(r.width, 270.0) && close(r.height, 480.0));
    }

    #[test]
    fn display_origin_offsets_boxes() {
        let geometry = FrameGeometry::new(100, 100, DisplayRect::new(10.0, -20.0, 100.0, 100.0));
        let out = CoordinateMapper::new(InputCrop::Full, false).map(&[scored(0.5, 0.5, 0.2, 0.2)], &geometry);
        let r = out[0].rect;
        assert!(close(r.x, 50.0) && close(r.y, 20.0));
    }

    #[test]
    fn center_square_crop_uses_the_short_side() {
        // 200x100 frame: model saw x in [50, 150].
        let geometry = FrameGeometry::new(200, 100, DisplayRect::from_size(200.0, 100.0));
        let out = CoordinateMapper::new(InputCrop::CenterSquare, false).map(&[scored(0.0, 0.5, 0.2, 0.2)], &geometry);
        let r = out[0].rect;
        assert!(close(r.mid_x(), 50.0));
        assert!(close(r.mid_y(), 50.0));
        assert!(close(r.width, 20.0));
    }

    #[test]
    fn boxes_in_the_cropped_margin_are_clipped_away() {
        let geometry = FrameGeometry::new(1920, 1080, DisplayRect::from_size(1080.0, 1920.0));
        let mapper = CoordinateMapper::new(InputCrop::Full, true);
        assert!(mapper.map(&[scored(0.05, 0.5, 0.05, 0.05)], &geometry).is_empty());

        let straddling = mapper.map(&[scored(0.34, 0.5, 0.1, 0.1)], &geometry);
        assert_eq!(straddling.len(), 1);
        assert!(close(straddling[0].rect.x, 0.0));

        let by_default = CoordinateMapper::default().map(&[scored(0.05, 0.5, 0.05, 0.05)], &geometry);
        assert!(by_default.is_empty());

        let unclipped = CoordinateMapper::new(InputCrop::Full, false).map(&[scored(0.05, 0.5, 0.05, 0.05)], &geometry);
        assert!(unclipped[0].rect.max_x() < 0.0);
    }

    #[test]
    fn degenerate_geometry_yields_no_boxes() {
        let mapper = CoordinateMapper::default();
        let b = [scored(0.5, 0.5, 0.1, 0.1)];
        assert!(mapper.map(&b, &FrameGeometry::new(0, 1080, DisplayRect::from_size(100.0, 100.0))).is_empty());
        assert!(mapper.map(&b, &FrameGeometry::new(1920, 0, DisplayRect::from_size(100.0, 100.0))).is_empty());
        assert!(mapper.map(&b, &FrameGeometry::new(1920, 1080, DisplayRect::default())).is_empty());
        assert!(mapper.map(&b, &FrameGeometry::new(1920, 1080, DisplayRect::from_size(100.0, 0.0))).is_empty());
    }

    #[test]
    #[should_panic(expected = "malformed display rect")]
    fn negative_display_size_panics() {
        let geometry = FrameGeometry::new(1920, 1080, DisplayRect::from_size(-1.0, 100.0));
        CoordinateMapper::default().map(&[scored(0.5, 0.5, 0.1, 0.1)], &geometry);
    }

    #[test]
    fn order_and_confidence_are_preserved() {
        let geometry = FrameGeometry::new(100, 100, DisplayRect::from_size(100.0, 100.0));
        let boxes = [
            ScoredBox { anchor: 3, bounds: DecodedBox::new(0.2, 0.2, 0.1, 0.1), confidence: 0.95 },
            ScoredBox { anchor: 0, bounds: DecodedBox::new(0.7, 0.7, 0.1, 0.1), confidence: 0.9 },
        ];
        let out = CoordinateMapper::default().map(&boxes, &geometry);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].confidence, 0.95);
        assert_eq!(out[1].confidence, 0.9);
        assert_ne!(out[0].id, out[1].id);
    }
}
