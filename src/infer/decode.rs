use ndarray::ArrayView2;

use super::DecodedBox;

/// Number of anchors emitted by the mobile face detector.
pub const DEFAULT_ANCHOR_COUNT: usize = 896;

/// Five parallel per-anchor sequences produced by the detector for one frame.
///
/// Index `i` in every sequence refers to the same anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetectionTensor {
    x: Vec<f32>,
    y: Vec<f32>,
    width: Vec<f32>,
    height: Vec<f32>,
    confidence: Vec<f32>,
}

impl RawDetectionTensor {
    /// Panics if the sequences differ in length.
    pub fn new(x: Vec<f32>, y: Vec<f32>, width: Vec<f32>, height: Vec<f32>, confidence: Vec<f32>) -> Self {
        let n = confidence.len();
        assert!(
            x.len() == n && y.len() == n && width.len() == n && height.len() == n,
            "tensor sequences differ in length: x={} y={} width={} height={} confidence={}",
            x.len(),
            y.len(),
            width.len(),
            height.len(),
            n
        );
        Self { x, y, width, height, confidence }
    }

    /// De-interleaves `x0, y0, w0, h0, x1, ...` into planar sequences.
    pub fn from_interleaved(boxes: &[f32], confidence: Vec<f32>) -> Self {
        let n = confidence.len();
        assert!(boxes.len() == n * 4, "{} box values do not form {n} anchors of 4", boxes.len());
        let rows = match ArrayView2::from_shape((n, 4), boxes) {
            Ok(rows) => rows,
            Err(err) => panic!("box values do not form an {n}x4 matrix: {err}"),
        };
        Self::from_box_array(rows, confidence)
    }

    /// Builds from an `(N, 4)` matrix whose columns are x, y, width, height.
    pub fn from_box_array(boxes: ArrayView2<'_, f32>, confidence: Vec<f32>) -> Self {
        assert_eq!(boxes.ncols(), 4, "box matrix must have 4 columns");
        assert_eq!(boxes.nrows(), confidence.len(), "box rows and confidences differ in length");
        Self::new(
            boxes.column(0).to_vec(),
            boxes.column(1).to_vec(),
            boxes.column(2).to_vec(),
            boxes.column(3).to_vec(),
            confidence,
        )
    }

    pub fn len(&self) -> usize {
        self.confidence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confidence.is_empty()
    }

    pub fn confidence(&self) -> &[f32] {
        &self.confidence
    }

    /// Boxes back in `x, y, w, h` interleaved order.
    pub fn interleaved_boxes(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * 4);
        for i in 0..self.len() {
            out.extend_from_slice(&[self.x[i], self.y[i], self.width[i], self.height[i]]);
        }
        out
    }
}

/// Reads one anchor's geometry out of a [`RawDetectionTensor`].
#[derive(Debug, Clone, Copy)]
pub struct AnchorDecoder {
    anchor_count: usize,
}

impl AnchorDecoder {
    pub fn new(anchor_count: usize) -> Self {
        assert!(anchor_count > 0, "anchor count must be positive");
        Self { anchor_count }
    }

    pub fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    /// Panics when `index` is outside `0..anchor_count` or the tensor is short.
    pub fn decode(&self, tensor: &RawDetectionTensor, index: usize) -> DecodedBox {
        assert!(
            index < self.anchor_count && index < tensor.len(),
            "anchor index {index} out of range (anchor count {}, tensor length {})",
            self.anchor_count,
            tensor.len()
        );
        DecodedBox::new(tensor.x[index], tensor.y[index], tensor.width[index], tensor.height[index])
    }

    /// Decodes every anchor. The tensor must hold exactly `anchor_count` entries.
    pub fn decode_all(&self, tensor: &RawDetectionTensor) -> Vec<DecodedBox> {
        assert_eq!(
            tensor.len(),
            self.anchor_count,
            "tensor holds {} anchors, decoder expects {}",
            tensor.len(),
            self.anchor_count
        );
        (0..self.anchor_count).map(|i| self.decode(tensor, i)).collect()
    }
}
