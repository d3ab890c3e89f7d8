use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infer::decode::RawDetectionTensor;
use crate::infer::mapper::{DisplayRect, FrameGeometry};
use crate::infer::prediction::BoxPrediction;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Hello {
        #[serde(rename = "sessionId")]
        session_id: String,
        token: String,
        client: ClientInfo,
    },
    Frame(TensorFrame),
    Image(ImageFrame),
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub sdk_version: String,
    pub platform: String,
}

/// One frame of raw detector output plus the geometry to map it into.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorFrame {
    #[serde(default)]
    pub ts: u64,
    pub geometry: FrameGeometry,
    pub tensor: TensorPayload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TensorPayload {
    Planar {
        x: Vec<f32>,
        y: Vec<f32>,
        width: Vec<f32>,
        height: Vec<f32>,
        confidence: Vec<f32>,
    },
    Interleaved {
        boxes: Vec<f32>,
        confidence: Vec<f32>,
    },
}

impl TensorPayload {
    /// Checks every sequence length against `anchor_count` before building.
    pub fn into_tensor(self, anchor_count: usize) -> Result<RawDetectionTensor, FrameError> {
        match self {
            TensorPayload::Planar { x, y, width, height, confidence } => {
                for (field, len) in [
                    ("x", x.len()),
                    ("y", y.len()),
                    ("width", width.len()),
                    ("height", height.len()),
                    ("confidence", confidence.len()),
                ] {
                    if len != anchor_count {
                        return Err(FrameError::AnchorCount { field, expected: anchor_count, found: len });
                    }
                }
                Ok(RawDetectionTensor::new(x, y, width, height, confidence))
            }
            TensorPayload::Interleaved { boxes, confidence } => {
                if confidence.len() != anchor_count {
                    return Err(FrameError::AnchorCount {
                        field: "confidence",
                        expected: anchor_count,
                        found: confidence.len(),
                    });
                }
                if boxes.len() != anchor_count * 4 {
                    return Err(FrameError::AnchorCount {
                        field: "boxes",
                        expected: anchor_count * 4,
                        found: boxes.len(),
                    });
                }
                Ok(RawDetectionTensor::from_interleaved(&boxes, confidence))
            }
        }
    }
}

/// An encoded camera image for the server-side detector.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFrame {
    pub ts: u64,
    pub format: String,
    pub data: String,
    pub display: DisplayRect,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage<'a> {
    #[serde(rename_all = "camelCase")]
    HelloAck {
        anchor_count: usize,
        mode: &'a str,
        max_fps: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        detector: Option<&'a str>,
    },
    Error {
        code: &'a str,
        message: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Throttle {
        reason: &'a str,
        max_fps: u32,
    },
    #[serde(rename_all = "camelCase")]
    FrameAck {
        ts: u64,
        boxes: Vec<BoxPrediction>,
        compute_ms: f32,
    },
}

/// Why a client frame was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("binary frame too small: {0} bytes")]
    TooSmall(usize),
    #[error("bad magic")]
    BadMagic,
    #[error("{field} holds {found} values, expected {expected}")]
    AnchorCount {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("display rect must be finite with non-negative size")]
    Geometry,
}

impl FrameError {
    pub fn code(&self) -> &'static str {
        match self {
            FrameError::TooSmall(_) | FrameError::BadMagic => "invalid-frame",
            FrameError::AnchorCount { .. } => "anchor-count",
            FrameError::Geometry => "bad-geometry",
        }
    }
}

/// Rejects geometry the mapper would treat as a contract violation.
pub fn check_geometry(geometry: &FrameGeometry) -> Result<(), FrameError> {
    if geometry.display.is_well_formed() { Ok(()) } else { Err(FrameError::Geometry) }
}

pub const BINARY_MAGIC: &[u8; 4] = b"FBT1";
pub const BINARY_HEADER_LEN: usize = 40;

/// A decoded binary tensor frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryFrame {
    pub ts: u64,
    pub geometry: FrameGeometry,
    pub tensor: RawDetectionTensor,
}

/// Layout, little endian: magic, u32 anchors, u64 ts, u32 image width,
/// u32 image height, f32 display x/y/width/height, then `4N` interleaved
/// box values and `N` confidences.
pub fn decode_binary_frame(bytes: &[u8], anchor_count: usize) -> Result<BinaryFrame, FrameError> {
    if bytes.len() < BINARY_HEADER_LEN {
        return Err(FrameError::TooSmall(bytes.len()));
    }
    if &bytes[0..4] != BINARY_MAGIC {
        return Err(FrameError::BadMagic);
    }
    let anchors = read_u32(bytes, 4) as usize;
    if anchors != anchor_count {
        return Err(FrameError::AnchorCount { field: "header", expected: anchor_count, found: anchors });
    }
    let ts = read_u64(bytes, 8);
    let display = DisplayRect::new(read_f32(bytes, 24), read_f32(bytes, 28), read_f32(bytes, 32), read_f32(bytes, 36));
    let geometry = FrameGeometry::new(read_u32(bytes, 16), read_u32(bytes, 20), display);
    check_geometry(&geometry)?;

    let payload = &bytes[BINARY_HEADER_LEN..];
    let expected = anchors * 5 * 4;
    if payload.len() != expected {
        return Err(FrameError::AnchorCount { field: "payload bytes", expected, found: payload.len() });
    }
    let values: Vec<f32> = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let (boxes, confidence) = values.split_at(anchors * 4);
    Ok(BinaryFrame { ts, geometry, tensor: RawDetectionTensor::from_interleaved(boxes, confidence.to_vec()) })
}

pub fn encode_binary_frame(ts: u64, geometry: &FrameGeometry, tensor: &RawDetectionTensor) -> Vec<u8> {
    let mut out = Vec::with_capacity(BINARY_HEADER_LEN + tensor.len() * 20);
    out.extend_from_slice(BINARY_MAGIC);
    out.extend_from_slice(&(tensor.len() as u32).to_le_bytes());
    out.extend_from_slice(&ts.to_le_bytes());
    out.extend_from_slice(&geometry.image_width.to_le_bytes());
    out.extend_from_slice(&geometry.image_height.to_le_bytes());
    let d = geometry.display;
    for v in [d.x, d.y, d.width, d.height] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for v in tensor.interleaved_boxes().iter().chain(tensor.confidence()) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(arr)
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
