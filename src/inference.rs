use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::infer::detector::FaceDetector;
use crate::models::{SelectedCatalog, select_best_models};

/// Selected model plus the detector built from it, if any.
pub struct InferenceContext {
    pub selected_models: SelectedCatalog,
    pub detector: Option<Arc<dyn FaceDetector>>,
}

impl InferenceContext {
    /// Picks the best face-detection model under `models_dir`. A detector is
    /// only built when the `onnx` feature is enabled and the session loads.
    pub fn new(models_dir: impl AsRef<Path>) -> Self {
        let selected = select_best_models(models_dir);
        if selected.face_detection.is_none() {
            warn!("event" = "models.missing", "message" = "no face detection model found");
        }
        info!("event" = "models.selected", has_face_detection = selected.face_detection.is_some());

        #[cfg(feature = "onnx")]
        let detector = onnx_detector(&selected);
        #[cfg(not(feature = "onnx"))]
        let detector: Option<Arc<dyn FaceDetector>> = None;

        Self { selected_models: selected, detector }
    }

    /// Context around an already constructed detector.
    pub fn with_detector(detector: Arc<dyn FaceDetector>) -> Self {
        Self { selected_models: SelectedCatalog::default(), detector: Some(detector) }
    }

    pub fn without_detector() -> Self {
        Self { selected_models: SelectedCatalog::default(), detector: None }
    }

    pub fn detector_name(&self) -> Option<&'static str> {
        self.detector.as_ref().map(|d| d.name())
    }
}

#[cfg(feature = "onnx")]
fn onnx_detector(selected: &SelectedCatalog) -> Option<Arc<dyn FaceDetector>> {
    use crate::infer::onnx::OnnxDetector;
    use ort::session::Session;

    let sel = selected.face_detection.as_ref()?;
    let _ = ort::init().with_name("facebox").commit();
    let session = Session::builder()
        .ok()?
        .with_intra_threads(1)
        .ok()?
        .commit_from_file(&sel.path);
    let session = match session {
        Ok(session) => {
            info!("event" = "onnx.session.ok", "model" = %sel.version);
            session
        }
        Err(err) => {
            warn!("event" = "onnx.session.fail", "model" = %sel.version, %err);
            return None;
        }
    };

    let meta = &sel.metadata;
    let (mut in_w, mut in_h) = (128usize, 128usize);
    let mut det_input = None;
    if let Some(spec) = meta.inputs.first() {
        if let Some((w, h)) = spec.spatial_size() {
            in_w = w;
            in_h = h;
        }
        det_input = Some(spec);
    }
    let mut det = OnnxDetector::new(session, in_w, in_h, meta.anchor_count);
    if let Some(spec) = det_input {
        det.input_name = spec.name.clone();
        if let Some(m) = spec.mean.as_deref().and_then(|m| <[f32; 3]>::try_from(m).ok()) {
            det.mean = m;
        }
        if let Some(s) = spec.std.as_deref().and_then(|s| <[f32; 3]>::try_from(s).ok()) {
            det.std = s;
        }
    }
    det.scores_output = meta.outputs.scores.clone();
    det.boxes_output = meta.outputs.boxes.clone();
    info!("event" = "detector.ready", width = in_w, height = in_h, anchors = meta.anchor_count);
    Some(Arc::new(det))
}
