use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::infer::decode::DEFAULT_ANCHOR_COUNT;

pub const FACE_DETECTION: &str = "face_detection";

#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalogEntry {
    pub kind: String,
    pub versions: Vec<String>,
}

/// Lists versions under `<base>/face_detection` that carry a `metadata.json`.
pub fn inspect_models_dir(base_dir: impl AsRef<Path>) -> Vec<ModelCatalogEntry> {
    let kind_dir: PathBuf = base_dir.as_ref().join(FACE_DETECTION);
    let mut versions: Vec<String> = Vec::new();
    if let Ok(read) = fs::read_dir(&kind_dir) {
        for item in read.flatten() {
            if !item.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = item.file_name().to_string_lossy().to_string();
            if kind_dir.join(&name).join("metadata.json").exists() {
                versions.push(name);
            }
        }
    }
    versions.sort();
    vec![ModelCatalogEntry { kind: FACE_DETECTION.to_string(), versions }]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub shape: Vec<i64>,
    pub layout: String,
    pub mean: Option<Vec<f32>>,
    pub std: Option<Vec<f32>>,
}

impl InputSpec {
    /// `(width, height)` from an NCHW shape.
    pub fn spatial_size(&self) -> Option<(usize, usize)> {
        match self.shape.as_slice() {
            [_, _, h, w] if *h > 0 && *w > 0 => Some((*w as usize, *h as usize)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputSpec {
    pub scores: String,
    pub boxes: String,
}

fn default_anchor_count() -> usize {
    DEFAULT_ANCHOR_COUNT
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: OutputSpec,
    #[serde(default = "default_anchor_count")]
    pub anchor_count: usize,
    pub license: String,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSelection {
    pub kind: String,
    pub version: String,
    pub path: String,
    pub metadata: ModelMetadata,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SelectedCatalog {
    pub face_detection: Option<ModelSelection>,
}

pub fn read_metadata(path: &Path) -> Option<ModelMetadata> {
    let data = fs::read_to_string(path).ok()?;
    serde_json::from_str::<ModelMetadata>(&data).ok()
}

fn discover(base_dir: &Path) -> Vec<(String, ModelMetadata, String)> {
    let mut out: Vec<(String, ModelMetadata, String)> = Vec::new();
    let kind_dir = base_dir.join(FACE_DETECTION);
    let Ok(read) = fs::read_dir(&kind_dir) else {
        return out;
    };
    for item in read.flatten() {
        if !item.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            continue;
        }
        let version = item.file_name().to_string_lossy().to_string();
        let Some(meta) = read_metadata(&kind_dir.join(&version).join("metadata.json")) else {
            continue;
        };
        if let Some(existing) = ["model.onnx", "model.ort", "model"]
            .into_iter()
            .map(|fname| kind_dir.join(&version).join(fname))
            .find(|p| p.exists())
        {
            out.push((version, meta, existing.to_string_lossy().to_string()));
        }
    }
    out
}

/// Highest accuracy wins; ties go to the newest version name.
fn pick_best(mut items: Vec<(String, ModelMetadata, String)>) -> Option<ModelSelection> {
    if items.is_empty() {
        return None;
    }
    items.sort_by(|a, b| {
        let acc_a = a.1.accuracy.unwrap_or(f64::NEG_INFINITY);
        let acc_b = b.1.accuracy.unwrap_or(f64::NEG_INFINITY);
        acc_b
            .partial_cmp(&acc_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.cmp(&a.0))
    });
    let (version, metadata, path) = items.remove(0);
    Some(ModelSelection { kind: FACE_DETECTION.to_string(), version, path, metadata })
}

pub fn select_best_models(base_dir: impl AsRef<Path>) -> SelectedCatalog {
    SelectedCatalog { face_detection: pick_best(discover(base_dir.as_ref())) }
}
