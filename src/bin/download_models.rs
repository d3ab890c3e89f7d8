use std::fs;
use std::path::PathBuf;

use reqwest::blocking::get;
use sha2::{Digest, Sha256};

use facebox::models::{FACE_DETECTION, read_metadata};

type BoxError = Box<dyn std::error::Error>;

fn main() -> Result<(), BoxError> {
    let base = std::env::var_os("FACEBOX_MODELS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models"));
    let kind_dir = base.join(FACE_DETECTION);
    println!("models directory: {}", kind_dir.display());
    if !kind_dir.exists() {
        fs::create_dir_all(&kind_dir)?;
        println!("created: {}", kind_dir.display());
    }

    let mut versions: Vec<PathBuf> = fs::read_dir(&kind_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    versions.sort();

    for dir in versions {
        let meta_path = dir.join("metadata.json");
        let Some(meta) = read_metadata(&meta_path) else {
            println!("metadata missing or unreadable: {}", meta_path.display());
            continue;
        };
        if meta.url.is_empty() || meta.sha256.is_empty() || meta.sha256 == "<to-fill>" {
            println!("skip: provide valid url and sha256 in {}", meta_path.display());
            continue;
        }
        let model_path = dir.join("model.onnx");
        if model_path.exists() {
            println!("model exists: {}", model_path.display());
            continue;
        }
        println!("downloading {} -> {}", meta.url, model_path.display());
        let buf = get(&meta.url)?.error_for_status()?.bytes()?.to_vec();
        let digest = hex::encode(Sha256::digest(&buf));
        if digest != meta.sha256 {
            return Err(format!("checksum mismatch for {}: {} != {}", meta.version, digest, meta.sha256).into());
        }
        fs::write(&model_path, &buf)?;
        println!("saved {} ({} bytes)", model_path.display(), buf.len());
    }
    Ok(())
}
