#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! ONNX Runtime detector for Waymo vehicles.
//!
//! Loads a fine-tuned YOLO model, downloading it on first run, and serves
//! [`InferenceEngine`] by letterboxing each snapshot, running the session on
//! a blocking thread, and decoding the output back to frame coordinates.

pub mod yolo;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use ndarray::ArrayD;
use ort::{GraphOptimizationLevel, Session};
use waymo_counter_scan::{InferenceEngine, InferenceError};
use waymo_counter_scan_models::Detection;

/// Square input size the model was exported with.
const INPUT_SIZE: u32 = 640;

/// Overlap threshold for non-maximum suppression.
const IOU_THRESHOLD: f32 = 0.45;

/// Timeout for the one-time model download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors while acquiring or loading the model.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// Model download failed.
    #[error("model download failed: {0}")]
    Download(#[from] reqwest::Error),

    /// I/O error reading or writing the model file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ONNX Runtime could not load the model.
    #[error("failed to load model: {0}")]
    Session(#[from] ort::Error),

    /// The model file does not look like a usable detector.
    #[error("unusable model: {0}")]
    Model(String),
}

/// YOLO detector backed by an ONNX Runtime session.
pub struct OrtWaymoDetector {
    session: Arc<Session>,
    names: Vec<String>,
    input_name: String,
    output_name: String,
}

impl OrtWaymoDetector {
    /// Loads the model at `model_path`, downloading it from `model_url`
    /// first when the file is missing.
    ///
    /// Class names come from the model metadata; `fallback_class` stands in
    /// when the metadata carries none.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError`] if the download, file I/O, or session
    /// construction fails.
    pub async fn load(
        model_path: &Path,
        model_url: &str,
        fallback_class: &str,
    ) -> Result<Self, DetectorError> {
        ensure_model(model_path, model_url).await?;

        log::info!("Loading detection model from {}", model_path.display());
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| DetectorError::Model("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| DetectorError::Model("model declares no outputs".to_string()))?;

        let names = match session.metadata().and_then(|m| m.custom("names")) {
            Ok(Some(raw)) => yolo::parse_class_names(&raw),
            _ => Vec::new(),
        };
        let names = if names.is_empty() {
            log::warn!("Model metadata has no class names; assuming [{fallback_class}]");
            vec![fallback_class.to_string()]
        } else {
            names
        };
        log::info!("Model ready with classes {names:?}");

        Ok(Self {
            session: Arc::new(session),
            names,
            input_name,
            output_name,
        })
    }

    /// Class labels the model can emit, indexed by class id.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.names
    }
}

async fn ensure_model(path: &Path, url: &str) -> Result<(), DetectorError> {
    if path.exists() {
        log::debug!("Model already present at {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    log::info!("Model missing; downloading from {url}");
    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    std::fs::write(path, &bytes)?;
    log::info!("Saved model to {} ({} bytes)", path.display(), bytes.len());

    Ok(())
}

#[async_trait]
impl InferenceEngine for OrtWaymoDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, InferenceError> {
        let (tensor, ratio) = yolo::image_to_tensor(image, INPUT_SIZE);
        let (width, height) = (image.width(), image.height());

        let session = Arc::clone(&self.session);
        let input_name = self.input_name.clone();
        let output_name = self.output_name.clone();
        let output: ArrayD<f32> = tokio::task::spawn_blocking(move || {
            let outputs = session.run(ort::inputs![input_name.as_str() => tensor.view()]?)?;
            let predictions = outputs[output_name.as_str()].try_extract_tensor::<f32>()?;
            Ok::<_, ort::Error>(predictions.to_owned())
        })
        .await
        .map_err(|e| InferenceError::Execution(format!("inference task failed: {e}")))?
        .map_err(|e| InferenceError::Execution(e.to_string()))?;

        let mut detections = yolo::decode_predictions(&output, &self.names, ratio, width, height)?;
        yolo::non_max_suppression(&mut detections, IOU_THRESHOLD);

        Ok(detections)
    }
}
