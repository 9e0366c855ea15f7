#![allow(clippy::module_name_repetitions)]
//! Runtime configuration loaded from environment variables.
//!
//! `SUPABASE_URL` and `SUPABASE_KEY` are required. Everything else has a
//! default, so a bare environment with just the store credentials runs a
//! full scan.

use std::path::PathBuf;
use std::time::Duration;

use waymo_counter_scan::{
    DEFAULT_CAMERA_TIMEOUT, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_WORKERS,
    DEFAULT_TARGET_CLASS, ScanConfig,
};

/// Release asset downloaded when no local model file exists.
const DEFAULT_MODEL_URL: &str =
    "https://github.com/USER/waymo-counter/releases/download/v1.0/waymo.onnx";
/// Local model location, relative to the working directory.
const DEFAULT_MODEL_PATH: &str = "models/waymo.onnx";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid {var} value {value:?}")]
    InvalidVar {
        var: &'static str,
        value: String,
    },
}

/// Everything the binary reads from the environment, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_key: String,
    pub confidence_threshold: f32,
    pub max_workers: usize,
    pub camera_timeout: Duration,
    pub model_url: String,
    pub model_path: PathBuf,
    /// GeoJSON polygon file overriding the built-in service area.
    pub service_area_path: Option<String>,
    pub target_class: String,
    /// Annotate frames with detections and upload them to storage.
    pub upload_images: bool,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a set
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let supabase_url = lookup("SUPABASE_URL")
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingVar("SUPABASE_URL"))?;
        let supabase_key = lookup("SUPABASE_KEY")
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingVar("SUPABASE_KEY"))?;

        let confidence_threshold =
            parse_or(&lookup, "CONFIDENCE_THRESHOLD", DEFAULT_CONFIDENCE_THRESHOLD)?;
        let max_workers = parse_or(&lookup, "MAX_WORKERS", DEFAULT_MAX_WORKERS)?;
        if max_workers == 0 {
            return Err(ConfigError::InvalidVar {
                var: "MAX_WORKERS",
                value: "0".to_string(),
            });
        }
        let timeout_secs = parse_or(
            &lookup,
            "CAMERA_TIMEOUT_SECS",
            DEFAULT_CAMERA_TIMEOUT.as_secs(),
        )?;

        let upload_images = match lookup("UPLOAD_IMAGES") {
            None => false,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "" | "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        var: "UPLOAD_IMAGES",
                        value: raw,
                    });
                }
            },
        };

        Ok(Self {
            supabase_url,
            supabase_key,
            confidence_threshold,
            max_workers,
            camera_timeout: Duration::from_secs(timeout_secs),
            model_url: lookup("MODEL_URL").unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
            model_path: lookup("MODEL_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH), PathBuf::from),
            service_area_path: lookup("SERVICE_AREA_PATH").filter(|value| !value.is_empty()),
            target_class: lookup("TARGET_CLASS")
                .unwrap_or_else(|| DEFAULT_TARGET_CLASS.to_string()),
            upload_images,
        })
    }

    /// The per-cycle tunables, in the shape the scan core expects.
    #[must_use]
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            confidence_threshold: self.confidence_threshold,
            max_workers: self.max_workers,
            camera_timeout: self.camera_timeout,
            target_class: self.target_class.clone(),
            annotate_images: self.upload_images,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value: raw }),
    }
}
