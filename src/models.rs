//! Segmentation model location and preprocessing metadata
//!
//! A model is either a single `.onnx` file or a directory holding
//! `model.onnx` (or `onnx/model.onnx`). An optional
//! `preprocessor_config.json` next to the model overrides the input size
//! and normalization.

use crate::error::{PackshotError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default square model input edge (ISNet general)
pub const DEFAULT_TARGET_SIZE: u32 = 1024;

/// Name of the optional preprocessing sidecar
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

/// Input geometry and normalization of a segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square input edge in pixels
    pub target_size: u32,
    /// Per-channel mean in 0..1 units
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in 0..1 units
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }
}

impl PreprocessingConfig {
    /// Parse a `HuggingFace`-style preprocessor config
    ///
    /// `image_mean` / `image_std` are given in 0-255 units and converted to 0-1.
    ///
    /// # Errors
    /// - `Model` for missing or malformed fields
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let size = value
            .get("size")
            .ok_or_else(|| PackshotError::model("Missing size in preprocessor config"))?;
        let height = size.get("height").and_then(serde_json::Value::as_u64);
        let width = size.get("width").and_then(serde_json::Value::as_u64);
        let target_size = match (height, width) {
            (Some(h), Some(w)) if h == w => u32::try_from(h)
                .map_err(|_| PackshotError::model("Input size too large for u32"))?,
            (Some(h), Some(w)) => {
                return Err(PackshotError::model(format!(
                    "Only square model inputs are supported, got {w}x{h}"
                )))
            },
            _ => return Err(PackshotError::model("Missing height/width in size config")),
        };
        if target_size == 0 {
            return Err(PackshotError::model("Model input size must be positive"));
        }

        Ok(Self {
            target_size,
            normalization_mean: Self::parse_channels(value, "image_mean")?,
            normalization_std: Self::parse_channels(value, "image_std")?,
        })
    }

    fn parse_channels(value: &serde_json::Value, key: &str) -> Result<[f32; 3]> {
        let values = value
            .get(key)
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| PackshotError::model(format!("Missing {key} in preprocessor config")))?;

        let mut channels = [0.0_f32; 3];
        for (i, channel) in channels.iter_mut().enumerate() {
            let raw = values
                .get(i)
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| PackshotError::model(format!("Invalid {key}[{i}] value")))?;
            *channel = (raw / 255.0) as f32;
        }

        if key == "image_std" && channels.iter().any(|s| *s <= 0.0) {
            return Err(PackshotError::model("image_std values must be positive"));
        }

        Ok(channels)
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: u64,
    /// NCHW
    pub input_shape: (usize, usize, usize, usize),
}

/// Resolved model file and its preprocessing
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model from a file or directory path
    ///
    /// # Errors
    /// - `Model` when the path does not exist or holds no `model.onnx`
    /// - `Model` when the preprocessor sidecar cannot be parsed
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PackshotError::model_error_with_context(
                "locate",
                path,
                "path does not exist",
                &["pass --model or set PACKSHOT_MODEL"],
            ));
        }

        let (model_path, config_dir) = if path.is_dir() {
            let candidates = [path.join("model.onnx"), path.join("onnx").join("model.onnx")];
            let found = candidates
                .into_iter()
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| {
                    PackshotError::model_error_with_context(
                        "locate",
                        path,
                        "directory contains no model.onnx",
                        &["place the model at <dir>/model.onnx"],
                    )
                })?;
            (found, path.to_path_buf())
        } else {
            let parent = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
            (path.to_path_buf(), parent)
        };

        let preprocessing = Self::load_preprocessing(&config_dir.join(PREPROCESSOR_CONFIG_FILE))?;
        log::debug!(
            "Resolved model {} (input {}x{})",
            model_path.display(),
            preprocessing.target_size,
            preprocessing.target_size
        );

        Ok(Self {
            model_path,
            preprocessing,
        })
    }

    fn load_preprocessing(config_path: &Path) -> Result<PreprocessingConfig> {
        if !config_path.is_file() {
            return Ok(PreprocessingConfig::default());
        }

        let content = fs::read_to_string(config_path)
            .map_err(|e| PackshotError::file_io_error("read preprocessor config", config_path, &e))?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            PackshotError::model(format!(
                "Failed to parse {}: {e}",
                config_path.display()
            ))
        })?;
        PreprocessingConfig::from_json(&value)
    }

    /// Override the preprocessing configuration
    #[must_use]
    pub fn with_preprocessing(mut self, preprocessing: PreprocessingConfig) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        self.model_path
            .file_name()
            .map_or_else(|| "model".to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Model information and metadata
    ///
    /// # Errors
    /// - `Io` when the model file metadata cannot be read
    pub fn info(&self) -> Result<ModelInfo> {
        let metadata = fs::metadata(&self.model_path)
            .map_err(|e| PackshotError::file_io_error("stat model", &self.model_path, &e))?;
        let edge = self.preprocessing.target_size as usize;
        Ok(ModelInfo {
            name: self.display_name(),
            size_bytes: metadata.len(),
            input_shape: (1, 3, edge, edge),
        })
    }
}
