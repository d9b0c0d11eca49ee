//! Tract remover for ONNX segmentation models
//!
//! Tract is a pure Rust inference engine, so the service ships without
//! native runtime dependencies. The optimized plan is built once; running
//! it only needs `&self`, which lets one instance serve every request.

use crate::error::{PackshotError, Result};
use crate::inference::{apply_mask, BackgroundRemover};
use crate::models::{ModelManager, PreprocessingConfig};
use crate::services::ImageIOService;
use crate::utils::ImagePreprocessor;
use instant::Instant;
use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Background remover backed by a Tract-optimized ONNX model
pub struct TractRemover {
    model: TractModel,
    model_manager: ModelManager,
    name: String,
}

impl std::fmt::Debug for TractRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractRemover")
            .field("name", &self.name)
            .field("model_path", &self.model_manager.model_path())
            .finish_non_exhaustive()
    }
}

impl TractRemover {
    /// Load and optimize the model at `path` (file or model directory)
    ///
    /// # Errors
    /// - `Model` when the path cannot be resolved or the ONNX graph fails to load
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_manager(ModelManager::from_path(path)?)
    }

    /// Load and optimize the model described by a resolved manager
    ///
    /// # Errors
    /// - `Model` when the ONNX graph fails to load or optimize
    pub fn from_manager(model_manager: ModelManager) -> Result<Self> {
        let model_load_start = Instant::now();
        let model_path = model_manager.model_path().to_path_buf();
        let edge = model_manager.preprocessing_config().target_size as usize;

        log::info!("Initializing Tract remover");
        log::info!("Model: {}", model_path.display());
        if let Ok(info) = model_manager.info() {
            #[allow(clippy::cast_precision_loss)]
            let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
            log::info!("Model size: {size_mb:.2} MB, input {edge}x{edge}");
        }

        let model_error = |operation: &str, e: &dyn std::fmt::Display| {
            PackshotError::model_error_with_context(
                operation,
                &model_path,
                &e.to_string(),
                &["check that the file is an ONNX segmentation model with a 1x3xHxW input"],
            )
        };

        let model = onnx()
            .model_for_path(&model_path)
            .map_err(|e| model_error("load", &e))?
            .with_input_fact(0, f32::fact([1, 3, edge, edge]).into())
            .map_err(|e| model_error("configure input of", &e))?
            .into_optimized()
            .map_err(|e| model_error("optimize", &e))?
            .into_runnable()
            .map_err(|e| model_error("prepare", &e))?;

        log::info!(
            "Tract remover initialized in {}ms",
            model_load_start.elapsed().as_millis()
        );

        Ok(Self {
            model,
            name: format!("tract:{}", model_manager.display_name()),
            model_manager,
        })
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        self.model_manager.preprocessing_config()
    }

    /// Run the model on a preprocessed `1x3xHxW` tensor
    ///
    /// # Errors
    /// - `Inference` when Tract fails or the output is not a 4D f32 tensor
    pub fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        log::debug!("Running Tract inference, input tensor {:?}", input.shape());
        let inference_start = Instant::now();

        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data)
            .map_err(|e| PackshotError::inference(format!("Failed to build input tensor: {e}")))?;

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| PackshotError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| PackshotError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_view = output_tensor.to_array_view::<f32>().map_err(|e| {
            PackshotError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = output_view.shape().to_vec();
        let dims = match shape.as_slice() {
            [n, c, h, w] => (*n, *c, *h, *w),
            // Some exports drop the channel axis
            [n, h, w] => (*n, 1, *h, *w),
            _ => {
                return Err(PackshotError::inference(format!(
                    "Expected 4D output tensor, got shape {shape:?}"
                )))
            },
        };

        let output = Array4::from_shape_vec(dims, output_view.iter().copied().collect())
            .map_err(|e| PackshotError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output tensor {:?}",
            inference_start.elapsed().as_millis(),
            output.shape()
        );
        Ok(output)
    }
}

impl BackgroundRemover for TractRemover {
    fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let image = ImageIOService::decode_bytes(image_bytes)
            .map_err(|e| PackshotError::inference(format!("Remover could not read input: {e}")))?;

        let (tensor, transform) =
            ImagePreprocessor::preprocess_for_inference(&image, self.preprocessing_config())?;
        let output = self.infer(&tensor)?;
        let mask = ImagePreprocessor::tensor_to_mask(&output, &transform)?;

        let cutout = apply_mask(&image, &mask);
        ImageIOService::encode_png_rgba(&cutout)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(all(test, feature = "tract"))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_model_error() {
        let err = TractRemover::from_path("/no/such/model.onnx").unwrap_err();
        assert!(matches!(err, PackshotError::Model(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_invalid_onnx_is_model_error() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("model.onnx");
        std::fs::write(&path, b"this is not a protobuf graph")?;

        let err = TractRemover::from_path(&path).unwrap_err();
        assert!(matches!(err, PackshotError::Model(_)));
        assert!(err.to_string().contains("model.onnx"));
        Ok(())
    }

    #[test]
    fn test_remover_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TractRemover>();
    }
}
