//! Segmentation model input/output conversion
//!
//! The model sees a square letterboxed copy of the input. `LetterboxTransform`
//! records the geometry so the predicted mask can be mapped back onto the
//! original pixels.

use crate::{
    error::{PackshotError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding colour around the letterboxed image (RGB)
    pub padding_color: [u8; 3],
    /// Whether to return the letterboxed image for debugging
    pub return_preprocessed_image: bool,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [255, 255, 255],
            return_preprocessed_image: false,
        }
    }
}

/// Geometry of the aspect-preserving resize and centre padding into the model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    /// Scale factor applied to the original image
    pub scale: f32,
    /// Width of the scaled image inside the tensor
    pub scaled_width: u32,
    /// Height of the scaled image inside the tensor
    pub scaled_height: u32,
    /// X offset for centering
    pub offset_x: u32,
    /// Y offset for centering
    pub offset_y: u32,
    /// Original image dimensions
    pub original: (u32, u32),
}

impl LetterboxTransform {
    /// Compute the letterbox for an image of `original` dimensions into a square of `target_size`
    ///
    /// # Errors
    /// - `InvalidParameter` for zero-sized input or target
    pub fn new(original: (u32, u32), target_size: u32) -> Result<Self> {
        let (orig_width, orig_height) = original;
        if orig_width == 0 || orig_height == 0 || target_size == 0 {
            return Err(PackshotError::invalid_parameter(format!(
                "Cannot letterbox {orig_width}x{orig_height} into {target_size}x{target_size}"
            )));
        }

        let target = target_size as f32;
        let scale = (target / orig_width as f32).min(target / orig_height as f32);

        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            original,
        })
    }

    /// Tensor coordinates sampled for original pixel `(x, y)`
    #[must_use]
    pub fn to_tensor_coords(&self, x: u32, y: u32) -> (u32, u32) {
        let map = |v: u32, scaled: u32| -> u32 {
            (((v as f32 + 0.5) * self.scale) as u32).min(scaled.saturating_sub(1))
        };
        (
            map(x, self.scaled_width) + self.offset_x,
            map(y, self.scaled_height) + self.offset_y,
        )
    }
}

/// Converts images to model tensors and model output back to masks
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox and normalize an image into an NCHW tensor
    ///
    /// Handles:
    /// - RGB conversion
    /// - Aspect ratio preserving resize
    /// - Centre padding to the model's square input
    /// - Per-channel `(p / 255 - mean) / std` normalization
    ///
    /// # Errors
    /// - `InvalidParameter` for zero-sized input
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<(Option<DynamicImage>, Array4<f32>, LetterboxTransform)> {
        let target_size = preprocessing_config.target_size;
        let rgb_image = image.to_rgb8();
        let transform = LetterboxTransform::new(rgb_image.dimensions(), target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            transform.scaled_width,
            transform.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let padding = options.padding_color;
        let mut canvas: RgbImage = ImageBuffer::from_pixel(
            target_size,
            target_size,
            image::Rgb([padding[0], padding[1], padding[2]]),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(transform.offset_x),
            i64::from(transform.offset_y),
        );

        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);

        let preprocessed_image = options
            .return_preprocessed_image
            .then(|| DynamicImage::ImageRgb8(canvas));

        Ok((preprocessed_image, tensor, transform))
    }

    /// Tensor-only preprocessing for the inference path
    ///
    /// # Errors
    /// - `InvalidParameter` for zero-sized input
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, LetterboxTransform)> {
        let (_, tensor, transform) = Self::preprocess_image(
            image,
            preprocessing_config,
            &PreprocessingOptions::default(),
        )?;
        Ok((tensor, transform))
    }

    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            let value = canvas.get_pixel(x as u32, y as u32)[c];
            (f32::from(value) / 255.0 - mean[c]) / std[c]
        })
    }

    /// Map a `1x1xHxW` model output back to an 8-bit mask of the original size
    ///
    /// Values are clamped to 0..1 before scaling to 0..255; tensor cells
    /// outside the letterboxed region are never sampled.
    ///
    /// # Errors
    /// - `Inference` for a tensor that is not `1x1xHxW` or smaller than the letterbox
    pub fn tensor_to_mask(tensor: &Array4<f32>, transform: &LetterboxTransform) -> Result<GrayImage> {
        let shape = tensor.shape();
        let (batch, channels, height, width) = match *shape {
            [b, c, h, w] => (b, c, h, w),
            _ => return Err(PackshotError::inference("Invalid output tensor shape")),
        };
        if batch != 1 || channels != 1 {
            return Err(PackshotError::inference(format!(
                "Invalid output tensor shape {shape:?}, expected [1, 1, H, W]"
            )));
        }

        let needed_width = (transform.offset_x + transform.scaled_width) as usize;
        let needed_height = (transform.offset_y + transform.scaled_height) as usize;
        if width < needed_width || height < needed_height {
            return Err(PackshotError::inference(format!(
                "Output tensor {width}x{height} smaller than model input region {needed_width}x{needed_height}"
            )));
        }

        let (orig_width, orig_height) = transform.original;
        Ok(GrayImage::from_fn(orig_width, orig_height, |x, y| {
            let (tx, ty) = transform.to_tensor_coords(x, y);
            let value = tensor
                .get([0, 0, ty as usize, tx as usize])
                .copied()
                .unwrap_or(0.0);
            Luma([(value.clamp(0.0, 1.0) * 255.0).round() as u8])
        }))
    }
}
