//! Output encoding service
//!
//! JPEG output is always flattened onto an opaque background first; an
//! RGBA JPEG is never produced.

use crate::{
    compositor::blend_over,
    config::{OutputFormat, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY, WHITE},
    error::{PackshotError, Result},
    types::EncodedImage,
};
use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    error::{EncodingError, ImageError},
    ExtendedColorType, ImageEncoder, ImageFormat, Rgb, RgbImage, RgbaImage,
};
use jpeg_encoder::{ColorType, Encoder as JpegEncoder};

/// Service for serializing the final canvas
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode the canvas in the requested format
    ///
    /// `quality` only applies to JPEG and is clamped to 60-95.
    ///
    /// # Errors
    /// - `Image` when the encoder fails
    ///
    /// # Examples
    /// ```rust
    /// use packshot::{config::OutputFormat, services::OutputFormatHandler};
    /// use image::RgbaImage;
    ///
    /// let canvas = RgbaImage::new(8, 8);
    /// let encoded = OutputFormatHandler::encode(&canvas, OutputFormat::Jpeg, 92)?;
    /// assert_eq!(encoded.media_type(), "image/jpeg");
    /// # Ok::<(), packshot::PackshotError>(())
    /// ```
    pub fn encode(canvas: &RgbaImage, format: OutputFormat, quality: u8) -> Result<EncodedImage> {
        let bytes = match format {
            OutputFormat::Png => Self::encode_png(canvas)?,
            OutputFormat::Jpeg => {
                let flattened = Self::flatten_to_rgb(canvas, WHITE);
                Self::encode_jpeg(&flattened, quality)?
            },
        };
        Ok(EncodedImage::new(bytes, format))
    }

    /// Lossless RGBA PNG
    ///
    /// # Errors
    /// - `Image` when the encoder fails
    pub fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
        encoder.write_image(
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            ExtendedColorType::Rgba8,
        )?;
        Ok(buffer)
    }

    /// Progressive JPEG with optimized Huffman tables
    ///
    /// # Errors
    /// - `InvalidParameter` when a side exceeds the 65535 px JPEG limit
    /// - `Image` when the encoder fails
    pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        let too_large = |_| {
            PackshotError::invalid_parameter(format!(
                "{width}x{height} exceeds the JPEG size limit"
            ))
        };
        let width = u16::try_from(width).map_err(too_large)?;
        let height = u16::try_from(height).map_err(too_large)?;

        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new(&mut buffer, Self::clamp_quality(quality));
        encoder.set_progressive(true);
        encoder.set_optimized_huffman_tables(true);
        encoder
            .encode(image.as_raw(), width, height, ColorType::Rgb)
            .map_err(|e| ImageError::Encoding(EncodingError::new(ImageFormat::Jpeg.into(), e)))?;
        Ok(buffer)
    }

    /// Alpha-composite onto an opaque colour and drop the alpha channel
    #[must_use]
    pub fn flatten_to_rgb(canvas: &RgbaImage, background: [u8; 3]) -> RgbImage {
        let (width, height) = canvas.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            Rgb(blend_over(canvas.get_pixel(x, y), background))
        })
    }

    /// JPEG quality clamped to the safe range
    #[must_use]
    pub fn clamp_quality(quality: u8) -> u8 {
        quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
    }
}
