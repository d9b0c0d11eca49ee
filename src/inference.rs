//! Background remover abstraction
//!
//! The remover is a black box from encoded image bytes to a PNG whose alpha
//! channel isolates the subject. Implementations are shared across requests
//! behind an `Arc`, so inference runs through `&self`.

use crate::error::Result;
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};

/// Segmentation model turning an image into a cut-out
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background from an encoded image
    ///
    /// Returns PNG bytes of an RGBA image with the background made transparent.
    ///
    /// # Errors
    /// - `Inference` when the model cannot process the input
    fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Use a segmentation mask as the alpha channel of an image
///
/// Pixels with mask 0 become fully transparent black.
#[must_use]
pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> RgbaImage {
    let rgba_image = image.to_rgba8();
    let (width, height) = rgba_image.dimensions();

    RgbaImage::from_fn(width, height, |x, y| {
        let alpha = mask.get_pixel_checked(x, y).map_or(0, |p| p[0]);
        if alpha > 0 {
            let pixel = rgba_image.get_pixel(x, y);
            Rgba([pixel[0], pixel[1], pixel[2], alpha])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_apply_mask() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(3, 1, image::Rgb([9, 8, 7])));
        let mut mask = GrayImage::new(3, 1);
        mask.put_pixel(0, 0, Luma([255]));
        mask.put_pixel(1, 0, Luma([100]));

        let result = apply_mask(&image, &mask);
        assert_eq!(*result.get_pixel(0, 0), Rgba([9, 8, 7, 255]));
        assert_eq!(*result.get_pixel(1, 0), Rgba([9, 8, 7, 100]));
        assert_eq!(*result.get_pixel(2, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_apply_mask_smaller_mask_is_transparent() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 1, 1, 255])));
        let mask = GrayImage::from_pixel(2, 2, Luma([255]));
        let result = apply_mask(&image, &mask);
        assert_eq!(result.get_pixel(1, 1)[3], 255);
        assert_eq!(result.get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn test_remover_is_object_safe() {
        struct Echo;
        impl BackgroundRemover for Echo {
            fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
                Ok(image_bytes.to_vec())
            }

            fn name(&self) -> &str {
                "echo"
            }
        }

        let remover: std::sync::Arc<dyn BackgroundRemover> = std::sync::Arc::new(Echo);
        assert_eq!(remover.name(), "echo");
        assert_eq!(remover.remove_background(b"abc").unwrap(), b"abc");
    }
}
