//! Soft drop shadow from the subject's alpha silhouette

use crate::{config::ShadowConfig, types::AlphaMask};
use image::{Rgba, RgbaImage};

/// Drop shadow synthesis
pub struct ShadowSynthesizer;

impl ShadowSynthesizer {
    /// Unblurred shadow layer: black, alpha = `min(255, alpha * opacity / 255)`
    #[must_use]
    pub fn shadow_layer(image: &RgbaImage, opacity: u8) -> RgbaImage {
        let strength = AlphaMask::new(image).scaled(opacity);
        let (width, height) = image.dimensions();
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([0, 0, 0, strength.get_pixel(x, y)[0]])
        })
    }

    /// Shadow layer after the Gaussian blur (`blur_radius` is the sigma)
    #[must_use]
    pub fn blurred_shadow(image: &RgbaImage, config: &ShadowConfig) -> RgbaImage {
        let layer = Self::shadow_layer(image, config.opacity);
        if config.blur_radius > 0.0 {
            image::imageops::blur(&layer, config.blur_radius)
        } else {
            layer
        }
    }

    /// Composite a blurred, offset silhouette beneath the image on an opaque canvas
    ///
    /// The shadow only shows where the input is not opaque, so pass the
    /// transparent layout rather than an already flattened canvas.
    #[must_use]
    pub fn apply(image: &RgbaImage, config: &ShadowConfig, background: [u8; 3]) -> RgbaImage {
        let (width, height) = image.dimensions();
        let shadow = Self::blurred_shadow(image, config);

        let mut output =
            RgbaImage::from_pixel(width, height, Rgba([background[0], background[1], background[2], 255]));
        image::imageops::overlay(&mut output, &shadow, config.offset_x, config.offset_y);
        image::imageops::overlay(&mut output, image, 0, 0);
        output
    }
}
