//! Bounded, aspect-preserving resize

use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};

/// Resampling filter used for every pipeline resize
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Aspect-preserving downscale to a maximum dimension
pub struct Resizer;

impl Resizer {
    /// Dimensions after bounding the larger side by `max_dim`
    ///
    /// Returns the input dimensions unchanged when `max_dim` is 0 or the
    /// larger side already fits. Otherwise the larger side becomes exactly
    /// `max_dim` and the other side is rounded to the nearest integer,
    /// never below 1.
    ///
    /// # Examples
    /// ```rust
    /// use packshot::utils::Resizer;
    ///
    /// assert_eq!(Resizer::target_dimensions(4000, 3000, 1400), (1400, 1050));
    /// assert_eq!(Resizer::target_dimensions(800, 600, 1400), (800, 600));
    /// ```
    #[must_use]
    pub fn target_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
        let largest = width.max(height);
        if max_dim == 0 || largest <= max_dim {
            return (width, height);
        }

        let scale = f64::from(max_dim) / f64::from(largest);
        let scale_side = |side: u32| -> u32 {
            if side == largest {
                max_dim
            } else {
                ((f64::from(side) * scale).round() as u32).max(1)
            }
        };

        (scale_side(width), scale_side(height))
    }

    /// Whether `resize_max_dimension` would change the geometry
    #[must_use]
    pub fn needs_resize(width: u32, height: u32, max_dim: u32) -> bool {
        Self::target_dimensions(width, height, max_dim) != (width, height)
    }

    /// Downscale so the larger side does not exceed `max_dim`
    ///
    /// The input is never mutated; a no-op returns a clone.
    #[must_use]
    pub fn resize_max_dimension(image: &DynamicImage, max_dim: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        if !Self::needs_resize(width, height, max_dim) {
            return image.clone();
        }

        let (new_width, new_height) = Self::target_dimensions(width, height, max_dim);
        log::debug!("Resizing {width}x{height} -> {new_width}x{new_height} (bound {max_dim})");
        image.resize_exact(new_width, new_height, RESIZE_FILTER)
    }

    /// RGBA variant of [`Resizer::resize_max_dimension`] that takes ownership
    #[must_use]
    pub fn resize_rgba_max_dimension(image: RgbaImage, max_dim: u32) -> RgbaImage {
        let (width, height) = image.dimensions();
        if !Self::needs_resize(width, height, max_dim) {
            return image;
        }

        let (new_width, new_height) = Self::target_dimensions(width, height, max_dim);
        image::imageops::resize(&image, new_width, new_height, RESIZE_FILTER)
    }
}
