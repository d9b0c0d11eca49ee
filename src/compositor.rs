//! Crop, pad and centre a cut-out subject on a solid canvas
//!
//! All compositing happens in RGBA. [`Compositor::layout`] places the
//! subject on a transparent canvas; [`Compositor::compose`] flattens that
//! layout onto the opaque background colour.

use crate::{
    config::{PaddingPolicy, PipelineConfig, WHITE},
    types::{AlphaMask, BoundingBox},
    utils::RESIZE_FILTER,
};
use image::{Rgba, RgbaImage};

/// Smallest edge the subject box may shrink to under the fixed-canvas policy
pub const MIN_INNER_SIZE: u32 = 64;

const INNER_SIZE_EPSILON: f64 = 1e-9;

/// Parameters of one compositing pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOptions {
    pub policy: PaddingPolicy,
    /// Canvas edge for the fixed-canvas policy
    pub target_size: u32,
    /// Padding ratio, clamped to the policy's range on use
    pub pad: f64,
    pub background: [u8; 3],
}

impl CompositeOptions {
    #[must_use]
    pub fn fixed_canvas(target_size: u32, pad: f64) -> Self {
        Self {
            policy: PaddingPolicy::FixedCanvas,
            target_size,
            pad,
            background: WHITE,
        }
    }

    #[must_use]
    pub fn content_driven(pad: f64) -> Self {
        Self {
            policy: PaddingPolicy::ContentDriven,
            target_size: 0,
            pad,
            background: WHITE,
        }
    }

    #[must_use]
    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = background;
        self
    }

    /// Pad ratio after clamping to the policy's range
    #[must_use]
    pub fn effective_pad(&self) -> f64 {
        self.policy.clamp_pad(self.pad)
    }
}

impl From<&PipelineConfig> for CompositeOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            policy: config.padding_policy,
            target_size: config.size,
            pad: config.pad,
            background: config.background,
        }
    }
}

/// Subject placed on a transparent canvas
#[derive(Debug, Clone)]
pub struct Layout {
    pub canvas: RgbaImage,
    /// Subject bounding box in the input, `None` when it was fully transparent
    pub bounding_box: Option<BoundingBox>,
    /// Top-left corner of the placed subject on the canvas
    pub offset: (i64, i64),
    /// Size of the placed subject after any contain fit
    pub placed_size: (u32, u32),
}

/// Canvas construction for both padding policies
pub struct Compositor;

impl Compositor {
    #[must_use]
    pub fn bounding_box(foreground: &RgbaImage) -> Option<BoundingBox> {
        AlphaMask::new(foreground).bounding_box()
    }

    /// Crop to the alpha bounding box; a fully transparent input is returned whole
    #[must_use]
    pub fn crop_to_content(foreground: &RgbaImage) -> (RgbaImage, Option<BoundingBox>) {
        match Self::bounding_box(foreground) {
            Some(bbox) if !bbox.is_empty() => {
                let cropped = image::imageops::crop_imm(
                    foreground,
                    bbox.left,
                    bbox.top,
                    bbox.width(),
                    bbox.height(),
                )
                .to_image();
                (cropped, Some(bbox))
            },
            _ => (foreground.clone(), None),
        }
    }

    /// Largest size with the input's aspect ratio that touches a `box_width x box_height` box
    ///
    /// The rounded side never drops below 1.
    #[must_use]
    pub fn contain_dimensions(
        width: u32,
        height: u32,
        box_width: u32,
        box_height: u32,
    ) -> (u32, u32) {
        if width == 0 || height == 0 || box_width == 0 || box_height == 0 {
            return (width.min(box_width), height.min(box_height));
        }

        let image_ratio = f64::from(width) / f64::from(height);
        let box_ratio = f64::from(box_width) / f64::from(box_height);

        if image_ratio > box_ratio {
            let new_height = (f64::from(height) / f64::from(width) * f64::from(box_width)).round();
            (box_width, (new_height as u32).max(1))
        } else if image_ratio < box_ratio {
            let new_width = (f64::from(width) / f64::from(height) * f64::from(box_height)).round();
            ((new_width as u32).max(1), box_height)
        } else {
            (box_width, box_height)
        }
    }

    /// Contain-fit an image into a box, scaling up or down
    #[must_use]
    pub fn contain(image: &RgbaImage, box_width: u32, box_height: u32) -> RgbaImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = Self::contain_dimensions(width, height, box_width, box_height);
        if (new_width, new_height) == (width, height) || new_width == 0 || new_height == 0 {
            return image.clone();
        }
        image::imageops::resize(image, new_width, new_height, RESIZE_FILTER)
    }

    /// Edge of the box the subject is fitted into on a fixed canvas
    #[must_use]
    pub fn inner_size(target_size: u32, pad: f64) -> u32 {
        let pad = PaddingPolicy::FixedCanvas.clamp_pad(pad);
        // pad ratios are decimal: 1400 * (1 - 0.3) floors to 980, not 979
        let inner = (f64::from(target_size) * (1.0 - pad) + INNER_SIZE_EPSILON).floor() as u32;
        inner.max(MIN_INNER_SIZE)
    }

    /// Per-side padding of the content-driven policy: `round(max(w, h) * pad)`
    #[must_use]
    pub fn padding_pixels(width: u32, height: u32, pad: f64) -> u32 {
        let pad = PaddingPolicy::ContentDriven.clamp_pad(pad);
        (f64::from(width.max(height)) * pad).round() as u32
    }

    /// Crop, size and place the subject on a transparent canvas
    #[must_use]
    pub fn layout(foreground: &RgbaImage, options: &CompositeOptions) -> Layout {
        let (cropped, bounding_box) = Self::crop_to_content(foreground);

        match options.policy {
            PaddingPolicy::FixedCanvas => {
                let target = options.target_size;
                let inner = Self::inner_size(target, options.effective_pad());
                let fitted = Self::contain(&cropped, inner, inner);
                let (w, h) = fitted.dimensions();

                let offset = (
                    (i64::from(target) - i64::from(w)).div_euclid(2),
                    (i64::from(target) - i64::from(h)).div_euclid(2),
                );
                let mut canvas = RgbaImage::new(target, target);
                image::imageops::replace(&mut canvas, &fitted, offset.0, offset.1);

                Layout {
                    canvas,
                    bounding_box,
                    offset,
                    placed_size: (w, h),
                }
            },
            PaddingPolicy::ContentDriven => {
                let (w, h) = cropped.dimensions();
                let pad_px = Self::padding_pixels(w, h, options.effective_pad());

                let mut canvas = RgbaImage::new(w + 2 * pad_px, h + 2 * pad_px);
                image::imageops::replace(&mut canvas, &cropped, i64::from(pad_px), i64::from(pad_px));

                Layout {
                    canvas,
                    bounding_box,
                    offset: (i64::from(pad_px), i64::from(pad_px)),
                    placed_size: (w, h),
                }
            },
        }
    }

    /// Crop, pad and centre the subject on an opaque background canvas
    #[must_use]
    pub fn compose(foreground: &RgbaImage, options: &CompositeOptions) -> RgbaImage {
        let layout = Self::layout(foreground, options);
        Self::flatten(&layout.canvas, options.background)
    }

    /// Alpha-composite onto an opaque solid colour: `out = fg * a + bg * (1 - a)`
    #[must_use]
    pub fn flatten(image: &RgbaImage, background: [u8; 3]) -> RgbaImage {
        let (width, height) = image.dimensions();
        RgbaImage::from_fn(width, height, |x, y| {
            let pixel = image.get_pixel(x, y);
            let rgb = blend_over(pixel, background);
            Rgba([rgb[0], rgb[1], rgb[2], 255])
        })
    }
}

/// Blend one RGBA pixel over an opaque colour
#[inline]
pub(crate) fn blend_over(pixel: &Rgba<u8>, background: [u8; 3]) -> [u8; 3] {
    let alpha = u32::from(pixel[3]);
    let mix = |fg: u8, bg: u8| -> u8 {
        ((u32::from(fg) * alpha + u32::from(bg) * (255 - alpha) + 127) / 255) as u8
    };
    [
        mix(pixel[0], background[0]),
        mix(pixel[1], background[1]),
        mix(pixel[2], background[2]),
    ]
}
