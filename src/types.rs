//! Core types shared by the compositing pipeline

use crate::{config::OutputFormat, error::Result};
use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Minimal rectangle enclosing every pixel with alpha > 0
///
/// `right` and `bottom` are exclusive, so `width = right - left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Whether the box encloses no pixels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Read-only view of the alpha channel of an RGBA buffer
#[derive(Debug, Clone, Copy)]
pub struct AlphaMask<'a> {
    image: &'a RgbaImage,
}

impl<'a> AlphaMask<'a> {
    #[must_use]
    pub fn new(image: &'a RgbaImage) -> Self {
        Self { image }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Alpha value at `(x, y)`, 0 outside the image
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel_checked(x, y).map_or(0, |p| p[3])
    }

    /// Tight bounding box of all pixels with alpha > 0, `None` when fully transparent
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut left = u32::MAX;
        let mut top = u32::MAX;
        let mut right = 0;
        let mut bottom = 0;
        let mut found = false;

        for (x, y, pixel) in self.image.enumerate_pixels() {
            if pixel[3] > 0 {
                found = true;
                left = left.min(x);
                top = top.min(y);
                right = right.max(x + 1);
                bottom = bottom.max(y + 1);
            }
        }

        found.then(|| BoundingBox::new(left, top, right, bottom))
    }

    /// Whether every pixel is fully transparent
    #[must_use]
    pub fn is_fully_transparent(&self) -> bool {
        self.image.pixels().all(|p| p[3] == 0)
    }

    /// Mask with every value scaled by `factor / 255`, clamped to 255
    #[must_use]
    pub fn scaled(&self, factor: u8) -> GrayImage {
        let (width, height) = self.image.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let alpha = u32::from(self.image.get_pixel(x, y)[3]);
            let strength = (alpha * u32::from(factor) / 255).min(255);
            Luma([strength as u8])
        })
    }

    /// Copy of the mask as a grayscale image
    #[must_use]
    pub fn to_image(&self) -> GrayImage {
        self.scaled(255)
    }
}

/// Per-stage wall-clock timings of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTimings {
    pub decode_ms: u64,
    pub pre_resize_ms: u64,
    pub inference_ms: u64,
    pub compose_ms: u64,
    /// `None` when the shadow stage is disabled
    pub shadow_ms: Option<u64>,
    pub post_resize_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

impl PipelineTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of the total spent waiting on the background remover
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to a measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.decode_ms
            + self.pre_resize_ms
            + self.inference_ms
            + self.compose_ms
            + self.shadow_ms.unwrap_or(0)
            + self.post_resize_ms
            + self.encode_ms;
        self.total_ms.saturating_sub(measured)
    }

    /// One-line summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Resize: {}ms | Inference: {}ms ({:.1}%) | Compose: {}ms",
            self.total_ms,
            self.decode_ms,
            self.pre_resize_ms + self.post_resize_ms,
            self.inference_ms,
            self.inference_ratio() * 100.0,
            self.compose_ms,
        );

        if let Some(shadow_ms) = self.shadow_ms {
            summary.push_str(&format!(" | Shadow: {shadow_ms}ms"));
        }
        summary.push_str(&format!(" | Encode: {}ms", self.encode_ms));

        let other_ms = self.other_overhead_ms();
        if other_ms > 5 {
            summary.push_str(&format!(" | Other: {other_ms}ms"));
        }

        summary
    }
}

/// Serialized output image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

impl EncodedImage {
    #[must_use]
    pub fn new(bytes: Vec<u8>, format: OutputFormat) -> Self {
        Self { bytes, format }
    }

    #[must_use]
    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    #[must_use]
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Filename hint for the response, e.g. `packshot.jpg`
    #[must_use]
    pub fn filename_hint(&self) -> String {
        format!("packshot.{}", self.extension())
    }
}

/// Result of one pass through the pipeline
#[derive(Debug, Clone)]
pub struct PackshotResult {
    /// Encoded output image
    pub encoded: EncodedImage,

    /// Final canvas dimensions after the post-resize
    pub dimensions: (u32, u32),

    /// Dimensions of the decoded input
    pub original_dimensions: (u32, u32),

    /// Subject bounding box within the remover output, `None` when it was fully transparent
    pub bounding_box: Option<BoundingBox>,

    pub timings: PipelineTimings,
}

impl PackshotResult {
    /// Write the encoded bytes to `path`, creating missing directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::services::ImageIOService::write_file(path, &self.encoded.bytes)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.encoded.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.encoded.bytes
    }

    #[must_use]
    pub fn timing_summary(&self) -> String {
        self.timings.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rect_image(width: u32, height: u32, rect: BoundingBox) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if x >= rect.left && x < rect.right && y >= rect.top && y < rect.bottom {
                Rgba([200, 10, 10, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn test_bounding_box_matches_rectangle() {
        let rect = BoundingBox::new(12, 30, 57, 41);
        let image = rect_image(80, 60, rect);
        let bbox = AlphaMask::new(&image).bounding_box().unwrap();
        assert_eq!(bbox, rect);
        assert_eq!(bbox.width(), 45);
        assert_eq!(bbox.height(), 11);
    }

    #[test]
    fn test_bounding_box_single_pixel_and_edges() {
        let mut image = RgbaImage::new(10, 10);
        image.put_pixel(9, 9, Rgba([0, 0, 0, 1]));
        let bbox = AlphaMask::new(&image).bounding_box().unwrap();
        assert_eq!(bbox, BoundingBox::new(9, 9, 10, 10));
        assert!(!bbox.is_empty());
    }

    #[test]
    fn test_bounding_box_absent_when_transparent() {
        let image = RgbaImage::new(16, 8);
        let mask = AlphaMask::new(&image);
        assert!(mask.bounding_box().is_none());
        assert!(mask.is_fully_transparent());

        let empty = RgbaImage::new(0, 0);
        assert!(AlphaMask::new(&empty).bounding_box().is_none());
    }

    #[test]
    fn test_scaled_mask() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([0, 0, 0, 128]));
        let scaled = AlphaMask::new(&image).scaled(90);
        assert_eq!(scaled.get_pixel(0, 0)[0], 90);
        assert_eq!(scaled.get_pixel(1, 0)[0], 45);
        assert_eq!(scaled.get_pixel(2, 0)[0], 0);
        assert_eq!(AlphaMask::new(&image).to_image().get_pixel(1, 0)[0], 128);
    }

    #[test]
    fn test_timings_overhead_and_summary() {
        let timings = PipelineTimings {
            decode_ms: 5,
            pre_resize_ms: 10,
            inference_ms: 50,
            compose_ms: 10,
            shadow_ms: Some(5),
            post_resize_ms: 5,
            encode_ms: 5,
            total_ms: 100,
        };
        assert_eq!(timings.other_overhead_ms(), 10);
        assert!((timings.inference_ratio() - 0.5).abs() < f64::EPSILON);

        let summary = timings.summary();
        assert!(summary.contains("Total: 100ms"));
        assert!(summary.contains("Shadow: 5ms"));
        assert!(summary.contains("Other: 10ms"));

        assert_eq!(PipelineTimings::new().inference_ratio(), 0.0);
    }

    #[test]
    fn test_encoded_image_metadata() {
        let encoded = EncodedImage::new(vec![1, 2, 3], OutputFormat::Jpeg);
        assert_eq!(encoded.media_type(), "image/jpeg");
        assert_eq!(encoded.filename_hint(), "packshot.jpg");
        assert_eq!(encoded.len(), 3);
    }

    #[test]
    fn test_result_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out.png");
        let result = PackshotResult {
            encoded: EncodedImage::new(vec![9, 8, 7], OutputFormat::Png),
            dimensions: (1, 1),
            original_dimensions: (1, 1),
            bounding_box: None,
            timings: PipelineTimings::default(),
        };
        result.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![9, 8, 7]);
    }
}
