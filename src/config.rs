//! Configuration types for the packshot pipeline

use crate::error::{PackshotError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Smallest accepted `size` bound
pub const MIN_SIZE: u32 = 256;
/// Largest accepted `size` bound
pub const MAX_SIZE: u32 = 3000;
/// Default bound on the largest output dimension
pub const DEFAULT_SIZE: u32 = 1400;
/// Default padding ratio
pub const DEFAULT_PAD: f64 = 0.30;
/// Lowest JPEG quality the encoder will use
pub const MIN_JPEG_QUALITY: u8 = 60;
/// Highest JPEG quality the encoder will use
pub const MAX_JPEG_QUALITY: u8 = 95;
/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 92;
/// Opaque white
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG, flattened onto the background colour
    #[default]
    Jpeg,
    /// PNG with alpha channel preserved
    Png,
}

impl OutputFormat {
    /// Media type sent with the encoded bytes
    #[must_use]
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// File extension (without the dot)
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Whether the container can carry an alpha channel
    #[must_use]
    pub fn supports_transparency(self) -> bool {
        matches!(self, Self::Png)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = PackshotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(PackshotError::invalid_parameter(format!(
                "Unsupported format '{other}' (expected jpg or png)"
            ))),
        }
    }
}

/// How the canvas around the cropped subject is sized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaddingPolicy {
    /// Square `size x size` canvas; the subject is contain-fitted into
    /// `max(64, size * (1 - pad))` and centred
    #[default]
    FixedCanvas,
    /// Canvas grows around the subject by `round(max(w, h) * pad)` pixels per side
    ContentDriven,
}

impl PaddingPolicy {
    /// Inclusive range the padding ratio is clamped to
    #[must_use]
    pub fn pad_range(self) -> (f64, f64) {
        match self {
            Self::FixedCanvas => (0.0, 0.6),
            Self::ContentDriven => (0.0, 1.0),
        }
    }

    /// Clamp a padding ratio into this policy's range. NaN maps to the lower bound.
    #[must_use]
    pub fn clamp_pad(self, pad: f64) -> f64 {
        let (min, max) = self.pad_range();
        if pad.is_nan() {
            return min;
        }
        pad.clamp(min, max)
    }
}

impl FromStr for PaddingPolicy {
    type Err = PackshotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "fixed-canvas" => Ok(Self::FixedCanvas),
            "content" | "content-driven" => Ok(Self::ContentDriven),
            other => Err(PackshotError::invalid_parameter(format!(
                "Unknown padding policy '{other}' (expected fixed or content)"
            ))),
        }
    }
}

/// Drop shadow parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Horizontal offset of the shadow in pixels
    pub offset_x: i64,
    /// Vertical offset of the shadow in pixels
    pub offset_y: i64,
    /// Gaussian blur standard deviation in pixels
    pub blur_radius: f32,
    /// Shadow strength, scales the subject alpha by `opacity / 255`
    pub opacity: u8,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            offset_x: 18,
            offset_y: 18,
            blur_radius: 22.0,
            opacity: 90,
        }
    }
}

/// Configuration for one pass through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bound on the largest dimension, applied before inference and after compositing
    pub size: u32,

    /// Padding ratio, clamped to the policy's range when compositing
    pub pad: f64,

    /// Canvas sizing policy
    pub padding_policy: PaddingPolicy,

    /// Output format
    pub output_format: OutputFormat,

    /// JPEG quality, clamped to 60-95 on use
    pub jpeg_quality: u8,

    /// Canvas background colour (RGB, always fully opaque)
    pub background: [u8; 3],

    /// Drop shadow, `None` disables the shadow stage
    pub shadow: Option<ShadowConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            pad: DEFAULT_PAD,
            padding_policy: PaddingPolicy::default(),
            output_format: OutputFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            background: WHITE,
            shadow: Some(ShadowConfig::default()),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use packshot::config::{OutputFormat, PaddingPolicy, PipelineConfig};
    ///
    /// let config = PipelineConfig::builder()
    ///     .size(1000)
    ///     .pad(0.2)
    ///     .padding_policy(PaddingPolicy::ContentDriven)
    ///     .output_format(OutputFormat::Png)
    ///     .shadow(None)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.size, 1000);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate ranges the boundary is responsible for
    ///
    /// # Validation Rules
    ///
    /// - size: 256-3000 (inclusive)
    /// - pad: within the padding policy's range
    /// - shadow blur radius: finite and non-negative
    ///
    /// # Errors
    /// - `InvalidParameter` naming the offending value and its range
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.size) {
            return Err(PackshotError::config_value_error(
                "size",
                self.size,
                &format!("{MIN_SIZE}-{MAX_SIZE}"),
                Some(DEFAULT_SIZE),
            ));
        }

        let (min_pad, max_pad) = self.padding_policy.pad_range();
        if !self.pad.is_finite() || self.pad < min_pad || self.pad > max_pad {
            return Err(PackshotError::config_value_error(
                "pad ratio",
                self.pad,
                &format!("{min_pad}-{max_pad}"),
                Some(DEFAULT_PAD),
            ));
        }

        if let Some(shadow) = &self.shadow {
            if !shadow.blur_radius.is_finite() || shadow.blur_radius < 0.0 {
                return Err(PackshotError::config_value_error(
                    "shadow blur radius",
                    shadow.blur_radius,
                    ">= 0",
                    Some(ShadowConfig::default().blur_radius),
                ));
            }
        }

        Ok(())
    }

    /// JPEG quality after clamping to the safe range
    #[must_use]
    pub fn effective_jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.config.size = size;
        self
    }

    #[must_use]
    pub fn pad(mut self, pad: f64) -> Self {
        self.config.pad = pad;
        self
    }

    #[must_use]
    pub fn padding_policy(mut self, policy: PaddingPolicy) -> Self {
        self.config.padding_policy = policy;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set JPEG quality, clamped to 60-95
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);
        self
    }

    #[must_use]
    pub fn background(mut self, rgb: [u8; 3]) -> Self {
        self.config.background = rgb;
        self
    }

    #[must_use]
    pub fn shadow(mut self, shadow: Option<ShadowConfig>) -> Self {
        self.config.shadow = shadow;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Size or pad outside their valid ranges
    /// - Negative or non-finite shadow blur radius
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-request overrides as received at the service boundary
///
/// Every field is optional; absent fields keep the defaults of the base
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub size: Option<u32>,
    pub pad: Option<f64>,
    pub format: Option<OutputFormat>,
    pub quality: Option<u8>,
}

impl ProcessRequest {
    /// Parse one multipart/form text field into the request
    ///
    /// Unknown field names are ignored.
    ///
    /// # Errors
    /// - `InvalidParameter` when the value cannot be parsed
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match name {
            "size" => {
                let size = value.parse::<u32>().map_err(|_| {
                    PackshotError::invalid_parameter(format!("Invalid size '{value}'"))
                })?;
                self.size = Some(size);
            },
            "pad" => {
                let pad = value.parse::<f64>().map_err(|_| {
                    PackshotError::invalid_parameter(format!("Invalid pad ratio '{value}'"))
                })?;
                self.pad = Some(pad);
            },
            "format" => self.format = Some(value.parse()?),
            "quality" => {
                let quality = value.parse::<i64>().map_err(|_| {
                    PackshotError::invalid_parameter(format!("Invalid quality '{value}'"))
                })?;
                let clamped = quality.clamp(
                    i64::from(MIN_JPEG_QUALITY),
                    i64::from(MAX_JPEG_QUALITY),
                );
                self.quality = u8::try_from(clamped).ok();
            },
            _ => {},
        }
        Ok(())
    }

    /// Merge onto a base configuration and validate the result
    ///
    /// Rejects before any processing so no partial work happens on bad input.
    ///
    /// # Errors
    /// - `InvalidParameter` for size or pad outside the configured ranges
    pub fn apply(&self, base: &PipelineConfig) -> Result<PipelineConfig> {
        let mut config = base.clone();
        if let Some(size) = self.size {
            config.size = size;
        }
        if let Some(pad) = self.pad {
            config.pad = pad;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(quality) = self.quality {
            config.jpeg_quality = quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.size, 1400);
        assert_eq!(config.padding_policy, PaddingPolicy::FixedCanvas);
        assert_eq!(config.output_format, OutputFormat::Jpeg);
        assert_eq!(config.jpeg_quality, 92);
        assert_eq!(config.background, WHITE);
        assert!(config.shadow.is_some());
    }

    #[test]
    fn test_size_bounds() {
        assert!(PipelineConfig::builder().size(256).build().is_ok());
        assert!(PipelineConfig::builder().size(3000).build().is_ok());

        let err = PipelineConfig::builder().size(255).build().unwrap_err();
        assert!(err.to_string().contains("size"));
        assert!(err.to_string().contains("256-3000"));
        assert!(PipelineConfig::builder().size(3001).build().is_err());
    }

    #[test]
    fn test_pad_range_depends_on_policy() {
        assert!(PipelineConfig::builder().pad(0.6).build().is_ok());
        assert!(PipelineConfig::builder().pad(0.61).build().is_err());
        assert!(PipelineConfig::builder()
            .padding_policy(PaddingPolicy::ContentDriven)
            .pad(1.0)
            .build()
            .is_ok());
        assert!(PipelineConfig::builder().pad(-0.1).build().is_err());
        assert!(PipelineConfig::builder().pad(f64::NAN).build().is_err());
    }

    #[test]
    fn test_clamp_pad() {
        assert_eq!(PaddingPolicy::FixedCanvas.clamp_pad(0.9), 0.6);
        assert_eq!(PaddingPolicy::ContentDriven.clamp_pad(0.9), 0.9);
        assert_eq!(PaddingPolicy::ContentDriven.clamp_pad(-1.0), 0.0);
        assert_eq!(PaddingPolicy::FixedCanvas.clamp_pad(f64::NAN), 0.0);
    }

    #[test]
    fn test_jpeg_quality_clamping() {
        let config = PipelineConfig::builder().jpeg_quality(100).build().unwrap();
        assert_eq!(config.jpeg_quality, 95);
        let config = PipelineConfig::builder().jpeg_quality(10).build().unwrap();
        assert_eq!(config.jpeg_quality, 60);

        let mut config = PipelineConfig::default();
        config.jpeg_quality = 3;
        assert_eq!(config.effective_jpeg_quality(), 60);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("JPEG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!(" png ".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert!("webp".parse::<OutputFormat>().is_err());

        assert_eq!(OutputFormat::Jpeg.media_type(), "image/jpeg");
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert!(!OutputFormat::Jpeg.supports_transparency());
    }

    #[test]
    fn test_padding_policy_parsing() {
        assert_eq!(
            "content".parse::<PaddingPolicy>().unwrap(),
            PaddingPolicy::ContentDriven
        );
        assert_eq!(
            "fixed-canvas".parse::<PaddingPolicy>().unwrap(),
            PaddingPolicy::FixedCanvas
        );
        assert!("stretch".parse::<PaddingPolicy>().is_err());
    }

    #[test]
    fn test_process_request_fields() {
        let mut request = ProcessRequest::default();
        request.set_field("size", "800").unwrap();
        request.set_field("pad", "0.25").unwrap();
        request.set_field("format", "png").unwrap();
        request.set_field("quality", "150").unwrap();
        request.set_field("unrelated", "ignored").unwrap();

        assert_eq!(request.size, Some(800));
        assert_eq!(request.pad, Some(0.25));
        assert_eq!(request.format, Some(OutputFormat::Png));
        assert_eq!(request.quality, Some(95));

        assert!(request.set_field("size", "big").is_err());
        assert!(request.set_field("pad", "").is_err());
    }

    #[test]
    fn test_process_request_apply_validates() {
        let base = PipelineConfig::default();

        let config = ProcessRequest {
            size: Some(512),
            ..Default::default()
        }
        .apply(&base)
        .unwrap();
        assert_eq!(config.size, 512);
        assert_eq!(config.pad, base.pad);

        let err = ProcessRequest {
            size: Some(100),
            ..Default::default()
        }
        .apply(&base)
        .unwrap_err();
        assert!(err.is_client_error());

        let err = ProcessRequest {
            pad: Some(0.7),
            ..Default::default()
        }
        .apply(&base)
        .unwrap_err();
        assert!(err.to_string().contains("pad ratio"));
    }

    #[test]
    fn test_config_serde_roundtrip_names() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["output_format"], "jpeg");
        assert_eq!(json["padding_policy"], "fixed-canvas");
    }
}
