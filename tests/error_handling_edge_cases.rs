//! Error handling and edge case testing
//!
//! Covers the error kinds surfaced to callers, parameter boundaries and
//! degenerate geometry that must never fail.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use packshot::{
    backends::MockRemover,
    compositor::{CompositeOptions, Compositor},
    config::{OutputFormat, PaddingPolicy, PipelineConfig, ProcessRequest},
    error::{PackshotError, Result},
    processor::PackshotProcessor,
    services::OutputFormatHandler,
    utils::Resizer,
};
use std::sync::Arc;

fn png_bytes(image: RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

fn passthrough(config: PipelineConfig) -> Result<PackshotProcessor> {
    PackshotProcessor::new(config, Arc::new(MockRemover::passthrough()))
}

#[test]
fn test_size_boundaries() -> Result<()> {
    for size in [256, 1400, 3000] {
        assert!(PipelineConfig::builder().size(size).build().is_ok(), "size {size}");
    }

    for size in [0, 255, 3001, u32::MAX] {
        let err = PipelineConfig::builder().size(size).build().unwrap_err();
        assert!(matches!(err, PackshotError::InvalidParameter(_)));
        assert!(err.to_string().contains("size"));
        assert_eq!(err.status_code(), 400);
    }
    Ok(())
}

#[test]
fn test_pad_boundaries_per_policy() {
    let fixed = |pad| {
        PipelineConfig::builder()
            .padding_policy(PaddingPolicy::FixedCanvas)
            .pad(pad)
            .build()
    };
    let content = |pad| {
        PipelineConfig::builder()
            .padding_policy(PaddingPolicy::ContentDriven)
            .pad(pad)
            .build()
    };

    assert!(fixed(0.0).is_ok());
    assert!(fixed(0.6).is_ok());
    assert!(fixed(0.61).is_err());
    assert!(fixed(-0.01).is_err());
    assert!(fixed(f64::NAN).is_err());

    assert!(content(1.0).is_ok());
    assert!(content(1.01).is_err());
}

#[test]
fn test_request_parse_errors() {
    let mut request = ProcessRequest::default();
    let invalid = [
        ("size", "big"),
        ("size", "-5"),
        ("pad", "wide"),
        ("format", "webp"),
        ("quality", "high"),
    ];
    for (name, value) in invalid {
        let err = request.set_field(name, value).unwrap_err();
        assert!(err.is_client_error(), "{name}={value}");
    }

    assert!(request.set_field("color", "red").is_ok(), "unknown fields are ignored");
    assert!(request.set_field("quality", "-40").is_ok());
    assert_eq!(request.quality, Some(60));
    assert!(request.set_field("quality", "1000").is_ok());
    assert_eq!(request.quality, Some(95));
}

#[test]
fn test_request_validated_before_processing() -> Result<()> {
    let mut request = ProcessRequest::default();
    request.set_field("pad", "0.9")?;

    let err = request.apply(&PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, PackshotError::InvalidParameter(_)));
    assert!(err.to_string().contains("pad ratio"));
    Ok(())
}

#[test]
fn test_empty_and_garbage_uploads() -> Result<()> {
    let processor = passthrough(PipelineConfig::default())?;

    let err = processor.process_bytes(&[]).unwrap_err();
    assert!(matches!(err, PackshotError::EmptyInput));
    assert_eq!(err.status_code(), 400);

    let err = processor.process_bytes(b"GIF89a but not really").unwrap_err();
    assert!(matches!(err, PackshotError::Decode(_)));
    assert_eq!(err.status_code(), 400);

    // valid PNG signature, truncated body
    let mut truncated = png_bytes(RgbaImage::new(32, 32))?;
    truncated.truncate(20);
    assert!(matches!(
        processor.process_bytes(&truncated).unwrap_err(),
        PackshotError::Decode(_)
    ));
    Ok(())
}

#[test]
fn test_inference_failure_is_server_error_with_detail() -> Result<()> {
    let processor = PackshotProcessor::new(
        PipelineConfig::default(),
        Arc::new(MockRemover::failing("CUDA out of memory")),
    )?;

    let err = processor
        .process_bytes(&png_bytes(RgbaImage::from_pixel(64, 64, Rgba([1, 2, 3, 255])))?)
        .unwrap_err();
    assert!(matches!(err, PackshotError::Inference(_)));
    assert!(err.to_string().contains("CUDA out of memory"));
    assert!(!err.is_client_error());
    assert_eq!(err.status_code(), 500);
    Ok(())
}

#[test]
fn test_all_transparent_foreground_every_variant() -> Result<()> {
    let input = png_bytes(RgbaImage::new(120, 80))?;

    for policy in [PaddingPolicy::FixedCanvas, PaddingPolicy::ContentDriven] {
        for format in [OutputFormat::Jpeg, OutputFormat::Png] {
            for shadow in [true, false] {
                let mut config = PipelineConfig::builder()
                    .size(256)
                    .padding_policy(policy)
                    .output_format(format)
                    .build()?;
                if !shadow {
                    config.shadow = None;
                }

                let result = passthrough(config)?.process_bytes(&input)?;
                assert!(result.bounding_box.is_none());
                assert!(!result.encoded.is_empty());
            }
        }
    }
    Ok(())
}

#[test]
fn test_single_pixel_subject() -> Result<()> {
    let mut image = RgbaImage::new(300, 300);
    image.put_pixel(299, 0, Rgba([0, 0, 0, 255]));

    let config = PipelineConfig::builder()
        .size(256)
        .padding_policy(PaddingPolicy::ContentDriven)
        .pad(0.0)
        .output_format(OutputFormat::Png)
        .shadow(None)
        .build()?;
    let result = passthrough(config)?.process_bytes(&png_bytes(image)?)?;

    // the subject survives pre-resize as at least one pixel; zero padding keeps the canvas tiny
    assert!(result.dimensions.0 >= 1 && result.dimensions.0 <= 8);
    Ok(())
}

#[test]
fn test_extreme_aspect_ratio_contain() {
    let strip = RgbaImage::from_pixel(2000, 3, Rgba([10, 10, 10, 255]));
    let canvas = Compositor::compose(&strip, &CompositeOptions::fixed_canvas(512, 0.3));
    assert_eq!(canvas.dimensions(), (512, 512));

    let (w, h) = Compositor::contain_dimensions(2000, 3, 358, 358);
    assert_eq!(w, 358);
    assert!(h >= 1);
}

#[test]
fn test_resize_zero_bound_is_noop() {
    let image = DynamicImage::ImageRgba8(RgbaImage::new(5000, 10));
    let resized = Resizer::resize_max_dimension(&image, 0);
    assert_eq!((resized.width(), resized.height()), (5000, 10));
}

#[test]
fn test_jpeg_never_has_alpha() -> Result<()> {
    let translucent = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 255, 128]));
    for quality in [0, 60, 92, 95, 255] {
        let encoded = OutputFormatHandler::encode(&translucent, OutputFormat::Jpeg, quality)?;
        let decoded = image::load_from_memory(&encoded.bytes)?;
        assert!(!decoded.color().has_alpha());
    }
    Ok(())
}
