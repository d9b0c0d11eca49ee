//! Packshot pipeline
//!
//! decode -> resize(size) -> remove background -> compose -> [shadow]
//! -> resize(size) -> encode
//!
//! Every stage is timed and reported to the configured observer. The
//! processor holds no per-request state, so one instance can serve
//! concurrent calls.

use crate::{
    compositor::{CompositeOptions, Compositor},
    config::PipelineConfig,
    error::{PackshotError, Result},
    inference::BackgroundRemover,
    services::{ImageIOService, NoOpObserver, OutputFormatHandler, PipelineObserver, ProcessingStage},
    shadow::ShadowSynthesizer,
    types::{BoundingBox, EncodedImage, PackshotResult, PipelineTimings},
    utils::Resizer,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, span, Level};

/// Product photo pipeline around a shared background remover
#[derive(Clone)]
pub struct PackshotProcessor {
    config: PipelineConfig,
    remover: Arc<dyn BackgroundRemover>,
    observer: Arc<dyn PipelineObserver>,
}

impl std::fmt::Debug for PackshotProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackshotProcessor")
            .field("config", &self.config)
            .field("remover", &self.remover.name())
            .finish_non_exhaustive()
    }
}

impl PackshotProcessor {
    /// Create a processor, validating the configuration up front
    ///
    /// # Errors
    /// - `InvalidParameter` when the configuration is out of range
    pub fn new(config: PipelineConfig, remover: Arc<dyn BackgroundRemover>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            remover,
            observer: Arc::new(NoOpObserver),
        })
    }

    /// Replace the observability hook
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Same remover and observer with different parameters
    ///
    /// # Errors
    /// - `InvalidParameter` when the configuration is out of range
    pub fn with_config(&self, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            remover: Arc::clone(&self.remover),
            observer: Arc::clone(&self.observer),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn remover_name(&self) -> &str {
        self.remover.name()
    }

    /// Run the whole pipeline on an uploaded image
    ///
    /// # Errors
    /// - `EmptyInput` / `Decode` for unusable uploads
    /// - `Inference` when the remover fails or returns an unreadable image
    /// - `Image` when encoding fails
    #[instrument(
        skip(self, image_bytes),
        fields(
            remover = %self.remover.name(),
            bytes = image_bytes.len(),
            size = self.config.size,
            policy = ?self.config.padding_policy,
            format = %self.config.output_format
        )
    )]
    pub fn process_bytes(&self, image_bytes: &[u8]) -> Result<PackshotResult> {
        let total_start = Instant::now();
        let mut timings = PipelineTimings::new();

        let image = self.run_stage(ProcessingStage::Decode, &mut timings.decode_ms, || {
            ImageIOService::decode_bytes(image_bytes)
        })?;

        self.finish(image, timings, total_start)
    }

    /// Run the pipeline on an already decoded image
    ///
    /// # Errors
    /// - `Inference` when the remover fails or returns an unreadable image
    /// - `Image` when encoding fails
    pub fn process_image(&self, image: &DynamicImage) -> Result<PackshotResult> {
        self.finish(image.clone(), PipelineTimings::new(), Instant::now())
    }

    /// Read and process an image file
    ///
    /// # Errors
    /// - `Io` when the file cannot be read
    /// - everything [`PackshotProcessor::process_bytes`] returns
    pub fn process_file<P: AsRef<Path>>(&self, input_path: P) -> Result<PackshotResult> {
        let data = ImageIOService::read_file(input_path)?;
        self.process_bytes(&data)
    }

    fn finish(
        &self,
        image: DynamicImage,
        mut timings: PipelineTimings,
        total_start: Instant,
    ) -> Result<PackshotResult> {
        let original_dimensions = image.dimensions();
        self.observer
            .record_gauge("input_pixels", u64::from(original_dimensions.0) * u64::from(original_dimensions.1));

        let image = {
            let _span = span!(Level::DEBUG, "pre_resize", bound = self.config.size).entered();
            self.run_stage(ProcessingStage::PreResize, &mut timings.pre_resize_ms, || {
                Ok(Resizer::resize_max_dimension(&image, self.config.size))
            })?
        };

        let foreground = {
            let _span = span!(Level::INFO, "inference", remover = %self.remover.name()).entered();
            self.run_stage(ProcessingStage::Inference, &mut timings.inference_ms, || {
                self.remove_background(&image)
            })?
        };

        let (canvas, bounding_box) = self.composite_foreground(&foreground, &mut timings);
        self.observer
            .record_gauge("canvas_bytes", canvas.as_raw().len() as u64);

        let canvas = {
            let _span = span!(Level::DEBUG, "post_resize", bound = self.config.size).entered();
            self.run_stage(ProcessingStage::PostResize, &mut timings.post_resize_ms, || {
                Ok(Resizer::resize_rgba_max_dimension(canvas, self.config.size))
            })?
        };
        let dimensions = canvas.dimensions();

        let encoded = {
            let _span = span!(Level::DEBUG, "encode", format = %self.config.output_format).entered();
            self.run_stage(ProcessingStage::Encode, &mut timings.encode_ms, || {
                self.encode(&canvas)
            })?
        };
        self.observer
            .record_gauge("output_bytes", encoded.len() as u64);

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        self.observer.record_stage(ProcessingStage::Completed, timings.total_ms);
        self.observer.report_completion(&timings);

        debug!(
            width = dimensions.0,
            height = dimensions.1,
            bytes = encoded.len(),
            "Packshot ready"
        );

        Ok(PackshotResult {
            encoded,
            dimensions,
            original_dimensions,
            bounding_box,
            timings,
        })
    }

    /// Round-trip through the remover's PNG wire format
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let input_png = ImageIOService::encode_png_rgba(&image.to_rgba8())?;
        let output = self.remover.remove_background(&input_png)?;

        ImageIOService::decode_bytes(&output)
            .map(|decoded| decoded.to_rgba8())
            .map_err(|e| PackshotError::inference(format!("Remover returned an unreadable image: {e}")))
    }

    /// Crop, pad, centre and optionally shadow a cut-out onto an opaque canvas
    ///
    /// Degenerate input (fully transparent) never fails; the whole image is used.
    pub fn composite_foreground(
        &self,
        foreground: &RgbaImage,
        timings: &mut PipelineTimings,
    ) -> (RgbaImage, Option<BoundingBox>) {
        let options = CompositeOptions::from(&self.config);

        let compose_start = Instant::now();
        let layout = {
            let _span = span!(Level::DEBUG, "compose", policy = ?options.policy).entered();
            Compositor::layout(foreground, &options)
        };
        if layout.bounding_box.is_none() {
            debug!("Foreground fully transparent, using the whole image");
        }

        let canvas = match self.config.shadow {
            Some(shadow) => {
                timings.compose_ms = elapsed_ms(compose_start);
                self.observer
                    .record_stage(ProcessingStage::Compose, timings.compose_ms);

                let shadow_start = Instant::now();
                let canvas = {
                    let _span = span!(Level::DEBUG, "shadow", blur = shadow.blur_radius).entered();
                    ShadowSynthesizer::apply(&layout.canvas, &shadow, options.background)
                };
                let shadow_ms = elapsed_ms(shadow_start);
                timings.shadow_ms = Some(shadow_ms);
                self.observer.record_stage(ProcessingStage::Shadow, shadow_ms);
                canvas
            },
            None => {
                let canvas = Compositor::flatten(&layout.canvas, options.background);
                timings.compose_ms = elapsed_ms(compose_start);
                self.observer
                    .record_stage(ProcessingStage::Compose, timings.compose_ms);
                canvas
            },
        };

        (canvas, layout.bounding_box)
    }

    fn encode(&self, canvas: &RgbaImage) -> Result<EncodedImage> {
        OutputFormatHandler::encode(
            canvas,
            self.config.output_format,
            self.config.effective_jpeg_quality(),
        )
    }

    /// Time a fallible stage and report it
    fn run_stage<T>(
        &self,
        stage: ProcessingStage,
        slot: &mut u64,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        match f() {
            Ok(value) => {
                *slot = elapsed_ms(start);
                self.observer.record_stage(stage, *slot);
                Ok(value)
            },
            Err(e) => {
                self.observer.report_error(stage, &e.to_string());
                Err(e)
            },
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
