#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Packshot
//!
//! Product photo cleanup: remove the background of an arbitrary photo and
//! place the subject, padded and centred, on a white square canvas with an
//! optional soft drop shadow.
//!
//! ```text
//! decode -> resize(size) -> remove background -> compose -> [shadow] -> resize(size) -> encode
//! ```
//!
//! ## Features
//!
//! - **Two padding policies**: a fixed `size x size` canvas with the subject
//!   contained in the inner box, or a canvas that grows with the subject
//! - **Pluggable remover**: any [`BackgroundRemover`]; the Tract ONNX remover
//!   is pure Rust, the mock remover needs no model
//! - **JPEG or PNG output**: JPEG is always flattened onto white
//! - **Shared session**: the model is loaded once and reused across requests
//! - **CLI and HTTP service**: `cli` and `server` features
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use packshot::{PackshotProcessor, PipelineConfig, OutputFormat, TractRemover};
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let remover = Arc::new(TractRemover::from_path("models/isnet/model.onnx")?);
//! let config = PipelineConfig::builder()
//!     .size(1400)
//!     .pad(0.3)
//!     .output_format(OutputFormat::Jpeg)
//!     .build()?;
//!
//! let processor = PackshotProcessor::new(config, remover)?;
//! let result = processor.process_file("shoe.jpg")?;
//! result.save("shoe_packshot.jpg")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust ONNX inference
//! - `cli` (default): the `packshot` binary
//! - `server` (default): axum HTTP service
//! - `tracing-json`: JSON log output for the binaries

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
#[cfg(feature = "server")]
pub mod server;
pub mod services;
pub mod session;
pub mod shadow;
#[cfg(any(feature = "cli", feature = "server"))]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::sync::Arc;

// Public API exports
pub use backends::*;
pub use compositor::{CompositeOptions, Compositor, Layout};
pub use config::{
    OutputFormat, PaddingPolicy, PipelineConfig, PipelineConfigBuilder, ProcessRequest,
    ShadowConfig,
};
pub use error::{PackshotError, Result};
pub use inference::BackgroundRemover;
pub use models::{ModelManager, PreprocessingConfig};
pub use processor::PackshotProcessor;
pub use services::{
    ImageIOService, NoOpObserver, OutputFormatHandler, PipelineObserver, ProcessingStage,
    TracingObserver,
};
pub use session::RemoverSession;
pub use shadow::ShadowSynthesizer;
pub use types::{AlphaMask, BoundingBox, EncodedImage, PackshotResult, PipelineTimings};
pub use utils::{ImagePreprocessor, Resizer};

#[cfg(any(feature = "cli", feature = "server"))]
pub use tracing_config::{init_cli_tracing, init_server_tracing, TracingConfig, TracingFormat};

/// Run the full pipeline once on uploaded bytes
///
/// Convenience wrapper for callers that do not keep a [`PackshotProcessor`].
///
/// # Examples
///
/// ```rust
/// use packshot::{process_bytes, MockRemover, OutputFormat, PipelineConfig};
/// use std::sync::Arc;
///
/// # fn example(upload: &[u8]) -> packshot::Result<()> {
/// let config = PipelineConfig::builder()
///     .size(512)
///     .output_format(OutputFormat::Png)
///     .build()?;
/// let result = process_bytes(upload, &config, Arc::new(MockRemover::passthrough()))?;
/// assert_eq!(result.encoded.media_type(), "image/png");
/// # Ok(())
/// # }
/// ```
pub fn process_bytes(
    image_bytes: &[u8],
    config: &PipelineConfig,
    remover: Arc<dyn BackgroundRemover>,
) -> Result<PackshotResult> {
    PackshotProcessor::new(config.clone(), remover)?.process_bytes(image_bytes)
}

/// Async variant of [`process_bytes`] using a shared session
///
/// The remover is initialized on first use and the CPU-bound pipeline runs
/// on the blocking thread pool.
pub async fn process_bytes_async(
    image_bytes: Vec<u8>,
    config: PipelineConfig,
    session: &RemoverSession,
) -> Result<PackshotResult> {
    let remover = session.get().await?;
    let processor = PackshotProcessor::new(config, remover)?;
    tokio::task::spawn_blocking(move || processor.process_bytes(&image_bytes))
        .await
        .map_err(|e| PackshotError::internal(format!("processing task failed: {e}")))?
}
