//! Service layer
//!
//! Decoding, encoding and observability live here, apart from the
//! compositing logic.

pub mod format;
pub mod io;
pub mod metrics;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use metrics::{NoOpObserver, PipelineObserver, ProcessingStage, TracingObserver};
