//! Pipeline observability hook
//!
//! The processor reports per-stage durations and a handful of gauges
//! (canvas bytes, input dimensions) through [`PipelineObserver`]. The
//! default observer discards everything; binaries install
//! [`TracingObserver`] to turn them into tracing events.

use crate::types::PipelineTimings;
use std::fmt;

/// Stages of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Decoding the uploaded bytes
    Decode,
    /// Bounding the input before inference
    PreResize,
    /// Background remover call
    Inference,
    /// Crop, pad and centre on the canvas
    Compose,
    /// Drop shadow synthesis
    Shadow,
    /// Bounding the final canvas
    PostResize,
    /// JPEG/PNG serialization
    Encode,
    /// Run finished
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Decode => "Decoding input image",
            ProcessingStage::PreResize => "Resizing input",
            ProcessingStage::Inference => "Removing background",
            ProcessingStage::Compose => "Composing canvas",
            ProcessingStage::Shadow => "Adding drop shadow",
            ProcessingStage::PostResize => "Resizing output",
            ProcessingStage::Encode => "Encoding output",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Stable metric key
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Decode => "decode",
            ProcessingStage::PreResize => "pre_resize",
            ProcessingStage::Inference => "inference",
            ProcessingStage::Compose => "compose",
            ProcessingStage::Shadow => "shadow",
            ProcessingStage::PostResize => "post_resize",
            ProcessingStage::Encode => "encode",
            ProcessingStage::Completed => "completed",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of pipeline counters and gauges
pub trait PipelineObserver: Send + Sync {
    /// A stage finished after `elapsed_ms`
    fn record_stage(&self, stage: ProcessingStage, elapsed_ms: u64);

    /// A point-in-time measurement, e.g. `canvas_bytes`
    fn record_gauge(&self, name: &'static str, value: u64);

    /// The run finished with these timings
    fn report_completion(&self, timings: &PipelineTimings) {
        drop(timings);
    }

    /// The run failed during `stage`
    fn report_error(&self, stage: ProcessingStage, error: &str) {
        drop((stage, error));
    }
}

/// Observer that discards all measurements
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl PipelineObserver for NoOpObserver {
    fn record_stage(&self, _stage: ProcessingStage, _elapsed_ms: u64) {}

    fn record_gauge(&self, _name: &'static str, _value: u64) {}
}

/// Observer that emits tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn record_stage(&self, stage: ProcessingStage, elapsed_ms: u64) {
        tracing::debug!(
            stage = %stage,
            elapsed_ms,
            "{}",
            stage.description()
        );
    }

    fn record_gauge(&self, name: &'static str, value: u64) {
        tracing::debug!(gauge = name, value, "gauge");
    }

    fn report_completion(&self, timings: &PipelineTimings) {
        tracing::info!(
            total_ms = timings.total_ms,
            inference_ms = timings.inference_ms,
            "{}",
            timings.summary()
        );
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        tracing::warn!(stage = %stage, error, "pipeline stage failed");
    }
}
