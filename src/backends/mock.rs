//! Deterministic remover for tests, benchmarks and model-less runs

use crate::error::{PackshotError, Result};
use crate::inference::BackgroundRemover;
use crate::services::ImageIOService;
use image::Rgba;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Behaviour of a [`MockRemover`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockMode {
    /// Return the input unchanged (as RGBA PNG), keeping any existing alpha
    Passthrough,
    /// Make pixels whose RGB channels are all `>= threshold` transparent
    ChromaKey { threshold: u8 },
    /// Fail every call with an inference error
    Failing(String),
}

/// Test double for the segmentation model
#[derive(Debug)]
pub struct MockRemover {
    mode: MockMode,
    calls: AtomicUsize,
}

impl MockRemover {
    #[must_use]
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(MockMode::Passthrough)
    }

    /// Treat near-white as background
    #[must_use]
    pub fn chroma_key(threshold: u8) -> Self {
        Self::new(MockMode::ChromaKey { threshold })
    }

    #[must_use]
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::new(MockMode::Failing(message.into()))
    }

    /// Number of `remove_background` calls so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BackgroundRemover for MockRemover {
    fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let MockMode::Failing(message) = &self.mode {
            return Err(PackshotError::inference(message.clone()));
        }

        let mut rgba = ImageIOService::decode_bytes(image_bytes)
            .map_err(|e| PackshotError::inference(format!("Remover could not read input: {e}")))?
            .to_rgba8();

        if let MockMode::ChromaKey { threshold } = self.mode {
            for pixel in rgba.pixels_mut() {
                if pixel[0] >= threshold && pixel[1] >= threshold && pixel[2] >= threshold {
                    *pixel = Rgba([0, 0, 0, 0]);
                }
            }
        }

        ImageIOService::encode_png_rgba(&rgba)
    }

    fn name(&self) -> &str {
        match self.mode {
            MockMode::Passthrough => "mock:passthrough",
            MockMode::ChromaKey { .. } => "mock:chroma-key",
            MockMode::Failing(_) => "mock:failing",
        }
    }
}
