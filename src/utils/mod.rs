//! Image utilities shared by the pipeline and the inference backend

pub mod preprocessing;
pub mod resize;

pub use preprocessing::{ImagePreprocessor, LetterboxTransform, PreprocessingOptions};
pub use resize::{Resizer, RESIZE_FILTER};
