//! Background remover implementations
//!
//! - Tract remover (pure Rust ONNX inference, feature `tract`)
//! - Mock remover (deterministic, no model required)

pub mod mock;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::{MockMode, MockRemover};

#[cfg(feature = "tract")]
pub use self::tract::TractRemover;
