//! The presentation engine: image chain, frame slots and chain recreation.

pub mod chain;
pub mod device;
pub mod engine;
pub mod error;
pub mod recreate;
pub mod sync;
pub mod vulkan;

#[cfg(test)]
pub mod fake;

pub use engine::{FrameContext, FrameStatus, PresentationEngine};
pub use error::{PresentError, PresentResult};
