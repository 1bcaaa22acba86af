//! Core types and constants shared by the vkstart samples.
//!
//! This crate provides:
//! - Sample feature flags
//! - Frame statistics
//! - The window abstraction consumed by the presentation engine

pub mod flags;
pub mod stats;
pub mod window;

pub use flags::SampleFlags;
pub use stats::{FpsReport, FrameStats};
pub use window::DrawableWindow;

/// Sample-wide constants
pub mod constants {
    /// Initial (and restored windowed) window width in pixels
    pub const INITIAL_WINDOW_WIDTH: u32 = 1024;
    /// Initial (and restored windowed) window height in pixels
    pub const INITIAL_WINDOW_HEIGHT: u32 = 768;
    /// Number of frames the CPU may record ahead of the GPU
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
}
