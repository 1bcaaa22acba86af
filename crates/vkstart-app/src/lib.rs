//! Sample runner for the vkstart samples.
//!
//! Handles the boilerplate every sample shares:
//! - Logging setup
//! - Command line flags
//! - Window, device and swapchain creation
//! - The event loop (Escape quits, F toggles fullscreen)
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use vkstart_app::{run_sample, AppConfig, RenderPath, SampleArgs};
//!
//! fn main() -> anyhow::Result<()> {
//!     let args = SampleArgs::parse();
//!     run_sample(
//!         AppConfig::new("Triangle")
//!             .with_render_path(RenderPath::DynamicRendering)
//!             .with_args(&args),
//!     )
//! }
//! ```

mod config;
mod context;
mod runner;

pub use config::{AppConfig, SampleArgs};
pub use context::{load_shaders, SampleContext};
pub use runner::{command_for_key, init_logging, run_probe, run_sample, SampleCommand};

// Re-export commonly used types for convenience
pub use vkstart_core::SampleFlags;
pub use vkstart_gpu::{GpuContext, GpuContextBuilder, RenderPath};
