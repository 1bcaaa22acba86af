//! Minimal Vulkan sample.
//!
//! Draws a triangle through a single-subpass render pass with one framebuffer
//! per swapchain image.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkstart-minimal -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--fullscreen`: Start in borderless fullscreen
//! - `--validation` / `--no-validation`: Toggle the Khronos validation layer
//! - `--discrete-gpu`: Refuse integrated GPUs
//! - `--no-vsync`: Prefer immediate presentation
//! - `--shader-dir <DIR>`: Load `base.vert.spv` and `base.frag.spv` from `DIR`
//!
//! ## Keys
//!
//! - `Escape`: Quit
//! - `F`: Toggle fullscreen
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log filter, e.g. `RUST_LOG=vkstart_gpu=debug`

use clap::Parser;
use vkstart_app::{run_sample, AppConfig, RenderPath, SampleArgs};

fn main() -> anyhow::Result<()> {
    let args = SampleArgs::parse();
    run_sample(
        AppConfig::new("Minimal vulkan sample")
            .with_render_path(RenderPath::RenderPass)
            .with_args(&args),
    )
}
