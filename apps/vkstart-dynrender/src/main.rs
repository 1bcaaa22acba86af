//! Dynamic rendering Vulkan sample.
//!
//! Draws a triangle with `vkCmdBeginRendering` and explicit image layout
//! barriers instead of a render pass. Requires a Vulkan 1.3 device.
//!
//! Takes the same options and keys as `vkstart-minimal`.

use clap::Parser;
use vkstart_app::{run_sample, AppConfig, RenderPath, SampleArgs};

fn main() -> anyhow::Result<()> {
    let args = SampleArgs::parse();
    run_sample(
        AppConfig::new("Dynamic rendering vulkan sample")
            .with_render_path(RenderPath::DynamicRendering)
            .with_args(&args),
    )
}
