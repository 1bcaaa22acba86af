//! Beginner Vulkan sample.
//!
//! Opens a window, creates a Vulkan instance with the extensions the window
//! system needs and waits for any key.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkstart-beginner -- [--fullscreen] [--validation]
//! ```

use clap::Parser;
use vkstart_app::{run_probe, AppConfig, SampleArgs};

fn main() -> anyhow::Result<()> {
    let args = SampleArgs::parse();
    run_probe(AppConfig::new("Beginner vulkan sample").with_args(&args))
}
