//! Sample configuration and command line flags.

use std::path::PathBuf;

use clap::Parser;
use vkstart_core::constants::{INITIAL_WINDOW_HEIGHT, INITIAL_WINDOW_WIDTH};
use vkstart_core::SampleFlags;
use vkstart_gpu::RenderPath;
use vkstart_platform::PlatformConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    pub flags: SampleFlags,
    /// How the triangle is drawn.
    pub render_path: RenderPath,
    /// Load `base.vert.spv` and `base.frag.spv` from here instead of the
    /// embedded shaders.
    pub shader_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "vkstart".to_string(),
            width: INITIAL_WINDOW_WIDTH,
            height: INITIAL_WINDOW_HEIGHT,
            flags: SampleFlags::sample_defaults(),
            render_path: RenderPath::RenderPass,
            shader_dir: None,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_flags(mut self, flags: SampleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_render_path(mut self, path: RenderPath) -> Self {
        self.render_path = path;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    /// Apply command line overrides.
    pub fn with_args(mut self, args: &SampleArgs) -> Self {
        if args.fullscreen {
            self.flags |= SampleFlags::FULLSCREEN;
        }
        if args.discrete_gpu {
            self.flags |= SampleFlags::USE_DISCRETE_GPU;
        }
        if args.validation {
            self.flags |= SampleFlags::VALIDATION_LAYERS;
        }
        if args.no_validation {
            self.flags -= SampleFlags::VALIDATION_LAYERS;
        }
        if args.no_vsync {
            self.flags -= SampleFlags::ENABLE_VSYNC;
        }
        if let Some(dir) = &args.shader_dir {
            self.shader_dir = Some(dir.clone());
        }
        self
    }

    /// Whether the device must support dynamic rendering.
    pub fn needs_dynamic_rendering(&self) -> bool {
        self.render_path == RenderPath::DynamicRendering
    }

    /// Window settings for this sample.
    pub fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: true,
            fullscreen: self.flags.fullscreen(),
        }
    }
}

/// Command line flags shared by the samples.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about = "Vulkan sample")]
pub struct SampleArgs {
    /// Start in borderless fullscreen
    #[arg(long)]
    pub fullscreen: bool,

    /// Enable the Khronos validation layer (default in debug builds)
    #[arg(long, conflicts_with = "no_validation")]
    pub validation: bool,

    /// Disable the Khronos validation layer
    #[arg(long)]
    pub no_validation: bool,

    /// Only run on a discrete GPU
    #[arg(long)]
    pub discrete_gpu: bool,

    /// Present without waiting for vertical blank
    #[arg(long)]
    pub no_vsync: bool,

    /// Directory containing base.vert.spv and base.frag.spv
    #[arg(long, value_name = "DIR")]
    pub shader_dir: Option<PathBuf>,
}
