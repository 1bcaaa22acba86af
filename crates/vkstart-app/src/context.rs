//! Per-sample Vulkan state.

use std::path::Path;
use std::time::Instant;

use vkstart_core::FrameStats;
use vkstart_gpu::{
    load_spirv, BuildStatus, FrameExecutor, FrameOutcome, GpuContext, GpuContextBuilder,
    PresentDevice, ShaderPair, TrianglePipeline,
};
use vkstart_platform::SampleWindow;

use crate::config::AppConfig;

/// Everything a rendering sample owns.
///
/// Fields are dropped in declaration order: the GPU context must go before the
/// window its surface was created from.
pub struct SampleContext {
    gpu: GpuContext,
    executor: FrameExecutor,
    pipeline: TrianglePipeline,
    stats: FrameStats,
    window: SampleWindow,
}

impl SampleContext {
    /// Bring up the device, pipeline and first swapchain for `window`.
    pub fn new(window: SampleWindow, config: &AppConfig) -> anyhow::Result<Self> {
        let gpu = GpuContextBuilder::new()
            .app_name(&config.title)
            .flags(config.flags)
            .dynamic_rendering(config.needs_dynamic_rendering())
            .build(&window)?;

        tracing::info!("GPU: {}", gpu.adapter().summary());

        let shaders = load_shaders(config.shader_dir.as_deref())?;
        // SAFETY: the device outlives the pipeline, which is destroyed in `Drop`.
        // Dynamic rendering was requested from the builder when needed.
        let mut pipeline = unsafe {
            TrianglePipeline::new(
                gpu.device(),
                config.render_path,
                gpu.surface_format().format,
                &shaders,
            )
        }?;

        let executor = match FrameExecutor::new(&gpu, pipeline.render_pass(), &window) {
            Ok(executor) => executor,
            Err(e) => {
                // SAFETY: nothing has been submitted yet.
                unsafe { pipeline.destroy() };
                return Err(e.into());
            }
        };

        if let Some(state) = executor.swapchain().state() {
            tracing::info!(
                "Swapchain ready: {}x{}, {} images, {:?}",
                state.extent.width,
                state.extent.height,
                state.image_count,
                state.present_mode
            );
        }

        Ok(Self {
            gpu,
            executor,
            pipeline,
            stats: FrameStats::new(),
            window,
        })
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Draw one frame and count it if it reached the screen.
    pub fn draw_frame(&mut self) -> anyhow::Result<FrameOutcome> {
        let outcome = self
            .executor
            .draw_frame(&self.gpu, &mut self.pipeline, &self.window)?;
        if matches!(outcome, FrameOutcome::Presented { .. }) {
            self.stats.tick(Instant::now());
        }
        Ok(outcome)
    }

    /// The window changed size; rebuild before the next frame.
    pub fn request_rebuild(&mut self) {
        self.executor.request_rebuild();
    }

    pub fn toggle_fullscreen(&mut self) -> anyhow::Result<BuildStatus> {
        Ok(self
            .executor
            .toggle_fullscreen(&self.gpu, &mut self.window)?)
    }
}

impl Drop for SampleContext {
    fn drop(&mut self) {
        tracing::info!("Starting cleanup...");
        if let Err(e) = self.executor.shutdown(&self.gpu) {
            tracing::error!("Failed to shut down frame executor: {e}");
        }
        // SAFETY: the executor waited for the device and destroyed the
        // framebuffers referencing the render pass.
        unsafe { self.pipeline.destroy() };
        tracing::info!(
            "Cleanup complete after {} frames",
            self.stats.frame_number()
        );
    }
}

/// Embedded shaders, or `base.vert.spv` and `base.frag.spv` from `dir`.
pub fn load_shaders(dir: Option<&Path>) -> vkstart_gpu::Result<ShaderPair> {
    match dir {
        Some(dir) => {
            tracing::info!("Loading shaders from {}", dir.display());
            Ok(ShaderPair {
                vertex: load_spirv(&dir.join(vkstart_shaders::BASE_VERTEX_FILE))?,
                fragment: load_spirv(&dir.join(vkstart_shaders::BASE_FRAGMENT_FILE))?,
            })
        }
        None => Ok(ShaderPair {
            vertex: vkstart_shaders::base_vertex().to_vec(),
            fragment: vkstart_shaders::base_fragment().to_vec(),
        }),
    }
}
