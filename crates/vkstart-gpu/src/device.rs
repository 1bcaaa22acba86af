//! The device seam used by the presentation engine.
//!
//! [`PresentDevice`] is the narrow set of device operations the swapchain
//! manager, frame pacer and frame executor need. [`crate::GpuContext`] is the
//! Vulkan implementation; tests drive the same code against a mock.

use crate::capabilities::DeviceFeatureSet;
use crate::error::Result;
use ash::vk;

/// A device queue and the family it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle {
    pub queue: vk::Queue,
    pub family: u32,
}

/// Queues provisioned for each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSet {
    pub graphics: QueueHandle,
    pub present: QueueHandle,
    pub transfer: QueueHandle,
}

impl QueueSet {
    /// Families that touch swapchain images, deduplicated.
    pub fn swapchain_families(&self) -> Vec<u32> {
        if self.graphics.family == self.present.family {
            vec![self.graphics.family]
        } else {
            vec![self.graphics.family, self.present.family]
        }
    }
}

/// Parameters for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Swapchain being replaced, or null.
    pub old_swapchain: vk::SwapchainKHR,
    /// More than one family selects concurrent sharing.
    pub queue_family_indices: Vec<u32>,
}

/// Result of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    pub suboptimal: bool,
}

/// A single graphics submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc {
    /// Null submits an empty batch.
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    /// Null signals nothing.
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// A single present request.
#[derive(Debug, Clone, Copy)]
pub struct PresentDesc {
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait_semaphore: vk::Semaphore,
    /// Signaled when the presentation engine releases the image.
    pub present_fence: Option<vk::Fence>,
    /// Present mode to switch to with this present.
    pub present_mode: Option<vk::PresentModeKHR>,
}

/// The image a frame renders into.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// Null when rendering without a render pass.
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

/// Device operations needed to drive presentation.
///
/// Implementations own every handle they hand out and must keep them valid
/// until the matching `destroy_*` call. All waits are unbounded.
pub trait PresentDevice {
    fn features(&self) -> DeviceFeatureSet;
    fn surface_format(&self) -> vk::SurfaceFormatKHR;
    fn present_mode(&self) -> vk::PresentModeKHR;
    fn queues(&self) -> QueueSet;

    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Block until every fence is signaled.
    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<()>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()>;

    fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>>;
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;

    /// Current surface capabilities, specialised for `present_mode` when the
    /// extended surface query is available.
    fn surface_capabilities(
        &self,
        present_mode: vk::PresentModeKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Acquire the next image, signaling `semaphore`.
    ///
    /// Returns [`crate::GpuError::SwapchainOutOfDate`] when no image was
    /// acquired because the swapchain no longer matches the surface.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> Result<AcquiredImage>;
    fn submit(&self, desc: &SubmitDesc) -> Result<()>;
    /// Queue a present. `Ok(true)` means suboptimal.
    fn present(&self, desc: &PresentDesc) -> Result<bool>;
    fn wait_idle(&self) -> Result<()>;
}

/// Records the commands for one frame.
pub trait FrameRecorder {
    /// Record into `command_buffer`, which has been reset and is not yet begun.
    fn record(&mut self, command_buffer: vk::CommandBuffer, target: &RenderTarget) -> Result<()>;
}
