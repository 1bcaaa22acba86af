//! Command recording helpers.

use crate::error::Result;
use ash::vk;

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid and the buffer not recording.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    // SAFETY: guaranteed by the caller.
    unsafe { device.begin_command_buffer(cmd, &begin_info) }?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid and the buffer recording.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    // SAFETY: guaranteed by the caller.
    unsafe { device.end_command_buffer(cmd) }?;
    Ok(())
}

/// The whole color subresource of a single-level image.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .level_count(1)
        .layer_count(1)
}

/// Stage at which a frame's submission waits for its image to be acquired.
pub const ACQUIRE_WAIT_STAGE: vk::PipelineStageFlags =
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;

/// Barrier moving a swapchain image from an undefined layout to color
/// attachment. Previous contents are discarded.
///
/// The source stage matches [`ACQUIRE_WAIT_STAGE`] so the layout transition
/// happens after the acquire semaphore wait.
pub fn to_color_attachment(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE | vk::AccessFlags2::COLOR_ATTACHMENT_READ,
        )
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .image(image)
        .subresource_range(color_subresource_range())
}

/// Barrier handing a rendered image over to presentation.
pub fn to_present_src(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::NONE)
        .dst_access_mask(vk::AccessFlags2::NONE)
        .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .image(image)
        .subresource_range(color_subresource_range())
}

/// Record a single image barrier.
///
/// # Safety
/// The command buffer must be recording and synchronization2 enabled.
pub unsafe fn image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    barrier: vk::ImageMemoryBarrier2<'_>,
) {
    let barriers = [barrier];
    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    // SAFETY: guaranteed by the caller.
    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}

/// Viewport and scissor covering `extent`.
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    };
    (viewport, scissor)
}
