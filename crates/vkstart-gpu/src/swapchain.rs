//! Swapchain management.
//!
//! [`SwapchainManager`] owns the presentable images and everything created per
//! image. Per-image resources are sized from the image count the driver
//! actually returned, never from the requested count.

use crate::device::{PresentDevice, RenderTarget, SwapchainDesc};
use crate::error::{GpuError, Result};
use ash::vk;

/// Host-side view of a presentation-complete fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentFenceState {
    /// Signaled, nothing queued against it.
    Signaled,
    /// Reset for the frame being recorded, not yet handed to a present.
    Unsignaled,
    /// Attached to a queued present.
    Pending,
}

/// One image of the swapchain and the objects created for it.
#[derive(Debug)]
pub struct PresentableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// Null without a render pass.
    pub framebuffer: vk::Framebuffer,
    /// Signaled by the frame's submission, waited on by its present.
    pub present_semaphore: vk::Semaphore,
    /// Only with presentation fences.
    pub present_fence: Option<vk::Fence>,
    fence_state: PresentFenceState,
}

impl PresentableImage {
    pub fn fence_state(&self) -> PresentFenceState {
        self.fence_state
    }

    /// Wait for any queued present of this image to retire, then reset the
    /// fence for the next present.
    pub fn prepare_reuse(&mut self, device: &impl PresentDevice) -> Result<()> {
        let Some(fence) = self.present_fence else {
            return Ok(());
        };

        match self.fence_state {
            PresentFenceState::Unsignaled => {}
            PresentFenceState::Pending | PresentFenceState::Signaled => {
                device.wait_for_fences(&[fence])?;
                device.reset_fences(&[fence])?;
                self.fence_state = PresentFenceState::Unsignaled;
            }
        }
        Ok(())
    }

    /// Record that a present carrying this image's fence was queued.
    pub fn mark_presented(&mut self) {
        if self.present_fence.is_some() {
            self.fence_state = PresentFenceState::Pending;
        }
    }

    /// Wait until a queued present of this image has retired.
    fn drain(&mut self, device: &impl PresentDevice) -> Result<()> {
        if let (Some(fence), PresentFenceState::Pending) = (self.present_fence, self.fence_state) {
            device.wait_for_fences(&[fence])?;
            self.fence_state = PresentFenceState::Signaled;
        }
        Ok(())
    }

    /// Nothing queued may still reference the image.
    fn destroy(self, device: &impl PresentDevice) {
        if let Some(fence) = self.present_fence {
            device.destroy_fence(fence);
        }
        device.destroy_semaphore(self.present_semaphore);
        destroy_target(device, self.view, self.framebuffer);
    }
}

fn destroy_target(device: &impl PresentDevice, view: vk::ImageView, framebuffer: vk::Framebuffer) {
    if framebuffer != vk::Framebuffer::null() {
        device.destroy_framebuffer(framebuffer);
    }
    device.destroy_image_view(view);
}

/// Live swapchain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainState {
    pub swapchain: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Images the driver actually created.
    pub image_count: u32,
    /// Minimum image count passed at creation.
    pub requested_image_count: u32,
}

/// Outcome of a build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// A swapchain with images is live.
    Ready,
    /// The drawable area is empty (minimized window); nothing was created.
    Deferred,
}

/// Target extent for a drawable size.
///
/// The live drawable size is clamped to the surface limits. The surface's
/// `current_extent` is only used when the drawable size is degenerate and the
/// driver reports a concrete extent rather than the `u32::MAX` sentinel.
pub fn swapchain_extent(caps: &vk::SurfaceCapabilitiesKHR, drawable: (u32, u32)) -> vk::Extent2D {
    let (width, height) = drawable;
    if (width == 0 || height == 0) && caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Requested image count: one more than the minimum, capped at the maximum.
/// A maximum of zero means unbounded.
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

/// Owns the swapchain and its per-image resources.
pub struct SwapchainManager {
    render_pass: vk::RenderPass,
    /// Live or retired swapchain handle, reused as `old_swapchain`.
    swapchain: vk::SwapchainKHR,
    state: Option<SwapchainState>,
    images: Vec<PresentableImage>,
}

impl SwapchainManager {
    /// `render_pass` is null when rendering without render passes; no
    /// framebuffers are created then.
    pub fn new(render_pass: vk::RenderPass) -> Self {
        Self {
            render_pass,
            swapchain: vk::SwapchainKHR::null(),
            state: None,
            images: Vec::new(),
        }
    }

    /// Parameters of the live swapchain, if any.
    pub fn state(&self) -> Option<&SwapchainState> {
        self.state.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn images(&self) -> &[PresentableImage] {
        &self.images
    }

    pub fn image(&self, index: u32) -> Option<&PresentableImage> {
        self.images.get(index as usize)
    }

    pub fn image_mut(&mut self, index: u32) -> Option<&mut PresentableImage> {
        self.images.get_mut(index as usize)
    }

    /// Render target for an acquired image.
    pub fn render_target(&self, index: u32) -> Option<RenderTarget> {
        let state = self.state?;
        self.image(index).map(|image| RenderTarget {
            image: image.image,
            view: image.view,
            framebuffer: image.framebuffer,
            extent: state.extent,
        })
    }

    /// Create the swapchain for the current drawable size.
    ///
    /// A previously retired swapchain is passed to the driver as the old
    /// swapchain and destroyed once the new one exists. On failure everything
    /// created by this call is destroyed and the manager is left as it was.
    pub fn build(
        &mut self,
        device: &impl PresentDevice,
        drawable: (u32, u32),
    ) -> Result<BuildStatus> {
        if !self.images.is_empty() {
            return Err(GpuError::InvalidState(
                "swapchain images are live; retire before building".into(),
            ));
        }

        let present_mode = device.present_mode();
        let caps = device.surface_capabilities(present_mode)?;
        let extent = swapchain_extent(&caps, drawable);
        if extent.width == 0 || extent.height == 0 {
            tracing::debug!("Drawable area is empty, deferring swapchain creation");
            return Ok(BuildStatus::Deferred);
        }

        let format = device.surface_format();
        let desc = SwapchainDesc {
            surface_format: format,
            present_mode,
            extent,
            min_image_count: image_count(&caps),
            pre_transform: caps.current_transform,
            old_swapchain: self.swapchain,
            queue_family_indices: device.queues().swapchain_families(),
        };

        let swapchain = device.create_swapchain(&desc)?;

        let images = match self.create_images(device, swapchain, format.format, extent) {
            Ok(images) => images,
            Err(e) => {
                device.destroy_swapchain(swapchain);
                return Err(e);
            }
        };

        if self.swapchain != vk::SwapchainKHR::null() {
            device.destroy_swapchain(self.swapchain);
        }

        let image_count = images.len() as u32;
        tracing::info!(
            "Swapchain created: {}x{}, {} images (requested {}), {:?}",
            extent.width,
            extent.height,
            image_count,
            desc.min_image_count,
            present_mode
        );

        self.swapchain = swapchain;
        self.images = images;
        self.state = Some(SwapchainState {
            swapchain,
            extent,
            format,
            present_mode,
            pre_transform: caps.current_transform,
            image_count,
            requested_image_count: desc.min_image_count,
        });
        Ok(BuildStatus::Ready)
    }

    fn create_images(
        &self,
        device: &impl PresentDevice,
        swapchain: vk::SwapchainKHR,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Vec<PresentableImage>> {
        let raw_images = device.swapchain_images(swapchain)?;
        let fences = device.features().presentation_fences();

        let mut images = Vec::with_capacity(raw_images.len());
        for image in raw_images {
            match self.create_image(device, image, format, extent, fences) {
                Ok(created) => images.push(created),
                Err(e) => {
                    for created in images {
                        PresentableImage::destroy(created, device);
                    }
                    return Err(e);
                }
            }
        }
        Ok(images)
    }

    fn create_image(
        &self,
        device: &impl PresentDevice,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        with_fence: bool,
    ) -> Result<PresentableImage> {
        let view = device.create_image_view(image, format)?;

        let framebuffer = if self.render_pass == vk::RenderPass::null() {
            vk::Framebuffer::null()
        } else {
            match device.create_framebuffer(self.render_pass, view, extent) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    device.destroy_image_view(view);
                    return Err(e);
                }
            }
        };

        let present_semaphore = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                destroy_target(device, view, framebuffer);
                return Err(e);
            }
        };

        let present_fence = if with_fence {
            match device.create_fence(true) {
                Ok(fence) => Some(fence),
                Err(e) => {
                    device.destroy_semaphore(present_semaphore);
                    destroy_target(device, view, framebuffer);
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(PresentableImage {
            image,
            view,
            framebuffer,
            present_semaphore,
            present_fence,
            fence_state: PresentFenceState::Signaled,
        })
    }

    /// Destroy every per-image resource. The swapchain handle is kept as the
    /// old swapchain for the next build.
    ///
    /// Callers wait for the device to go idle first.
    pub fn retire(&mut self, device: &impl PresentDevice) {
        for image in self.images.drain(..) {
            image.destroy(device);
        }
        self.state = None;
    }

    /// Replace the swapchain at the current drawable size.
    ///
    /// Queued presents of outgoing images are drained before their resources
    /// are destroyed.
    pub fn rebuild(
        &mut self,
        device: &impl PresentDevice,
        drawable: (u32, u32),
    ) -> Result<BuildStatus> {
        self.drain_presentations(device)?;
        self.retire(device);
        self.build(device, drawable)
    }

    /// Wait for every queued present of the live images to retire.
    pub fn drain_presentations(&mut self, device: &impl PresentDevice) -> Result<()> {
        for image in &mut self.images {
            image.drain(device)?;
        }
        Ok(())
    }

    /// Retire and destroy the swapchain itself.
    pub fn destroy(&mut self, device: &impl PresentDevice) {
        self.retire(device);
        if self.swapchain != vk::SwapchainKHR::null() {
            device.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::DeviceFeatureSet;
    use crate::mock::{Call, FenceState, MockDevice};
    use ash::vk::Handle;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 2048,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn extent_clamps_drawable_size() {
        let caps = caps(2, 3);
        assert_eq!(
            swapchain_extent(&caps, (1024, 768)),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );
        assert_eq!(
            swapchain_extent(&caps, (8000, 4)),
            vk::Extent2D {
                width: 2048,
                height: 16
            }
        );
    }

    #[test]
    fn extent_prefers_drawable_over_current_extent() {
        let mut caps = caps(2, 3);
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(swapchain_extent(&caps, (1024, 768)).width, 1024);
        assert_eq!(swapchain_extent(&caps, (0, 0)).width, 800);
    }

    #[test]
    fn minimized_window_has_empty_extent() {
        let mut caps = caps(2, 3);
        caps.min_image_extent = vk::Extent2D::default();
        caps.max_image_extent = vk::Extent2D::default();
        let extent = swapchain_extent(&caps, (0, 0));
        assert_eq!(extent.width, 0);
    }

    #[test]
    fn image_count_requests_one_extra() {
        assert_eq!(image_count(&caps(2, 8)), 3);
        assert_eq!(image_count(&caps(3, 3)), 3);
        assert_eq!(image_count(&caps(2, 0)), 3);
    }

    #[test]
    fn build_sizes_resources_from_returned_count() {
        let device = MockDevice::new(DeviceFeatureSet::SWAPCHAIN_MAINTENANCE_1);
        device.set_image_count_override(5);
        let mut manager = SwapchainManager::new(vk::RenderPass::from_raw(0xAB));

        assert_eq!(manager.build(&device, (1024, 768)).unwrap(), BuildStatus::Ready);

        let state = *manager.state().unwrap();
        assert_eq!(state.image_count, 5);
        assert_eq!(state.requested_image_count, 3);
        assert_eq!(manager.images().len(), 5);
        assert!(manager
            .images()
            .iter()
            .all(|image| image.framebuffer != vk::Framebuffer::null()
                && image.present_fence.is_some()));

        let desc = device.swapchain_desc(state.swapchain).unwrap();
        assert_eq!(desc.min_image_count, 3);
        assert_eq!(desc.queue_family_indices, vec![0]);
    }

    #[test]
    fn dynamic_rendering_skips_framebuffers_and_fences() {
        let device = MockDevice::new(DeviceFeatureSet::empty());
        let mut manager = SwapchainManager::new(vk::RenderPass::null());
        manager.build(&device, (640, 480)).unwrap();

        for image in manager.images() {
            assert_eq!(image.framebuffer, vk::Framebuffer::null());
            assert!(image.present_fence.is_none());
        }
    }

    #[test]
    fn zero_extent_defers() {
        let device = MockDevice::full();
        let mut caps = caps(2, 3);
        caps.min_image_extent = vk::Extent2D::default();
        device.set_caps(caps);

        let mut manager = SwapchainManager::new(vk::RenderPass::null());
        assert_eq!(manager.build(&device, (0, 0)).unwrap(), BuildStatus::Deferred);
        assert!(!manager.is_ready());
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn retire_then_build_is_idempotent() {
        let device = MockDevice::full();
        let mut manager = SwapchainManager::new(vk::RenderPass::null());

        manager.build(&device, (1024, 768)).unwrap();
        let first = *manager.state().unwrap();

        manager.retire(&device);
        assert!(manager.state().is_none());
        manager.build(&device, (1024, 768)).unwrap();
        let second = *manager.state().unwrap();

        manager.retire(&device);
        manager.build(&device, (1024, 768)).unwrap();
        let third = *manager.state().unwrap();

        for state in [second, third] {
            assert_eq!(state.extent, first.extent);
            assert_eq!(state.format, first.format);
            assert_eq!(state.image_count, first.image_count);
        }
    }

    #[test]
    fn old_swapchain_destroyed_after_replacement() {
        let device = MockDevice::full();
        let mut manager = SwapchainManager::new(vk::RenderPass::null());
        manager.build(&device, (1024, 768)).unwrap();
        let old = manager.handle().as_raw();

        device.clear_calls();
        manager.rebuild(&device, (1920, 1080)).unwrap();

        let calls = device.calls();
        let create = calls
            .iter()
            .position(|call| matches!(call, Call::CreateSwapchain { old: o, .. } if *o == old))
            .unwrap();
        let destroy = calls
            .iter()
            .position(|call| *call == Call::DestroySwapchain(old))
            .unwrap();
        assert!(create < destroy);
        assert_eq!(
            device.swapchain_extent(manager.handle()),
            Some(vk::Extent2D {
                width: 1920,
                height: 1080
            })
        );
    }

    #[test]
    fn prepare_reuse_skips_reset_fence() {
        let device = MockDevice::full();
        let mut manager = SwapchainManager::new(vk::RenderPass::null());
        manager.build(&device, (1024, 768)).unwrap();

        let image = manager.image_mut(1).unwrap();
        let fence = image.present_fence.unwrap();
        image.prepare_reuse(&device).unwrap();
        assert_eq!(device.fence_state(fence), Some(FenceState::Unsignaled));

        // A second call must not wait on a fence nothing will signal.
        image.prepare_reuse(&device).unwrap();
        assert_eq!(image.fence_state(), PresentFenceState::Unsignaled);
    }

    #[test]
    fn build_with_live_images_is_rejected() {
        let device = MockDevice::full();
        let mut manager = SwapchainManager::new(vk::RenderPass::null());
        manager.build(&device, (1024, 768)).unwrap();

        let err = manager.build(&device, (1024, 768)).unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
    }

    #[test]
    fn failed_build_leaks_nothing() {
        let device = MockDevice::full();
        device.fail_swapchain_images();
        let mut manager = SwapchainManager::new(vk::RenderPass::from_raw(1));

        assert!(manager.build(&device, (1024, 768)).is_err());
        assert!(!manager.is_ready());
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn destroy_releases_everything() {
        let device = MockDevice::full();
        let mut manager = SwapchainManager::new(vk::RenderPass::from_raw(1));
        manager.build(&device, (1024, 768)).unwrap();
        assert!(device.live_objects() > 0);

        manager.destroy(&device);
        assert_eq!(device.live_objects(), 0);
        assert_eq!(manager.handle(), vk::SwapchainKHR::null());
    }
}
