//! GPU context management.

use crate::capabilities::{
    extension_names, AdapterInfo, DeviceFeatureSet, FIFO_LATEST_READY_EXTENSION,
    FIFO_LATEST_READY_FEATURES_TYPE,
};
use crate::command::color_subresource_range;
use crate::device::{
    AcquiredImage, PresentDesc, PresentDevice, QueueHandle, QueueSet, SubmitDesc, SwapchainDesc,
};
use crate::error::{swapchain_result, GpuError, Result};
use crate::instance::VulkanInstance;
use crate::selection::{
    pick_device, DeviceCandidate, DeviceChoice, QueueAssignment, QueueFamilyProbe,
    SelectionCriteria,
};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_void, CStr};
use vkstart_core::SampleFlags;

/// Vulkan device, surface and queues for one window.
pub struct GpuContext {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    adapter: AdapterInfo,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    surface_caps2_loader: Option<ash::khr::get_surface_capabilities2::Instance>,
    swapchain_loader: ash::khr::swapchain::Device,
    queues: QueueSet,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    features: DeviceFeatureSet,
    // Dropped last, after `Drop for GpuContext` destroyed its children.
    instance: VulkanInstance,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: owners of device objects release them before the context.
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    flags: SampleFlags,
    dynamic_rendering: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "vkstart".to_string(),
            flags: SampleFlags::sample_defaults(),
            dynamic_rendering: false,
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn flags(mut self, flags: SampleFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Require Vulkan 1.3 dynamic rendering and synchronization2.
    pub fn dynamic_rendering(mut self, enable: bool) -> Self {
        self.dynamic_rendering = enable;
        self
    }

    /// Create the instance, surface and device for `window`.
    pub fn build<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?
            .as_raw();

        let instance = VulkanInstance::new(&self.app_name, display, self.flags)?;

        // SAFETY: the handles belong to a live window that outlives the surface.
        let surface = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.instance(),
                display,
                window_handle,
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.instance());

        let criteria = SelectionCriteria {
            flags: self.flags,
            require_dynamic_rendering: self.dynamic_rendering,
            instance_features: instance.features(),
        };

        // SAFETY: instance and surface are valid.
        let selected = unsafe { select_device(&instance, &surface_loader, surface, &criteria) };
        let (physical_device, adapter, choice) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                // SAFETY: nothing else references the surface yet.
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let mut features = choice.features;
        if !self.dynamic_rendering {
            features.remove(DeviceFeatureSet::DYNAMIC_RENDERING);
        }

        // SAFETY: the physical device was enumerated from this instance.
        let created = unsafe {
            create_device(instance.instance(), physical_device, &choice.queues, features)
        };
        let (device, queues) = match created {
            Ok(created) => created,
            Err(e) => {
                // SAFETY: nothing else references the surface yet.
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let surface_caps2_loader = features.extended_surface_query().then(|| {
            ash::khr::get_surface_capabilities2::Instance::new(instance.entry(), instance.instance())
        });
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.instance(), &device);

        tracing::info!(
            "Device ready: {:?}, {:?}, presentation fences: {}, dynamic rendering: {}",
            choice.surface_format.format,
            choice.present_mode,
            features.presentation_fences(),
            features.dynamic_rendering()
        );

        Ok(GpuContext {
            device,
            physical_device,
            adapter,
            surface,
            surface_loader,
            surface_caps2_loader,
            swapchain_loader,
            queues,
            surface_format: choice.surface_format,
            present_mode: choice.present_mode,
            features,
            instance,
        })
    }
}

/// Probe every physical device and pick one.
///
/// # Safety
/// The instance and surface must be valid.
unsafe fn select_device(
    instance: &VulkanInstance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    criteria: &SelectionCriteria,
) -> Result<(vk::PhysicalDevice, AdapterInfo, DeviceChoice)> {
    // SAFETY: guaranteed by the caller.
    let physical_devices = unsafe { instance.instance().enumerate_physical_devices() }?;

    let mut candidates = Vec::with_capacity(physical_devices.len());
    for &physical_device in &physical_devices {
        // SAFETY: enumerated from this instance.
        let candidate =
            unsafe { probe_candidate(instance.instance(), surface_loader, surface, physical_device) }?;
        tracing::debug!("Found GPU: {}", candidate.info.summary());
        candidates.push(candidate);
    }

    let choice = pick_device(&candidates, criteria)?;
    let physical_device = physical_devices[choice.index];
    let adapter = candidates.swap_remove(choice.index).info;
    Ok((physical_device, adapter, choice))
}

/// Gather everything selection needs about one device.
///
/// # Safety
/// All handles must be valid.
unsafe fn probe_candidate(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Result<DeviceCandidate> {
    // SAFETY: guaranteed by the caller.
    unsafe {
        let properties = instance.get_physical_device_properties(physical_device);

        let families = instance.get_physical_device_queue_family_properties(physical_device);
        let mut queue_families = Vec::with_capacity(families.len());
        for (index, family) in families.iter().enumerate() {
            let supports_present = surface_loader.get_physical_device_surface_support(
                physical_device,
                index as u32,
                surface,
            )?;
            queue_families.push(QueueFamilyProbe {
                flags: family.queue_flags,
                queue_count: family.queue_count,
                supports_present,
            });
        }

        let surface_formats =
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?;
        let present_modes =
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?;
        let extensions = extension_names(
            &instance.enumerate_device_extension_properties(physical_device)?,
        );

        Ok(DeviceCandidate {
            info: AdapterInfo::from_properties(&properties),
            queue_families,
            surface_formats,
            present_modes,
            extensions,
        })
    }
}

/// Required and optional device extensions.
fn device_extensions(features: DeviceFeatureSet) -> Vec<&'static CStr> {
    let mut extensions = vec![ash::khr::swapchain::NAME];
    if features.presentation_fences() {
        extensions.push(ash::ext::swapchain_maintenance1::NAME);
    }
    if features.fifo_latest_ready() {
        extensions.push(FIFO_LATEST_READY_EXTENSION);
    }
    extensions
}

/// `VkPhysicalDevicePresentModeFifoLatestReadyFeaturesEXT`, missing from the
/// generated bindings.
#[repr(C)]
struct FifoLatestReadyFeatures {
    s_type: vk::StructureType,
    p_next: *mut c_void,
    present_mode_fifo_latest_ready: vk::Bool32,
}

impl FifoLatestReadyFeatures {
    fn enabled() -> Self {
        Self {
            s_type: FIFO_LATEST_READY_FEATURES_TYPE,
            p_next: std::ptr::null_mut(),
            present_mode_fifo_latest_ready: vk::TRUE,
        }
    }
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    assignment: &QueueAssignment,
    features: DeviceFeatureSet,
) -> Result<(ash::Device, QueueSet)> {
    let counts = assignment.queue_create_counts();
    let priorities: Vec<Vec<f32>> = counts
        .iter()
        .map(|&(_, count)| vec![1.0; count as usize])
        .collect();
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = counts
        .iter()
        .zip(&priorities)
        .map(|(&(family, _), priorities)| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect();

    let extensions = device_extensions(features);
    for extension in &extensions {
        tracing::info!("Activating device extension {}", extension.to_string_lossy());
    }
    let extension_names: Vec<*const std::ffi::c_char> =
        extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);
    let mut swapchain_maintenance =
        vk::PhysicalDeviceSwapchainMaintenance1FeaturesEXT::default().swapchain_maintenance1(true);

    let mut device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names);
    if features.dynamic_rendering() {
        device_create_info = device_create_info.push_next(&mut vulkan_1_3_features);
    }
    if features.presentation_fences() {
        device_create_info = device_create_info.push_next(&mut swapchain_maintenance);
    }
    let mut fifo_latest_ready = FifoLatestReadyFeatures::enabled();
    if features.fifo_latest_ready() {
        // Prepended by hand; ash has no chaining trait impl for this struct.
        fifo_latest_ready.p_next = device_create_info.p_next.cast_mut();
        device_create_info.p_next = std::ptr::from_ref(&fifo_latest_ready).cast();
    }

    // SAFETY: guaranteed by the caller; create info pointers outlive the call.
    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }?;

    let queue = |slot: crate::selection::QueueSlot| QueueHandle {
        // SAFETY: the queue was requested in `queue_create_infos`.
        queue: unsafe { device.get_device_queue(slot.family, slot.index) },
        family: slot.family,
    };
    let queues = QueueSet {
        graphics: queue(assignment.graphics),
        present: queue(assignment.present),
        transfer: queue(assignment.transfer),
    };

    Ok((device, queues))
}

// Handles passed to these methods were created by this context. Callers run
// on a single thread, which covers Vulkan's external synchronization rules.
impl PresentDevice for GpuContext {
    fn features(&self) -> DeviceFeatureSet {
        self.features
    }

    fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    fn queues(&self) -> QueueSet {
        self.queues
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        // SAFETY: the device is alive for `self`.
        Ok(unsafe { self.device.create_semaphore(&info, None) }?)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        // SAFETY: callers destroy a semaphore only once no queued work uses it.
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        // SAFETY: the device is alive for `self`.
        Ok(unsafe { self.device.create_fence(&info, None) }?)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        // SAFETY: callers never destroy a fence attached to pending work.
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        // SAFETY: the fences belong to this device.
        unsafe { self.device.wait_for_fences(fences, true, u64::MAX) }?;
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        // SAFETY: callers reset only fences with no pending submission.
        unsafe { self.device.reset_fences(fences) }?;
        Ok(())
    }

    fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        // SAFETY: `queue_family` is one of the families the device was created with.
        Ok(unsafe { self.device.create_command_pool(&info, None) }?)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        // SAFETY: callers wait for the device to go idle before destroying the pool.
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        // SAFETY: the pool was created by this device.
        Ok(unsafe { self.device.allocate_command_buffers(&info) }?)
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        // SAFETY: the slot fence was waited on, so the buffer is not pending.
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }?;
        Ok(())
    }

    fn surface_capabilities(
        &self,
        present_mode: vk::PresentModeKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        if let Some(loader) = &self.surface_caps2_loader {
            let mut mode = vk::SurfacePresentModeEXT::default().present_mode(present_mode);
            let surface_info = vk::PhysicalDeviceSurfaceInfo2KHR::default()
                .surface(self.surface)
                .push_next(&mut mode);
            let mut caps2 = vk::SurfaceCapabilities2KHR::default();
            // SAFETY: surface and physical device outlive `self`, `mode` the call.
            unsafe {
                loader.get_physical_device_surface_capabilities2(
                    self.physical_device,
                    &surface_info,
                    &mut caps2,
                )
            }?;
            return Ok(caps2.surface_capabilities);
        }

        // SAFETY: surface and physical device outlive `self`.
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }?)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        let sharing_mode = if desc.queue_family_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        let present_modes = [desc.present_mode];
        let mut present_modes_info =
            vk::SwapchainPresentModesCreateInfoEXT::default().present_modes(&present_modes);

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);
        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&desc.queue_family_indices);
        }
        if self.features.presentation_fences() {
            create_info = create_info.push_next(&mut present_modes_info);
        }

        // SAFETY: the old swapchain, if any, is retired but not yet destroyed.
        unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        // SAFETY: the swapchain is live.
        Ok(unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }?)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        // SAFETY: callers wait until no queued work references the swapchain.
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());
        // SAFETY: `image` belongs to a live swapchain of this device.
        Ok(unsafe { self.device.create_image_view(&info, None) }?)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        // SAFETY: callers drain queued work referencing the view first.
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        let attachments = [view];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        // SAFETY: the render pass and view are live and compatible.
        Ok(unsafe { self.device.create_framebuffer(&info, None) }?)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        // SAFETY: callers drain queued work referencing the framebuffer first.
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> Result<AcquiredImage> {
        // SAFETY: the semaphore is unsignaled with no pending signal.
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
        .map_err(swapchain_result)?;
        Ok(AcquiredImage { index, suboptimal })
    }

    fn submit(&self, desc: &SubmitDesc) -> Result<()> {
        let wait_semaphores = [desc.wait_semaphore];
        let wait_stages = [desc.wait_stage];
        let command_buffers: Vec<vk::CommandBuffer> = Some(desc.command_buffer)
            .filter(|buffer| *buffer != vk::CommandBuffer::null())
            .into_iter()
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = Some(desc.signal_semaphore)
            .filter(|semaphore| *semaphore != vk::Semaphore::null())
            .into_iter()
            .collect();
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the fence is unsignaled and the arrays outlive the call.
        unsafe {
            self.device
                .queue_submit(self.queues.graphics.queue, &[submit], desc.fence)
        }?;
        Ok(())
    }

    fn present(&self, desc: &PresentDesc) -> Result<bool> {
        let wait_semaphores = [desc.wait_semaphore];
        let swapchains = [desc.swapchain];
        let image_indices = [desc.image_index];
        let fences: Vec<vk::Fence> = desc.present_fence.into_iter().collect();
        let modes: Vec<vk::PresentModeKHR> = desc.present_mode.into_iter().collect();

        let mut fence_info = vk::SwapchainPresentFenceInfoEXT::default().fences(&fences);
        let mut mode_info = vk::SwapchainPresentModeInfoEXT::default().present_modes(&modes);

        let mut present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        if self.features.presentation_fences() {
            if !fences.is_empty() {
                present_info = present_info.push_next(&mut fence_info);
            }
            if !modes.is_empty() {
                present_info = present_info.push_next(&mut mode_info);
            }
        }

        // SAFETY: chained structs and arrays outlive the call.
        unsafe {
            self.swapchain_loader
                .queue_present(self.queues.present.queue, &present_info)
        }
        .map_err(swapchain_result)
    }

    fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is alive for `self`.
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}
