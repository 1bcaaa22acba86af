//! Recording [`PresentDevice`] for tests.
//!
//! Queued work completes when the host waits on it. `wait_idle` completes
//! submissions only; a queued present retires when its fence is waited on.
//! The mock panics on usage
//! that a real driver would reject or hang on: resetting or destroying a
//! pending fence, waiting on a fence nothing will signal, submitting with a
//! busy fence and destroying objects still referenced by queued work.

use crate::capabilities::DeviceFeatureSet;
use crate::device::{
    AcquiredImage, PresentDesc, PresentDevice, QueueHandle, QueueSet, SubmitDesc, SwapchainDesc,
};
use crate::error::{swapchain_result, Result};
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Signaled,
    Unsignaled,
    /// Will signal once queued work completes.
    Pending,
}

/// Operations in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    WaitFences(Vec<u64>),
    ResetFences(Vec<u64>),
    ResetCommandBuffer(u64),
    CreateSwapchain { extent: vk::Extent2D, old: u64 },
    DestroySwapchain(u64),
    Acquire { swapchain: u64, index: Option<u32> },
    Submit { fence: u64 },
    Present { swapchain: u64, image_index: u32 },
    WaitIdle,
}

#[derive(Debug)]
struct SwapchainRecord {
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    next_image: u32,
    desc: SwapchainDesc,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u64,
    fences: HashMap<u64, FenceState>,
    /// Pending submit fence -> swapchain the frame targeted.
    submissions: HashMap<u64, u64>,
    /// Pending present fence -> swapchain.
    presentations: HashMap<u64, u64>,
    semaphores: HashMap<u64, bool>,
    swapchains: HashMap<u64, SwapchainRecord>,
    image_owner: HashMap<u64, u64>,
    view_owner: HashMap<u64, u64>,
    framebuffer_owner: HashMap<u64, u64>,
    pools: HashSet<u64>,
    command_buffers: HashSet<u64>,
    last_acquired: Option<u64>,
    max_outstanding: usize,
    caps: vk::SurfaceCapabilitiesKHR,
    image_count_override: Option<u32>,
    acquire_errors: VecDeque<vk::Result>,
    present_results: VecDeque<std::result::Result<bool, vk::Result>>,
    fail_swapchain_images: bool,
    calls: Vec<Call>,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn swapchain_busy(&self, swapchain: u64) -> bool {
        self.submissions.values().any(|&s| s == swapchain)
            || self.presentations.values().any(|&s| s == swapchain)
    }

    fn complete(&mut self, fence: u64) {
        self.fences.insert(fence, FenceState::Signaled);
        self.submissions.remove(&fence);
        self.presentations.remove(&fence);
    }
}

/// A fake device with a surface and a single queue family.
pub struct MockDevice {
    features: DeviceFeatureSet,
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new(features: DeviceFeatureSet) -> Self {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };

        Self {
            features,
            state: Mutex::new(MockState {
                caps,
                ..Default::default()
            }),
        }
    }

    /// Device with presentation fences and dynamic rendering.
    pub fn full() -> Self {
        Self::new(
            DeviceFeatureSet::SURFACE_MAINTENANCE_1
                | DeviceFeatureSet::GET_SURFACE_CAPABILITIES_2
                | DeviceFeatureSet::SWAPCHAIN_MAINTENANCE_1
                | DeviceFeatureSet::DYNAMIC_RENDERING,
        )
    }

    pub fn set_caps(&self, caps: vk::SurfaceCapabilitiesKHR) {
        self.state.lock().caps = caps;
    }

    /// Make swapchains return this many images regardless of the request.
    pub fn set_image_count_override(&self, count: u32) {
        self.state.lock().image_count_override = Some(count);
    }

    pub fn push_acquire_error(&self, error: vk::Result) {
        self.state.lock().acquire_errors.push_back(error);
    }

    pub fn push_present_result(&self, result: std::result::Result<bool, vk::Result>) {
        self.state.lock().present_results.push_back(result);
    }

    pub fn fail_swapchain_images(&self) {
        self.state.lock().fail_swapchain_images = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn fence_state(&self, fence: vk::Fence) -> Option<FenceState> {
        self.state.lock().fences.get(&fence.as_raw()).copied()
    }

    /// Largest number of submissions that were queued at once.
    pub fn max_outstanding(&self) -> usize {
        self.state.lock().max_outstanding
    }

    pub fn swapchain_extent(&self, swapchain: vk::SwapchainKHR) -> Option<vk::Extent2D> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|record| record.extent)
    }

    pub fn swapchain_desc(&self, swapchain: vk::SwapchainKHR) -> Option<SwapchainDesc> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|record| record.desc.clone())
    }

    /// Number of objects that have not been destroyed.
    pub fn live_objects(&self) -> usize {
        let state = self.state.lock();
        state.fences.len()
            + state.semaphores.len()
            + state.swapchains.len()
            + state.view_owner.len()
            + state.framebuffer_owner.len()
            + state.pools.len()
    }
}

impl PresentDevice for MockDevice {
    fn features(&self) -> DeviceFeatureSet {
        self.features
    }

    fn surface_format(&self) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn present_mode(&self) -> vk::PresentModeKHR {
        vk::PresentModeKHR::FIFO
    }

    fn queues(&self) -> QueueSet {
        let queue = QueueHandle {
            queue: vk::Queue::from_raw(0xC0FFEE),
            family: 0,
        };
        QueueSet {
            graphics: queue,
            present: queue,
            transfer: queue,
        }
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let mut state = self.state.lock();
        let raw = state.handle();
        state.semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        let pending = state
            .semaphores
            .remove(&semaphore.as_raw())
            .expect("destroying unknown semaphore");
        assert!(
            !pending || state.submissions.is_empty(),
            "destroying semaphore {semaphore:?} with a pending signal while work is queued"
        );
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.lock();
        let raw = state.handle();
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(raw, initial);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        let fence_state = state
            .fences
            .remove(&fence.as_raw())
            .expect("destroying unknown fence");
        assert_ne!(
            fence_state,
            FenceState::Pending,
            "destroying fence {fence:?} still in use"
        );
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(Call::WaitFences(fences.iter().map(|f| f.as_raw()).collect()));
        for fence in fences {
            match state.fences.get(&fence.as_raw()).copied() {
                Some(FenceState::Unsignaled) => {
                    panic!("waiting on fence {fence:?} that nothing will signal")
                }
                Some(_) => state.complete(fence.as_raw()),
                None => panic!("waiting on unknown fence {fence:?}"),
            }
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        let mut state = self.state.lock();
        state
            .calls
            .push(Call::ResetFences(fences.iter().map(|f| f.as_raw()).collect()));
        for fence in fences {
            let entry = state
                .fences
                .get_mut(&fence.as_raw())
                .expect("resetting unknown fence");
            assert_ne!(
                *entry,
                FenceState::Pending,
                "resetting fence {fence:?} still in use"
            );
            *entry = FenceState::Unsignaled;
        }
        Ok(())
    }

    fn create_command_pool(&self, _queue_family: u32) -> Result<vk::CommandPool> {
        let mut state = self.state.lock();
        let raw = state.handle();
        state.pools.insert(raw);
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state.lock();
        assert!(
            state.submissions.is_empty(),
            "destroying command pool with queued work"
        );
        assert!(state.pools.remove(&pool.as_raw()), "unknown pool {pool:?}");
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        assert!(state.pools.contains(&pool.as_raw()), "unknown pool {pool:?}");
        Ok((0..count)
            .map(|_| {
                let raw = state.handle();
                state.command_buffers.insert(raw);
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        assert!(state.command_buffers.contains(&command_buffer.as_raw()));
        state
            .calls
            .push(Call::ResetCommandBuffer(command_buffer.as_raw()));
        Ok(())
    }

    fn surface_capabilities(
        &self,
        _present_mode: vk::PresentModeKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state.lock().caps)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        let old = desc.old_swapchain.as_raw();
        if old != 0 {
            assert!(
                state.swapchains.contains_key(&old),
                "old swapchain {old:#x} already destroyed"
            );
        }
        state.calls.push(Call::CreateSwapchain {
            extent: desc.extent,
            old,
        });

        let raw = state.handle();
        let count = state.image_count_override.unwrap_or(desc.min_image_count);
        let images = (0..count)
            .map(|_| {
                let image = state.handle();
                state.image_owner.insert(image, raw);
                vk::Image::from_raw(image)
            })
            .collect();
        state.swapchains.insert(
            raw,
            SwapchainRecord {
                extent: desc.extent,
                images,
                next_image: 0,
                desc: desc.clone(),
            },
        );
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        let state = self.state.lock();
        if state.fail_swapchain_images {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY.into());
        }
        Ok(state
            .swapchains
            .get(&swapchain.as_raw())
            .expect("unknown swapchain")
            .images
            .clone())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        let raw = swapchain.as_raw();
        assert!(
            !state.swapchain_busy(raw),
            "destroying swapchain {swapchain:?} with queued work"
        );
        assert!(
            !state.view_owner.values().any(|&owner| owner == raw),
            "destroying swapchain {swapchain:?} before its image views"
        );
        state.calls.push(Call::DestroySwapchain(raw));
        let record = state.swapchains.remove(&raw).expect("unknown swapchain");
        for image in record.images {
            state.image_owner.remove(&image.as_raw());
        }
    }

    fn create_image_view(&self, image: vk::Image, _format: vk::Format) -> Result<vk::ImageView> {
        let mut state = self.state.lock();
        let owner = *state
            .image_owner
            .get(&image.as_raw())
            .expect("view of unknown image");
        let raw = state.handle();
        state.view_owner.insert(raw, owner);
        Ok(vk::ImageView::from_raw(raw))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state.lock();
        let owner = state
            .view_owner
            .remove(&view.as_raw())
            .expect("destroying unknown image view");
        assert!(
            !state.swapchain_busy(owner),
            "destroying image view {view:?} still in use"
        );
        assert!(
            !state.framebuffer_owner.values().any(|&v| v == view.as_raw()),
            "destroying image view {view:?} before its framebuffer"
        );
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        assert_ne!(render_pass, vk::RenderPass::null());
        let mut state = self.state.lock();
        assert!(state.view_owner.contains_key(&view.as_raw()));
        let raw = state.handle();
        state.framebuffer_owner.insert(raw, view.as_raw());
        Ok(vk::Framebuffer::from_raw(raw))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.lock();
        let view = state
            .framebuffer_owner
            .remove(&framebuffer.as_raw())
            .expect("destroying unknown framebuffer");
        let owner = state.view_owner.get(&view).copied().unwrap_or_default();
        assert!(
            !state.swapchain_busy(owner),
            "destroying framebuffer {framebuffer:?} still in use"
        );
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> Result<AcquiredImage> {
        let mut state = self.state.lock();
        let raw = swapchain.as_raw();
        if let Some(error) = state.acquire_errors.pop_front() {
            state.calls.push(Call::Acquire {
                swapchain: raw,
                index: None,
            });
            return Err(swapchain_result(error));
        }

        let signaled = state
            .semaphores
            .get_mut(&semaphore.as_raw())
            .expect("acquire with unknown semaphore");
        assert!(!*signaled, "acquire semaphore {semaphore:?} already signaled");
        *signaled = true;

        let record = state.swapchains.get_mut(&raw).expect("unknown swapchain");
        let index = record.next_image;
        record.next_image = (index + 1) % record.images.len() as u32;

        state.last_acquired = Some(raw);
        state.calls.push(Call::Acquire {
            swapchain: raw,
            index: Some(index),
        });
        Ok(AcquiredImage {
            index,
            suboptimal: false,
        })
    }

    fn submit(&self, desc: &SubmitDesc) -> Result<()> {
        let mut state = self.state.lock();
        let fence = desc.fence.as_raw();
        assert_eq!(
            state.fences.get(&fence),
            Some(&FenceState::Unsignaled),
            "submit fence must be unsignaled"
        );

        let wait = state
            .semaphores
            .get_mut(&desc.wait_semaphore.as_raw())
            .expect("unknown wait semaphore");
        assert!(*wait, "submission waits on a semaphore nothing signals");
        *wait = false;

        if desc.signal_semaphore != vk::Semaphore::null() {
            let signal = state
                .semaphores
                .get_mut(&desc.signal_semaphore.as_raw())
                .expect("unknown signal semaphore");
            assert!(!*signal, "signal semaphore already signaled");
            *signal = true;
        }

        let target = state.last_acquired.unwrap_or_default();
        state.fences.insert(fence, FenceState::Pending);
        state.submissions.insert(fence, target);
        state.max_outstanding = state.max_outstanding.max(state.submissions.len());
        state.calls.push(Call::Submit { fence });
        Ok(())
    }

    fn present(&self, desc: &PresentDesc) -> Result<bool> {
        let mut state = self.state.lock();
        let raw = desc.swapchain.as_raw();
        assert!(state.swapchains.contains_key(&raw), "present to unknown swapchain");

        let wait = state
            .semaphores
            .get_mut(&desc.wait_semaphore.as_raw())
            .expect("unknown present semaphore");
        assert!(*wait, "present waits on a semaphore nothing signals");
        *wait = false;

        let result = state.present_results.pop_front().unwrap_or(Ok(false));
        // Out-of-date presents still execute their queue operations.
        if matches!(result, Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR)) {
            if let Some(fence) = desc.present_fence {
                let fence = fence.as_raw();
                assert_eq!(
                    state.fences.get(&fence),
                    Some(&FenceState::Unsignaled),
                    "present fence must be unsignaled"
                );
                state.fences.insert(fence, FenceState::Pending);
                state.presentations.insert(fence, raw);
            }
        }

        state.calls.push(Call::Present {
            swapchain: raw,
            image_index: desc.image_index,
        });
        result.map_err(swapchain_result)
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitIdle);
        // Device idle does not cover present fences.
        let pending: Vec<u64> = state.submissions.keys().copied().collect();
        for fence in pending {
            state.complete(fence);
        }
        Ok(())
    }
}
