//! Frame execution.
//!
//! [`FrameExecutor`] drives one acquire, record, submit, present cycle per
//! call and owns the swapchain and the frames in flight. Swapchain
//! invalidation reported by the driver is recovered by rebuilding; every other
//! driver failure is returned to the caller as fatal.

use crate::command::ACQUIRE_WAIT_STAGE;
use crate::device::{FrameRecorder, PresentDesc, PresentDevice, SubmitDesc};
use crate::error::{GpuError, Result};
use crate::pacer::FramePacer;
use crate::swapchain::{BuildStatus, SwapchainManager};
use ash::vk;
use vkstart_core::constants::MAX_FRAMES_IN_FLIGHT;
use vkstart_core::DrawableWindow;

/// Where the executor is in the frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    TornDown,
}

/// Why a frame produced no present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The window has no drawable area.
    EmptyDrawable,
    /// The swapchain went out of date again right after a rebuild.
    OutOfDate,
}

/// Result of [`FrameExecutor::draw_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was queued for presentation. `suboptimal` means the
    /// swapchain no longer matches the surface and is rebuilt before the next
    /// frame.
    Presented { image_index: u32, suboptimal: bool },
    Skipped(SkipReason),
}

/// Owns the swapchain and frame pacer and sequences each frame.
pub struct FrameExecutor {
    swapchain: SwapchainManager,
    pacer: FramePacer,
    phase: FramePhase,
    frame_number: u64,
    needs_rebuild: bool,
}

impl FrameExecutor {
    /// Create the frames in flight and the first swapchain.
    ///
    /// `render_pass` is null for dynamic rendering.
    pub fn new(
        device: &impl PresentDevice,
        render_pass: vk::RenderPass,
        window: &impl DrawableWindow,
    ) -> Result<Self> {
        Self::with_frames_in_flight(device, render_pass, window, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn with_frames_in_flight(
        device: &impl PresentDevice,
        render_pass: vk::RenderPass,
        window: &impl DrawableWindow,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let mut pacer = FramePacer::new(device, device.queues().graphics.family, frames_in_flight)?;

        let mut swapchain = SwapchainManager::new(render_pass);
        let status = match swapchain.build(device, window.drawable_size()) {
            Ok(status) => status,
            Err(e) => {
                pacer.destroy(device);
                return Err(e);
            }
        };

        Ok(Self {
            swapchain,
            pacer,
            phase: FramePhase::Idle,
            frame_number: 0,
            needs_rebuild: status == BuildStatus::Deferred,
        })
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of frames presented so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Rebuild the swapchain before the next frame, e.g. after a resize.
    pub fn request_rebuild(&mut self) {
        self.needs_rebuild = true;
    }

    /// Run one frame.
    pub fn draw_frame<D, R, W>(
        &mut self,
        device: &D,
        recorder: &mut R,
        window: &W,
    ) -> Result<FrameOutcome>
    where
        D: PresentDevice,
        R: FrameRecorder + ?Sized,
        W: DrawableWindow + ?Sized,
    {
        if self.phase != FramePhase::Idle {
            return Err(GpuError::InvalidState(format!(
                "draw_frame called in phase {:?}",
                self.phase
            )));
        }

        if (self.needs_rebuild || !self.swapchain.is_ready())
            && self.rebuild(device, window.drawable_size())? == BuildStatus::Deferred
        {
            return Ok(FrameOutcome::Skipped(SkipReason::EmptyDrawable));
        }

        self.phase = FramePhase::Acquiring;
        let result = self.run_frame(device, recorder, window);
        if self.phase != FramePhase::TornDown {
            self.phase = FramePhase::Idle;
        }
        result
    }

    fn run_frame<D, R, W>(&mut self, device: &D, recorder: &mut R, window: &W) -> Result<FrameOutcome>
    where
        D: PresentDevice,
        R: FrameRecorder + ?Sized,
        W: DrawableWindow + ?Sized,
    {
        let slot_index = self.pacer.acquire_slot(device, self.frame_number)?;
        let image_acquired = self.pacer.slot(slot_index).image_acquired;

        let mut retried = false;
        let acquired = loop {
            match device.acquire_next_image(self.swapchain.handle(), image_acquired) {
                Ok(acquired) => break acquired,
                Err(e) if e.is_recoverable() => {
                    if retried {
                        self.needs_rebuild = true;
                        return Ok(FrameOutcome::Skipped(SkipReason::OutOfDate));
                    }
                    retried = true;
                    tracing::debug!("Swapchain out of date on acquire, rebuilding");
                    if self.rebuild(device, window.drawable_size())? == BuildStatus::Deferred {
                        return Ok(FrameOutcome::Skipped(SkipReason::EmptyDrawable));
                    }
                }
                Err(e) => return Err(e),
            }
        };

        let image_index = acquired.index;
        let target = self.swapchain.render_target(image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("acquired unknown image {image_index}"))
        })?;
        let present_mode = self.swapchain.state().map(|state| state.present_mode);

        let image = self
            .swapchain
            .image_mut(image_index)
            .ok_or_else(|| GpuError::InvalidState(format!("acquired unknown image {image_index}")))?;
        // A previous present of this image may still be retiring.
        image.prepare_reuse(device)?;
        let present_semaphore = image.present_semaphore;
        let present_fence = image.present_fence;

        let command_buffer = self
            .pacer
            .arm_slot(device, slot_index, image_index)?
            .command_buffer;

        self.phase = FramePhase::Recording;
        if let Err(e) = recorder.record(command_buffer, &target) {
            self.abandon_image(device, slot_index, image_acquired)?;
            return Err(e);
        }

        let submit_fence = self.pacer.reset_fence(device, slot_index)?;
        device.submit(&SubmitDesc {
            command_buffer,
            wait_semaphore: image_acquired,
            wait_stage: ACQUIRE_WAIT_STAGE,
            signal_semaphore: present_semaphore,
            fence: submit_fence,
        })?;
        self.phase = FramePhase::Submitted;

        let present_desc = PresentDesc {
            swapchain: self.swapchain.handle(),
            image_index,
            wait_semaphore: present_semaphore,
            present_fence,
            present_mode: present_fence.and(present_mode),
        };
        self.phase = FramePhase::Presenting;
        let suboptimal = match device.present(&present_desc) {
            Ok(suboptimal) => suboptimal || acquired.suboptimal,
            Err(e) if e.is_recoverable() => true,
            Err(e) => return Err(e),
        };

        if let Some(image) = self.swapchain.image_mut(image_index) {
            image.mark_presented();
        }
        if suboptimal {
            tracing::debug!("Swapchain suboptimal, rebuilding before next frame");
            self.needs_rebuild = true;
        }

        self.frame_number += 1;
        Ok(FrameOutcome::Presented {
            image_index,
            suboptimal,
        })
    }

    /// Unwind a frame whose recording failed after its image was acquired.
    ///
    /// An empty batch consumes the acquire semaphore and re-signals the slot
    /// fence. The image stays acquired until the next rebuild releases it.
    fn abandon_image(
        &mut self,
        device: &impl PresentDevice,
        slot_index: usize,
        image_acquired: vk::Semaphore,
    ) -> Result<()> {
        tracing::warn!("Frame {} failed to record, dropping it", self.frame_number);
        let fence = self.pacer.reset_fence(device, slot_index)?;
        device.submit(&SubmitDesc {
            command_buffer: vk::CommandBuffer::null(),
            wait_semaphore: image_acquired,
            wait_stage: ACQUIRE_WAIT_STAGE,
            signal_semaphore: vk::Semaphore::null(),
            fence,
        })?;
        self.needs_rebuild = true;
        Ok(())
    }

    fn rebuild(&mut self, device: &impl PresentDevice, drawable: (u32, u32)) -> Result<BuildStatus> {
        device.wait_idle()?;
        let status = self.swapchain.rebuild(device, drawable)?;
        self.needs_rebuild = status == BuildStatus::Deferred;
        Ok(status)
    }

    /// Toggle the window between fullscreen and windowed and rebuild the
    /// swapchain at the new size. Stalls until the device is idle.
    pub fn toggle_fullscreen(
        &mut self,
        device: &impl PresentDevice,
        window: &mut impl DrawableWindow,
    ) -> Result<BuildStatus> {
        if self.phase != FramePhase::Idle {
            return Err(GpuError::InvalidState(format!(
                "fullscreen toggle in phase {:?}",
                self.phase
            )));
        }

        device.wait_idle()?;
        self.swapchain.drain_presentations(device)?;
        self.swapchain.retire(device);

        let fullscreen = window.toggle_fullscreen();
        // The window may report its old size until the resize event arrives,
        // which schedules another rebuild.
        let (width, height) = window.drawable_size();
        tracing::info!(
            "Switched to {} ({width}x{height})",
            if fullscreen { "fullscreen" } else { "windowed" }
        );

        let status = self.swapchain.build(device, (width, height))?;
        self.needs_rebuild = status == BuildStatus::Deferred;
        Ok(status)
    }

    /// Wait for the device and destroy the swapchain and frames in flight.
    pub fn shutdown(&mut self, device: &impl PresentDevice) -> Result<()> {
        if self.phase == FramePhase::TornDown {
            return Ok(());
        }

        device.wait_idle()?;
        self.swapchain.drain_presentations(device)?;
        self.swapchain.destroy(device);
        self.pacer.destroy(device);
        self.phase = FramePhase::TornDown;
        Ok(())
    }
}
