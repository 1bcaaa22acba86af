//! Frames in flight.
//!
//! A fixed ring of recording contexts. Waiting on a slot's submission fence
//! before reusing it is the only thing bounding how far the CPU runs ahead of
//! the GPU.

use crate::device::PresentDevice;
use crate::error::{GpuError, Result};
use ash::vk;

/// One recording context.
#[derive(Debug)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by acquire, waited on by the submission. Never waited on by
    /// the host.
    pub image_acquired: vk::Semaphore,
    /// Signaled when this slot's last submission completes.
    pub submit_fence: vk::Fence,
    /// Swapchain image this slot last acquired.
    pub image_index: Option<u32>,
}

/// Round-robin ring of [`FrameSlot`]s.
pub struct FramePacer {
    command_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
}

impl FramePacer {
    /// Create `slot_count` slots recording for `queue_family`.
    pub fn new(device: &impl PresentDevice, queue_family: u32, slot_count: usize) -> Result<Self> {
        if slot_count == 0 {
            return Err(GpuError::InvalidState(
                "frame pacer needs at least one slot".into(),
            ));
        }

        let command_pool = device.create_command_pool(queue_family)?;
        let mut pacer = Self {
            command_pool,
            slots: Vec::with_capacity(slot_count),
        };

        if let Err(e) = pacer.create_slots(device, slot_count) {
            pacer.destroy(device);
            return Err(e);
        }

        tracing::debug!("Created {slot_count} frames in flight");
        Ok(pacer)
    }

    fn create_slots(&mut self, device: &impl PresentDevice, slot_count: usize) -> Result<()> {
        let command_buffers = device.allocate_command_buffers(self.command_pool, slot_count as u32)?;

        for command_buffer in command_buffers {
            let image_acquired = device.create_semaphore()?;
            let submit_fence = match device.create_fence(true) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_semaphore(image_acquired);
                    return Err(e);
                }
            };

            self.slots.push(FrameSlot {
                command_buffer,
                image_acquired,
                submit_fence,
                image_index: None,
            });
        }
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot used by `frame_number`.
    pub fn slot_index(&self, frame_number: u64) -> usize {
        (frame_number % self.slots.len() as u64) as usize
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Block until the slot for `frame_number` has no queued work.
    ///
    /// The fence is left signaled so that a frame abandoned before submission
    /// does not leave a fence nothing will signal. Call [`Self::arm_slot`]
    /// once an image has been acquired and [`Self::reset_fence`] right before
    /// submitting.
    pub fn acquire_slot(&self, device: &impl PresentDevice, frame_number: u64) -> Result<usize> {
        let index = self.slot_index(frame_number);
        device.wait_for_fences(&[self.slots[index].submit_fence])?;
        Ok(index)
    }

    /// Reset the slot's command buffer for recording into `image_index`.
    pub fn arm_slot(
        &mut self,
        device: &impl PresentDevice,
        index: usize,
        image_index: u32,
    ) -> Result<&FrameSlot> {
        let slot = &mut self.slots[index];
        device.reset_command_buffer(slot.command_buffer)?;
        slot.image_index = Some(image_index);
        Ok(slot)
    }

    /// Unsignal the slot's fence. The next call on the slot must be a submit
    /// carrying that fence.
    pub fn reset_fence(&self, device: &impl PresentDevice, index: usize) -> Result<vk::Fence> {
        let fence = self.slots[index].submit_fence;
        device.reset_fences(&[fence])?;
        Ok(fence)
    }

    /// Fences of every slot.
    pub fn fences(&self) -> Vec<vk::Fence> {
        self.slots.iter().map(|slot| slot.submit_fence).collect()
    }

    /// Destroy all slots. Callers wait for the device to go idle first.
    pub fn destroy(&mut self, device: &impl PresentDevice) {
        for slot in self.slots.drain(..) {
            device.destroy_fence(slot.submit_fence);
            device.destroy_semaphore(slot.image_acquired);
        }
        if self.command_pool != vk::CommandPool::null() {
            device.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }
    }
}
