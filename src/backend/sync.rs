// Synchronization primitives
//
// One FrameSlot per frame in flight. The fence is host-visible and guards
// reuse of the slot's command buffer; the two semaphores only order
// acquire -> submit -> present on the GPU.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    /// Owned by the renderer's command pool, freed with it
    pub command_buffer: vk::CommandBuffer,
    device: Arc<VulkanDevice>,
}

impl FrameSlot {
    pub fn new(device: &Arc<VulkanDevice>, command_buffer: vk::CommandBuffer) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first wait on a fresh slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut slot = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            command_buffer,
            device: device.clone(),
        };

        unsafe {
            slot.image_available = device.device.create_semaphore(&semaphore_info, None)
                .context("Failed to create semaphores")?;
            slot.render_finished = device.device.create_semaphore(&semaphore_info, None)
                .context("Failed to create semaphores")?;
            slot.in_flight_fence = device.device.create_fence(&fence_info, None)
                .context("Failed to create fence")?;
        }

        Ok(slot)
    }

    /// Block until the GPU has finished the previous use of this slot
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device.device.wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
        }
        .context("Failed to wait for in-flight fence")
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.device.reset_fences(&[self.in_flight_fence]) }
            .context("Failed to reset in-flight fence")
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        // Destroying null handles is a no-op
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
