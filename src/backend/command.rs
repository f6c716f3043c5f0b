// Command pool and one-shot submissions

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    /// Pool on the device's queue family whose buffers can be reset individually
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue.family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Unable to create graphics command pool")?;

        Ok(Self {
            pool,
            device: device.clone(),
        })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Unable to allocate command buffers")
    }

    /// Record `record` into a short-lived command buffer, submit it and
    /// block until the queue is idle. The buffer is freed afterwards.
    ///
    /// This is a full CPU/GPU barrier: it serializes with all other work on
    /// the queue.
    pub fn submit_and_wait<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let device = &self.device.device;
        let cmd = self.allocate(1)?[0];

        let result = (|| -> Result<()> {
            unsafe {
                let begin_info = vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                device.begin_command_buffer(cmd, &begin_info)?;

                record(device, cmd);

                device.end_command_buffer(cmd)?;

                let command_buffers = [cmd];
                let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
                device
                    .queue_submit(self.device.queue.handle, &[submit_info.build()], vk::Fence::null())
                    .context("Failed to submit one-shot command buffer")?;
                device.queue_wait_idle(self.device.queue.handle)?;
            }
            Ok(())
        })();

        unsafe { device.free_command_buffers(self.pool, &[cmd]) };
        result
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_command_pool(self.pool, None) };
    }
}
