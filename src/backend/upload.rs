// Staging uploads
//
// Host data goes through a temporary HOST_VISIBLE | HOST_COHERENT buffer and
// is copied into DEVICE_LOCAL memory by a one-shot command buffer. Every
// transfer waits for the queue to drain before returning.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::buffer::{Buffer, HOST_VISIBLE_COHERENT};
use super::command::CommandPool;
use super::VulkanDevice;

/// Copy `size` bytes from `src` to `dst` and wait for completion
pub fn copy_buffer(pool: &CommandPool, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> Result<()> {
    if size == 0 {
        return Ok(());
    }

    pool.submit_and_wait(|device, cmd| unsafe {
        let region = vk::BufferCopy::builder().size(size).build();
        device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
    })
}

/// Host-visible staging buffer already filled with `bytes`
pub fn staging_buffer(device: &Arc<VulkanDevice>, bytes: &[u8]) -> Result<Buffer> {
    let staging = Buffer::new(
        device,
        bytes.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        HOST_VISIBLE_COHERENT,
    )?;
    staging.write_bytes(bytes)?;
    Ok(staging)
}

/// Overwrite the start of a device-local buffer with `bytes`.
/// The staging buffer is destroyed before returning.
pub fn upload_to_buffer(device: &Arc<VulkanDevice>, pool: &CommandPool, dst: &Buffer, bytes: &[u8]) -> Result<()> {
    anyhow::ensure!(
        bytes.len() as vk::DeviceSize <= dst.size,
        "Upload of {} bytes overflows buffer of {} bytes",
        bytes.len(),
        dst.size
    );

    let staging = staging_buffer(device, bytes)?;
    copy_buffer(pool, &staging, dst, bytes.len() as vk::DeviceSize)
}

/// Create a DEVICE_LOCAL buffer (with TRANSFER_DST added to `usage`) and
/// fill it from `bytes`.
pub fn create_device_local_buffer(
    device: &Arc<VulkanDevice>,
    pool: &CommandPool,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> Result<Buffer> {
    let buffer = Buffer::new(
        device,
        bytes.len() as vk::DeviceSize,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    upload_to_buffer(device, pool, &buffer, bytes)?;

    log::debug!("Uploaded {} bytes into device-local {:?} buffer", bytes.len(), usage);
    Ok(buffer)
}

/// Read back the first `len` bytes of a device-local buffer. The source must
/// have been created with TRANSFER_SRC usage.
pub fn download_buffer(device: &Arc<VulkanDevice>, pool: &CommandPool, src: &Buffer, len: usize) -> Result<Vec<u8>> {
    let staging = Buffer::new(
        device,
        len as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_DST,
        HOST_VISIBLE_COHERENT,
    )?;
    copy_buffer(pool, src, &staging, len as vk::DeviceSize)?;
    staging.read_bytes(len)
}
