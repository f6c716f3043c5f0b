// Buffer utilities for vertex, index, uniform and staging buffers
//
// Each Buffer owns its VkBuffer and the VkDeviceMemory bound to it.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::error::RendererError;

pub const HOST_VISIBLE_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// A buffer tagged with its backing memory
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub properties: vk::MemoryPropertyFlags,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    /// Create a buffer, pick the first compatible memory type, allocate and
    /// bind at offset 0.
    pub fn new(
        device: &Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        // Zero-sized buffers are invalid in Vulkan
        let alloc_size = size.max(1);

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(alloc_size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.device.create_buffer(&buffer_info, None)
                .context("Unable to create buffer")?
        };

        let mem_requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match find_memory_type(
            &device.physical.memory_properties,
            mem_requirements.memory_type_bits,
            properties,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).context("Unable to allocate buffer memory");
            }
        };

        if let Err(e) = unsafe { device.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.device.destroy_buffer(buffer, None);
                device.device.free_memory(memory, None);
            }
            return Err(e).context("Failed to bind buffer memory");
        }

        Ok(Self {
            buffer,
            memory,
            size,
            properties,
            device: device.clone(),
        })
    }

    /// Map, copy `bytes` to offset 0, unmap. Memory must be host-visible.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        anyhow::ensure!(
            bytes.len() as vk::DeviceSize <= self.size,
            "Write of {} bytes overflows buffer of {} bytes",
            bytes.len(),
            self.size
        );

        unsafe {
            let ptr = self.device.device.map_memory(
                self.memory,
                0,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )? as *mut u8;

            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            self.device.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Map and copy out the first `len` bytes. Memory must be host-visible.
    pub fn read_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        if len == 0 {
            return Ok(out);
        }

        unsafe {
            let ptr = self.device.device.map_memory(
                self.memory,
                0,
                len as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )? as *const u8;

            ptr.copy_to_nonoverlapping(out.as_mut_ptr(), len);
            self.device.device.unmap_memory(self.memory);
        }

        Ok(out)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

/// Host-visible, coherent buffer that stays mapped for its whole life.
/// Used for per-frame uniform data.
pub struct MappedBuffer {
    pub buffer: Buffer,
    ptr: *mut u8,
}

impl MappedBuffer {
    pub fn new(device: &Arc<VulkanDevice>, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Result<Self> {
        let buffer = Buffer::new(device, size, usage, HOST_VISIBLE_COHERENT)?;
        let ptr = unsafe {
            device.device.map_memory(buffer.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .context("Failed to map uniform buffer")? as *mut u8
        };
        Ok(Self { buffer, ptr })
    }

    pub fn write(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(self.buffer.size as usize);
        unsafe { self.ptr.copy_from_nonoverlapping(bytes.as_ptr(), len) };
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        unsafe { self.buffer.device.device.unmap_memory(self.buffer.memory) };
    }
}

/// Lowest-indexed memory type allowed by `type_filter` whose property flags
/// are a superset of `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, RendererError> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            let has_type = (type_filter & (1 << i)) != 0;
            let has_properties = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            has_type && has_properties
        })
        .ok_or(RendererError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_table(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    fn discrete_gpu_table() -> vk::PhysicalDeviceMemoryProperties {
        memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_VISIBLE_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | HOST_VISIBLE_COHERENT,
            HOST_VISIBLE_COHERENT | vk::MemoryPropertyFlags::HOST_CACHED,
        ])
    }

    #[test]
    fn returns_lowest_matching_index() {
        let table = discrete_gpu_table();
        assert_eq!(find_memory_type(&table, 0b1111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
        assert_eq!(find_memory_type(&table, 0b1111, HOST_VISIBLE_COHERENT).unwrap(), 1);
    }

    #[test]
    fn type_filter_masks_out_candidates() {
        let table = discrete_gpu_table();
        assert_eq!(find_memory_type(&table, 0b1100, HOST_VISIBLE_COHERENT).unwrap(), 2);
        assert_eq!(find_memory_type(&table, 0b1000, HOST_VISIBLE_COHERENT).unwrap(), 3);
    }

    #[test]
    fn flags_must_be_a_superset() {
        let table = discrete_gpu_table();
        let wanted = vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(find_memory_type(&table, 0b1111, wanted).unwrap(), 2);
        assert_eq!(find_memory_type(&table, 0b1111, vk::MemoryPropertyFlags::empty()).unwrap(), 0);
    }

    #[test]
    fn no_match_is_an_error() {
        let table = discrete_gpu_table();
        let err = find_memory_type(&table, 0b0011, vk::MemoryPropertyFlags::HOST_CACHED).unwrap_err();
        assert!(matches!(err, RendererError::NoSuitableMemoryType { type_filter: 0b0011, .. }));

        assert!(find_memory_type(&table, 0, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn filter_bits_beyond_type_count_are_ignored() {
        let table = memory_table(&[HOST_VISIBLE_COHERENT]);
        assert!(find_memory_type(&table, 0b10, HOST_VISIBLE_COHERENT).is_err());
        assert_eq!(find_memory_type(&table, u32::MAX, HOST_VISIBLE_COHERENT).unwrap(), 0);
    }

    #[test]
    fn exhaustive_against_brute_force() {
        let table = discrete_gpu_table();
        let flag_sets = [
            vk::MemoryPropertyFlags::empty(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            HOST_VISIBLE_COHERENT,
            vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
        ];
        for filter in 0u32..16 {
            for &flags in &flag_sets {
                let expected = (0..4u32).find(|&i| {
                    filter & (1 << i) != 0 && table.memory_types[i as usize].property_flags.contains(flags)
                });
                assert_eq!(find_memory_type(&table, filter, flags).ok(), expected, "filter {filter:#b} {flags:?}");
            }
        }
    }
}
