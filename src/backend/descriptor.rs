// Descriptor sets for per-slot uniforms
//
// Binding 0: uniform buffer (vertex stage)
// Binding 1: combined image sampler (fragment stage), textured scenes only

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

pub fn layout_bindings(textured: bool) -> Vec<vk::DescriptorSetLayoutBinding> {
    let mut bindings = vec![vk::DescriptorSetLayoutBinding::builder()
        .binding(UNIFORM_BINDING)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .build()];

    if textured {
        bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(SAMPLER_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .build(),
        );
    }

    bindings
}

/// Pool sizes for `sets` descriptor sets of the given layout
pub fn pool_sizes(sets: u32, textured: bool) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes = vec![vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: sets,
    }];
    if textured {
        sizes.push(vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: sets,
        });
    }
    sizes
}

/// Layout, pool and one set per frame slot
pub struct Descriptors {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    textured: bool,
    device: Arc<VulkanDevice>,
}

impl Descriptors {
    pub fn new(device: &Arc<VulkanDevice>, set_count: u32, textured: bool) -> Result<Self> {
        let bindings = layout_bindings(textured);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let mut this = Self {
            layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
            textured,
            device: device.clone(),
        };

        this.layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;

        let sizes = pool_sizes(set_count, textured);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&sizes)
            .max_sets(set_count);

        this.pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        let layouts = vec![this.layout; set_count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(this.pool)
            .set_layouts(&layouts);

        this.sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        Ok(this)
    }

    /// Point set `slot` at its uniform buffer and, for textured scenes, the
    /// texture.
    pub fn write(
        &self,
        slot: usize,
        uniform_buffer: vk::Buffer,
        uniform_size: vk::DeviceSize,
        texture: Option<(vk::ImageView, vk::Sampler)>,
    ) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: uniform_buffer,
            offset: 0,
            range: uniform_size,
        }];

        let mut writes = vec![vk::WriteDescriptorSet::builder()
            .dst_set(self.sets[slot])
            .dst_binding(UNIFORM_BINDING)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build()];

        let image_info;
        if let (true, Some((view, sampler))) = (self.textured, texture) {
            image_info = [vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }];
            writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(self.sets[slot])
                    .dst_binding(SAMPLER_BINDING)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
                    .build(),
            );
        }

        unsafe { self.device.device.update_descriptor_sets(&writes, &[]) };
    }
}

impl Drop for Descriptors {
    fn drop(&mut self) {
        // Sets are freed with the pool
        unsafe {
            self.device.device.destroy_descriptor_pool(self.pool, None);
            self.device.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untextured_layout_has_only_the_uniform_block() {
        let bindings = layout_bindings(false);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding, UNIFORM_BINDING);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(pool_sizes(3, false).len(), 1);
    }

    #[test]
    fn textured_layout_adds_a_fragment_sampler() {
        let bindings = layout_bindings(true);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);

        let sizes = pool_sizes(3, true);
        assert!(sizes.iter().all(|s| s.descriptor_count == 3));
    }
}
