// Images: depth attachments and sampled textures
//
// Same memory-type search as buffers; textures are filled through a staging
// buffer, a layout transition and a buffer-to-image copy.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::find_memory_type;
use super::command::CommandPool;
use super::upload::staging_buffer;
use super::VulkanDevice;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// An image with its backing memory and a 2-D view
pub struct Image {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Image {
    pub fn new(
        device: &Arc<VulkanDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device.device.create_image(&image_info, None)
                .context("Failed to create image")?
        };

        let memory = match bind_image_memory(device, image) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = match create_image_view(device, image, format, aspect) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.device.destroy_image(image, None);
                    device.device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            image,
            memory,
            view,
            format,
            extent,
            device: device.clone(),
        })
    }

    /// Depth attachment matching the swapchain extent
    pub fn depth(device: &Arc<VulkanDevice>, extent: vk::Extent2D) -> Result<Self> {
        let image = Self::new(
            device,
            extent,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?;
        log::info!("Depth image created: {}x{}", extent.width, extent.height);
        Ok(image)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

/// Allocate DEVICE_LOCAL memory for `image` and bind it at offset 0
fn bind_image_memory(device: &VulkanDevice, image: vk::Image) -> Result<vk::DeviceMemory> {
    let mem_requirements = unsafe { device.device.get_image_memory_requirements(image) };

    let memory_type_index = find_memory_type(
        &device.physical.memory_properties,
        mem_requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device.device.allocate_memory(&alloc_info, None)
            .context("Failed to allocate image memory")?
    };

    if let Err(e) = unsafe { device.device.bind_image_memory(image, memory, 0) } {
        unsafe { device.device.free_memory(memory, None) };
        return Err(e).context("Failed to bind image memory");
    }

    Ok(memory)
}

/// 2-D view, identity swizzle, single mip level and array layer
pub fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(subresource_range(aspect));

    unsafe {
        device.device.create_image_view(&view_info, None)
            .context("Unable to create image views")
    }
}

pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Access masks and stages for the layout transitions the renderer uses
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        _ => anyhow::bail!("Unsupported layout transition {:?} -> {:?}", old_layout, new_layout),
    }
}

/// Record and run a pipeline barrier moving `image` between layouts
pub fn transition_image_layout(
    pool: &CommandPool,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let (src_access, dst_access, src_stage, dst_stage) = transition_masks(old_layout, new_layout)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect))
        .build();

    pool.submit_and_wait(|device, cmd| unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    })
}

pub fn copy_buffer_to_image(
    pool: &CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> Result<()> {
    let region = vk::BufferImageCopy::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .build();

    pool.submit_and_wait(|device, cmd| unsafe {
        device.cmd_copy_buffer_to_image(cmd, buffer, image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[region]);
    })
}

/// Decoded RGBA8 pixels ready for upload
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        }
    }

    /// Decode a PNG into RGBA8
    pub fn load_png(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Can't open texture {:?}", path))?;
        Self::decode_png(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to decode texture {:?}", path))
    }

    pub fn decode_png<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut decoder = png::Decoder::new(reader);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder.read_info()?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf)?;
        buf.truncate(info.buffer_size());

        let pixels = match info.color_type {
            png::ColorType::Rgba => buf,
            png::ColorType::Rgb => buf.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect(),
            png::ColorType::GrayscaleAlpha => buf.chunks_exact(2).flat_map(|p| [p[0], p[0], p[0], p[1]]).collect(),
            png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
            png::ColorType::Indexed => anyhow::bail!("Indexed PNG was not expanded"),
        };

        Ok(Self {
            width: info.width,
            height: info.height,
            pixels,
        })
    }
}

/// Sampled texture: image in SHADER_READ_ONLY_OPTIMAL plus a sampler
pub struct Texture {
    pub sampler: vk::Sampler,
    pub image: Image,
}

impl Texture {
    pub fn new(device: &Arc<VulkanDevice>, pool: &CommandPool, data: &TextureData) -> Result<Self> {
        let extent = vk::Extent2D {
            width: data.width,
            height: data.height,
        };
        anyhow::ensure!(
            data.pixels.len() == (data.width * data.height * 4) as usize,
            "Texture data is {} bytes, expected {}x{} RGBA",
            data.pixels.len(),
            data.width,
            data.height
        );

        let staging = staging_buffer(device, &data.pixels)?;
        let image = Image::new(
            device,
            extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;

        transition_image_layout(
            pool,
            image.image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        copy_buffer_to_image(pool, staging.buffer, image.image, extent)?;
        transition_image_layout(
            pool,
            image.image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        let sampler = unsafe { device.device.create_sampler(&sampler_info, None) }
            .context("Failed to create texture sampler")?;

        log::info!("Texture uploaded: {}x{}", data.width, data.height);

        Ok(Self { sampler, image })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe { self.image.device.device.destroy_sampler(self.sampler, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_transitions_have_masks() {
        let (src, dst, src_stage, dst_stage) =
            transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert!(src.is_empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (_, dst, _, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn unsupported_transition_is_an_error() {
        assert!(transition_masks(vk::ImageLayout::PRESENT_SRC_KHR, vk::ImageLayout::GENERAL).is_err());
        // The depth attachment is laid out by the render pass, not a barrier
        assert!(transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        )
        .is_err());
    }

    #[test]
    fn white_texture_is_one_opaque_pixel() {
        let white = TextureData::white();
        assert_eq!((white.width, white.height), (1, 1));
        assert_eq!(white.pixels, vec![255, 255, 255, 255]);
    }

    #[test]
    fn rgb_png_is_expanded_to_rgba() {
        let mut encoded = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut encoded, 2, 1);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[10, 20, 30, 40, 50, 60]).unwrap();
        }

        let texture = TextureData::decode_png(encoded.as_slice()).unwrap();
        assert_eq!((texture.width, texture.height), (2, 1));
        assert_eq!(texture.pixels, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }
}
