// Renderer - owns every GPU resource of a run and drives the frame loop
//
// Ownership follows creation order: device -> swapchain -> render pass ->
// depth image -> framebuffers -> pipeline -> buffers/texture -> descriptor
// sets -> command pool -> frame slots. Fields are declared in reverse so the
// default drop order tears everything down back to front.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use crate::backend::descriptor::Descriptors;
use crate::backend::image::{Image, Texture, DEPTH_FORMAT};
use crate::backend::pipeline::{GraphicsPipeline, PipelineDesc, RenderPass};
use crate::backend::sync::FrameSlot;
use crate::backend::upload::{create_device_local_buffer, upload_to_buffer};
use crate::backend::{Buffer, CommandPool, MappedBuffer, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::error::RendererError;
use crate::frame::FrameDriver;
use crate::scene::{self, DrawCall, Scene, UniformBlock};

pub struct Renderer {
    slots: Vec<FrameSlot>,
    command_pool: CommandPool,
    descriptors: Descriptors,
    uniform_buffers: Vec<MappedBuffer>,
    _texture: Option<Texture>,
    index_buffer: Buffer,
    vertex_buffer: Buffer,
    pipeline: GraphicsPipeline,
    depth_image: Option<Image>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    clear_color: [f32; 4],
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(device: Arc<VulkanDevice>, config: &Config, scene: &dyn Scene, width: u32, height: u32) -> Result<Self> {
        let mut swapchain = Swapchain::new(
            &device,
            config.preferred_present_mode(),
            config.graphics.image_count_policy,
            width,
            height,
        )?;
        let slot_count = swapchain.image_count();

        let depth_format = scene.needs_depth().then_some(DEPTH_FORMAT);
        let render_pass = RenderPass::new(&device, swapchain.format, depth_format)?;
        let depth_image = match depth_format {
            Some(_) => Some(Image::depth(&device, swapchain.extent)?),
            None => None,
        };
        swapchain.create_framebuffers(render_pass.handle, depth_image.as_ref().map(|d| d.view))?;

        let textured = scene.texture().is_some();
        let descriptors = Descriptors::new(&device, slot_count as u32, textured)?;

        let (vertex_shader, fragment_shader) = scene::shader_paths(scene, &config.scene);
        let layout = scene.vertex_layout();
        let pipeline = GraphicsPipeline::new(
            &device,
            &render_pass,
            &PipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                bindings: &[layout.binding_description()],
                attributes: &layout.attribute_descriptions(),
                descriptor_set_layout: descriptors.layout,
                extent: swapchain.extent,
            },
        )?;

        let command_pool = CommandPool::new(&device)?;

        let vertex_buffer = create_device_local_buffer(
            &device,
            &command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            scene.vertex_bytes(),
        )?;
        let index_buffer = create_device_local_buffer(
            &device,
            &command_pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(scene.indices()),
        )?;
        log::info!(
            "Vertex buffer: {} bytes, index buffer: {} indices",
            vertex_buffer.size,
            scene.indices().len()
        );

        let texture = match scene.texture() {
            Some(data) => Some(Texture::new(&device, &command_pool, data)?),
            None => None,
        };

        let uniform_size = std::mem::size_of::<UniformBlock>() as vk::DeviceSize;
        let uniform_buffers = (0..slot_count)
            .map(|_| MappedBuffer::new(&device, uniform_size, vk::BufferUsageFlags::UNIFORM_BUFFER))
            .collect::<Result<Vec<_>>>()?;

        let texture_binding = texture.as_ref().map(|t| (t.image.view, t.sampler));
        for (slot, uniforms) in uniform_buffers.iter().enumerate() {
            descriptors.write(slot, uniforms.buffer.buffer, uniform_size, texture_binding);
        }

        let command_buffers = command_pool.allocate(slot_count as u32)?;
        let slots = command_buffers
            .into_iter()
            .map(|cmd| FrameSlot::new(&device, cmd))
            .collect::<Result<Vec<_>>>()?;

        log::info!("Renderer ready: {} frame slots", slots.len());

        Ok(Self {
            slots,
            command_pool,
            descriptors,
            uniform_buffers,
            _texture: texture,
            index_buffer,
            vertex_buffer,
            pipeline,
            depth_image,
            render_pass,
            swapchain,
            clear_color: config.graphics.clear_color,
            device,
        })
    }

    /// Number of frame slots, equal to the swapchain image count
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    fn clear_values(&self) -> Vec<vk::ClearValue> {
        let mut values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        if self.depth_image.is_some() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        }
        values
    }
}

impl FrameDriver for Renderer {
    fn upload_vertices(&mut self, bytes: &[u8]) -> Result<()> {
        // The vertex buffer is shared by every slot in flight
        unsafe { self.device.device.queue_wait_idle(self.device.queue.handle) }
            .context("Failed to drain queue before vertex upload")?;
        upload_to_buffer(&self.device, &self.command_pool, &self.vertex_buffer, bytes)
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.slots[slot].wait()
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.slots[slot].reset()
    }

    fn write_uniforms(&mut self, slot: usize, uniforms: &UniformBlock) -> Result<()> {
        self.uniform_buffers[slot].write(bytemuck::bytes_of(uniforms));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<u32> {
        self.swapchain.acquire_next_image(self.slots[slot].image_available)
    }

    fn record(&mut self, slot: usize, image_index: u32, draws: &[DrawCall]) -> Result<()> {
        let device = &self.device.device;
        let cmd = self.slots[slot].command_buffer;
        let framebuffer = *self
            .swapchain
            .framebuffers
            .get(image_index as usize)
            .context("Acquired image has no framebuffer")?;
        let clear_values = self.clear_values();

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device.begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin recording command buffer")?;

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.handle)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.swapchain.extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptors.sets[slot]],
                &[],
            );

            for draw in draws {
                device.cmd_draw_indexed(cmd, draw.index_count, 1, draw.first_index, draw.vertex_offset, 0);
            }

            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)
                .context("Failed to record command buffer")?;
        }

        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = &self.slots[slot];
        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.queue.handle, &[submit_info.build()], frame.in_flight_fence)
        }
        .map_err(|e| RendererError::SubmitFailed(e).into())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.swapchain
            .present(self.device.queue.handle, image_index, &[self.slots[slot].render_finished])
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer resources...");
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {:?}", e);
        }
        // Framebuffers reference the depth view and render pass, which drop
        // before the swapchain
        self.swapchain.destroy_framebuffers();
    }
}
