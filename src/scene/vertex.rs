// Vertex formats and their pipeline input descriptions

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Interleaved layout of a single vertex binding
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayout {
    pub stride: u32,
    /// (format, byte offset) per shader location, in location order
    pub attributes: Vec<(vk::Format, u32)>,
}

impl VertexLayout {
    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .enumerate()
            .map(|(location, &(format, offset))| vk::VertexInputAttributeDescription {
                location: location as u32,
                binding: 0,
                format,
                offset,
            })
            .collect()
    }
}

/// Vertex types that know their own pipeline layout
pub trait Vertex: Pod {
    fn layout() -> VertexLayout;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex2D {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex for ColorVertex2D {
    fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Self>() as u32,
            attributes: vec![(vk::Format::R32G32_SFLOAT, 0), (vk::Format::R32G32B32_SFLOAT, 8)],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex3D {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex for ColorVertex3D {
    fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Self>() as u32,
            attributes: vec![(vk::Format::R32G32B32_SFLOAT, 0), (vk::Format::R32G32B32_SFLOAT, 12)],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex for ModelVertex {
    fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Self>() as u32,
            attributes: vec![
                (vk::Format::R32G32B32_SFLOAT, 0),
                (vk::Format::R32G32B32_SFLOAT, 12),
                (vk::Format::R32G32_SFLOAT, 24),
            ],
        }
    }
}
