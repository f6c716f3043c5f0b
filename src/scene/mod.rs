// Scenes: per-frame update and draw list plugged into the frame loop
//
// A scene owns its CPU-side geometry. Each frame it receives the input
// state, returns the uniform block and says whether its vertices changed;
// the renderer re-uploads them through the staging path when they did.

pub mod camera;
pub mod color;
pub mod grid;
pub mod model;
pub mod triangle;
pub mod vertex;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::path::PathBuf;

use crate::backend::image::TextureData;
use crate::config::{CameraConfig, DemoKind, SceneConfig};
use crate::input::InputState;

pub use camera::Camera;
pub use grid::GridScene;
pub use model::ModelScene;
pub use triangle::TriangleScene;
pub use vertex::VertexLayout;

/// Uniform block shared by every vertex shader (binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Default for UniformBlock {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

/// What a scene sees each frame
pub struct FrameInput<'a> {
    /// Seconds since the renderer started
    pub time: f32,
    /// Seconds since the previous frame
    pub delta: f32,
    pub aspect: f32,
    pub input: &'a InputState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneUpdate {
    pub uniforms: UniformBlock,
    pub vertices_dirty: bool,
}

/// One indexed draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

impl DrawCall {
    pub fn all(index_count: usize) -> Self {
        Self {
            index_count: index_count as u32,
            first_index: 0,
            vertex_offset: 0,
        }
    }
}

pub trait Scene {
    fn name(&self) -> &'static str;

    fn vertex_layout(&self) -> VertexLayout;

    /// Current vertex data as raw bytes
    fn vertex_bytes(&self) -> &[u8];

    /// Static after creation
    fn indices(&self) -> &[u32];

    fn update(&mut self, frame: &FrameInput) -> SceneUpdate;

    fn draw_calls(&self) -> Vec<DrawCall> {
        vec![DrawCall::all(self.indices().len())]
    }

    fn needs_depth(&self) -> bool {
        false
    }

    fn texture(&self) -> Option<&TextureData> {
        None
    }

    /// (vertex, fragment) SPIR-V paths
    fn default_shaders(&self) -> (&'static str, &'static str);
}

/// Shader paths for `scene`, with non-empty config entries taking precedence
pub fn shader_paths(scene: &dyn Scene, config: &SceneConfig) -> (PathBuf, PathBuf) {
    let (vert, frag) = scene.default_shaders();
    let pick = |over: &str, default: &str| {
        if over.is_empty() {
            PathBuf::from(default)
        } else {
            PathBuf::from(over)
        }
    };
    (pick(&config.vertex_shader, vert), pick(&config.fragment_shader, frag))
}

pub fn build_scene(config: &SceneConfig, camera: &CameraConfig) -> Result<Box<dyn Scene>> {
    let scene: Box<dyn Scene> = match config.demo {
        DemoKind::Triangle => Box::new(TriangleScene::new()),
        DemoKind::Grid => Box::new(GridScene::new(config.grid_size, Camera::from_config(camera))?),
        DemoKind::Model => {
            let texture = match &config.texture_path {
                Some(path) => TextureData::load_png(path)?,
                None => TextureData::white(),
            };
            Box::new(ModelScene::load(&config.model_path, texture, Camera::from_config(camera))?)
        }
    };

    log::info!(
        "Scene '{}': {} vertex bytes, {} indices",
        scene.name(),
        scene.vertex_bytes().len(),
        scene.indices().len()
    );
    Ok(scene)
}
