// OBJ model with a texture and the free-fly camera
//
// Only the first mesh of the file is used. It must carry normals and
// texture coordinates.

use anyhow::{Context, Result};
use glam::Mat4;
use std::io::BufRead;
use std::path::Path;

use super::camera::Camera;
use super::vertex::{ModelVertex, Vertex, VertexLayout};
use super::{FrameInput, Scene, SceneUpdate, UniformBlock};
use crate::backend::image::TextureData;
use crate::error::RendererError;

/// Flat vertex and triangle-index lists for one mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

pub fn load_mesh(path: &Path) -> Result<MeshData> {
    let (models, _materials) = tobj::load_obj(path, &load_options())
        .with_context(|| format!("Failed to load model {:?}", path))?;
    mesh_from_models(models)
}

/// Parse OBJ text from memory. Material libraries are not resolved.
pub fn load_mesh_from_reader<R: BufRead>(reader: &mut R) -> Result<MeshData> {
    let (models, _materials) = tobj::load_obj_buf(reader, &load_options(), |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })
    .context("Failed to parse OBJ data")?;
    mesh_from_models(models)
}

fn mesh_from_models(models: Vec<tobj::Model>) -> Result<MeshData> {
    let model = models
        .into_iter()
        .next()
        .ok_or_else(|| RendererError::Model("file contains no meshes".into()))?;
    let mesh = model.mesh;
    if mesh.positions.is_empty() || mesh.indices.is_empty() {
        return Err(RendererError::Model(format!("mesh '{}' has no geometry", model.name)).into());
    }

    let vertex_count = mesh.positions.len() / 3;
    if mesh.normals.len() != vertex_count * 3 {
        return Err(RendererError::Model(format!("mesh '{}' has no normals", model.name)).into());
    }
    if mesh.texcoords.len() != vertex_count * 2 {
        return Err(RendererError::Model(format!("mesh '{}' has no texture coordinates", model.name)).into());
    }

    let vertices = (0..vertex_count)
        .map(|v| ModelVertex {
            position: [mesh.positions[3 * v], mesh.positions[3 * v + 1], mesh.positions[3 * v + 2]],
            normal: [mesh.normals[3 * v], mesh.normals[3 * v + 1], mesh.normals[3 * v + 2]],
            // OBJ puts the V origin at the bottom
            tex_coord: [mesh.texcoords[2 * v], 1.0 - mesh.texcoords[2 * v + 1]],
        })
        .collect();

    Ok(MeshData {
        vertices,
        indices: mesh.indices,
    })
}

pub struct ModelScene {
    mesh: MeshData,
    texture: TextureData,
    camera: Camera,
}

impl ModelScene {
    pub fn load(path: &Path, texture: TextureData, camera: Camera) -> Result<Self> {
        let mesh = load_mesh(path)?;
        log::info!("Loaded model {:?}: {} vertices, {} indices", path, mesh.vertices.len(), mesh.indices.len());
        Ok(Self::from_mesh(mesh, texture, camera))
    }

    pub fn from_mesh(mesh: MeshData, texture: TextureData, camera: Camera) -> Self {
        Self { mesh, texture, camera }
    }
}

impl Scene for ModelScene {
    fn name(&self) -> &'static str {
        "model"
    }

    fn vertex_layout(&self) -> VertexLayout {
        ModelVertex::layout()
    }

    fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.mesh.vertices)
    }

    fn indices(&self) -> &[u32] {
        &self.mesh.indices
    }

    fn update(&mut self, frame: &FrameInput) -> SceneUpdate {
        self.camera.update(frame.input, frame.delta);

        SceneUpdate {
            uniforms: UniformBlock {
                model: Mat4::from_rotation_y(std::f32::consts::PI),
                view: self.camera.view(),
                proj: self.camera.projection(frame.aspect),
            },
            vertices_dirty: false,
        }
    }

    fn needs_depth(&self) -> bool {
        true
    }

    fn texture(&self) -> Option<&TextureData> {
        Some(&self.texture)
    }

    fn default_shaders(&self) -> (&'static str, &'static str) {
        ("shaders/model.vert.spv", "shaders/model.frag.spv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
o quad
v -1.0 -1.0 0.0
v 1.0 -1.0 0.0
v 1.0 1.0 0.0
v -1.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn quad_is_triangulated() {
        let mesh = load_mesh_from_reader(&mut QUAD.as_bytes()).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn texture_v_is_flipped() {
        let mesh = load_mesh_from_reader(&mut QUAD.as_bytes()).unwrap();
        let first = mesh.vertices.iter().find(|v| v.position == [-1.0, -1.0, 0.0]).unwrap();
        assert_eq!(first.tex_coord, [0.0, 1.0]);
    }

    #[test]
    fn missing_normals_are_fatal() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nf 1/1 2/2 3/3\n";
        let err = load_mesh_from_reader(&mut obj.as_bytes()).unwrap_err();
        assert!(matches!(err.downcast_ref::<RendererError>(), Some(RendererError::Model(_))));
    }

    #[test]
    fn missing_texcoords_are_fatal() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n";
        let err = load_mesh_from_reader(&mut obj.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("texture coordinates"));
    }

    #[test]
    fn empty_file_has_no_mesh() {
        let err = load_mesh_from_reader(&mut "# nothing here\n".as_bytes()).unwrap_err();
        assert!(matches!(err.downcast_ref::<RendererError>(), Some(RendererError::Model(_))));
    }

    #[test]
    fn mesh_without_faces_is_fatal() {
        let err = load_mesh_from_reader(&mut "o empty\nv 0 0 0\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no geometry"));
    }

    #[test]
    fn bundled_model_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/model.obj");
        let mesh = load_mesh(&path).unwrap();
        assert!(!mesh.indices.is_empty());
        assert_eq!(mesh.indices.len() % 3, 0);
    }
}
