// Animated colour grid
//
// `size x size` vertices spanning [-1, 1] in the XY plane. Hue and depth
// ripple along the diagonals; the vertex buffer is rewritten every frame.

use anyhow::Result;
use glam::Mat4;

use super::camera::Camera;
use super::color::hsv_to_rgb;
use super::vertex::{ColorVertex3D, Vertex, VertexLayout};
use super::{FrameInput, Scene, SceneUpdate, UniformBlock};

pub struct GridScene {
    size: u32,
    vertices: Vec<ColorVertex3D>,
    indices: Vec<u32>,
    camera: Camera,
}

impl GridScene {
    pub fn new(size: u32, camera: Camera) -> Result<Self> {
        anyhow::ensure!(size >= 2, "Grid size must be at least 2, got {}", size);

        let mut scene = Self {
            size,
            vertices: grid_positions(size),
            indices: grid_indices(size),
            camera,
        };
        scene.animate(0.0);
        Ok(scene)
    }

    pub fn vertices(&self) -> &[ColorVertex3D] {
        &self.vertices
    }

    fn animate(&mut self, time: f32) {
        let n = self.size as usize;
        for (index, vertex) in self.vertices.iter_mut().enumerate() {
            let (i, j) = (index / n, index % n);
            let diagonal = i as f32 - j as f32;

            let hue = (time * 10.0 + diagonal * 200.0 / n as f32).rem_euclid(360.0);
            vertex.color = hsv_to_rgb(hue, 1.0, 1.0);
            vertex.position[2] = (time + diagonal * 10.0 / n as f32).sin() * 0.1;
        }
    }
}

/// Row-major: vertex `(i, j)` sits at `i * size + j`
pub fn grid_positions(size: u32) -> Vec<ColorVertex3D> {
    let step = 2.0 / (size - 1) as f32;
    (0..size)
        .flat_map(|i| {
            (0..size).map(move |j| ColorVertex3D {
                position: [-1.0 + step * j as f32, -1.0 + step * i as f32, 0.0],
                color: [0.0; 3],
            })
        })
        .collect()
}

/// Two triangles per cell, `(a, b, c)` and `(b, d, c)`
pub fn grid_indices(size: u32) -> Vec<u32> {
    let cells = (size - 1) as usize;
    let mut indices = Vec::with_capacity(cells * cells * 6);
    for i in 0..size - 1 {
        for j in 0..size - 1 {
            let a = i * size + j;
            let b = a + 1;
            let c = a + size;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
    }
    indices
}

impl Scene for GridScene {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn vertex_layout(&self) -> VertexLayout {
        ColorVertex3D::layout()
    }

    fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn indices(&self) -> &[u32] {
        &self.indices
    }

    fn update(&mut self, frame: &FrameInput) -> SceneUpdate {
        self.camera.update(frame.input, frame.delta);
        self.animate(frame.time);

        SceneUpdate {
            uniforms: UniformBlock {
                model: Mat4::from_rotation_y(std::f32::consts::PI),
                view: self.camera.view(),
                proj: self.camera.projection(frame.aspect),
            },
            vertices_dirty: true,
        }
    }

    fn default_shaders(&self) -> (&'static str, &'static str) {
        ("shaders/color3d.vert.spv", "shaders/color.frag.spv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::input::InputState;
    use glam::Vec4;

    fn scene(size: u32) -> GridScene {
        GridScene::new(size, Camera::from_config(&CameraConfig::default())).unwrap()
    }

    #[test]
    fn geometry_counts() {
        let grid = scene(4);
        assert_eq!(grid.vertices().len(), 16);
        assert_eq!(grid.indices().len(), 3 * 3 * 6);
        assert!(grid.indices().iter().all(|&i| i < 16));
    }

    #[test]
    fn corners_span_unit_square() {
        let grid = scene(3);
        let v = grid.vertices();
        assert_eq!(&v[0].position[..2], &[-1.0, -1.0]);
        assert_eq!(&v[2].position[..2], &[1.0, -1.0]);
        assert_eq!(&v[8].position[..2], &[1.0, 1.0]);
        assert_eq!(&v[4].position[..2], &[0.0, 0.0]);
    }

    #[test]
    fn first_cell_indices() {
        assert_eq!(&grid_indices(3)[..6], &[0, 1, 3, 1, 4, 3]);
    }

    #[test]
    fn too_small_grid_is_rejected() {
        assert!(GridScene::new(1, Camera::from_config(&CameraConfig::default())).is_err());
    }

    #[test]
    fn triangles_face_the_default_camera() {
        let mut grid = scene(5);
        let input = InputState::default();
        let update = grid.update(&FrameInput { time: 0.0, delta: 0.0, aspect: 4.0 / 3.0, input: &input });
        let mvp = update.uniforms.proj * update.uniforms.view * update.uniforms.model;

        let screen: Vec<[f32; 2]> = grid
            .vertices()
            .iter()
            .map(|v| {
                let clip = mvp * Vec4::new(v.position[0], v.position[1], v.position[2], 1.0);
                [clip.x / clip.w, clip.y / clip.w]
            })
            .collect();

        // Positive signed area in y-down NDC is clockwise, the front face
        for tri in grid.indices().chunks(3) {
            let [a, b, c] = [screen[tri[0] as usize], screen[tri[1] as usize], screen[tri[2] as usize]];
            let area = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(area > 0.0, "triangle {tri:?} is back-facing");
        }
    }

    #[test]
    fn animation_changes_colour_and_depth() {
        let mut grid = scene(8);
        let input = InputState::default();
        let before = grid.vertices().to_vec();

        let update = grid.update(&FrameInput { time: 1.5, delta: 0.016, aspect: 1.0, input: &input });
        assert!(update.vertices_dirty);
        assert_ne!(before, grid.vertices());

        for (index, v) in grid.vertices().iter().enumerate() {
            let (i, j) = (index / 8, index % 8);
            let expected_z = (1.5 + (i as f32 - j as f32) * 10.0 / 8.0).sin() * 0.1;
            assert!((v.position[2] - expected_z).abs() < 1e-6);
            assert!(v.color.iter().all(|c| (0.0..=1.0).contains(c)));
        }
    }
}
