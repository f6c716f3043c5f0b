// Static RGB triangle with identity transforms

use super::vertex::{ColorVertex2D, Vertex, VertexLayout};
use super::{FrameInput, Scene, SceneUpdate, UniformBlock};

pub const TRIANGLE_VERTICES: [ColorVertex2D; 3] = [
    ColorVertex2D { position: [0.0, -0.5], color: [1.0, 0.0, 0.0] },
    ColorVertex2D { position: [0.5, 0.5], color: [0.0, 1.0, 0.0] },
    ColorVertex2D { position: [-0.5, 0.5], color: [0.0, 0.0, 1.0] },
];

pub struct TriangleScene {
    vertices: Vec<ColorVertex2D>,
    indices: Vec<u32>,
}

impl TriangleScene {
    pub fn new() -> Self {
        Self {
            vertices: TRIANGLE_VERTICES.to_vec(),
            indices: vec![0, 1, 2],
        }
    }
}

impl Default for TriangleScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for TriangleScene {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn vertex_layout(&self) -> VertexLayout {
        ColorVertex2D::layout()
    }

    fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn indices(&self) -> &[u32] {
        &self.indices
    }

    fn update(&mut self, _frame: &FrameInput) -> SceneUpdate {
        SceneUpdate {
            uniforms: UniformBlock::default(),
            vertices_dirty: false,
        }
    }

    fn default_shaders(&self) -> (&'static str, &'static str) {
        ("shaders/color2d.vert.spv", "shaders/color.frag.spv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputState;

    #[test]
    fn triangle_is_clockwise_on_screen() {
        // Vulkan NDC has +Y pointing down, so a positive signed area in
        // (x, y) means clockwise as displayed.
        let [a, b, c] = TRIANGLE_VERTICES.map(|v| v.position);
        let area = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        assert!(area > 0.0);
    }

    #[test]
    fn update_is_static() {
        let mut scene = TriangleScene::new();
        let input = InputState::default();
        let frame = FrameInput { time: 3.0, delta: 0.016, aspect: 1.5, input: &input };
        let update = scene.update(&frame);
        assert!(!update.vertices_dirty);
        assert_eq!(update.uniforms, UniformBlock::default());
        assert_eq!(scene.vertex_bytes().len(), 3 * 20);
        assert_eq!(scene.draw_calls()[0].index_count, 3);
    }
}
