// Vulkan Notes - a small ash renderer
//
// backend/   RAII wrappers: device, swapchain, pipeline, buffers, images
// frame      acquire/record/submit/present protocol over a FrameDriver
// renderer   the ash FrameDriver owning every GPU resource of a run
// scene/     demo content: triangle, animated grid, textured model

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod input;
pub mod renderer;
pub mod scene;

pub use config::Config;
pub use error::RendererError;
pub use frame::{FrameDriver, FrameLoop, SlotState};
pub use renderer::Renderer;
