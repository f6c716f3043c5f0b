// Renderer error taxonomy
//
// Every variant is fatal. The enum exists so callers (and tests) can tell
// conditions apart after they travel inside anyhow::Error.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Unable to find physical devices")]
    NoPhysicalDevices,

    #[error("Failed to find a suitable GPU")]
    NoSuitableDevice,

    #[error("No queue family supports both graphics and presentation")]
    NoSuitableQueueFamily,

    #[error("Requested layers unavailable: {}", .0.join(", "))]
    MissingLayers(Vec<String>),

    #[error("Unable to find suitable memory type (filter {type_filter:#b}, properties {properties:?})")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Image count policy produced {requested} images, surface allows {min}..={max}")]
    ImageCountPolicy { requested: u32, min: u32, max: u32 },

    #[error("Unable to acquire swapchain image: {0}")]
    AcquireFailed(vk::Result),

    #[error("Unable to submit draw command buffer: {0}")]
    SubmitFailed(vk::Result),

    #[error("Unable to present swapchain image: {0}")]
    PresentFailed(vk::Result),

    #[error("Can't load shader {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model import failed: {0}")]
    Model(String),
}
