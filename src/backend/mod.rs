// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash. Every owner holds an Arc<VulkanDevice> so
// the device outlives the objects created from it.

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod selection;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod upload;

pub use buffer::{Buffer, MappedBuffer};
pub use command::CommandPool;
pub use device::{DeviceDesc, VulkanDevice};
pub use surface::PresentTarget;
pub use swapchain::Swapchain;
