// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with explicit, caller-ordered teardown
// Every type here exposes destroy(); nothing relies on Drop order

pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use pipeline::GraphicsPipeline;
pub use swapchain::{PresentStatus, Swapchain};
