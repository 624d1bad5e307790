// Error taxonomy
//
// Setup failures and per-frame fatal failures get a named variant so callers
// (and tests) can tell them apart after they travel through anyhow.
// Stale/suboptimal swapchains are NOT errors, see swapchain::PresentStatus.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("validation layers requested but not available: {0:?}")]
    ValidationLayersMissing(Vec<String>),

    #[error("no suitable physical device found")]
    NoSuitableDevice,

    #[error("failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("no memory type matches filter {type_filter:#b} with flags {flags:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("asset not found: {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error("invalid identifier '{0}', expected 'namespace:name'")]
    InvalidIdentifier(String),

    #[error("failed to compile shader {label}: {message}")]
    ShaderCompilation { label: String, message: String },

    #[error("presentation failed: {0}")]
    Presentation(vk::Result),
}
