//! GPU error types.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// The swapchain no longer matches the surface and must be rebuilt.
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// A shader binary could not be read.
    #[error("Failed to load shader {path}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl GpuError {
    /// Whether the frame loop can recover by rebuilding the swapchain.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SwapchainOutOfDate | Self::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)
        )
    }
}

/// Map a raw acquire/present result, turning `ERROR_OUT_OF_DATE_KHR` into
/// [`GpuError::SwapchainOutOfDate`].
pub(crate) fn swapchain_result(result: vk::Result) -> GpuError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR => GpuError::SwapchainOutOfDate,
        other => GpuError::Vulkan(other),
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
