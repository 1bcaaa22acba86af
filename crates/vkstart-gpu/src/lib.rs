//! Vulkan bootstrap and presentation for the vkstart samples.
//!
//! This crate provides:
//! - Instance creation with optional validation routed into `tracing`
//! - Physical device selection and logical device creation
//! - Swapchain management with present fences where supported
//! - Frame pacing and the per-frame acquire/record/submit/present cycle
//! - The triangle pipeline shared by the samples
//!
//! Everything above instance and device creation talks to the driver through
//! the [`PresentDevice`] trait, implemented by [`GpuContext`].

pub mod capabilities;
pub mod command;
pub mod context;
pub mod debug;
pub mod device;
pub mod error;
pub mod executor;
pub mod instance;
pub mod pacer;
pub mod pipeline;
pub mod selection;
pub mod shader;
pub mod swapchain;

#[cfg(test)]
mod mock;

pub use capabilities::{AdapterInfo, DeviceFeatureSet, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use device::{
    FrameRecorder, PresentDevice, QueueHandle, QueueSet, RenderTarget, SwapchainDesc,
};
pub use error::{GpuError, Result};
pub use executor::{FrameExecutor, FrameOutcome, FramePhase, SkipReason};
pub use instance::VulkanInstance;
pub use pacer::{FramePacer, FrameSlot};
pub use pipeline::{RenderPath, ShaderPair, TrianglePipeline};
pub use shader::{load_spirv, spirv_from_bytes};
pub use swapchain::{BuildStatus, PresentFenceState, SwapchainManager, SwapchainState};
