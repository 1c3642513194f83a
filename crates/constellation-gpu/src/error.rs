//! Device layer errors.

use ash::vk;
use thiserror::Error;

/// Errors raised by the device layer.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A Vulkan call failed.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No physical device can draw icons and links.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A device extension the display needs is missing.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// The surface could not be created from the window.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// The surface cannot be presented to right now (minimised, zero-sized or lost).
    /// The display loop skips the frame and retries.
    #[error("Surface not ready: {0}")]
    SurfaceNotReady(String),

    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// SPIR-V was rejected by the driver.
    #[error("Shader module creation failed: {0}")]
    ShaderCompilation(String),

    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A handle passed to the device is not one it created.
    #[error("Unknown device object: {0}")]
    ResourceNotFound(String),

    /// The call is not valid in the device's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
