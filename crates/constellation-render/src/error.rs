//! Display core error types.

use crate::screenshot::ScreenshotError;
use constellation_gpu::GpuError;
use thiserror::Error;

/// Errors raised by the display core.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A device, swapchain or pipeline call failed.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// A renderable failed to initialise and was excluded from the scene.
    #[error("Failed to initialise renderable '{name}': {source}")]
    RenderableInitialisation {
        name: String,
        source: Box<RenderError>,
    },

    #[error("{0} is already initialised")]
    AlreadyInitialised(&'static str),

    #[error("{0} has not been initialised")]
    NotInitialised(&'static str),

    /// `display()` was called from a thread other than the render thread.
    #[error("Renderer used from a thread other than the render thread")]
    WrongThread,

    #[error("Screenshot failed: {0}")]
    Screenshot(#[from] ScreenshotError),

    /// The renderer or one of its resources has already been torn down.
    #[error("Renderer has been destroyed")]
    Destroyed,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
