//! Vulkan device layer for the Constellation graph display.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Swap chain resources (render pass, framebuffers, per-image sync)
//! - The [`RenderDevice`] seam the display core is written against
//! - Ownership-scoped device handles

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod resource;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vulkan_device;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use device::{
    AcquireOutcome, BufferDesc, DescriptorBinding, DescriptorWrite, DrawCommand,
    GraphicsPipelineDesc, Inheritance, PresentOutcome, PrimaryPass, PushConstant, RenderDevice,
    SampledImage,
};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use resource::{DeviceObject, Owned};
pub use surface::SurfaceContext;
pub use swapchain::{DepthAttachment, SwapChainImage, SwapChainResources};
pub use vulkan_device::VulkanDevice;

pub use gpu_allocator::MemoryLocation;
