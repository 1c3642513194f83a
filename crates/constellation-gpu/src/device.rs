//! The device seam the display core is written against.
//!
//! Every GPU operation the renderer and its renderables perform goes through
//! [`RenderDevice`]. [`crate::VulkanDevice`] implements it on a real Vulkan
//! device; tests implement it in memory.

use crate::error::Result;
use crate::swapchain::SwapChainResources;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Result of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` means it can still be drawn and
    /// presented, but the swapchain no longer matches the surface exactly.
    Acquired { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; no image was acquired.
    OutOfDate,
}

impl AcquireOutcome {
    /// Whether the swapchain should be recreated after this acquire.
    pub const fn needs_recreation(self) -> bool {
        match self {
            Self::Acquired { suboptimal, .. } => suboptimal,
            Self::OutOfDate => true,
        }
    }
}

/// Result of presenting a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain should be recreated after this present.
    pub const fn needs_recreation(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub const fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            stages,
        }
    }
}

/// A single descriptor update.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorWrite {
    UniformBuffer {
        binding: u32,
        buffer: vk::Buffer,
        range: u64,
    },
    TexelBuffer {
        binding: u32,
        view: vk::BufferView,
    },
    CombinedImageSampler {
        binding: u32,
        sampler: vk::Sampler,
        view: vk::ImageView,
    },
}

impl DescriptorWrite {
    /// The binding this write targets.
    pub const fn binding(&self) -> u32 {
        match *self {
            Self::UniformBuffer { binding, .. }
            | Self::TexelBuffer { binding, .. }
            | Self::CombinedImageSampler { binding, .. } => binding,
        }
    }
}

/// Graphics pipeline description.
///
/// Pipelines are always created against a swapchain render pass with dynamic
/// viewport and scissor, so they survive a resize but not a format change.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub vertex: vk::ShaderModule,
    pub geometry: Option<vk::ShaderModule>,
    pub fragment: vk::ShaderModule,
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub topology: vk::PrimitiveTopology,
    pub depth_test: bool,
    pub depth_write: bool,
    /// Standard alpha blending on the colour attachment.
    pub blend: bool,
}

/// Buffer creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    pub name: &'a str,
}

/// A sampled 2D array image and its view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// Render pass state a secondary command buffer continues.
#[derive(Debug, Clone, Copy)]
pub struct Inheritance {
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

/// A push constant range and its contents.
#[derive(Debug, Clone, Copy)]
pub struct PushConstant<'a> {
    pub stages: vk::ShaderStageFlags,
    pub offset: u32,
    pub bytes: &'a [u8],
}

/// Everything needed to record one draw into a secondary command buffer.
#[derive(Debug, Clone, Copy)]
pub struct DrawCommand<'a> {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub extent: vk::Extent2D,
    pub vertex_buffer: Option<vk::Buffer>,
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub push_constants: &'a [PushConstant<'a>],
    pub vertex_count: u32,
}

/// A primary command buffer that clears the framebuffer and executes
/// secondary buffers inside one render pass.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryPass<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_colour: [f32; 4],
    pub secondaries: &'a [vk::CommandBuffer],
}

/// Device operations used by the display core.
///
/// Implementations must be callable from any thread, but the renderer only
/// records commands and mutates descriptors from its render thread.
pub trait RenderDevice: Send + Sync {
    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<()>;

    /// Create a swapchain for the current surface, replacing `old` if non-null.
    ///
    /// Fails with [`crate::GpuError::SurfaceNotReady`] when the surface has no
    /// area to present to.
    fn create_swap_chain(&self, old: vk::SwapchainKHR) -> Result<SwapChainResources>;
    fn destroy_swap_chain(&self, resources: &SwapChainResources);
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> Result<AcquireOutcome>;
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome>;

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    /// Submit a primary command buffer to the graphics queue, waiting on
    /// `wait_semaphore` at colour attachment output.
    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()>;

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>>;
    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]);
    fn write_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// Write into a host-visible buffer.
    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> Result<()>;
    /// Copy `size` bytes between buffers and wait for the copy to finish.
    fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: u64) -> Result<()>;
    fn create_buffer_view(
        &self,
        buffer: vk::Buffer,
        format: vk::Format,
        range: u64,
    ) -> Result<vk::BufferView>;
    fn destroy_buffer_view(&self, view: vk::BufferView);

    /// Create an RGBA8 2D array image, upload `pixels` (all layers, tightly
    /// packed) and leave it ready for sampling.
    fn create_sampled_image(
        &self,
        width: u32,
        height: u32,
        layers: u32,
        pixels: &[u8],
    ) -> Result<SampledImage>;
    fn destroy_sampled_image(&self, image: SampledImage);
    fn create_sampler(&self) -> Result<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    fn allocate_command_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);
    fn begin_secondary(&self, command_buffer: vk::CommandBuffer, inheritance: &Inheritance)
        -> Result<()>;
    fn record_draw(&self, command_buffer: vk::CommandBuffer, draw: &DrawCommand<'_>);
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    /// Reset and record a primary command buffer for one frame.
    fn record_primary(&self, command_buffer: vk::CommandBuffer, pass: &PrimaryPass<'_>)
        -> Result<()>;

    /// Read back a presentable image as tightly packed RGBA8.
    fn read_image(
        &self,
        image: vk::Image,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Vec<u8>>;
}

/// Whether a swapchain format stores its channels blue first.
pub const fn is_bgra(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::B8G8R8A8_SRGB | vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SNORM
    )
}

/// Swap the red and blue channels of tightly packed 4-byte pixels in place.
pub fn swizzle_bgra_to_rgba(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suboptimal_acquire_still_yields_an_image() {
        let outcome = AcquireOutcome::Acquired {
            index: 1,
            suboptimal: true,
        };
        assert!(outcome.needs_recreation());
        assert!(!AcquireOutcome::Acquired {
            index: 0,
            suboptimal: false
        }
        .needs_recreation());
        assert!(AcquireOutcome::OutOfDate.needs_recreation());
    }

    #[test]
    fn only_clean_present_keeps_swapchain() {
        assert!(!PresentOutcome::Presented.needs_recreation());
        assert!(PresentOutcome::Suboptimal.needs_recreation());
        assert!(PresentOutcome::OutOfDate.needs_recreation());
    }

    #[test]
    fn bgra_swizzle() {
        let mut pixels = [1, 2, 3, 4, 10, 20, 30, 40];
        swizzle_bgra_to_rgba(&mut pixels);
        assert_eq!(pixels, [3, 2, 1, 4, 30, 20, 10, 40]);
        assert!(is_bgra(vk::Format::B8G8R8A8_SRGB));
        assert!(!is_bgra(vk::Format::R8G8B8A8_UNORM));
    }

    #[test]
    fn descriptor_write_binding() {
        let write = DescriptorWrite::TexelBuffer {
            binding: 3,
            view: vk::BufferView::null(),
        };
        assert_eq!(write.binding(), 3);
    }
}
