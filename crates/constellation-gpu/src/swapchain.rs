//! Swapchain resources.
//!
//! A swapchain here is the whole per-image bundle the display loop needs:
//! the presentable images and their views, one framebuffer per image sharing
//! a depth attachment, the render pass they were built against, and the
//! per-image primary command buffer, semaphores and fence.

use crate::command::CommandPool;
use crate::device::{AcquireOutcome, PresentOutcome};
use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuImage};
use crate::sync::ImageSync;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Depth format used by every swapchain render pass.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// One presentable image and everything recorded or synchronised against it.
#[derive(Debug, Clone, Copy)]
pub struct SwapChainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
    /// Primary command buffer re-recorded every frame this image is drawn.
    pub command_buffer: vk::CommandBuffer,
    /// Signalled when the image is available; handed out round-robin by acquire.
    pub ready: vk::Semaphore,
    /// Signalled when this image's command buffer finished executing.
    pub executed: vk::Semaphore,
    /// Signalled when the GPU is done with this image's command buffer.
    pub fence: vk::Fence,
}

/// Depth attachment shared by all framebuffers of a swapchain.
#[derive(Debug, Clone, Copy)]
pub struct DepthAttachment {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

/// All device objects belonging to one swapchain generation.
#[derive(Debug, Clone)]
pub struct SwapChainResources {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
    pub depth: DepthAttachment,
    pub images: Vec<SwapChainImage>,
}

impl SwapChainResources {
    /// Number of presentable images.
    pub fn image_count(&self) -> u32 {
        u32::try_from(self.images.len()).unwrap_or(u32::MAX)
    }
}

/// Surface-derived parameters for a new swapchain.
pub struct SwapChainParams {
    pub surface: vk::SurfaceKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub old_swapchain: vk::SwapchainKHR,
}

/// Create a swapchain and its per-image resources.
///
/// Returns the resources and the depth image allocation, which the caller
/// owns and must free after [`destroy_swap_chain_resources`].
///
/// # Safety
/// All handles must be valid and the old swapchain, if any, must not be in use.
pub unsafe fn create_swap_chain_resources(
    device: &ash::Device,
    swapchain_loader: &ash::khr::swapchain::Device,
    allocator: &mut GpuAllocator,
    command_pool: &CommandPool,
    params: &SwapChainParams,
) -> Result<(SwapChainResources, GpuImage)> {
    let extent = params.extent;
    if extent.width == 0 || extent.height == 0 {
        return Err(GpuError::SurfaceNotReady(format!(
            "surface extent is {}x{}",
            extent.width, extent.height
        )));
    }

    let image_count = image_count_for(&params.capabilities);

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(params.surface)
        .min_image_count(image_count)
        .image_format(params.surface_format.format)
        .image_color_space(params.surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(params.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(params.present_mode)
        .clipped(true)
        .old_swapchain(params.old_swapchain);

    let handle = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
        .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

    let images = unsafe { swapchain_loader.get_swapchain_images(handle)? };
    let format = params.surface_format.format;

    let render_pass = unsafe { create_render_pass(device, format)? };
    let (depth_image, depth_view) = unsafe { create_depth_attachment(device, allocator, extent)? };

    let command_buffers = unsafe {
        command_pool.allocate(
            device,
            vk::CommandBufferLevel::PRIMARY,
            u32::try_from(images.len()).unwrap_or(u32::MAX),
        )?
    };

    let mut per_image = Vec::with_capacity(images.len());
    for (&image, &command_buffer) in images.iter().zip(&command_buffers) {
        let view = unsafe { create_color_view(device, image, format)? };

        let attachments = [view, depth_view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None)? };

        let sync = unsafe { ImageSync::new(device)? };
        per_image.push(SwapChainImage {
            image,
            view,
            framebuffer,
            command_buffer,
            ready: sync.ready,
            executed: sync.executed,
            fence: sync.fence,
        });
    }

    tracing::info!(
        "Swapchain created: {}x{} ({} images, {:?}, {:?})",
        extent.width,
        extent.height,
        per_image.len(),
        format,
        params.present_mode
    );

    Ok((
        SwapChainResources {
            handle,
            format,
            extent,
            render_pass,
            depth: DepthAttachment {
                image: depth_image.image,
                view: depth_view,
                format: DEPTH_FORMAT,
            },
            images: per_image,
        },
        depth_image,
    ))
}

/// Destroy every object in `resources` except the depth image memory.
///
/// # Safety
/// The device must be idle with respect to these resources.
pub unsafe fn destroy_swap_chain_resources(
    device: &ash::Device,
    swapchain_loader: &ash::khr::swapchain::Device,
    command_pool: &CommandPool,
    resources: &SwapChainResources,
) {
    let command_buffers: Vec<_> = resources.images.iter().map(|i| i.command_buffer).collect();

    unsafe {
        command_pool.free(device, &command_buffers);
        for image in &resources.images {
            device.destroy_fence(image.fence, None);
            device.destroy_semaphore(image.executed, None);
            device.destroy_semaphore(image.ready, None);
            device.destroy_framebuffer(image.framebuffer, None);
            device.destroy_image_view(image.view, None);
        }
        device.destroy_image_view(resources.depth.view, None);
        device.destroy_render_pass(resources.render_pass, None);
        swapchain_loader.destroy_swapchain(resources.handle, None);
    }
}

/// Acquire the next image, folding the "image aged out" result into the outcome.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn acquire_next_image(
    swapchain_loader: &ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    semaphore: vk::Semaphore,
) -> Result<AcquireOutcome> {
    let result = unsafe {
        swapchain_loader.acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null())
    };

    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Present an image.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn present(
    swapchain_loader: &ash::khr::swapchain::Device,
    queue: vk::Queue,
    swapchain: vk::SwapchainKHR,
    image_index: u32,
    wait_semaphore: vk::Semaphore,
) -> Result<PresentOutcome> {
    let swapchains = [swapchain];
    let image_indices = [image_index];
    let wait_semaphores = [wait_semaphore];

    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(&wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    match unsafe { swapchain_loader.queue_present(queue, &present_info) } {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(GpuError::from(e)),
    }
}

unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(DEPTH_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .dst_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    Ok(unsafe { device.create_render_pass(&create_info, None)? })
}

unsafe fn create_color_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1),
        );

    Ok(unsafe { device.create_image_view(&view_info, None)? })
}

unsafe fn create_depth_attachment(
    device: &ash::Device,
    allocator: &mut GpuAllocator,
    extent: vk::Extent2D,
) -> Result<(GpuImage, vk::ImageView)> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(DEPTH_FORMAT)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = allocator.create_image(&image_info, MemoryLocation::GpuOnly, "swapchain depth")?;

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image.image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(DEPTH_FORMAT)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::DEPTH)
                .level_count(1)
                .layer_count(1),
        );
    let view = unsafe { device.create_image_view(&view_info, None)? };

    Ok((image, view))
}

/// One more image than the surface minimum, clamped to its maximum.
pub const fn image_count_for(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// Select the best surface format, preferring 8-bit BGRA sRGB.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is always supported
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn image_count_is_one_above_minimum_within_maximum() {
        assert_eq!(image_count_for(&capabilities(2, 8)), 3);
        assert_eq!(image_count_for(&capabilities(2, 2)), 2);
        // Zero means unbounded
        assert_eq!(image_count_for(&capabilities(1, 0)), 2);
    }

    #[test]
    fn vsync_always_uses_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_is_clamped_when_surface_defers_to_window() {
        let caps = capabilities(2, 3);
        let extent = calculate_extent(&caps, 10_000, 0);
        assert_eq!(extent.width, 4096);
        assert_eq!(extent.height, 1);
    }

    #[test]
    fn surface_extent_wins_when_fixed() {
        let mut caps = capabilities(2, 3);
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let extent = calculate_extent(&caps, 1024, 768);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn srgb_bgra_format_preferred() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(select_surface_format(&[unorm, srgb]).map(|f| f.format), Some(srgb.format));
        assert_eq!(select_surface_format(&[unorm]).map(|f| f.format), Some(unorm.format));
        assert!(select_surface_format(&[]).is_none());
    }
}
