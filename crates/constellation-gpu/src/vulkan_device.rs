//! [`RenderDevice`] on a real Vulkan device.

use crate::command::{
    begin_command_buffer, begin_secondary_command_buffer, end_command_buffer,
    execute_single_time_commands, submit_command_buffer, CommandPool,
};
use crate::context::GpuContext;
use crate::descriptors::{self, DescriptorSetLayoutBuilder};
use crate::device::{
    is_bgra, swizzle_bgra_to_rgba, AcquireOutcome, BufferDesc, DescriptorBinding,
    DescriptorWrite, DrawCommand, GraphicsPipelineDesc, Inheritance, PresentOutcome, PrimaryPass,
    RenderDevice, SampledImage,
};
use crate::error::{GpuError, Result};
use crate::memory::{GpuBuffer, GpuImage};
use crate::pipeline;
use crate::surface::SurfaceContext;
use crate::swapchain::{self, SwapChainResources};
use crate::sync;
use ash::vk;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::HashMap;

/// A Vulkan device presenting to one window surface.
///
/// Buffers and images are tracked by handle so that the [`RenderDevice`]
/// interface can deal in plain `vk` handles while allocations stay here.
pub struct VulkanDevice {
    gpu: GpuContext,
    surface: SurfaceContext,
    command_pool: Mutex<CommandPool>,
    queue: Mutex<vk::Queue>,
    window_extent: Mutex<vk::Extent2D>,
    vsync: bool,
    buffers: Mutex<HashMap<vk::Buffer, GpuBuffer>>,
    images: Mutex<HashMap<vk::Image, GpuImage>>,
}

impl VulkanDevice {
    /// Create a device for `window`.
    ///
    /// # Safety
    /// The window handles must stay valid for the lifetime of the device.
    pub unsafe fn new<W>(gpu: GpuContext, window: &W, width: u32, height: u32, vsync: bool) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let surface = unsafe { SurfaceContext::from_window(&gpu, window)? };
        let command_pool = unsafe { CommandPool::new(gpu.device(), gpu.graphics_queue_family())? };
        let queue = gpu.graphics_queue();

        Ok(Self {
            gpu,
            surface,
            command_pool: Mutex::new(command_pool),
            queue: Mutex::new(queue),
            window_extent: Mutex::new(vk::Extent2D { width, height }),
            vsync,
            buffers: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
        })
    }

    /// The underlying GPU context.
    pub const fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Record the window's current size, used when the surface defers its
    /// extent to the application.
    pub fn set_window_extent(&self, width: u32, height: u32) {
        *self.window_extent.lock() = vk::Extent2D { width, height };
    }

    fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    fn single_time<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = self.command_pool.lock();
        let queue = self.queue.lock();
        unsafe { execute_single_time_commands(self.device(), &pool, *queue, f) }
    }

    fn track_buffer(&self, buffer: GpuBuffer) -> vk::Buffer {
        let handle = buffer.buffer;
        self.buffers.lock().insert(handle, buffer);
        handle
    }

    fn free_buffer(&self, handle: vk::Buffer) {
        let Some(mut buffer) = self.buffers.lock().remove(&handle) else {
            tracing::warn!("Destroying unknown buffer {:?}", handle);
            return;
        };
        if let Err(e) = self.gpu.allocator().lock().free_buffer(&mut buffer) {
            tracing::warn!("Failed to free buffer: {e}");
        }
    }

    fn free_image(&self, handle: vk::Image) {
        let Some(mut image) = self.images.lock().remove(&handle) else {
            tracing::warn!("Destroying unknown image {:?}", handle);
            return;
        };
        if let Err(e) = self.gpu.allocator().lock().free_image(&mut image) {
            tracing::warn!("Failed to free image: {e}");
        }
    }

    fn create_host_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.gpu
            .allocator()
            .lock()
            .create_buffer(size, usage, location, name)
    }

    fn release_host_buffer(&self, mut buffer: GpuBuffer) {
        if let Err(e) = self.gpu.allocator().lock().free_buffer(&mut buffer) {
            tracing::warn!("Failed to free staging buffer: {e}");
        }
    }
}

fn colour_range(layers: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .level_count(1)
        .layer_count(layers)
}

impl RenderDevice for VulkanDevice {
    fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }

    fn create_swap_chain(&self, old: vk::SwapchainKHR) -> Result<SwapChainResources> {
        let window = *self.window_extent.lock();
        let params = self
            .surface
            .swap_chain_params(&self.gpu, window, self.vsync, old)?;

        let pool = self.command_pool.lock();
        let (resources, depth) = {
            let mut allocator = self.gpu.allocator().lock();
            unsafe {
                swapchain::create_swap_chain_resources(
                    self.device(),
                    &self.surface.swapchain_loader,
                    &mut allocator,
                    &pool,
                    &params,
                )?
            }
        };
        self.images.lock().insert(depth.image, depth);

        Ok(resources)
    }

    fn destroy_swap_chain(&self, resources: &SwapChainResources) {
        {
            let pool = self.command_pool.lock();
            unsafe {
                swapchain::destroy_swap_chain_resources(
                    self.device(),
                    &self.surface.swapchain_loader,
                    &pool,
                    resources,
                );
            }
        }
        self.free_image(resources.depth.image);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        unsafe { swapchain::acquire_next_image(&self.surface.swapchain_loader, swapchain, semaphore) }
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let queue = self.queue.lock();
        unsafe {
            swapchain::present(
                &self.surface.swapchain_loader,
                *queue,
                swapchain,
                image_index,
                wait_semaphore,
            )
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { sync::wait_for_fence(self.device(), fence) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { sync::reset_fence(self.device(), fence) }
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let queue = self.queue.lock();
        unsafe {
            submit_command_buffer(
                self.device(),
                *queue,
                command_buffer,
                wait_semaphore,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore,
                fence,
            )
        }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout> {
        unsafe {
            DescriptorSetLayoutBuilder::new()
                .bindings(bindings)
                .build(self.device())
        }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device().destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool> {
        unsafe { descriptors::create_descriptor_pool(self.device(), max_sets, pool_sizes) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device().destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        unsafe { descriptors::allocate_descriptor_sets(self.device(), pool, layouts) }
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) {
        if sets.is_empty() {
            return;
        }
        if let Err(e) = unsafe { self.device().free_descriptor_sets(pool, sets) } {
            tracing::warn!("Failed to free descriptor sets: {e}");
        }
    }

    fn write_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        unsafe { descriptors::write_descriptor_set(self.device(), set, writes) };
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        unsafe { pipeline::create_shader_module(self.device(), code) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device().destroy_shader_module(module, None) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout> {
        unsafe { pipeline::create_pipeline_layout(self.device(), set_layouts, push_constant_ranges) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device().destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<vk::Pipeline> {
        unsafe { pipeline::create_graphics_pipeline(self.device(), desc) }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device().destroy_pipeline(pipeline, None) };
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<vk::Buffer> {
        let buffer = self.create_host_buffer(desc.size, desc.usage, desc.location, desc.name)?;
        Ok(self.track_buffer(buffer))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.free_buffer(buffer);
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        let buffers = self.buffers.lock();
        let target = buffers
            .get(&buffer)
            .ok_or_else(|| GpuError::ResourceNotFound(format!("buffer {buffer:?}")))?;
        target.write_bytes(offset, data)
    }

    fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let device = self.device();
        self.single_time(|cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
        })
    }

    fn create_buffer_view(
        &self,
        buffer: vk::Buffer,
        format: vk::Format,
        range: u64,
    ) -> Result<vk::BufferView> {
        let create_info = vk::BufferViewCreateInfo::default()
            .buffer(buffer)
            .format(format)
            .offset(0)
            .range(range);
        Ok(unsafe { self.device().create_buffer_view(&create_info, None)? })
    }

    fn destroy_buffer_view(&self, view: vk::BufferView) {
        unsafe { self.device().destroy_buffer_view(view, None) };
    }

    fn create_sampled_image(
        &self,
        width: u32,
        height: u32,
        layers: u32,
        pixels: &[u8],
    ) -> Result<SampledImage> {
        let expected = u64::from(width) * u64::from(height) * u64::from(layers) * 4;
        if pixels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "Expected {expected} bytes of pixels, got {}",
                pixels.len()
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = self
            .gpu
            .allocator()
            .lock()
            .create_image(&image_info, MemoryLocation::GpuOnly, "icon atlas")?;
        let handle = image.image;
        self.images.lock().insert(handle, image);

        let staging = self.create_host_buffer(
            expected,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "icon atlas staging",
        )?;

        let upload = staging.write_bytes(0, pixels).and_then(|()| {
            let device = self.device();
            let staging_buffer = staging.buffer;
            self.single_time(|cmd| unsafe {
                let to_transfer = vk::ImageMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(handle)
                    .subresource_range(colour_range(layers));
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );

                let region = vk::BufferImageCopy::default()
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: layers,
                    })
                    .image_extent(vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    });
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );

                let to_shader = vk::ImageMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ)
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(handle)
                    .subresource_range(colour_range(layers));
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader],
                );
            })
        });
        self.release_host_buffer(staging);
        if let Err(e) = upload {
            self.free_image(handle);
            return Err(e);
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D_ARRAY)
            .format(vk::Format::R8G8B8A8_UNORM)
            .subresource_range(colour_range(layers));
        let view = match unsafe { self.device().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                self.free_image(handle);
                return Err(e.into());
            }
        };

        Ok(SampledImage {
            image: handle,
            view,
        })
    }

    fn destroy_sampled_image(&self, image: SampledImage) {
        unsafe { self.device().destroy_image_view(image.view, None) };
        self.free_image(image.image);
    }

    fn create_sampler(&self) -> Result<vk::Sampler> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(0.0);
        Ok(unsafe { self.device().create_sampler(&create_info, None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device().destroy_sampler(sampler, None) };
    }

    fn allocate_command_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let pool = self.command_pool.lock();
        unsafe { pool.allocate(self.device(), level, count) }
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let pool = self.command_pool.lock();
        unsafe { pool.free(self.device(), command_buffers) };
    }

    fn begin_secondary(
        &self,
        command_buffer: vk::CommandBuffer,
        inheritance: &Inheritance,
    ) -> Result<()> {
        unsafe {
            begin_secondary_command_buffer(
                self.device(),
                command_buffer,
                inheritance.render_pass,
                inheritance.subpass,
                inheritance.framebuffer,
            )
        }
    }

    fn record_draw(&self, command_buffer: vk::CommandBuffer, draw: &DrawCommand<'_>) {
        let device = self.device();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: draw.extent.width as f32,
            height: draw.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: draw.extent,
        };

        unsafe {
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
            if let Some(buffer) = draw.vertex_buffer {
                device.cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0]);
            }
            if let Some(set) = draw.descriptor_set {
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    draw.layout,
                    0,
                    &[set],
                    &[],
                );
            }
            for constant in draw.push_constants {
                device.cmd_push_constants(
                    command_buffer,
                    draw.layout,
                    constant.stages,
                    constant.offset,
                    constant.bytes,
                );
            }
            device.cmd_draw(command_buffer, draw.vertex_count, 1, 0, 0);
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe { end_command_buffer(self.device(), command_buffer) }
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn record_primary(&self, command_buffer: vk::CommandBuffer, pass: &PrimaryPass<'_>) -> Result<()> {
        let device = self.device();
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: pass.clear_colour,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(pass.render_pass)
            .framebuffer(pass.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: pass.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            begin_command_buffer(device, command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            device.cmd_begin_render_pass(
                command_buffer,
                &begin_info,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            );
            if !pass.secondaries.is_empty() {
                device.cmd_execute_commands(command_buffer, pass.secondaries);
            }
            device.cmd_end_render_pass(command_buffer);
            end_command_buffer(device, command_buffer)
        }
    }

    fn read_image(
        &self,
        image: vk::Image,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Vec<u8>> {
        let len = u64::from(extent.width) * u64::from(extent.height) * 4;
        let readback = self.create_host_buffer(
            len,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "screenshot readback",
        )?;

        let device = self.device();
        let readback_buffer = readback.buffer;
        let barrier = |old, new, src_access, dst_access| {
            vk::ImageMemoryBarrier::default()
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .old_layout(old)
                .new_layout(new)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(colour_range(1))
        };

        let copied = self.single_time(|cmd| unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier(
                    vk::ImageLayout::PRESENT_SRC_KHR,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::AccessFlags::MEMORY_READ,
                    vk::AccessFlags::TRANSFER_READ,
                )],
            );

            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                });
            device.cmd_copy_image_to_buffer(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                readback_buffer,
                &[region],
            );

            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier(
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                    vk::AccessFlags::TRANSFER_READ,
                    vk::AccessFlags::MEMORY_READ,
                )],
            );
        });

        let pixels = copied.and_then(|()| {
            let len = usize::try_from(len)
                .map_err(|_| GpuError::InvalidState("Readback too large".to_string()))?;
            readback.read_bytes(len)
        });
        self.release_host_buffer(readback);

        let mut pixels = pixels?;
        if is_bgra(format) {
            swizzle_bgra_to_rgba(&mut pixels);
        }
        Ok(pixels)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            tracing::warn!("Device did not idle before teardown: {e}");
        }

        let leaked_buffers: Vec<_> = self.buffers.lock().keys().copied().collect();
        let leaked_images: Vec<_> = self.images.lock().keys().copied().collect();
        if !leaked_buffers.is_empty() || !leaked_images.is_empty() {
            tracing::warn!(
                "Releasing {} buffers and {} images still alive at device teardown",
                leaked_buffers.len(),
                leaked_images.len()
            );
        }
        for buffer in leaked_buffers {
            self.free_buffer(buffer);
        }
        for image in leaked_images {
            self.free_image(image);
        }

        unsafe {
            self.command_pool.lock().destroy(self.gpu.device());
            self.surface.destroy();
        }
    }
}
