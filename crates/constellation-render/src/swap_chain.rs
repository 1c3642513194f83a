//! Presentable images and their per-image synchronisation.

use crate::error::{RenderError, Result};
use ash::vk;
use constellation_gpu::{
    AcquireOutcome, GpuError, PresentOutcome, RenderDevice, SwapChainImage, SwapChainResources,
};
use std::sync::Arc;

/// The parts of a swap chain renderables compare to decide between an
/// update and a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainInfo {
    pub image_count: u32,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub render_pass: vk::RenderPass,
}

impl SwapChainInfo {
    /// Whether per-image resources built for `self` are unusable with `other`.
    ///
    /// Render passes of two swap chains with the same format are compatible,
    /// so pipelines survive a new render pass handle.
    pub fn requires_rebuild(&self, other: &Self) -> bool {
        self.image_count != other.image_count || self.format != other.format
    }
}

/// A swap chain and everything that exists once per presentable image.
pub struct SwapChain {
    device: Arc<dyn RenderDevice>,
    resources: SwapChainResources,
    next_semaphore: usize,
    destroyed: bool,
}

impl SwapChain {
    /// Create a swap chain for the device's surface, replacing `old` if given.
    ///
    /// The old swap chain is retired but still has to be dropped by the caller.
    pub fn initialise(device: &Arc<dyn RenderDevice>, old: Option<&Self>) -> Result<Self> {
        let old_handle = old
            .filter(|old| !old.destroyed)
            .map_or_else(vk::SwapchainKHR::null, |old| old.resources.handle);
        let resources = device.create_swap_chain(old_handle)?;

        tracing::info!(
            "Swap chain initialised: {}x{}, {} images, {:?}",
            resources.extent.width,
            resources.extent.height,
            resources.image_count(),
            resources.format
        );

        Ok(Self {
            device: device.clone(),
            resources,
            next_semaphore: 0,
            destroyed: false,
        })
    }

    /// Acquire the next presentable image.
    ///
    /// Returns the outcome and the semaphore that will be signalled once the
    /// acquired image is available. Ready semaphores rotate only when an
    /// image was actually acquired.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn acquire_next_image(&mut self) -> Result<(AcquireOutcome, vk::Semaphore)> {
        self.ensure_alive()?;
        let semaphore = self.resources.images[self.next_semaphore].ready;
        let outcome = self
            .device
            .acquire_next_image(self.resources.handle, semaphore)?;

        if let AcquireOutcome::Acquired { .. } = outcome {
            self.next_semaphore = (self.next_semaphore + 1) % self.resources.images.len();
        }
        Ok((outcome, semaphore))
    }

    /// Block until the work last submitted for `image_index` completes.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_on_fence(&self, image_index: u32) -> Result<()> {
        self.ensure_alive()?;
        let fence = self.image(image_index)?.fence;
        Ok(self.device.wait_for_fence(fence)?)
    }

    /// Unsignal the fence for `image_index`. The caller must submit with it
    /// straight after, or the next wait on this image never returns.
    pub fn reset_fence(&self, image_index: u32) -> Result<()> {
        self.ensure_alive()?;
        let fence = self.image(image_index)?.fence;
        Ok(self.device.reset_fence(fence)?)
    }

    /// Present `image_index` once its executed semaphore is signalled.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present(&self, image_index: u32) -> Result<PresentOutcome> {
        self.ensure_alive()?;
        let wait = self.image(image_index)?.executed;
        Ok(self
            .device
            .present(self.resources.handle, image_index, wait)?)
    }

    /// Release every per-image resource. The device must be idle.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.device.destroy_swap_chain(&self.resources);
        self.destroyed = true;
        tracing::debug!("Swap chain destroyed");
    }

    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.resources.handle
    }

    pub fn image_count(&self) -> u32 {
        self.resources.image_count()
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.resources.extent
    }

    pub const fn format(&self) -> vk::Format {
        self.resources.format
    }

    pub const fn render_pass(&self) -> vk::RenderPass {
        self.resources.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        Ok(self.image(image_index)?.framebuffer)
    }

    pub fn command_buffer(&self, image_index: u32) -> Result<vk::CommandBuffer> {
        Ok(self.image(image_index)?.command_buffer)
    }

    pub fn executed_semaphore(&self, image_index: u32) -> Result<vk::Semaphore> {
        Ok(self.image(image_index)?.executed)
    }

    pub fn fence(&self, image_index: u32) -> Result<vk::Fence> {
        Ok(self.image(image_index)?.fence)
    }

    /// The presentable image itself, for readback.
    pub fn presentable_image(&self, image_index: u32) -> Result<vk::Image> {
        Ok(self.image(image_index)?.image)
    }

    pub fn info(&self) -> SwapChainInfo {
        SwapChainInfo {
            image_count: self.image_count(),
            extent: self.extent(),
            format: self.format(),
            render_pass: self.render_pass(),
        }
    }

    fn image(&self, image_index: u32) -> Result<&SwapChainImage> {
        self.resources
            .images
            .get(image_index as usize)
            .ok_or_else(|| {
                GpuError::InvalidState(format!(
                    "Swap chain image {image_index} out of range ({} images)",
                    self.resources.images.len()
                ))
                .into()
            })
    }

    const fn ensure_alive(&self) -> Result<()> {
        if self.destroyed {
            Err(RenderError::Destroyed)
        } else {
            Ok(())
        }
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("info", &self.info())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(image_count: u32, width: u32) -> SwapChainInfo {
        SwapChainInfo {
            image_count,
            extent: vk::Extent2D { width, height: 600 },
            format: vk::Format::B8G8R8A8_SRGB,
            render_pass: vk::RenderPass::null(),
        }
    }

    #[test]
    fn resize_alone_does_not_require_rebuild() {
        assert!(!info(3, 800).requires_rebuild(&info(3, 1024)));
    }

    #[test]
    fn image_count_change_requires_rebuild() {
        assert!(info(2, 800).requires_rebuild(&info(3, 800)));
    }

    #[test]
    fn format_change_requires_rebuild() {
        let mut other = info(3, 800);
        other.format = vk::Format::R8G8B8A8_UNORM;
        assert!(info(3, 800).requires_rebuild(&other));
    }
}
