//! The window surface and what it currently allows a swapchain to be.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{calculate_extent, select_present_mode, select_surface_format, SwapChainParams};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A Vulkan surface for one window, plus the loaders that talk to it.
pub struct SurfaceContext {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Create a surface for `window` and check the graphics queue can present to it.
    ///
    /// # Safety
    /// The GPU context must be valid and the window must have valid handles
    /// that outlive the surface.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                gpu.entry(),
                gpu.instance(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());
        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                gpu.physical_device(),
                gpu.graphics_queue_family(),
                surface,
            )
        };
        if supported != Ok(true) {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(GpuError::SurfaceCreation(
                "Graphics queue cannot present to this surface".to_string(),
            ));
        }

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader,
        })
    }

    /// Work out the swapchain the surface accepts right now.
    ///
    /// A lost surface, or one that reports no formats, is
    /// [`GpuError::SurfaceNotReady`] so the display loop can retry later.
    pub fn swap_chain_params(
        &self,
        gpu: &GpuContext,
        window: vk::Extent2D,
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<SwapChainParams> {
        let physical_device = gpu.physical_device();
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.surface_loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)
                    .map_err(not_ready_if_lost)?,
                self.surface_loader
                    .get_physical_device_surface_formats(physical_device, self.surface)
                    .map_err(not_ready_if_lost)?,
                self.surface_loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)
                    .map_err(not_ready_if_lost)?,
            )
        };

        let surface_format = select_surface_format(&formats)
            .ok_or_else(|| GpuError::SurfaceNotReady("surface reports no formats".to_string()))?;

        Ok(SwapChainParams {
            surface: self.surface,
            capabilities,
            surface_format,
            present_mode: select_present_mode(&present_modes, vsync),
            extent: calculate_extent(&capabilities, window.width, window.height),
            old_swapchain,
        })
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain created from the surface may still exist.
    pub unsafe fn destroy(&self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

/// Surface loss is recoverable; everything else is a device error.
pub fn not_ready_if_lost(e: vk::Result) -> GpuError {
    if e == vk::Result::ERROR_SURFACE_LOST_KHR {
        GpuError::SurfaceNotReady("surface lost".to_string())
    } else {
        GpuError::from(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_surface_loss_is_recoverable() {
        assert!(matches!(
            not_ready_if_lost(vk::Result::ERROR_SURFACE_LOST_KHR),
            GpuError::SurfaceNotReady(_)
        ));
        assert!(matches!(
            not_ready_if_lost(vk::Result::ERROR_DEVICE_LOST),
            GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
