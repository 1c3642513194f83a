//! Per-image synchronization objects.

use crate::error::{GpuError, Result};
use ash::vk;

/// How long a frame may wait on its image's fence before the GPU is
/// considered hung.
pub const FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

/// The semaphores and fence guarding one swapchain image.
#[derive(Debug, Clone, Copy)]
pub struct ImageSync {
    pub ready: vk::Semaphore,
    pub executed: vk::Semaphore,
    /// Created signalled so the first wait on a fresh image returns at once.
    pub fence: vk::Fence,
}

impl ImageSync {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let ready = unsafe { device.create_semaphore(&semaphore_info, None)? };
        let executed = match unsafe { device.create_semaphore(&semaphore_info, None) } {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { device.destroy_semaphore(ready, None) };
                return Err(e.into());
            }
        };
        let fence = match unsafe { device.create_fence(&fence_info, None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe {
                    device.destroy_semaphore(ready, None);
                    device.destroy_semaphore(executed, None);
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            ready,
            executed,
            fence,
        })
    }
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    match unsafe { device.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS) } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(GpuError::InvalidState(format!(
            "Fence {fence:?} not signalled after {} ms",
            FENCE_TIMEOUT_NS / 1_000_000
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid, and the fence must not be pending.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}
