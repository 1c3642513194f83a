//! Ownership-scoped device handles.

use crate::device::{RenderDevice, SampledImage};
use ash::vk;
use std::fmt;
use std::sync::Arc;

/// A device handle that can release itself.
pub trait DeviceObject: Copy + fmt::Debug {
    /// Destroy the object on `device`.
    fn release(self, device: &dyn RenderDevice);

    /// Whether this is the null handle, which is never released.
    fn is_null(&self) -> bool;
}

macro_rules! device_object {
    ($ty:ty, $destroy:ident) => {
        impl DeviceObject for $ty {
            fn release(self, device: &dyn RenderDevice) {
                device.$destroy(self);
            }

            fn is_null(&self) -> bool {
                *self == <$ty>::null()
            }
        }
    };
}

device_object!(vk::Buffer, destroy_buffer);
device_object!(vk::BufferView, destroy_buffer_view);
device_object!(vk::Pipeline, destroy_pipeline);
device_object!(vk::PipelineLayout, destroy_pipeline_layout);
device_object!(vk::DescriptorSetLayout, destroy_descriptor_set_layout);
device_object!(vk::DescriptorPool, destroy_descriptor_pool);
device_object!(vk::ShaderModule, destroy_shader_module);
device_object!(vk::Sampler, destroy_sampler);

impl DeviceObject for vk::CommandBuffer {
    fn release(self, device: &dyn RenderDevice) {
        device.free_command_buffers(&[self]);
    }

    fn is_null(&self) -> bool {
        *self == Self::null()
    }
}

impl DeviceObject for SampledImage {
    fn release(self, device: &dyn RenderDevice) {
        device.destroy_sampled_image(self);
    }

    fn is_null(&self) -> bool {
        self.image == vk::Image::null()
    }
}

/// A device handle destroyed when dropped.
pub struct Owned<T: DeviceObject> {
    device: Arc<dyn RenderDevice>,
    handle: T,
}

impl<T: DeviceObject> Owned<T> {
    /// Take ownership of `handle`.
    pub fn new(device: Arc<dyn RenderDevice>, handle: T) -> Self {
        Self { device, handle }
    }

    /// The raw handle. It stays valid for as long as `self` lives.
    pub const fn handle(&self) -> T {
        self.handle
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }
}

impl<T: DeviceObject> Drop for Owned<T> {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            self.handle.release(self.device.as_ref());
        }
    }
}

impl<T: DeviceObject> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}
