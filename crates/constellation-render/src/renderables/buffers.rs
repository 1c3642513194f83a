//! Device buffers shared by the renderables.

use crate::error::Result;
use ash::vk;
use bytemuck::Pod;
use constellation_gpu::{BufferDesc, MemoryLocation, Owned, RenderDevice};
use std::sync::Arc;

/// Device-local buffer filled through a staging copy.
pub struct DeviceBuffer {
    buffer: Owned<vk::Buffer>,
    size: u64,
}

impl DeviceBuffer {
    /// Create a buffer holding `bytes`. An empty slice gets a `min_size`
    /// zeroed buffer, since Vulkan buffers cannot be empty.
    pub fn upload(
        device: &Arc<dyn RenderDevice>,
        usage: vk::BufferUsageFlags,
        name: &str,
        bytes: &[u8],
        min_size: u64,
    ) -> Result<Self> {
        let size = (bytes.len() as u64).max(min_size).max(1);
        let buffer = device.create_buffer(&BufferDesc {
            size,
            usage: usage | vk::BufferUsageFlags::TRANSFER_DST,
            location: MemoryLocation::GpuOnly,
            name,
        })?;
        let buffer = Self {
            buffer: Owned::new(device.clone(), buffer),
            size,
        };

        if bytes.is_empty() {
            buffer.write(device, &vec![0; usize::try_from(size).unwrap_or_default()])?;
        } else {
            buffer.write(device, bytes)?;
        }
        Ok(buffer)
    }

    /// Replace the start of the buffer with `bytes` via a host-visible
    /// staging buffer.
    pub fn write(&self, device: &Arc<dyn RenderDevice>, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let len = (bytes.len() as u64).min(self.size);
        let staging = device.create_buffer(&BufferDesc {
            size: len,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
            name: "staging",
        })?;
        let staging = Owned::new(device.clone(), staging);

        device.write_buffer(
            staging.handle(),
            0,
            &bytes[..usize::try_from(len).unwrap_or(bytes.len())],
        )?;
        device.copy_buffer(staging.handle(), self.buffer.handle(), len)?;
        Ok(())
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// A device buffer read in shaders through a texel view.
pub struct TexelBuffer {
    // Declared first so the view is destroyed before its buffer
    view: Owned<vk::BufferView>,
    buffer: DeviceBuffer,
}

impl TexelBuffer {
    /// Create a texel buffer of `format` elements of `element_size` bytes.
    pub fn upload(
        device: &Arc<dyn RenderDevice>,
        format: vk::Format,
        element_size: u64,
        name: &str,
        bytes: &[u8],
    ) -> Result<Self> {
        let buffer = DeviceBuffer::upload(
            device,
            vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER,
            name,
            bytes,
            element_size,
        )?;
        let view = device.create_buffer_view(buffer.handle(), format, buffer.size())?;
        Ok(Self {
            view: Owned::new(device.clone(), view),
            buffer,
        })
    }

    pub fn write(&self, device: &Arc<dyn RenderDevice>, bytes: &[u8]) -> Result<()> {
        self.buffer.write(device, bytes)
    }

    pub fn view(&self) -> vk::BufferView {
        self.view.handle()
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub const fn size(&self) -> u64 {
        self.buffer.size()
    }
}

/// Host-visible uniform buffer.
pub struct UniformBuffer {
    buffer: Owned<vk::Buffer>,
    size: u64,
}

impl UniformBuffer {
    pub fn new<T: Pod>(device: &Arc<dyn RenderDevice>, name: &str, value: &T) -> Result<Self> {
        let size = std::mem::size_of::<T>() as u64;
        let buffer = device.create_buffer(&BufferDesc {
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            location: MemoryLocation::CpuToGpu,
            name,
        })?;
        let buffer = Self {
            buffer: Owned::new(device.clone(), buffer),
            size,
        };
        buffer.write(value)?;
        Ok(buffer)
    }

    pub fn write<T: Pod>(&self, value: &T) -> Result<()> {
        self.buffer
            .device()
            .write_buffer(self.buffer.handle(), 0, bytemuck::bytes_of(value))?;
        Ok(())
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    pub const fn size(&self) -> u64 {
        self.size
    }
}
