//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Geometry shader stage support (icons and links expand primitives there)
    pub supports_geometry_shader: bool,
    /// Texel buffer reads from the vertex stage
    pub supports_vertex_texel_buffers: bool,
    /// Wide line rasterisation
    pub supports_wide_lines: bool,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Largest 2D image dimension
    pub max_image_dimension_2d: u32,
    /// Largest image array layer count
    pub max_image_array_layers: u32,
    /// Largest texel buffer element count
    pub max_texel_buffer_elements: u32,
    /// Largest push constant block in bytes
    pub max_push_constants_size: u32,

    // Available extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let (properties, memory_properties, features, extensions) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
                instance.get_physical_device_features(physical_device),
                instance
                    .enumerate_device_extension_properties(physical_device)
                    .unwrap_or_default(),
            )
        };

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                ext.extension_name_as_c_str()
                    .ok()
                    .and_then(|name| name.to_str().ok())
                    .map(String::from)
            })
            .collect();

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = properties
            .device_name_as_c_str()
            .map_or_else(|_| String::from("unknown"), |name: &CStr| {
                name.to_string_lossy().into_owned()
            });

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let format_properties = unsafe {
            instance.get_physical_device_format_properties(
                physical_device,
                vk::Format::R32G32B32A32_SFLOAT,
            )
        };

        Self {
            vendor,
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,

            supports_geometry_shader: features.geometry_shader == vk::TRUE,
            supports_vertex_texel_buffers: format_properties
                .buffer_features
                .contains(vk::FormatFeatureFlags::UNIFORM_TEXEL_BUFFER),
            supports_wide_lines: features.wide_lines == vk::TRUE,

            device_local_memory_mb,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            max_image_array_layers: properties.limits.max_image_array_layers,
            max_texel_buffer_elements: properties.limits.max_texel_buffer_elements,
            max_push_constants_size: properties.limits.max_push_constants_size,

            available_extensions,
        }
    }

    /// Check if the GPU can run the graph display.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);

        if api_major < 1 || (api_major == 1 && api_minor < 1) {
            return false;
        }

        // Icons and links are expanded in the geometry stage
        if !self.supports_geometry_shader || !self.supports_vertex_texel_buffers {
            return false;
        }

        // Axes push a full MVP, links push MV plus a hit-test flag
        self.max_push_constants_size >= 128
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Intel,
            device_name: "test".to_string(),
            api_version: vk::make_api_version(0, 1, 2, 0),
            driver_version: 0,
            supports_geometry_shader: true,
            supports_vertex_texel_buffers: true,
            supports_wide_lines: false,
            device_local_memory_mb: 512,
            max_image_dimension_2d: 16384,
            max_image_array_layers: 2048,
            max_texel_buffer_elements: 1 << 27,
            max_push_constants_size: 128,
            available_extensions: HashSet::new(),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn geometry_shader_is_required() {
        let mut caps = capabilities();
        assert!(caps.meets_requirements());

        caps.supports_geometry_shader = false;
        assert!(!caps.meets_requirements());
    }

    #[test]
    fn vulkan_1_0_is_rejected() {
        let mut caps = capabilities();
        caps.api_version = vk::make_api_version(0, 1, 0, 0);
        assert!(!caps.meets_requirements());
    }
}
