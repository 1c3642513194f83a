//! Concrete renderables.

mod axes;
mod buffers;
mod icons;
mod links;

pub use axes::{axes_transform, AxesRenderable, AxesVertex, AXES_VERTEX_COUNT};
pub use buffers::{DeviceBuffer, TexelBuffer, UniformBuffer};
pub use icons::{
    IconFragmentUniforms, IconGeometryUniforms, IconVertex, IconVertexUniforms, IconsRenderable,
    IconsStager,
};
pub use links::{
    LinkGeometryUniforms, LinkStyle, LinkVertex, LinkVertexUniforms, LinksRenderable, LinksStager,
};

use crate::error::Result;
use ash::vk;
use bitflags::bitflags;
use constellation_gpu::{DrawCommand, Inheritance, Owned, RenderDevice};
use std::sync::Arc;

bitflags! {
    /// Per-element state bits read by the geometry shaders.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VertexFlags: u8 {
        const SELECTED = 1;
        const DIMMED = 2;
    }
}

impl VertexFlags {
    pub fn from_state(selected: bool, dimmed: bool) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::SELECTED, selected);
        flags.set(Self::DIMMED, dimmed);
        flags
    }
}

/// Allocate one secondary command buffer per swap chain image.
fn allocate_secondaries(
    device: &Arc<dyn RenderDevice>,
    count: u32,
) -> Result<Vec<Owned<vk::CommandBuffer>>> {
    let buffers = device.allocate_command_buffers(vk::CommandBufferLevel::SECONDARY, count)?;
    Ok(buffers
        .into_iter()
        .map(|cmd| Owned::new(device.clone(), cmd))
        .collect())
}

/// Record a secondary command buffer containing a single draw.
fn record_secondary(
    device: &dyn RenderDevice,
    command_buffer: vk::CommandBuffer,
    inheritance: &Inheritance,
    draw: &DrawCommand<'_>,
) -> Result<vk::CommandBuffer> {
    device.begin_secondary(command_buffer, inheritance)?;
    device.record_draw(command_buffer, draw);
    device.end_command_buffer(command_buffer)?;
    Ok(command_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_from_state() {
        assert_eq!(VertexFlags::from_state(false, false).bits(), 0);
        assert_eq!(VertexFlags::from_state(true, false).bits(), 1);
        assert_eq!(VertexFlags::from_state(true, true).bits(), 3);
    }
}
