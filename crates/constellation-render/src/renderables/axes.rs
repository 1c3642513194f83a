//! Orientation axes drawn in the top-right corner.

use super::buffers::DeviceBuffer;
use super::{allocate_secondaries, record_secondary};
use crate::descriptor_pool::{DescriptorPool, DescriptorPoolRequirements};
use crate::error::{RenderError, Result};
use crate::renderable::{DisplayContext, InitContext, Renderable, RenderableId};
use crate::resource_state::ResourceTracker;
use crate::shaders::ShaderId;
use crate::swap_chain::{SwapChain, SwapChainInfo};
use crate::tasks::RenderableUpdate;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use constellation_gpu::{
    DrawCommand, GraphicsPipelineDesc, Inheritance, Owned, PushConstant, RenderDevice,
};
use glam::{Mat3, Mat4, Vec3};
use std::sync::Arc;

const LEN: f32 = 0.5;
const HEAD: f32 = 0.05;
/// Distance of the axes origin from the top and right edges, in pixels.
const AXES_OFFSET: f32 = 50.0;

const X_COLOUR: [f32; 4] = [1.0, 0.5, 0.5, 0.75];
const Y_COLOUR: [f32; 4] = [0.5, 1.0, 0.5, 0.75];
const Z_COLOUR: [f32; 4] = [0.0, 0.5, 1.0, 0.75];

/// Axis lines, arrow heads and the X, Y, Z glyphs.
pub const AXES_VERTEX_COUNT: u32 = 34;

/// Axes vertex: position and colour.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct AxesVertex {
    pub position: [f32; 3],
    pub colour: [f32; 4],
}

const fn v(x: f32, y: f32, z: f32, colour: [f32; 4]) -> AxesVertex {
    AxesVertex {
        position: [x, y, z],
        colour,
    }
}

/// The axes as a line list.
pub fn axes_vertices() -> [AxesVertex; AXES_VERTEX_COUNT as usize] {
    let (c, x, y, z) = (LEN + HEAD, X_COLOUR, Y_COLOUR, Z_COLOUR);
    [
        // X axis
        v(0.0, 0.0, 0.0, x),
        v(LEN, 0.0, 0.0, x),
        v(LEN - HEAD, HEAD, 0.0, x),
        v(LEN, 0.0, 0.0, x),
        v(LEN, 0.0, 0.0, x),
        v(LEN - HEAD, -HEAD, 0.0, x),
        // Y axis
        v(0.0, 0.0, 0.0, y),
        v(0.0, LEN, 0.0, y),
        v(0.0, LEN - HEAD, HEAD, y),
        v(0.0, LEN, 0.0, y),
        v(0.0, LEN, 0.0, y),
        v(0.0, LEN - HEAD, -HEAD, y),
        // Z axis
        v(0.0, 0.0, 0.0, z),
        v(0.0, 0.0, LEN, z),
        v(-HEAD, 0.0, LEN - HEAD, z),
        v(0.0, 0.0, LEN, z),
        v(0.0, 0.0, LEN, z),
        v(HEAD, 0.0, LEN - HEAD, z),
        // X
        v(c, HEAD, HEAD, x),
        v(c, -HEAD, -HEAD, x),
        v(c, HEAD, -HEAD, x),
        v(c, -HEAD, HEAD, x),
        // Y
        v(-HEAD, c, -HEAD, y),
        v(0.0, c, 0.0, y),
        v(HEAD, c, -HEAD, y),
        v(0.0, c, 0.0, y),
        v(0.0, c, 0.0, y),
        v(0.0, c, HEAD, y),
        // Z
        v(-HEAD, HEAD, c, z),
        v(HEAD, HEAD, c, z),
        v(HEAD, HEAD, c, z),
        v(-HEAD, -HEAD, c, z),
        v(-HEAD, -HEAD, c, z),
        v(HEAD, -HEAD, c, z),
    ]
}

/// Clip-space transform of the axes: the camera's rotation, scaled to a
/// fixed pixel size and moved to the top-right corner.
pub fn axes_transform(model_view: Mat4, extent: vk::Extent2D) -> Mat4 {
    #[allow(clippy::cast_precision_loss)]
    let (w, h) = (
        extent.width.max(1) as f32,
        extent.height.max(1) as f32,
    );
    let rotation = Mat4::from_mat3(Mat3::from_mat4(model_view));
    let scale = Mat4::from_scale(Vec3::new(AXES_OFFSET / w, -AXES_OFFSET / h, 0.0));
    let translation = Mat4::from_translation(Vec3::new(
        1.0 - 2.0 * AXES_OFFSET / w,
        -1.0 + 2.0 * AXES_OFFSET / h,
        0.0,
    ));
    translation * scale * rotation
}

/// Draws the orientation axes. Needs no descriptors; the transform is a push
/// constant.
pub struct AxesRenderable {
    id: RenderableId,
    device: Option<Arc<dyn RenderDevice>>,
    vertex_shader: vk::ShaderModule,
    fragment_shader: vk::ShaderModule,
    pipeline_layout: Option<Owned<vk::PipelineLayout>>,
    vertex_buffer: Option<DeviceBuffer>,
    command_buffers: Vec<Owned<vk::CommandBuffer>>,
    pipelines: Vec<Owned<vk::Pipeline>>,
    swap_chain: Option<SwapChainInfo>,
    transform: Mat4,
    vertices_state: ResourceTracker,
    command_buffer_state: ResourceTracker,
    pipeline_state: ResourceTracker,
    push_constant_state: ResourceTracker,
    destroyed: bool,
}

impl AxesRenderable {
    pub fn new() -> Self {
        Self {
            id: RenderableId::next(),
            device: None,
            vertex_shader: vk::ShaderModule::null(),
            fragment_shader: vk::ShaderModule::null(),
            pipeline_layout: None,
            vertex_buffer: None,
            command_buffers: Vec::new(),
            pipelines: Vec::new(),
            swap_chain: None,
            transform: Mat4::IDENTITY,
            vertices_state: ResourceTracker::needs_rebuild("axes vertices"),
            command_buffer_state: ResourceTracker::needs_rebuild("axes command buffers"),
            pipeline_state: ResourceTracker::needs_rebuild("axes pipelines"),
            push_constant_state: ResourceTracker::needs_rebuild("axes push constants"),
            destroyed: false,
        }
    }

    /// The transform pushed with the next recording.
    pub const fn transform(&self) -> Mat4 {
        self.transform
    }

    fn trackers(&self) -> [&ResourceTracker; 4] {
        [
            &self.vertices_state,
            &self.command_buffer_state,
            &self.pipeline_state,
            &self.push_constant_state,
        ]
    }

    fn release_swap_chain_resources(&mut self) {
        self.command_buffers.clear();
        self.pipelines.clear();
        self.command_buffer_state.request_rebuild();
        self.pipeline_state.request_rebuild();
    }

    fn create_pipelines(
        &self,
        device: &Arc<dyn RenderDevice>,
        swap_chain: &SwapChain,
    ) -> Result<Vec<Owned<vk::Pipeline>>> {
        let layout = self
            .pipeline_layout
            .as_ref()
            .ok_or(RenderError::NotInitialised("axes"))?
            .handle();

        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<AxesVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let attributes = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::size_of::<[f32; 3]>() as u32,
            },
        ];
        let desc = GraphicsPipelineDesc {
            render_pass: swap_chain.render_pass(),
            layout,
            vertex: self.vertex_shader,
            geometry: None,
            fragment: self.fragment_shader,
            vertex_bindings: &bindings,
            vertex_attributes: &attributes,
            topology: vk::PrimitiveTopology::LINE_LIST,
            depth_test: false,
            depth_write: false,
            blend: true,
        };

        (0..swap_chain.image_count())
            .map(|_| -> Result<Owned<vk::Pipeline>> {
                let pipeline = device.create_graphics_pipeline(&desc)?;
                Ok(Owned::new(device.clone(), pipeline))
            })
            .collect()
    }
}

impl Default for AxesRenderable {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderable for AxesRenderable {
    fn id(&self) -> RenderableId {
        self.id
    }

    fn name(&self) -> &'static str {
        "axes"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        if self.device.is_some() {
            return Err(RenderError::AlreadyInitialised("axes"));
        }
        let vertex_shader = ctx.shaders.module(ShaderId::AxesVertex)?;
        let fragment_shader = ctx.shaders.module(ShaderId::AxesFragment)?;
        let push_constants = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<Mat4>() as u32,
        }];
        let layout = ctx.device.create_pipeline_layout(&[], &push_constants)?;

        self.pipeline_layout = Some(Owned::new(ctx.device.clone(), layout));
        self.vertex_shader = vertex_shader;
        self.fragment_shader = fragment_shader;
        self.device = Some(ctx.device.clone());
        Ok(())
    }

    fn set_new_swap_chain(&mut self, swap_chain: Option<&SwapChain>) {
        let Some(swap_chain) = swap_chain else {
            self.release_swap_chain_resources();
            self.swap_chain = None;
            return;
        };

        let info = swap_chain.info();
        match self.swap_chain {
            Some(previous) if !previous.requires_rebuild(&info) => {}
            _ => self.release_swap_chain_resources(),
        }
        // The transform depends on the extent
        self.push_constant_state.request_update();
        self.swap_chain = Some(info);
    }

    fn set_new_descriptor_pool(&mut self, _pool: Option<&DescriptorPool>) {}

    fn increment_descriptor_type_requirements(
        &self,
        _requirements: &mut DescriptorPoolRequirements,
        _per_image: &mut DescriptorPoolRequirements,
    ) {
    }

    fn needs_display_update(&self, _ctx: &DisplayContext<'_>) -> bool {
        !self.destroyed
            && self.swap_chain.is_some()
            && self.trackers().iter().any(|t| !t.is_clean())
    }

    fn display_update(&mut self, ctx: &mut DisplayContext<'_>) -> Result<()> {
        let device = self
            .device
            .clone()
            .ok_or(RenderError::NotInitialised("axes"))?;

        if let Some(work) = self.vertices_state.pending() {
            self.vertex_buffer = Some(DeviceBuffer::upload(
                &device,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                "axes vertices",
                bytemuck::cast_slice(&axes_vertices()),
                0,
            )?);
            self.vertices_state.complete(work);
        }

        if let Some(work) = self.command_buffer_state.pending() {
            self.command_buffers = allocate_secondaries(&device, ctx.swap_chain.image_count())?;
            self.command_buffer_state.complete(work);
        }

        if let Some(work) = self.pipeline_state.pending() {
            self.pipelines = self.create_pipelines(&device, ctx.swap_chain)?;
            self.pipeline_state.complete(work);
        }

        if let Some(work) = self.push_constant_state.pending() {
            self.transform = axes_transform(ctx.view.model_view, ctx.swap_chain.extent());
            self.push_constant_state.complete(work);
        }
        Ok(())
    }

    fn vertex_count(&self) -> u32 {
        if self.destroyed {
            0
        } else {
            AXES_VERTEX_COUNT
        }
    }

    fn record_display_command_buffer(
        &mut self,
        ctx: &DisplayContext<'_>,
        inheritance: &Inheritance,
        image_index: u32,
    ) -> Result<vk::CommandBuffer> {
        let index = image_index as usize;
        let (Some(command_buffer), Some(pipeline), Some(layout), Some(vertices)) = (
            self.command_buffers.get(index),
            self.pipelines.get(index),
            self.pipeline_layout.as_ref(),
            self.vertex_buffer.as_ref(),
        ) else {
            return Err(RenderError::NotInitialised("axes command buffers"));
        };

        let transform = self.transform.to_cols_array();
        let push_constants = [PushConstant {
            stages: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            bytes: bytemuck::bytes_of(&transform),
        }];
        record_secondary(
            ctx.device.as_ref(),
            command_buffer.handle(),
            inheritance,
            &DrawCommand {
                pipeline: pipeline.handle(),
                layout: layout.handle(),
                extent: inheritance.extent,
                vertex_buffer: Some(vertices.handle()),
                descriptor_set: None,
                push_constants: &push_constants,
                vertex_count: AXES_VERTEX_COUNT,
            },
        )
    }

    fn apply_update(&mut self, update: RenderableUpdate) {
        if update == RenderableUpdate::CameraChanged {
            self.push_constant_state.request_update();
        }
    }

    fn destroy(&mut self) {
        self.command_buffers.clear();
        self.pipelines.clear();
        self.vertex_buffer = None;
        self.pipeline_layout = None;
        self.swap_chain = None;
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn vertex_layout_matches_shader_input() {
        assert_eq!(std::mem::size_of::<AxesVertex>(), 28);
        assert_eq!(axes_vertices().len(), AXES_VERTEX_COUNT as usize);
    }

    #[test]
    fn origin_sits_at_top_right_offset() {
        let clip = axes_transform(Mat4::IDENTITY, EXTENT) * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // 50 pixels in from the right and top edges
        assert_relative_eq!((1.0 - clip.x) * 400.0, 50.0, epsilon = 1e-3);
        assert_relative_eq!((clip.y + 1.0) * 300.0, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn unit_length_is_fixed_in_pixels() {
        let transform = axes_transform(Mat4::IDENTITY, EXTENT);
        let origin = transform * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let x = transform * Vec4::new(1.0, 0.0, 0.0, 1.0);
        let y = transform * Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert_relative_eq!((x.x - origin.x) * 400.0, 25.0, epsilon = 1e-3);
        // Up in world space is up on screen
        assert!(y.y < origin.y);
    }

    #[test]
    fn translation_is_ignored() {
        let moved = Mat4::from_translation(Vec3::new(10.0, -4.0, 3.0));
        assert_eq!(
            axes_transform(moved, EXTENT),
            axes_transform(Mat4::IDENTITY, EXTENT)
        );
    }

    #[test]
    fn new_axes_are_not_ready() {
        let axes = AxesRenderable::new();
        assert!(axes.trackers().iter().all(|t| !t.is_clean()));
        assert_eq!(axes.vertex_count(), AXES_VERTEX_COUNT);
    }
}
