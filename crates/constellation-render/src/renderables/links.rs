//! Links between vertices.
//!
//! Links do not own positions: they index the icon position buffer published
//! in [`crate::SharedResources`], so they are only drawn once icons exist.

use super::buffers::{DeviceBuffer, UniformBuffer};
use super::icons::refresh_uniforms;
use super::{allocate_secondaries, record_secondary, VertexFlags};
use crate::descriptor_pool::{DescriptorPool, DescriptorPoolRequirements, DescriptorSets};
use crate::error::{RenderError, Result};
use crate::renderable::{DisplayContext, InitContext, Renderable, RenderableId};
use crate::resource_state::ResourceTracker;
use crate::shaders::ShaderId;
use crate::swap_chain::{SwapChain, SwapChainInfo};
use crate::tasks::{RenderCommand, RenderableUpdate};
use crate::view::ViewState;
use crate::visual::{VisualAccess, VisualChange};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use constellation_gpu::{
    DescriptorBinding, DescriptorWrite, DrawCommand, GraphicsPipelineDesc, Inheritance, Owned,
    PushConstant, RenderDevice,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Link widths are stored in sixteenths of a pixel.
const WIDTH_SCALE: f32 = 16.0;
const FLAG_BITS: u32 = 2;
const MV_BYTES: u32 = 64;

/// How links are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStyle {
    /// Ribbons with a direction arrow, for perspective views.
    Perspective,
    /// Thin lines, for orthogonal views.
    Orthogonal,
}

impl LinkStyle {
    const fn geometry_shader(self) -> ShaderId {
        match self {
            Self::Perspective => ShaderId::LinkTriangleGeometry,
            Self::Orthogonal => ShaderId::LinkLineGeometry,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Perspective => "perspective links",
            Self::Orthogonal => "orthogonal links",
        }
    }
}

/// One end of a link.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LinkVertex {
    /// Link colour with visibility in alpha.
    pub colour: [f32; 4],
    /// `(position index, other position index, width and flags, link id)`
    pub data: [i32; 4],
}

/// Pack a pixel width and flags into one lane.
pub fn pack_width_and_flags(width: f32, flags: VertexFlags) -> i32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let width = (width.max(0.0) * WIDTH_SCALE).round() as u32;
    ((width << FLAG_BITS) | u32::from(flags.bits())) as i32
}

fn link_vertices(access: &dyn VisualAccess, link: usize) -> [LinkVertex; 2] {
    let colour = access
        .link_colour(link)
        .extend(access.link_visibility(link))
        .to_array();
    let flags = VertexFlags::from_state(access.link_selected(link), access.link_dimmed(link));
    let width_and_flags = pack_width_and_flags(access.link_width(link), flags);
    let id = access.link_id(link);
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let (low, high) = (
        access.link_low_vertex(link) as i32,
        access.link_high_vertex(link) as i32,
    );
    [
        LinkVertex {
            colour,
            data: [low, high, width_and_flags, id],
        },
        LinkVertex {
            colour,
            data: [high, low, width_and_flags, id],
        },
    ]
}

/// Vertex stage uniforms (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LinkVertexUniforms {
    pub morph_mix: f32,
    pub visibility_low: f32,
    pub visibility_high: f32,
    pub _pad: f32,
}

impl From<&ViewState> for LinkVertexUniforms {
    fn from(view: &ViewState) -> Self {
        Self {
            morph_mix: view.morph_mix,
            visibility_low: view.visibility_low,
            visibility_high: view.visibility_high,
            _pad: 0.0,
        }
    }
}

/// Geometry stage uniforms (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LinkGeometryUniforms {
    pub p_matrix: [f32; 16],
    pub highlight_colour: [f32; 16],
    pub pixel_density: f32,
    pub alpha: f32,
    pub draw_hit_test: i32,
    pub _pad: f32,
}

impl From<&ViewState> for LinkGeometryUniforms {
    fn from(view: &ViewState) -> Self {
        Self {
            p_matrix: view.projection.to_cols_array(),
            highlight_colour: view.highlight_matrix().to_cols_array(),
            pixel_density: view.pixel_density,
            alpha: 1.0,
            draw_hit_test: 0,
            _pad: 0.0,
        }
    }
}

#[derive(Default)]
struct Staging {
    vertices: Mutex<Vec<LinkVertex>>,
    targets: Mutex<Vec<RenderableId>>,
}

/// Producer-side handle that stages link data for every renderable created
/// from it.
#[derive(Clone, Default)]
pub struct LinksStager {
    staging: Arc<Staging>,
}

impl LinksStager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderable drawing the staged links in `style`.
    pub fn renderable(&self, style: LinkStyle) -> LinksRenderable {
        let renderable = LinksRenderable::new(style, self.staging.clone());
        self.staging.targets.lock().push(renderable.id);
        renderable
    }

    fn broadcast(&self, update: RenderableUpdate) -> Vec<RenderCommand> {
        self.staging
            .targets
            .lock()
            .iter()
            .map(|&target| RenderCommand::renderable(target, update))
            .collect()
    }

    /// Restage every link.
    pub fn rebuild_links(&self, access: &dyn VisualAccess) -> Vec<RenderCommand> {
        let count = {
            let mut vertices = self.staging.vertices.lock();
            vertices.clear();
            vertices.extend((0..access.link_count()).flat_map(|link| link_vertices(access, link)));
            vertices.len()
        };
        tracing::debug!("Links staged: {} vertices", count);
        self.broadcast(RenderableUpdate::LinksRebuilt {
            count: u32::try_from(count).unwrap_or(u32::MAX),
        })
    }

    /// Restage colour, width and flags of the changed links.
    pub fn update_links(
        &self,
        access: &dyn VisualAccess,
        change: &VisualChange,
    ) -> Vec<RenderCommand> {
        {
            let mut vertices = self.staging.vertices.lock();
            let links = vertices.len() / 2;
            if links == access.link_count() {
                for link in change.iter().filter(|&link| link < links) {
                    vertices[link * 2..link * 2 + 2].copy_from_slice(&link_vertices(access, link));
                }
                return self.broadcast(RenderableUpdate::LinksChanged);
            }
        }
        self.rebuild_links(access)
    }
}

const DESCRIPTOR_BINDINGS: [DescriptorBinding; 3] = [
    DescriptorBinding::new(
        0,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::ShaderStageFlags::VERTEX,
    ),
    DescriptorBinding::new(
        1,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        vk::ShaderStageFlags::VERTEX,
    ),
    DescriptorBinding::new(
        2,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::ShaderStageFlags::GEOMETRY,
    ),
];

/// Draws links in one [`LinkStyle`].
pub struct LinksRenderable {
    id: RenderableId,
    style: LinkStyle,
    staging: Arc<Staging>,
    device: Option<Arc<dyn RenderDevice>>,
    shaders: [vk::ShaderModule; 3],
    descriptor_layout: Option<Owned<vk::DescriptorSetLayout>>,
    pipeline_layout: Option<Owned<vk::PipelineLayout>>,

    vertex_buffer: Option<DeviceBuffer>,
    vertex_uniforms: Vec<UniformBuffer>,
    geometry_uniforms: Vec<UniformBuffer>,
    descriptor_sets: Option<DescriptorSets>,
    command_buffers: Vec<Owned<vk::CommandBuffer>>,
    pipelines: Vec<Owned<vk::Pipeline>>,

    swap_chain: Option<SwapChainInfo>,
    position_generation: u64,
    vertex_count: u32,
    uploaded_vertices: u32,

    vertices_state: ResourceTracker,
    vertex_ubo_state: ResourceTracker,
    geometry_ubo_state: ResourceTracker,
    descriptor_set_state: ResourceTracker,
    command_buffer_state: ResourceTracker,
    pipeline_state: ResourceTracker,
    destroyed: bool,
}

impl LinksRenderable {
    fn new(style: LinkStyle, staging: Arc<Staging>) -> Self {
        Self {
            id: RenderableId::next(),
            style,
            staging,
            device: None,
            shaders: [vk::ShaderModule::null(); 3],
            descriptor_layout: None,
            pipeline_layout: None,
            vertex_buffer: None,
            vertex_uniforms: Vec::new(),
            geometry_uniforms: Vec::new(),
            descriptor_sets: None,
            command_buffers: Vec::new(),
            pipelines: Vec::new(),
            swap_chain: None,
            position_generation: 0,
            vertex_count: 0,
            uploaded_vertices: 0,
            vertices_state: ResourceTracker::needs_rebuild("link vertices"),
            vertex_ubo_state: ResourceTracker::needs_rebuild("link vertex UBO"),
            geometry_ubo_state: ResourceTracker::needs_rebuild("link geometry UBO"),
            descriptor_set_state: ResourceTracker::needs_rebuild("link descriptor sets"),
            command_buffer_state: ResourceTracker::needs_rebuild("link command buffers"),
            pipeline_state: ResourceTracker::needs_rebuild("link pipelines"),
            destroyed: false,
        }
    }

    pub const fn style(&self) -> LinkStyle {
        self.style
    }

    pub fn vertex_buffer(&self) -> Option<vk::Buffer> {
        self.vertex_buffer.as_ref().map(DeviceBuffer::handle)
    }

    fn trackers(&self) -> [&ResourceTracker; 6] {
        [
            &self.vertices_state,
            &self.vertex_ubo_state,
            &self.geometry_ubo_state,
            &self.descriptor_set_state,
            &self.command_buffer_state,
            &self.pipeline_state,
        ]
    }

    /// Whether every per-image resource exists and points at live data.
    fn ready(&self) -> bool {
        self.descriptor_sets.is_some()
            && self.descriptor_set_state.is_clean()
            && !self.pipelines.is_empty()
            && !self.command_buffers.is_empty()
    }

    fn release_per_image_resources(&mut self) {
        self.descriptor_sets = None;
        self.command_buffers.clear();
        self.pipelines.clear();
        self.vertex_uniforms.clear();
        self.geometry_uniforms.clear();
        self.vertex_ubo_state.request_rebuild();
        self.geometry_ubo_state.request_rebuild();
        self.descriptor_set_state.request_rebuild();
        self.command_buffer_state.request_rebuild();
        self.pipeline_state.request_rebuild();
    }

    fn update_vertex_buffer(&mut self, device: &Arc<dyn RenderDevice>) -> Result<()> {
        let Some(work) = self.vertices_state.pending() else {
            return Ok(());
        };
        let vertices = self.staging.vertices.lock();
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let reusable = self
            .vertex_buffer
            .as_ref()
            .filter(|buffer| !work.is_rebuild() && buffer.size() == bytes.len() as u64);
        if let Some(buffer) = reusable {
            buffer.write(device, bytes)?;
        } else {
            self.vertex_buffer = Some(DeviceBuffer::upload(
                device,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                self.style.name(),
                bytes,
                std::mem::size_of::<LinkVertex>() as u64,
            )?);
        }
        self.uploaded_vertices = u32::try_from(vertices.len()).unwrap_or(u32::MAX);
        drop(vertices);
        self.vertices_state.complete(work);
        Ok(())
    }

    fn update_descriptor_sets(&mut self, ctx: &DisplayContext<'_>) -> Result<()> {
        let Some(positions) = ctx.shared.position_view else {
            return Ok(());
        };
        if ctx.shared.position_generation != self.position_generation {
            self.descriptor_set_state.request_update();
        }
        let Some(work) = self.descriptor_set_state.pending() else {
            return Ok(());
        };
        if work.is_rebuild() || self.descriptor_sets.is_none() {
            let layout = self
                .descriptor_layout
                .as_ref()
                .ok_or(RenderError::NotInitialised("links"))?
                .handle();
            self.descriptor_sets = None;
            self.descriptor_sets = Some(DescriptorSets::allocate(
                ctx.device,
                ctx.descriptor_pool,
                layout,
                ctx.swap_chain.image_count(),
            )?);
        }

        let Some(sets) = self.descriptor_sets.as_ref() else {
            return Err(RenderError::NotInitialised("link descriptor sets"));
        };
        for (i, set) in sets.iter().enumerate() {
            let (Some(vertex), Some(geometry)) =
                (self.vertex_uniforms.get(i), self.geometry_uniforms.get(i))
            else {
                return Err(RenderError::NotInitialised("link uniforms"));
            };
            ctx.device.write_descriptor_set(
                set,
                &[
                    DescriptorWrite::UniformBuffer {
                        binding: 0,
                        buffer: vertex.handle(),
                        range: vertex.size(),
                    },
                    DescriptorWrite::TexelBuffer {
                        binding: 1,
                        view: positions,
                    },
                    DescriptorWrite::UniformBuffer {
                        binding: 2,
                        buffer: geometry.handle(),
                        range: geometry.size(),
                    },
                ],
            );
        }
        self.position_generation = ctx.shared.position_generation;
        self.descriptor_set_state.complete(work);
        Ok(())
    }

    fn create_pipelines(
        &self,
        device: &Arc<dyn RenderDevice>,
        swap_chain: &SwapChain,
    ) -> Result<Vec<Owned<vk::Pipeline>>> {
        let layout = self
            .pipeline_layout
            .as_ref()
            .ok_or(RenderError::NotInitialised("links"))?
            .handle();
        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<LinkVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let attributes = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32A32_SINT,
                offset: std::mem::size_of::<[f32; 4]>() as u32,
            },
        ];
        let [vertex, geometry, fragment] = self.shaders;
        let desc = GraphicsPipelineDesc {
            render_pass: swap_chain.render_pass(),
            layout,
            vertex,
            geometry: Some(geometry),
            fragment,
            vertex_bindings: &bindings,
            vertex_attributes: &attributes,
            topology: vk::PrimitiveTopology::LINE_LIST,
            depth_test: true,
            depth_write: true,
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

impl Renderable for LinksRenderable {
    fn id(&self) -> RenderableId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.style.name()
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        if self.device.is_some() {
            return Err(RenderError::AlreadyInitialised(self.style.name()));
        }
        let shaders = [
            ctx.shaders.module(ShaderId::LinkVertex)?,
            ctx.shaders.module(self.style.geometry_shader())?,
            ctx.shaders.module(ShaderId::LinkFragment)?,
        ];
        let descriptor_layout = Owned::new(
            ctx.device.clone(),
            ctx.device.create_descriptor_set_layout(&DESCRIPTOR_BINDINGS)?,
        );
        let push_constants = [
            vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: MV_BYTES,
            },
            vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::GEOMETRY | vk::ShaderStageFlags::FRAGMENT,
                offset: MV_BYTES,
                size: std::mem::size_of::<i32>() as u32,
            },
        ];
        let pipeline_layout = Owned::new(
            ctx.device.clone(),
            ctx.device
                .create_pipeline_layout(&[descriptor_layout.handle()], &push_constants)?,
        );

        self.shaders = shaders;
        self.descriptor_layout = Some(descriptor_layout);
        self.pipeline_layout = Some(pipeline_layout);
        self.device = Some(ctx.device.clone());
        Ok(())
    }

    fn set_new_swap_chain(&mut self, swap_chain: Option<&SwapChain>) {
        let Some(swap_chain) = swap_chain else {
            self.release_per_image_resources();
            self.swap_chain = None;
            return;
        };
        let info = swap_chain.info();
        match self.swap_chain {
            Some(previous) if !previous.requires_rebuild(&info) => {
                self.geometry_ubo_state.request_update();
            }
            _ => self.release_per_image_resources(),
        }
        self.swap_chain = Some(info);
    }

    fn set_new_descriptor_pool(&mut self, _pool: Option<&DescriptorPool>) {
        self.descriptor_sets = None;
        self.descriptor_set_state.request_rebuild();
    }

    fn increment_descriptor_type_requirements(
        &self,
        _requirements: &mut DescriptorPoolRequirements,
        per_image: &mut DescriptorPoolRequirements,
    ) {
        per_image.add(vk::DescriptorType::UNIFORM_BUFFER, 2);
        per_image.add(vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 1);
        per_image.add_sets(1);
    }

    fn needs_display_update(&self, ctx: &DisplayContext<'_>) -> bool {
        if self.destroyed || self.swap_chain.is_none() || ctx.shared.position_view.is_none() {
            return false;
        }
        self.trackers().iter().any(|t| !t.is_clean())
            || ctx.shared.position_generation != self.position_generation
    }

    fn display_update(&mut self, ctx: &mut DisplayContext<'_>) -> Result<()> {
        let device = self
            .device
            .clone()
            .ok_or(RenderError::NotInitialised(self.style.name()))?;
        let image_count = ctx.swap_chain.image_count() as usize;

        self.update_vertex_buffer(&device)?;
        let mut rebuilt = refresh_uniforms(
            &device,
            &mut self.vertex_ubo_state,
            &mut self.vertex_uniforms,
            image_count,
            "link vertex UBO",
            &LinkVertexUniforms::from(ctx.view),
        )?;
        rebuilt |= refresh_uniforms(
            &device,
            &mut self.geometry_ubo_state,
            &mut self.geometry_uniforms,
            image_count,
            "link geometry UBO",
            &LinkGeometryUniforms::from(ctx.view),
        )?;
        if rebuilt {
            self.descriptor_set_state.request_update();
        }
        self.update_descriptor_sets(ctx)?;

        if let Some(work) = self.command_buffer_state.pending() {
            self.command_buffers = allocate_secondaries(&device, ctx.swap_chain.image_count())?;
            self.command_buffer_state.complete(work);
        }
        if let Some(work) = self.pipeline_state.pending() {
            self.pipelines = self.create_pipelines(&device, ctx.swap_chain)?;
            self.pipeline_state.complete(work);
        }
        Ok(())
    }

    fn vertex_count(&self) -> u32 {
        if self.destroyed || !self.ready() {
            0
        } else {
            self.vertex_count.min(self.uploaded_vertices)
        }
    }

    fn record_display_command_buffer(
        &mut self,
        ctx: &DisplayContext<'_>,
        inheritance: &Inheritance,
        image_index: u32,
    ) -> Result<vk::CommandBuffer> {
        let index = image_index as usize;
        let (Some(command_buffer), Some(pipeline), Some(layout), Some(vertices), Some(sets)) = (
            self.command_buffers.get(index),
            self.pipelines.get(index),
            self.pipeline_layout.as_ref(),
            self.vertex_buffer.as_ref(),
            self.descriptor_sets.as_ref(),
        ) else {
            return Err(RenderError::NotInitialised("link command buffers"));
        };

        let model_view = ctx.view.model_view.to_cols_array();
        let draw_hit_test = 0i32;
        let push_constants = [
            PushConstant {
                stages: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                bytes: bytemuck::bytes_of(&model_view),
            },
            PushConstant {
                stages: vk::ShaderStageFlags::GEOMETRY | vk::ShaderStageFlags::FRAGMENT,
                offset: MV_BYTES,
                bytes: bytemuck::bytes_of(&draw_hit_test),
            },
        ];
        record_secondary(
            ctx.device.as_ref(),
            command_buffer.handle(),
            inheritance,
            &DrawCommand {
                pipeline: pipeline.handle(),
                layout: layout.handle(),
                extent: inheritance.extent,
                vertex_buffer: Some(vertices.handle()),
                descriptor_set: sets.get(index),
                push_constants: &push_constants,
                vertex_count: self.vertex_count(),
            },
        )
    }

    fn apply_update(&mut self, update: RenderableUpdate) {
        match update {
            RenderableUpdate::LinksRebuilt { count } => {
                self.vertex_count = count;
                self.vertices_state.request_rebuild();
            }
            RenderableUpdate::LinksChanged => self.vertices_state.request_update(),
            RenderableUpdate::CameraChanged => {
                self.vertex_ubo_state.request_update();
                self.geometry_ubo_state.request_update();
            }
            RenderableUpdate::HighlightColourChanged => self.geometry_ubo_state.request_update(),
            _ => {}
        }
    }

    fn destroy(&mut self) {
        self.release_per_image_resources();
        self.vertex_buffer = None;
        self.pipeline_layout = None;
        self.descriptor_layout = None;
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

    #[test]
    fn struct_sizes_match_shader_layouts() {
        assert_eq!(std::mem::size_of::<LinkVertex>(), 32);
        assert_eq!(std::mem::size_of::<LinkVertexUniforms>(), 16);
        assert_eq!(std::mem::size_of::<LinkGeometryUniforms>(), 144);
    }

    #[test]
    fn width_is_stored_in_sixteenths_above_flags() {
        let packed = pack_width_and_flags(2.5, VertexFlags::SELECTED | VertexFlags::DIMMED);
        assert_eq!(packed & 0b11, 3);
        assert_eq!(packed >> 2, 40);
        assert_eq!(pack_width_and_flags(-1.0, VertexFlags::empty()), 0);
    }

    #[test]
    fn stager_broadcasts_to_every_style() {
        let stager = LinksStager::new();
        let perspective = stager.renderable(LinkStyle::Perspective);
        let orthogonal = stager.renderable(LinkStyle::Orthogonal);
        let commands = stager.broadcast(RenderableUpdate::LinksChanged);
        assert_eq!(
            commands,
            vec![
                RenderCommand::renderable(perspective.id(), RenderableUpdate::LinksChanged),
                RenderCommand::renderable(orthogonal.id(), RenderableUpdate::LinksChanged),
            ]
        );
    }

    #[test]
    fn nothing_drawn_before_descriptors_exist() {
        let stager = LinksStager::new();
        let mut links = stager.renderable(LinkStyle::Orthogonal);
        links.apply_update(RenderableUpdate::LinksRebuilt { count: 8 });
        assert_eq!(links.vertex_count(), 0);
    }
}
