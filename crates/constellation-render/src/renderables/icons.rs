//! Vertex icons.
//!
//! Each vertex is a point that the geometry shader expands into a highlight,
//! background, foreground and up to four decorator quads. Positions and flags
//! live in texel buffers so links can read the same positions.

use super::buffers::{DeviceBuffer, TexelBuffer, UniformBuffer};
use super::{allocate_secondaries, record_secondary, VertexFlags};
use crate::atlas::{IconTextureAtlas, TRANSPARENT_ICON_INDEX};
use crate::descriptor_pool::{DescriptorPool, DescriptorPoolRequirements, DescriptorSets};
use crate::error::{RenderError, Result};
use crate::renderable::{DisplayContext, InitContext, Renderable, RenderableId};
use crate::resource_state::ResourceTracker;
use crate::shaders::ShaderId;
use crate::swap_chain::{SwapChain, SwapChainInfo};
use crate::tasks::{RenderCommand, RenderableUpdate};
use crate::view::ViewState;
use crate::visual::{Decorator, VisualAccess, VisualChange};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use constellation_gpu::{
    DescriptorBinding, DescriptorWrite, DrawCommand, GraphicsPipelineDesc, Inheritance, Owned,
    RenderDevice,
};
use parking_lot::Mutex;
use std::sync::Arc;

const ICON_BITS: u32 = 16;
const ICON_MASK: u32 = 0xffff;
/// Floats per vertex in the position buffer: primary then alternate position.
pub const POSITION_FLOATS: usize = 8;
const POSITION_TEXEL_BYTES: u64 = 16;

/// Two 16-bit icon indices in one lane.
pub const fn pack_icon_pair(high: u32, low: u32) -> i32 {
    ((high << ICON_BITS) | (low & ICON_MASK)) as i32
}

/// Icon vertex: background colour with visibility in alpha, and packed icon
/// indices.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct IconVertex {
    pub background_colour: [f32; 4],
    /// `(bg << 16 | fg, sw << 16 | nw, ne << 16 | se, vertex id)`
    pub data: [i32; 4],
}

impl IconVertex {
    /// Build vertex `v` from `access`, registering its icons with `atlas`.
    pub fn from_access(access: &dyn VisualAccess, atlas: &IconTextureAtlas, v: usize) -> Self {
        let mut vertex = Self::default();
        vertex.set_colour(access, v);
        vertex.data = icon_data(access, atlas, v);
        vertex
    }

    fn set_colour(&mut self, access: &dyn VisualAccess, v: usize) {
        self.background_colour = access
            .vertex_colour(v)
            .extend(access.vertex_visibility(v))
            .to_array();
    }
}

fn icon_data(access: &dyn VisualAccess, atlas: &IconTextureAtlas, v: usize) -> [i32; 4] {
    let decorator = |slot| {
        access
            .decorator(v, slot)
            .map_or(TRANSPARENT_ICON_INDEX, |name| atlas.add_icon(&name))
    };
    let foreground = atlas.add_icon(&access.foreground_icon(v));
    let background = atlas.add_icon(&access.background_icon(v));
    [
        pack_icon_pair(background, foreground),
        pack_icon_pair(decorator(Decorator::SouthWest), decorator(Decorator::NorthWest)),
        pack_icon_pair(decorator(Decorator::NorthEast), decorator(Decorator::SouthEast)),
        access.vertex_id(v),
    ]
}

fn position_of(access: &dyn VisualAccess, v: usize) -> [f32; POSITION_FLOATS] {
    let p = access.position(v);
    let a = access.alternate_position(v);
    let r = access.radius(v);
    [p.x, p.y, p.z, r, a.x, a.y, a.z, r]
}

fn flags_of(access: &dyn VisualAccess, v: usize) -> u8 {
    VertexFlags::from_state(access.vertex_selected(v), access.vertex_dimmed(v)).bits()
}

/// Vertex stage uniforms (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct IconVertexUniforms {
    pub mv_matrix: [f32; 16],
    pub morph_mix: f32,
    pub visibility_low: f32,
    pub visibility_high: f32,
    pub _pad: f32,
}

impl From<&ViewState> for IconVertexUniforms {
    fn from(view: &ViewState) -> Self {
        Self {
            mv_matrix: view.model_view.to_cols_array(),
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
pub struct IconGeometryUniforms {
    pub p_matrix: [f32; 16],
    pub highlight_colour: [f32; 16],
    pub pixel_density: f32,
    pub draw_hit_test: i32,
    pub _pad: [f32; 2],
}

impl From<&ViewState> for IconGeometryUniforms {
    fn from(view: &ViewState) -> Self {
        Self {
            p_matrix: view.projection.to_cols_array(),
            highlight_colour: view.highlight_matrix().to_cols_array(),
            pixel_density: view.pixel_density,
            draw_hit_test: 0,
            _pad: [0.0; 2],
        }
    }
}

/// Fragment stage uniforms (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct IconFragmentUniforms {
    pub draw_hit_test: i32,
    pub _pad: [i32; 3],
}

#[derive(Default)]
struct Staging {
    vertices: Mutex<Vec<IconVertex>>,
    positions: Mutex<Vec<f32>>,
    flags: Mutex<Vec<u8>>,
}

/// Producer-side handle that stages icon data and builds the matching
/// [`RenderCommand`]s.
#[derive(Clone)]
pub struct IconsStager {
    target: RenderableId,
    staging: Arc<Staging>,
    atlas: Arc<IconTextureAtlas>,
}

impl IconsStager {
    pub const fn target(&self) -> RenderableId {
        self.target
    }

    const fn command(&self, update: RenderableUpdate) -> RenderCommand {
        RenderCommand::renderable(self.target, update)
    }

    /// Restage every vertex: icons, colours, positions and flags.
    pub fn rebuild_icons(&self, access: &dyn VisualAccess) -> RenderCommand {
        let count = access.vertex_count();
        {
            let mut vertices = self.staging.vertices.lock();
            vertices.clear();
            vertices.extend((0..count).map(|v| IconVertex::from_access(access, &self.atlas, v)));
        }
        {
            let mut positions = self.staging.positions.lock();
            positions.clear();
            positions.extend((0..count).flat_map(|v| position_of(access, v)));
        }
        {
            let mut flags = self.staging.flags.lock();
            flags.clear();
            flags.extend((0..count).map(|v| flags_of(access, v)));
        }
        tracing::debug!("Icons staged: {} vertices", count);

        self.command(RenderableUpdate::VerticesRebuilt {
            count: u32::try_from(count).unwrap_or(u32::MAX),
        })
    }

    /// Restage the icon indices of the changed vertices.
    pub fn update_icons(&self, access: &dyn VisualAccess, change: &VisualChange) -> RenderCommand {
        {
            let mut vertices = self.staging.vertices.lock();
            let len = vertices.len();
            if len == access.vertex_count() {
                for v in change.iter().filter(|&v| v < len) {
                    vertices[v].data = icon_data(access, &self.atlas, v);
                }
                return self.command(RenderableUpdate::VerticesChanged);
            }
        }
        self.rebuild_icons(access)
    }

    /// Restage the background colour and visibility of the changed vertices.
    pub fn update_colours(&self, access: &dyn VisualAccess, change: &VisualChange) -> RenderCommand {
        {
            let mut vertices = self.staging.vertices.lock();
            let len = vertices.len();
            if len == access.vertex_count() {
                for v in change.iter().filter(|&v| v < len) {
                    vertices[v].set_colour(access, v);
                }
                return self.command(RenderableUpdate::ColoursChanged);
            }
        }
        self.rebuild_icons(access)
    }

    /// Restage the positions of the changed vertices.
    pub fn update_positions(
        &self,
        access: &dyn VisualAccess,
        change: &VisualChange,
    ) -> RenderCommand {
        {
            let mut positions = self.staging.positions.lock();
            if positions.len() == access.vertex_count() * POSITION_FLOATS {
                for v in change.iter().filter(|&v| v < access.vertex_count()) {
                    let start = v * POSITION_FLOATS;
                    positions[start..start + POSITION_FLOATS]
                        .copy_from_slice(&position_of(access, v));
                }
                return self.command(RenderableUpdate::PositionsChanged);
            }
        }
        self.rebuild_icons(access)
    }

    /// Restage every vertex's flags.
    pub fn rebuild_vertex_flags(&self, access: &dyn VisualAccess) -> RenderCommand {
        let mut flags = self.staging.flags.lock();
        flags.clear();
        flags.extend((0..access.vertex_count()).map(|v| flags_of(access, v)));
        self.command(RenderableUpdate::FlagsRebuilt)
    }

    /// Restage the flags of the changed vertices.
    pub fn update_vertex_flags(
        &self,
        access: &dyn VisualAccess,
        change: &VisualChange,
    ) -> RenderCommand {
        {
            let mut flags = self.staging.flags.lock();
            let len = flags.len();
            if len == access.vertex_count() {
                for v in change.iter().filter(|&v| v < len) {
                    flags[v] = flags_of(access, v);
                }
                return self.command(RenderableUpdate::FlagsChanged);
            }
        }
        self.rebuild_vertex_flags(access)
    }

    /// The renderer applies highlight colours to every renderable at once.
    pub fn set_highlight_colour(&self, access: &dyn VisualAccess) -> RenderCommand {
        RenderCommand::SetHighlightColour(access.highlight_colour())
    }
}

/// Draws one icon stack per vertex.
pub struct IconsRenderable {
    id: RenderableId,
    staging: Arc<Staging>,
    device: Option<Arc<dyn RenderDevice>>,
    shaders: [vk::ShaderModule; 3],
    descriptor_layout: Option<Owned<vk::DescriptorSetLayout>>,
    pipeline_layout: Option<Owned<vk::PipelineLayout>>,

    vertex_buffer: Option<DeviceBuffer>,
    position_buffer: Option<TexelBuffer>,
    flags_buffer: Option<TexelBuffer>,
    vertex_uniforms: Vec<UniformBuffer>,
    geometry_uniforms: Vec<UniformBuffer>,
    fragment_uniforms: Vec<UniformBuffer>,
    descriptor_sets: Option<DescriptorSets>,
    command_buffers: Vec<Owned<vk::CommandBuffer>>,
    pipelines: Vec<Owned<vk::Pipeline>>,

    swap_chain: Option<SwapChainInfo>,
    atlas_generation: u64,
    vertex_count: u32,
    uploaded_vertices: u32,

    vertices_state: ResourceTracker,
    positions_state: ResourceTracker,
    flags_state: ResourceTracker,
    vertex_ubo_state: ResourceTracker,
    geometry_ubo_state: ResourceTracker,
    fragment_ubo_state: ResourceTracker,
    descriptor_set_state: ResourceTracker,
    command_buffer_state: ResourceTracker,
    pipeline_state: ResourceTracker,
    destroyed: bool,
}

const DESCRIPTOR_BINDINGS: [DescriptorBinding; 6] = [
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
    DescriptorBinding::new(
        3,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        vk::ShaderStageFlags::GEOMETRY,
    ),
    DescriptorBinding::new(
        4,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::ShaderStageFlags::FRAGMENT,
    ),
    DescriptorBinding::new(
        5,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::ShaderStageFlags::FRAGMENT,
    ),
];

impl IconsRenderable {
    pub fn new() -> Self {
        Self {
            id: RenderableId::next(),
            staging: Arc::default(),
            device: None,
            shaders: [vk::ShaderModule::null(); 3],
            descriptor_layout: None,
            pipeline_layout: None,
            vertex_buffer: None,
            position_buffer: None,
            flags_buffer: None,
            vertex_uniforms: Vec::new(),
            geometry_uniforms: Vec::new(),
            fragment_uniforms: Vec::new(),
            descriptor_sets: None,
            command_buffers: Vec::new(),
            pipelines: Vec::new(),
            swap_chain: None,
            atlas_generation: 0,
            vertex_count: 0,
            uploaded_vertices: 0,
            vertices_state: ResourceTracker::new("icon vertices"),
            positions_state: ResourceTracker::new("icon positions"),
            flags_state: ResourceTracker::new("icon flags"),
            vertex_ubo_state: ResourceTracker::needs_rebuild("icon vertex UBO"),
            geometry_ubo_state: ResourceTracker::needs_rebuild("icon geometry UBO"),
            fragment_ubo_state: ResourceTracker::needs_rebuild("icon fragment UBO"),
            descriptor_set_state: ResourceTracker::needs_rebuild("icon descriptor sets"),
            command_buffer_state: ResourceTracker::needs_rebuild("icon command buffers"),
            pipeline_state: ResourceTracker::needs_rebuild("icon pipelines"),
            destroyed: false,
        }
    }

    /// A producer-side stager feeding this renderable.
    pub fn stager(&self, atlas: Arc<IconTextureAtlas>) -> IconsStager {
        IconsStager {
            target: self.id,
            staging: self.staging.clone(),
            atlas,
        }
    }

    pub fn vertex_buffer(&self) -> Option<vk::Buffer> {
        self.vertex_buffer.as_ref().map(DeviceBuffer::handle)
    }

    pub fn position_buffer(&self) -> Option<vk::Buffer> {
        self.position_buffer.as_ref().map(TexelBuffer::buffer)
    }

    pub fn flags_buffer(&self) -> Option<vk::Buffer> {
        self.flags_buffer.as_ref().map(TexelBuffer::buffer)
    }

    fn trackers(&self) -> [&ResourceTracker; 9] {
        [
            &self.vertices_state,
            &self.positions_state,
            &self.flags_state,
            &self.vertex_ubo_state,
            &self.geometry_ubo_state,
            &self.fragment_ubo_state,
            &self.descriptor_set_state,
            &self.command_buffer_state,
            &self.pipeline_state,
        ]
    }

    fn release_per_image_resources(&mut self) {
        self.descriptor_sets = None;
        self.command_buffers.clear();
        self.pipelines.clear();
        self.vertex_uniforms.clear();
        self.geometry_uniforms.clear();
        self.fragment_uniforms.clear();
        self.vertex_ubo_state.request_rebuild();
        self.geometry_ubo_state.request_rebuild();
        self.fragment_ubo_state.request_rebuild();
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
                "icon vertices",
                bytes,
                std::mem::size_of::<IconVertex>() as u64,
            )?);
        }
        self.uploaded_vertices = u32::try_from(vertices.len()).unwrap_or(u32::MAX);
        drop(vertices);
        self.vertices_state.complete(work);
        Ok(())
    }

    fn update_position_buffer(&mut self, ctx: &mut DisplayContext<'_>) -> Result<()> {
        let Some(work) = self.positions_state.pending() else {
            return Ok(());
        };
        let positions = self.staging.positions.lock();
        let bytes: &[u8] = bytemuck::cast_slice(&positions);
        let reusable = self
            .position_buffer
            .as_ref()
            .filter(|buffer| !work.is_rebuild() && buffer.size() == bytes.len() as u64);
        if let Some(buffer) = reusable {
            buffer.write(ctx.device, bytes)?;
        } else {
            let buffer = TexelBuffer::upload(
                ctx.device,
                vk::Format::R32G32B32A32_SFLOAT,
                POSITION_TEXEL_BYTES,
                "icon positions",
                bytes,
            )?;
            ctx.shared.publish_positions(Some(buffer.view()));
            self.position_buffer = Some(buffer);
            self.descriptor_set_state.request_update();
        }
        drop(positions);
        self.positions_state.complete(work);
        Ok(())
    }

    fn update_flags_buffer(&mut self, device: &Arc<dyn RenderDevice>) -> Result<()> {
        let Some(work) = self.flags_state.pending() else {
            return Ok(());
        };
        let flags = self.staging.flags.lock();
        let reusable = self
            .flags_buffer
            .as_ref()
            .filter(|buffer| !work.is_rebuild() && buffer.size() == flags.len() as u64);
        if let Some(buffer) = reusable {
            buffer.write(device, &flags)?;
        } else {
            self.flags_buffer = Some(TexelBuffer::upload(
                device,
                vk::Format::R8_UINT,
                1,
                "icon flags",
                &flags,
            )?);
            self.descriptor_set_state.request_update();
        }
        drop(flags);
        self.flags_state.complete(work);
        Ok(())
    }

    fn update_uniforms(&mut self, ctx: &DisplayContext<'_>) -> Result<()> {
        let image_count = ctx.swap_chain.image_count() as usize;
        let vertex = IconVertexUniforms::from(ctx.view);
        let geometry = IconGeometryUniforms::from(ctx.view);
        let fragment = IconFragmentUniforms::default();

        let mut rebuilt = false;
        rebuilt |= refresh_uniforms(
            ctx.device,
            &mut self.vertex_ubo_state,
            &mut self.vertex_uniforms,
            image_count,
            "icon vertex UBO",
            &vertex,
        )?;
        rebuilt |= refresh_uniforms(
            ctx.device,
            &mut self.geometry_ubo_state,
            &mut self.geometry_uniforms,
            image_count,
            "icon geometry UBO",
            &geometry,
        )?;
        rebuilt |= refresh_uniforms(
            ctx.device,
            &mut self.fragment_ubo_state,
            &mut self.fragment_uniforms,
            image_count,
            "icon fragment UBO",
            &fragment,
        )?;
        if rebuilt {
            self.descriptor_set_state.request_update();
        }
        Ok(())
    }

    fn update_descriptor_sets(&mut self, ctx: &DisplayContext<'_>) -> Result<()> {
        if ctx.atlas.generation() != self.atlas_generation {
            self.descriptor_set_state.request_update();
        }
        let Some(work) = self.descriptor_set_state.pending() else {
            return Ok(());
        };
        if work.is_rebuild() || self.descriptor_sets.is_none() {
            let layout = self
                .descriptor_layout
                .as_ref()
                .ok_or(RenderError::NotInitialised("icons"))?
                .handle();
            // Free the old sets before allocating replacements
            self.descriptor_sets = None;
            self.descriptor_sets = Some(DescriptorSets::allocate(
                ctx.device,
                ctx.descriptor_pool,
                layout,
                ctx.swap_chain.image_count(),
            )?);
        }

        let (Some(sets), Some(positions), Some(flags)) = (
            self.descriptor_sets.as_ref(),
            self.position_buffer.as_ref(),
            self.flags_buffer.as_ref(),
        ) else {
            return Err(RenderError::NotInitialised("icon buffers"));
        };
        for (i, set) in sets.iter().enumerate() {
            let (Some(vertex), Some(geometry), Some(fragment)) = (
                self.vertex_uniforms.get(i),
                self.geometry_uniforms.get(i),
                self.fragment_uniforms.get(i),
            ) else {
                return Err(RenderError::NotInitialised("icon uniforms"));
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
                        view: positions.view(),
                    },
                    DescriptorWrite::UniformBuffer {
                        binding: 2,
                        buffer: geometry.handle(),
                        range: geometry.size(),
                    },
                    DescriptorWrite::TexelBuffer {
                        binding: 3,
                        view: flags.view(),
                    },
                    DescriptorWrite::CombinedImageSampler {
                        binding: 4,
                        sampler: ctx.atlas.sampler(),
                        view: ctx.atlas.image_view(),
                    },
                    DescriptorWrite::UniformBuffer {
                        binding: 5,
                        buffer: fragment.handle(),
                        range: fragment.size(),
                    },
                ],
            );
        }
        self.atlas_generation = ctx.atlas.generation();
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
            .ok_or(RenderError::NotInitialised("icons"))?
            .handle();
        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<IconVertex>() as u32,
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
            topology: vk::PrimitiveTopology::POINT_LIST,
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

impl Default for IconsRenderable {
    fn default() -> Self {
        Self::new()
    }
}

/// Create or rewrite one uniform buffer per image. Returns whether the
/// buffers were recreated.
pub(super) fn refresh_uniforms<T: Pod>(
    device: &Arc<dyn RenderDevice>,
    state: &mut ResourceTracker,
    buffers: &mut Vec<UniformBuffer>,
    image_count: usize,
    name: &str,
    value: &T,
) -> Result<bool> {
    let Some(work) = state.pending() else {
        return Ok(false);
    };
    let rebuild = work.is_rebuild() || buffers.len() != image_count;
    if rebuild {
        buffers.clear();
        for _ in 0..image_count {
            buffers.push(UniformBuffer::new(device, name, value)?);
        }
    } else {
        for buffer in buffers.iter() {
            buffer.write(value)?;
        }
    }
    state.complete(work);
    Ok(rebuild)
}

impl Renderable for IconsRenderable {
    fn id(&self) -> RenderableId {
        self.id
    }

    fn name(&self) -> &'static str {
        "icons"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        if self.device.is_some() {
            return Err(RenderError::AlreadyInitialised("icons"));
        }
        let shaders = [
            ctx.shaders.module(ShaderId::IconVertex)?,
            ctx.shaders.module(ShaderId::IconGeometry)?,
            ctx.shaders.module(ShaderId::IconFragment)?,
        ];
        let descriptor_layout = Owned::new(
            ctx.device.clone(),
            ctx.device.create_descriptor_set_layout(&DESCRIPTOR_BINDINGS)?,
        );
        let pipeline_layout = Owned::new(
            ctx.device.clone(),
            ctx.device
                .create_pipeline_layout(&[descriptor_layout.handle()], &[])?,
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
                // Projection and pixel density follow the extent
                self.vertex_ubo_state.request_update();
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
        per_image.add(vk::DescriptorType::UNIFORM_BUFFER, 3);
        per_image.add(vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 2);
        per_image.add(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1);
        per_image.add_sets(1);
    }

    fn needs_display_update(&self, ctx: &DisplayContext<'_>) -> bool {
        !self.destroyed
            && self.swap_chain.is_some()
            && (self.trackers().iter().any(|t| !t.is_clean())
                || ctx.atlas.generation() != self.atlas_generation)
    }

    fn display_update(&mut self, ctx: &mut DisplayContext<'_>) -> Result<()> {
        let device = self
            .device
            .clone()
            .ok_or(RenderError::NotInitialised("icons"))?;

        // First upload creates every buffer even if nothing was staged yet
        if self.vertex_buffer.is_none() {
            self.vertices_state.request_rebuild();
        }
        if self.position_buffer.is_none() {
            self.positions_state.request_rebuild();
        }
        if self.flags_buffer.is_none() {
            self.flags_state.request_rebuild();
        }

        self.update_vertex_buffer(&device)?;
        self.update_position_buffer(ctx)?;
        self.update_flags_buffer(&device)?;
        self.update_uniforms(ctx)?;
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
        if self.destroyed {
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
            return Err(RenderError::NotInitialised("icon command buffers"));
        };

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
                push_constants: &[],
                vertex_count: self.vertex_count(),
            },
        )
    }

    fn apply_update(&mut self, update: RenderableUpdate) {
        match update {
            RenderableUpdate::VerticesRebuilt { count } => {
                self.vertex_count = count;
                self.vertices_state.request_rebuild();
                self.positions_state.request_rebuild();
                self.flags_state.request_rebuild();
            }
            RenderableUpdate::VerticesChanged | RenderableUpdate::ColoursChanged => {
                self.vertices_state.request_update();
            }
            RenderableUpdate::PositionsChanged => self.positions_state.request_update(),
            RenderableUpdate::FlagsRebuilt => self.flags_state.request_rebuild(),
            RenderableUpdate::FlagsChanged => self.flags_state.request_update(),
            RenderableUpdate::CameraChanged => {
                self.vertex_ubo_state.request_update();
                self.geometry_ubo_state.request_update();
            }
            RenderableUpdate::HighlightColourChanged => self.geometry_ubo_state.request_update(),
            RenderableUpdate::LinksRebuilt { .. } | RenderableUpdate::LinksChanged => {}
        }
    }

    fn destroy(&mut self) {
        self.release_per_image_resources();
        self.vertex_buffer = None;
        self.position_buffer = None;
        self.flags_buffer = None;
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
        assert_eq!(std::mem::size_of::<IconVertex>(), 32);
        assert_eq!(std::mem::size_of::<IconVertexUniforms>(), 80);
        assert_eq!(std::mem::size_of::<IconGeometryUniforms>(), 144);
        assert_eq!(std::mem::offset_of!(IconGeometryUniforms, pixel_density), 128);
        assert_eq!(std::mem::offset_of!(IconGeometryUniforms, draw_hit_test), 132);
        assert_eq!(std::mem::size_of::<IconFragmentUniforms>(), 16);
    }

    #[test]
    fn icon_pairs_pack_high_and_low() {
        let packed = pack_icon_pair(3, 7);
        assert_eq!(packed >> 16, 3);
        assert_eq!(packed & 0xffff, 7);
        // Low lane is masked
        assert_eq!(pack_icon_pair(0, 0x1_0005), 5);
    }

    #[test]
    fn rebuild_escalates_every_buffer() {
        let mut icons = IconsRenderable::new();
        icons.apply_update(RenderableUpdate::VerticesRebuilt { count: 12 });
        icons.apply_update(RenderableUpdate::FlagsChanged);
        assert!(icons.flags_state.pending().is_some_and(|w| w.is_rebuild()));
        assert!(icons.positions_state.pending().is_some_and(|w| w.is_rebuild()));
        // Nothing uploaded yet
        assert_eq!(icons.vertex_count(), 0);
    }

    #[test]
    fn camera_change_marks_vertex_and_geometry_uniforms() {
        let mut icons = IconsRenderable::new();
        icons.vertex_ubo_state = ResourceTracker::new("vertex");
        icons.geometry_ubo_state = ResourceTracker::new("geometry");
        icons.fragment_ubo_state = ResourceTracker::new("fragment");

        icons.apply_update(RenderableUpdate::CameraChanged);
        assert!(!icons.vertex_ubo_state.is_clean());
        assert!(!icons.geometry_ubo_state.is_clean());
        assert!(icons.fragment_ubo_state.is_clean());
    }

    #[test]
    fn requirements_per_image() {
        let icons = IconsRenderable::new();
        let mut global = DescriptorPoolRequirements::new();
        let mut per_image = DescriptorPoolRequirements::new();
        icons.increment_descriptor_type_requirements(&mut global, &mut per_image);
        assert!(global.is_empty());
        assert_eq!(per_image.count(vk::DescriptorType::UNIFORM_BUFFER), 3);
        assert_eq!(per_image.count(vk::DescriptorType::UNIFORM_TEXEL_BUFFER), 2);
        assert_eq!(per_image.count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 1);
        assert_eq!(per_image.sets(), 1);
    }
}
