//! A renderable that records how the renderer drives it.

use ash::vk;
use constellation_gpu::{DrawCommand, Inheritance, Owned};
use constellation_render::{
    DescriptorPool, DescriptorPoolRequirements, DisplayContext, InitContext, RenderError,
    Renderable, RenderableId, RenderableUpdate, Result, SwapChain, SwapChainInfo,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Everything a [`StubRenderable`] observed.
#[derive(Debug, Default, Clone)]
pub struct StubLog {
    pub initialised: usize,
    pub swap_chains: Vec<Option<SwapChainInfo>>,
    pub pools: usize,
    pub updates: Vec<RenderableUpdate>,
    pub display_updates: usize,
    /// Image indices recorded, in order.
    pub recorded: Vec<u32>,
    pub destroyed: bool,
}

/// Draws nothing real; counts calls into a shared [`StubLog`].
pub struct StubRenderable {
    id: RenderableId,
    vertex_count: u32,
    uniform_buffers: u32,
    fail_initialise: bool,
    /// Record calls left to fail.
    failing_records: usize,
    dirty: bool,
    command_buffers: Vec<Owned<vk::CommandBuffer>>,
    log: Arc<Mutex<StubLog>>,
}

impl StubRenderable {
    pub fn new(vertex_count: u32) -> Self {
        Self {
            id: RenderableId::next(),
            vertex_count,
            uniform_buffers: 1,
            fail_initialise: false,
            failing_records: 0,
            dirty: true,
            command_buffers: Vec::new(),
            log: Arc::default(),
        }
    }

    /// A stub whose `initialise` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_initialise: true,
            ..Self::new(1)
        }
    }

    /// Fail the first `count` calls to `record_display_command_buffer`.
    #[must_use]
    pub const fn with_failing_records(mut self, count: usize) -> Self {
        self.failing_records = count;
        self
    }

    /// Per-image uniform buffer descriptors this stub asks for.
    #[must_use]
    pub const fn with_uniform_buffers(mut self, count: u32) -> Self {
        self.uniform_buffers = count;
        self
    }

    pub fn log(&self) -> Arc<Mutex<StubLog>> {
        self.log.clone()
    }
}

impl Renderable for StubRenderable {
    fn id(&self) -> RenderableId {
        self.id
    }

    fn name(&self) -> &'static str {
        "stub"
    }

    fn initialise(&mut self, _ctx: &InitContext<'_>) -> Result<()> {
        if self.fail_initialise {
            return Err(RenderError::NotInitialised("stub shaders"));
        }
        self.log.lock().initialised += 1;
        Ok(())
    }

    fn set_new_swap_chain(&mut self, swap_chain: Option<&SwapChain>) {
        self.command_buffers.clear();
        self.dirty = true;
        self.log
            .lock()
            .swap_chains
            .push(swap_chain.map(SwapChain::info));
    }

    fn set_new_descriptor_pool(&mut self, _pool: Option<&DescriptorPool>) {
        self.log.lock().pools += 1;
    }

    fn increment_descriptor_type_requirements(
        &self,
        requirements: &mut DescriptorPoolRequirements,
        per_image: &mut DescriptorPoolRequirements,
    ) {
        requirements.add(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1);
        requirements.add_sets(1);
        per_image.add(vk::DescriptorType::UNIFORM_BUFFER, self.uniform_buffers);
        per_image.add_sets(1);
    }

    fn needs_display_update(&self, _ctx: &DisplayContext<'_>) -> bool {
        self.dirty
    }

    fn display_update(&mut self, ctx: &mut DisplayContext<'_>) -> Result<()> {
        let count = ctx.swap_chain.image_count();
        self.command_buffers = ctx
            .device
            .allocate_command_buffers(vk::CommandBufferLevel::SECONDARY, count)?
            .into_iter()
            .map(|cb| Owned::new(ctx.device.clone(), cb))
            .collect();
        self.dirty = false;
        self.log.lock().display_updates += 1;
        Ok(())
    }

    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    fn record_display_command_buffer(
        &mut self,
        ctx: &DisplayContext<'_>,
        inheritance: &Inheritance,
        image_index: u32,
    ) -> Result<vk::CommandBuffer> {
        if self.failing_records > 0 {
            self.failing_records -= 1;
            return Err(RenderError::NotInitialised("stub recording"));
        }
        let command_buffer = self
            .command_buffers
            .get(image_index as usize)
            .ok_or(RenderError::NotInitialised("stub command buffers"))?
            .handle();
        ctx.device.begin_secondary(command_buffer, inheritance)?;
        ctx.device.record_draw(
            command_buffer,
            &DrawCommand {
                pipeline: vk::Pipeline::null(),
                layout: vk::PipelineLayout::null(),
                extent: inheritance.extent,
                vertex_buffer: None,
                descriptor_set: None,
                push_constants: &[],
                vertex_count: self.vertex_count,
            },
        );
        ctx.device.end_command_buffer(command_buffer)?;
        self.log.lock().recorded.push(image_index);
        Ok(command_buffer)
    }

    fn apply_update(&mut self, update: RenderableUpdate) {
        self.dirty = true;
        self.log.lock().updates.push(update);
    }

    fn destroy(&mut self) {
        self.command_buffers.clear();
        self.log.lock().destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.log.lock().destroyed
    }
}
