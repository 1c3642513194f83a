//! In-memory [`RenderDevice`].
//!
//! Hands out unique fake handles, keeps buffer contents in host memory and
//! models fences, descriptor pool capacity and swap chain staleness closely
//! enough to catch synchronisation and lifetime mistakes. Misuse that a real
//! driver would not report as an error (submitting a fence still in flight,
//! writing device-local memory from the host) is recorded as a violation.

use ash::vk::{self, Handle};
use constellation_gpu::{
    AcquireOutcome, BufferDesc, DepthAttachment, DescriptorBinding, DescriptorWrite, DrawCommand,
    GpuError, GraphicsPipelineDesc, Inheritance, MemoryLocation, PresentOutcome, PrimaryPass,
    RenderDevice, Result, SampledImage, SwapChainImage, SwapChainResources,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Kinds of object the mock tracks for leak checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Buffer,
    BufferView,
    DescriptorSetLayout,
    DescriptorPool,
    ShaderModule,
    PipelineLayout,
    Pipeline,
    SampledImage,
    Sampler,
    CommandBuffer,
    SwapChain,
}

/// A scripted acquire or present result, consumed before normal behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Suboptimal,
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signalled,
    Reset,
    Pending,
}

/// One draw recorded into a secondary command buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDraw {
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: Option<vk::Buffer>,
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub vertex_count: u32,
    pub push_constant_bytes: usize,
}

/// One recorded primary command buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub command_buffer: vk::CommandBuffer,
    pub framebuffer: vk::Framebuffer,
    pub clear_colour: [f32; 4],
    pub secondaries: Vec<vk::CommandBuffer>,
}

#[derive(Debug)]
struct BufferState {
    name: String,
    location: MemoryLocation,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct PoolState {
    max_sets: u32,
    capacity: HashMap<vk::DescriptorType, u32>,
    used: HashMap<vk::DescriptorType, u32>,
    sets: HashMap<vk::DescriptorSet, vk::DescriptorSetLayout>,
}

#[derive(Debug)]
struct SwapChainState {
    image_count: u32,
    next_image: u32,
    stale: bool,
    fences: Vec<vk::Fence>,
}

#[derive(Debug)]
struct State {
    next_handle: u64,
    live: HashMap<u64, ObjectKind>,
    violations: Vec<String>,

    surface_extent: vk::Extent2D,
    image_count: u32,
    format: vk::Format,
    swap_chains: HashMap<vk::SwapchainKHR, SwapChainState>,
    swap_chains_created: usize,
    acquire_script: VecDeque<Scripted>,
    present_script: VecDeque<Scripted>,
    acquired: Vec<u32>,
    presented: Vec<u32>,

    fences: HashMap<vk::Fence, FenceState>,
    max_in_flight: usize,

    buffers: HashMap<vk::Buffer, BufferState>,
    buffer_views: HashMap<vk::BufferView, vk::Buffer>,
    layouts: HashMap<vk::DescriptorSetLayout, Vec<DescriptorBinding>>,
    pools: HashMap<vk::DescriptorPool, PoolState>,
    descriptor_writes: HashMap<vk::DescriptorSet, usize>,
    pipelines_created: usize,
    sampled_images: HashMap<vk::Image, (u32, u32, u32)>,

    recording: HashMap<vk::CommandBuffer, Vec<RecordedDraw>>,
    recorded: HashMap<vk::CommandBuffer, Vec<RecordedDraw>>,
    frames: Vec<RecordedFrame>,
    submitted: usize,
    wait_idle_calls: usize,
    image_reads: usize,
}

impl State {
    fn handle<T: Handle>(&mut self, kind: Option<ObjectKind>) -> T {
        let raw = self.next_handle;
        self.next_handle += 1;
        if let Some(kind) = kind {
            self.live.insert(raw, kind);
        }
        T::from_raw(raw)
    }

    fn release<T: Handle + Copy>(&mut self, handle: T, kind: ObjectKind) {
        match self.live.remove(&handle.as_raw()) {
            Some(found) if found == kind => {}
            Some(found) => self.violate(format!(
                "released {:?} {:#x} as {:?}",
                found,
                handle.as_raw(),
                kind
            )),
            None => self.violate(format!(
                "released unknown or already released {:?} {:#x}",
                kind,
                handle.as_raw()
            )),
        }
    }

    fn is_live<T: Handle>(&self, handle: T, kind: ObjectKind) -> bool {
        self.live.get(&handle.as_raw()) == Some(&kind)
    }

    fn violate(&mut self, message: String) {
        tracing::error!("Mock device violation: {}", message);
        self.violations.push(message);
    }

    fn in_flight(&self) -> usize {
        self.fences
            .values()
            .filter(|&&s| s == FenceState::Pending)
            .count()
    }

    fn complete_all(&mut self) {
        for state in self.fences.values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signalled;
            }
        }
    }
}

/// A [`RenderDevice`] that never touches a GPU.
#[derive(Debug)]
pub struct MockDevice {
    state: Mutex<State>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A device with a 800x600 surface and three swap chain images.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_handle: 0x1000,
                live: HashMap::new(),
                violations: Vec::new(),
                surface_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                image_count: 3,
                format: vk::Format::B8G8R8A8_UNORM,
                swap_chains: HashMap::new(),
                swap_chains_created: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                acquired: Vec::new(),
                presented: Vec::new(),
                fences: HashMap::new(),
                max_in_flight: 0,
                buffers: HashMap::new(),
                buffer_views: HashMap::new(),
                layouts: HashMap::new(),
                pools: HashMap::new(),
                descriptor_writes: HashMap::new(),
                pipelines_created: 0,
                sampled_images: HashMap::new(),
                recording: HashMap::new(),
                recorded: HashMap::new(),
                frames: Vec::new(),
                submitted: 0,
                wait_idle_calls: 0,
                image_reads: 0,
            }),
        }
    }

    /// Resize the surface. Existing swap chains go out of date; a zero
    /// extent makes swap chain creation fail until resized again.
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.surface_extent = vk::Extent2D { width, height };
        for swap_chain in state.swap_chains.values_mut() {
            swap_chain.stale = true;
        }
    }

    /// Image count of swap chains created from now on.
    pub fn set_image_count(&self, image_count: u32) {
        self.state.lock().image_count = image_count;
    }

    pub fn set_format(&self, format: vk::Format) {
        self.state.lock().format = format;
    }

    pub fn script_acquire(&self, outcome: Scripted) {
        self.state.lock().acquire_script.push_back(outcome);
    }

    pub fn script_present(&self, outcome: Scripted) {
        self.state.lock().present_script.push_back(outcome);
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// Kinds of every object still alive, sorted.
    pub fn live_objects(&self) -> Vec<ObjectKind> {
        let mut kinds: Vec<_> = self.state.lock().live.values().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|&&k| k == kind)
            .count()
    }

    pub fn swap_chains_created(&self) -> usize {
        self.state.lock().swap_chains_created
    }

    /// Image indices handed out by acquire, in order.
    pub fn acquired(&self) -> Vec<u32> {
        self.state.lock().acquired.clone()
    }

    pub fn presented(&self) -> Vec<u32> {
        self.state.lock().presented.clone()
    }

    /// The most fences ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.state.lock().frames.clone()
    }

    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.state.lock().frames.last().cloned()
    }

    /// Draws last recorded into a secondary command buffer.
    pub fn draws(&self, command_buffer: vk::CommandBuffer) -> Vec<RecordedDraw> {
        self.state
            .lock()
            .recorded
            .get(&command_buffer)
            .cloned()
            .unwrap_or_default()
    }

    /// Draws executed by the last recorded frame.
    pub fn last_frame_draws(&self) -> Vec<RecordedDraw> {
        let state = self.state.lock();
        state
            .frames
            .last()
            .map(|frame| {
                frame
                    .secondaries
                    .iter()
                    .filter_map(|cb| state.recorded.get(cb))
                    .flatten()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Contents of every live buffer created under `name`.
    pub fn buffers_named(&self, name: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .values()
            .filter(|b| b.name == name)
            .map(|b| b.bytes.clone())
            .collect()
    }

    pub fn descriptor_writes(&self, set: vk::DescriptorSet) -> usize {
        self.state
            .lock()
            .descriptor_writes
            .get(&set)
            .copied()
            .unwrap_or_default()
    }

    pub fn pipelines_created(&self) -> usize {
        self.state.lock().pipelines_created
    }

    /// `(width, height, layers)` of every live sampled image.
    pub fn sampled_images(&self) -> Vec<(u32, u32, u32)> {
        self.state.lock().sampled_images.values().copied().collect()
    }

    pub fn submitted(&self) -> usize {
        self.state.lock().submitted
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.state.lock().wait_idle_calls
    }

    pub fn image_reads(&self) -> usize {
        self.state.lock().image_reads
    }
}

impl RenderDevice for MockDevice {
    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.wait_idle_calls += 1;
        state.complete_all();
        Ok(())
    }

    fn create_swap_chain(&self, old: vk::SwapchainKHR) -> Result<SwapChainResources> {
        let mut state = self.state.lock();
        let extent = state.surface_extent;
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::SurfaceNotReady(format!(
                "surface is {}x{}",
                extent.width, extent.height
            )));
        }
        if old != vk::SwapchainKHR::null() && !state.is_live(old, ObjectKind::SwapChain) {
            state.violate(format!("old swap chain {:#x} is not live", old.as_raw()));
        }

        let handle: vk::SwapchainKHR = state.handle(Some(ObjectKind::SwapChain));
        let image_count = state.image_count;
        let images: Vec<SwapChainImage> = (0..image_count)
            .map(|_| {
                let fence = state.handle(None);
                state.fences.insert(fence, FenceState::Signalled);
                SwapChainImage {
                    image: state.handle(None),
                    view: state.handle(None),
                    framebuffer: state.handle(None),
                    command_buffer: state.handle(None),
                    ready: state.handle(None),
                    executed: state.handle(None),
                    fence,
                }
            })
            .collect();
        state.swap_chains.insert(
            handle,
            SwapChainState {
                image_count,
                next_image: 0,
                stale: false,
                fences: images.iter().map(|i| i.fence).collect(),
            },
        );
        state.swap_chains_created += 1;

        Ok(SwapChainResources {
            handle,
            format: state.format,
            extent,
            render_pass: state.handle(None),
            depth: DepthAttachment {
                image: state.handle(None),
                view: state.handle(None),
                format: vk::Format::D32_SFLOAT,
            },
            images,
        })
    }

    fn destroy_swap_chain(&self, resources: &SwapChainResources) {
        let mut state = self.state.lock();
        if let Some(swap_chain) = state.swap_chains.remove(&resources.handle) {
            for fence in swap_chain.fences {
                if state.fences.remove(&fence) == Some(FenceState::Pending) {
                    state.violate(format!(
                        "swap chain destroyed with fence {:#x} in flight",
                        fence.as_raw()
                    ));
                }
            }
        }
        state.release(resources.handle, ObjectKind::SwapChain);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _semaphore: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        let mut state = self.state.lock();
        let scripted = state.acquire_script.pop_front();
        let Some(swap_chain) = state.swap_chains.get_mut(&swapchain) else {
            return Err(GpuError::InvalidState(format!(
                "acquire on unknown swap chain {:#x}",
                swapchain.as_raw()
            )));
        };
        if swap_chain.stale || scripted == Some(Scripted::OutOfDate) {
            return Ok(AcquireOutcome::OutOfDate);
        }

        let index = swap_chain.next_image;
        swap_chain.next_image = (index + 1) % swap_chain.image_count;
        state.acquired.push(index);
        Ok(AcquireOutcome::Acquired {
            index,
            suboptimal: scripted == Some(Scripted::Suboptimal),
        })
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let mut state = self.state.lock();
        let scripted = state.present_script.pop_front();
        let Some(swap_chain) = state.swap_chains.get(&swapchain) else {
            return Err(GpuError::InvalidState(format!(
                "present on unknown swap chain {:#x}",
                swapchain.as_raw()
            )));
        };
        let stale = swap_chain.stale;
        state.presented.push(image_index);
        Ok(match scripted {
            _ if stale => PresentOutcome::OutOfDate,
            Some(Scripted::OutOfDate) => PresentOutcome::OutOfDate,
            Some(Scripted::Suboptimal) => PresentOutcome::Suboptimal,
            None => PresentOutcome::Presented,
        })
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        match state.fences.get(&fence).copied() {
            Some(FenceState::Pending | FenceState::Signalled) => {
                state.fences.insert(fence, FenceState::Signalled);
            }
            Some(FenceState::Reset) => {
                state.violate(format!(
                    "wait on fence {:#x} that was never submitted",
                    fence.as_raw()
                ));
            }
            None => state.violate(format!("wait on unknown fence {:#x}", fence.as_raw())),
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        match state.fences.get(&fence).copied() {
            Some(FenceState::Pending) => {
                state.violate(format!("reset of in-flight fence {:#x}", fence.as_raw()));
            }
            Some(_) => {
                state.fences.insert(fence, FenceState::Reset);
            }
            None => state.violate(format!("reset of unknown fence {:#x}", fence.as_raw())),
        }
        Ok(())
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        _wait_semaphore: vk::Semaphore,
        _signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let mut state = self.state.lock();
        match state.fences.get(&fence).copied() {
            Some(FenceState::Reset) => {}
            Some(FenceState::Pending) => state.violate(format!(
                "fence {:#x} submitted while still in flight",
                fence.as_raw()
            )),
            Some(FenceState::Signalled) => state.violate(format!(
                "fence {:#x} submitted without reset",
                fence.as_raw()
            )),
            None => state.violate(format!("submit with unknown fence {:#x}", fence.as_raw())),
        }
        if !state.frames.iter().any(|f| f.command_buffer == command_buffer) {
            state.violate(format!(
                "submitted unrecorded command buffer {:#x}",
                command_buffer.as_raw()
            ));
        }
        state.fences.insert(fence, FenceState::Pending);
        state.submitted += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight());
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout> {
        let mut state = self.state.lock();
        let layout = state.handle(Some(ObjectKind::DescriptorSetLayout));
        state.layouts.insert(layout, bindings.to_vec());
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut state = self.state.lock();
        state.layouts.remove(&layout);
        state.release(layout, ObjectKind::DescriptorSetLayout);
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool> {
        let mut state = self.state.lock();
        let pool = state.handle(Some(ObjectKind::DescriptorPool));
        let mut capacity = HashMap::new();
        for size in pool_sizes {
            *capacity.entry(size.ty).or_insert(0) += size.descriptor_count;
        }
        state.pools.insert(
            pool,
            PoolState {
                max_sets,
                capacity,
                ..PoolState::default()
            },
        );
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        if let Some(pool_state) = state.pools.remove(&pool) {
            for set in pool_state.sets.keys() {
                state.descriptor_writes.remove(set);
            }
        }
        state.release(pool, ObjectKind::DescriptorPool);
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let mut state = self.state.lock();
        let mut needed: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for layout in layouts {
            let Some(bindings) = state.layouts.get(layout) else {
                return Err(GpuError::InvalidState(format!(
                    "unknown descriptor set layout {:#x}",
                    layout.as_raw()
                )));
            };
            for binding in bindings {
                *needed.entry(binding.descriptor_type).or_insert(0) += 1;
            }
        }

        let Some(pool_state) = state.pools.get(&pool) else {
            return Err(GpuError::InvalidState(format!(
                "allocation from unknown pool {:#x}",
                pool.as_raw()
            )));
        };
        let sets_fit = pool_state.sets.len() + layouts.len() <= pool_state.max_sets as usize;
        let types_fit = needed.iter().all(|(ty, &n)| {
            pool_state.used.get(ty).copied().unwrap_or(0) + n
                <= pool_state.capacity.get(ty).copied().unwrap_or(0)
        });
        if !sets_fit || !types_fit {
            return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }

        let sets: Vec<vk::DescriptorSet> = layouts.iter().map(|_| state.handle(None)).collect();
        if let Some(pool_state) = state.pools.get_mut(&pool) {
            for (ty, n) in needed {
                *pool_state.used.entry(ty).or_insert(0) += n;
            }
            pool_state.sets.extend(sets.iter().copied().zip(layouts.iter().copied()));
        }
        Ok(sets)
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) {
        let mut state = self.state.lock();
        let mut freed = Vec::new();
        let mut unknown = Vec::new();
        if let Some(pool_state) = state.pools.get_mut(&pool) {
            for set in sets {
                match pool_state.sets.remove(set) {
                    Some(layout) => freed.push((*set, layout)),
                    None => unknown.push(*set),
                }
            }
        } else {
            unknown.extend_from_slice(sets);
        }

        for (set, layout) in freed {
            state.descriptor_writes.remove(&set);
            let types: Vec<vk::DescriptorType> = state
                .layouts
                .get(&layout)
                .map(|b| b.iter().map(|b| b.descriptor_type).collect())
                .unwrap_or_default();
            if let Some(pool_state) = state.pools.get_mut(&pool) {
                for ty in types {
                    if let Some(used) = pool_state.used.get_mut(&ty) {
                        *used = used.saturating_sub(1);
                    }
                }
            }
        }
        for set in unknown {
            state.violate(format!(
                "freed descriptor set {:#x} not allocated from {:#x}",
                set.as_raw(),
                pool.as_raw()
            ));
        }
    }

    fn write_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let mut state = self.state.lock();
        let known = state.pools.values().any(|p| p.sets.contains_key(&set));
        if !known {
            state.violate(format!("write to unallocated set {:#x}", set.as_raw()));
            return;
        }
        for write in writes {
            let dangling = match *write {
                DescriptorWrite::UniformBuffer { buffer, .. } => {
                    !state.is_live(buffer, ObjectKind::Buffer)
                }
                DescriptorWrite::TexelBuffer { view, .. } => {
                    !state.is_live(view, ObjectKind::BufferView)
                }
                DescriptorWrite::CombinedImageSampler { sampler, .. } => {
                    !state.is_live(sampler, ObjectKind::Sampler)
                }
            };
            if dangling {
                state.violate(format!(
                    "binding {} of set {:#x} written with a dead handle",
                    write.binding(),
                    set.as_raw()
                ));
            }
        }
        *state.descriptor_writes.entry(set).or_insert(0) += 1;
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        if code.first() != Some(&SPIRV_MAGIC) {
            return Err(GpuError::ShaderCompilation("missing SPIR-V magic".into()));
        }
        Ok(self.state.lock().handle(Some(ObjectKind::ShaderModule)))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.lock().release(module, ObjectKind::ShaderModule);
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout> {
        let mut state = self.state.lock();
        for layout in set_layouts {
            if !state.is_live(*layout, ObjectKind::DescriptorSetLayout) {
                return Err(GpuError::InvalidState("dead descriptor set layout".into()));
            }
        }
        Ok(state.handle(Some(ObjectKind::PipelineLayout)))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.lock().release(layout, ObjectKind::PipelineLayout);
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<vk::Pipeline> {
        let mut state = self.state.lock();
        let modules = [Some(desc.vertex), desc.geometry, Some(desc.fragment)];
        let shaders_live = modules
            .iter()
            .flatten()
            .all(|&m| state.is_live(m, ObjectKind::ShaderModule));
        if !shaders_live || !state.is_live(desc.layout, ObjectKind::PipelineLayout) {
            return Err(GpuError::PipelineCreation(
                "pipeline built from dead layout or shader".into(),
            ));
        }
        state.pipelines_created += 1;
        Ok(state.handle(Some(ObjectKind::Pipeline)))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.lock().release(pipeline, ObjectKind::Pipeline);
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<vk::Buffer> {
        if desc.size == 0 {
            return Err(GpuError::AllocationFailed(format!(
                "{}: zero-sized buffer",
                desc.name
            )));
        }
        let mut state = self.state.lock();
        let buffer = state.handle(Some(ObjectKind::Buffer));
        state.buffers.insert(
            buffer,
            BufferState {
                name: desc.name.to_owned(),
                location: desc.location,
                bytes: vec![0; usize::try_from(desc.size).unwrap_or_default()],
            },
        );
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.lock();
        state.buffers.remove(&buffer);
        state.release(buffer, ObjectKind::Buffer);
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let Some(target) = state.buffers.get_mut(&buffer) else {
            return Err(GpuError::ResourceNotFound(format!(
                "buffer {:#x}",
                buffer.as_raw()
            )));
        };
        let host_visible = target.location != MemoryLocation::GpuOnly;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let fits = start
            .checked_add(data.len())
            .is_some_and(|end| end <= target.bytes.len());
        if fits {
            target.bytes[start..start + data.len()].copy_from_slice(data);
        }
        if !host_visible {
            state.violate(format!(
                "host write to device-local buffer {:#x}",
                buffer.as_raw()
            ));
        }
        if !fits {
            return Err(GpuError::InvalidState("write past end of buffer".into()));
        }
        Ok(())
    }

    fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        let len = usize::try_from(size).unwrap_or(usize::MAX);
        let Some(bytes) = state
            .buffers
            .get(&src)
            .and_then(|b| b.bytes.get(..len))
            .map(<[u8]>::to_vec)
        else {
            return Err(GpuError::InvalidState("copy source too small".into()));
        };
        let Some(target) = state
            .buffers
            .get_mut(&dst)
            .and_then(|b| b.bytes.get_mut(..len))
        else {
            return Err(GpuError::InvalidState("copy destination too small".into()));
        };
        target.copy_from_slice(&bytes);
        Ok(())
    }

    fn create_buffer_view(
        &self,
        buffer: vk::Buffer,
        _format: vk::Format,
        _range: u64,
    ) -> Result<vk::BufferView> {
        let mut state = self.state.lock();
        if !state.is_live(buffer, ObjectKind::Buffer) {
            return Err(GpuError::InvalidState("view of dead buffer".into()));
        }
        let view = state.handle(Some(ObjectKind::BufferView));
        state.buffer_views.insert(view, buffer);
        Ok(view)
    }

    fn destroy_buffer_view(&self, view: vk::BufferView) {
        let mut state = self.state.lock();
        if let Some(buffer) = state.buffer_views.remove(&view) {
            if !state.is_live(buffer, ObjectKind::Buffer) {
                state.violate(format!(
                    "buffer view {:#x} outlived its buffer",
                    view.as_raw()
                ));
            }
        }
        state.release(view, ObjectKind::BufferView);
    }

    fn create_sampled_image(
        &self,
        width: u32,
        height: u32,
        layers: u32,
        pixels: &[u8],
    ) -> Result<SampledImage> {
        let expected = u64::from(width) * u64::from(height) * u64::from(layers) * 4;
        if pixels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "expected {expected} pixel bytes, got {}",
                pixels.len()
            )));
        }
        let mut state = self.state.lock();
        let image: vk::Image = state.handle(Some(ObjectKind::SampledImage));
        state.sampled_images.insert(image, (width, height, layers));
        Ok(SampledImage {
            image,
            view: state.handle(None),
        })
    }

    fn destroy_sampled_image(&self, image: SampledImage) {
        let mut state = self.state.lock();
        state.sampled_images.remove(&image.image);
        state.release(image.image, ObjectKind::SampledImage);
    }

    fn create_sampler(&self) -> Result<vk::Sampler> {
        Ok(self.state.lock().handle(Some(ObjectKind::Sampler)))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state.lock().release(sampler, ObjectKind::Sampler);
    }

    fn allocate_command_buffers(
        &self,
        _level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        Ok((0..count)
            .map(|_| state.handle(Some(ObjectKind::CommandBuffer)))
            .collect())
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        for &command_buffer in command_buffers {
            state.recording.remove(&command_buffer);
            state.recorded.remove(&command_buffer);
            state.release(command_buffer, ObjectKind::CommandBuffer);
        }
    }

    fn begin_secondary(
        &self,
        command_buffer: vk::CommandBuffer,
        _inheritance: &Inheritance,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.is_live(command_buffer, ObjectKind::CommandBuffer) {
            return Err(GpuError::InvalidState("begin on dead command buffer".into()));
        }
        state.recorded.remove(&command_buffer);
        state.recording.insert(command_buffer, Vec::new());
        Ok(())
    }

    fn record_draw(&self, command_buffer: vk::CommandBuffer, draw: &DrawCommand<'_>) {
        let mut state = self.state.lock();
        // Stub renderables draw without binding a pipeline
        let pipeline_live = draw.pipeline == vk::Pipeline::null()
            || state.is_live(draw.pipeline, ObjectKind::Pipeline);
        let draw = RecordedDraw {
            pipeline: draw.pipeline,
            vertex_buffer: draw.vertex_buffer,
            descriptor_set: draw.descriptor_set,
            vertex_count: draw.vertex_count,
            push_constant_bytes: draw.push_constants.iter().map(|p| p.bytes.len()).sum(),
        };
        if !pipeline_live {
            state.violate(format!(
                "draw with dead pipeline {:#x}",
                draw.pipeline.as_raw()
            ));
        }
        match state.recording.get_mut(&command_buffer) {
            Some(draws) => draws.push(draw),
            None => state.violate(format!(
                "draw into command buffer {:#x} that is not recording",
                command_buffer.as_raw()
            )),
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let Some(draws) = state.recording.remove(&command_buffer) else {
            return Err(GpuError::InvalidState("end without begin".into()));
        };
        state.recorded.insert(command_buffer, draws);
        Ok(())
    }

    fn record_primary(
        &self,
        command_buffer: vk::CommandBuffer,
        pass: &PrimaryPass<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        for secondary in pass.secondaries {
            if !state.recorded.contains_key(secondary) {
                state.violate(format!(
                    "executed secondary {:#x} that was never recorded",
                    secondary.as_raw()
                ));
            }
        }
        state.frames.push(RecordedFrame {
            command_buffer,
            framebuffer: pass.framebuffer,
            clear_colour: pass.clear_colour,
            secondaries: pass.secondaries.to_vec(),
        });
        Ok(())
    }

    fn read_image(
        &self,
        _image: vk::Image,
        extent: vk::Extent2D,
        _format: vk::Format,
    ) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.image_reads += 1;
        let colour = state
            .frames
            .last()
            .map_or([0.0; 4], |frame| frame.clear_colour);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pixel = colour.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let pixels = (extent.width * extent.height) as usize;
        Ok(pixel.repeat(pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_flag_double_submission() {
        let device = MockDevice::new();
        let resources = device.create_swap_chain(vk::SwapchainKHR::null()).unwrap();
        let image = resources.images[0];
        device
            .record_primary(
                image.command_buffer,
                &PrimaryPass {
                    render_pass: resources.render_pass,
                    framebuffer: image.framebuffer,
                    extent: resources.extent,
                    clear_colour: [0.0; 4],
                    secondaries: &[],
                },
            )
            .unwrap();

        device.reset_fence(image.fence).unwrap();
        device
            .submit(image.command_buffer, image.ready, image.executed, image.fence)
            .unwrap();
        assert!(device.violations().is_empty());

        device
            .submit(image.command_buffer, image.ready, image.executed, image.fence)
            .unwrap();
        assert_eq!(device.violations().len(), 1);
    }

    #[test]
    fn pool_capacity_is_enforced() {
        let device = MockDevice::new();
        let layout = device
            .create_descriptor_set_layout(&[DescriptorBinding::new(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )])
            .unwrap();
        let pool = device
            .create_descriptor_pool(
                4,
                &[vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 2,
                }],
            )
            .unwrap();

        let sets = device.allocate_descriptor_sets(pool, &[layout, layout]).unwrap();
        assert!(device.allocate_descriptor_sets(pool, &[layout]).is_err());
        device.free_descriptor_sets(pool, &sets[..1]);
        assert!(device.allocate_descriptor_sets(pool, &[layout]).is_ok());
    }

    #[test]
    fn zero_extent_surface_is_not_ready() {
        let device = MockDevice::new();
        device.set_surface_extent(0, 600);
        assert!(matches!(
            device.create_swap_chain(vk::SwapchainKHR::null()),
            Err(GpuError::SurfaceNotReady(_))
        ));
    }
}
