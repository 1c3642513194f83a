//! The frame loop.
//!
//! [`Renderer`] lives on the render thread and owns every device object the
//! display core creates. [`RendererHandle`] is the thread-safe side: producer
//! threads use it to add renderables, queue [`RenderCommand`]s and signal
//! surface events.

use crate::atlas::{BuiltinIcons, IconProvider, IconTextureAtlas};
use crate::camera::CameraUpdate;
use crate::config::RendererConfig;
use crate::descriptor_pool::{DescriptorPool, DescriptorPoolRequirements};
use crate::error::{RenderError, Result};
use crate::renderable::{DisplayContext, InitContext, Renderable, RenderableId, SharedResources};
use crate::screenshot::capture_image;
use crate::shaders::ShaderCache;
use crate::swap_chain::SwapChain;
use crate::tasks::{RenderCommand, RenderableUpdate};
use crate::view::ViewState;
use constellation_gpu::{AcquireOutcome, GpuError, Inheritance, PrimaryPass, RenderDevice};
use crossbeam::channel::{self, Receiver, Sender};
use glam::Vec3;
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Why a frame was not drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No swap chain could be created, usually because the surface has no area.
    SwapChainUnavailable,
    /// Acquire reported the swap chain out of date; it is rebuilt next frame.
    SwapChainOutOfDate,
    /// Nothing changed since the last presented frame.
    NothingToDraw,
}

/// What one call to [`Renderer::display`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    Skipped(SkipReason),
    /// The renderer tore itself down after an exit request.
    Exited,
}

/// Result of one frame.
#[derive(Debug)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    /// Renderables that failed to initialise this frame. They were destroyed
    /// and will never be drawn.
    pub initialisation_failures: Vec<RenderError>,
    /// Where this frame was saved, if a screenshot was taken.
    pub screenshot: Option<PathBuf>,
}

impl FrameReport {
    const fn new() -> Self {
        Self {
            outcome: FrameOutcome::Skipped(SkipReason::NothingToDraw),
            initialisation_failures: Vec::new(),
            screenshot: None,
        }
    }

    fn with_outcome(mut self, outcome: FrameOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub const fn presented(&self) -> bool {
        matches!(self.outcome, FrameOutcome::Presented { .. })
    }
}

struct Shared {
    pending: Mutex<Vec<Box<dyn Renderable>>>,
    commands: Sender<RenderCommand>,
    swap_chain_invalid: AtomicBool,
    surface_lost: AtomicBool,
    exiting: AtomicBool,
    exited: Mutex<bool>,
    exit_signal: Condvar,
}

impl Shared {
    fn signal_exit(&self) {
        *self.exited.lock() = true;
        self.exit_signal.notify_all();
    }
}

/// Thread-safe access to a [`Renderer`].
#[derive(Clone)]
pub struct RendererHandle {
    shared: Arc<Shared>,
}

impl RendererHandle {
    /// Stage a renderable. It is initialised and drawn from the next
    /// [`Renderer::display`].
    pub fn add_renderable(&self, renderable: Box<dyn Renderable>) -> RenderableId {
        let id = renderable.id();
        debug!("Renderable {} ({}) staged", id, renderable.name());
        self.shared.pending.lock().push(renderable);
        id
    }

    pub fn submit(&self, command: RenderCommand) {
        // The receiver lives as long as the renderer; a send after that is moot
        if self.shared.commands.send(command).is_err() {
            trace!("Render command dropped: renderer is gone");
        }
    }

    /// Submit several commands, in order.
    pub fn submit_all(&self, commands: impl IntoIterator<Item = RenderCommand>) {
        for command in commands {
            self.submit(command);
        }
    }

    pub fn request_screenshot(&self, path: impl Into<PathBuf>) {
        self.submit(RenderCommand::RequestScreenshot(path.into()));
    }

    pub fn set_background_colour(&self, colour: Vec3) {
        self.submit(RenderCommand::SetBackgroundColour(colour));
    }

    pub fn set_camera(&self, camera: CameraUpdate) {
        self.submit(RenderCommand::SetCamera(camera));
    }

    pub fn set_highlight_colour(&self, colour: Vec3) {
        self.submit(RenderCommand::SetHighlightColour(colour));
    }

    /// The surface went away. Swap chain resources are released at the start
    /// of the next frame.
    pub fn surface_lost(&self) {
        info!("Surface lost");
        self.shared.surface_lost.store(true, Ordering::Release);
    }

    pub fn component_resized(&self, width: u32, height: u32) {
        debug!("Component resized to {}x{}", width, height);
        self.invalidate_swap_chain();
    }

    pub fn component_moved(&self) {
        debug!("Component moved");
        self.invalidate_swap_chain();
    }

    pub fn component_shown(&self) {
        debug!("Component shown");
        self.invalidate_swap_chain();
    }

    pub fn component_hidden(&self) {
        debug!("Component hidden");
        self.invalidate_swap_chain();
    }

    fn invalidate_swap_chain(&self) {
        self.shared.swap_chain_invalid.store(true, Ordering::Release);
    }

    /// Whether the host should schedule another frame even if nothing changed.
    pub fn needs_redraw(&self) -> bool {
        self.shared.swap_chain_invalid.load(Ordering::Acquire)
            || self.shared.surface_lost.load(Ordering::Acquire)
    }

    /// Ask the renderer to tear down on its next frame.
    pub fn request_exit(&self) {
        info!("Renderer exit requested");
        self.shared.exiting.store(true, Ordering::Release);
    }

    /// Block until the renderer has torn down or `timeout` elapses. Returns
    /// whether it exited.
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut exited = self.shared.exited.lock();
        while !*exited {
            if self
                .shared
                .exit_signal
                .wait_until(&mut exited, deadline)
                .timed_out()
            {
                return *exited;
            }
        }
        true
    }
}

/// Owns the swap chain, descriptor pool and renderables, and draws frames.
pub struct Renderer {
    device: Arc<dyn RenderDevice>,
    shared: Arc<Shared>,
    commands: Receiver<RenderCommand>,
    shaders: ShaderCache,
    atlas: Arc<IconTextureAtlas>,

    // Dropped before the pool and swap chain they allocate from
    renderables: Vec<Box<dyn Renderable>>,
    descriptor_pool: Option<DescriptorPool>,
    swap_chain: Option<SwapChain>,

    requirements: DescriptorPoolRequirements,
    per_image: DescriptorPoolRequirements,
    view: ViewState,
    shared_resources: SharedResources,
    background_colour: Vec3,
    screenshot: Option<PathBuf>,
    redraw_requested: bool,

    current_image: u32,
    frame: u64,
    render_thread: Option<ThreadId>,
    destroyed: bool,
}

impl Renderer {
    /// A renderer drawing icons from [`BuiltinIcons`].
    pub fn new(device: Arc<dyn RenderDevice>, config: RendererConfig) -> Self {
        Self::with_icon_provider(device, config, Box::new(BuiltinIcons))
    }

    pub fn with_icon_provider(
        device: Arc<dyn RenderDevice>,
        config: RendererConfig,
        icons: Box<dyn IconProvider>,
    ) -> Self {
        let (sender, receiver) = channel::unbounded();
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            commands: sender,
            swap_chain_invalid: AtomicBool::new(false),
            surface_lost: AtomicBool::new(false),
            exiting: AtomicBool::new(false),
            exited: Mutex::new(false),
            exit_signal: Condvar::new(),
        });

        Self {
            shaders: ShaderCache::new(device.clone()),
            device,
            shared,
            commands: receiver,
            atlas: Arc::new(IconTextureAtlas::new(icons)),
            renderables: Vec::new(),
            descriptor_pool: None,
            swap_chain: None,
            requirements: DescriptorPoolRequirements::new(),
            per_image: DescriptorPoolRequirements::new(),
            view: ViewState::new(&config),
            shared_resources: SharedResources::default(),
            background_colour: config.background_colour,
            screenshot: None,
            redraw_requested: true,
            current_image: 0,
            frame: 0,
            render_thread: None,
            destroyed: false,
        }
    }

    pub fn handle(&self) -> RendererHandle {
        RendererHandle {
            shared: self.shared.clone(),
        }
    }

    /// The atlas icon renderables register their icons with.
    pub fn atlas(&self) -> Arc<IconTextureAtlas> {
        self.atlas.clone()
    }

    pub fn add_renderable(&self, renderable: Box<dyn Renderable>) -> RenderableId {
        self.handle().add_renderable(renderable)
    }

    pub const fn view(&self) -> &ViewState {
        &self.view
    }

    pub const fn background_colour(&self) -> Vec3 {
        self.background_colour
    }

    /// Frames presented so far.
    pub const fn frame_count(&self) -> u64 {
        self.frame
    }

    /// The image the next frame is expected to use.
    pub const fn current_image(&self) -> u32 {
        self.current_image
    }

    pub fn renderable_count(&self) -> usize {
        self.renderables.len()
    }

    pub fn renderable(&self, id: RenderableId) -> Option<&dyn Renderable> {
        self.renderables
            .iter()
            .find(|r| r.id() == id)
            .map(Box::as_ref)
    }

    pub const fn swap_chain(&self) -> Option<&SwapChain> {
        self.swap_chain.as_ref()
    }

    pub const fn descriptor_pool(&self) -> Option<&DescriptorPool> {
        self.descriptor_pool.as_ref()
    }

    /// Aggregate descriptor requirements: global, then per image.
    pub const fn descriptor_requirements(
        &self,
    ) -> (&DescriptorPoolRequirements, &DescriptorPoolRequirements) {
        (&self.requirements, &self.per_image)
    }

    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Draw one frame.
    ///
    /// Must always be called from the same thread.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn display(&mut self) -> Result<FrameReport> {
        self.claim_render_thread()?;
        let mut report = FrameReport::new();

        if self.destroyed {
            return Ok(report.with_outcome(FrameOutcome::Exited));
        }
        if self.shared.exiting.load(Ordering::Acquire) {
            self.destroy();
            return Ok(report.with_outcome(FrameOutcome::Exited));
        }
        if self.shared.surface_lost.swap(false, Ordering::AcqRel) {
            self.surface_lost()?;
        }

        self.integrate_pending(&mut report);

        if self.swap_chain.is_none() || self.shared.swap_chain_invalid.swap(false, Ordering::AcqRel)
        {
            match self.recreate_swap_chain() {
                Ok(()) => {}
                Err(RenderError::Gpu(GpuError::SurfaceNotReady(reason))) => {
                    warn!("Swap chain unavailable: {}", reason);
                    return Ok(report
                        .with_outcome(FrameOutcome::Skipped(SkipReason::SwapChainUnavailable)));
                }
                Err(e) => return Err(e),
            }
        }
        self.ensure_descriptor_pool()?;
        self.drain_commands();

        let updated = self.update_renderables()?;
        if !updated && !self.redraw_requested {
            return Ok(report);
        }

        let outcome = self.draw_frame(&mut report)?;
        Ok(report.with_outcome(outcome))
    }

    fn claim_render_thread(&mut self) -> Result<()> {
        let current = thread::current().id();
        match self.render_thread {
            None => self.render_thread = Some(current),
            Some(owner) => {
                debug_assert_eq!(owner, current, "display() called off the render thread");
                if owner != current {
                    return Err(RenderError::WrongThread);
                }
            }
        }
        Ok(())
    }

    /// Initialise staged renderables and add the ones that succeed.
    fn integrate_pending(&mut self, report: &mut FrameReport) {
        let pending = std::mem::take(&mut *self.shared.pending.lock());
        if pending.is_empty() {
            return;
        }

        let ctx = InitContext {
            device: &self.device,
            shaders: &self.shaders,
        };
        let mut added = false;
        for mut renderable in pending {
            match renderable.initialise(&ctx) {
                Ok(()) => {
                    if let Some(swap_chain) = self.swap_chain.as_ref() {
                        renderable.set_new_swap_chain(Some(swap_chain));
                    }
                    if let Some(pool) = self.descriptor_pool.as_ref() {
                        renderable.set_new_descriptor_pool(Some(pool));
                    }
                    debug!(
                        "Renderable {} ({}) initialised",
                        renderable.id(),
                        renderable.name()
                    );
                    self.renderables.push(renderable);
                    added = true;
                }
                Err(source) => {
                    renderable.destroy();
                    error!(
                        "Renderable {} ({}) failed to initialise: {}",
                        renderable.id(),
                        renderable.name(),
                        source
                    );
                    report
                        .initialisation_failures
                        .push(RenderError::RenderableInitialisation {
                            name: renderable.name().to_owned(),
                            source: Box::new(source),
                        });
                }
            }
        }

        if added {
            self.sum_requirements();
            self.redraw_requested = true;
        }
    }

    fn sum_requirements(&mut self) {
        self.requirements.reset();
        self.per_image.reset();
        for renderable in &self.renderables {
            renderable
                .increment_descriptor_type_requirements(&mut self.requirements, &mut self.per_image);
        }
        trace!(
            "Descriptor requirements: {:?} global, {:?} per image",
            self.requirements,
            self.per_image
        );
    }

    fn recreate_swap_chain(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        let swap_chain = match SwapChain::initialise(&self.device, self.swap_chain.as_ref()) {
            Ok(swap_chain) => swap_chain,
            Err(e) => {
                // The old swap chain is retired even when creation fails
                self.release_swap_chain();
                return Err(e);
            }
        };

        for renderable in &mut self.renderables {
            renderable.set_new_swap_chain(Some(&swap_chain));
        }
        self.view.resize(swap_chain.extent());
        self.swap_chain = Some(swap_chain);
        self.current_image = 0;
        self.redraw_requested = true;
        Ok(())
    }

    fn release_swap_chain(&mut self) {
        for renderable in &mut self.renderables {
            renderable.set_new_swap_chain(None);
        }
        if let Some(mut swap_chain) = self.swap_chain.take() {
            swap_chain.destroy();
        }
    }

    fn ensure_descriptor_pool(&mut self) -> Result<()> {
        let Some(swap_chain) = self.swap_chain.as_ref() else {
            return Ok(());
        };
        let image_count = swap_chain.image_count();
        let fits = self.descriptor_pool.as_ref().is_some_and(|pool| {
            pool.can_accommodate(image_count, &self.requirements, &self.per_image)
        });
        if fits {
            return Ok(());
        }

        self.device.wait_idle()?;
        let pool = DescriptorPool::new(
            &self.device,
            image_count,
            &self.requirements,
            &self.per_image,
        )?;
        for renderable in &mut self.renderables {
            renderable.set_new_descriptor_pool(Some(&pool));
        }
        self.descriptor_pool = Some(pool);
        Ok(())
    }

    /// Apply every queued command exactly once.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RenderCommand::SetCamera(camera) => {
                    self.view.apply_camera(&camera);
                    self.broadcast(RenderableUpdate::CameraChanged);
                }
                RenderCommand::SetBackgroundColour(colour) => {
                    self.background_colour = colour;
                    self.redraw_requested = true;
                }
                RenderCommand::SetHighlightColour(colour) => {
                    self.view.highlight_colour = colour;
                    self.broadcast(RenderableUpdate::HighlightColourChanged);
                }
                RenderCommand::RequestScreenshot(path) => {
                    debug!("Screenshot requested: {}", path.display());
                    self.screenshot = Some(path);
                    self.redraw_requested = true;
                }
                RenderCommand::Renderable { target, update } => self.route(target, update),
            }
        }
    }

    fn broadcast(&mut self, update: RenderableUpdate) {
        for renderable in &mut self.renderables {
            renderable.apply_update(update);
        }
    }

    fn route(&mut self, target: RenderableId, update: RenderableUpdate) {
        if let Some(renderable) = self.renderables.iter_mut().find(|r| r.id() == target) {
            renderable.apply_update(update);
            return;
        }
        let mut pending = self.shared.pending.lock();
        if let Some(renderable) = pending.iter_mut().find(|r| r.id() == target) {
            renderable.apply_update(update);
        } else {
            warn!("Dropping {:?} for unknown renderable {}", update, target);
        }
    }

    /// Bring the atlas and every renderable's device resources up to date.
    /// Returns whether anything was updated.
    fn update_renderables(&mut self) -> Result<bool> {
        let (Some(swap_chain), Some(descriptor_pool)) =
            (self.swap_chain.as_ref(), self.descriptor_pool.as_ref())
        else {
            return Ok(false);
        };

        let mut updated = false;
        // A second pass lets dependants see handles published in the first
        for _ in 0..2 {
            let mut ctx = DisplayContext {
                device: &self.device,
                swap_chain,
                descriptor_pool,
                view: &self.view,
                atlas: &self.atlas,
                shared: &mut self.shared_resources,
            };
            let atlas_dirty = self.atlas.needs_update();
            let dirty: Vec<usize> = self
                .renderables
                .iter()
                .enumerate()
                .filter(|(_, r)| r.needs_display_update(&ctx))
                .map(|(i, _)| i)
                .collect();
            if dirty.is_empty() && !atlas_dirty {
                break;
            }

            if !updated {
                self.device.wait_idle()?;
            }
            if atlas_dirty {
                self.atlas.display_update(&self.device)?;
            }
            for index in dirty {
                self.renderables[index].display_update(&mut ctx)?;
            }
            updated = true;
        }
        Ok(updated)
    }

    fn draw_frame(&mut self, report: &mut FrameReport) -> Result<FrameOutcome> {
        let Some(swap_chain) = self.swap_chain.as_mut() else {
            return Ok(FrameOutcome::Skipped(SkipReason::SwapChainUnavailable));
        };

        let (acquired, ready) = swap_chain.acquire_next_image()?;
        let image_index = match acquired {
            AcquireOutcome::OutOfDate => {
                debug!("Swap chain out of date on acquire");
                self.shared.swap_chain_invalid.store(true, Ordering::Release);
                self.redraw_requested = true;
                return Ok(FrameOutcome::Skipped(SkipReason::SwapChainOutOfDate));
            }
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    debug!("Swap chain suboptimal on acquire");
                    self.shared.swap_chain_invalid.store(true, Ordering::Release);
                }
                index
            }
        };

        let swap_chain = &*swap_chain;
        let Some(descriptor_pool) = self.descriptor_pool.as_ref() else {
            return Err(RenderError::NotInitialised("descriptor pool"));
        };
        swap_chain.wait_on_fence(image_index)?;

        let inheritance = Inheritance {
            render_pass: swap_chain.render_pass(),
            subpass: 0,
            framebuffer: swap_chain.framebuffer(image_index)?,
            extent: swap_chain.extent(),
        };
        let ctx = DisplayContext {
            device: &self.device,
            swap_chain,
            descriptor_pool,
            view: &self.view,
            atlas: &self.atlas,
            shared: &mut self.shared_resources,
        };
        let mut secondaries = Vec::with_capacity(self.renderables.len());
        for renderable in &mut self.renderables {
            if renderable.vertex_count() > 0 {
                secondaries.push(renderable.record_display_command_buffer(
                    &ctx,
                    &inheritance,
                    image_index,
                )?);
            }
        }

        let primary = swap_chain.command_buffer(image_index)?;
        self.device.record_primary(
            primary,
            &PrimaryPass {
                render_pass: inheritance.render_pass,
                framebuffer: inheritance.framebuffer,
                extent: inheritance.extent,
                clear_colour: self.background_colour.extend(1.0).to_array(),
                secondaries: &secondaries,
            },
        )?;
        let executed = swap_chain.executed_semaphore(image_index)?;
        let fence = swap_chain.fence(image_index)?;
        swap_chain.reset_fence(image_index)?;
        self.device.submit(primary, ready, executed, fence)?;

        let presented = swap_chain.present(image_index)?;
        if presented.needs_recreation() {
            debug!("Swap chain needs recreation after present: {:?}", presented);
            self.shared.swap_chain_invalid.store(true, Ordering::Release);
        }

        if let Some(path) = self.screenshot.take() {
            self.device.wait_idle()?;
            let image = swap_chain.presentable_image(image_index)?;
            match capture_image(
                self.device.as_ref(),
                image,
                swap_chain.extent(),
                swap_chain.format(),
                &path,
            ) {
                Ok(()) => report.screenshot = Some(path),
                Err(e) => error!("Screenshot to {} failed: {}", path.display(), e),
            }
        }

        self.current_image = (image_index + 1) % swap_chain.image_count();
        self.frame += 1;
        self.redraw_requested = false;
        trace!("Frame {} presented image {}", self.frame, image_index);
        Ok(FrameOutcome::Presented { image_index })
    }

    /// Release everything tied to the surface. The next frame recreates the
    /// swap chain and descriptor pool.
    pub fn surface_lost(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        for renderable in &mut self.renderables {
            renderable.set_new_swap_chain(None);
            renderable.set_new_descriptor_pool(None);
        }
        self.descriptor_pool = None;
        if let Some(mut swap_chain) = self.swap_chain.take() {
            swap_chain.destroy();
        }
        self.redraw_requested = true;
        info!("Surface resources released");
        Ok(())
    }

    /// Tear down every device object and signal exit. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = self.device.wait_idle() {
            warn!("Wait idle failed during teardown: {}", e);
        }

        for renderable in &mut self.renderables {
            renderable.destroy();
        }
        self.renderables.clear();
        for mut renderable in self.shared.pending.lock().drain(..) {
            renderable.destroy();
        }

        self.atlas.destroy();
        self.descriptor_pool = None;
        if let Some(mut swap_chain) = self.swap_chain.take() {
            swap_chain.destroy();
        }
        self.shaders.teardown();
        self.shared_resources = SharedResources::default();
        self.destroyed = true;
        self.shared.signal_exit();
        info!("Renderer destroyed after {} frames", self.frame);
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_starts_skipped() {
        let report = FrameReport::new();
        assert_eq!(
            report.outcome,
            FrameOutcome::Skipped(SkipReason::NothingToDraw)
        );
        assert!(!report.presented());
        assert!(report
            .with_outcome(FrameOutcome::Presented { image_index: 1 })
            .presented());
    }
}
