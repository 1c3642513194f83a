//! Application context.

use std::sync::Arc;

use constellation_gpu::{GpuContext, RenderDevice, VulkanDevice};
use constellation_render::{
    IconTextureAtlas, Renderable, RenderableId, Renderer, RendererConfig, RendererHandle,
};
use winit::window::Window;

use crate::frame::FrameStats;

/// Application context shared across all app methods.
///
/// Fields drop in declaration order: the renderer goes first, then the
/// device and its surface, then the window the surface was created from.
pub struct AppContext {
    /// The display core.
    pub renderer: Renderer,
    /// Vulkan device presenting to the window.
    pub device: Arc<VulkanDevice>,
    /// The window handle.
    pub window: Arc<Window>,
    /// Frame timing.
    pub stats: FrameStats,
}

impl AppContext {
    /// Create the device and renderer for `window`.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
        renderer_config: RendererConfig,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // SAFETY: Caller guarantees window has valid handles, and the window
        // outlives the device through field order.
        let device = unsafe {
            VulkanDevice::new(gpu, window.as_ref(), size.width, size.height, vsync)?
        };
        let device = Arc::new(device);
        let renderer = Renderer::new(device.clone() as Arc<dyn RenderDevice>, renderer_config);

        tracing::info!(
            "Renderer created for {}x{} window",
            size.width,
            size.height
        );

        Ok(Self {
            renderer,
            device,
            window,
            stats: FrameStats::new(),
        })
    }

    /// A handle producer threads can use.
    pub fn handle(&self) -> RendererHandle {
        self.renderer.handle()
    }

    /// The icon atlas, for building stagers.
    pub fn atlas(&self) -> Arc<IconTextureAtlas> {
        self.renderer.atlas()
    }

    /// Stage a renderable; it joins on the next frame.
    pub fn add_renderable(&self, renderable: Box<dyn Renderable>) -> RenderableId {
        self.renderer.add_renderable(renderable)
    }

    /// Frames presented so far.
    pub const fn frame_count(&self) -> u64 {
        self.renderer.frame_count()
    }

    /// Tell the device and renderer about a new window size.
    pub(crate) fn resize(&self, width: u32, height: u32) {
        self.device.set_window_extent(width, height);
        self.renderer.handle().component_resized(width, height);
    }
}
