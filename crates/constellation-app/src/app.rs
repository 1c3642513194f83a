//! `GraphApp` trait definition.

use crate::context::AppContext;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// Trait for Constellation applications.
///
/// The framework owns the window, the Vulkan device and the [`Renderer`].
/// Applications add renderables in `init`, then feed staged changes and
/// camera updates through the renderer handle from `update`.
///
/// [`Renderer`]: constellation_render::Renderer
pub trait GraphApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, device and renderer have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before `display()`.
    ///
    /// # Arguments
    /// * `ctx` - Application context with renderer and window access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Handle window resize. The renderer has already been told.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    #[allow(unused_variables)]
    fn on_event(&mut self, ctx: &AppContext, event: &WindowEvent) -> bool {
        false
    }

    /// Handle device events (raw input).
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Cleanup before shutdown. The renderer is still alive and the device
    /// is idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
