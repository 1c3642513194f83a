//! The contract between the renderer and the things it draws.

use crate::atlas::IconTextureAtlas;
use crate::descriptor_pool::{DescriptorPool, DescriptorPoolRequirements};
use crate::error::Result;
use crate::shaders::ShaderCache;
use crate::swap_chain::SwapChain;
use crate::tasks::RenderableUpdate;
use crate::view::ViewState;
use ash::vk;
use constellation_gpu::{Inheritance, RenderDevice};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a renderable for message routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(u64);

impl RenderableId {
    /// A process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RenderableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Device objects one renderable publishes for others to read.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedResources {
    /// Icon positions as an `R32G32B32A32_SFLOAT` texel buffer view.
    pub position_view: Option<vk::BufferView>,
    /// Incremented whenever `position_view` is replaced.
    pub position_generation: u64,
}

impl SharedResources {
    pub fn publish_positions(&mut self, view: Option<vk::BufferView>) {
        self.position_view = view;
        self.position_generation += 1;
    }
}

/// What a renderable needs while initialising.
pub struct InitContext<'a> {
    pub device: &'a Arc<dyn RenderDevice>,
    pub shaders: &'a ShaderCache,
}

/// Frame-wide state handed to renderables during updates and recording.
pub struct DisplayContext<'a> {
    pub device: &'a Arc<dyn RenderDevice>,
    pub swap_chain: &'a SwapChain,
    pub descriptor_pool: &'a DescriptorPool,
    pub view: &'a ViewState,
    pub atlas: &'a IconTextureAtlas,
    pub shared: &'a mut SharedResources,
}

/// Something the renderer draws.
///
/// Every method is called on the render thread. Renderables own their device
/// objects and release them in [`Renderable::destroy`] or on drop.
pub trait Renderable: Send {
    fn id(&self) -> RenderableId;

    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Create layouts and fetch shader modules. Runs once; a second call fails
    /// with [`crate::RenderError::AlreadyInitialised`] and changes nothing.
    fn initialise(&mut self, ctx: &InitContext<'_>) -> Result<()>;

    /// React to a new swap chain, or release swap chain resources on `None`.
    fn set_new_swap_chain(&mut self, swap_chain: Option<&SwapChain>);

    /// Drop descriptor sets from the old pool. New sets are allocated from
    /// `pool` in the next [`Renderable::display_update`].
    fn set_new_descriptor_pool(&mut self, pool: Option<&DescriptorPool>);

    /// Add this renderable's descriptor usage.
    fn increment_descriptor_type_requirements(
        &self,
        requirements: &mut DescriptorPoolRequirements,
        per_image: &mut DescriptorPoolRequirements,
    );

    /// Whether [`Renderable::display_update`] has work to do.
    fn needs_display_update(&self, ctx: &DisplayContext<'_>) -> bool;

    /// Bring every device resource up to date. The device is idle.
    fn display_update(&mut self, ctx: &mut DisplayContext<'_>) -> Result<()>;

    fn vertex_count(&self) -> u32;

    /// Record the secondary command buffer for `image_index`.
    fn record_display_command_buffer(
        &mut self,
        ctx: &DisplayContext<'_>,
        inheritance: &Inheritance,
        image_index: u32,
    ) -> Result<vk::CommandBuffer>;

    /// Apply the render-side half of a staged change.
    fn apply_update(&mut self, update: RenderableUpdate);

    /// Release every device object.
    fn destroy(&mut self);

    fn is_destroyed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = RenderableId::next();
        let b = RenderableId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn publishing_bumps_generation() {
        let mut shared = SharedResources::default();
        shared.publish_positions(None);
        shared.publish_positions(None);
        assert_eq!(shared.position_generation, 2);
    }
}
