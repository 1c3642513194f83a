//! Messages from producer threads to the render thread.
//!
//! Producers stage bulk data under the relevant staging lock and then send a
//! [`RenderCommand`]. The render thread applies each command exactly once, as
//! a state change only; GPU copies happen later in `display_update`.

use crate::camera::CameraUpdate;
use crate::renderable::RenderableId;
use glam::Vec3;
use std::path::PathBuf;

/// A command for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Save the next drawn frame to this path.
    RequestScreenshot(PathBuf),
    SetBackgroundColour(Vec3),
    SetCamera(CameraUpdate),
    SetHighlightColour(Vec3),
    /// A change for one renderable.
    Renderable {
        target: RenderableId,
        update: RenderableUpdate,
    },
}

impl RenderCommand {
    pub const fn renderable(target: RenderableId, update: RenderableUpdate) -> Self {
        Self::Renderable { target, update }
    }
}

/// The render-side half of a staged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderableUpdate {
    /// Vertex, position and flag staging were replaced.
    VerticesRebuilt { count: u32 },
    /// Icon data lanes of some vertices changed.
    VerticesChanged,
    ColoursChanged,
    PositionsChanged,
    FlagsRebuilt,
    FlagsChanged,
    /// Link staging was replaced.
    LinksRebuilt { count: u32 },
    LinksChanged,
    /// Broadcast by the renderer after a camera update.
    CameraChanged,
    /// Broadcast by the renderer after a highlight colour update.
    HighlightColourChanged,
}
