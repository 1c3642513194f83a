//! Vulkan display core for the Constellation graph view.
//!
//! This crate provides:
//! - Swap chain and descriptor pool lifecycle
//! - The [`Renderable`] contract and the icon, link and axes renderables
//! - The icon texture atlas
//! - The render command queue and per-resource state tracking
//! - The [`Renderer`] frame loop
//! - Screenshot capture utilities

pub mod atlas;
pub mod camera;
pub mod config;
pub mod descriptor_pool;
pub mod error;
pub mod renderable;
pub mod renderables;
pub mod renderer;
pub mod resource_state;
pub mod screenshot;
pub mod shaders;
pub mod swap_chain;
pub mod tasks;
pub mod view;
pub mod visual;

pub use atlas::{
    BuiltinIcons, IconProvider, IconTextureAtlas, ICON_SIZE, TRANSPARENT_ICON_INDEX,
    UNKNOWN_ICON_INDEX,
};
pub use camera::{Camera, CameraUpdate};
pub use config::RendererConfig;
pub use descriptor_pool::{DescriptorPool, DescriptorPoolRequirements, DescriptorSets};
pub use error::{RenderError, Result};
pub use renderable::{
    DisplayContext, InitContext, Renderable, RenderableId, SharedResources,
};
pub use renderables::{
    AxesRenderable, IconVertex, IconsRenderable, IconsStager, LinkStyle, LinkVertex,
    LinksRenderable, LinksStager, VertexFlags,
};
pub use renderer::{FrameOutcome, FrameReport, Renderer, RendererHandle, SkipReason};
pub use resource_state::{PendingWork, ResourceState, ResourceTracker};
pub use screenshot::{
    capture_image, parse_frame_indices, save_screenshot, ScreenshotConfig, ScreenshotError,
};
pub use shaders::{ShaderCache, ShaderId};
pub use swap_chain::{SwapChain, SwapChainInfo};
pub use tasks::{RenderCommand, RenderableUpdate};
pub use view::ViewState;
pub use visual::{Decorator, VisualAccess, VisualChange};
