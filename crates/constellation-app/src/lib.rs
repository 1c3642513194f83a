//! Application framework for the Constellation graph display.
//!
//! This crate handles the boilerplate around a [`Renderer`]:
//! - Logging setup
//! - Window creation and GPU context initialization
//! - Routing window events to the renderer's component callbacks
//! - Driving `display()` from the event loop
//! - Scheduled screenshots from the command line
//!
//! # Example
//!
//! ```no_run
//! use constellation_app::{run_app, AppConfig, AppContext, GraphApp};
//!
//! struct MyApp;
//!
//! impl GraphApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod config;
mod context;
mod frame;
mod runner;

pub use app::GraphApp;
pub use context::AppContext;
pub use frame::FrameStats;
pub use config::AppConfig;
pub use runner::run_app;

// Re-export commonly used types for convenience
pub use constellation_gpu::{GpuContext, GpuContextBuilder, VulkanDevice};
pub use constellation_render::{Camera, Renderer, RendererConfig, RendererHandle, ScreenshotConfig};
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
