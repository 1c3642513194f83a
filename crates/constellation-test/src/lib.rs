//! Test harness for the Constellation display core.
//!
//! Runs the real [`Renderer`] against [`MockDevice`], an in-memory device, so
//! frame loop behaviour can be checked without a GPU or a window.

pub mod graph;
pub mod mock;
pub mod stub;

pub use graph::{TestGraph, TestLink, TestVertex};
pub use mock::{MockDevice, ObjectKind, RecordedDraw, RecordedFrame, Scripted};
pub use stub::{StubLog, StubRenderable};

use constellation_gpu::RenderDevice;
use constellation_render::{FrameReport, RenderError, Renderer, RendererConfig, RendererHandle};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Device violations: {0:?}")]
    Violations(Vec<String>),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TestError>;

/// A renderer wired to a [`MockDevice`].
pub struct MockHarness {
    pub device: Arc<MockDevice>,
    pub renderer: Renderer,
}

impl MockHarness {
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        init_logging();
        let device = Arc::new(MockDevice::new());
        let renderer = Renderer::new(device.clone() as Arc<dyn RenderDevice>, config);
        Self { device, renderer }
    }

    pub fn handle(&self) -> RendererHandle {
        self.renderer.handle()
    }

    /// Draw one frame.
    pub fn frame(&mut self) -> Result<FrameReport> {
        Ok(self.renderer.display()?)
    }

    /// Draw `n` frames.
    pub fn frames(&mut self, n: usize) -> Result<Vec<FrameReport>> {
        (0..n).map(|_| self.frame()).collect()
    }

    /// Fail if the device saw any misuse.
    pub fn check_violations(&self) -> Result<()> {
        let violations = self.device.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(TestError::Violations(violations))
        }
    }
}

impl Default for MockHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Route `tracing` output through the test writer. `RUST_LOG` selects the
/// level.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
