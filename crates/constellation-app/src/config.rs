//! Window, device and display settings for [`run_app`](crate::run_app).

use std::time::Duration;

use constellation_render::{RendererConfig, ScreenshotConfig};

/// Settings for one graph window.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    /// Initial inner size in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Frame rate cap. `None` draws as fast as the present mode allows.
    pub target_fps: Option<u32>,
    /// Present with FIFO instead of mailbox or immediate.
    pub vsync: bool,
    /// Load the Khronos validation layer. On by default in debug builds.
    pub validation: bool,
    /// Projection and colour defaults.
    pub renderer: RendererConfig,
    pub screenshots: ScreenshotConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Constellation".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            renderer: RendererConfig::default(),
            screenshots: ScreenshotConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    #[must_use]
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: RendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    /// Capture the frames `screenshots` names.
    #[must_use]
    pub fn with_screenshots(mut self, screenshots: ScreenshotConfig) -> Self {
        self.screenshots = screenshots;
        self
    }

    /// Minimum wall time per frame implied by `target_fps`.
    pub fn frame_budget(&self) -> Option<Duration> {
        self.target_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_by_default() {
        assert!(AppConfig::default().frame_budget().is_none());
    }

    #[test]
    fn fps_cap_becomes_a_frame_budget() {
        let config = AppConfig::new("test").with_target_fps(50);
        assert_eq!(config.frame_budget(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn builders_override_defaults() {
        let renderer = RendererConfig::default().with_clip_planes(0.1, 50.0);
        let config = AppConfig::new("test")
            .with_size(640, 480)
            .with_validation(false)
            .with_renderer(renderer)
            .with_screenshots(ScreenshotConfig::new().with_frames([2]));

        assert_eq!((config.width, config.height), (640, 480));
        assert!(!config.validation);
        assert_eq!((config.renderer.near, config.renderer.far), (0.1, 50.0));
        assert!(config.screenshots.capture_path(2).is_some());
    }

    #[test]
    fn zero_fps_is_treated_as_one() {
        let config = AppConfig::new("test").with_target_fps(0);
        assert_eq!(config.frame_budget(), Some(Duration::from_secs(1)));
    }
}
