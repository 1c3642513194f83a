//! Screenshot capture.
//!
//! The renderer fulfils [`crate::RenderCommand::RequestScreenshot`] by reading
//! back the image it just presented. [`ScreenshotConfig`] lets a host schedule
//! requests for given frame numbers from the command line.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ash::vk;
use constellation_gpu::RenderDevice;
use image::{ImageBuffer, Rgba};

const DEFAULT_PATTERN: &str = "constellation_{}.png";

/// Which frames a host should capture, and where to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    /// Output path with `{}` standing for the frame number.
    pub output_pattern: String,
    pub frames: BTreeSet<u64>,
    /// Ask the host to exit once the last frame is written.
    pub exit_after_capture: bool,
}

impl ScreenshotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, pattern: impl Into<String>) -> Self {
        self.enabled = true;
        self.output_pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.enabled = true;
        self.frames.extend(frames);
        self
    }

    #[must_use]
    pub const fn with_exit_after(mut self, exit: bool) -> Self {
        self.exit_after_capture = exit;
        self
    }

    /// Path for `frame`, or `None` when that frame is not captured.
    pub fn capture_path(&self, frame: u64) -> Option<PathBuf> {
        (self.enabled && self.frames.contains(&frame))
            .then(|| PathBuf::from(self.output_pattern.replace("{}", &frame.to_string())))
    }

    /// True once `frame` is past the last scheduled capture.
    pub fn finished(&self, frame: u64) -> bool {
        self.enabled && self.frames.last().is_some_and(|&last| frame > last)
    }

    /// Parse the process arguments.
    pub fn from_args() -> Self {
        Self::parse_args(std::env::args().skip(1))
    }

    /// Parse flags, ignoring anything unrecognised:
    /// - `-S`, `--screenshot`: enable capture
    /// - `-o`, `--output <PATTERN>`: output pattern
    /// - `-f`, `--frames <FRAMES>`: frames such as `0,5,10-15`
    /// - `--exit-after`: exit after the last capture
    pub fn parse_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_ref() {
                "-S" | "--screenshot" => config.enabled = true,
                "-o" | "--output" => {
                    if let Some(pattern) = args.next() {
                        config.output_pattern = pattern.as_ref().to_owned();
                    }
                }
                "-f" | "--frames" => {
                    if let Some(frames) = args.next() {
                        config.frames = parse_frame_indices(frames.as_ref());
                    }
                }
                "--exit-after" => config.exit_after_capture = true,
                _ => {}
            }
        }

        if config.enabled {
            if config.output_pattern.is_empty() {
                DEFAULT_PATTERN.clone_into(&mut config.output_pattern);
            }
            if config.frames.is_empty() {
                config.frames.insert(0);
            }
        }
        config
    }
}

/// Parse frame numbers such as `"0,5-7,10"`. Ranges are inclusive; malformed
/// parts are skipped.
pub fn parse_frame_indices(s: &str) -> BTreeSet<u64> {
    let mut frames = BTreeSet::new();
    for part in s.split(',').map(str::trim) {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse(), end.trim().parse::<u64>()) {
                frames.extend(start..=end);
            }
        } else if let Ok(frame) = part.parse() {
            frames.insert(frame);
        }
    }
    frames
}

/// Write tightly packed RGBA8 pixels to `path`; the format follows the
/// extension.
pub fn save_screenshot(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
) -> Result<(), ScreenshotError> {
    let path = path.as_ref();
    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba)
        .ok_or(ScreenshotError::InvalidImageData)?;
    image
        .save(path)
        .map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;
    tracing::info!("Screenshot saved: {}", path.display());
    Ok(())
}

/// Read a presented image back from the device and save it.
pub fn capture_image(
    device: &dyn RenderDevice,
    image: vk::Image,
    extent: vk::Extent2D,
    format: vk::Format,
    path: impl AsRef<Path>,
) -> Result<(), ScreenshotError> {
    let rgba = device
        .read_image(image, extent, format)
        .map_err(|e| ScreenshotError::ReadbackFailed(e.to_string()))?;
    save_screenshot(path, extent.width, extent.height, rgba)
}

/// Screenshot failures.
#[derive(Debug)]
pub enum ScreenshotError {
    /// The device could not copy the image to host memory.
    ReadbackFailed(String),
    /// The pixel data does not match the image size.
    InvalidImageData,
    SaveFailed(String),
}

impl std::fmt::Display for ScreenshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadbackFailed(e) => write!(f, "Failed to read back image: {e}"),
            Self::InvalidImageData => write!(f, "Pixel data does not match image size"),
            Self::SaveFailed(e) => write!(f, "Failed to save screenshot: {e}"),
        }
    }
}

impl std::error::Error for ScreenshotError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_mix_singles_and_ranges() {
        let frames = parse_frame_indices("10, 0,5-7,x,9-");
        assert_eq!(frames.into_iter().collect::<Vec<_>>(), vec![0, 5, 6, 7, 10]);
    }

    #[test]
    fn flags_enable_defaults() {
        let config = ScreenshotConfig::parse_args(["-S", "--exit-after"]);
        assert!(config.enabled);
        assert!(config.exit_after_capture);
        assert_eq!(
            config.capture_path(0),
            Some(PathBuf::from("constellation_0.png"))
        );
        assert!(config.capture_path(1).is_none());
        assert!(config.finished(1));
    }

    #[test]
    fn output_and_frames_flags() {
        let config = ScreenshotConfig::parse_args(["-o", "out/{}.png", "-f", "2-3"]);
        assert!(!config.enabled);
        assert!(config.capture_path(2).is_none());

        let config = config.with_frames([4]);
        assert_eq!(config.capture_path(3), Some(PathBuf::from("out/3.png")));
        assert!(!config.finished(4));
        assert!(config.finished(5));
    }

    #[test]
    fn builders_enable_capture() {
        let config = ScreenshotConfig::new()
            .with_output("shots/{}.png")
            .with_frames([3, 1])
            .with_exit_after(true);
        assert!(config.enabled);
        assert!(config.exit_after_capture);
        assert_eq!(config.capture_path(1), Some(PathBuf::from("shots/1.png")));
        assert!(config.capture_path(2).is_none());
        assert!(!config.finished(3));
        assert!(config.finished(4));

        let config = ScreenshotConfig::new().with_output("x.png");
        assert!(config.capture_path(0).is_none());
        assert!(!config.finished(0));
    }

    #[test]
    fn wrong_sized_pixels_are_rejected() {
        let path = std::env::temp_dir().join("constellation_invalid.png");
        let err = save_screenshot(&path, 4, 4, vec![0; 8]).unwrap_err();
        assert!(matches!(err, ScreenshotError::InvalidImageData));
    }
}
