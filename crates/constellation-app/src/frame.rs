//! Frame timing statistics.

use std::time::Instant;

/// Frame times and FPS extremes since startup.
#[derive(Debug, Clone)]
pub struct FrameStats {
    last_frame_time: Instant,
    /// Frames for which `display()` presented an image.
    pub presented: u64,
    /// Calls to `display()`.
    pub displayed: u64,
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            last_frame_time: Instant::now(),
            presented: 0,
            displayed: 0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        }
    }

    /// Start a frame, returning seconds since the previous one.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f64();
        self.last_frame_time = now;
        self.displayed += 1;

        if dt > 0.0 {
            let fps = 1.0 / dt;
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
        }
        #[allow(clippy::cast_possible_truncation)]
        let dt = dt as f32;
        dt
    }

    pub fn record_presented(&mut self) {
        self.presented += 1;
    }

    /// Log a summary, as printed on shutdown.
    pub fn log_summary(&self) {
        if self.displayed == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg_fps = self.fps_sum / self.displayed as f64;
        tracing::info!("FPS Statistics:");
        tracing::info!("  Min: {:.1}", self.min_fps);
        tracing::info!("  Max: {:.1}", self.max_fps);
        tracing::info!("  Avg: {:.1}", avg_fps);
        tracing::info!("  Presented frames: {}", self.presented);
        tracing::info!("  Display calls: {}", self.displayed);
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn tick_counts_frames_and_measures_time() {
        let mut stats = FrameStats::new();
        thread::sleep(Duration::from_millis(2));
        let dt = stats.tick();
        assert!(dt > 0.0);
        assert_eq!(stats.displayed, 1);
        assert_eq!(stats.presented, 0);

        stats.record_presented();
        assert_eq!(stats.presented, 1);
    }
}
