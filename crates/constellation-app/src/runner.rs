//! Event loop glue between winit and the [`Renderer`](constellation_render::Renderer).

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use constellation_gpu::GpuContextBuilder;
use constellation_render::{FrameOutcome, FrameReport, ScreenshotConfig};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::GraphApp;
use crate::config::AppConfig;
use crate::context::AppContext;

#[cfg(feature = "profiling-tracy")]
const TRACY_FILTER: &str =
    "info,constellation_app=trace,constellation_render=trace,constellation_gpu=trace";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TRACY_FILTER));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Open a window and run `A` in it until the window closes, the renderer
/// exits, or every scheduled screenshot has been taken.
pub fn run_app<A: GraphApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };
    event_loop.run_app(&mut runner)?;
    Ok(())
}

struct AppRunner<A: GraphApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

struct AppState<A: GraphApp> {
    // Before `ctx`: app resources go before the renderer and device
    app: A,
    ctx: AppContext,
    frame_budget: Option<Duration>,
    screenshots: ScreenshotConfig,
    /// Renderer frame the last screenshot was requested for.
    requested: Option<u64>,
}

impl<A: GraphApp + 'static> AppRunner<A> {
    fn open(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;
        info!("GPU: {}", gpu.capabilities().summary());

        // SAFETY: the context holds the window for as long as the surface lives
        let mut ctx = unsafe {
            AppContext::new(
                window,
                gpu,
                self.config.vsync,
                self.config.renderer.clone(),
            )?
        };
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            ctx,
            frame_budget: self.config.frame_budget(),
            screenshots: self.config.screenshots.clone(),
            requested: None,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.teardown();
        }
        event_loop.exit();
    }
}

impl<A: GraphApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.handle().component_shown();
            return;
        }

        match self.open(event_loop) {
            Ok(state) => {
                info!("Window open");
                self.state = Some(state);
            }
            Err(e) => {
                error!("Failed to open the graph window: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.handle().surface_lost();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };
        if state.app.on_event(&state.ctx, &event) {
            return;
        }

        let handle = state.ctx.handle();
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let finished = state.frame().unwrap_or_else(|e| {
                    error!("Display failed: {e}");
                    false
                });
                if finished {
                    self.shutdown(event_loop);
                } else {
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Err(e) = state.resize(size.width, size.height) {
                    error!("Resize failed: {e}");
                }
            }
            WindowEvent::Moved(_) => handle.component_moved(),
            WindowEvent::Occluded(true) => handle.component_hidden(),
            WindowEvent::Occluded(false) => handle.component_shown(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: GraphApp> AppState<A> {
    /// Advance the app and display one frame. Returns true once the app is done.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn frame(&mut self) -> anyhow::Result<bool> {
        let started = Instant::now();
        let dt = self.ctx.stats.tick();

        {
            #[cfg(feature = "profiling-tracy")]
            let _span = tracing::trace_span!("frame.update").entered();
            self.app.update(&self.ctx, dt);
        }
        self.schedule_screenshot();

        let report = {
            #[cfg(feature = "profiling-tracy")]
            let _span = tracing::trace_span!("frame.display").entered();
            self.ctx.renderer.display()?
        };
        if self.record(&report) {
            return Ok(true);
        }

        self.pace(started);

        let captured_all = self.screenshots.exit_after_capture
            && self.screenshots.finished(self.ctx.frame_count());
        if captured_all {
            info!("All screenshots captured");
        }
        Ok(captured_all)
    }

    /// Ask for a capture if the frame about to be drawn is one the
    /// configuration names. Each frame is requested at most once.
    fn schedule_screenshot(&mut self) {
        let frame = self.ctx.frame_count();
        if self.requested == Some(frame) {
            return;
        }
        if let Some(path) = self.screenshots.capture_path(frame) {
            self.ctx.handle().request_screenshot(path);
            self.requested = Some(frame);
        }
    }

    /// Log the report and update stats. Returns true if the renderer exited.
    fn record(&mut self, report: &FrameReport) -> bool {
        for failure in &report.initialisation_failures {
            warn!("Renderable skipped: {failure}");
        }
        if let Some(path) = &report.screenshot {
            info!("Screenshot written to {}", path.display());
        }
        match report.outcome {
            FrameOutcome::Presented { .. } => {
                self.ctx.stats.record_presented();
                false
            }
            FrameOutcome::Skipped(reason) => {
                debug!("Frame skipped: {reason:?}");
                false
            }
            FrameOutcome::Exited => true,
        }
    }

    fn pace(&self, started: Instant) {
        let Some(budget) = self.frame_budget else {
            return;
        };
        if let Some(remaining) = budget.checked_sub(started.elapsed()) {
            #[cfg(feature = "profiling-tracy")]
            let _span = tracing::trace_span!("frame.pacing").entered();
            thread::sleep(remaining);
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.ctx.resize(width, height);
        if width == 0 || height == 0 {
            debug!("Window minimised");
            return Ok(());
        }
        self.app.on_resize(&self.ctx, width, height)?;
        debug!("Window resized to {width}x{height}");
        Ok(())
    }

    fn teardown(&mut self) {
        self.ctx.stats.log_summary();

        self.ctx.handle().request_exit();
        if let Err(e) = self.ctx.device.gpu().wait_idle() {
            error!("Failed to wait for the GPU: {e}");
        }
        self.app.cleanup(&mut self.ctx);
        self.ctx.renderer.destroy();
        info!("Renderer destroyed");
    }
}
