// =============================================================================
// QUAD RENDERER - minimal real-time Vulkan renderer
// =============================================================================
//
// Draws one spinning, vertex-colored quad and keeps presenting it through
// resizes, minimization and stale swapchains.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit ApplicationHandler)                                 │
// │    └── Renderer (owns every Vulkan object)                      │
// │          ├── VulkanDevice + Swapchain + GraphicsPipeline        │
// │          ├── Quad buffers + per-frame slots                     │
// │          └── FrameScheduler (drives one frame per tick)         │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (see scheduler.rs):
// 1. Wait for the slot's fence
// 2. Acquire a swapchain image
// 3. Reset fence, record, write uniforms, submit
// 4. Present, recreate the swapchain if it went stale
//
// =============================================================================

mod assets;
mod backend;
mod config;
mod error;
mod mesh;
mod renderer;
mod scheduler;
mod window;

use anyhow::Result;
use config::{Config, ConfigSource};
use renderer::Renderer;
use scheduler::TickOutcome;
use std::time::Instant;
use window::{AppWindow, PresentTarget};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::WindowId,
};

const CONFIG_PATH: &str = "config.toml";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // The log level lives in the config, so load problems are reported after init
    let (config, source) = match Config::load_from_path(CONFIG_PATH) {
        Ok((config, source)) => (config, Ok(source)),
        Err(e) => (Config::default(), Err(e)),
    };
    init_logging(&config);

    match source {
        Ok(ConfigSource::File(path)) => log::info!("Loaded configuration from {:?}", path),
        Ok(ConfigSource::Defaults(path)) => {
            log::info!("Config file not found at {:?}, using defaults", path)
        }
        Err(e) => log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e),
    }
    log::debug!("Config: {:?}", config);

    log::info!("Starting quad renderer");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `RUST_LOG` wins over the configured level
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    // Declared before the window: fields drop in order, and the surface must
    // go before the window it was created from
    renderer: Option<Renderer>,
    window: Option<AppWindow>,

    /// First setup or per-frame fatal error; returned from main
    fatal: Option<anyhow::Error>,

    // Frame rate, logged once a second at debug level
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fatal: None,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = AppWindow::create(event_loop, &self.config.window)?;
        let renderer = Renderer::new(&self.config, &window)?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        if window.close_requested() || window.is_minimized() {
            return Ok(());
        }

        if renderer.tick(window)? == TickOutcome::Presented {
            self.update_fps();
        }
        Ok(())
    }

    fn update_fps(&mut self) {
        self.frame_count += 1;

        let elapsed = self.last_fps_update.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            log::debug!("{:.0} FPS", self.frame_count as f32 / elapsed);
            self.frame_count = 0;
            self.last_fps_update = Instant::now();
        }
    }

    /// Tear down GPU state and stop the loop, keeping `error` for main
    fn exit(&mut self, event_loop: &ActiveEventLoop, error: Option<anyhow::Error>) {
        if let Some(e) = error {
            log::error!("Fatal: {:#}", e);
            if self.fatal.is_none() {
                self.fatal = Some(e);
            }
        }

        if let Some(window) = self.window.as_mut() {
            window.request_close();
        }
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.shutdown();
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.exit(event_loop, Some(e.context("Failed to initialize renderer")));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(AppWindow::id) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.exit(event_loop, None);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(window) = self.window.as_mut() {
                    window.set_resize_pending(true);
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    self.exit(event_loop, Some(e));
                }
            }

            _ => {}
        }
    }

    /// Last chance to tear down while the window still exists
    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.shutdown();
        }
    }

    /// Keep frames coming as fast as the present mode allows
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            if !window.close_requested() {
                window.request_redraw();
            }
        }
    }
}
