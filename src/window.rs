// Window wrapper
//
// Owns the winit window plus the two flags the render loop cares about:
// close requested (set by the event handler) and resize pending (set by the
// event handler, cleared by the frame scheduler).

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::c_char;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes, WindowId};
use crate::config::WindowConfig;

/// The slice of window state the frame scheduler sees
pub trait PresentTarget {
    /// Current drawable size in pixels
    fn framebuffer_size(&self) -> vk::Extent2D;
    fn resize_pending(&self) -> bool;
    fn set_resize_pending(&mut self, pending: bool);
}

pub struct AppWindow {
    window: Window,
    resize_pending: bool,
    close_requested: bool,
}

impl AppWindow {
    pub fn create(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_resizable(config.resizable)
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height));

        let window = event_loop
            .create_window(attributes)
            .context("Failed to create window")?;

        Ok(Self {
            window,
            resize_pending: false,
            close_requested: false,
        })
    }

    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn is_minimized(&self) -> bool {
        let size = self.framebuffer_size();
        size.width == 0 || size.height == 0
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Instance extensions needed to present to this window's platform
    pub fn required_extensions(&self) -> Result<&'static [*const c_char]> {
        let display_handle = self.window.display_handle()
            .context("Failed to get display handle")?;

        ash_window::enumerate_required_extensions(display_handle.as_raw())
            .context("Platform has no Vulkan surface support")
    }

    /// Create a drawable surface bound to `instance`
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
        let display_handle = self.window.display_handle()
            .context("Failed to get display handle")?;
        let window_handle = self.window.window_handle()
            .context("Failed to get window handle")?;

        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .context("Failed to create window surface")
    }
}

impl PresentTarget for AppWindow {
    fn framebuffer_size(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    fn set_resize_pending(&mut self, pending: bool) {
        self.resize_pending = pending;
    }
}
