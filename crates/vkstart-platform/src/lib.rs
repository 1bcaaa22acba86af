//! Window creation for the vkstart samples.
//!
//! Wraps a winit window so the presentation engine can query its drawable
//! size and switch it between windowed and borderless fullscreen.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use thiserror::Error;
use vkstart_core::constants::{INITIAL_WINDOW_HEIGHT, INITIAL_WINDOW_WIDTH};
use vkstart_core::DrawableWindow;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Window handle unavailable: {0}")]
    Handle(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub fullscreen: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "vkstart".to_string(),
            width: INITIAL_WINDOW_WIDTH,
            height: INITIAL_WINDOW_HEIGHT,
            resizable: true,
            fullscreen: false,
        }
    }
}

/// A sample window backing one Vulkan surface.
pub struct SampleWindow {
    window: Arc<Window>,
    windowed_size: PhysicalSize<u32>,
}

impl SampleWindow {
    /// Create the window described by `config`.
    pub fn create(event_loop: &ActiveEventLoop, config: &PlatformConfig) -> Result<Self> {
        let windowed_size = PhysicalSize::new(config.width, config.height);
        let mut attributes = Window::default_attributes()
            .with_title(&config.title)
            .with_inner_size(windowed_size)
            .with_resizable(config.resizable);
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;

        let size = window.inner_size();
        tracing::info!(
            "Created window '{}' ({}x{}, scale factor {:.2})",
            config.title,
            size.width,
            size.height,
            window.scale_factor()
        );

        Ok(Self {
            window: Arc::new(window),
            windowed_size,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn is_fullscreen(&self) -> bool {
        self.window.fullscreen().is_some()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Display handle for instance extension enumeration.
    pub fn raw_display_handle(&self) -> Result<RawDisplayHandle> {
        self.window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| PlatformError::Handle(e.to_string()))
    }

    fn log_display_mode(&self) {
        let Some(monitor) = self.window.current_monitor() else {
            tracing::debug!("No current monitor");
            return;
        };
        let size = monitor.size();
        let refresh = monitor
            .refresh_rate_millihertz()
            .map_or_else(|| "unknown".to_string(), |mhz| format!("{}Hz", mhz / 1000));
        tracing::info!(
            "Display mode: {}x{} @ {refresh} ({})",
            size.width,
            size.height,
            monitor.name().unwrap_or_default()
        );
    }
}

impl DrawableWindow for SampleWindow {
    fn drawable_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn toggle_fullscreen(&mut self) -> bool {
        if self.is_fullscreen() {
            self.window.set_fullscreen(None);
            // The size change is reported later through a resize event.
            let _ = self.window.request_inner_size(self.windowed_size);
            false
        } else {
            self.window
                .set_fullscreen(Some(Fullscreen::Borderless(None)));
            self.log_display_mode();
            true
        }
    }
}

impl HasWindowHandle for SampleWindow {
    fn window_handle(
        &self,
    ) -> std::result::Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError>
    {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for SampleWindow {
    fn display_handle(
        &self,
    ) -> std::result::Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError>
    {
        self.window.display_handle()
    }
}
