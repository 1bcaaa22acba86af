//! Sample runners and event loops.

use std::thread;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vkstart_gpu::{FrameOutcome, SkipReason, VulkanInstance};
use vkstart_platform::SampleWindow;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use crate::config::AppConfig;
use crate::context::SampleContext;

/// How long to back off while the window has no drawable area.
const MINIMIZED_BACKOFF: Duration = Duration::from_millis(10);

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Keys the rendering samples react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCommand {
    Quit,
    ToggleFullscreen,
}

/// Map a key press to a sample command. Releases and repeats are ignored.
pub fn command_for_key(
    state: ElementState,
    key: PhysicalKey,
    repeat: bool,
) -> Option<SampleCommand> {
    if state != ElementState::Pressed || repeat {
        return None;
    }
    match key {
        PhysicalKey::Code(KeyCode::Escape) => Some(SampleCommand::Quit),
        PhysicalKey::Code(KeyCode::KeyF) => Some(SampleCommand::ToggleFullscreen),
        _ => None,
    }
}

/// Run a triangle sample until Escape is pressed or the window is closed.
///
/// Fatal errors stop the event loop and are returned once everything created
/// so far has been released.
pub fn run_sample(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("Starting {} ...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = SampleRunner {
        config,
        state: None,
        error: None,
    };
    event_loop.run_app(&mut runner)?;

    runner.error.map_or(Ok(()), Err)
}

struct SampleRunner {
    config: AppConfig,
    state: Option<SampleContext>,
    error: Option<anyhow::Error>,
}

impl SampleRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<SampleContext> {
        let window = SampleWindow::create(event_loop, &self.config.platform())?;
        SampleContext::new(window, &self.config)
    }

    /// Record a fatal error and tear everything down.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("Fatal error: {e:#}");
        self.state = None;
        self.error = Some(e);
        event_loop.exit();
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        let Some(state) = &mut self.state else {
            return Ok(());
        };
        if state.draw_frame()? == FrameOutcome::Skipped(SkipReason::EmptyDrawable) {
            thread::sleep(MINIMIZED_BACKOFF);
        }
        Ok(())
    }
}

impl ApplicationHandler for SampleRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.error.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Press Escape to quit, F to toggle fullscreen");
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.state = None;
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => match command_for_key(event.state, event.physical_key, event.repeat) {
                Some(SampleCommand::Quit) => {
                    self.state = None;
                    event_loop.exit();
                }
                Some(SampleCommand::ToggleFullscreen) => {
                    let result = self
                        .state
                        .as_mut()
                        .map_or(Ok(()), |state| state.toggle_fullscreen().map(drop));
                    if let Err(e) = result {
                        self.fail(event_loop, e);
                    }
                }
                None => {}
            },
            WindowEvent::Resized(_) => {
                if let Some(state) = &mut self.state {
                    state.request_rebuild();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.state = None;
    }
}

/// Create a window and a bare Vulkan instance, then wait for any key.
pub fn run_probe(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("Starting {} ...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut runner = ProbeRunner {
        config,
        state: None,
        error: None,
    };
    event_loop.run_app(&mut runner)?;

    runner.error.map_or(Ok(()), Err)
}

// Instance before window so it is dropped first.
struct ProbeState {
    _instance: VulkanInstance,
    _window: SampleWindow,
}

struct ProbeRunner {
    config: AppConfig,
    state: Option<ProbeState>,
    error: Option<anyhow::Error>,
}

impl ProbeRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ProbeState> {
        let window = SampleWindow::create(event_loop, &self.config.platform())?;
        let display = window.raw_display_handle()?;
        let instance = VulkanInstance::new(&self.config.title, display, self.config.flags)?;
        info!("VkInstance successfully created ({:?})", instance.instance().handle());
        Ok(ProbeState {
            _instance: instance,
            _window: window,
        })
    }
}

impl ApplicationHandler for ProbeRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.error.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Press any key to quit");
            }
            Err(e) => {
                error!("Fatal error: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                event_loop.exit();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.state = None;
    }
}
