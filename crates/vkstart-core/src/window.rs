//! Window abstraction used by the presentation engine.

/// A window whose drawable surface backs a swapchain.
pub trait DrawableWindow {
    /// Current drawable size in physical pixels.
    ///
    /// This must be probed live: the logical window size can differ from the
    /// drawable size under DPI scaling.
    fn drawable_size(&self) -> (u32, u32);

    /// Switch between borderless fullscreen and the initial windowed size.
    ///
    /// Returns `true` if the window is fullscreen afterwards.
    fn toggle_fullscreen(&mut self) -> bool;
}
