//! Sample feature flags.

use bitflags::bitflags;

bitflags! {
    /// Options a sample is started with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SampleFlags: u32 {
        /// Start in borderless fullscreen.
        const FULLSCREEN = 0x0000_0001;
        /// Enable the Khronos validation layer if present.
        const VALIDATION_LAYERS = 0x0000_0002;
        /// Only accept a discrete GPU.
        const USE_DISCRETE_GPU = 0x0000_0004;
        /// Synchronize presentation with the display refresh.
        const ENABLE_VSYNC = 0x0000_0008;
    }
}

impl SampleFlags {
    /// Flags every sample starts from: vsync on, validation in debug builds.
    pub fn sample_defaults() -> Self {
        let mut flags = Self::ENABLE_VSYNC;
        if cfg!(debug_assertions) {
            flags |= Self::VALIDATION_LAYERS;
        }
        flags
    }

    pub fn vsync(self) -> bool {
        self.contains(Self::ENABLE_VSYNC)
    }

    pub fn validation(self) -> bool {
        self.contains(Self::VALIDATION_LAYERS)
    }

    pub fn fullscreen(self) -> bool {
        self.contains(Self::FULLSCREEN)
    }

    pub fn discrete_gpu(self) -> bool {
        self.contains(Self::USE_DISCRETE_GPU)
    }
}
