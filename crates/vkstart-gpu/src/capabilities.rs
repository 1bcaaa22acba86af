//! GPU capability detection.

use ash::vk;
use bitflags::bitflags;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

bitflags! {
    /// Optional capabilities discovered once at startup.
    ///
    /// Read-only after discovery; gates the presentation-fence path, the
    /// extended surface query and the barrier style.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFeatureSet: u32 {
        /// `VK_EXT_surface_maintenance1` (instance).
        const SURFACE_MAINTENANCE_1 = 1 << 0;
        /// `VK_KHR_get_surface_capabilities2` (instance).
        const GET_SURFACE_CAPABILITIES_2 = 1 << 1;
        /// `VK_LAYER_KHRONOS_validation` is installed.
        const VALIDATION_LAYER = 1 << 2;
        /// `VK_EXT_debug_utils` is exposed by the validation layer.
        const DEBUG_UTILS = 1 << 3;
        /// `VK_EXT_validation_features` is exposed by the validation layer.
        const VALIDATION_FEATURES = 1 << 4;
        /// `VK_EXT_swapchain_maintenance1` (device).
        const SWAPCHAIN_MAINTENANCE_1 = 1 << 5;
        /// Dynamic rendering and synchronization2 (Vulkan 1.3 core).
        const DYNAMIC_RENDERING = 1 << 6;
        /// `VK_EXT_present_mode_fifo_latest_ready` (device).
        const PRESENT_MODE_FIFO_LATEST_READY = 1 << 7;
    }
}

/// `VK_EXT_present_mode_fifo_latest_ready`. Newer than the headers the
/// bindings are generated from, so its names are spelled out here.
pub const FIFO_LATEST_READY_EXTENSION: &CStr = c"VK_EXT_present_mode_fifo_latest_ready";

/// `VK_PRESENT_MODE_FIFO_LATEST_READY_EXT`.
pub const PRESENT_MODE_FIFO_LATEST_READY: vk::PresentModeKHR =
    vk::PresentModeKHR::from_raw(1_000_361_000);

/// `VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_PRESENT_MODE_FIFO_LATEST_READY_FEATURES_EXT`.
pub const FIFO_LATEST_READY_FEATURES_TYPE: vk::StructureType =
    vk::StructureType::from_raw(1_000_361_000);

impl DeviceFeatureSet {
    /// Instance-level bits only.
    pub const INSTANCE_MASK: Self = Self::SURFACE_MAINTENANCE_1
        .union(Self::GET_SURFACE_CAPABILITIES_2)
        .union(Self::VALIDATION_LAYER)
        .union(Self::DEBUG_UTILS)
        .union(Self::VALIDATION_FEATURES);

    /// Whether surface capabilities can be queried per present mode.
    pub fn extended_surface_query(self) -> bool {
        self.contains(Self::SURFACE_MAINTENANCE_1 | Self::GET_SURFACE_CAPABILITIES_2)
    }

    /// Whether present operations can signal a per-image fence.
    pub fn presentation_fences(self) -> bool {
        self.contains(Self::SWAPCHAIN_MAINTENANCE_1)
    }

    pub fn dynamic_rendering(self) -> bool {
        self.contains(Self::DYNAMIC_RENDERING)
    }

    /// Whether FIFO presentation may pick the latest ready image.
    pub fn fifo_latest_ready(self) -> bool {
        self.contains(Self::PRESENT_MODE_FIFO_LATEST_READY)
    }
}

/// Whether an API version is at least 1.3.
pub fn is_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Identity of a physical device.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type (discrete, integrated, ...)
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
}

impl AdapterInfo {
    /// Read identity from device properties.
    pub fn from_properties(properties: &vk::PhysicalDeviceProperties) -> Self {
        // SAFETY: the driver guarantees `device_name` is NUL-terminated.
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
        }
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{}",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        )
    }
}

/// Collect extension names from raw extension properties.
pub fn extension_names(properties: &[vk::ExtensionProperties]) -> HashSet<String> {
    properties
        .iter()
        .filter_map(|ext| {
            // SAFETY: the driver guarantees `extension_name` is NUL-terminated.
            unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                .to_str()
                .ok()
                .map(String::from)
        })
        .collect()
}
