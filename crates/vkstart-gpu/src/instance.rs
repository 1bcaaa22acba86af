//! Vulkan instance creation.

use crate::capabilities::{extension_names, DeviceFeatureSet};
use crate::debug;
use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use vkstart_core::SampleFlags;

/// The Khronos validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Validation features enabled alongside the layer.
const VALIDATION_FEATURES: [vk::ValidationFeatureEnableEXT; 2] = [
    vk::ValidationFeatureEnableEXT::BEST_PRACTICES,
    vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION,
];

/// Version of the installed Vulkan loader.
pub fn loader_version(entry: &ash::Entry) -> Result<u32> {
    // SAFETY: the entry is loaded.
    let version = unsafe { entry.try_enumerate_instance_version() }?;
    Ok(version.unwrap_or(vk::API_VERSION_1_0))
}

/// Discover the optional instance extensions and validation support.
pub fn probe_instance_support(entry: &ash::Entry) -> Result<DeviceFeatureSet> {
    let mut features = DeviceFeatureSet::empty();

    // SAFETY: the entry is loaded.
    let extensions = extension_names(&unsafe { entry.enumerate_instance_extension_properties(None) }?);
    tracing::debug!("Available instance extensions: {extensions:?}");

    if extensions.contains(name(ash::ext::surface_maintenance1::NAME)) {
        features |= DeviceFeatureSet::SURFACE_MAINTENANCE_1;
    }
    if extensions.contains(name(ash::khr::get_surface_capabilities2::NAME)) {
        features |= DeviceFeatureSet::GET_SURFACE_CAPABILITIES_2;
    }

    // SAFETY: the entry is loaded.
    let layers = unsafe { entry.enumerate_instance_layer_properties() }?;
    for layer in &layers {
        // SAFETY: the loader guarantees `layer_name` is NUL-terminated.
        let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        if layer_name != VALIDATION_LAYER {
            tracing::debug!("Available layer: {}", layer_name.to_string_lossy());
            continue;
        }

        features |= DeviceFeatureSet::VALIDATION_LAYER;
        // SAFETY: the layer name comes from the loader.
        let layer_extensions = extension_names(&unsafe {
            entry.enumerate_instance_extension_properties(Some(layer_name))
        }?);
        if layer_extensions.contains(name(ash::ext::debug_utils::NAME)) {
            features |= DeviceFeatureSet::DEBUG_UTILS;
        }
        if layer_extensions.contains(name(ash::ext::validation_features::NAME)) {
            features |= DeviceFeatureSet::VALIDATION_FEATURES;
        }
    }

    Ok(features)
}

fn name(raw: &'static CStr) -> &'static str {
    raw.to_str().unwrap_or_default()
}

/// Instance extensions to enable for the given support and flags.
///
/// `window_extensions` are the surface extensions the window system needs.
pub fn instance_extensions(
    window_extensions: &[*const c_char],
    support: DeviceFeatureSet,
    validation: bool,
) -> Vec<*const c_char> {
    let mut extensions = Vec::with_capacity(window_extensions.len() + 5);
    extensions.extend_from_slice(window_extensions);

    if validation && support.contains(DeviceFeatureSet::VALIDATION_LAYER) {
        if support.contains(DeviceFeatureSet::DEBUG_UTILS) {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        if support.contains(DeviceFeatureSet::VALIDATION_FEATURES) {
            extensions.push(ash::ext::validation_features::NAME.as_ptr());
        }
    }
    if support.contains(DeviceFeatureSet::SURFACE_MAINTENANCE_1) {
        extensions.push(ash::ext::surface_maintenance1::NAME.as_ptr());
    }
    if support.contains(DeviceFeatureSet::GET_SURFACE_CAPABILITIES_2) {
        extensions.push(ash::khr::get_surface_capabilities2::NAME.as_ptr());
    }
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());

    extensions
}

/// A Vulkan instance plus the optional validation messenger.
///
/// Child objects (surfaces, devices) must be destroyed before this is dropped.
pub struct VulkanInstance {
    // Kept alive for the lifetime of the instance.
    entry: ash::Entry,
    instance: ash::Instance,
    /// Enabled instance-level features.
    features: DeviceFeatureSet,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Load Vulkan and create an instance able to present to `display`.
    pub fn new(app_name: &str, display: RawDisplayHandle, flags: SampleFlags) -> Result<Self> {
        // SAFETY: loading the system Vulkan library has no preconditions.
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let version = loader_version(&entry)?;
        tracing::info!(
            "Vulkan version: {}.{}.{}",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version)
        );

        let support = probe_instance_support(&entry)?;
        let validation = flags.validation() && support.contains(DeviceFeatureSet::VALIDATION_LAYER);
        if flags.validation() && !validation {
            tracing::warn!("Validation layers requested but not supported");
        }

        let window_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::ExtensionNotSupported(format!("window surface: {e}")))?;
        let extensions = instance_extensions(window_extensions, support, validation);

        let mut enabled = support
            & (DeviceFeatureSet::SURFACE_MAINTENANCE_1 | DeviceFeatureSet::GET_SURFACE_CAPABILITIES_2);
        if validation {
            enabled |= support
                & (DeviceFeatureSet::VALIDATION_LAYER
                    | DeviceFeatureSet::DEBUG_UTILS
                    | DeviceFeatureSet::VALIDATION_FEATURES);
        }

        for extension in &extensions {
            // SAFETY: every pointer comes from a `&'static CStr`.
            let extension = unsafe { CStr::from_ptr(*extension) };
            tracing::info!("Activating instance extension {}", extension.to_string_lossy());
        }

        let app_name = CString::new(app_name)
            .map_err(|_| GpuError::InvalidState("application name contains NUL".into()))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let layer_names = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        // Required for MoltenVK on macOS
        #[cfg(target_os = "macos")]
        let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let create_flags = vk::InstanceCreateFlags::empty();

        let mut debug_info = debug::messenger_create_info();
        let mut validation_features =
            vk::ValidationFeaturesEXT::default().enabled_validation_features(&VALIDATION_FEATURES);

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .flags(create_flags);
        if enabled.contains(DeviceFeatureSet::DEBUG_UTILS) {
            create_info = create_info.push_next(&mut debug_info);
        }
        if enabled.contains(DeviceFeatureSet::VALIDATION_FEATURES) {
            create_info = create_info.push_next(&mut validation_features);
        }

        // SAFETY: every pointer in `create_info` outlives the call.
        let instance = unsafe { entry.create_instance(&create_info, None) }?;

        let debug = if enabled.contains(DeviceFeatureSet::DEBUG_UTILS) {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            // SAFETY: the instance is valid and destroyed after the messenger.
            match unsafe { debug::create_messenger(&loader) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    tracing::warn!("Failed to create debug messenger: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            features: enabled,
            debug,
        })
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Instance-level features that were enabled.
    pub fn features(&self) -> DeviceFeatureSet {
        self.features
    }

    pub fn validation_enabled(&self) -> bool {
        self.features.contains(DeviceFeatureSet::VALIDATION_LAYER)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        // SAFETY: owners of child objects destroy them before dropping the instance.
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(extensions: &[*const c_char]) -> Vec<String> {
        extensions
            .iter()
            // SAFETY: all test pointers come from static C strings.
            .map(|ptr| unsafe { CStr::from_ptr(*ptr) }.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn window_extensions_come_first() {
        let window = [ash::khr::surface::NAME.as_ptr()];
        let extensions = instance_extensions(&window, DeviceFeatureSet::empty(), false);
        assert_eq!(names(&extensions)[0], "VK_KHR_surface");
    }

    #[test]
    fn validation_extensions_need_request_and_layer() {
        let support = DeviceFeatureSet::VALIDATION_LAYER
            | DeviceFeatureSet::DEBUG_UTILS
            | DeviceFeatureSet::VALIDATION_FEATURES;

        let off = names(&instance_extensions(&[], support, false));
        assert!(!off.iter().any(|n| n == "VK_EXT_debug_utils"));

        let on = names(&instance_extensions(&[], support, true));
        assert!(on.iter().any(|n| n == "VK_EXT_debug_utils"));
        assert!(on.iter().any(|n| n == "VK_EXT_validation_features"));

        let no_layer = names(&instance_extensions(
            &[],
            DeviceFeatureSet::DEBUG_UTILS,
            true,
        ));
        assert!(!no_layer.iter().any(|n| n == "VK_EXT_debug_utils"));
    }

    #[test]
    fn surface_extensions_follow_support() {
        let support =
            DeviceFeatureSet::SURFACE_MAINTENANCE_1 | DeviceFeatureSet::GET_SURFACE_CAPABILITIES_2;
        let enabled = names(&instance_extensions(&[], support, false));
        assert!(enabled.iter().any(|n| n == "VK_EXT_surface_maintenance1"));
        assert!(enabled
            .iter()
            .any(|n| n == "VK_KHR_get_surface_capabilities2"));
    }
}
