//! Validation layer output routed into `tracing`.

use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_void, CStr};

/// Messenger settings shared by instance creation and the standalone
/// messenger, so that messages emitted during `vkCreateInstance` are seen too.
pub fn messenger_create_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(validation_callback))
}

/// Create the messenger.
///
/// # Safety
/// The instance behind `debug_utils` must be valid and outlive the messenger.
pub unsafe fn create_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT, vk::Result> {
    let create_info = messenger_create_info();
    // SAFETY: guaranteed by the caller.
    unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
}

fn severity_label(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> &'static str {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        "ERROR"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        "WARNING"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        "INFO"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        "VERBOSE"
    } else {
        "UNKNOWN"
    }
}

/// # Safety
/// `ptr` must be null or a NUL-terminated string.
unsafe fn lossy<'a>(ptr: *const std::ffi::c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        // SAFETY: guaranteed by the caller.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

unsafe extern "system" fn validation_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: the layer passes valid callback data for the duration of the call.
    let data = unsafe { &*callback_data };
    // SAFETY: both strings are NUL-terminated or null.
    let (id, message) = unsafe { (lossy(data.p_message_id_name), lossy(data.p_message)) };
    let label = severity_label(severity);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!("VALIDATION {label}({id}): {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!("VALIDATION {label}({id}): {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!("VALIDATION {label}({id}): {message}");
    } else {
        tracing::trace!("VALIDATION {label}({id}): {message}");
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_highest_severity() {
        assert_eq!(
            severity_label(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
            "ERROR"
        );
        assert_eq!(
            severity_label(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            "VERBOSE"
        );
        assert_eq!(
            severity_label(vk::DebugUtilsMessageSeverityFlagsEXT::empty()),
            "UNKNOWN"
        );
    }

    #[test]
    fn callback_tolerates_missing_strings() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT::default();
        // SAFETY: the callback only reads the struct and its null strings.
        let result = unsafe {
            validation_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }

    #[test]
    fn create_info_covers_all_severities() {
        let info = messenger_create_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info.pfn_user_callback.is_some());
    }
}
