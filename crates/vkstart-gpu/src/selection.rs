//! Physical device selection.
//!
//! Selection runs on plain data gathered from the driver so that every
//! accept/reject rule can be exercised without a GPU.

use crate::capabilities::{
    is_vulkan_1_3, AdapterInfo, DeviceFeatureSet, PRESENT_MODE_FIFO_LATEST_READY,
};
use crate::error::{GpuError, Result};
use ash::vk;
use std::collections::HashSet;
use std::fmt;
use vkstart_core::SampleFlags;

/// One queue family as reported by a physical device.
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyProbe {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub supports_present: bool,
}

/// A queue within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSlot {
    pub family: u32,
    pub index: u32,
}

/// Queues assigned to each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAssignment {
    pub graphics: QueueSlot,
    pub present: QueueSlot,
    pub transfer: QueueSlot,
}

impl QueueAssignment {
    /// `(family, queue count)` pairs for device creation, ordered by family.
    pub fn queue_create_counts(&self) -> Vec<(u32, u32)> {
        let mut counts: Vec<(u32, u32)> = Vec::with_capacity(3);
        for slot in [self.graphics, self.present, self.transfer] {
            match counts.iter_mut().find(|(family, _)| *family == slot.family) {
                Some((_, count)) => *count = (*count).max(slot.index + 1),
                None => counts.push((slot.family, slot.index + 1)),
            }
        }
        counts.sort_unstable_by_key(|(family, _)| *family);
        counts
    }
}

/// Assign graphics, transfer and present queues.
///
/// Each role gets its own queue while families have spare queues; once a
/// family runs out, the role shares queue 0 of the first matching family.
pub fn assign_queue_families(families: &[QueueFamilyProbe]) -> Option<QueueAssignment> {
    let mut used = vec![0u32; families.len()];

    let mut take = |accepts: &dyn Fn(&QueueFamilyProbe) -> bool| -> Option<QueueSlot> {
        let spare = families
            .iter()
            .enumerate()
            .find(|(i, family)| accepts(family) && used[*i] < family.queue_count);

        if let Some((i, _)) = spare {
            let slot = QueueSlot {
                family: i as u32,
                index: used[i],
            };
            used[i] += 1;
            return Some(slot);
        }

        families
            .iter()
            .position(|family| accepts(family) && family.queue_count > 0)
            .map(|i| QueueSlot {
                family: i as u32,
                index: 0,
            })
    };

    let graphics = take(&|f| f.flags.contains(vk::QueueFlags::GRAPHICS))?;
    // Graphics and compute families implicitly support transfer.
    let transfer = take(&|f| {
        f.flags
            .intersects(vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
    })?;
    let present = take(&|f| f.supports_present)?;

    Some(QueueAssignment {
        graphics,
        present,
        transfer,
    })
}

/// Pick the sRGB BGRA8 surface format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats.iter().copied().find(|format| {
        format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    })
}

/// Pick a present mode.
///
/// With vsync: MAILBOX, then FIFO_LATEST_READY, then FIFO. Without vsync only
/// IMMEDIATE is accepted.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> Option<vk::PresentModeKHR> {
    if vsync {
        [
            vk::PresentModeKHR::MAILBOX,
            PRESENT_MODE_FIFO_LATEST_READY,
            vk::PresentModeKHR::FIFO,
        ]
        .into_iter()
        .find(|mode| modes.contains(mode))
    } else {
        modes
            .contains(&vk::PresentModeKHR::IMMEDIATE)
            .then_some(vk::PresentModeKHR::IMMEDIATE)
    }
}

/// Everything selection needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub info: AdapterInfo,
    pub queue_families: Vec<QueueFamilyProbe>,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub extensions: HashSet<String>,
}

/// What the sample requires from a device.
#[derive(Debug, Clone, Copy)]
pub struct SelectionCriteria {
    pub flags: SampleFlags,
    /// Reject devices without Vulkan 1.3 dynamic rendering.
    pub require_dynamic_rendering: bool,
    /// Instance-level features already enabled.
    pub instance_features: DeviceFeatureSet,
}

/// Why a candidate was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoQueueFamilies,
    NoSurfaceFormat,
    NoPresentMode,
    NoImmediatePresentMode,
    NoSwapchainExtension,
    NoDynamicRendering,
    NotDiscrete,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoQueueFamilies => "missing graphics, present or transfer queue family",
            Self::NoSurfaceFormat => "B8G8R8A8_SRGB / SRGB_NONLINEAR surface format not supported",
            Self::NoPresentMode => "no usable present mode",
            Self::NoImmediatePresentMode => "IMMEDIATE present mode required without vsync",
            Self::NoSwapchainExtension => "VK_KHR_swapchain not supported",
            Self::NoDynamicRendering => "Vulkan 1.3 dynamic rendering not supported",
            Self::NotDiscrete => "not a discrete GPU",
        };
        f.write_str(reason)
    }
}

/// The selected device and everything derived from it.
#[derive(Debug, Clone)]
pub struct DeviceChoice {
    /// Index into the candidate list.
    pub index: usize,
    pub queues: QueueAssignment,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    /// Instance features plus the device features this device supports.
    pub features: DeviceFeatureSet,
}

/// Check a single candidate.
pub fn evaluate_candidate(
    index: usize,
    candidate: &DeviceCandidate,
    criteria: &SelectionCriteria,
) -> std::result::Result<DeviceChoice, Rejection> {
    let queues =
        assign_queue_families(&candidate.queue_families).ok_or(Rejection::NoQueueFamilies)?;
    let surface_format =
        choose_surface_format(&candidate.surface_formats).ok_or(Rejection::NoSurfaceFormat)?;

    let mut features = criteria.instance_features & DeviceFeatureSet::INSTANCE_MASK;
    if candidate
        .extensions
        .contains("VK_EXT_present_mode_fifo_latest_ready")
    {
        features |= DeviceFeatureSet::PRESENT_MODE_FIFO_LATEST_READY;
    }

    // FIFO_LATEST_READY is only usable with its extension enabled.
    let modes: Vec<vk::PresentModeKHR> = candidate
        .present_modes
        .iter()
        .copied()
        .filter(|&mode| mode != PRESENT_MODE_FIFO_LATEST_READY || features.fifo_latest_ready())
        .collect();
    let vsync = criteria.flags.vsync();
    let present_mode = choose_present_mode(&modes, vsync).ok_or(if vsync {
        Rejection::NoPresentMode
    } else {
        Rejection::NoImmediatePresentMode
    })?;

    if !candidate.extensions.contains("VK_KHR_swapchain") {
        return Err(Rejection::NoSwapchainExtension);
    }

    // Present fences need the instance-side surface maintenance extension.
    if candidate.extensions.contains("VK_EXT_swapchain_maintenance1")
        && features.contains(DeviceFeatureSet::SURFACE_MAINTENANCE_1)
    {
        features |= DeviceFeatureSet::SWAPCHAIN_MAINTENANCE_1;
    }

    if is_vulkan_1_3(candidate.info.api_version) {
        features |= DeviceFeatureSet::DYNAMIC_RENDERING;
    } else if criteria.require_dynamic_rendering {
        return Err(Rejection::NoDynamicRendering);
    }

    if criteria.flags.discrete_gpu()
        && candidate.info.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    {
        return Err(Rejection::NotDiscrete);
    }

    Ok(DeviceChoice {
        index,
        queues,
        surface_format,
        present_mode,
        features,
    })
}

/// Select the first candidate meeting the criteria.
pub fn pick_device(candidates: &[DeviceCandidate], criteria: &SelectionCriteria) -> Result<DeviceChoice> {
    if candidates.is_empty() {
        return Err(GpuError::NoSuitableDevice(
            "no GPUs with Vulkan support".to_string(),
        ));
    }

    let mut reasons = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.iter().enumerate() {
        match evaluate_candidate(index, candidate, criteria) {
            Ok(choice) => {
                tracing::info!(
                    "Selected {}GPU: {}",
                    if criteria.flags.discrete_gpu() { "discrete " } else { "first suitable " },
                    candidate.info.summary()
                );
                return Ok(choice);
            }
            Err(rejection) => {
                tracing::debug!("Skipping {}: {rejection}", candidate.info.device_name);
                reasons.push(format!("{}: {rejection}", candidate.info.device_name));
            }
        }
    }

    Err(GpuError::NoSuitableDevice(reasons.join("; ")))
}
