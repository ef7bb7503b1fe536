/// Physical device selection and capability negotiation
///
/// Backends describe each candidate adapter with a [`PhysicalDeviceInfo`];
/// the scoring and suitability rules here are backend-agnostic.

use bitflags::bitflags;
use crate::error::{Error, Result};
use crate::{engine_error, engine_info};

/// Adapter category, ordered by preference in scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalDeviceType {
    Other,
    IntegratedGpu,
    DiscreteGpu,
    VirtualGpu,
    Cpu,
}

/// Capabilities of one queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub supports_graphics: bool,
    /// Whether this family can present to the target surface
    pub supports_present: bool,
    pub queue_count: u32,
}

/// Resolved queue family indices for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both graphics and present families were found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

bitflags! {
    /// Set of supported multisample counts (bit values match the count)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SampleCountFlags: u32 {
        const TYPE_1 = 1;
        const TYPE_2 = 2;
        const TYPE_4 = 4;
        const TYPE_8 = 8;
        const TYPE_16 = 16;
        const TYPE_32 = 32;
        const TYPE_64 = 64;
    }
}

/// Multisample count per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SampleCount {
    #[default]
    S1 = 1,
    S2 = 2,
    S4 = 4,
    S8 = 8,
    S16 = 16,
    S32 = 32,
    S64 = 64,
}

impl SampleCount {
    /// All counts, highest first
    pub const DESCENDING: [SampleCount; 7] = [
        SampleCount::S64,
        SampleCount::S32,
        SampleCount::S16,
        SampleCount::S8,
        SampleCount::S4,
        SampleCount::S2,
        SampleCount::S1,
    ];

    /// Build from a raw count; only powers of two up to 64 are valid
    pub fn from_count(count: u32) -> Option<Self> {
        Self::DESCENDING.into_iter().find(|s| s.count() == count)
    }

    pub fn count(self) -> u32 {
        self as u32
    }

    pub fn as_flag(self) -> SampleCountFlags {
        SampleCountFlags::from_bits_truncate(self.count())
    }

    /// Clamp to an upper bound
    pub fn clamp_to(self, max: SampleCount) -> SampleCount {
        self.min(max)
    }
}

/// Everything the selection rules need to know about one adapter
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub name: String,
    pub device_type: PhysicalDeviceType,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub supported_extensions: Vec<String>,
    /// Surface reports at least one format and one present mode
    pub swapchain_adequate: bool,
    pub sampler_anisotropy: bool,
    pub max_sampler_anisotropy: f32,
    pub max_image_dimension_2d: u32,
    pub color_sample_counts: SampleCountFlags,
    pub depth_sample_counts: SampleCountFlags,
}

/// Summary of the device the backend settled on
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub device_type: PhysicalDeviceType,
    pub max_samples: SampleCount,
    pub max_anisotropy: f32,
}

/// Find the first graphics family and the first present family.
/// A family doing both is preferred so a single queue can serve both roles.
pub fn find_queue_families(info: &PhysicalDeviceInfo) -> QueueFamilyIndices {
    let shared = info
        .queue_families
        .iter()
        .position(|f| f.queue_count > 0 && f.supports_graphics && f.supports_present);
    if let Some(index) = shared {
        return QueueFamilyIndices {
            graphics: Some(index as u32),
            present: Some(index as u32),
        };
    }

    QueueFamilyIndices {
        graphics: info
            .queue_families
            .iter()
            .position(|f| f.queue_count > 0 && f.supports_graphics)
            .map(|i| i as u32),
        present: info
            .queue_families
            .iter()
            .position(|f| f.queue_count > 0 && f.supports_present)
            .map(|i| i as u32),
    }
}

/// All `required` extensions are advertised by the device
pub fn check_device_extension_support(info: &PhysicalDeviceInfo, required: &[&str]) -> bool {
    required
        .iter()
        .all(|ext| info.supported_extensions.iter().any(|s| s == ext))
}

/// Raw preference score. Does not check suitability.
pub fn rate_device_suitability(info: &PhysicalDeviceInfo) -> u32 {
    let type_score = match info.device_type {
        PhysicalDeviceType::DiscreteGpu => 1000,
        PhysicalDeviceType::IntegratedGpu => 100,
        PhysicalDeviceType::VirtualGpu => 10,
        PhysicalDeviceType::Cpu => 1,
        PhysicalDeviceType::Other => 0,
    };
    type_score + info.max_image_dimension_2d / 1000
}

/// Device can render and present to the surface with the required extensions
pub fn is_device_suitable(info: &PhysicalDeviceInfo, required_extensions: &[&str]) -> bool {
    find_queue_families(info).is_complete()
        && check_device_extension_support(info, required_extensions)
        && info.swapchain_adequate
        && info.sampler_anisotropy
}

/// Pick the highest-scoring suitable device, returning its index in `candidates`
pub fn pick_physical_device(
    candidates: &[PhysicalDeviceInfo],
    required_extensions: &[&str],
) -> Result<usize> {
    let best = candidates
        .iter()
        .enumerate()
        .filter(|(_, info)| is_device_suitable(info, required_extensions))
        .max_by_key(|(_, info)| rate_device_suitability(info));

    match best {
        Some((index, info)) => {
            engine_info!("kestrel::device", "Selected GPU '{}' ({:?}, score {})",
                info.name, info.device_type, rate_device_suitability(info));
            Ok(index)
        }
        None => {
            engine_error!("kestrel::device",
                "No suitable GPU among {} candidate(s)", candidates.len());
            Err(Error::InitializationFailed(format!(
                "No suitable GPU among {} candidate(s)", candidates.len()
            )))
        }
    }
}

/// Highest sample count usable for both color and depth attachments
pub fn max_usable_sample_count(
    color_counts: SampleCountFlags,
    depth_counts: SampleCountFlags,
) -> SampleCount {
    let counts = color_counts & depth_counts;
    SampleCount::DESCENDING
        .into_iter()
        .find(|s| counts.contains(s.as_flag()))
        .unwrap_or(SampleCount::S1)
}

#[cfg(test)]
#[path = "device_selection_tests.rs"]
mod tests;
