//! # Device Bootstrap
//!
//! Adapter selection and the device limits the core depends on.
//!
//! Backends enumerate their adapters into [`AdapterCandidate`]s and pick one
//! with [`select_adapter`]. The first candidate meeting every requirement
//! wins, even if a later one is faster; ordering is the backend's
//! enumeration order.

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, BackendResult};

/// Minimum native API version, as `(major, minor)`.
pub const MIN_API_VERSION: (u32, u32) = (1, 3);

/// Physical device class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Dedicated GPU.
    Discrete,
    /// GPU sharing memory with the CPU.
    Integrated,
    /// Software rasterizer.
    Cpu,
    /// Anything else.
    Other,
}

/// Optional device features the renderer may require.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterFeatures {
    /// Anisotropic filtering.
    pub sampler_anisotropy: bool,
    /// Line and point fill modes.
    pub fill_mode_non_solid: bool,
    /// Line widths other than 1.0.
    pub wide_lines: bool,
}

/// Capabilities of one queue family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamily {
    /// Supports graphics work.
    pub graphics: bool,
    /// Supports compute work.
    pub compute: bool,
    /// Can present to the target surface.
    pub present: bool,
}

impl QueueFamily {
    /// Returns true if one queue from this family can do all the work.
    #[must_use]
    pub const fn is_universal(&self) -> bool {
        self.graphics && self.compute && self.present
    }
}

/// What a backend knows about one adapter before creating a device on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterCandidate {
    /// Human-readable adapter name.
    pub name: String,
    /// Device class.
    pub kind: AdapterKind,
    /// Native API version, `(major, minor)`.
    pub api_version: (u32, u32),
    /// Optional feature support.
    pub features: AdapterFeatures,
    /// Swap chain support.
    pub has_swap_chain_extension: bool,
    /// Number of formats the surface offers on this adapter.
    pub surface_format_count: u32,
    /// Number of present modes the surface offers on this adapter.
    pub present_mode_count: u32,
    /// Queue families in native order.
    pub queue_families: Vec<QueueFamily>,
}

/// Requirements an adapter must meet. Loaded from the renderer config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRequirements {
    /// Reject integrated and software adapters.
    pub discrete_gpu: bool,
    /// Require anisotropic filtering.
    pub sampler_anisotropy: bool,
    /// Require line and point fill modes.
    pub fill_mode_non_solid: bool,
    /// Require wide lines.
    pub wide_lines: bool,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            discrete_gpu: true,
            sampler_anisotropy: true,
            fill_mode_non_solid: true,
            wide_lines: true,
        }
    }
}

impl DeviceRequirements {
    /// Accepts any adapter that can render and present.
    #[must_use]
    pub const fn relaxed() -> Self {
        Self {
            discrete_gpu: false,
            sampler_anisotropy: false,
            fill_mode_non_solid: false,
            wide_lines: false,
        }
    }

    /// Returns true if `candidate` meets every requirement.
    #[must_use]
    pub fn accepts(&self, candidate: &AdapterCandidate) -> bool {
        let features = &candidate.features;
        candidate.has_swap_chain_extension
            && candidate.surface_format_count > 0
            && candidate.present_mode_count > 0
            && candidate.api_version >= MIN_API_VERSION
            && (!self.discrete_gpu || candidate.kind == AdapterKind::Discrete)
            && (!self.sampler_anisotropy || features.sampler_anisotropy)
            && (!self.fill_mode_non_solid || features.fill_mode_non_solid)
            && (!self.wide_lines || features.wide_lines)
    }
}

/// The adapter and queue family chosen by [`select_adapter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterSelection {
    /// Index into the candidate list.
    pub adapter: usize,
    /// Index of the first universal queue family.
    pub queue_family: usize,
}

/// Picks the first adapter meeting `requirements` that also exposes a
/// graphics + compute + present queue family.
///
/// # Errors
///
/// [`BackendError::NoSuitableAdapter`] if nothing qualifies.
pub fn select_adapter(
    candidates: &[AdapterCandidate],
    requirements: &DeviceRequirements,
) -> BackendResult<AdapterSelection> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| requirements.accepts(candidate))
        .find_map(|(adapter, candidate)| {
            candidate
                .queue_families
                .iter()
                .position(QueueFamily::is_universal)
                .map(|queue_family| AdapterSelection { adapter, queue_family })
        })
        .ok_or(BackendError::NoSuitableAdapter)
}

/// Device limits the core reads when validating copies and creating
/// samplers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceLimits {
    /// Offset and size granularity of uniform buffer bindings.
    pub min_uniform_buffer_offset_alignment: u64,
    /// Offset and size granularity of storage buffer bindings.
    pub min_storage_buffer_offset_alignment: u64,
    /// Maximum anisotropy a sampler may request.
    pub max_sampler_anisotropy: f32,
    /// Row pitch alignment for buffer-to-texture copies.
    pub copy_row_alignment: u32,
    /// Nanoseconds per timestamp tick.
    pub timestamp_period: f32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 32,
            max_sampler_anisotropy: 16.0,
            copy_row_alignment: 1,
            timestamp_period: 1.0,
        }
    }
}

/// The device a backend created.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    /// Adapter name.
    pub name: String,
    /// Device limits.
    pub limits: DeviceLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable(name: &str) -> AdapterCandidate {
        AdapterCandidate {
            name: name.to_owned(),
            kind: AdapterKind::Discrete,
            api_version: (1, 3),
            features: AdapterFeatures {
                sampler_anisotropy: true,
                fill_mode_non_solid: true,
                wide_lines: true,
            },
            has_swap_chain_extension: true,
            surface_format_count: 2,
            present_mode_count: 3,
            queue_families: vec![QueueFamily { graphics: true, compute: true, present: true }],
        }
    }

    #[test]
    fn test_first_matching_adapter_wins() {
        let mut integrated = capable("igpu");
        integrated.kind = AdapterKind::Integrated;
        let candidates = [integrated, capable("dgpu-a"), capable("dgpu-b")];

        let picked = select_adapter(&candidates, &DeviceRequirements::default()).unwrap();
        assert_eq!(picked.adapter, 1);
    }

    #[test]
    fn test_old_api_version_is_rejected() {
        let mut old = capable("old");
        old.api_version = (1, 2);
        assert_eq!(
            select_adapter(&[old], &DeviceRequirements::default()),
            Err(BackendError::NoSuitableAdapter)
        );
    }

    #[test]
    fn test_missing_feature_only_matters_when_required() {
        let mut thin = capable("thin-lines");
        thin.features.wide_lines = false;

        assert!(!DeviceRequirements::default().accepts(&thin));
        let requirements = DeviceRequirements { wide_lines: false, ..DeviceRequirements::default() };
        assert!(requirements.accepts(&thin));
    }

    #[test]
    fn test_surface_without_formats_is_rejected() {
        let mut headless = capable("no-surface");
        headless.surface_format_count = 0;
        assert!(!DeviceRequirements::relaxed().accepts(&headless));
    }

    #[test]
    fn test_queue_family_must_do_everything() {
        let mut split = capable("split-queues");
        split.queue_families = vec![
            QueueFamily { graphics: true, compute: false, present: true },
            QueueFamily { graphics: false, compute: true, present: false },
            QueueFamily { graphics: true, compute: true, present: true },
        ];

        let picked = select_adapter(&[split], &DeviceRequirements::default()).unwrap();
        assert_eq!(picked.queue_family, 2);
    }

    #[test]
    fn test_adapter_without_universal_queue_is_skipped() {
        let mut split = capable("split");
        split.queue_families = vec![QueueFamily { graphics: true, compute: true, present: false }];
        let candidates = [split, capable("fallback")];

        let picked = select_adapter(&candidates, &DeviceRequirements::default()).unwrap();
        assert_eq!(picked, AdapterSelection { adapter: 1, queue_family: 0 });
    }
}
