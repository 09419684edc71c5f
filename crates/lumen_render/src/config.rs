//! # Renderer Configuration
//!
//! Capacities and device requirements, fixed at renderer init. Usually loaded
//! from a TOML file; every field has a default so a partial file is fine.
//!
//! ```toml
//! command_buffers = 16
//! staging_buffer_size = 134217728
//!
//! [pools]
//! textures = 2048
//!
//! [surface_extent]
//! width = 1920
//! height = 1080
//!
//! gpu_timer = true
//!
//! [device]
//! discrete_gpu = false
//! ```

use serde::{Deserialize, Serialize};

use crate::command::MAX_COMMAND_BUFFERS;
use crate::device::DeviceRequirements;
use crate::error::{RenderError, RenderResult};
use crate::types::Extent2d;

/// Default staging buffer size: 128 MiB.
pub const DEFAULT_STAGING_BUFFER_SIZE: u64 = 128 * 1024 * 1024;

/// Slot count of each resource pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolCapacities {
    /// Buffer pool. The staging buffer occupies one slot.
    pub buffers: u32,
    /// Texture pool. Every render target occupies one slot here too.
    pub textures: u32,
    /// Sampler pool.
    pub samplers: u32,
    /// Shader pool.
    pub shaders: u32,
    /// Descriptor set pool.
    pub descriptor_sets: u32,
    /// Render and depth target pool.
    pub render_targets: u32,
    /// Graphics pipeline pool.
    pub graphics_pipelines: u32,
    /// Compute pipeline pool.
    pub compute_pipelines: u32,
}

impl Default for PoolCapacities {
    fn default() -> Self {
        Self {
            buffers: 1024,
            textures: 1024,
            samplers: 64,
            shaders: 256,
            descriptor_sets: 64,
            render_targets: 64,
            graphics_pipelines: 64,
            compute_pipelines: 64,
        }
    }
}

/// Renderer configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Resource pool capacities.
    pub pools: PoolCapacities,
    /// Size of the host-visible upload buffer in bytes.
    pub staging_buffer_size: u64,
    /// Number of command buffers in the ring.
    pub command_buffers: usize,
    /// Swap chain extent used when the surface does not dictate one.
    pub surface_extent: Extent2d,
    /// Adapter requirements.
    pub device: DeviceRequirements,
    /// Create per-frame timestamp query pools. Needs device support.
    pub gpu_timer: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            pools: PoolCapacities::default(),
            staging_buffer_size: DEFAULT_STAGING_BUFFER_SIZE,
            command_buffers: MAX_COMMAND_BUFFERS,
            surface_extent: Extent2d::new(1280, 720),
            device: DeviceRequirements::default(),
            gpu_timer: false,
        }
    }
}

impl RendererConfig {
    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// [`RenderError::Config`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> RenderResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RenderError::Config(format!("failed to parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// [`RenderError::Config`] naming the offending field.
    pub fn validate(&self) -> RenderResult<()> {
        if self.command_buffers == 0 {
            return Err(RenderError::Config("command_buffers must be at least 1".into()));
        }
        if self.staging_buffer_size == 0 {
            return Err(RenderError::Config("staging_buffer_size must be non-zero".into()));
        }
        if self.pools.buffers == 0 {
            return Err(RenderError::Config("pools.buffers must hold the staging buffer".into()));
        }
        if self.surface_extent.width == 0 || self.surface_extent.height == 0 {
            return Err(RenderError::Config("surface_extent must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.pools.samplers, 64);
        assert_eq!(config.command_buffers, 16);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            command_buffers = 4

            [pools]
            textures = 2048

            [device]
            discrete_gpu = false
            "#,
        )
        .unwrap();

        assert_eq!(config.command_buffers, 4);
        assert_eq!(config.pools.textures, 2048);
        assert_eq!(config.pools.buffers, 1024);
        assert!(!config.device.discrete_gpu);
        assert!(config.device.wide_lines);
    }

    #[test]
    fn test_zero_command_buffers_is_rejected() {
        let err = RendererConfig::from_toml_str("command_buffers = 0").unwrap_err();
        assert!(matches!(err, RenderError::Config(msg) if msg.contains("command_buffers")));
    }

    #[test]
    fn test_malformed_toml_is_a_config_error() {
        let err = RendererConfig::from_toml_str("command_buffers = \"many\"").unwrap_err();
        assert!(matches!(err, RenderError::Config(_)));
    }
}
