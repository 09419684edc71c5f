//! Shader modules.

use crate::backend::GpuBackend;
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::ShaderStages;

use super::{ensure_capacity, ensure_empty, occupied, ResourceKind, ShaderId};

/// Pipeline stage a shader module is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
    /// Compute stage.
    Compute,
}

impl ShaderStage {
    /// The stage as a visibility mask.
    #[must_use]
    pub const fn as_stages(self) -> ShaderStages {
        match self {
            Self::Vertex => ShaderStages::VERTEX,
            Self::Fragment => ShaderStages::FRAGMENT,
            Self::Compute => ShaderStages::COMPUTE,
        }
    }
}

/// Compiled SPIR-V for one stage. Entry point is `main`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderDesc {
    /// Stage the module runs in.
    pub stage: ShaderStage,
    /// SPIR-V words as bytes.
    pub bytecode: Vec<u8>,
}

/// A pooled shader module.
pub struct Shader<B: GpuBackend> {
    stage: ShaderStage,
    native: B::Shader,
}

impl<B: GpuBackend> Shader<B> {
    /// Stage the module was created for.
    #[must_use]
    pub const fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Native backend object.
    #[must_use]
    pub const fn native(&self) -> &B::Shader {
        &self.native
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates a shader module in `slot`.
    ///
    /// The bytecode is handed to the backend and not retained.
    ///
    /// # Errors
    ///
    /// - [`RenderError::HandleNotNull`] if `slot` is occupied
    /// - [`RenderError::InvalidArgument`] for empty bytecode or bytecode that
    ///   is not a whole number of 32-bit words
    /// - pool exhaustion or native failure
    pub fn add_shader(&mut self, desc: &ShaderDesc, slot: &mut Option<ShaderId>) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::Shader)?;
        if desc.bytecode.is_empty() || desc.bytecode.len() % 4 != 0 {
            return Err(RenderError::InvalidArgument("shader bytecode must be whole SPIR-V words"));
        }
        ensure_capacity(&self.shaders)?;

        let native = self.backend.create_shader(desc)?;
        *slot = Some(ShaderId(self.shaders.alloc(Shader { stage: desc.stage, native })?));
        Ok(())
    }

    /// Destroys the shader module in `slot` and empties it.
    ///
    /// Pipelines built from it keep working.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_shader(&mut self, slot: &mut Option<ShaderId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::Shader)?;
        let shader = self.shaders.free(id.0)?;
        self.backend.destroy_shader(shader.native);
        *slot = None;
        Ok(())
    }

    /// Looks up a live shader module.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn shader(&self, id: ShaderId) -> RenderResult<&Shader<B>> {
        Ok(self.shaders.get(id.0)?)
    }
}
