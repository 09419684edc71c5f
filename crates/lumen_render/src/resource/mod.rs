//! # Resource Pools
//!
//! Every GPU resource lives in a fixed-capacity [`Pool`](lumen_core::Pool)
//! owned by the renderer. Callers hold typed ids, never references.
//!
//! ## Lifecycle
//!
//! Resources are created and destroyed through `add_*`/`remove_*` pairs on
//! [`Renderer`](crate::Renderer). Both take the caller's handle slot:
//!
//! ```text
//! let mut texture: Option<TextureId> = None;
//! renderer.add_texture(&desc, &mut texture, None)?;   // None → Some(id)
//! renderer.remove_texture(&mut texture)?;             // Some(id) → None
//! ```
//!
//! `add` into an occupied slot and `remove` from an empty one are errors, so
//! a handle can never be silently overwritten or double-released.

mod buffer;
mod descriptor;
mod pipeline;
mod shader;
mod target;
mod texture;

use std::fmt;

use lumen_core::{MemoryError, Pool, PoolHandle};

use crate::error::{RenderError, RenderResult};

pub use buffer::{Buffer, BufferDesc};
pub use descriptor::{
    Descriptor, DescriptorResource, DescriptorSet, DescriptorSetDesc, DescriptorType,
    MAX_DESCRIPTORS_PER_SET, MAX_DESCRIPTOR_ARRAY_LEN,
};
pub use pipeline::{
    ComputePipeline, ComputePipelineDesc, ConstantBlock, GraphicsPipeline, GraphicsPipelineDesc,
    VertexAttrib, VertexAttribute, VertexLayout, MAX_CONSTANT_BLOCKS, MAX_PIPELINE_DESCRIPTOR_SETS,
    MAX_VERTEX_ATTRIBUTES,
};
pub use shader::{Shader, ShaderDesc, ShaderStage};
pub use target::{RenderTarget, RenderTargetDesc};
pub use texture::{max_mip_count, Sampler, SamplerDesc, Texture, TextureDesc};

/// The eight pooled resource kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// [`Buffer`]
    Buffer,
    /// [`Texture`]
    Texture,
    /// [`Sampler`]
    Sampler,
    /// [`Shader`]
    Shader,
    /// [`DescriptorSet`]
    DescriptorSet,
    /// [`RenderTarget`]
    RenderTarget,
    /// [`GraphicsPipeline`]
    GraphicsPipeline,
    /// [`ComputePipeline`]
    ComputePipeline,
}

impl ResourceKind {
    /// Every kind, in teardown-check order.
    pub const ALL: [Self; 8] = [
        Self::GraphicsPipeline,
        Self::ComputePipeline,
        Self::DescriptorSet,
        Self::RenderTarget,
        Self::Shader,
        Self::Sampler,
        Self::Texture,
        Self::Buffer,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::Sampler => "sampler",
            Self::Shader => "shader",
            Self::DescriptorSet => "descriptor set",
            Self::RenderTarget => "render target",
            Self::GraphicsPipeline => "graphics pipeline",
            Self::ComputePipeline => "compute pipeline",
        })
    }
}

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) PoolHandle);

        impl $name {
            /// Resource kind this id names.
            pub const KIND: ResourceKind = ResourceKind::$kind;

            /// The underlying pool handle.
            #[inline]
            #[must_use]
            pub const fn handle(self) -> PoolHandle {
                self.0
            }
        }
    };
}

resource_id!(
    /// Handle to a pooled [`Buffer`].
    BufferId => Buffer
);
resource_id!(
    /// Handle to a pooled [`Texture`].
    TextureId => Texture
);
resource_id!(
    /// Handle to a pooled [`Sampler`].
    SamplerId => Sampler
);
resource_id!(
    /// Handle to a pooled [`Shader`].
    ShaderId => Shader
);
resource_id!(
    /// Handle to a pooled [`DescriptorSet`].
    DescriptorSetId => DescriptorSet
);
resource_id!(
    /// Handle to a pooled [`RenderTarget`]. Depth targets use the same pool.
    RenderTargetId => RenderTarget
);
resource_id!(
    /// Handle to a pooled [`GraphicsPipeline`].
    GraphicsPipelineId => GraphicsPipeline
);
resource_id!(
    /// Handle to a pooled [`ComputePipeline`].
    ComputePipelineId => ComputePipeline
);

/// Fails with `HandleNotNull` unless `slot` is empty.
pub(crate) fn ensure_empty<I>(slot: &Option<I>, kind: ResourceKind) -> RenderResult<()> {
    match slot {
        Some(_) => Err(RenderError::HandleNotNull { kind }),
        None => Ok(()),
    }
}

/// Returns the id in `slot`, or `HandleIsNull`.
pub(crate) fn occupied<I: Copy>(slot: &Option<I>, kind: ResourceKind) -> RenderResult<I> {
    slot.ok_or(RenderError::HandleIsNull { kind })
}

/// Fails with `PoolExhausted` before any native object is created.
pub(crate) fn ensure_capacity<T>(pool: &Pool<T>) -> RenderResult<()> {
    if pool.free_count() == 0 {
        return Err(MemoryError::PoolExhausted { capacity: pool.capacity() }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_guards() {
        let empty: Option<BufferId> = None;
        assert!(ensure_empty(&empty, ResourceKind::Buffer).is_ok());
        assert_eq!(
            occupied(&empty, ResourceKind::Buffer),
            Err(RenderError::HandleIsNull { kind: ResourceKind::Buffer })
        );
    }

    #[test]
    fn test_full_pool_is_reported_before_creation() {
        let mut pool: Pool<u8> = Pool::new(1);
        pool.alloc(0).unwrap();
        assert_eq!(
            ensure_capacity(&pool),
            Err(RenderError::Memory(MemoryError::PoolExhausted { capacity: 1 }))
        );
    }
}
