//! Descriptor sets: resources bound to shaders as a group.

use lumen_core::Pool;
use smallvec::SmallVec;

use crate::backend::{BoundResource, DescriptorWrite, GpuBackend};
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::BufferType;

use super::{
    ensure_capacity, ensure_empty, occupied, Buffer, BufferId, DescriptorSetId, ResourceKind,
    Sampler, SamplerId, Texture, TextureId,
};

/// Maximum descriptors in one set.
pub const MAX_DESCRIPTORS_PER_SET: usize = 32;

/// Maximum textures in one arrayed descriptor.
pub const MAX_DESCRIPTOR_ARRAY_LEN: usize = 1024;

/// Kind of a descriptor binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// Uniform buffer bound whole.
    UniformBuffer,
    /// Uniform buffer with an offset given at bind time.
    DynamicUniformBuffer,
    /// Storage buffer bound whole.
    StorageBuffer,
    /// Storage buffer with an offset given at bind time.
    DynamicStorageBuffer,
    /// Sampled texture. May be arrayed.
    Texture,
    /// Sampler.
    Sampler,
}

impl DescriptorType {
    /// Takes a dynamic offset at bind time.
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        matches!(self, Self::DynamicUniformBuffer | Self::DynamicStorageBuffer)
    }

    const fn accepts_buffer(self, kind: BufferType) -> Option<BufferType> {
        match self {
            Self::UniformBuffer | Self::DynamicUniformBuffer => match kind {
                BufferType::Uniform => None,
                _ => Some(BufferType::Uniform),
            },
            Self::StorageBuffer | Self::DynamicStorageBuffer => match kind {
                BufferType::Storage | BufferType::Indirect => None,
                _ => Some(BufferType::Storage),
            },
            Self::Texture | Self::Sampler => None,
        }
    }
}

/// What a descriptor points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorResource {
    /// A whole buffer.
    Buffer(BufferId),
    /// One or more sampled textures, bound as an array.
    Textures(SmallVec<[TextureId; 1]>),
    /// A sampler.
    Sampler(SamplerId),
}

/// One binding in a set. Its binding number is its index in the set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    /// Binding kind.
    pub kind: DescriptorType,
    /// Bound resource.
    pub resource: DescriptorResource,
}

impl Descriptor {
    /// A uniform buffer binding.
    #[must_use]
    pub const fn uniform(buffer: BufferId) -> Self {
        Self { kind: DescriptorType::UniformBuffer, resource: DescriptorResource::Buffer(buffer) }
    }

    /// A storage buffer binding.
    #[must_use]
    pub const fn storage(buffer: BufferId) -> Self {
        Self { kind: DescriptorType::StorageBuffer, resource: DescriptorResource::Buffer(buffer) }
    }

    /// A single sampled texture.
    #[must_use]
    pub fn texture(texture: TextureId) -> Self {
        Self::textures([texture])
    }

    /// An array of sampled textures.
    #[must_use]
    pub fn textures(textures: impl IntoIterator<Item = TextureId>) -> Self {
        Self {
            kind: DescriptorType::Texture,
            resource: DescriptorResource::Textures(textures.into_iter().collect()),
        }
    }

    /// A sampler binding.
    #[must_use]
    pub const fn sampler(sampler: SamplerId) -> Self {
        Self { kind: DescriptorType::Sampler, resource: DescriptorResource::Sampler(sampler) }
    }

    /// Array length of the binding.
    #[must_use]
    pub fn count(&self) -> usize {
        match &self.resource {
            DescriptorResource::Textures(textures) => textures.len(),
            DescriptorResource::Buffer(_) | DescriptorResource::Sampler(_) => 1,
        }
    }
}

/// Immutable description of a descriptor set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSetDesc {
    /// Bindings in binding-number order.
    pub descriptors: Vec<Descriptor>,
}

impl DescriptorSetDesc {
    /// A set with the given bindings.
    #[must_use]
    pub fn new(descriptors: impl IntoIterator<Item = Descriptor>) -> Self {
        Self { descriptors: descriptors.into_iter().collect() }
    }

    fn validate(&self) -> RenderResult<()> {
        if self.descriptors.is_empty() {
            return Err(RenderError::InvalidArgument("descriptor set has no descriptors"));
        }
        if self.descriptors.len() > MAX_DESCRIPTORS_PER_SET {
            return Err(RenderError::InvalidArgument("descriptor set has too many descriptors"));
        }
        for descriptor in &self.descriptors {
            let matches = matches!(
                (descriptor.kind, &descriptor.resource),
                (
                    DescriptorType::UniformBuffer
                        | DescriptorType::DynamicUniformBuffer
                        | DescriptorType::StorageBuffer
                        | DescriptorType::DynamicStorageBuffer,
                    DescriptorResource::Buffer(_),
                ) | (DescriptorType::Texture, DescriptorResource::Textures(_))
                    | (DescriptorType::Sampler, DescriptorResource::Sampler(_))
            );
            if !matches {
                return Err(RenderError::InvalidArgument("descriptor kind does not match its resource"));
            }
            if descriptor.count() == 0 || descriptor.count() > MAX_DESCRIPTOR_ARRAY_LEN {
                return Err(RenderError::InvalidArgument("descriptor array length out of range"));
            }
        }
        Ok(())
    }
}

/// A pooled descriptor set.
pub struct DescriptorSet<B: GpuBackend> {
    desc: DescriptorSetDesc,
    native: B::DescriptorSet,
}

impl<B: GpuBackend> DescriptorSet<B> {
    /// Creation descriptor.
    #[must_use]
    pub const fn desc(&self) -> &DescriptorSetDesc {
        &self.desc
    }

    /// Native backend object.
    #[must_use]
    pub const fn native(&self) -> &B::DescriptorSet {
        &self.native
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates a descriptor set in `slot`, resolving every referenced
    /// resource now. Textures are bound in their current tracked layout.
    ///
    /// # Errors
    ///
    /// - [`RenderError::HandleNotNull`] if `slot` is occupied
    /// - [`RenderError::InvalidArgument`] for an empty or malformed set
    /// - [`RenderError::WrongBufferType`] for a buffer that does not match
    ///   its binding
    /// - a stale handle in any descriptor, pool exhaustion or native failure
    pub fn add_descriptor_set(
        &mut self,
        desc: &DescriptorSetDesc,
        slot: &mut Option<DescriptorSetId>,
    ) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::DescriptorSet)?;
        desc.validate()?;
        ensure_capacity(&self.descriptor_sets)?;

        let writes = resolve_writes(desc, &self.buffers, &self.textures, &self.samplers)?;
        let native = self.backend.create_descriptor_set(&writes)?;
        drop(writes);

        let set = DescriptorSet { desc: desc.clone(), native };
        *slot = Some(DescriptorSetId(self.descriptor_sets.alloc(set)?));
        Ok(())
    }

    /// Destroys the descriptor set in `slot` and empties it.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_descriptor_set(&mut self, slot: &mut Option<DescriptorSetId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::DescriptorSet)?;
        let set = self.descriptor_sets.free(id.0)?;
        self.backend.destroy_descriptor_set(set.native);
        *slot = None;
        Ok(())
    }

    /// Looks up a live descriptor set.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn descriptor_set(&self, id: DescriptorSetId) -> RenderResult<&DescriptorSet<B>> {
        Ok(self.descriptor_sets.get(id.0)?)
    }
}

fn resolve_writes<'a, B: GpuBackend>(
    desc: &DescriptorSetDesc,
    buffers: &'a Pool<Buffer<B>>,
    textures: &'a Pool<Texture<B>>,
    samplers: &'a Pool<Sampler<B>>,
) -> RenderResult<Vec<DescriptorWrite<'a, B>>> {
    let mut writes = Vec::with_capacity(desc.descriptors.len());

    for (binding, descriptor) in (0u32..).zip(&desc.descriptors) {
        let resources = match &descriptor.resource {
            DescriptorResource::Buffer(id) => {
                let buffer = buffers.get(id.0)?;
                let kind = buffer.desc().kind;
                if let Some(expected) = descriptor.kind.accepts_buffer(kind) {
                    return Err(RenderError::WrongBufferType { expected, found: kind });
                }
                smallvec::smallvec![BoundResource::Buffer {
                    buffer: buffer.native(),
                    size: buffer.desc().size,
                }]
            }
            DescriptorResource::Textures(ids) => ids
                .iter()
                .map(|id| -> RenderResult<_> {
                    let texture = textures.get(id.0)?;
                    Ok(BoundResource::Texture { texture: texture.native(), layout: texture.layout() })
                })
                .collect::<RenderResult<SmallVec<_>>>()?,
            DescriptorResource::Sampler(id) => {
                smallvec::smallvec![BoundResource::Sampler(samplers.get(id.0)?.native())]
            }
        };
        writes.push(DescriptorWrite { binding, kind: descriptor.kind, resources });
    }

    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture_id() -> TextureId {
        let mut pool: Pool<()> = Pool::new(1);
        TextureId(pool.alloc(()).unwrap())
    }

    #[test]
    fn test_empty_set_is_rejected() {
        assert!(DescriptorSetDesc::default().validate().is_err());
    }

    #[test]
    fn test_mismatched_resource_is_rejected() {
        let desc = DescriptorSetDesc::new([Descriptor {
            kind: DescriptorType::Sampler,
            resource: DescriptorResource::Textures(SmallVec::from_elem(texture_id(), 1)),
        }]);
        assert_eq!(
            desc.validate(),
            Err(RenderError::InvalidArgument("descriptor kind does not match its resource"))
        );
    }

    #[test]
    fn test_texture_array_count() {
        let id = texture_id();
        let descriptor = Descriptor::textures([id, id, id]);
        assert_eq!(descriptor.count(), 3);
        assert!(DescriptorSetDesc::new([descriptor]).validate().is_ok());
        assert!(DescriptorSetDesc::new([Descriptor::textures(std::iter::empty::<TextureId>())])
            .validate()
            .is_err());
    }

    #[test]
    fn test_buffer_type_rules() {
        assert_eq!(DescriptorType::UniformBuffer.accepts_buffer(BufferType::Uniform), None);
        assert_eq!(
            DescriptorType::UniformBuffer.accepts_buffer(BufferType::Vertex),
            Some(BufferType::Uniform)
        );
        assert_eq!(DescriptorType::DynamicStorageBuffer.accepts_buffer(BufferType::Indirect), None);
        assert!(DescriptorType::DynamicUniformBuffer.is_dynamic());
    }
}
