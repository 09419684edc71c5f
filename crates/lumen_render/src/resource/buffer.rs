//! Buffers and host copies into them.

use crate::backend::GpuBackend;
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::BufferType;

use super::{ensure_capacity, ensure_empty, occupied, BufferId, ResourceKind};

/// Immutable description of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    /// What the buffer is bound as.
    pub kind: BufferType,
    /// Total size in bytes.
    pub size: u64,
    /// Bytes between elements.
    pub stride: u64,
    /// Number of elements.
    pub count: u64,
}

impl BufferDesc {
    /// A buffer of `count` elements of `stride` bytes.
    #[must_use]
    pub const fn array(kind: BufferType, stride: u64, count: u64) -> Self {
        Self { kind, size: stride * count, stride, count }
    }

    /// An untyped buffer of `size` bytes.
    #[must_use]
    pub const fn bytes(kind: BufferType, size: u64) -> Self {
        Self { kind, size, stride: size, count: 1 }
    }

    fn validate(&self) -> RenderResult<()> {
        if self.size == 0 {
            return Err(RenderError::InvalidArgument("buffer size must be non-zero"));
        }
        if self.size < self.stride {
            return Err(RenderError::InvalidArgument("buffer size is smaller than its stride"));
        }
        Ok(())
    }
}

/// A pooled buffer.
pub struct Buffer<B: GpuBackend> {
    desc: BufferDesc,
    native: B::Buffer,
}

impl<B: GpuBackend> Buffer<B> {
    /// Creation descriptor.
    #[must_use]
    pub const fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// Native backend object.
    #[must_use]
    pub const fn native(&self) -> &B::Buffer {
        &self.native
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates a buffer in `slot`, optionally filled with `data`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::HandleNotNull`] if `slot` is occupied
    /// - [`RenderError::InvalidArgument`] for a zero-sized buffer, one
    ///   smaller than its stride, or initial data shorter than `desc.size`
    /// - copy errors from [`Renderer::copy_to_buffer`], checked before the
    ///   buffer is created
    /// - pool exhaustion or native failure
    pub fn add_buffer(
        &mut self,
        desc: &BufferDesc,
        slot: &mut Option<BufferId>,
        data: Option<&[u8]>,
    ) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::Buffer)?;
        desc.validate()?;
        if let Some(data) = data {
            check_initial_data(desc, data.len())?;
            check_copy(desc, self.alignment_for(desc.kind), 0, data.len())?;
        }
        ensure_capacity(&self.buffers)?;

        let native = self.backend.create_buffer(desc)?;
        let id = BufferId(self.buffers.alloc(Buffer { desc: *desc, native })?);
        *slot = Some(id);

        if let Some(data) = data {
            self.copy_to_buffer(id, 0, data)?;
        }
        Ok(())
    }

    /// Destroys the buffer in `slot` and empties it.
    ///
    /// The buffer must not be in use by GPU work that has not finished.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_buffer(&mut self, slot: &mut Option<BufferId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::Buffer)?;
        let buffer = self.buffers.free(id.0)?;
        self.backend.destroy_buffer(buffer.native);
        *slot = None;
        Ok(())
    }

    /// Looks up a live buffer.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn buffer(&self, id: BufferId) -> RenderResult<&Buffer<B>> {
        Ok(self.buffers.get(id.0)?)
    }

    /// Granularity of host copies into `id`.
    ///
    /// Uniform and storage buffers use the device's binding offset
    /// alignment; everything else is byte-granular.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn get_buffer_alignment(&self, id: BufferId) -> RenderResult<u64> {
        let buffer = self.buffers.get(id.0)?;
        Ok(self.alignment_for(buffer.desc.kind))
    }

    /// Writes `data` into `id` at `offset`. A host write: visible to GPU
    /// work submitted afterwards.
    ///
    /// # Errors
    ///
    /// - [`RenderError::MisalignedCopy`] if `data.len()` is not a multiple
    ///   of the buffer alignment
    /// - [`RenderError::CopyOutOfBounds`] if the copy runs past the end
    pub fn copy_to_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> RenderResult<()> {
        let buffer = self.buffers.get(id.0)?;
        check_copy(&buffer.desc, self.alignment_for(buffer.desc.kind), offset, data.len())?;
        self.backend.write_buffer(&buffer.native, offset, data)?;
        Ok(())
    }

    pub(crate) fn alignment_for(&self, kind: BufferType) -> u64 {
        let limits = &self.backend.device_info().limits;
        match kind {
            BufferType::Uniform => limits.min_uniform_buffer_offset_alignment,
            BufferType::Storage => limits.min_storage_buffer_offset_alignment,
            _ => 1,
        }
    }
}

/// Initial data fills the whole buffer. Longer data is caught by the copy
/// bounds check.
fn check_initial_data(desc: &BufferDesc, len: usize) -> RenderResult<()> {
    if (len as u64) < desc.size {
        return Err(RenderError::InvalidArgument("initial buffer data is shorter than the buffer"));
    }
    Ok(())
}

fn check_copy(desc: &BufferDesc, alignment: u64, offset: u64, len: usize) -> RenderResult<()> {
    let bytes = len as u64;
    if alignment > 1 && bytes % alignment != 0 {
        return Err(RenderError::MisalignedCopy { len, alignment });
    }
    if offset.checked_add(bytes).map_or(true, |end| end > desc.size) {
        return Err(RenderError::CopyOutOfBounds { offset, len, size: desc.size });
    }
    Ok(())
}
