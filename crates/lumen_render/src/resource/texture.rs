//! Textures, samplers and the immediate texture upload.

use tracing::debug;

use crate::backend::GpuBackend;
use crate::barrier::TextureBarrier;
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::{
    AddressMode, BorderColor, Extent2d, Format, ImageLayout, SamplerFilter, TextureDimension,
    TextureUsage,
};

use super::{ensure_capacity, ensure_empty, occupied, ResourceKind, SamplerId, TextureId};

/// Immutable description of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    /// Texel format.
    pub format: Format,
    /// Layout the texture starts in.
    pub base_layout: ImageLayout,
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Allowed usages.
    pub usage: TextureUsage,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels. 1 for everything but 3-D textures.
    pub depth: u32,
    /// Samples per texel.
    pub samples: u32,
    /// Mip levels, including the base level.
    pub mip_count: u32,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            format: Format::Undefined,
            base_layout: ImageLayout::Undefined,
            dimension: TextureDimension::D2,
            usage: TextureUsage::all(),
            width: 0,
            height: 0,
            depth: 1,
            samples: 1,
            mip_count: 1,
        }
    }
}

impl TextureDesc {
    /// A sampled 2-D texture that can be uploaded to and mipmapped.
    #[must_use]
    pub fn sampled_2d(format: Format, width: u32, height: u32, mip_count: u32) -> Self {
        Self {
            format,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_SRC | TextureUsage::TRANSFER_DST,
            width,
            height,
            mip_count,
            ..Self::default()
        }
    }

    /// Size of mip 0.
    #[must_use]
    pub const fn extent(&self) -> Extent2d {
        Extent2d::new(self.width, self.height)
    }

    /// Bytes in one tightly packed row of mip 0.
    #[must_use]
    pub const fn row_bytes(&self) -> u32 {
        self.width * self.format.texel_size()
    }

    fn validate(&self) -> RenderResult<()> {
        if self.format == Format::Undefined {
            return Err(RenderError::InvalidArgument("texture format is undefined"));
        }
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(RenderError::InvalidArgument("texture extent must be non-zero"));
        }
        if self.samples == 0 {
            return Err(RenderError::InvalidArgument("texture sample count must be non-zero"));
        }
        if self.mip_count == 0 || self.mip_count > max_mip_count(self.width, self.height) + 1 {
            return Err(RenderError::InvalidArgument("texture mip count exceeds its mip chain"));
        }
        Ok(())
    }
}

/// `floor(log2(max(w, h)))`: the number of times the larger side can be
/// halved. Zero for 0 or 1; callers clamp to at least one level.
#[must_use]
pub const fn max_mip_count(width: u32, height: u32) -> u32 {
    let side = if width > height { width } else { height };
    if side <= 1 {
        0
    } else {
        side.ilog2()
    }
}

/// A pooled texture and its tracked layout.
pub struct Texture<B: GpuBackend> {
    desc: TextureDesc,
    layout: ImageLayout,
    native: B::Texture,
}

impl<B: GpuBackend> Texture<B> {
    /// Creation descriptor.
    #[must_use]
    pub const fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Layout of mip 0 as of the last recorded barrier that covered it.
    #[must_use]
    pub const fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Native backend object.
    #[must_use]
    pub const fn native(&self) -> &B::Texture {
        &self.native
    }

    pub(crate) fn set_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }
}

/// Immutable description of a sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerDesc {
    /// Minification filter.
    pub min_filter: SamplerFilter,
    /// Magnification filter.
    pub mag_filter: SamplerFilter,
    /// Filter between mips.
    pub mip_filter: SamplerFilter,
    /// Addressing along u.
    pub address_u: AddressMode,
    /// Addressing along v.
    pub address_v: AddressMode,
    /// Addressing along w.
    pub address_w: AddressMode,
    /// Border for `ClampToBorder`.
    pub border: BorderColor,
    /// Filter anisotropically at the device maximum.
    pub anisotropy: bool,
}

/// A pooled sampler.
pub struct Sampler<B: GpuBackend> {
    desc: SamplerDesc,
    native: B::Sampler,
}

impl<B: GpuBackend> Sampler<B> {
    /// Creation descriptor.
    #[must_use]
    pub const fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    /// Native backend object.
    #[must_use]
    pub const fn native(&self) -> &B::Sampler {
        &self.native
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates a texture in `slot`.
    ///
    /// With `data` (tightly packed texels for mip 0), the texture is uploaded
    /// through the staging buffer on an immediate command buffer, mipmapped
    /// if it has more than one level, and left in SHADER_READ_ONLY if it is
    /// sampled. This blocks until the upload finishes.
    ///
    /// # Errors
    ///
    /// - [`RenderError::HandleNotNull`] if `slot` is occupied
    /// - [`RenderError::InvalidArgument`] for a bad descriptor or data that
    ///   does not match the extent
    /// - [`RenderError::StagingOverflow`] if the padded upload does not fit
    /// - pool exhaustion, command-buffer errors or native failure
    pub fn add_texture(
        &mut self,
        desc: &TextureDesc,
        slot: &mut Option<TextureId>,
        data: Option<&[u8]>,
    ) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::Texture)?;
        desc.validate()?;
        if let Some(data) = data {
            self.check_upload(desc, data)?;
        }
        ensure_capacity(&self.textures)?;

        let native = self.backend.create_texture(desc)?;
        let texture = Texture { desc: *desc, layout: desc.base_layout, native };
        let id = TextureId(self.textures.alloc(texture)?);
        *slot = Some(id);

        if let Some(data) = data {
            self.upload_texture(id, data)?;
        }
        Ok(())
    }

    /// Destroys the texture in `slot` and empties it.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_texture(&mut self, slot: &mut Option<TextureId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::Texture)?;
        let texture = self.textures.free(id.0)?;
        self.backend.destroy_texture(texture.native);
        *slot = None;
        Ok(())
    }

    /// Looks up a live texture.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn texture(&self, id: TextureId) -> RenderResult<&Texture<B>> {
        Ok(self.textures.get(id.0)?)
    }

    /// Creates a sampler in `slot`.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleNotNull`], pool exhaustion or native failure.
    pub fn add_sampler(&mut self, desc: &SamplerDesc, slot: &mut Option<SamplerId>) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::Sampler)?;
        ensure_capacity(&self.samplers)?;

        let native = self.backend.create_sampler(desc)?;
        *slot = Some(SamplerId(self.samplers.alloc(Sampler { desc: *desc, native })?));
        Ok(())
    }

    /// Destroys the sampler in `slot` and empties it.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_sampler(&mut self, slot: &mut Option<SamplerId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::Sampler)?;
        let sampler = self.samplers.free(id.0)?;
        self.backend.destroy_sampler(sampler.native);
        *slot = None;
        Ok(())
    }

    /// Looks up a live sampler.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn sampler(&self, id: SamplerId) -> RenderResult<&Sampler<B>> {
        Ok(self.samplers.get(id.0)?)
    }

    /// Row pitch of staged uploads: the tight row rounded up to the device
    /// copy alignment.
    pub(crate) fn upload_pitch(&self, desc: &TextureDesc) -> u32 {
        let alignment = self.backend.device_info().limits.copy_row_alignment.max(1);
        desc.row_bytes().div_ceil(alignment) * alignment
    }

    fn check_upload(&self, desc: &TextureDesc, data: &[u8]) -> RenderResult<()> {
        let rows = u64::from(desc.height) * u64::from(desc.depth);
        let tight = u64::from(desc.row_bytes()) * rows;
        if data.len() as u64 != tight {
            return Err(RenderError::InvalidArgument("texture data does not match its extent"));
        }
        let padded = u64::from(self.upload_pitch(desc)) * rows;
        let capacity = self.config.staging_buffer_size;
        if padded > capacity {
            return Err(RenderError::StagingOverflow { len: padded, capacity });
        }
        Ok(())
    }

    fn upload_texture(&mut self, id: TextureId, data: &[u8]) -> RenderResult<()> {
        let desc = *self.texture(id)?.desc();
        let staging = self.staging_buffer()?;
        let pitch = self.upload_pitch(&desc);
        let row = desc.row_bytes() as usize;

        let cmd = self.get_cmd(true)?;
        self.begin_cmd(cmd)?;
        self.cmd(cmd)?.texture_barrier(&[TextureBarrier::new(
            id,
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
        )])?;

        if pitch as usize == row {
            self.copy_to_buffer(staging, 0, data)?;
        } else {
            for (i, texels) in data.chunks_exact(row).enumerate() {
                self.copy_to_buffer(staging, i as u64 * u64::from(pitch), texels)?;
            }
        }

        let mut recorder = self.cmd(cmd)?;
        recorder.copy_to_texture(id, staging)?;
        if desc.mip_count > 1 {
            recorder.generate_mipmap(id, SamplerFilter::Linear)?;
        }
        if desc.usage.contains(TextureUsage::SAMPLED) {
            let current = recorder.renderer().texture(id)?.layout();
            recorder.texture_barrier(&[TextureBarrier::new(id, current, ImageLayout::ShaderReadOnly)])?;
        }

        self.end_cmd(cmd)?;
        self.submit_immediate(cmd)?;

        debug!(bytes = data.len(), mips = desc.mip_count, "texture uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_mip_count() {
        assert_eq!(max_mip_count(0, 0), 0);
        assert_eq!(max_mip_count(1, 1), 0);
        assert_eq!(max_mip_count(2, 1), 1);
        assert_eq!(max_mip_count(256, 256), 8);
        assert_eq!(max_mip_count(300, 17), 8);
        assert_eq!(max_mip_count(17, 1024), 10);
    }

    #[test]
    fn test_validate_rejects_long_mip_chain() {
        let mut desc = TextureDesc::sampled_2d(Format::Rgba8Srgb, 4, 4, 3);
        assert!(desc.validate().is_ok());
        desc.mip_count = 4;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_extent() {
        let desc = TextureDesc::sampled_2d(Format::Rgba8Srgb, 0, 4, 1);
        assert_eq!(
            desc.validate(),
            Err(RenderError::InvalidArgument("texture extent must be non-zero"))
        );
    }

    #[test]
    fn test_row_bytes() {
        let desc = TextureDesc::sampled_2d(Format::Rgb32Float, 10, 4, 1);
        assert_eq!(desc.row_bytes(), 120);
    }
}
