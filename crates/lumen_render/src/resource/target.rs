//! Render and depth targets: textures the renderer draws into.

use crate::backend::GpuBackend;
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::{ClearValue, Extent2d, Format, ImageLayout, TextureDimension, TextureUsage};

use super::{
    ensure_capacity, ensure_empty, occupied, RenderTargetId, ResourceKind, TextureDesc, TextureId,
};

/// Immutable description of a render or depth target.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderTargetDesc {
    /// Attachment format. A depth format for depth targets.
    pub format: Format,
    /// Value used by clears and `LoadOp::Clear`.
    pub clear: ClearValue,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Samples per pixel.
    pub samples: u32,
}

impl RenderTargetDesc {
    /// A single-sampled target of `extent`.
    #[must_use]
    pub const fn new(format: Format, extent: Extent2d, clear: ClearValue) -> Self {
        Self { format, clear, width: extent.width, height: extent.height, samples: 1 }
    }

    /// Target size.
    #[must_use]
    pub const fn extent(&self) -> Extent2d {
        Extent2d::new(self.width, self.height)
    }
}

/// A pooled target. The backing texture lives in the texture pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTarget {
    desc: RenderTargetDesc,
    texture: TextureId,
}

impl RenderTarget {
    /// Creation descriptor.
    #[must_use]
    pub const fn desc(&self) -> &RenderTargetDesc {
        &self.desc
    }

    /// Backing texture.
    #[must_use]
    pub const fn texture(&self) -> TextureId {
        self.texture
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates a color target in `slot` with its backing texture.
    ///
    /// # Errors
    ///
    /// - [`RenderError::HandleNotNull`] if `slot` is occupied
    /// - [`RenderError::InvalidArgument`] for a depth format
    /// - texture creation errors, pool exhaustion
    pub fn add_render_target(
        &mut self,
        desc: &RenderTargetDesc,
        slot: &mut Option<RenderTargetId>,
    ) -> RenderResult<()> {
        if desc.format.is_depth() {
            return Err(RenderError::InvalidArgument("render target needs a color format"));
        }
        self.add_target(desc, slot, TextureUsage::COLOR_TARGET)
    }

    /// Creates a depth target in `slot` with its backing texture.
    ///
    /// # Errors
    ///
    /// As [`Renderer::add_render_target`], but the format must be a depth
    /// format.
    pub fn add_depth_target(
        &mut self,
        desc: &RenderTargetDesc,
        slot: &mut Option<RenderTargetId>,
    ) -> RenderResult<()> {
        if !desc.format.is_depth() {
            return Err(RenderError::InvalidArgument("depth target needs a depth format"));
        }
        self.add_target(desc, slot, TextureUsage::DEPTH_TARGET)
    }

    /// Destroys the target in `slot`, its backing texture with it.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_render_target(&mut self, slot: &mut Option<RenderTargetId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::RenderTarget)?;
        let target = self.render_targets.free(id.0)?;
        self.remove_texture(&mut Some(target.texture))?;
        *slot = None;
        Ok(())
    }

    /// Looks up a live target.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn render_target(&self, id: RenderTargetId) -> RenderResult<&RenderTarget> {
        Ok(self.render_targets.get(id.0)?)
    }

    fn add_target(
        &mut self,
        desc: &RenderTargetDesc,
        slot: &mut Option<RenderTargetId>,
        attachment: TextureUsage,
    ) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::RenderTarget)?;
        ensure_capacity(&self.render_targets)?;

        let texture_desc = TextureDesc {
            format: desc.format,
            base_layout: ImageLayout::Undefined,
            dimension: TextureDimension::D2,
            usage: attachment
                | TextureUsage::TRANSFER_SRC
                | TextureUsage::TRANSFER_DST
                | TextureUsage::SAMPLED,
            width: desc.width,
            height: desc.height,
            depth: 1,
            samples: desc.samples,
            mip_count: 1,
        };
        let mut texture = None;
        self.add_texture(&texture_desc, &mut texture, None)?;
        let texture = occupied(&texture, ResourceKind::Texture)?;

        let target = RenderTarget { desc: *desc, texture };
        *slot = Some(RenderTargetId(self.render_targets.alloc(target)?));
        Ok(())
    }
}
