//! # Barriers and Layout Tracking
//!
//! Every texture record carries the layout its mip 0 was last transitioned
//! to. Barriers are recorded against the tracked layout and update it, so
//! callers rarely have to know an image's current layout themselves.
//!
//! ## Rules
//!
//! 1. A texture barrier with `mip_count == 0` covers every mip from 0.
//! 2. Only barriers that start at mip 0 update the tracked layout.
//! 3. Swap chain images are tracked per image in the swap chain.

use crate::backend::{GpuBackend, Op};
use crate::error::{RenderError, RenderResult};
use crate::recorder::Recorder;
use crate::resource::{RenderTargetId, TextureId};
use crate::types::{Extent2d, ImageLayout, MemoryAccess, PipelineStage, SamplerFilter};

/// A global memory dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Barrier {
    /// Stages that must finish first.
    pub src_stage: PipelineStage,
    /// Stages that wait.
    pub dst_stage: PipelineStage,
    /// Writes made available.
    pub src_access: MemoryAccess,
    /// Accesses they become visible to.
    pub dst_access: MemoryAccess,
}

impl Default for Barrier {
    fn default() -> Self {
        Self {
            src_stage: PipelineStage::All,
            dst_stage: PipelineStage::All,
            src_access: MemoryAccess::ALL_WRITES,
            dst_access: MemoryAccess::ALL_READS,
        }
    }
}

/// A layout transition of a texture's mip range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureBarrier {
    /// Transitioned texture.
    pub texture: TextureId,
    /// Layout the range is in now.
    pub old: ImageLayout,
    /// Layout after the barrier.
    pub new: ImageLayout,
    /// First mip of the range.
    pub start_mip: u32,
    /// Zero transitions every mip from 0.
    pub mip_count: u32,
    /// Stages that must finish first.
    pub src_stage: PipelineStage,
    /// Stages that wait.
    pub dst_stage: PipelineStage,
    /// Writes made available.
    pub src_access: MemoryAccess,
    /// Accesses they become visible to.
    pub dst_access: MemoryAccess,
}

impl TextureBarrier {
    /// Full-chain transition with the conservative default scopes.
    #[must_use]
    pub fn new(texture: TextureId, old: ImageLayout, new: ImageLayout) -> Self {
        let scope = Barrier::default();
        Self {
            texture,
            old,
            new,
            start_mip: 0,
            mip_count: 0,
            src_stage: scope.src_stage,
            dst_stage: scope.dst_stage,
            src_access: scope.src_access,
            dst_access: scope.dst_access,
        }
    }

    /// Restricts the transition to `count` mips starting at `start`.
    #[must_use]
    pub const fn mips(mut self, start: u32, count: u32) -> Self {
        self.start_mip = start;
        self.mip_count = count;
        self
    }

    /// Narrows the execution and memory scopes.
    #[must_use]
    pub const fn scope(mut self, barrier: Barrier) -> Self {
        self.src_stage = barrier.src_stage;
        self.dst_stage = barrier.dst_stage;
        self.src_access = barrier.src_access;
        self.dst_access = barrier.dst_access;
        self
    }
}

/// A layout transition of a render target's texture, mip 0 only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTargetBarrier {
    /// Transitioned target.
    pub target: RenderTargetId,
    /// Layout the target is in now.
    pub old: ImageLayout,
    /// Layout after the barrier.
    pub new: ImageLayout,
    /// Execution and memory scopes.
    pub scope: Barrier,
}

impl RenderTargetBarrier {
    /// Transition with the conservative default scopes.
    #[must_use]
    pub fn new(target: RenderTargetId, old: ImageLayout, new: ImageLayout) -> Self {
        Self { target, old, new, scope: Barrier::default() }
    }
}

impl<B: GpuBackend> Recorder<'_, B> {
    /// Records a global memory barrier.
    ///
    /// # Errors
    ///
    /// Backend failure.
    pub fn barrier(&mut self, barrier: Barrier) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(
            list,
            Op::MemoryBarrier {
                src_stage: barrier.src_stage,
                dst_stage: barrier.dst_stage,
                src_access: barrier.src_access,
                dst_access: barrier.dst_access,
            },
        )?;
        Ok(())
    }

    /// Records texture layout transitions, updating tracked layouts for
    /// barriers that start at mip 0.
    ///
    /// # Errors
    ///
    /// A stale texture, a mip range outside the chain, or backend failure.
    pub fn texture_barrier(&mut self, barriers: &[TextureBarrier]) -> RenderResult<()> {
        for barrier in barriers {
            let r = &mut *self.renderer;
            let texture = r.textures.get(barrier.texture.0)?;
            let chain = texture.desc().mip_count;
            let (base_mip, mip_count) = if barrier.mip_count == 0 {
                (0, chain)
            } else {
                (barrier.start_mip, barrier.mip_count)
            };
            if base_mip.checked_add(mip_count).map_or(true, |end| end > chain) {
                return Err(RenderError::InvalidArgument("barrier mip range exceeds the mip chain"));
            }

            let list = r.ring.recording_list(self.cmd)?;
            r.backend.record(
                list,
                Op::TextureBarrier {
                    texture: texture.native(),
                    old: barrier.old,
                    new: barrier.new,
                    base_mip,
                    mip_count,
                    src_stage: barrier.src_stage,
                    dst_stage: barrier.dst_stage,
                    src_access: barrier.src_access,
                    dst_access: barrier.dst_access,
                },
            )?;

            if base_mip == 0 {
                r.textures.get_mut(barrier.texture.0)?.set_layout(barrier.new);
            }
        }
        Ok(())
    }

    /// Transitions render target textures, mip 0 only.
    ///
    /// # Errors
    ///
    /// As [`Recorder::texture_barrier`], or a stale target.
    pub fn render_target_barrier(&mut self, barriers: &[RenderTargetBarrier]) -> RenderResult<()> {
        for barrier in barriers {
            let texture = self.renderer.render_target(barrier.target)?.texture();
            let transition = TextureBarrier::new(texture, barrier.old, barrier.new)
                .mips(0, 1)
                .scope(barrier.scope);
            self.texture_barrier(&[transition])?;
        }
        Ok(())
    }

    /// Transitions the active swap chain image from its tracked layout to
    /// `new`.
    ///
    /// # Errors
    ///
    /// [`RenderError::NoSwapChain`] before the swap chain exists, or
    /// backend failure.
    pub fn swap_chain_barrier(&mut self, new: ImageLayout) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let image = r.swap_chain.active_image();
        let old = r.swap_chain.image_layout(image)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::SwapChainBarrier { image, old, new })?;
        r.swap_chain.set_image_layout(image, new)?;
        Ok(())
    }

    /// Fills mips 1.. of `texture` by repeatedly downsampling from mip 0.
    /// Every mip ends in TRANSFER_SRC.
    ///
    /// # Errors
    ///
    /// A stale texture or backend failure.
    pub fn generate_mipmap(&mut self, texture: TextureId, filter: SamplerFilter) -> RenderResult<()> {
        let (current, mip_count, extent) = {
            let record = self.renderer.texture(texture)?;
            (record.layout(), record.desc().mip_count, record.desc().extent())
        };

        self.texture_barrier(&[TextureBarrier::new(texture, current, ImageLayout::TransferDst)])?;

        let mut src_extent = extent;
        for mip in 1..mip_count {
            self.texture_barrier(&[TextureBarrier::new(
                texture,
                ImageLayout::TransferDst,
                ImageLayout::TransferSrc,
            )
            .mips(mip - 1, 1)])?;

            let dst_extent = src_extent.mip_down();
            self.blit_mip(texture, mip - 1, src_extent, dst_extent, filter)?;
            src_extent = dst_extent;
        }

        self.texture_barrier(&[TextureBarrier::new(
            texture,
            ImageLayout::TransferDst,
            ImageLayout::TransferSrc,
        )
        .mips(mip_count - 1, 1)])
    }

    fn blit_mip(
        &mut self,
        texture: TextureId,
        src_mip: u32,
        src_extent: Extent2d,
        dst_extent: Extent2d,
        filter: SamplerFilter,
    ) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let record = r.textures.get(texture.0)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(
            list,
            Op::BlitMip {
                texture: record.native(),
                src_mip,
                dst_mip: src_mip + 1,
                src_extent,
                dst_extent,
                filter,
            },
        )?;
        Ok(())
    }
}
