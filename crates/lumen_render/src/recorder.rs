//! # Command Recording
//!
//! [`Renderer::cmd`] opens a [`Recorder`] on a RECORDING command buffer.
//! The recorder borrows the renderer mutably, so pools cannot change and
//! the buffer cannot leave RECORDING while commands are being written.
//!
//! ```text
//! let cmd = renderer.get_cmd(false)?;
//! renderer.begin_cmd(cmd)?;
//! {
//!     let mut rec = renderer.cmd(cmd)?;
//!     rec.bind_render_targets(&targets)?;
//!     rec.bind_graphics_pipeline(pipeline)?;
//!     rec.draw(3, 1)?;
//!     rec.unbind_render_targets()?;
//! }
//! renderer.end_cmd(cmd)?;
//! ```

use lumen_core::Pool;
use smallvec::SmallVec;

use crate::backend::{Attachment, GpuBackend, Op, MAX_COLOR_ATTACHMENTS};
use crate::command::{CommandBufferId, CommandBufferState};
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::resource::{
    BufferId, ComputePipelineId, ConstantBlock, DescriptorSetId, GraphicsPipelineId, RenderTarget,
    RenderTargetId, Texture, TextureId,
};
use crate::types::{
    BindPoint, BufferType, ImageLayout, IndexType, LoadOp, Rect2d, ShaderStages, StoreOp,
    TextureDimension, Viewport,
};

/// One attachment in a [`RenderTargetBindDesc`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTargetBinding {
    /// Attached target.
    pub target: RenderTargetId,
    /// What happens to its contents when the pass opens.
    pub load: LoadOp,
    /// What happens to them when it closes.
    pub store: StoreOp,
}

impl RenderTargetBinding {
    /// Loads existing contents and stores the result.
    #[must_use]
    pub fn new(target: RenderTargetId) -> Self {
        Self { target, load: LoadOp::Load, store: StoreOp::Store }
    }

    /// Clears to the target's clear value and stores the result.
    #[must_use]
    pub fn cleared(target: RenderTargetId) -> Self {
        Self { target, load: LoadOp::Clear, store: StoreOp::Store }
    }
}

/// Attachments for a dynamic render pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderTargetBindDesc {
    /// Color attachments, in shader output order.
    pub colors: SmallVec<[RenderTargetBinding; MAX_COLOR_ATTACHMENTS]>,
    /// Depth attachment, if any.
    pub depth: Option<RenderTargetBinding>,
}

/// Writes commands into one RECORDING command buffer.
pub struct Recorder<'r, B: GpuBackend> {
    pub(crate) renderer: &'r mut Renderer<B>,
    pub(crate) cmd: CommandBufferId,
}

impl<B: GpuBackend> Renderer<B> {
    /// Opens a recorder on `id`.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidCommandState`] unless `id` is RECORDING.
    pub fn cmd(&mut self, id: CommandBufferId) -> RenderResult<Recorder<'_, B>> {
        self.ring.expect(id, CommandBufferState::Recording)?;
        Ok(Recorder { renderer: self, cmd: id })
    }
}

impl<B: GpuBackend> Recorder<'_, B> {
    /// Command buffer being recorded.
    #[must_use]
    pub const fn id(&self) -> CommandBufferId {
        self.cmd
    }

    /// Read access to the renderer, e.g. for tracked layouts.
    #[must_use]
    pub fn renderer(&self) -> &Renderer<B> {
        &*self.renderer
    }

    fn emit<'op>(&mut self, op: Op<'op, B>) -> RenderResult<()> {
        let list = self.renderer.ring.recording_list(self.cmd)?;
        self.renderer.backend.record(list, op)?;
        Ok(())
    }

    // ========================================================================
    // Transfer
    // ========================================================================

    /// Clears a color target to its clear color, in its tracked layout.
    ///
    /// # Errors
    ///
    /// A stale target, or backend failure.
    pub fn clear_render_target(&mut self, target: RenderTargetId) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let target = r.render_targets.get(target.0)?;
        let texture = r.textures.get(target.texture().0)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(
            list,
            Op::ClearColor {
                texture: texture.native(),
                layout: texture.layout(),
                color: target.desc().clear.color,
            },
        )?;
        Ok(())
    }

    /// Clears a depth target to its clear depth, in its tracked layout.
    ///
    /// # Errors
    ///
    /// A stale target, or backend failure.
    pub fn clear_depth_target(&mut self, target: RenderTargetId) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let target = r.render_targets.get(target.0)?;
        let texture = r.textures.get(target.texture().0)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(
            list,
            Op::ClearDepth {
                texture: texture.native(),
                layout: texture.layout(),
                depth: target.desc().clear.depth,
            },
        )?;
        Ok(())
    }

    /// Fills `size` bytes at `offset` with the repeated word `data`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InvalidArgument`] for an empty or unaligned range
    /// - [`RenderError::CopyOutOfBounds`] past the end of the buffer
    pub fn fill_buffer(&mut self, buffer: BufferId, offset: u64, size: u64, data: u32) -> RenderResult<()> {
        if size == 0 {
            return Err(RenderError::InvalidArgument("fill size must be non-zero"));
        }
        if offset % 4 != 0 || size % 4 != 0 {
            return Err(RenderError::InvalidArgument("fill range must be 4-byte aligned"));
        }

        let r = &mut *self.renderer;
        let record = r.buffers.get(buffer.0)?;
        let capacity = record.desc().size;
        if offset.checked_add(size).map_or(true, |end| end > capacity) {
            return Err(RenderError::CopyOutOfBounds {
                offset,
                len: usize::try_from(size).unwrap_or(usize::MAX),
                size: capacity,
            });
        }
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::FillBuffer { buffer: record.native(), offset, size, data })?;
        Ok(())
    }

    /// Fills the whole buffer, rounded down to whole words.
    ///
    /// # Errors
    ///
    /// As [`Recorder::fill_buffer`].
    pub fn fill_whole_buffer(&mut self, buffer: BufferId, data: u32) -> RenderResult<()> {
        let size = self.renderer.buffer(buffer)?.desc().size & !3;
        self.fill_buffer(buffer, 0, size, data)
    }

    /// Copies mip 0 of `dst` from `src`, whose rows are laid out at the
    /// device copy pitch. `dst` must be in TRANSFER_DST.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InvalidArgument`] if `dst` is in another layout
    /// - [`RenderError::CopyOutOfBounds`] if `src` is too small
    /// - stale handles, backend failure
    pub fn copy_to_texture(&mut self, dst: TextureId, src: BufferId) -> RenderResult<()> {
        let desc = *self.renderer.texture(dst)?.desc();
        let pitch = self.renderer.upload_pitch(&desc);

        let r = &mut *self.renderer;
        let texture = r.textures.get(dst.0)?;
        if texture.layout() != ImageLayout::TransferDst {
            return Err(RenderError::InvalidArgument("copy destination must be in TRANSFER_DST"));
        }
        let buffer = r.buffers.get(src.0)?;
        let needed = u64::from(pitch) * u64::from(desc.height) * u64::from(desc.depth);
        if needed > buffer.desc().size {
            return Err(RenderError::CopyOutOfBounds {
                offset: 0,
                len: usize::try_from(needed).unwrap_or(usize::MAX),
                size: buffer.desc().size,
            });
        }

        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(
            list,
            Op::CopyBufferToTexture {
                src: buffer.native(),
                dst: texture.native(),
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
                bytes_per_row: pitch,
            },
        )?;
        Ok(())
    }

    /// Blits mip 0 of a 2-D texture over the whole active swap chain image
    /// and leaves the image in PRESENT_SRC.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] for a non-2-D source,
    /// [`RenderError::NoSwapChain`], stale handles or backend failure.
    pub fn copy_to_swap_chain(&mut self, src: TextureId) -> RenderResult<()> {
        let desc = *self.renderer.texture(src)?.desc();
        if desc.dimension != TextureDimension::D2 {
            return Err(RenderError::InvalidArgument("swap chain source must be a 2-D texture"));
        }

        self.swap_chain_barrier(ImageLayout::TransferDst)?;

        let r = &mut *self.renderer;
        let texture = r.textures.get(src.0)?;
        let image = r.swap_chain.active_image();
        let dst_extent = r.swap_chain.extent();
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(
            list,
            Op::BlitToSwapChain { src: texture.native(), src_extent: desc.extent(), image, dst_extent },
        )?;

        self.swap_chain_barrier(ImageLayout::PresentSrc)
    }

    // ========================================================================
    // Render passes
    // ========================================================================

    /// Opens a dynamic render pass over the given targets. The render area
    /// is the first color target's extent, or the depth target's.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] for no attachments or more than
    /// [`MAX_COLOR_ATTACHMENTS`] colors, stale handles, backend failure.
    pub fn bind_render_targets(&mut self, desc: &RenderTargetBindDesc) -> RenderResult<()> {
        if desc.colors.len() > MAX_COLOR_ATTACHMENTS {
            return Err(RenderError::InvalidArgument("too many color attachments"));
        }
        let Some(main) = desc.colors.first().or(desc.depth.as_ref()) else {
            return Err(RenderError::InvalidArgument("render pass has no attachments"));
        };

        let r = &mut *self.renderer;
        let area = Rect2d::from_extent(r.render_targets.get(main.target.0)?.desc().extent());

        let colors = desc
            .colors
            .iter()
            .map(|binding| attachment(&r.render_targets, &r.textures, binding))
            .collect::<RenderResult<SmallVec<_>>>()?;
        let depth = desc
            .depth
            .as_ref()
            .map(|binding| attachment(&r.render_targets, &r.textures, binding))
            .transpose()?;

        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::BeginRendering { colors, depth, area })?;
        Ok(())
    }

    /// Closes the open render pass.
    ///
    /// # Errors
    ///
    /// Backend failure.
    pub fn unbind_render_targets(&mut self) -> RenderResult<()> {
        self.emit(Op::EndRendering)
    }

    // ========================================================================
    // Pipeline state
    // ========================================================================

    /// # Errors
    ///
    /// Stale handle or backend failure.
    pub fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipelineId) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let record = r.graphics_pipelines.get(pipeline.0)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::BindGraphicsPipeline(record.native()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Stale handle or backend failure.
    pub fn bind_compute_pipeline(&mut self, pipeline: ComputePipelineId) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let record = r.compute_pipelines.get(pipeline.0)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::BindComputePipeline(record.native()))?;
        Ok(())
    }

    /// Binds `set` at `index` of a graphics pipeline's layout.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] if `index` is outside the layout,
    /// stale handles, backend failure.
    pub fn bind_descriptor_set(
        &mut self,
        pipeline: GraphicsPipelineId,
        set: DescriptorSetId,
        index: u32,
    ) -> RenderResult<()> {
        let sets = self.renderer.graphics_pipeline(pipeline)?.desc().descriptor_sets.len();
        self.bind_set(BindPoint::Graphics, sets, set, index)
    }

    /// Binds `set` at `index` of a compute pipeline's layout.
    ///
    /// # Errors
    ///
    /// As [`Recorder::bind_descriptor_set`].
    pub fn bind_compute_descriptor_set(
        &mut self,
        pipeline: ComputePipelineId,
        set: DescriptorSetId,
        index: u32,
    ) -> RenderResult<()> {
        let sets = self.renderer.compute_pipeline(pipeline)?.desc().descriptor_sets.len();
        self.bind_set(BindPoint::Compute, sets, set, index)
    }

    fn bind_set(
        &mut self,
        bind_point: BindPoint,
        layout_sets: usize,
        set: DescriptorSetId,
        index: u32,
    ) -> RenderResult<()> {
        if index as usize >= layout_sets {
            return Err(RenderError::InvalidArgument("descriptor set index outside the pipeline layout"));
        }
        let r = &mut *self.renderer;
        let record = r.descriptor_sets.get(set.0)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::BindDescriptorSet { bind_point, set: record.native(), index })?;
        Ok(())
    }

    /// Writes push constant `block` of a graphics pipeline.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] for an unknown block, empty data or
    /// data larger than the block.
    pub fn set_constants(&mut self, pipeline: GraphicsPipelineId, block: usize, data: &[u8]) -> RenderResult<()> {
        let blocks = &self.renderer.graphics_pipeline(pipeline)?.desc().constant_blocks;
        let stages = constant_stages(blocks, block, data)?;
        self.emit(Op::SetConstants { bind_point: BindPoint::Graphics, stages, data })
    }

    /// Writes push constant `block` of a compute pipeline.
    ///
    /// # Errors
    ///
    /// As [`Recorder::set_constants`].
    pub fn set_compute_constants(
        &mut self,
        pipeline: ComputePipelineId,
        block: usize,
        data: &[u8],
    ) -> RenderResult<()> {
        let blocks = &self.renderer.compute_pipeline(pipeline)?.desc().constant_blocks;
        let stages = constant_stages(blocks, block, data)?;
        self.emit(Op::SetConstants { bind_point: BindPoint::Compute, stages, data })
    }

    /// Depth range is always 0..1; reverse depth lives in the projection.
    ///
    /// # Errors
    ///
    /// Backend failure.
    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) -> RenderResult<()> {
        self.emit(Op::SetViewport(Viewport { x, y, width, height, min_depth: 0.0, max_depth: 1.0 }))
    }

    /// Viewport covering `target`.
    ///
    /// # Errors
    ///
    /// Stale handle or backend failure.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_viewport_to(&mut self, target: RenderTargetId) -> RenderResult<()> {
        let extent = self.renderer.render_target(target)?.desc().extent();
        self.set_viewport(0.0, 0.0, extent.width as f32, extent.height as f32)
    }

    /// # Errors
    ///
    /// Backend failure.
    pub fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) -> RenderResult<()> {
        self.emit(Op::SetScissor(Rect2d { x, y, width, height }))
    }

    /// Scissor covering `target`.
    ///
    /// # Errors
    ///
    /// Stale handle or backend failure.
    pub fn set_scissor_to(&mut self, target: RenderTargetId) -> RenderResult<()> {
        let extent = self.renderer.render_target(target)?.desc().extent();
        self.emit(Op::SetScissor(Rect2d::from_extent(extent)))
    }

    // ========================================================================
    // Geometry and dispatch
    // ========================================================================

    /// # Errors
    ///
    /// [`RenderError::WrongBufferType`] unless a vertex buffer.
    pub fn bind_vertex_buffer(&mut self, buffer: BufferId) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let record = r.buffers.get(buffer.0)?;
        expect_kind(record.desc().kind, BufferType::Vertex)?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::BindVertexBuffer(record.native()))?;
        Ok(())
    }

    /// Index width follows the buffer stride: 2 bytes is u16, anything else
    /// u32.
    ///
    /// # Errors
    ///
    /// [`RenderError::WrongBufferType`] unless an index buffer.
    pub fn bind_index_buffer(&mut self, buffer: BufferId) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let record = r.buffers.get(buffer.0)?;
        expect_kind(record.desc().kind, BufferType::Index)?;
        let index_type = if record.desc().stride == 2 { IndexType::U16 } else { IndexType::U32 };
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::BindIndexBuffer { buffer: record.native(), index_type })?;
        Ok(())
    }

    /// # Errors
    ///
    /// Backend failure.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) -> RenderResult<()> {
        self.emit(Op::Draw { vertex_count, instance_count })
    }

    /// # Errors
    ///
    /// Backend failure.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> RenderResult<()> {
        self.emit(Op::DrawIndexed { index_count, instance_count, first_index, vertex_offset })
    }

    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] if any group count is zero.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RenderResult<()> {
        if x == 0 || y == 0 || z == 0 {
            return Err(RenderError::InvalidArgument("dispatch group counts must be non-zero"));
        }
        self.emit(Op::Dispatch { x, y, z })
    }
}

fn attachment<'a, B: GpuBackend>(
    targets: &'a Pool<RenderTarget>,
    textures: &'a Pool<Texture<B>>,
    binding: &RenderTargetBinding,
) -> RenderResult<Attachment<'a, B>> {
    let target = targets.get(binding.target.0)?;
    let texture = textures.get(target.texture().0)?;
    Ok(Attachment {
        texture: texture.native(),
        layout: texture.layout(),
        load: binding.load,
        store: binding.store,
        clear: target.desc().clear,
    })
}

fn constant_stages(
    blocks: &[ConstantBlock],
    block: usize,
    data: &[u8],
) -> RenderResult<ShaderStages> {
    let Some(block) = blocks.get(block) else {
        return Err(RenderError::InvalidArgument("push-constant block out of range"));
    };
    if data.is_empty() || data.len() > block.size as usize {
        return Err(RenderError::InvalidArgument("push-constant data must fit its block"));
    }
    Ok(block.stages)
}

fn expect_kind(found: BufferType, expected: BufferType) -> RenderResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(RenderError::WrongBufferType { expected, found })
    }
}
