//! # Backend Seam
//!
//! The renderer core never talks to a native graphics API directly. It drives
//! a [`GpuBackend`], which owns the device and hands out native objects the
//! core stores in its pools.
//!
//! ```text
//! Renderer<B>                    B: GpuBackend
//! ┌──────────────────┐  create   ┌──────────────────┐
//! │ pools, ring,     │ ────────→ │ device, queue,   │
//! │ frame slots,     │  record   │ native objects   │
//! │ layout tracking  │ ────────→ │                  │
//! └──────────────────┘  submit   └──────────────────┘
//! ```
//!
//! Layout tracking, the command-buffer state machine and frame pacing live in
//! the core. Backends translate, allocate and execute.

pub mod headless;
#[cfg(feature = "wgpu-backend")]
pub mod native;

use smallvec::SmallVec;

use crate::device::DeviceInfo;
use crate::error::BackendResult;
use crate::resource::{
    BufferDesc, ComputePipelineDesc, DescriptorType, GraphicsPipelineDesc, SamplerDesc, ShaderDesc,
    TextureDesc,
};
use crate::types::{
    BindPoint, ClearValue, ColorSpace, Extent2d, Format, ImageLayout, IndexType, LoadOp,
    MemoryAccess, PipelineStage, PresentMode, Rect2d, SamplerFilter, ShaderStages, StoreOp,
    SurfaceFormat, Viewport,
};

/// Maximum color attachments bound at once.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// What the presentation surface supports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    /// Format/color-space pairs, in the surface's preference order.
    pub formats: Vec<SurfaceFormat>,
    /// Present modes, in the surface's preference order.
    pub present_modes: Vec<PresentMode>,
    /// Minimum swap chain length.
    pub min_image_count: u32,
    /// Maximum swap chain length. Zero means unbounded.
    pub max_image_count: u32,
    /// Extent the surface dictates, if any.
    pub current_extent: Option<Extent2d>,
}

/// Parameters the core chose for a swap chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainConfig {
    /// Image format.
    pub format: Format,
    /// Image color space.
    pub color_space: ColorSpace,
    /// Presentation mode.
    pub present_mode: PresentMode,
    /// Image size.
    pub extent: Extent2d,
    /// Requested image count.
    pub image_count: u32,
}

/// A resolved resource written into a descriptor binding.
pub enum BoundResource<'a, B: GpuBackend> {
    /// A whole buffer.
    Buffer {
        /// Native buffer.
        buffer: &'a B::Buffer,
        /// Bound range in bytes, from offset 0.
        size: u64,
    },
    /// A sampled texture in the given layout.
    Texture {
        /// Native texture.
        texture: &'a B::Texture,
        /// Layout the shader will read it in.
        layout: ImageLayout,
    },
    /// A sampler.
    Sampler(&'a B::Sampler),
}

/// One binding of a descriptor set, with its resources resolved.
pub struct DescriptorWrite<'a, B: GpuBackend> {
    /// Binding number. Equal to the descriptor's index in its set.
    pub binding: u32,
    /// Descriptor type.
    pub kind: DescriptorType,
    /// Resources, one per array element.
    pub resources: SmallVec<[BoundResource<'a, B>; 1]>,
}

/// A color or depth attachment for dynamic rendering.
pub struct Attachment<'a, B: GpuBackend> {
    /// Backing texture.
    pub texture: &'a B::Texture,
    /// Tracked layout the attachment is rendered in.
    pub layout: ImageLayout,
    /// Load behavior.
    pub load: LoadOp,
    /// Store behavior.
    pub store: StoreOp,
    /// Clear value used when `load` is [`LoadOp::Clear`].
    pub clear: ClearValue,
}

/// Synchronization for one queue submission.
pub struct SubmitSync<'a, B: GpuBackend> {
    /// Semaphore the GPU waits on before executing.
    pub wait: Option<&'a B::Semaphore>,
    /// Semaphore signaled when execution finishes.
    pub signal: Option<&'a B::Semaphore>,
    /// Fence signaled when execution finishes.
    pub fence: &'a B::Fence,
}

/// A single recorded command, referencing native objects.
///
/// Layout bookkeeping has already happened in the core by the time a backend
/// sees an op.
pub enum Op<'a, B: GpuBackend> {
    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------
    /// Global memory dependency.
    MemoryBarrier {
        /// Stages that must finish first.
        src_stage: PipelineStage,
        /// Stages that wait.
        dst_stage: PipelineStage,
        /// Writes made available.
        src_access: MemoryAccess,
        /// Accesses they become visible to.
        dst_access: MemoryAccess,
    },
    /// Layout transition of a mip range.
    TextureBarrier {
        /// Transitioned texture.
        texture: &'a B::Texture,
        /// Layout the range is in now.
        old: ImageLayout,
        /// Layout after the barrier.
        new: ImageLayout,
        /// First mip of the range.
        base_mip: u32,
        /// Mips in the range.
        mip_count: u32,
        /// Stages that must finish first.
        src_stage: PipelineStage,
        /// Stages that wait.
        dst_stage: PipelineStage,
        /// Writes made available.
        src_access: MemoryAccess,
        /// Accesses they become visible to.
        dst_access: MemoryAccess,
    },
    /// Layout transition of a swap chain image.
    SwapChainBarrier {
        /// Swap chain image index.
        image: u32,
        /// Layout the image is in now.
        old: ImageLayout,
        /// Layout after the barrier.
        new: ImageLayout,
    },

    // ------------------------------------------------------------------
    // Transfer
    // ------------------------------------------------------------------
    /// Clear a color texture outside a render pass.
    ClearColor {
        /// Cleared texture.
        texture: &'a B::Texture,
        /// Its tracked layout.
        layout: ImageLayout,
        /// RGBA clear color.
        color: [f32; 4],
    },
    /// Clear a depth texture outside a render pass.
    ClearDepth {
        /// Cleared texture.
        texture: &'a B::Texture,
        /// Its tracked layout.
        layout: ImageLayout,
        /// Depth written.
        depth: f32,
    },
    /// Fill a buffer range with a repeated 32-bit word.
    FillBuffer {
        /// Filled buffer.
        buffer: &'a B::Buffer,
        /// Start of the range, 4-byte aligned.
        offset: u64,
        /// Range length, a multiple of 4.
        size: u64,
        /// Repeated word.
        data: u32,
    },
    /// Copy tightly packed rows (padded to `bytes_per_row`) into mip 0.
    CopyBufferToTexture {
        /// Source buffer, read from offset 0.
        src: &'a B::Buffer,
        /// Destination texture, in `TransferDst`.
        dst: &'a B::Texture,
        /// Texels per row.
        width: u32,
        /// Rows per layer.
        height: u32,
        /// Layers.
        depth: u32,
        /// Source row pitch.
        bytes_per_row: u32,
    },
    /// Downsample one mip into the next.
    BlitMip {
        /// Texture holding both mips.
        texture: &'a B::Texture,
        /// Mip read, in `TransferSrc`.
        src_mip: u32,
        /// Mip written, in `TransferDst`.
        dst_mip: u32,
        /// Size of `src_mip`.
        src_extent: Extent2d,
        /// Size of `dst_mip`.
        dst_extent: Extent2d,
        /// Filter applied while scaling.
        filter: SamplerFilter,
    },
    /// Scale a texture onto a swap chain image.
    BlitToSwapChain {
        /// Source texture, in `TransferSrc`.
        src: &'a B::Texture,
        /// Size of the source.
        src_extent: Extent2d,
        /// Destination swap chain image.
        image: u32,
        /// Size of the swap chain.
        dst_extent: Extent2d,
    },

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------
    /// Open a dynamic render pass.
    BeginRendering {
        /// Color attachments, in shader output order.
        colors: SmallVec<[Attachment<'a, B>; MAX_COLOR_ATTACHMENTS]>,
        /// Depth attachment.
        depth: Option<Attachment<'a, B>>,
        /// Render area.
        area: Rect2d,
    },
    /// Close the open render pass.
    EndRendering,
    /// Bind a graphics pipeline.
    BindGraphicsPipeline(&'a B::GraphicsPipeline),
    /// Bind a compute pipeline.
    BindComputePipeline(&'a B::ComputePipeline),
    /// Bind a set to the layout of the currently bound pipeline.
    BindDescriptorSet {
        /// Pipeline kind the set is bound for.
        bind_point: BindPoint,
        /// Bound set.
        set: &'a B::DescriptorSet,
        /// Set index in the pipeline layout.
        index: u32,
    },
    /// Write push constants at offset 0.
    SetConstants {
        /// Pipeline kind the constants are set for.
        bind_point: BindPoint,
        /// Stages that see the constants.
        stages: ShaderStages,
        /// Constant bytes.
        data: &'a [u8],
    },
    /// Set the dynamic viewport.
    SetViewport(Viewport),
    /// Set the dynamic scissor.
    SetScissor(Rect2d),
    /// Bind a vertex buffer at slot 0.
    BindVertexBuffer(&'a B::Buffer),
    /// Bind an index buffer.
    BindIndexBuffer {
        /// Bound buffer.
        buffer: &'a B::Buffer,
        /// Index width.
        index_type: IndexType,
    },
    /// Non-indexed draw from vertex 0.
    Draw {
        /// Vertices per instance.
        vertex_count: u32,
        /// Instances.
        instance_count: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Indices per instance.
        index_count: u32,
        /// Instances.
        instance_count: u32,
        /// First index read.
        first_index: u32,
        /// Added to every index.
        vertex_offset: i32,
    },
    /// Compute dispatch.
    Dispatch {
        /// Workgroups along x.
        x: u32,
        /// Workgroups along y.
        y: u32,
        /// Workgroups along z.
        z: u32,
    },

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------
    /// Mark the first `count` queries of `pool` unavailable.
    ResetQueries {
        /// Reset pool.
        pool: &'a B::QueryPool,
        /// Queries reset, from index 0.
        count: u32,
    },
    /// Write the GPU clock into query `index` once prior work completes.
    WriteTimestamp {
        /// Written pool.
        pool: &'a B::QueryPool,
        /// Query written.
        index: u32,
    },
}

/// A native graphics API, as seen by the renderer core.
///
/// Every method runs on the render thread. Objects passed back to `destroy_*`
/// are guaranteed by the core to be idle on the GPU only if the caller
/// drained first; backends may rely on that.
pub trait GpuBackend: Sized {
    /// Native buffer.
    type Buffer;
    /// Native texture, including its default view.
    type Texture;
    /// Native sampler.
    type Sampler;
    /// Native shader module.
    type Shader;
    /// Native descriptor set and its layout.
    type DescriptorSet;
    /// Native graphics pipeline and its layout.
    type GraphicsPipeline;
    /// Native compute pipeline and its layout.
    type ComputePipeline;
    /// Native command buffer.
    type CommandList;
    /// GPU→CPU completion signal.
    type Fence;
    /// GPU→GPU ordering signal.
    type Semaphore;
    /// Fixed-size pool of timestamp queries.
    type QueryPool;

    // ========================================================================
    // Device
    // ========================================================================

    /// Adapter name and limits.
    fn device_info(&self) -> &DeviceInfo;

    /// Blocks until the queue is empty.
    ///
    /// # Errors
    ///
    /// Native failure, or `WouldBlock` from a non-blocking backend.
    fn wait_idle(&mut self) -> BackendResult<()>;

    // ========================================================================
    // Swap chain
    // ========================================================================

    /// What the presentation surface supports right now.
    fn surface_capabilities(&self) -> SurfaceCapabilities;

    /// Creates the native swap chain. Returns the actual image count.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_swap_chain(&mut self, config: &SwapChainConfig) -> BackendResult<u32>;

    /// Releases the native swap chain. A no-op if there is none.
    fn destroy_swap_chain(&mut self);

    /// Requests the next image, signaling `signal` when it is ready.
    ///
    /// # Errors
    ///
    /// Native failure or a semaphore misuse.
    fn acquire_next_image(&mut self, signal: &Self::Semaphore) -> BackendResult<u32>;

    /// Queues `image` for presentation once `wait` is signaled.
    ///
    /// # Errors
    ///
    /// Native failure or a semaphore misuse.
    fn present(&mut self, image: u32, wait: &Self::Semaphore) -> BackendResult<()>;

    // ========================================================================
    // Resources
    // ========================================================================

    /// Creates a host-visible buffer.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<Self::Buffer>;

    /// Destroys a buffer.
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Host write into a buffer. Bounds are checked by the core.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> BackendResult<()>;

    /// Creates a texture and its default view.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<Self::Texture>;

    /// Destroys a texture.
    fn destroy_texture(&mut self, texture: Self::Texture);

    /// Creates a sampler.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_sampler(&mut self, desc: &SamplerDesc) -> BackendResult<Self::Sampler>;

    /// Destroys a sampler.
    fn destroy_sampler(&mut self, sampler: Self::Sampler);

    /// Creates a shader module from SPIR-V.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_shader(&mut self, desc: &ShaderDesc) -> BackendResult<Self::Shader>;

    /// Destroys a shader module.
    fn destroy_shader(&mut self, shader: Self::Shader);

    /// Creates a descriptor set layout and a set populated with `writes`.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_descriptor_set(
        &mut self,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> BackendResult<Self::DescriptorSet>;

    /// Destroys a descriptor set.
    fn destroy_descriptor_set(&mut self, set: Self::DescriptorSet);

    /// Creates a graphics pipeline.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
        sets: &[&Self::DescriptorSet],
    ) -> BackendResult<Self::GraphicsPipeline>;

    /// Destroys a graphics pipeline.
    fn destroy_graphics_pipeline(&mut self, pipeline: Self::GraphicsPipeline);

    /// Creates a compute pipeline.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDesc,
        compute: &Self::Shader,
        sets: &[&Self::DescriptorSet],
    ) -> BackendResult<Self::ComputePipeline>;

    /// Destroys a compute pipeline.
    fn destroy_compute_pipeline(&mut self, pipeline: Self::ComputePipeline);

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Creates a fence, optionally already signaled.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_fence(&mut self, signaled: bool) -> BackendResult<Self::Fence>;

    /// Destroys a fence.
    fn destroy_fence(&mut self, fence: Self::Fence);

    /// Blocks until `fence` is signaled.
    ///
    /// # Errors
    ///
    /// Native failure, or `WouldBlock` from a non-blocking backend.
    fn wait_fence(&mut self, fence: &Self::Fence) -> BackendResult<()>;

    /// Polls `fence` without blocking.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn fence_signaled(&mut self, fence: &Self::Fence) -> BackendResult<bool>;

    /// Returns `fence` to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn reset_fence(&mut self, fence: &Self::Fence) -> BackendResult<()>;

    /// Creates a binary semaphore.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_semaphore(&mut self) -> BackendResult<Self::Semaphore>;

    /// Destroys a semaphore.
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);

    // ========================================================================
    // Queries
    // ========================================================================

    /// Creates a pool of `count` timestamp queries.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unsupported`](crate::error::BackendError::Unsupported)
    /// if the device cannot write timestamps, or native failure.
    fn create_query_pool(&mut self, count: u32) -> BackendResult<Self::QueryPool>;

    /// Destroys a query pool.
    fn destroy_query_pool(&mut self, pool: Self::QueryPool);

    /// Copies the first `results.len()` timestamps of `pool`, in ticks.
    /// Multiply by [`DeviceLimits::timestamp_period`](crate::device::DeviceLimits::timestamp_period)
    /// for nanoseconds. The work that wrote them must have completed.
    ///
    /// # Errors
    ///
    /// `WouldBlock` if a query has not been written, or native failure.
    fn read_timestamps(&mut self, pool: &Self::QueryPool, results: &mut [u64]) -> BackendResult<()>;

    // ========================================================================
    // Command lists
    // ========================================================================

    /// Allocates a command list.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn create_command_list(&mut self) -> BackendResult<Self::CommandList>;

    /// Frees a command list.
    fn destroy_command_list(&mut self, list: Self::CommandList);

    /// Discards everything recorded into `list`.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn reset_command_list(&mut self, list: &mut Self::CommandList) -> BackendResult<()>;

    /// Opens `list` for recording.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn begin_command_list(&mut self, list: &mut Self::CommandList) -> BackendResult<()>;

    /// Closes `list`.
    ///
    /// # Errors
    ///
    /// Native failure.
    fn end_command_list(&mut self, list: &mut Self::CommandList) -> BackendResult<()>;

    /// Appends `op` to an open list.
    ///
    /// # Errors
    ///
    /// The backend cannot express the op.
    fn record(&self, list: &mut Self::CommandList, op: Op<'_, Self>) -> BackendResult<()>;

    /// Submits a closed list to the queue.
    ///
    /// # Errors
    ///
    /// Native failure or a semaphore misuse.
    fn submit(&mut self, list: &mut Self::CommandList, sync: SubmitSync<'_, Self>) -> BackendResult<()>;
}
