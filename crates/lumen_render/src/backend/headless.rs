//! # Headless Backend
//!
//! A deterministic software stand-in for a GPU queue. Nothing is rendered;
//! what matters is that every object, fence and semaphore behaves the way
//! the core expects, so pacing and lifecycle logic can be tested without a
//! device.
//!
//! ## Completion
//!
//! By default a submission completes as soon as it is submitted. With
//! [`HeadlessBackend::manual_completion`] submissions queue up until
//! [`HeadlessBackend::complete_oldest`] or [`HeadlessBackend::complete_all`]
//! runs them. A wait that would have to block returns
//! [`BackendError::WouldBlock`] instead.
//!
//! ## Semaphores
//!
//! Binary semaphores are checked: waiting on one nobody signaled is
//! [`BackendError::SemaphoreNotSignaled`], signaling one twice is
//! [`BackendError::SemaphoreAlreadySignaled`]. Submissions signal at submit
//! time, since the queue executes in order.
//!
//! ## Timestamps
//!
//! The GPU clock starts at zero and advances [`TIMESTAMP_TICKS`] for every
//! timestamp executed, with a period of one nanosecond per tick.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use super::{DescriptorWrite, GpuBackend, Op, SubmitSync, SurfaceCapabilities, SwapChainConfig};
use crate::device::{
    select_adapter, AdapterCandidate, AdapterFeatures, AdapterKind, DeviceInfo, DeviceLimits,
    DeviceRequirements, QueueFamily,
};
use crate::error::{BackendError, BackendResult};
use crate::resource::{
    BufferDesc, ComputePipelineDesc, GraphicsPipelineDesc, SamplerDesc, ShaderDesc, ShaderStage,
    TextureDesc,
};
use crate::types::{
    BindPoint, ColorSpace, Extent2d, Format, ImageLayout, IndexType, PresentMode, Rect2d,
    SurfaceFormat, Viewport,
};

/// Identity of a headless object. Unique for the backend's lifetime.
pub type ObjectId = u32;

/// Clock ticks between two executed timestamps.
pub const TIMESTAMP_TICKS: u64 = 100_000;

/// Headless buffer. Contents live in the backend.
#[derive(Debug)]
pub struct HeadlessBuffer {
    id: ObjectId,
    size: u64,
}

impl HeadlessBuffer {
    /// Object id.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// Headless texture.
#[derive(Debug)]
pub struct HeadlessTexture {
    id: ObjectId,
    extent: Extent2d,
    mip_count: u32,
}

impl HeadlessTexture {
    /// Object id.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Size of mip 0.
    #[must_use]
    pub const fn extent(&self) -> Extent2d {
        self.extent
    }

    /// Mip levels.
    #[must_use]
    pub const fn mip_count(&self) -> u32 {
        self.mip_count
    }
}

/// Headless shader module.
#[derive(Debug)]
pub struct HeadlessShader {
    id: ObjectId,
    stage: ShaderStage,
}

impl HeadlessShader {
    /// Object id.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Stage the module was created for.
    #[must_use]
    pub const fn stage(&self) -> ShaderStage {
        self.stage
    }
}

/// Headless descriptor set.
#[derive(Debug)]
pub struct HeadlessDescriptorSet {
    id: ObjectId,
    bindings: u32,
}

impl HeadlessDescriptorSet {
    /// Object id.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Bindings written at creation.
    #[must_use]
    pub const fn bindings(&self) -> u32 {
        self.bindings
    }
}

/// Any other headless object: samplers, pipelines, sync objects.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct HeadlessObject(ObjectId);

impl HeadlessObject {
    /// Object id.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.0
    }
}

/// A recorded command with native references replaced by object ids.
///
/// Variants and their fields mirror [`Op`]; fields the simulation does not
/// need are dropped.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum HeadlessOp {
    MemoryBarrier,
    TextureBarrier { texture: ObjectId, old: ImageLayout, new: ImageLayout, base_mip: u32, mip_count: u32 },
    SwapChainBarrier { image: u32, old: ImageLayout, new: ImageLayout },
    ClearColor { texture: ObjectId, color: [f32; 4] },
    ClearDepth { texture: ObjectId, depth: f32 },
    FillBuffer { buffer: ObjectId, offset: u64, size: u64, data: u32 },
    /// `rows` counts every row of every layer.
    CopyBufferToTexture { src: ObjectId, dst: ObjectId, bytes_per_row: u32, rows: u32 },
    BlitMip { texture: ObjectId, src_mip: u32, dst_mip: u32, dst_extent: Extent2d },
    BlitToSwapChain { src: ObjectId, image: u32, dst_extent: Extent2d },
    BeginRendering { colors: Vec<ObjectId>, depth: Option<ObjectId>, area: Rect2d },
    EndRendering,
    BindGraphicsPipeline(ObjectId),
    BindComputePipeline(ObjectId),
    BindDescriptorSet { bind_point: BindPoint, set: ObjectId, index: u32 },
    /// Only the length of the constant data is kept.
    SetConstants { bind_point: BindPoint, len: usize },
    SetViewport(Viewport),
    SetScissor(Rect2d),
    BindVertexBuffer(ObjectId),
    BindIndexBuffer { buffer: ObjectId, index_type: IndexType },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    ResetQueries { pool: ObjectId, count: u32 },
    WriteTimestamp { pool: ObjectId, index: u32 },
}

impl HeadlessOp {
    fn from_op(op: &Op<'_, HeadlessBackend>) -> Self {
        match op {
            Op::MemoryBarrier { .. } => Self::MemoryBarrier,
            Op::TextureBarrier { texture, old, new, base_mip, mip_count, .. } => Self::TextureBarrier {
                texture: texture.id,
                old: *old,
                new: *new,
                base_mip: *base_mip,
                mip_count: *mip_count,
            },
            Op::SwapChainBarrier { image, old, new } => {
                Self::SwapChainBarrier { image: *image, old: *old, new: *new }
            }
            Op::ClearColor { texture, color, .. } => Self::ClearColor { texture: texture.id, color: *color },
            Op::ClearDepth { texture, depth, .. } => Self::ClearDepth { texture: texture.id, depth: *depth },
            Op::FillBuffer { buffer, offset, size, data } => {
                Self::FillBuffer { buffer: buffer.id, offset: *offset, size: *size, data: *data }
            }
            Op::CopyBufferToTexture { src, dst, height, depth, bytes_per_row, .. } => {
                Self::CopyBufferToTexture {
                    src: src.id,
                    dst: dst.id,
                    bytes_per_row: *bytes_per_row,
                    rows: height * depth,
                }
            }
            Op::BlitMip { texture, src_mip, dst_mip, dst_extent, .. } => Self::BlitMip {
                texture: texture.id,
                src_mip: *src_mip,
                dst_mip: *dst_mip,
                dst_extent: *dst_extent,
            },
            Op::BlitToSwapChain { src, image, dst_extent, .. } => {
                Self::BlitToSwapChain { src: src.id, image: *image, dst_extent: *dst_extent }
            }
            Op::BeginRendering { colors, depth, area } => Self::BeginRendering {
                colors: colors.iter().map(|a| a.texture.id).collect(),
                depth: depth.as_ref().map(|a| a.texture.id),
                area: *area,
            },
            Op::EndRendering => Self::EndRendering,
            Op::BindGraphicsPipeline(pipeline) => Self::BindGraphicsPipeline(pipeline.0),
            Op::BindComputePipeline(pipeline) => Self::BindComputePipeline(pipeline.0),
            Op::BindDescriptorSet { bind_point, set, index } => {
                Self::BindDescriptorSet { bind_point: *bind_point, set: set.id, index: *index }
            }
            Op::SetConstants { bind_point, data, .. } => {
                Self::SetConstants { bind_point: *bind_point, len: data.len() }
            }
            Op::SetViewport(viewport) => Self::SetViewport(*viewport),
            Op::SetScissor(rect) => Self::SetScissor(*rect),
            Op::BindVertexBuffer(buffer) => Self::BindVertexBuffer(buffer.id),
            Op::BindIndexBuffer { buffer, index_type } => {
                Self::BindIndexBuffer { buffer: buffer.id, index_type: *index_type }
            }
            Op::Draw { vertex_count, instance_count } => {
                Self::Draw { vertex_count: *vertex_count, instance_count: *instance_count }
            }
            Op::DrawIndexed { index_count, instance_count, .. } => {
                Self::DrawIndexed { index_count: *index_count, instance_count: *instance_count }
            }
            Op::Dispatch { x, y, z } => Self::Dispatch { x: *x, y: *y, z: *z },
            Op::ResetQueries { pool, count } => Self::ResetQueries { pool: pool.0, count: *count },
            Op::WriteTimestamp { pool, index } => Self::WriteTimestamp { pool: pool.0, index: *index },
        }
    }
}

/// A headless command list.
#[derive(Debug, Default)]
pub struct HeadlessCommandList {
    id: ObjectId,
    open: bool,
    ops: Vec<HeadlessOp>,
}

impl HeadlessCommandList {
    /// Ops recorded since the last reset.
    #[must_use]
    pub fn ops(&self) -> &[HeadlessOp] {
        &self.ops
    }
}

/// Work submitted but not yet completed.
#[derive(Debug)]
struct Submission {
    fence: ObjectId,
    ops: Vec<HeadlessOp>,
}

#[derive(Debug)]
struct HeadlessSwapChain {
    image_count: u32,
    next_image: u32,
}

/// Deterministic software backend. See the module docs.
#[derive(Debug)]
pub struct HeadlessBackend {
    info: DeviceInfo,
    manual: bool,
    surface: bool,
    surface_extent: Option<Extent2d>,
    next_id: ObjectId,
    live: usize,

    buffers: HashMap<ObjectId, Vec<u8>>,
    fences: HashMap<ObjectId, bool>,
    semaphores: HashMap<ObjectId, bool>,
    queries: HashMap<ObjectId, Vec<Option<u64>>>,
    clock: u64,
    pending: VecDeque<Submission>,

    swap_chain: Option<HeadlessSwapChain>,
    last_submission: Vec<HeadlessOp>,
    submissions: u64,
    presents: u64,
}

impl HeadlessBackend {
    /// Selects the built-in headless adapter.
    ///
    /// # Errors
    ///
    /// [`BackendError::NoSuitableAdapter`] if `requirements` reject it.
    pub fn new(requirements: &DeviceRequirements) -> BackendResult<Self> {
        Self::with_adapters(&[default_adapter()], requirements)
    }

    /// Selects from a custom adapter list, as a native backend would from
    /// its enumeration.
    ///
    /// # Errors
    ///
    /// [`BackendError::NoSuitableAdapter`] if nothing qualifies.
    pub fn with_adapters(
        adapters: &[AdapterCandidate],
        requirements: &DeviceRequirements,
    ) -> BackendResult<Self> {
        let selection = select_adapter(adapters, requirements)?;
        let name = adapters[selection.adapter].name.clone();
        trace!(adapter = %name, queue_family = selection.queue_family, "headless adapter selected");

        Ok(Self {
            info: DeviceInfo { name, limits: DeviceLimits::default() },
            manual: false,
            surface: true,
            surface_extent: None,
            next_id: 1,
            live: 0,
            buffers: HashMap::new(),
            fences: HashMap::new(),
            semaphores: HashMap::new(),
            queries: HashMap::new(),
            clock: 0,
            pending: VecDeque::new(),
            swap_chain: None,
            last_submission: Vec::new(),
            submissions: 0,
            presents: 0,
        })
    }

    /// Submissions stay pending until completed explicitly.
    #[must_use]
    pub const fn manual_completion(mut self) -> Self {
        self.manual = true;
        self
    }

    /// Switches completion mode on a live backend. Turning manual
    /// completion off does not run submissions already pending.
    pub fn set_manual_completion(&mut self, manual: bool) {
        self.manual = manual;
    }

    /// The surface reports no formats and no present modes.
    #[must_use]
    pub const fn without_surface(mut self) -> Self {
        self.surface = false;
        self
    }

    /// Overrides the device limits.
    #[must_use]
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.info.limits = limits;
        self
    }

    /// Makes the surface dictate `extent`, as a window that was resized
    /// does. `None` lets the renderer choose.
    pub fn set_surface_extent(&mut self, extent: Option<Extent2d>) {
        self.surface_extent = extent;
    }

    /// Completes the oldest pending submission. Returns false if nothing
    /// was pending.
    pub fn complete_oldest(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(submission) => {
                self.execute(submission);
                true
            }
            None => false,
        }
    }

    /// Completes every pending submission in order.
    pub fn complete_all(&mut self) {
        while self.complete_oldest() {}
    }

    /// Submissions waiting for completion.
    #[must_use]
    pub fn pending_submissions(&self) -> usize {
        self.pending.len()
    }

    /// Native objects currently alive, command lists and sync objects
    /// included. Zero after a clean teardown.
    #[must_use]
    pub const fn live_objects(&self) -> usize {
        self.live
    }

    /// Ops of the most recent submission.
    #[must_use]
    pub fn last_submission(&self) -> &[HeadlessOp] {
        &self.last_submission
    }

    /// Total submissions.
    #[must_use]
    pub const fn submission_count(&self) -> u64 {
        self.submissions
    }

    /// Total presents.
    #[must_use]
    pub const fn present_count(&self) -> u64 {
        self.presents
    }

    /// Contents of `buffer` as completed work left them.
    #[must_use]
    pub fn buffer_contents(&self, buffer: &HeadlessBuffer) -> &[u8] {
        self.buffers.get(&buffer.id).map_or(&[], Vec::as_slice)
    }

    fn alloc_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        self.live += 1;
        id
    }

    fn release(&mut self) {
        self.live = self.live.saturating_sub(1);
    }

    fn signal(&mut self, semaphore: ObjectId) -> BackendResult<()> {
        let state = self
            .semaphores
            .get_mut(&semaphore)
            .ok_or_else(|| BackendError::Native(format!("unknown semaphore {semaphore}")))?;
        if *state {
            return Err(BackendError::SemaphoreAlreadySignaled);
        }
        *state = true;
        Ok(())
    }

    fn consume(&mut self, semaphore: ObjectId) -> BackendResult<()> {
        let state = self
            .semaphores
            .get_mut(&semaphore)
            .ok_or_else(|| BackendError::Native(format!("unknown semaphore {semaphore}")))?;
        if !*state {
            return Err(BackendError::SemaphoreNotSignaled);
        }
        *state = false;
        Ok(())
    }

    /// Runs the ops with host-visible effects and signals the fence.
    fn execute(&mut self, submission: Submission) {
        for op in &submission.ops {
            match *op {
                HeadlessOp::FillBuffer { buffer, offset, size, data } => {
                    if let Some(contents) = self.buffers.get_mut(&buffer) {
                        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(contents.len());
                        let end =
                            usize::try_from(offset.saturating_add(size)).unwrap_or(usize::MAX).min(contents.len());
                        for (i, byte) in contents[start..end].iter_mut().enumerate() {
                            *byte = data.to_le_bytes()[i % 4];
                        }
                    }
                }
                HeadlessOp::ResetQueries { pool, count } => {
                    if let Some(queries) = self.queries.get_mut(&pool) {
                        queries.iter_mut().take(count as usize).for_each(|query| *query = None);
                    }
                }
                HeadlessOp::WriteTimestamp { pool, index } => {
                    self.clock += TIMESTAMP_TICKS;
                    if let Some(query) = self.queries.get_mut(&pool).and_then(|q| q.get_mut(index as usize)) {
                        *query = Some(self.clock);
                    }
                }
                _ => {}
            }
        }
        if let Some(signaled) = self.fences.get_mut(&submission.fence) {
            *signaled = true;
        }
    }
}

fn default_adapter() -> AdapterCandidate {
    AdapterCandidate {
        name: "headless".to_owned(),
        kind: AdapterKind::Discrete,
        api_version: (1, 3),
        features: AdapterFeatures { sampler_anisotropy: true, fill_mode_non_solid: true, wide_lines: true },
        has_swap_chain_extension: true,
        surface_format_count: 2,
        present_mode_count: 2,
        queue_families: vec![QueueFamily { graphics: true, compute: true, present: true }],
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type Sampler = HeadlessObject;
    type Shader = HeadlessShader;
    type DescriptorSet = HeadlessDescriptorSet;
    type GraphicsPipeline = HeadlessObject;
    type ComputePipeline = HeadlessObject;
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessObject;
    type Semaphore = HeadlessObject;
    type QueryPool = HeadlessObject;

    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(BackendError::WouldBlock { what: "queue idle" })
        }
    }

    fn surface_capabilities(&self) -> SurfaceCapabilities {
        if !self.surface {
            return SurfaceCapabilities {
                formats: Vec::new(),
                present_modes: Vec::new(),
                min_image_count: 0,
                max_image_count: 0,
                current_extent: None,
            };
        }
        SurfaceCapabilities {
            formats: vec![
                SurfaceFormat { format: Format::Bgra8Unorm, color_space: ColorSpace::SrgbNonLinear },
                SurfaceFormat { format: Format::Rgba8Unorm, color_space: ColorSpace::SrgbNonLinear },
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            min_image_count: 2,
            max_image_count: 4,
            current_extent: self.surface_extent,
        }
    }

    fn create_swap_chain(&mut self, config: &SwapChainConfig) -> BackendResult<u32> {
        if config.image_count == 0 {
            return Err(BackendError::Native("swap chain needs at least one image".into()));
        }
        self.swap_chain = Some(HeadlessSwapChain { image_count: config.image_count, next_image: 0 });
        Ok(config.image_count)
    }

    fn destroy_swap_chain(&mut self) {
        self.swap_chain = None;
    }

    fn acquire_next_image(&mut self, signal: &HeadlessObject) -> BackendResult<u32> {
        let chain = self
            .swap_chain
            .as_mut()
            .ok_or_else(|| BackendError::Native("no swap chain".into()))?;
        let image = chain.next_image;
        chain.next_image = (image + 1) % chain.image_count;
        self.signal(signal.0)?;
        Ok(image)
    }

    fn present(&mut self, image: u32, wait: &HeadlessObject) -> BackendResult<()> {
        let count = self
            .swap_chain
            .as_ref()
            .map(|chain| chain.image_count)
            .ok_or_else(|| BackendError::Native("no swap chain".into()))?;
        if image >= count {
            return Err(BackendError::Native(format!("image {image} out of range")));
        }
        self.consume(wait.0)?;
        self.presents += 1;
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<HeadlessBuffer> {
        let len = usize::try_from(desc.size)
            .map_err(|_| BackendError::Native("buffer larger than host memory".into()))?;
        let id = self.alloc_id();
        self.buffers.insert(id, vec![0; len]);
        Ok(HeadlessBuffer { id, size: desc.size })
    }

    fn destroy_buffer(&mut self, buffer: HeadlessBuffer) {
        self.buffers.remove(&buffer.id);
        self.release();
    }

    fn write_buffer(&mut self, buffer: &HeadlessBuffer, offset: u64, data: &[u8]) -> BackendResult<()> {
        let contents = self
            .buffers
            .get_mut(&buffer.id)
            .ok_or_else(|| BackendError::Native(format!("unknown buffer {}", buffer.id)))?;
        let start = usize::try_from(offset)
            .map_err(|_| BackendError::Native("write offset out of range".into()))?;
        let target = contents
            .get_mut(start..start + data.len())
            .ok_or_else(|| BackendError::Native("write past the end of the buffer".into()))?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<HeadlessTexture> {
        Ok(HeadlessTexture { id: self.alloc_id(), extent: desc.extent(), mip_count: desc.mip_count })
    }

    fn destroy_texture(&mut self, _texture: HeadlessTexture) {
        self.release();
    }

    fn create_sampler(&mut self, _desc: &SamplerDesc) -> BackendResult<HeadlessObject> {
        Ok(HeadlessObject(self.alloc_id()))
    }

    fn destroy_sampler(&mut self, _sampler: HeadlessObject) {
        self.release();
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> BackendResult<HeadlessShader> {
        Ok(HeadlessShader { id: self.alloc_id(), stage: desc.stage })
    }

    fn destroy_shader(&mut self, _shader: HeadlessShader) {
        self.release();
    }

    fn create_descriptor_set(
        &mut self,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> BackendResult<HeadlessDescriptorSet> {
        let bindings = u32::try_from(writes.len())
            .map_err(|_| BackendError::Unsupported("too many bindings".into()))?;
        Ok(HeadlessDescriptorSet { id: self.alloc_id(), bindings })
    }

    fn destroy_descriptor_set(&mut self, _set: HeadlessDescriptorSet) {
        self.release();
    }

    fn create_graphics_pipeline(
        &mut self,
        _desc: &GraphicsPipelineDesc,
        vertex: &HeadlessShader,
        fragment: &HeadlessShader,
        _sets: &[&HeadlessDescriptorSet],
    ) -> BackendResult<HeadlessObject> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(BackendError::Native("shader stage mismatch".into()));
        }
        Ok(HeadlessObject(self.alloc_id()))
    }

    fn destroy_graphics_pipeline(&mut self, _pipeline: HeadlessObject) {
        self.release();
    }

    fn create_compute_pipeline(
        &mut self,
        _desc: &ComputePipelineDesc,
        compute: &HeadlessShader,
        _sets: &[&HeadlessDescriptorSet],
    ) -> BackendResult<HeadlessObject> {
        if compute.stage != ShaderStage::Compute {
            return Err(BackendError::Native("shader stage mismatch".into()));
        }
        Ok(HeadlessObject(self.alloc_id()))
    }

    fn destroy_compute_pipeline(&mut self, _pipeline: HeadlessObject) {
        self.release();
    }

    fn create_fence(&mut self, signaled: bool) -> BackendResult<HeadlessObject> {
        let id = self.alloc_id();
        self.fences.insert(id, signaled);
        Ok(HeadlessObject(id))
    }

    fn destroy_fence(&mut self, fence: HeadlessObject) {
        self.fences.remove(&fence.0);
        self.release();
    }

    fn wait_fence(&mut self, fence: &HeadlessObject) -> BackendResult<()> {
        if self.fence_signaled(fence)? {
            Ok(())
        } else {
            Err(BackendError::WouldBlock { what: "fence" })
        }
    }

    fn fence_signaled(&mut self, fence: &HeadlessObject) -> BackendResult<bool> {
        self.fences
            .get(&fence.0)
            .copied()
            .ok_or_else(|| BackendError::Native(format!("unknown fence {}", fence.0)))
    }

    fn reset_fence(&mut self, fence: &HeadlessObject) -> BackendResult<()> {
        let signaled = self
            .fences
            .get_mut(&fence.0)
            .ok_or_else(|| BackendError::Native(format!("unknown fence {}", fence.0)))?;
        *signaled = false;
        Ok(())
    }

    fn create_semaphore(&mut self) -> BackendResult<HeadlessObject> {
        let id = self.alloc_id();
        self.semaphores.insert(id, false);
        Ok(HeadlessObject(id))
    }

    fn destroy_semaphore(&mut self, semaphore: HeadlessObject) {
        self.semaphores.remove(&semaphore.0);
        self.release();
    }

    fn create_query_pool(&mut self, count: u32) -> BackendResult<HeadlessObject> {
        if count == 0 {
            return Err(BackendError::Native("query pool needs at least one query".into()));
        }
        let id = self.alloc_id();
        self.queries.insert(id, vec![None; count as usize]);
        Ok(HeadlessObject(id))
    }

    fn destroy_query_pool(&mut self, pool: HeadlessObject) {
        self.queries.remove(&pool.0);
        self.release();
    }

    fn read_timestamps(&mut self, pool: &HeadlessObject, results: &mut [u64]) -> BackendResult<()> {
        let queries = self
            .queries
            .get(&pool.0)
            .ok_or_else(|| BackendError::Native(format!("unknown query pool {}", pool.0)))?;
        if results.len() > queries.len() {
            return Err(BackendError::Native(format!("query pool {} holds {} queries", pool.0, queries.len())));
        }
        for (result, query) in results.iter_mut().zip(queries) {
            *result = query.ok_or(BackendError::WouldBlock { what: "timestamp query" })?;
        }
        Ok(())
    }

    fn create_command_list(&mut self) -> BackendResult<HeadlessCommandList> {
        Ok(HeadlessCommandList { id: self.alloc_id(), open: false, ops: Vec::new() })
    }

    fn destroy_command_list(&mut self, _list: HeadlessCommandList) {
        self.release();
    }

    fn reset_command_list(&mut self, list: &mut HeadlessCommandList) -> BackendResult<()> {
        list.open = false;
        list.ops.clear();
        Ok(())
    }

    fn begin_command_list(&mut self, list: &mut HeadlessCommandList) -> BackendResult<()> {
        list.open = true;
        Ok(())
    }

    fn end_command_list(&mut self, list: &mut HeadlessCommandList) -> BackendResult<()> {
        list.open = false;
        Ok(())
    }

    fn record(&self, list: &mut HeadlessCommandList, op: Op<'_, Self>) -> BackendResult<()> {
        if !list.open {
            return Err(BackendError::Native(format!("command list {} is not open", list.id)));
        }
        list.ops.push(HeadlessOp::from_op(&op));
        Ok(())
    }

    fn submit(&mut self, list: &mut HeadlessCommandList, sync: SubmitSync<'_, Self>) -> BackendResult<()> {
        if list.open {
            return Err(BackendError::Native(format!("command list {} is still open", list.id)));
        }
        if let Some(wait) = sync.wait {
            self.consume(wait.0)?;
        }
        if let Some(signal) = sync.signal {
            self.signal(signal.0)?;
        }

        self.submissions += 1;
        self.last_submission.clone_from(&list.ops);
        let submission = Submission { fence: sync.fence.0, ops: std::mem::take(&mut list.ops) };
        if self.manual {
            self.pending.push_back(submission);
        } else {
            self.execute(submission);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HeadlessBackend {
        HeadlessBackend::new(&DeviceRequirements::default()).unwrap()
    }

    #[test]
    fn test_default_adapter_meets_default_requirements() {
        let backend = backend();
        assert_eq!(backend.device_info().name, "headless");
        assert_eq!(backend.device_info().limits.min_uniform_buffer_offset_alignment, 256);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn test_semaphore_needs_signal_before_wait() {
        let mut backend = backend();
        let semaphore = backend.create_semaphore().unwrap();
        assert_eq!(backend.consume(semaphore.0), Err(BackendError::SemaphoreNotSignaled));

        backend.signal(semaphore.0).unwrap();
        assert_eq!(backend.signal(semaphore.0), Err(BackendError::SemaphoreAlreadySignaled));
        backend.consume(semaphore.0).unwrap();
        backend.destroy_semaphore(semaphore);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn test_manual_completion_holds_fences() {
        let mut backend = backend().manual_completion();
        let fence = backend.create_fence(false).unwrap();
        let mut list = backend.create_command_list().unwrap();
        backend.begin_command_list(&mut list).unwrap();
        backend.record(&mut list, Op::Dispatch { x: 1, y: 1, z: 1 }).unwrap();
        backend.end_command_list(&mut list).unwrap();

        let sync = SubmitSync { wait: None, signal: None, fence: &fence };
        backend.submit(&mut list, sync).unwrap();
        assert_eq!(backend.wait_fence(&fence), Err(BackendError::WouldBlock { what: "fence" }));
        assert_eq!(backend.wait_idle(), Err(BackendError::WouldBlock { what: "queue idle" }));
        assert_eq!(backend.last_submission(), &[HeadlessOp::Dispatch { x: 1, y: 1, z: 1 }]);

        assert!(backend.complete_oldest());
        assert!(!backend.complete_oldest());
        assert!(backend.fence_signaled(&fence).unwrap());
        assert!(backend.wait_idle().is_ok());
    }

    #[test]
    fn test_record_into_closed_list_fails() {
        let mut backend = backend();
        let mut list = backend.create_command_list().unwrap();
        assert!(backend.record(&mut list, Op::EndRendering).is_err());
    }

    #[test]
    fn test_fill_buffer_lands_on_completion() {
        let mut backend = backend().manual_completion();
        let buffer = backend.create_buffer(&BufferDesc::bytes(crate::types::BufferType::Storage, 8)).unwrap();
        let fence = backend.create_fence(false).unwrap();
        let mut list = backend.create_command_list().unwrap();
        backend.begin_command_list(&mut list).unwrap();
        backend
            .record(&mut list, Op::FillBuffer { buffer: &buffer, offset: 4, size: 4, data: 0xAABB_CCDD })
            .unwrap();
        backend.end_command_list(&mut list).unwrap();
        backend.submit(&mut list, SubmitSync { wait: None, signal: None, fence: &fence }).unwrap();

        assert_eq!(backend.buffer_contents(&buffer), &[0u8; 8]);
        backend.complete_all();
        assert_eq!(backend.buffer_contents(&buffer), &[0u8, 0, 0, 0, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_timestamps_tick_on_completion() {
        let mut backend = backend().manual_completion();
        let pool = backend.create_query_pool(4).unwrap();
        let fence = backend.create_fence(false).unwrap();
        let mut list = backend.create_command_list().unwrap();
        backend.begin_command_list(&mut list).unwrap();
        backend.record(&mut list, Op::ResetQueries { pool: &pool, count: 4 }).unwrap();
        backend.record(&mut list, Op::WriteTimestamp { pool: &pool, index: 0 }).unwrap();
        backend.record(&mut list, Op::WriteTimestamp { pool: &pool, index: 1 }).unwrap();
        backend.end_command_list(&mut list).unwrap();
        backend.submit(&mut list, SubmitSync { wait: None, signal: None, fence: &fence }).unwrap();

        let mut ticks = [0u64; 2];
        assert_eq!(
            backend.read_timestamps(&pool, &mut ticks),
            Err(BackendError::WouldBlock { what: "timestamp query" })
        );
        backend.complete_all();
        backend.read_timestamps(&pool, &mut ticks).unwrap();
        assert_eq!(ticks, [TIMESTAMP_TICKS, 2 * TIMESTAMP_TICKS]);

        // Index 2 was never written.
        assert!(backend.read_timestamps(&pool, &mut [0; 3]).is_err());
        assert!(backend.read_timestamps(&pool, &mut [0; 5]).is_err());

        backend.destroy_query_pool(pool);
        backend.destroy_fence(fence);
        backend.destroy_command_list(list);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn test_swap_chain_images_rotate() {
        let mut backend = backend();
        let config = SwapChainConfig {
            format: Format::Bgra8Unorm,
            color_space: ColorSpace::SrgbNonLinear,
            present_mode: PresentMode::Mailbox,
            extent: Extent2d::new(64, 64),
            image_count: 3,
        };
        assert_eq!(backend.create_swap_chain(&config).unwrap(), 3);

        let semaphore = backend.create_semaphore().unwrap();
        let images: Vec<u32> = (0..4)
            .map(|_| {
                let image = backend.acquire_next_image(&semaphore).unwrap();
                backend.present(image, &semaphore).unwrap();
                image
            })
            .collect();
        assert_eq!(images, vec![0, 1, 2, 0]);
        assert_eq!(backend.present_count(), 4);
    }
}
