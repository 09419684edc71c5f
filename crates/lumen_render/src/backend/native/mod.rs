//! # wgpu Backend
//!
//! Maps the renderer core onto wgpu (Vulkan, Metal, DX12).
//!
//! wgpu tracks resource state itself, so barriers are dropped at record
//! time and the core's layout tracking is only used for validation. The
//! remaining mismatches are bridged here:
//!
//! | Core concept        | wgpu                                                |
//! |---------------------|-----------------------------------------------------|
//! | command list        | ops buffered at record, encoded at `end`           |
//! | fence               | `on_submitted_work_done` flag + `SubmissionIndex`   |
//! | binary semaphore    | checked ordering token (the queue is in order)      |
//! | blit                | fullscreen-triangle draw (see `blit`)               |
//! | swap chain image    | `SurfaceTexture`, or offscreen textures             |
//! | query pool          | `QuerySet` resolved into a mappable buffer at `end` |
//!
//! Validation errors from object creation are caught with error scopes and
//! returned as [`BackendError::Native`]; anything else is logged.

mod blit;
mod conv;

use std::num::{NonZeroU32, NonZeroU64};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{error, info, trace};
use wgpu::util::DeviceExt;

use self::blit::Blitter;
use super::{
    Attachment, BoundResource, DescriptorWrite, GpuBackend, Op, SubmitSync, SurfaceCapabilities,
    SwapChainConfig, MAX_COLOR_ATTACHMENTS,
};
use crate::device::{
    select_adapter, AdapterCandidate, AdapterFeatures, AdapterKind, DeviceInfo, DeviceLimits,
    DeviceRequirements, QueueFamily,
};
use crate::error::{BackendError, BackendResult};
use crate::resource::{
    BufferDesc, ComputePipelineDesc, ConstantBlock, DescriptorType, GraphicsPipelineDesc,
    SamplerDesc, ShaderDesc, TextureDesc,
};
use crate::types::{
    BindPoint, ColorSpace, Extent2d, Format, PresentMode, Rect2d, SamplerFilter, SurfaceFormat,
    TextureDimension, Viewport,
};

/// Optional device features, enabled when the adapter has them.
const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::PUSH_CONSTANTS
    .union(wgpu::Features::POLYGON_MODE_LINE)
    .union(wgpu::Features::POLYGON_MODE_POINT)
    .union(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
    .union(wgpu::Features::TEXTURE_BINDING_ARRAY)
    .union(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM)
    .union(wgpu::Features::TIMESTAMP_QUERY)
    .union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_PASSES);

/// Features needed to write timestamps anywhere in a command list.
const TIMESTAMP_FEATURES: wgpu::Features =
    wgpu::Features::TIMESTAMP_QUERY.union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_PASSES);

/// Formats offered by the offscreen swap chain.
const OFFSCREEN_FORMATS: [Format; 2] = [Format::Bgra8Unorm, Format::Rgba8Unorm];

/// Dynamic offsets passed for dynamic bindings. Always zero.
const ZERO_OFFSETS: [u32; 16] = [0; 16];

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Blocking polls `wait_idle` makes before giving up on a queue that keeps
/// receiving work.
const IDLE_WAIT_ATTEMPTS: usize = 4;

fn native_err(context: &str, err: impl std::fmt::Display) -> BackendError {
    BackendError::Native(format!("{context}: {err}"))
}

/// Runs `wait` until it reports an empty queue. Completion callbacks may
/// submit more work while a wait is in progress.
fn drain_queue(attempts: usize, mut wait: impl FnMut() -> bool) -> BackendResult<()> {
    for attempt in 0..attempts {
        if wait() {
            return Ok(());
        }
        trace!(attempt, "queue not empty after wait");
    }
    Err(BackendError::WouldBlock { what: "queue drain" })
}

// ============================================================================
// Native objects
// ============================================================================

/// A wgpu buffer.
pub struct WgpuBuffer {
    buffer: Arc<wgpu::Buffer>,
    size: u64,
}

impl WgpuBuffer {
    /// The wgpu buffer.
    #[must_use]
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Requested size. The native buffer is rounded up to 4 bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// A wgpu texture, its full view and a mip-0 view for attachments and
/// blits.
pub struct WgpuTexture {
    texture: Arc<wgpu::Texture>,
    view: Arc<wgpu::TextureView>,
    base_view: Arc<wgpu::TextureView>,
    view_dimension: wgpu::TextureViewDimension,
}

impl WgpuTexture {
    /// The wgpu texture.
    #[must_use]
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// View over every mip and layer.
    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// A sampler.
pub struct WgpuSampler(wgpu::Sampler);

/// A shader module.
pub struct WgpuShader(wgpu::ShaderModule);

/// A bind group and the layout it was created with.
pub struct WgpuDescriptorSet {
    layout: wgpu::BindGroupLayout,
    group: Arc<wgpu::BindGroup>,
    dynamic_bindings: usize,
}

/// A render pipeline, shared with command lists that bind it.
pub struct WgpuGraphicsPipeline(Arc<wgpu::RenderPipeline>);

/// A compute pipeline, shared with command lists that bind it.
pub struct WgpuComputePipeline(Arc<wgpu::ComputePipeline>);

/// Completion flag set by the queue callback, plus the submission to poll
/// for when waiting.
pub struct WgpuFence {
    signaled: Arc<AtomicBool>,
    submission: Mutex<Option<wgpu::SubmissionIndex>>,
}

/// Binary semaphore. The wgpu queue executes in order, so only the
/// signal/wait pairing is checked.
pub struct WgpuSemaphore {
    signaled: AtomicBool,
}

impl WgpuSemaphore {
    fn signal(&self) -> BackendResult<()> {
        if self.signaled.swap(true, Ordering::AcqRel) {
            return Err(BackendError::SemaphoreAlreadySignaled);
        }
        Ok(())
    }

    fn consume(&self) -> BackendResult<()> {
        if !self.signaled.swap(false, Ordering::AcqRel) {
            return Err(BackendError::SemaphoreNotSignaled);
        }
        Ok(())
    }
}

/// Timestamp queries and the buffers their results travel through.
struct QueryResources {
    set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    count: u32,
}

/// A timestamp query set. Results are resolved and copied to a mappable
/// buffer at the end of every list that wrote into it.
pub struct WgpuQueryPool(Arc<QueryResources>);

/// Ops buffered between `begin` and `end`, then the encoded result.
#[derive(Default)]
pub struct WgpuCommandList {
    open: bool,
    ops: Vec<RecordedOp>,
    encoded: Option<wgpu::CommandBuffer>,
}

struct ColorTarget {
    view: Arc<wgpu::TextureView>,
    load: wgpu::LoadOp<wgpu::Color>,
    store: wgpu::StoreOp,
}

struct DepthTarget {
    view: Arc<wgpu::TextureView>,
    load: wgpu::LoadOp<f32>,
    store: wgpu::StoreOp,
}

/// An op with native references held by `Arc` until encoding.
enum RecordedOp {
    ClearColor { view: Arc<wgpu::TextureView>, color: [f32; 4] },
    ClearDepth { view: Arc<wgpu::TextureView>, depth: f32 },
    FillBuffer { buffer: Arc<wgpu::Buffer>, offset: u64, size: u64, data: u32 },
    CopyBufferToTexture { src: Arc<wgpu::Buffer>, dst: Arc<wgpu::Texture>, extent: wgpu::Extent3d, bytes_per_row: u32 },
    BlitMip { texture: Arc<wgpu::Texture>, src_mip: u32, dst_mip: u32, filter: SamplerFilter },
    BlitToSwapChain { src: Arc<wgpu::TextureView>, image: u32 },
    BeginRendering { colors: SmallVec<[ColorTarget; MAX_COLOR_ATTACHMENTS]>, depth: Option<DepthTarget> },
    EndRendering,
    BindGraphicsPipeline(Arc<wgpu::RenderPipeline>),
    BindComputePipeline(Arc<wgpu::ComputePipeline>),
    BindDescriptorSet { bind_point: BindPoint, group: Arc<wgpu::BindGroup>, index: u32, dynamic: usize },
    SetConstants { bind_point: BindPoint, stages: wgpu::ShaderStages, data: Vec<u8> },
    SetViewport(Viewport),
    SetScissor(Rect2d),
    BindVertexBuffer(Arc<wgpu::Buffer>),
    BindIndexBuffer { buffer: Arc<wgpu::Buffer>, format: wgpu::IndexFormat },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32 },
    Dispatch { x: u32, y: u32, z: u32 },
    WriteTimestamp { pool: Arc<QueryResources>, index: u32 },
}

impl RecordedOp {
    /// `None` for ops wgpu handles implicitly (barriers, query resets).
    fn from_op(op: Op<'_, WgpuBackend>) -> Option<Self> {
        let recorded = match op {
            Op::MemoryBarrier { .. }
            | Op::TextureBarrier { .. }
            | Op::SwapChainBarrier { .. }
            | Op::ResetQueries { .. } => return None,
            Op::ClearColor { texture, color, .. } => Self::ClearColor { view: Arc::clone(&texture.base_view), color },
            Op::ClearDepth { texture, depth, .. } => Self::ClearDepth { view: Arc::clone(&texture.base_view), depth },
            Op::FillBuffer { buffer, offset, size, data } => {
                Self::FillBuffer { buffer: Arc::clone(&buffer.buffer), offset, size, data }
            }
            Op::CopyBufferToTexture { src, dst, width, height, depth, bytes_per_row } => Self::CopyBufferToTexture {
                src: Arc::clone(&src.buffer),
                dst: Arc::clone(&dst.texture),
                extent: wgpu::Extent3d { width, height, depth_or_array_layers: depth },
                bytes_per_row,
            },
            Op::BlitMip { texture, src_mip, dst_mip, filter, .. } => {
                Self::BlitMip { texture: Arc::clone(&texture.texture), src_mip, dst_mip, filter }
            }
            Op::BlitToSwapChain { src, image, .. } => Self::BlitToSwapChain { src: Arc::clone(&src.base_view), image },
            Op::BeginRendering { colors, depth, .. } => Self::BeginRendering {
                colors: colors.iter().map(color_target).collect(),
                depth: depth.as_ref().map(depth_target),
            },
            Op::EndRendering => Self::EndRendering,
            Op::BindGraphicsPipeline(pipeline) => Self::BindGraphicsPipeline(Arc::clone(&pipeline.0)),
            Op::BindComputePipeline(pipeline) => Self::BindComputePipeline(Arc::clone(&pipeline.0)),
            Op::BindDescriptorSet { bind_point, set, index } => Self::BindDescriptorSet {
                bind_point,
                group: Arc::clone(&set.group),
                index,
                dynamic: set.dynamic_bindings,
            },
            Op::SetConstants { bind_point, stages, data } => {
                Self::SetConstants { bind_point, stages: conv::shader_stages(stages), data: data.to_vec() }
            }
            Op::SetViewport(viewport) => Self::SetViewport(viewport),
            Op::SetScissor(rect) => Self::SetScissor(rect),
            Op::BindVertexBuffer(buffer) => Self::BindVertexBuffer(Arc::clone(&buffer.buffer)),
            Op::BindIndexBuffer { buffer, index_type } => Self::BindIndexBuffer {
                buffer: Arc::clone(&buffer.buffer),
                format: conv::index_format(index_type),
            },
            Op::Draw { vertex_count, instance_count } => Self::Draw { vertex_count, instance_count },
            Op::DrawIndexed { index_count, instance_count, first_index, vertex_offset } => {
                Self::DrawIndexed { index_count, instance_count, first_index, vertex_offset }
            }
            Op::Dispatch { x, y, z } => Self::Dispatch { x, y, z },
            Op::WriteTimestamp { pool, index } => Self::WriteTimestamp { pool: Arc::clone(&pool.0), index },
        };
        Some(recorded)
    }
}

fn color_target(attachment: &Attachment<'_, WgpuBackend>) -> ColorTarget {
    ColorTarget {
        view: Arc::clone(&attachment.texture.base_view),
        load: conv::color_load(attachment.load, attachment.clear.color),
        store: conv::store(attachment.store),
    }
}

fn depth_target(attachment: &Attachment<'_, WgpuBackend>) -> DepthTarget {
    DepthTarget {
        view: Arc::clone(&attachment.texture.base_view),
        load: conv::depth_load(attachment.load, attachment.clear.depth),
        store: conv::store(attachment.store),
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Pipeline bindings that persist across passes within one list.
#[derive(Default)]
struct BindState<'a> {
    graphics: Option<&'a wgpu::RenderPipeline>,
    compute: Option<&'a wgpu::ComputePipeline>,
    graphics_sets: SmallVec<[(u32, &'a wgpu::BindGroup, usize); 4]>,
    compute_sets: SmallVec<[(u32, &'a wgpu::BindGroup, usize); 4]>,
    graphics_constants: Option<(wgpu::ShaderStages, &'a [u8])>,
    compute_constants: Option<&'a [u8]>,
    vertex: Option<&'a wgpu::Buffer>,
    index: Option<(&'a wgpu::Buffer, wgpu::IndexFormat)>,
    viewport: Option<Viewport>,
    scissor: Option<Rect2d>,
}

fn bind_set<'a>(sets: &mut SmallVec<[(u32, &'a wgpu::BindGroup, usize); 4]>, index: u32, group: &'a wgpu::BindGroup, dynamic: usize) {
    match sets.iter_mut().find(|(i, ..)| *i == index) {
        Some(slot) => *slot = (index, group, dynamic),
        None => sets.push((index, group, dynamic)),
    }
}

impl<'a> BindState<'a> {
    /// Records a state-setting op. Returns false for anything else.
    fn track(&mut self, op: &'a RecordedOp) -> bool {
        match op {
            RecordedOp::BindGraphicsPipeline(pipeline) => self.graphics = Some(pipeline),
            RecordedOp::BindComputePipeline(pipeline) => self.compute = Some(pipeline),
            RecordedOp::BindDescriptorSet { bind_point: BindPoint::Graphics, group, index, dynamic } => {
                bind_set(&mut self.graphics_sets, *index, group, *dynamic);
            }
            RecordedOp::BindDescriptorSet { bind_point: BindPoint::Compute, group, index, dynamic } => {
                bind_set(&mut self.compute_sets, *index, group, *dynamic);
            }
            RecordedOp::SetConstants { bind_point: BindPoint::Graphics, stages, data } => {
                self.graphics_constants = Some((*stages, data));
            }
            RecordedOp::SetConstants { bind_point: BindPoint::Compute, data, .. } => {
                self.compute_constants = Some(data);
            }
            RecordedOp::SetViewport(viewport) => self.viewport = Some(*viewport),
            RecordedOp::SetScissor(rect) => self.scissor = Some(*rect),
            RecordedOp::BindVertexBuffer(buffer) => self.vertex = Some(buffer),
            RecordedOp::BindIndexBuffer { buffer, format } => self.index = Some((buffer, *format)),
            _ => return false,
        }
        true
    }

    /// Replays graphics state into a freshly opened pass.
    fn apply_graphics<'p>(&self, pass: &mut wgpu::RenderPass<'p>)
    where
        'a: 'p,
    {
        if let Some(pipeline) = self.graphics {
            pass.set_pipeline(pipeline);
        }
        for &(index, group, dynamic) in &self.graphics_sets {
            pass.set_bind_group(index, group, &ZERO_OFFSETS[..dynamic]);
        }
        if let Some((stages, data)) = self.graphics_constants {
            pass.set_push_constants(stages, 0, data);
        }
        if let Some(buffer) = self.vertex {
            pass.set_vertex_buffer(0, buffer.slice(..));
        }
        if let Some((buffer, format)) = self.index {
            pass.set_index_buffer(buffer.slice(..), format);
        }
        if let Some(viewport) = self.viewport {
            set_viewport(pass, viewport);
        }
        if let Some(rect) = self.scissor {
            set_scissor(pass, rect);
        }
    }
}

fn set_viewport(pass: &mut wgpu::RenderPass<'_>, v: Viewport) {
    pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
}

fn set_scissor(pass: &mut wgpu::RenderPass<'_>, rect: Rect2d) {
    let x = u32::try_from(rect.x).unwrap_or(0);
    let y = u32::try_from(rect.y).unwrap_or(0);
    pass.set_scissor_rect(x, y, rect.width, rect.height);
}

/// Applies one op inside an open render pass.
fn record_in_pass<'p, 'a: 'p>(
    pass: &mut wgpu::RenderPass<'p>,
    state: &mut BindState<'a>,
    op: &'a RecordedOp,
) -> BackendResult<()> {
    if state.track(op) {
        match op {
            RecordedOp::BindGraphicsPipeline(pipeline) => pass.set_pipeline(pipeline),
            RecordedOp::BindDescriptorSet { bind_point: BindPoint::Graphics, group, index, dynamic } => {
                pass.set_bind_group(*index, group, &ZERO_OFFSETS[..*dynamic]);
            }
            RecordedOp::SetConstants { bind_point: BindPoint::Graphics, stages, data } => {
                pass.set_push_constants(*stages, 0, data);
            }
            RecordedOp::SetViewport(viewport) => set_viewport(pass, *viewport),
            RecordedOp::SetScissor(rect) => set_scissor(pass, *rect),
            RecordedOp::BindVertexBuffer(buffer) => pass.set_vertex_buffer(0, buffer.slice(..)),
            RecordedOp::BindIndexBuffer { buffer, format } => pass.set_index_buffer(buffer.slice(..), *format),
            // Compute bindings only take effect at the next dispatch.
            _ => {}
        }
        return Ok(());
    }

    match op {
        RecordedOp::Draw { vertex_count, instance_count } => {
            pass.draw(0..*vertex_count, 0..*instance_count);
        }
        RecordedOp::DrawIndexed { index_count, instance_count, first_index, vertex_offset } => {
            pass.draw_indexed(*first_index..first_index + index_count, *vertex_offset, 0..*instance_count);
        }
        _ => return Err(BackendError::Unsupported("transfer or dispatch inside a render pass".to_owned())),
    }
    Ok(())
}

/// Remembers the highest query written per pool so the list can resolve
/// them once encoding is done.
fn note_timestamp<'a>(written: &mut SmallVec<[(&'a QueryResources, u32); 2]>, pool: &'a QueryResources, index: u32) {
    match written.iter_mut().find(|(p, _)| std::ptr::eq(*p, pool)) {
        Some((_, end)) => *end = (*end).max(index + 1),
        None => written.push((pool, index + 1)),
    }
}

// ============================================================================
// Swap chain
// ============================================================================

struct Acquired {
    image: u32,
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

enum Images {
    Surface { acquired: Option<Acquired> },
    Offscreen(Vec<(wgpu::Texture, wgpu::TextureView)>),
}

struct NativeSwapChain {
    format: wgpu::TextureFormat,
    image_count: u32,
    next_image: u32,
    images: Images,
}

impl NativeSwapChain {
    fn view(&self, image: u32) -> BackendResult<&wgpu::TextureView> {
        match &self.images {
            Images::Surface { acquired: Some(acquired) } if acquired.image == image => Ok(&acquired.view),
            Images::Surface { .. } => Err(BackendError::Native(format!("swap chain image {image} is not acquired"))),
            Images::Offscreen(images) => images
                .get(image as usize)
                .map(|(_, view)| view)
                .ok_or_else(|| BackendError::Native(format!("swap chain image {image} out of range"))),
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// wgpu device, queue and presentation surface.
pub struct WgpuBackend {
    info: DeviceInfo,
    // Field order is drop order: the surface must go before the instance.
    surface: Option<wgpu::Surface<'static>>,
    surface_extent: Option<Extent2d>,
    swap_chain: Option<NativeSwapChain>,
    blitter: Blitter,
    queue: wgpu::Queue,
    device: wgpu::Device,
    adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
}

impl WgpuBackend {
    /// Creates a device with no window. The swap chain is a ring of
    /// offscreen textures.
    ///
    /// # Errors
    ///
    /// [`BackendError::NoSuitableAdapter`], or device creation failure.
    pub fn offscreen(requirements: &DeviceRequirements) -> BackendResult<Self> {
        Self::create(None, requirements)
    }

    /// Creates a device able to present to `target`, usually a window.
    ///
    /// # Errors
    ///
    /// Surface creation failure, [`BackendError::NoSuitableAdapter`], or
    /// device creation failure.
    pub fn with_surface(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        requirements: &DeviceRequirements,
    ) -> BackendResult<Self> {
        Self::create(Some(target.into()), requirements)
    }

    fn create(target: Option<wgpu::SurfaceTarget<'static>>, requirements: &DeviceRequirements) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = target
            .map(|target| instance.create_surface(target))
            .transpose()
            .map_err(|err| native_err("creating surface", err))?;

        let adapters = instance.enumerate_adapters(wgpu::Backends::all());
        let candidates: Vec<AdapterCandidate> =
            adapters.iter().map(|adapter| describe_adapter(adapter, surface.as_ref())).collect();
        let selection = select_adapter(&candidates, requirements)?;
        let adapter = adapters.into_iter().nth(selection.adapter).ok_or(BackendError::NoSuitableAdapter)?;

        let features = adapter.features() & OPTIONAL_FEATURES;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen"),
                required_features: features,
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|err| native_err("requesting device", err))?;

        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            error!(%err, "uncaptured wgpu error");
        }));

        let limits = device.limits();
        let info = DeviceInfo {
            name: adapter.get_info().name,
            limits: DeviceLimits {
                min_uniform_buffer_offset_alignment: u64::from(limits.min_uniform_buffer_offset_alignment),
                min_storage_buffer_offset_alignment: u64::from(limits.min_storage_buffer_offset_alignment),
                max_sampler_anisotropy: 16.0,
                copy_row_alignment: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
                timestamp_period: queue.get_timestamp_period(),
            },
        };
        info!(adapter = %info.name, backend = ?adapter.get_info().backend, ?features, "wgpu device created");

        Ok(Self {
            info,
            surface,
            surface_extent: None,
            swap_chain: None,
            blitter: Blitter::new(&device),
            queue,
            device,
            adapter,
            _instance: instance,
        })
    }

    /// Sets the extent the surface dictates, normally the window's inner
    /// size. `None` lets the renderer choose.
    pub fn set_surface_extent(&mut self, extent: Option<Extent2d>) {
        self.surface_extent = extent;
    }

    /// The wgpu device.
    #[must_use]
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The wgpu queue.
    #[must_use]
    pub const fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Runs `create` inside a validation error scope.
    fn scoped<T>(&self, what: &str, create: impl FnOnce(&wgpu::Device) -> T) -> BackendResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(native_err(what, err)),
            None => Ok(value),
        }
    }

    fn require(&self, feature: wgpu::Features, what: &str) -> BackendResult<()> {
        if self.device.features().contains(feature) {
            Ok(())
        } else {
            Err(BackendError::Unsupported(what.to_owned()))
        }
    }

    fn pipeline_layout(
        &self,
        sets: &[&WgpuDescriptorSet],
        blocks: &[ConstantBlock],
    ) -> BackendResult<wgpu::PipelineLayout> {
        if !blocks.is_empty() {
            self.require(wgpu::Features::PUSH_CONSTANTS, "push constants")?;
        }
        let layouts: SmallVec<[&wgpu::BindGroupLayout; 4]> = sets.iter().map(|set| &set.layout).collect();
        let ranges: SmallVec<[wgpu::PushConstantRange; 4]> = blocks
            .iter()
            .map(|block| wgpu::PushConstantRange { stages: conv::shader_stages(block.stages), range: 0..block.size })
            .collect();
        self.scoped("creating pipeline layout", |device| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &layouts,
                push_constant_ranges: &ranges,
            })
        })
    }

    #[allow(clippy::too_many_lines)]
    fn encode(&self, ops: &[RecordedOp]) -> BackendResult<wgpu::CommandBuffer> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("lumen") });
        let mut state = BindState::default();
        let mut timestamps = SmallVec::new();
        let mut ops = ops.iter();

        while let Some(op) = ops.next() {
            if state.track(op) {
                continue;
            }
            match op {
                RecordedOp::BeginRendering { colors, depth } => {
                    let color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; MAX_COLOR_ATTACHMENTS]> =
                        colors
                            .iter()
                            .map(|color| {
                                Some(wgpu::RenderPassColorAttachment {
                                    view: &color.view,
                                    resolve_target: None,
                                    ops: wgpu::Operations { load: color.load, store: color.store },
                                })
                            })
                            .collect();
                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("lumen pass"),
                        color_attachments: &color_attachments,
                        depth_stencil_attachment: depth.as_ref().map(|depth| {
                            wgpu::RenderPassDepthStencilAttachment {
                                view: &depth.view,
                                depth_ops: Some(wgpu::Operations { load: depth.load, store: depth.store }),
                                stencil_ops: None,
                            }
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    state.apply_graphics(&mut pass);
                    for op in ops.by_ref() {
                        match op {
                            RecordedOp::EndRendering => break,
                            RecordedOp::WriteTimestamp { pool, index } => {
                                pass.write_timestamp(&pool.set, *index);
                                note_timestamp(&mut timestamps, pool, *index);
                            }
                            _ => record_in_pass(&mut pass, &mut state, op)?,
                        }
                    }
                }
                RecordedOp::EndRendering => {
                    return Err(BackendError::Native("render pass ended without being begun".to_owned()));
                }
                RecordedOp::ClearColor { view, color } => {
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("lumen clear"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: conv::color_load(crate::types::LoadOp::Clear, *color),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                }
                RecordedOp::ClearDepth { view, depth } => {
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("lumen clear"),
                        color_attachments: &[],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(*depth),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                }
                RecordedOp::FillBuffer { buffer, offset, size, data } => {
                    if *data == 0 {
                        encoder.clear_buffer(buffer, *offset, Some(*size));
                    } else {
                        let words = usize::try_from(size / 4)
                            .map_err(|_| BackendError::Unsupported("fill larger than the address space".to_owned()))?;
                        let pattern = vec![*data; words];
                        let source = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("lumen fill"),
                            contents: bytemuck::cast_slice(&pattern),
                            usage: wgpu::BufferUsages::COPY_SRC,
                        });
                        encoder.copy_buffer_to_buffer(&source, 0, buffer, *offset, *size);
                    }
                }
                RecordedOp::CopyBufferToTexture { src, dst, extent, bytes_per_row } => {
                    encoder.copy_buffer_to_texture(
                        wgpu::ImageCopyBuffer {
                            buffer: src,
                            layout: wgpu::ImageDataLayout {
                                offset: 0,
                                bytes_per_row: Some(*bytes_per_row),
                                rows_per_image: Some(extent.height),
                            },
                        },
                        wgpu::ImageCopyTexture {
                            texture: dst,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        *extent,
                    );
                }
                RecordedOp::BlitMip { texture, src_mip, dst_mip, filter } => {
                    self.blitter.blit_mip(&self.device, &mut encoder, texture, *src_mip, *dst_mip, *filter);
                }
                RecordedOp::BlitToSwapChain { src, image } => {
                    let swap_chain = self.swap_chain.as_ref().ok_or_else(|| {
                        BackendError::Native("blit to swap chain without a swap chain".to_owned())
                    })?;
                    let dst = swap_chain.view(*image)?;
                    self.blitter.blit(&self.device, &mut encoder, src, dst, swap_chain.format, SamplerFilter::Nearest);
                }
                RecordedOp::Dispatch { x, y, z } => {
                    let pipeline = state
                        .compute
                        .ok_or_else(|| BackendError::Native("dispatch without a compute pipeline".to_owned()))?;
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("lumen dispatch"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(pipeline);
                    for &(index, group, dynamic) in &state.compute_sets {
                        pass.set_bind_group(index, group, &ZERO_OFFSETS[..dynamic]);
                    }
                    if let Some(data) = state.compute_constants {
                        pass.set_push_constants(0, data);
                    }
                    pass.dispatch_workgroups(*x, *y, *z);
                }
                RecordedOp::Draw { .. } | RecordedOp::DrawIndexed { .. } => {
                    return Err(BackendError::Native("draw outside a render pass".to_owned()));
                }
                RecordedOp::WriteTimestamp { pool, index } => {
                    encoder.write_timestamp(&pool.set, *index);
                    note_timestamp(&mut timestamps, pool, *index);
                }
                _ => {}
            }
        }

        for (pool, end) in timestamps {
            let bytes = u64::from(end) * u64::from(wgpu::QUERY_SIZE);
            encoder.resolve_query_set(&pool.set, 0..end, &pool.resolve, 0);
            encoder.copy_buffer_to_buffer(&pool.resolve, 0, &pool.readback, 0, bytes);
        }
        Ok(encoder.finish())
    }
}

fn describe_adapter(adapter: &wgpu::Adapter, surface: Option<&wgpu::Surface<'_>>) -> AdapterCandidate {
    let info = adapter.get_info();
    let kind = match info.device_type {
        wgpu::DeviceType::DiscreteGpu => AdapterKind::Discrete,
        wgpu::DeviceType::IntegratedGpu => AdapterKind::Integrated,
        wgpu::DeviceType::Cpu => AdapterKind::Cpu,
        _ => AdapterKind::Other,
    };
    let api_version = match info.backend {
        wgpu::Backend::Vulkan | wgpu::Backend::Metal | wgpu::Backend::Dx12 => (1, 3),
        _ => (1, 0),
    };
    let (formats, present_modes, present) = match surface {
        Some(surface) => {
            let caps = surface.get_capabilities(adapter);
            (caps.formats.len(), caps.present_modes.len(), adapter.is_surface_supported(surface))
        }
        None => (OFFSCREEN_FORMATS.len(), 1, true),
    };
    let features = adapter.features();

    AdapterCandidate {
        name: info.name,
        kind,
        api_version,
        features: AdapterFeatures {
            sampler_anisotropy: adapter
                .get_downlevel_capabilities()
                .flags
                .contains(wgpu::DownlevelFlags::ANISOTROPIC_FILTERING),
            fill_mode_non_solid: features.contains(wgpu::Features::POLYGON_MODE_LINE),
            wide_lines: false,
        },
        has_swap_chain_extension: present,
        surface_format_count: u32::try_from(formats).unwrap_or(u32::MAX),
        present_mode_count: u32::try_from(present_modes).unwrap_or(u32::MAX),
        queue_families: vec![QueueFamily { graphics: true, compute: true, present }],
    }
}

fn sample_type(format: wgpu::TextureFormat) -> wgpu::TextureSampleType {
    match format {
        wgpu::TextureFormat::Depth32Float | wgpu::TextureFormat::Depth16Unorm => wgpu::TextureSampleType::Depth,
        wgpu::TextureFormat::Rg32Float | wgpu::TextureFormat::Rgba32Float => {
            wgpu::TextureSampleType::Float { filterable: false }
        }
        _ => wgpu::TextureSampleType::Float { filterable: true },
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = WgpuBuffer;
    type Texture = WgpuTexture;
    type Sampler = WgpuSampler;
    type Shader = WgpuShader;
    type DescriptorSet = WgpuDescriptorSet;
    type GraphicsPipeline = WgpuGraphicsPipeline;
    type ComputePipeline = WgpuComputePipeline;
    type CommandList = WgpuCommandList;
    type Fence = WgpuFence;
    type Semaphore = WgpuSemaphore;
    type QueryPool = WgpuQueryPool;

    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        let device = &self.device;
        drain_queue(IDLE_WAIT_ATTEMPTS, || device.poll(wgpu::Maintain::Wait).is_queue_empty())?;
        trace!("device idle");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Swap chain
    // ------------------------------------------------------------------

    fn surface_capabilities(&self) -> SurfaceCapabilities {
        let (formats, present_modes) = match &self.surface {
            Some(surface) => {
                let caps = surface.get_capabilities(&self.adapter);
                (
                    caps.formats.into_iter().filter_map(conv::format_from_native).collect(),
                    caps.present_modes.into_iter().filter_map(conv::present_mode_from_native).collect(),
                )
            }
            None => (OFFSCREEN_FORMATS.to_vec(), vec![PresentMode::Fifo]),
        };
        SurfaceCapabilities {
            formats: formats
                .into_iter()
                .map(|format| SurfaceFormat { format, color_space: ColorSpace::SrgbNonLinear })
                .collect(),
            present_modes,
            min_image_count: 2,
            max_image_count: 3,
            current_extent: self.surface_extent,
        }
    }

    fn create_swap_chain(&mut self, config: &SwapChainConfig) -> BackendResult<u32> {
        let format = conv::texture_format(config.format)?;
        let image_count = config.image_count.clamp(2, 3);
        let Extent2d { width, height } = config.extent;

        let images = match &self.surface {
            Some(surface) => {
                let caps = surface.get_capabilities(&self.adapter);
                let surface_config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width,
                    height,
                    present_mode: conv::present_mode(config.present_mode),
                    desired_maximum_frame_latency: image_count - 1,
                    alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
                    view_formats: Vec::new(),
                };
                self.scoped("configuring surface", |device| surface.configure(device, &surface_config))?;
                Images::Surface { acquired: None }
            }
            None => Images::Offscreen(
                (0..image_count)
                    .map(|_| {
                        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                            label: Some("lumen swap chain"),
                            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                            mip_level_count: 1,
                            sample_count: 1,
                            dimension: wgpu::TextureDimension::D2,
                            format,
                            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                            view_formats: &[],
                        });
                        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                        (texture, view)
                    })
                    .collect(),
            ),
        };

        self.swap_chain = Some(NativeSwapChain { format, image_count, next_image: 0, images });
        Ok(image_count)
    }

    fn destroy_swap_chain(&mut self) {
        self.swap_chain = None;
    }

    fn acquire_next_image(&mut self, signal: &WgpuSemaphore) -> BackendResult<u32> {
        let swap_chain = self.swap_chain.as_mut().ok_or_else(|| BackendError::Native("no swap chain".to_owned()))?;
        let image = swap_chain.next_image;

        if let (Some(surface), Images::Surface { acquired }) = (&self.surface, &mut swap_chain.images) {
            let texture = surface.get_current_texture().map_err(|err| native_err("acquiring image", err))?;
            let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
            *acquired = Some(Acquired { image, texture, view });
        }

        swap_chain.next_image = (image + 1) % swap_chain.image_count;
        signal.signal()?;
        trace!(image, "image acquired");
        Ok(image)
    }

    fn present(&mut self, image: u32, wait: &WgpuSemaphore) -> BackendResult<()> {
        wait.consume()?;
        let swap_chain = self.swap_chain.as_mut().ok_or_else(|| BackendError::Native("no swap chain".to_owned()))?;
        if let Images::Surface { acquired } = &mut swap_chain.images {
            match acquired.take() {
                Some(acquired) if acquired.image == image => acquired.texture.present(),
                _ => return Err(BackendError::Native(format!("presenting unacquired image {image}"))),
            }
        }
        trace!(image, "image presented");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<WgpuBuffer> {
        let buffer = self.scoped("creating buffer", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: None,
                size: wgpu::util::align_to(desc.size, wgpu::COPY_BUFFER_ALIGNMENT),
                usage: conv::buffer_usage(desc),
                mapped_at_creation: false,
            })
        })?;
        Ok(WgpuBuffer { buffer: Arc::new(buffer), size: desc.size })
    }

    fn destroy_buffer(&mut self, buffer: WgpuBuffer) {
        drop(buffer);
    }

    fn write_buffer(&mut self, buffer: &WgpuBuffer, offset: u64, data: &[u8]) -> BackendResult<()> {
        // Native sizes are rounded up to 4, so the padded tail stays in bounds.
        if data.len() % 4 == 0 {
            self.queue.write_buffer(&buffer.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(wgpu::util::align_to(data.len(), 4), 0);
            self.queue.write_buffer(&buffer.buffer, offset, &padded);
        }
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<WgpuTexture> {
        let format = conv::texture_format(desc.format)?;
        let (dimension, view_dimension) = conv::texture_dimension(desc.dimension);
        let layers = match desc.dimension {
            TextureDimension::D3 => desc.depth,
            TextureDimension::Cube => 6,
            TextureDimension::D1 | TextureDimension::D2 => 1,
        };
        let texture = self.scoped("creating texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: None,
                size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: layers },
                mip_level_count: desc.mip_count,
                sample_count: desc.samples,
                dimension,
                format,
                usage: conv::texture_usage(desc.usage, desc.mip_count, desc.format),
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(view_dimension),
            ..Default::default()
        });
        let base_view = texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(1),
            ..Default::default()
        });
        Ok(WgpuTexture {
            texture: Arc::new(texture),
            view: Arc::new(view),
            base_view: Arc::new(base_view),
            view_dimension,
        })
    }

    fn destroy_texture(&mut self, texture: WgpuTexture) {
        drop(texture);
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> BackendResult<WgpuSampler> {
        let modes = [desc.address_u, desc.address_v, desc.address_w];
        if modes.contains(&crate::types::AddressMode::ClampToBorder) {
            self.require(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER, "clamp-to-border addressing")?;
        }
        let all_linear = [desc.min_filter, desc.mag_filter, desc.mip_filter]
            .iter()
            .all(|filter| *filter == SamplerFilter::Linear);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let anisotropy_clamp = if desc.anisotropy && all_linear {
            self.info.limits.max_sampler_anisotropy as u16
        } else {
            1
        };

        let sampler = self.scoped("creating sampler", |device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: None,
                address_mode_u: conv::address_mode(desc.address_u),
                address_mode_v: conv::address_mode(desc.address_v),
                address_mode_w: conv::address_mode(desc.address_w),
                mag_filter: conv::filter(desc.mag_filter),
                min_filter: conv::filter(desc.min_filter),
                mipmap_filter: conv::filter(desc.mip_filter),
                anisotropy_clamp,
                border_color: Some(conv::border_color(desc.border)),
                ..Default::default()
            })
        })?;
        Ok(WgpuSampler(sampler))
    }

    fn destroy_sampler(&mut self, sampler: WgpuSampler) {
        drop(sampler);
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> BackendResult<WgpuShader> {
        let magic = desc.bytecode.get(..4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        if magic != Some(SPIRV_MAGIC) {
            return Err(BackendError::Unsupported("shader bytecode is not SPIR-V".to_owned()));
        }
        let module = self.scoped("creating shader module", |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: None,
                source: wgpu::util::make_spirv(&desc.bytecode),
            })
        })?;
        trace!(stage = ?desc.stage, visibility = ?conv::shader_stage(desc.stage), "shader module created");
        Ok(WgpuShader(module))
    }

    fn destroy_shader(&mut self, shader: WgpuShader) {
        drop(shader);
    }

    fn create_descriptor_set(&mut self, writes: &[DescriptorWrite<'_, Self>]) -> BackendResult<WgpuDescriptorSet> {
        let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE;
        let dynamic_bindings = writes
            .iter()
            .filter(|w| matches!(w.kind, DescriptorType::DynamicUniformBuffer | DescriptorType::DynamicStorageBuffer))
            .count();
        if dynamic_bindings > ZERO_OFFSETS.len() {
            return Err(BackendError::Unsupported("too many dynamic bindings".to_owned()));
        }

        let mut layout_entries = Vec::with_capacity(writes.len());
        let mut views: Vec<SmallVec<[&wgpu::TextureView; 1]>> = Vec::with_capacity(writes.len());
        for write in writes {
            let count = u32::try_from(write.resources.len()).ok().and_then(NonZeroU32::new);
            let (ty, count) = match write.kind {
                DescriptorType::Texture => {
                    let Some(BoundResource::Texture { texture, .. }) = write.resources.first() else {
                        return Err(BackendError::Native("texture binding without a texture".to_owned()));
                    };
                    let array = write.resources.len() > 1;
                    if array {
                        self.require(wgpu::Features::TEXTURE_BINDING_ARRAY, "texture arrays")?;
                    }
                    let ty = wgpu::BindingType::Texture {
                        sample_type: sample_type(texture.texture.format()),
                        view_dimension: texture.view_dimension,
                        multisampled: texture.texture.sample_count() > 1,
                    };
                    (ty, if array { count } else { None })
                }
                DescriptorType::Sampler => (wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering), None),
                kind => {
                    let ty = conv::buffer_binding_type(kind)
                        .ok_or_else(|| BackendError::Native(format!("{kind:?} is not a buffer binding")))?;
                    (ty, None)
                }
            };
            layout_entries.push(wgpu::BindGroupLayoutEntry { binding: write.binding, visibility, ty, count });
            views.push(
                write
                    .resources
                    .iter()
                    .filter_map(|resource| match resource {
                        BoundResource::Texture { texture, .. } => Some(&*texture.view),
                        _ => None,
                    })
                    .collect(),
            );
        }

        let layout = self.scoped("creating descriptor set layout", |device| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor { label: None, entries: &layout_entries })
        })?;

        let mut entries = Vec::with_capacity(writes.len());
        for (write, views) in writes.iter().zip(&views) {
            let resource = match (write.resources.first(), views.len()) {
                (Some(BoundResource::Buffer { buffer, size }), _) => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer.buffer,
                        offset: 0,
                        size: NonZeroU64::new(*size),
                    })
                }
                (Some(BoundResource::Sampler(sampler)), _) => wgpu::BindingResource::Sampler(&sampler.0),
                (Some(BoundResource::Texture { .. }), 1) => wgpu::BindingResource::TextureView(views[0]),
                (Some(BoundResource::Texture { .. }), _) => wgpu::BindingResource::TextureViewArray(views),
                (None, _) => return Err(BackendError::Native(format!("binding {} is empty", write.binding))),
            };
            entries.push(wgpu::BindGroupEntry { binding: write.binding, resource });
        }

        let group = self.scoped("creating descriptor set", |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor { label: None, layout: &layout, entries: &entries })
        })?;
        Ok(WgpuDescriptorSet { layout, group: Arc::new(group), dynamic_bindings })
    }

    fn destroy_descriptor_set(&mut self, set: WgpuDescriptorSet) {
        drop(set);
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
        sets: &[&WgpuDescriptorSet],
    ) -> BackendResult<WgpuGraphicsPipeline> {
        match desc.fill_mode {
            crate::types::FillMode::Solid => {}
            crate::types::FillMode::Line => self.require(wgpu::Features::POLYGON_MODE_LINE, "line fill mode")?,
            crate::types::FillMode::Point => self.require(wgpu::Features::POLYGON_MODE_POINT, "point fill mode")?,
        }
        let layout = self.pipeline_layout(sets, &desc.constant_blocks)?;

        let attributes: SmallVec<[wgpu::VertexAttribute; 8]> = desc
            .vertex_layout
            .attributes()
            .iter()
            .map(|attribute| wgpu::VertexAttribute {
                format: conv::vertex_format(attribute.attrib),
                offset: u64::from(attribute.offset),
                shader_location: attribute.location,
            })
            .collect();
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: u64::from(desc.vertex_layout.stride()),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let buffers: &[wgpu::VertexBufferLayout<'_>] =
            if desc.vertex_layout.is_empty() { &[] } else { &vertex_buffers };

        let blend = conv::blend(&desc.blend);
        let write_mask = conv::color_writes(desc.blend.write_mask);
        let targets = desc
            .color_formats
            .iter()
            .map(|format| Ok(Some(wgpu::ColorTargetState { format: conv::texture_format(*format)?, blend, write_mask })))
            .collect::<BackendResult<SmallVec<[_; MAX_COLOR_ATTACHMENTS]>>>()?;
        let depth_stencil = if desc.depth_format == Format::Undefined {
            None
        } else {
            Some(wgpu::DepthStencilState {
                format: conv::texture_format(desc.depth_format)?,
                depth_write_enabled: desc.depth_write,
                depth_compare: if desc.depth_test {
                    conv::compare(desc.depth_op)
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            })
        };
        let primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: conv::front_face(desc.front_face),
            cull_mode: conv::cull_mode(desc.cull_mode)?,
            unclipped_depth: false,
            polygon_mode: conv::polygon_mode(desc.fill_mode),
            conservative: false,
        };

        let pipeline = self.scoped("creating graphics pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: None,
                layout: Some(&layout),
                vertex: wgpu::VertexState { module: &vertex.0, entry_point: "main", buffers },
                fragment: Some(wgpu::FragmentState { module: &fragment.0, entry_point: "main", targets: &targets }),
                primitive,
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })?;
        Ok(WgpuGraphicsPipeline(Arc::new(pipeline)))
    }

    fn destroy_graphics_pipeline(&mut self, pipeline: WgpuGraphicsPipeline) {
        drop(pipeline);
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDesc,
        compute: &WgpuShader,
        sets: &[&WgpuDescriptorSet],
    ) -> BackendResult<WgpuComputePipeline> {
        let layout = self.pipeline_layout(sets, &desc.constant_blocks)?;
        let pipeline = self.scoped("creating compute pipeline", |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: None,
                layout: Some(&layout),
                module: &compute.0,
                entry_point: "main",
            })
        })?;
        Ok(WgpuComputePipeline(Arc::new(pipeline)))
    }

    fn destroy_compute_pipeline(&mut self, pipeline: WgpuComputePipeline) {
        drop(pipeline);
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    fn create_fence(&mut self, signaled: bool) -> BackendResult<WgpuFence> {
        Ok(WgpuFence { signaled: Arc::new(AtomicBool::new(signaled)), submission: Mutex::new(None) })
    }

    fn destroy_fence(&mut self, fence: WgpuFence) {
        drop(fence);
    }

    fn wait_fence(&mut self, fence: &WgpuFence) -> BackendResult<()> {
        if fence.signaled.load(Ordering::Acquire) {
            return Ok(());
        }
        // A reset fence with nothing submitted would never signal.
        let submission = fence.submission.lock().take().ok_or(BackendError::WouldBlock { what: "fence" })?;
        let _ = self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
        fence.signaled.store(true, Ordering::Release);
        Ok(())
    }

    fn fence_signaled(&mut self, fence: &WgpuFence) -> BackendResult<bool> {
        let _ = self.device.poll(wgpu::Maintain::Poll);
        Ok(fence.signaled.load(Ordering::Acquire))
    }

    fn reset_fence(&mut self, fence: &WgpuFence) -> BackendResult<()> {
        fence.signaled.store(false, Ordering::Release);
        *fence.submission.lock() = None;
        Ok(())
    }

    fn create_semaphore(&mut self) -> BackendResult<WgpuSemaphore> {
        Ok(WgpuSemaphore { signaled: AtomicBool::new(false) })
    }

    fn destroy_semaphore(&mut self, semaphore: WgpuSemaphore) {
        drop(semaphore);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn create_query_pool(&mut self, count: u32) -> BackendResult<WgpuQueryPool> {
        self.require(TIMESTAMP_FEATURES, "timestamp queries")?;
        let bytes = u64::from(count) * u64::from(wgpu::QUERY_SIZE);
        let resources = self.scoped("creating query pool", |device| QueryResources {
            set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("lumen timestamps"),
                ty: wgpu::QueryType::Timestamp,
                count,
            }),
            resolve: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lumen timestamp resolve"),
                size: bytes,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("lumen timestamp readback"),
                size: bytes,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }),
            count,
        })?;
        Ok(WgpuQueryPool(Arc::new(resources)))
    }

    fn destroy_query_pool(&mut self, pool: WgpuQueryPool) {
        drop(pool);
    }

    fn read_timestamps(&mut self, pool: &WgpuQueryPool, results: &mut [u64]) -> BackendResult<()> {
        if results.is_empty() {
            return Ok(());
        }
        let pool = &pool.0;
        if results.len() > pool.count as usize {
            return Err(BackendError::Native(format!("query pool holds {} queries", pool.count)));
        }

        let bytes = results.len() as u64 * u64::from(wgpu::QUERY_SIZE);
        let slice = pool.readback.slice(..bytes);
        let mapped = Arc::new(Mutex::new(None));
        let done = Arc::clone(&mapped);
        slice.map_async(wgpu::MapMode::Read, move |result| *done.lock() = Some(result));
        let _ = self.device.poll(wgpu::Maintain::Wait);

        let status = mapped.lock().take();
        match status {
            Some(Ok(())) => {}
            Some(Err(err)) => return Err(native_err("mapping timestamps", err)),
            None => return Err(BackendError::WouldBlock { what: "timestamp readback" }),
        }
        {
            let view = slice.get_mapped_range();
            for (result, chunk) in results.iter_mut().zip(view.chunks_exact(8)) {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                *result = u64::from_le_bytes(word);
            }
        }
        pool.readback.unmap();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command lists
    // ------------------------------------------------------------------

    fn create_command_list(&mut self) -> BackendResult<WgpuCommandList> {
        Ok(WgpuCommandList::default())
    }

    fn destroy_command_list(&mut self, list: WgpuCommandList) {
        drop(list);
    }

    fn reset_command_list(&mut self, list: &mut WgpuCommandList) -> BackendResult<()> {
        list.open = false;
        list.ops.clear();
        list.encoded = None;
        Ok(())
    }

    fn begin_command_list(&mut self, list: &mut WgpuCommandList) -> BackendResult<()> {
        list.open = true;
        list.ops.clear();
        list.encoded = None;
        Ok(())
    }

    fn end_command_list(&mut self, list: &mut WgpuCommandList) -> BackendResult<()> {
        list.open = false;
        let encoded = self.encode(&list.ops)?;
        list.ops.clear();
        list.encoded = Some(encoded);
        Ok(())
    }

    fn record(&self, list: &mut WgpuCommandList, op: Op<'_, Self>) -> BackendResult<()> {
        if !list.open {
            return Err(BackendError::Native("recording into a closed command list".to_owned()));
        }
        if let Some(op) = RecordedOp::from_op(op) {
            list.ops.push(op);
        }
        Ok(())
    }

    fn submit(&mut self, list: &mut WgpuCommandList, sync: SubmitSync<'_, Self>) -> BackendResult<()> {
        let encoded =
            list.encoded.take().ok_or_else(|| BackendError::Native("submitting an unended command list".to_owned()))?;
        if let Some(wait) = sync.wait {
            wait.consume()?;
        }
        if let Some(signal) = sync.signal {
            signal.signal()?;
        }

        sync.fence.signaled.store(false, Ordering::Release);
        let submission = self.queue.submit(Some(encoded));
        *sync.fence.submission.lock() = Some(submission);
        let signaled = Arc::clone(&sync.fence.signaled);
        self.queue.on_submitted_work_done(move || signaled.store(true, Ordering::Release));
        Ok(())
    }
}
