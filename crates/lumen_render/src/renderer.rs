//! # Renderer Context
//!
//! [`Renderer`] is the single explicit context object. It owns the backend,
//! the eight resource pools, the swap chain, the command ring and the frame
//! slots. There is no global state: everything flows through `&mut self`
//! on the render thread.

use lumen_core::Pool;
use tracing::info;

use crate::backend::GpuBackend;
use crate::command::CommandRing;
use crate::config::RendererConfig;
use crate::device::DeviceInfo;
use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameSlot, CONCURRENT_FRAMES};
use crate::resource::{
    occupied, Buffer, BufferDesc, BufferId, ComputePipeline, DescriptorSet, GraphicsPipeline,
    RenderTarget, ResourceKind, Sampler, Shader, Texture,
};
use crate::swap_chain::SwapChain;
use crate::timer::GpuTimer;
use crate::types::BufferType;

/// The renderer core, generic over its GPU backend.
pub struct Renderer<B: GpuBackend> {
    pub(crate) backend: B,
    pub(crate) config: RendererConfig,

    pub(crate) buffers: Pool<Buffer<B>>,
    pub(crate) textures: Pool<Texture<B>>,
    pub(crate) samplers: Pool<Sampler<B>>,
    pub(crate) shaders: Pool<Shader<B>>,
    pub(crate) descriptor_sets: Pool<DescriptorSet<B>>,
    pub(crate) render_targets: Pool<RenderTarget>,
    pub(crate) graphics_pipelines: Pool<GraphicsPipeline<B>>,
    pub(crate) compute_pipelines: Pool<ComputePipeline<B>>,

    pub(crate) swap_chain: SwapChain,
    pub(crate) ring: CommandRing<B>,
    pub(crate) frames: Vec<FrameSlot<B>>,
    pub(crate) immediate_fence: B::Fence,
    pub(crate) active_frame: usize,
    pub(crate) staging: Option<BufferId>,
    pub(crate) timer: Option<GpuTimer<B>>,
}

impl<B: GpuBackend> Renderer<B> {
    /// Builds the renderer on an initialized backend: pools, command ring,
    /// frame slots, the immediate fence, the swap chain and, if configured,
    /// the GPU timer.
    ///
    /// # Errors
    ///
    /// - [`RenderError::Config`] for an invalid config
    /// - [`RenderError::NoSurfaceSupport`] if the surface is unusable
    /// - backend failure while creating sync objects or the swap chain
    pub fn new(mut backend: B, config: RendererConfig) -> RenderResult<Self> {
        config.validate()?;

        let ring = CommandRing::new(&mut backend, config.command_buffers)?;
        let mut frames = Vec::with_capacity(CONCURRENT_FRAMES);
        for _ in 0..CONCURRENT_FRAMES {
            frames.push(FrameSlot::new(&mut backend)?);
        }
        let immediate_fence = backend.create_fence(false)?;
        let timer = if config.gpu_timer { Some(GpuTimer::new(&mut backend)?) } else { None };

        let pools = config.pools;
        let mut renderer = Self {
            backend,
            config,
            buffers: Pool::new(pools.buffers),
            textures: Pool::new(pools.textures),
            samplers: Pool::new(pools.samplers),
            shaders: Pool::new(pools.shaders),
            descriptor_sets: Pool::new(pools.descriptor_sets),
            render_targets: Pool::new(pools.render_targets),
            graphics_pipelines: Pool::new(pools.graphics_pipelines),
            compute_pipelines: Pool::new(pools.compute_pipelines),
            swap_chain: SwapChain::default(),
            ring,
            frames,
            immediate_fence,
            active_frame: 0,
            staging: None,
            timer,
        };
        renderer.init_swap_chain(renderer.config.surface_extent)?;

        info!(
            adapter = %renderer.backend.device_info().name,
            buffers = pools.buffers,
            textures = pools.textures,
            command_buffers = renderer.ring.len(),
            gpu_timer = renderer.timer.is_some(),
            "renderer initialized"
        );
        Ok(renderer)
    }

    /// Drains the GPU and tears everything down, handing the backend back.
    ///
    /// Every resource the caller added must have been removed.
    ///
    /// # Errors
    ///
    /// - [`RenderError::ResourcesOutstanding`] naming the first pool that
    ///   still holds caller resources
    /// - backend failure while draining
    pub fn destroy(mut self) -> RenderResult<B> {
        self.wait_idle()?;

        if self.staging.is_some() {
            let mut staging = self.staging.take();
            self.remove_buffer(&mut staging)?;
        }
        for kind in ResourceKind::ALL {
            let count = self.live_count(kind);
            if count > 0 {
                return Err(RenderError::ResourcesOutstanding { kind, count });
            }
        }

        self.destroy_swap_chain();
        let Self { mut backend, ring, frames, immediate_fence, timer, .. } = self;
        if let Some(timer) = timer {
            timer.destroy(&mut backend);
        }
        ring.destroy(&mut backend);
        for frame in frames {
            frame.destroy(&mut backend);
        }
        backend.destroy_fence(immediate_fence);

        info!("renderer destroyed");
        Ok(backend)
    }

    /// The backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably. Intended for backend-specific controls such as
    /// completing simulated GPU work.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Adapter name and limits.
    #[must_use]
    pub fn device_info(&self) -> &DeviceInfo {
        self.backend.device_info()
    }

    /// Configuration the renderer was built with.
    #[must_use]
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Free slots in the pool of `kind`.
    #[must_use]
    pub fn free_count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Buffer => self.buffers.free_count(),
            ResourceKind::Texture => self.textures.free_count(),
            ResourceKind::Sampler => self.samplers.free_count(),
            ResourceKind::Shader => self.shaders.free_count(),
            ResourceKind::DescriptorSet => self.descriptor_sets.free_count(),
            ResourceKind::RenderTarget => self.render_targets.free_count(),
            ResourceKind::GraphicsPipeline => self.graphics_pipelines.free_count(),
            ResourceKind::ComputePipeline => self.compute_pipelines.free_count(),
        }
    }

    /// Live resources in the pool of `kind`, including renderer-owned ones
    /// such as the staging buffer.
    #[must_use]
    pub fn live_count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Buffer => self.buffers.allocated_count(),
            ResourceKind::Texture => self.textures.allocated_count(),
            ResourceKind::Sampler => self.samplers.allocated_count(),
            ResourceKind::Shader => self.shaders.allocated_count(),
            ResourceKind::DescriptorSet => self.descriptor_sets.allocated_count(),
            ResourceKind::RenderTarget => self.render_targets.allocated_count(),
            ResourceKind::GraphicsPipeline => self.graphics_pipelines.allocated_count(),
            ResourceKind::ComputePipeline => self.compute_pipelines.allocated_count(),
        }
    }

    /// The staging buffer, created on first use. It occupies one slot of
    /// the buffer pool until [`Renderer::destroy`].
    ///
    /// # Errors
    ///
    /// Buffer pool exhaustion or backend failure on first use.
    pub fn staging_buffer(&mut self) -> RenderResult<BufferId> {
        if let Some(id) = self.staging {
            return Ok(id);
        }
        let desc = BufferDesc::bytes(BufferType::Staging, self.config.staging_buffer_size);
        let mut slot = None;
        self.add_buffer(&desc, &mut slot, None)?;
        self.staging = slot;
        occupied(&slot, ResourceKind::Buffer)
    }
}
