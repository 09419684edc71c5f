//! # Demo Scene
//!
//! One textured triangle drawn into an offscreen target, then blitted to
//! the swap chain. Small, but it touches every resource kind and every
//! step of the frame protocol:
//!
//! ```text
//! acquire → get_cmd → write uniforms → target→COLOR_OUTPUT → draw
//!         → target→TRANSFER_SRC → blit to swap chain → submit → present
//! ```
//!
//! Each frame slot owns a uniform buffer and a descriptor set pointing at
//! it. A slot's uniforms are only written after `get_cmd` has waited on
//! that slot's fence, so the GPU never reads constants the host is
//! rewriting.
//!
//! The target, descriptor sets and pipeline follow the swap chain size and
//! are rebuilt on resize through [`SwapChainDependents`].

use bytemuck::{Pod, Zeroable};
use lumen_core::Arena;
use smallvec::smallvec;
use tracing::debug;

use lumen_render::{
    BufferDesc, BufferId, BufferType, ClearValue, Descriptor, DescriptorSetDesc, DescriptorSetId,
    Format, GpuBackend, GraphicsPipelineDesc, GraphicsPipelineId, ImageLayout,
    RenderError, RenderResult, RenderTargetBarrier, RenderTargetBindDesc, RenderTargetBinding,
    RenderTargetDesc, RenderTargetId, Renderer, SamplerDesc, SamplerFilter, SamplerId, ShaderDesc,
    ShaderId, ShaderStage, SwapChainDependents, TextureDesc, TextureId, VertexAttrib, VertexLayout,
    CONCURRENT_FRAMES,
};

/// Size of each frame slot's uniform buffer. Host copies into uniform
/// buffers must be a multiple of the device's offset alignment.
pub const UNIFORM_STRIDE: u64 = 256;

/// Edge length of the generated checker texture.
const CHECKER_SIZE: u32 = 8;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Per-frame uniform block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    /// Seconds since the first frame, at a fixed 60 Hz step.
    pub time: f32,
    /// Frame number, truncated.
    pub frame: u32,
    /// Swap chain width.
    pub width: u32,
    /// Swap chain height.
    pub height: u32,
}

/// Resources of the demo scene.
#[derive(Debug, Default)]
pub struct FrameScene {
    vertex_shader: Option<ShaderId>,
    fragment_shader: Option<ShaderId>,
    vertices: Option<BufferId>,
    uniforms: [Option<BufferId>; CONCURRENT_FRAMES],
    checker: Option<TextureId>,
    sampler: Option<SamplerId>,

    target: Option<RenderTargetId>,
    sets: [Option<DescriptorSetId>; CONCURRENT_FRAMES],
    pipeline: Option<GraphicsPipelineId>,
}

impl FrameScene {
    /// Loads every scene resource. The checker texture goes through the
    /// staging upload.
    ///
    /// # Errors
    ///
    /// Any resource creation error.
    pub fn new<B: GpuBackend>(renderer: &mut Renderer<B>) -> RenderResult<Self> {
        let mut scene = Self::default();

        renderer.add_shader(&shader(ShaderStage::Vertex), &mut scene.vertex_shader)?;
        renderer.add_shader(&shader(ShaderStage::Fragment), &mut scene.fragment_shader)?;

        let triangle: [f32; 15] = [
            -1.0, -1.0, 0.0, 0.0, 0.0, //
            3.0, -1.0, 0.0, 2.0, 0.0, //
            -1.0, 3.0, 0.0, 0.0, 2.0,
        ];
        let vertices = BufferDesc::array(BufferType::Vertex, 20, 3);
        renderer.add_buffer(&vertices, &mut scene.vertices, Some(bytemuck::cast_slice(&triangle)))?;

        let uniforms = BufferDesc::bytes(BufferType::Uniform, UNIFORM_STRIDE);
        for slot in &mut scene.uniforms {
            renderer.add_buffer(&uniforms, slot, None)?;
        }

        let texels = checker(CHECKER_SIZE);
        let desc = TextureDesc::sampled_2d(
            Format::Rgba8Unorm,
            CHECKER_SIZE,
            CHECKER_SIZE,
            lumen_render::max_mip_count(CHECKER_SIZE, CHECKER_SIZE) + 1,
        );
        renderer.add_texture(&desc, &mut scene.checker, Some(&texels))?;

        let sampler = SamplerDesc {
            min_filter: SamplerFilter::Linear,
            mag_filter: SamplerFilter::Nearest,
            mip_filter: SamplerFilter::Linear,
            ..SamplerDesc::default()
        };
        renderer.add_sampler(&sampler, &mut scene.sampler)?;

        scene.rebuild(renderer)?;
        debug!("frame scene loaded");
        Ok(scene)
    }

    /// Records, submits and presents frame `frame`.
    ///
    /// `scratch` holds this frame's host data and is cleared first.
    ///
    /// # Errors
    ///
    /// Any acquire, record, submit or present error.
    pub fn render_frame<B: GpuBackend>(
        &self,
        renderer: &mut Renderer<B>,
        frame: u64,
        scratch: &mut Arena,
    ) -> RenderResult<()> {
        let (Some(target), Some(pipeline), Some(vertices)) = (self.target, self.pipeline, self.vertices) else {
            return Err(RenderError::InvalidArgument("frame scene is not loaded"));
        };

        renderer.acquire_next_image(frame)?;
        let slot = renderer.active_frame();
        let (Some(uniforms), Some(set)) = (self.uniforms[slot], self.sets[slot]) else {
            return Err(RenderError::InvalidArgument("frame scene is not loaded"));
        };
        // Waits until the GPU is done with this slot's previous frame.
        let cmd = renderer.get_cmd(false)?;
        let extent = renderer.swap_chain().extent();

        scratch.clear();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let constants = FrameConstants {
            time: frame as f32 / 60.0,
            frame: frame as u32,
            width: extent.width,
            height: extent.height,
        };
        let block = scratch.push_zero_aligned(UNIFORM_STRIDE as usize, 16)?;
        let bytes = scratch
            .bytes_mut(block)
            .ok_or(RenderError::InvalidArgument("scratch block out of range"))?;
        bytes[..std::mem::size_of::<FrameConstants>()].copy_from_slice(bytemuck::bytes_of(&constants));
        renderer.copy_to_buffer(uniforms, 0, bytes)?;

        let target_texture = renderer.render_target(target)?.texture();
        renderer.begin_cmd(cmd)?;
        {
            let mut rec = renderer.cmd(cmd)?;
            let layout = rec.renderer().texture(target_texture)?.layout();
            rec.render_target_barrier(&[RenderTargetBarrier::new(target, layout, ImageLayout::ColorOutput)])?;

            let targets = RenderTargetBindDesc {
                colors: smallvec![RenderTargetBinding::cleared(target)],
                depth: None,
            };
            rec.bind_render_targets(&targets)?;
            rec.bind_graphics_pipeline(pipeline)?;
            rec.bind_descriptor_set(pipeline, set, 0)?;
            rec.set_viewport_to(target)?;
            rec.set_scissor_to(target)?;
            rec.bind_vertex_buffer(vertices)?;
            rec.draw(3, 1)?;
            rec.unbind_render_targets()?;

            rec.render_target_barrier(&[RenderTargetBarrier::new(
                target,
                ImageLayout::ColorOutput,
                ImageLayout::TransferSrc,
            )])?;
            rec.copy_to_swap_chain(target_texture)?;
        }
        renderer.end_cmd(cmd)?;
        renderer.submit_frame(cmd)?;
        renderer.present()
    }

    /// Removes every scene resource. Drain the GPU first.
    ///
    /// # Errors
    ///
    /// Any `remove_*` error.
    pub fn destroy<B: GpuBackend>(mut self, renderer: &mut Renderer<B>) -> RenderResult<()> {
        self.release(renderer)?;
        renderer.remove_sampler(&mut self.sampler)?;
        renderer.remove_texture(&mut self.checker)?;
        for slot in &mut self.uniforms {
            renderer.remove_buffer(slot)?;
        }
        renderer.remove_buffer(&mut self.vertices)?;
        renderer.remove_shader(&mut self.fragment_shader)?;
        renderer.remove_shader(&mut self.vertex_shader)
    }

    /// Current offscreen target.
    #[must_use]
    pub const fn target(&self) -> Option<RenderTargetId> {
        self.target
    }

    /// Uniform buffer of frame slot `slot`.
    #[must_use]
    pub fn uniforms(&self, slot: usize) -> Option<BufferId> {
        self.uniforms.get(slot).copied().flatten()
    }

    /// Descriptor set of frame slot `slot`.
    #[must_use]
    pub fn descriptor_set(&self, slot: usize) -> Option<DescriptorSetId> {
        self.sets.get(slot).copied().flatten()
    }
}

impl<B: GpuBackend> SwapChainDependents<B> for FrameScene {
    fn release(&mut self, renderer: &mut Renderer<B>) -> RenderResult<()> {
        renderer.remove_graphics_pipeline(&mut self.pipeline)?;
        for set in &mut self.sets {
            renderer.remove_descriptor_set(set)?;
        }
        renderer.remove_render_target(&mut self.target)
    }

    fn rebuild(&mut self, renderer: &mut Renderer<B>) -> RenderResult<()> {
        let (Some(checker), Some(sampler), Some(vs), Some(fs)) =
            (self.checker, self.sampler, self.vertex_shader, self.fragment_shader)
        else {
            return Err(RenderError::InvalidArgument("frame scene is not loaded"));
        };

        let extent = renderer.swap_chain().extent();
        let clear = ClearValue { color: [0.02, 0.02, 0.05, 1.0], depth: 0.0 };
        let target = RenderTargetDesc::new(Format::Rgba8Unorm, extent, clear);
        renderer.add_render_target(&target, &mut self.target)?;

        for (set, uniforms) in self.sets.iter_mut().zip(self.uniforms) {
            let uniforms = uniforms.ok_or(RenderError::InvalidArgument("frame scene is not loaded"))?;
            let desc = DescriptorSetDesc::new([
                Descriptor::uniform(uniforms),
                Descriptor::texture(checker),
                Descriptor::sampler(sampler),
            ]);
            renderer.add_descriptor_set(&desc, set)?;
        }

        // Every slot's set shares one layout.
        let Some(set) = self.sets[0] else {
            return Err(RenderError::InvalidArgument("descriptor set was not created"));
        };
        let mut pipeline = GraphicsPipelineDesc::new(vs, fs);
        pipeline.color_formats.push(Format::Rgba8Unorm);
        pipeline.descriptor_sets.push(set);
        pipeline.vertex_layout = VertexLayout::new(&[VertexAttrib::Float3, VertexAttrib::Float2])?;
        renderer.add_graphics_pipeline(&pipeline, &mut self.pipeline)?;

        debug!(width = extent.width, height = extent.height, "frame scene rebuilt");
        Ok(())
    }
}

/// A placeholder module: the SPIR-V header and nothing else. Backends that
/// compile shaders need real bytecode from the asset pipeline.
fn shader(stage: ShaderStage) -> ShaderDesc {
    let words = [SPIRV_MAGIC, 0x0001_0300, 0, 1, 0];
    ShaderDesc { stage, bytecode: bytemuck::cast_slice(&words).to_vec() }
}

/// RGBA8 checkerboard of 1-texel squares.
fn checker(size: u32) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let lit = (i % size + i / size) % 2 == 0;
            if lit {
                [0xFF, 0xFF, 0xFF, 0xFF]
            } else {
                [0x20, 0x20, 0x20, 0xFF]
            }
        })
        .collect()
}
