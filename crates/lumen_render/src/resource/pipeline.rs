//! Graphics and compute pipelines, vertex layouts and push-constant blocks.

use smallvec::SmallVec;

use crate::backend::{GpuBackend, MAX_COLOR_ATTACHMENTS};
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::{BlendState, CompareOp, CullMode, FillMode, Format, FrontFace, PrimitiveType, ShaderStages};

use super::{
    ensure_capacity, ensure_empty, occupied, ComputePipelineId, DescriptorSetId, GraphicsPipelineId,
    ResourceKind, ShaderId, ShaderStage,
};

/// Maximum vertex attributes in a layout.
pub const MAX_VERTEX_ATTRIBUTES: usize = 8;

/// Maximum push-constant blocks per pipeline.
pub const MAX_CONSTANT_BLOCKS: usize = 4;

/// Maximum descriptor sets per pipeline.
pub const MAX_PIPELINE_DESCRIPTOR_SETS: usize = 16;

/// Type of one vertex attribute. All components are 32-bit floats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexAttrib {
    /// One float.
    Float,
    /// Two floats.
    Float2,
    /// Three floats.
    Float3,
    /// Four floats.
    Float4,
}

impl VertexAttrib {
    /// Number of float components.
    #[must_use]
    pub const fn components(self) -> u32 {
        match self {
            Self::Float => 1,
            Self::Float2 => 2,
            Self::Float3 => 3,
            Self::Float4 => 4,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        self.components() * 4
    }
}

/// A placed vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Byte offset within a vertex.
    pub offset: u32,
    /// Attribute type.
    pub attrib: VertexAttrib,
}

/// Interleaved layout of a single vertex buffer binding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    attributes: SmallVec<[VertexAttribute; MAX_VERTEX_ATTRIBUTES]>,
    stride: u32,
}

impl VertexLayout {
    /// Packs `attribs` tightly in order: attribute `i` gets location `i`
    /// and starts where the previous one ended.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] for more than
    /// [`MAX_VERTEX_ATTRIBUTES`] attributes.
    pub fn new(attribs: &[VertexAttrib]) -> RenderResult<Self> {
        if attribs.len() > MAX_VERTEX_ATTRIBUTES {
            return Err(RenderError::InvalidArgument("too many vertex attributes"));
        }

        let mut layout = Self::default();
        for (location, &attrib) in (0u32..).zip(attribs) {
            layout.attributes.push(VertexAttribute { location, offset: layout.stride, attrib });
            layout.stride += attrib.size();
        }
        Ok(layout)
    }

    /// Placed attributes, in location order.
    #[must_use]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Bytes per vertex.
    #[must_use]
    pub const fn stride(&self) -> u32 {
        self.stride
    }

    /// True when the pipeline takes no vertex input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A push-constant range. Every block starts at offset 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstantBlock {
    /// Stages that read the block.
    pub stages: ShaderStages,
    /// Size in bytes.
    pub size: u32,
}

/// Immutable description of a graphics pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineDesc {
    /// Color attachment formats.
    pub color_formats: SmallVec<[Format; MAX_COLOR_ATTACHMENTS]>,
    /// Depth attachment format, `Undefined` for none.
    pub depth_format: Format,
    /// Descriptor sets whose layouts form the pipeline layout.
    pub descriptor_sets: SmallVec<[DescriptorSetId; 4]>,
    /// Push-constant blocks.
    pub constant_blocks: SmallVec<[ConstantBlock; MAX_CONSTANT_BLOCKS]>,
    /// Vertex stage module.
    pub vertex_shader: ShaderId,
    /// Fragment stage module.
    pub fragment_shader: ShaderId,
    /// Vertex buffer layout. Empty for no vertex input.
    pub vertex_layout: VertexLayout,
    /// Primitive assembly.
    pub primitive: PrimitiveType,
    /// Rasterization mode.
    pub fill_mode: FillMode,
    /// Culled faces.
    pub cull_mode: CullMode,
    /// Winding of front faces.
    pub front_face: FrontFace,
    /// Width of wireframe lines. Must be positive.
    pub line_width: f32,
    /// Test fragments against the depth attachment.
    pub depth_test: bool,
    /// Write depth for passing fragments.
    pub depth_write: bool,
    /// Depth comparison.
    pub depth_op: CompareOp,
    /// Color blending for every attachment.
    pub blend: BlendState,
}

impl GraphicsPipelineDesc {
    /// A pipeline with no attachments, no vertex input and default
    /// fixed-function state.
    #[must_use]
    pub fn new(vertex_shader: ShaderId, fragment_shader: ShaderId) -> Self {
        Self {
            color_formats: SmallVec::new(),
            depth_format: Format::Undefined,
            descriptor_sets: SmallVec::new(),
            constant_blocks: SmallVec::new(),
            vertex_shader,
            fragment_shader,
            vertex_layout: VertexLayout::default(),
            primitive: PrimitiveType::default(),
            fill_mode: FillMode::default(),
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            line_width: 1.0,
            depth_test: false,
            depth_write: false,
            depth_op: CompareOp::default(),
            blend: BlendState::default(),
        }
    }

    fn validate(&self) -> RenderResult<()> {
        if self.color_formats.len() > MAX_COLOR_ATTACHMENTS {
            return Err(RenderError::InvalidArgument("too many color attachments"));
        }
        if self.color_formats.iter().any(|f| *f == Format::Undefined || f.is_depth()) {
            return Err(RenderError::InvalidArgument("color attachment format must be a color format"));
        }
        if self.depth_format != Format::Undefined && !self.depth_format.is_depth() {
            return Err(RenderError::InvalidArgument("depth attachment format must be a depth format"));
        }
        if self.line_width <= 0.0 {
            return Err(RenderError::InvalidArgument("line width must be positive"));
        }
        validate_layout(&self.descriptor_sets, &self.constant_blocks)
    }
}

/// Immutable description of a compute pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    /// Descriptor sets whose layouts form the pipeline layout.
    pub descriptor_sets: SmallVec<[DescriptorSetId; 4]>,
    /// Push-constant blocks.
    pub constant_blocks: SmallVec<[ConstantBlock; MAX_CONSTANT_BLOCKS]>,
    /// Compute stage module.
    pub compute_shader: ShaderId,
}

impl ComputePipelineDesc {
    /// A pipeline with no sets and no constants.
    #[must_use]
    pub fn new(compute_shader: ShaderId) -> Self {
        Self { descriptor_sets: SmallVec::new(), constant_blocks: SmallVec::new(), compute_shader }
    }
}

fn validate_layout(sets: &[DescriptorSetId], blocks: &[ConstantBlock]) -> RenderResult<()> {
    if sets.len() > MAX_PIPELINE_DESCRIPTOR_SETS {
        return Err(RenderError::InvalidArgument("too many pipeline descriptor sets"));
    }
    if blocks.len() > MAX_CONSTANT_BLOCKS {
        return Err(RenderError::InvalidArgument("too many push-constant blocks"));
    }
    if blocks.iter().any(|b| b.size == 0 || b.size % 4 != 0 || b.stages.is_empty()) {
        return Err(RenderError::InvalidArgument("push-constant block must be non-empty words"));
    }
    Ok(())
}

/// A pooled graphics pipeline.
pub struct GraphicsPipeline<B: GpuBackend> {
    desc: GraphicsPipelineDesc,
    native: B::GraphicsPipeline,
}

impl<B: GpuBackend> GraphicsPipeline<B> {
    /// Description the pipeline was created from.
    #[must_use]
    pub const fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    /// Native graphics pipeline.
    #[must_use]
    pub const fn native(&self) -> &B::GraphicsPipeline {
        &self.native
    }
}

/// A pooled compute pipeline.
pub struct ComputePipeline<B: GpuBackend> {
    desc: ComputePipelineDesc,
    native: B::ComputePipeline,
}

impl<B: GpuBackend> ComputePipeline<B> {
    /// Description the pipeline was created from.
    #[must_use]
    pub const fn desc(&self) -> &ComputePipelineDesc {
        &self.desc
    }

    /// Native compute pipeline.
    #[must_use]
    pub const fn native(&self) -> &B::ComputePipeline {
        &self.native
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates a graphics pipeline in `slot`. The descriptor sets and
    /// shaders it names must be live; the pipeline does not keep them alive.
    ///
    /// # Errors
    ///
    /// - [`RenderError::HandleNotNull`] if `slot` is occupied
    /// - [`RenderError::InvalidArgument`] for counts over their limits,
    ///   mismatched attachment formats or shaders of the wrong stage
    /// - a stale handle, pool exhaustion or native failure
    pub fn add_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
        slot: &mut Option<GraphicsPipelineId>,
    ) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::GraphicsPipeline)?;
        desc.validate()?;

        let vertex = self.shaders.get(desc.vertex_shader.0)?;
        let fragment = self.shaders.get(desc.fragment_shader.0)?;
        if vertex.stage() != ShaderStage::Vertex || fragment.stage() != ShaderStage::Fragment {
            return Err(RenderError::InvalidArgument("graphics pipeline needs vertex and fragment shaders"));
        }
        let sets = desc
            .descriptor_sets
            .iter()
            .map(|id| -> RenderResult<_> { Ok(self.descriptor_sets.get(id.0)?.native()) })
            .collect::<RenderResult<SmallVec<[_; 4]>>>()?;
        ensure_capacity(&self.graphics_pipelines)?;

        let native =
            self.backend.create_graphics_pipeline(desc, vertex.native(), fragment.native(), &sets)?;
        drop(sets);

        let pipeline = GraphicsPipeline { desc: desc.clone(), native };
        *slot = Some(GraphicsPipelineId(self.graphics_pipelines.alloc(pipeline)?));
        Ok(())
    }

    /// Destroys the graphics pipeline in `slot` and empties it.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_graphics_pipeline(&mut self, slot: &mut Option<GraphicsPipelineId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::GraphicsPipeline)?;
        let pipeline = self.graphics_pipelines.free(id.0)?;
        self.backend.destroy_graphics_pipeline(pipeline.native);
        *slot = None;
        Ok(())
    }

    /// Looks up a live graphics pipeline.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn graphics_pipeline(&self, id: GraphicsPipelineId) -> RenderResult<&GraphicsPipeline<B>> {
        Ok(self.graphics_pipelines.get(id.0)?)
    }

    /// Creates a compute pipeline in `slot`.
    ///
    /// # Errors
    ///
    /// As [`Renderer::add_graphics_pipeline`], with a compute shader.
    pub fn add_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDesc,
        slot: &mut Option<ComputePipelineId>,
    ) -> RenderResult<()> {
        ensure_empty(slot, ResourceKind::ComputePipeline)?;
        validate_layout(&desc.descriptor_sets, &desc.constant_blocks)?;

        let compute = self.shaders.get(desc.compute_shader.0)?;
        if compute.stage() != ShaderStage::Compute {
            return Err(RenderError::InvalidArgument("compute pipeline needs a compute shader"));
        }
        let sets = desc
            .descriptor_sets
            .iter()
            .map(|id| -> RenderResult<_> { Ok(self.descriptor_sets.get(id.0)?.native()) })
            .collect::<RenderResult<SmallVec<[_; 4]>>>()?;
        ensure_capacity(&self.compute_pipelines)?;

        let native = self.backend.create_compute_pipeline(desc, compute.native(), &sets)?;
        drop(sets);

        let pipeline = ComputePipeline { desc: desc.clone(), native };
        *slot = Some(ComputePipelineId(self.compute_pipelines.alloc(pipeline)?));
        Ok(())
    }

    /// Destroys the compute pipeline in `slot` and empties it.
    ///
    /// # Errors
    ///
    /// [`RenderError::HandleIsNull`] for an empty slot, or a stale handle.
    pub fn remove_compute_pipeline(&mut self, slot: &mut Option<ComputePipelineId>) -> RenderResult<()> {
        let id = occupied(slot, ResourceKind::ComputePipeline)?;
        let pipeline = self.compute_pipelines.free(id.0)?;
        self.backend.destroy_compute_pipeline(pipeline.native);
        *slot = None;
        Ok(())
    }

    /// Looks up a live compute pipeline.
    ///
    /// # Errors
    ///
    /// Stale handle.
    pub fn compute_pipeline(&self, id: ComputePipelineId) -> RenderResult<&ComputePipeline<B>> {
        Ok(self.compute_pipelines.get(id.0)?)
    }
}
