//! # Renderer Vocabulary
//!
//! Backend-neutral enums and small value types: formats, layouts, pipeline
//! stages, access masks and fixed-function state. Each backend owns the
//! translation from these to its native values.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Texel format of a texture, render target or swap chain image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// No format. Used for "no depth attachment".
    #[default]
    Undefined,
    /// One 8-bit sRGB channel.
    R8Srgb,
    /// Two 8-bit sRGB channels.
    Rg8Srgb,
    /// Three 8-bit sRGB channels.
    Rgb8Srgb,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8Srgb,
    /// 8-bit RGBA, linear.
    Rgba8Unorm,
    /// 16-bit RGBA, normalized.
    Rgba16Unorm,
    /// 8-bit BGRA, sRGB encoded. Common swap chain format.
    Bgra8Srgb,
    /// 8-bit BGRA, linear.
    Bgra8Unorm,
    /// Two 32-bit float channels.
    Rg32Float,
    /// Three 32-bit float channels.
    Rgb32Float,
    /// 32-bit float RGBA.
    Rgba32Float,
    /// 16-bit float RGBA. HDR scene color.
    Rgba16Float,
    /// 32-bit float depth.
    D32Float,
    /// 16-bit normalized depth.
    D16Unorm,
}

impl Format {
    /// Bytes per texel. Zero for [`Format::Undefined`].
    #[must_use]
    pub const fn texel_size(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::R8Srgb => 1,
            Self::Rg8Srgb | Self::D16Unorm => 2,
            Self::Rgb8Srgb => 3,
            Self::Rgba8Srgb | Self::Rgba8Unorm | Self::Bgra8Srgb | Self::Bgra8Unorm | Self::D32Float => 4,
            Self::Rgba16Unorm | Self::Rgba16Float | Self::Rg32Float => 8,
            Self::Rgb32Float => 12,
            Self::Rgba32Float => 16,
        }
    }

    /// Returns true for depth formats.
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::D32Float | Self::D16Unorm)
    }
}

/// Color space a surface format is presented in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Standard sRGB.
    SrgbNonLinear,
    /// Linear extended sRGB, for HDR output.
    ExtendedSrgbLinear,
}

/// A format/color-space pair offered by a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    /// Texel format.
    pub format: Format,
    /// Color space.
    pub color_space: ColorSpace,
}

/// Presentation scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// No vsync. May tear.
    Immediate,
    /// Vsync, newest frame replaces the queued one.
    Mailbox,
    /// Vsync with a queue. Always supported.
    Fifo,
    /// Vsync unless a frame is late, then tears.
    FifoRelaxed,
}

/// Access mode an image is currently in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents are discarded.
    #[default]
    Undefined,
    /// Any access, including storage writes.
    General,
    /// Color attachment.
    ColorOutput,
    /// Ready for the presentation engine.
    PresentSrc,
    /// Source of a copy or blit.
    TransferSrc,
    /// Destination of a copy, blit or clear.
    TransferDst,
    /// Sampled from shaders.
    ShaderReadOnly,
    /// Depth attachment.
    DepthStencilOutput,
}

/// Pipeline stage a barrier synchronizes against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Before any work.
    Top,
    /// Vertex and index fetch.
    VertexInput,
    /// Vertex shading.
    VertexShader,
    /// Fragment shading.
    FragmentShader,
    /// Compute dispatches.
    ComputeShader,
    /// Color attachment writes.
    ColorOutput,
    /// Copies, blits and clears.
    Transfer,
    /// After all work.
    Bottom,
    /// Every stage.
    #[default]
    All,
}

bitflags! {
    /// Memory access mask on either side of a barrier.
    pub struct MemoryAccess: u32 {
        /// Shader reads.
        const SHADER_READ = 1 << 0;
        /// Shader writes.
        const SHADER_WRITE = 1 << 1;
        /// Copy and blit reads.
        const TRANSFER_READ = 1 << 2;
        /// Copy, blit and clear writes.
        const TRANSFER_WRITE = 1 << 3;
        /// Attachment reads, blending included.
        const COLOR_OUTPUT_READ = 1 << 4;
        /// Attachment writes.
        const COLOR_OUTPUT_WRITE = 1 << 5;
        /// Any read.
        const ALL_READS = 1 << 6;
        /// Any write.
        const ALL_WRITES = 1 << 7;
    }
}

bitflags! {
    /// How a texture may be used. Fixed at creation.
    pub struct TextureUsage: u32 {
        /// Color attachment.
        const COLOR_TARGET = 1 << 0;
        /// Depth attachment.
        const DEPTH_TARGET = 1 << 1;
        /// Copy and blit source.
        const TRANSFER_SRC = 1 << 2;
        /// Copy, blit and clear destination.
        const TRANSFER_DST = 1 << 3;
        /// Sampled in shaders.
        const SAMPLED = 1 << 4;
        /// Storage image.
        const STORAGE = 1 << 5;
    }
}

bitflags! {
    /// Shader stages a constant block or binding is visible to.
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Compute stage.
        const COMPUTE = 1 << 2;
        /// Vertex and fragment.
        const GRAPHICS = Self::VERTEX.bits | Self::FRAGMENT.bits;
    }
}

/// Texture dimensionality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// One-dimensional.
    D1,
    /// Two-dimensional.
    #[default]
    D2,
    /// Volume.
    D3,
    /// Six square faces.
    Cube,
}

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// Vertex data.
    Vertex,
    /// Index data.
    Index,
    /// Uniform block.
    Uniform,
    /// Read-write storage.
    Storage,
    /// Host-visible copy source.
    Staging,
    /// Indirect draw or dispatch arguments.
    Indirect,
}

/// Texel filter for samplers and blits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    /// Blend neighbouring texels.
    Linear,
    /// Closest texel.
    #[default]
    Nearest,
}

/// Addressing outside `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Wrap around.
    #[default]
    Repeat,
    /// Clamp to the edge texel.
    Clamp,
    /// Use the border color.
    ClampToBorder,
}

/// Border color for [`AddressMode::ClampToBorder`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BorderColor {
    /// Opaque black.
    #[default]
    Black,
    /// Opaque white.
    White,
    /// Opaque white for float formats.
    WhiteFloat,
}

/// Attachment load behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Previous contents are undefined.
    DontCare,
    /// Keep previous contents.
    #[default]
    Load,
    /// Clear to the target's clear value.
    Clear,
}

/// Attachment store behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Contents may be discarded.
    DontCare,
    /// Write results back.
    #[default]
    Store,
}

/// Clear color and depth of a render target.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClearValue {
    /// RGBA clear color.
    pub color: [f32; 4],
    /// Depth clear value. Reverse depth clears to 0.
    pub depth: f32,
}

/// Depth comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Always fails.
    Never,
    /// Passes if less.
    Less,
    /// Passes if less or equal.
    LessOrEqual,
    /// Passes if equal.
    Equal,
    /// Passes if greater or equal.
    GreaterOrEqual,
    /// Reverse depth: near is 1, far is 0.
    #[default]
    Greater,
    /// Always passes.
    Always,
}

/// Primitive assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// Every three vertices form a triangle.
    #[default]
    TriangleList,
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillMode {
    /// Filled polygons.
    #[default]
    Solid,
    /// Wireframe.
    Line,
    /// Vertices only.
    Point,
}

/// Face culling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// Draw both faces.
    #[default]
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
    /// Cull everything.
    All,
}

/// Winding of front faces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrontFace {
    /// Clockwise winding is front.
    Clockwise,
    /// Counter-clockwise winding is front.
    #[default]
    CounterClockwise,
}

/// Blend factor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// Zero.
    #[default]
    Zero,
    /// One.
    One,
    /// Source color.
    SrcColor,
    /// 1 - source color.
    OneMinusSrcColor,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
}

/// Blend equation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

bitflags! {
    /// Color channels written by a pipeline.
    pub struct ColorComponents: u32 {
        /// Red.
        const R = 1 << 0;
        /// Green.
        const G = 1 << 1;
        /// Blue.
        const B = 1 << 2;
        /// Alpha.
        const A = 1 << 3;
    }
}

/// Color blending for every attachment of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendState {
    /// Blending on. When off, source replaces destination.
    pub enabled: bool,
    /// Factor on source color.
    pub src_color: BlendFactor,
    /// Factor on destination color.
    pub dst_color: BlendFactor,
    /// Factor on source alpha.
    pub src_alpha: BlendFactor,
    /// Factor on destination alpha.
    pub dst_alpha: BlendFactor,
    /// Equation for color and alpha.
    pub op: BlendOp,
    /// Channels written.
    pub write_mask: ColorComponents,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            src_color: BlendFactor::Zero,
            dst_color: BlendFactor::Zero,
            src_alpha: BlendFactor::Zero,
            dst_alpha: BlendFactor::Zero,
            op: BlendOp::Add,
            write_mask: ColorComponents::all(),
        }
    }
}

/// Width of indices in an index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices.
    U16,
    /// 32-bit indices.
    U32,
}

/// Which pipeline a binding targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindPoint {
    /// Graphics pipeline.
    Graphics,
    /// Compute pipeline.
    Compute,
}

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Creates an extent.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Halves both sides, clamping at 1. Used to step down a mip chain.
    #[must_use]
    pub const fn mip_down(self) -> Self {
        Self {
            width: if self.width > 1 { self.width / 2 } else { 1 },
            height: if self.height > 1 { self.height / 2 } else { 1 },
        }
    }
}

/// Viewport transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Depth mapped to the near plane.
    pub min_depth: f32,
    /// Depth mapped to the far plane.
    pub max_depth: f32,
}

/// Integer rectangle for scissors and render areas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect2d {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect2d {
    /// A rectangle at the origin covering `extent`.
    #[must_use]
    pub const fn from_extent(extent: Extent2d) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texel_sizes() {
        assert_eq!(Format::Undefined.texel_size(), 0);
        assert_eq!(Format::Rgba8Srgb.texel_size(), 4);
        assert_eq!(Format::Rgb32Float.texel_size(), 12);
        assert!(Format::D16Unorm.is_depth());
        assert!(!Format::Bgra8Unorm.is_depth());
    }

    #[test]
    fn test_mip_down_clamps_to_one() {
        let mut extent = Extent2d::new(8, 2);
        extent = extent.mip_down();
        assert_eq!(extent, Extent2d::new(4, 1));
        extent = extent.mip_down().mip_down().mip_down();
        assert_eq!(extent, Extent2d::new(1, 1));
    }

    #[test]
    fn test_default_depth_is_reverse() {
        assert_eq!(CompareOp::default(), CompareOp::Greater);
    }
}
