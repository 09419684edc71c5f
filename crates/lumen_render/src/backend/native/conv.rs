//! Translation from renderer vocabulary to wgpu values.

use crate::error::{BackendError, BackendResult};
use crate::resource::{BufferDesc, DescriptorType, ShaderStage, VertexAttrib};
use crate::types::{
    AddressMode, BlendFactor, BlendOp, BlendState, BorderColor, BufferType, ColorComponents,
    CompareOp, CullMode, FillMode, Format, FrontFace, IndexType, LoadOp, PresentMode, SamplerFilter,
    ShaderStages, StoreOp, TextureDimension, TextureUsage,
};

/// Maps a texel format. Formats wgpu has no equivalent for are unsupported.
pub fn texture_format(format: Format) -> BackendResult<wgpu::TextureFormat> {
    use wgpu::TextureFormat as Tf;
    let native = match format {
        Format::Rgba8Srgb => Tf::Rgba8UnormSrgb,
        Format::Rgba8Unorm => Tf::Rgba8Unorm,
        Format::Rgba16Unorm => Tf::Rgba16Unorm,
        Format::Bgra8Srgb => Tf::Bgra8UnormSrgb,
        Format::Bgra8Unorm => Tf::Bgra8Unorm,
        Format::Rg32Float => Tf::Rg32Float,
        Format::Rgba32Float => Tf::Rgba32Float,
        Format::Rgba16Float => Tf::Rgba16Float,
        Format::D32Float => Tf::Depth32Float,
        Format::D16Unorm => Tf::Depth16Unorm,
        Format::Undefined | Format::R8Srgb | Format::Rg8Srgb | Format::Rgb8Srgb | Format::Rgb32Float => {
            return Err(BackendError::Unsupported(format!("texture format {format:?}")));
        }
    };
    Ok(native)
}

/// Maps a surface format back. `None` for formats the core does not name.
pub fn format_from_native(format: wgpu::TextureFormat) -> Option<Format> {
    use wgpu::TextureFormat as Tf;
    Some(match format {
        Tf::Rgba8UnormSrgb => Format::Rgba8Srgb,
        Tf::Rgba8Unorm => Format::Rgba8Unorm,
        Tf::Bgra8UnormSrgb => Format::Bgra8Srgb,
        Tf::Bgra8Unorm => Format::Bgra8Unorm,
        Tf::Rgba16Float => Format::Rgba16Float,
        _ => return None,
    })
}

pub fn present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
        PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
        PresentMode::Fifo => wgpu::PresentMode::Fifo,
        PresentMode::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
    }
}

pub fn present_mode_from_native(mode: wgpu::PresentMode) -> Option<PresentMode> {
    match mode {
        wgpu::PresentMode::Immediate => Some(PresentMode::Immediate),
        wgpu::PresentMode::Mailbox => Some(PresentMode::Mailbox),
        wgpu::PresentMode::Fifo => Some(PresentMode::Fifo),
        wgpu::PresentMode::FifoRelaxed => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

/// Buffer usage. Every buffer is a copy destination so host writes and
/// fills work regardless of type.
pub fn buffer_usage(desc: &BufferDesc) -> wgpu::BufferUsages {
    use wgpu::BufferUsages as Bu;
    let usage = match desc.kind {
        BufferType::Vertex => Bu::VERTEX,
        BufferType::Index => Bu::INDEX,
        BufferType::Uniform => Bu::UNIFORM,
        BufferType::Storage => Bu::STORAGE | Bu::COPY_SRC,
        BufferType::Staging => Bu::COPY_SRC,
        BufferType::Indirect => Bu::INDIRECT,
    };
    usage | Bu::COPY_DST
}

/// Texture usage. Mipmapped color textures also get render and sample
/// access for the blit chain.
pub fn texture_usage(usage: TextureUsage, mip_count: u32, format: Format) -> wgpu::TextureUsages {
    use wgpu::TextureUsages as Tu;
    let mut native = Tu::empty();
    if usage.intersects(TextureUsage::COLOR_TARGET | TextureUsage::DEPTH_TARGET) {
        native |= Tu::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        native |= Tu::COPY_SRC;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        native |= Tu::COPY_DST;
    }
    if usage.contains(TextureUsage::SAMPLED) {
        native |= Tu::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE) {
        native |= Tu::STORAGE_BINDING;
    }
    if mip_count > 1 && !format.is_depth() {
        native |= Tu::RENDER_ATTACHMENT | Tu::TEXTURE_BINDING;
    }
    native
}

/// Texture dimension and the view dimension of its default view.
pub fn texture_dimension(dimension: TextureDimension) -> (wgpu::TextureDimension, wgpu::TextureViewDimension) {
    match dimension {
        TextureDimension::D1 => (wgpu::TextureDimension::D1, wgpu::TextureViewDimension::D1),
        TextureDimension::D2 => (wgpu::TextureDimension::D2, wgpu::TextureViewDimension::D2),
        TextureDimension::D3 => (wgpu::TextureDimension::D3, wgpu::TextureViewDimension::D3),
        TextureDimension::Cube => (wgpu::TextureDimension::D2, wgpu::TextureViewDimension::Cube),
    }
}

pub fn filter(filter: SamplerFilter) -> wgpu::FilterMode {
    match filter {
        SamplerFilter::Linear => wgpu::FilterMode::Linear,
        SamplerFilter::Nearest => wgpu::FilterMode::Nearest,
    }
}

pub fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::ClampToBorder => wgpu::AddressMode::ClampToBorder,
    }
}

pub fn border_color(color: BorderColor) -> wgpu::SamplerBorderColor {
    match color {
        BorderColor::Black => wgpu::SamplerBorderColor::OpaqueBlack,
        BorderColor::White | BorderColor::WhiteFloat => wgpu::SamplerBorderColor::OpaqueWhite,
    }
}

pub fn shader_stages(stages: ShaderStages) -> wgpu::ShaderStages {
    let mut native = wgpu::ShaderStages::NONE;
    if stages.contains(ShaderStages::VERTEX) {
        native |= wgpu::ShaderStages::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        native |= wgpu::ShaderStages::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        native |= wgpu::ShaderStages::COMPUTE;
    }
    native
}

pub const fn shader_stage(stage: ShaderStage) -> wgpu::ShaderStages {
    match stage {
        ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
        ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        ShaderStage::Compute => wgpu::ShaderStages::COMPUTE,
    }
}

/// Binding type of a buffer or sampler descriptor. Textures are handled by
/// the caller, which knows the texture's format and dimension.
pub fn buffer_binding_type(kind: DescriptorType) -> Option<wgpu::BindingType> {
    let (ty, has_dynamic_offset) = match kind {
        DescriptorType::UniformBuffer => (wgpu::BufferBindingType::Uniform, false),
        DescriptorType::DynamicUniformBuffer => (wgpu::BufferBindingType::Uniform, true),
        DescriptorType::StorageBuffer => (wgpu::BufferBindingType::Storage { read_only: false }, false),
        DescriptorType::DynamicStorageBuffer => {
            (wgpu::BufferBindingType::Storage { read_only: false }, true)
        }
        DescriptorType::Texture | DescriptorType::Sampler => return None,
    };
    Some(wgpu::BindingType::Buffer { ty, has_dynamic_offset, min_binding_size: None })
}

pub const fn vertex_format(attrib: VertexAttrib) -> wgpu::VertexFormat {
    match attrib {
        VertexAttrib::Float => wgpu::VertexFormat::Float32,
        VertexAttrib::Float2 => wgpu::VertexFormat::Float32x2,
        VertexAttrib::Float3 => wgpu::VertexFormat::Float32x3,
        VertexAttrib::Float4 => wgpu::VertexFormat::Float32x4,
    }
}

pub fn polygon_mode(mode: FillMode) -> wgpu::PolygonMode {
    match mode {
        FillMode::Solid => wgpu::PolygonMode::Fill,
        FillMode::Line => wgpu::PolygonMode::Line,
        FillMode::Point => wgpu::PolygonMode::Point,
    }
}

/// Cull mode. wgpu cannot cull both faces.
pub fn cull_mode(mode: CullMode) -> BackendResult<Option<wgpu::Face>> {
    match mode {
        CullMode::None => Ok(None),
        CullMode::Front => Ok(Some(wgpu::Face::Front)),
        CullMode::Back => Ok(Some(wgpu::Face::Back)),
        CullMode::All => Err(BackendError::Unsupported("culling both faces".to_owned())),
    }
}

pub fn front_face(face: FrontFace) -> wgpu::FrontFace {
    match face {
        FrontFace::Clockwise => wgpu::FrontFace::Cw,
        FrontFace::CounterClockwise => wgpu::FrontFace::Ccw,
    }
}

pub fn compare(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Never => wgpu::CompareFunction::Never,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::LessOrEqual => wgpu::CompareFunction::LessEqual,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
        CompareOp::Greater => wgpu::CompareFunction::Greater,
        CompareOp::Always => wgpu::CompareFunction::Always,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn blend_operation(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

/// Blend state. `None` when blending is disabled.
pub fn blend(state: &BlendState) -> Option<wgpu::BlendState> {
    if !state.enabled {
        return None;
    }
    let operation = blend_operation(state.op);
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_color),
            dst_factor: blend_factor(state.dst_color),
            operation,
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_alpha),
            dst_factor: blend_factor(state.dst_alpha),
            operation,
        },
    })
}

pub fn color_writes(mask: ColorComponents) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    for (component, write) in [
        (ColorComponents::R, wgpu::ColorWrites::RED),
        (ColorComponents::G, wgpu::ColorWrites::GREEN),
        (ColorComponents::B, wgpu::ColorWrites::BLUE),
        (ColorComponents::A, wgpu::ColorWrites::ALPHA),
    ] {
        if mask.contains(component) {
            writes |= write;
        }
    }
    writes
}

pub const fn index_format(index_type: IndexType) -> wgpu::IndexFormat {
    match index_type {
        IndexType::U16 => wgpu::IndexFormat::Uint16,
        IndexType::U32 => wgpu::IndexFormat::Uint32,
    }
}

/// Color load behavior. wgpu has no "don't care", so it clears.
pub fn color_load(load: LoadOp, color: [f32; 4]) -> wgpu::LoadOp<wgpu::Color> {
    match load {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(wgpu::Color {
            r: f64::from(color[0]),
            g: f64::from(color[1]),
            b: f64::from(color[2]),
            a: f64::from(color[3]),
        }),
    }
}

pub fn depth_load(load: LoadOp, depth: f32) -> wgpu::LoadOp<f32> {
    match load {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(depth),
    }
}

pub fn store(store: StoreOp) -> wgpu::StoreOp {
    match store {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::DontCare => wgpu::StoreOp::Discard,
    }
}
