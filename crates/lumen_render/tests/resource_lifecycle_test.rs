//! Integration tests for resource add/remove pairing across every pool.

use lumen_core::MemoryError;
use lumen_render::backend::headless::HeadlessBackend;
use lumen_render::{
    BufferDesc, BufferType, ClearValue, ComputePipelineDesc, Descriptor, DescriptorSetDesc,
    DeviceRequirements, Extent2d, Format, GraphicsPipelineDesc, PoolCapacities, RenderError,
    RenderTargetDesc, Renderer, RendererConfig, ResourceKind, SamplerDesc, ShaderDesc, ShaderStage,
    TextureDesc,
};

fn renderer_with(pools: PoolCapacities) -> Renderer<HeadlessBackend> {
    let backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap();
    let config = RendererConfig { pools, staging_buffer_size: 64 * 1024, ..RendererConfig::default() };
    Renderer::new(backend, config).unwrap()
}

fn renderer() -> Renderer<HeadlessBackend> {
    renderer_with(PoolCapacities::default())
}

fn shader(stage: ShaderStage) -> ShaderDesc {
    let words: [u32; 5] = [0x0723_0203, 0x0001_0300, 0, 1, 0];
    ShaderDesc { stage, bytecode: bytemuck::cast_slice(&words).to_vec() }
}

#[test]
fn test_buffer_copy_and_remove_restores_free_count() {
    let mut renderer = renderer();
    let before = renderer.free_count(ResourceKind::Buffer);

    let mut buffer = None;
    renderer.add_buffer(&BufferDesc::bytes(BufferType::Storage, 256), &mut buffer, None).unwrap();
    let id = buffer.unwrap();
    assert_eq!(renderer.free_count(ResourceKind::Buffer), before - 1);

    let data: Vec<u8> = (0u8..64).collect();
    renderer.copy_to_buffer(id, 32, &data).unwrap();
    let native = renderer.buffer(id).unwrap().native();
    assert_eq!(&renderer.backend().buffer_contents(native)[32..96], data.as_slice());

    renderer.remove_buffer(&mut buffer).unwrap();
    assert!(buffer.is_none());
    assert_eq!(renderer.free_count(ResourceKind::Buffer), before);

    let backend = renderer.destroy().unwrap();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_every_kind_pairs_add_and_remove() {
    let mut renderer = renderer();
    let free: Vec<usize> = ResourceKind::ALL.iter().map(|k| renderer.free_count(*k)).collect();

    let mut vs = None;
    let mut fs = None;
    let mut cs = None;
    renderer.add_shader(&shader(ShaderStage::Vertex), &mut vs).unwrap();
    renderer.add_shader(&shader(ShaderStage::Fragment), &mut fs).unwrap();
    renderer.add_shader(&shader(ShaderStage::Compute), &mut cs).unwrap();

    let mut uniforms = None;
    renderer.add_buffer(&BufferDesc::bytes(BufferType::Uniform, 256), &mut uniforms, None).unwrap();
    let mut texture = None;
    let desc = TextureDesc::sampled_2d(Format::Rgba8Unorm, 4, 4, 1);
    renderer.add_texture(&desc, &mut texture, None).unwrap();
    let mut sampler = None;
    renderer.add_sampler(&SamplerDesc::default(), &mut sampler).unwrap();

    let mut set = None;
    let set_desc = DescriptorSetDesc::new([
        Descriptor::uniform(uniforms.unwrap()),
        Descriptor::texture(texture.unwrap()),
        Descriptor::sampler(sampler.unwrap()),
    ]);
    renderer.add_descriptor_set(&set_desc, &mut set).unwrap();

    let mut target = None;
    let target_desc = RenderTargetDesc::new(Format::Rgba8Unorm, Extent2d::new(64, 32), ClearValue::default());
    renderer.add_render_target(&target_desc, &mut target).unwrap();

    let mut graphics = None;
    let mut pipeline = GraphicsPipelineDesc::new(vs.unwrap(), fs.unwrap());
    pipeline.color_formats.push(Format::Rgba8Unorm);
    pipeline.descriptor_sets.push(set.unwrap());
    renderer.add_graphics_pipeline(&pipeline, &mut graphics).unwrap();

    let mut compute = None;
    renderer.add_compute_pipeline(&ComputePipelineDesc::new(cs.unwrap()), &mut compute).unwrap();

    for kind in ResourceKind::ALL {
        assert!(renderer.live_count(kind) > 0, "{kind} pool is empty");
    }

    renderer.remove_compute_pipeline(&mut compute).unwrap();
    renderer.remove_graphics_pipeline(&mut graphics).unwrap();
    renderer.remove_render_target(&mut target).unwrap();
    renderer.remove_descriptor_set(&mut set).unwrap();
    renderer.remove_sampler(&mut sampler).unwrap();
    renderer.remove_texture(&mut texture).unwrap();
    renderer.remove_buffer(&mut uniforms).unwrap();
    renderer.remove_shader(&mut cs).unwrap();
    renderer.remove_shader(&mut fs).unwrap();
    renderer.remove_shader(&mut vs).unwrap();

    let after: Vec<usize> = ResourceKind::ALL.iter().map(|k| renderer.free_count(*k)).collect();
    assert_eq!(free, after);
    assert_eq!(renderer.destroy().unwrap().live_objects(), 0);
}

#[test]
fn test_add_into_occupied_slot_is_rejected() {
    let mut renderer = renderer();
    let desc = BufferDesc::bytes(BufferType::Vertex, 64);

    let mut slot = None;
    renderer.add_buffer(&desc, &mut slot, None).unwrap();
    let first = slot;

    assert_eq!(
        renderer.add_buffer(&desc, &mut slot, None),
        Err(RenderError::HandleNotNull { kind: ResourceKind::Buffer })
    );
    assert_eq!(slot, first);
    assert_eq!(renderer.live_count(ResourceKind::Buffer), 1);

    renderer.remove_buffer(&mut slot).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_remove_empty_slot_is_rejected() {
    let mut renderer = renderer();

    let mut sampler = None;
    assert_eq!(
        renderer.remove_sampler(&mut sampler),
        Err(RenderError::HandleIsNull { kind: ResourceKind::Sampler })
    );
    let mut set = None;
    assert_eq!(
        renderer.remove_descriptor_set(&mut set),
        Err(RenderError::HandleIsNull { kind: ResourceKind::DescriptorSet })
    );
    renderer.destroy().unwrap();
}

#[test]
fn test_stale_copy_of_a_handle_is_detected() {
    let mut renderer = renderer();
    let desc = TextureDesc::sampled_2d(Format::R8Srgb, 8, 8, 1);

    let mut slot = None;
    renderer.add_texture(&desc, &mut slot, None).unwrap();
    let stale = slot;
    renderer.remove_texture(&mut slot).unwrap();

    let mut reused = None;
    renderer.add_texture(&desc, &mut reused, None).unwrap();
    let (stale_id, reused_id) = (stale.unwrap(), reused.unwrap());
    assert_eq!(stale_id.handle().index(), reused_id.handle().index());
    assert_ne!(stale_id, reused_id);

    assert!(matches!(
        renderer.texture(stale_id),
        Err(RenderError::Memory(MemoryError::StaleHandle { .. }))
    ));
    let mut stale = stale;
    assert!(renderer.remove_texture(&mut stale).is_err());
    assert!(renderer.texture(reused_id).is_ok());

    renderer.remove_texture(&mut reused).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_live_handles_never_alias() {
    let mut renderer = renderer();
    let desc = BufferDesc::bytes(BufferType::Vertex, 16);

    let mut slots = vec![None; 8];
    for slot in &mut slots {
        renderer.add_buffer(&desc, slot, None).unwrap();
    }
    for slot in slots.iter_mut().step_by(2) {
        renderer.remove_buffer(slot).unwrap();
    }
    for slot in slots.iter_mut().step_by(2) {
        renderer.add_buffer(&desc, slot, None).unwrap();
    }

    let mut ids: Vec<_> = slots.iter().map(|s| s.unwrap()).collect();
    ids.sort();
    ids.dedup_by_key(|id| id.handle().index());
    assert_eq!(ids.len(), 8);

    for slot in &mut slots {
        renderer.remove_buffer(slot).unwrap();
    }
    renderer.destroy().unwrap();
}

#[test]
fn test_pool_exhaustion_creates_no_native_object() {
    let mut renderer = renderer_with(PoolCapacities { samplers: 2, ..PoolCapacities::default() });

    let mut a = None;
    let mut b = None;
    let mut c = None;
    renderer.add_sampler(&SamplerDesc::default(), &mut a).unwrap();
    renderer.add_sampler(&SamplerDesc::default(), &mut b).unwrap();
    let live = renderer.backend().live_objects();

    assert_eq!(
        renderer.add_sampler(&SamplerDesc::default(), &mut c),
        Err(RenderError::Memory(MemoryError::PoolExhausted { capacity: 2 }))
    );
    assert!(c.is_none());
    assert_eq!(renderer.backend().live_objects(), live);

    renderer.remove_sampler(&mut b).unwrap();
    renderer.add_sampler(&SamplerDesc::default(), &mut c).unwrap();

    renderer.remove_sampler(&mut a).unwrap();
    renderer.remove_sampler(&mut c).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_copy_checks_alignment_and_bounds() {
    let mut renderer = renderer();

    let mut uniforms = None;
    renderer.add_buffer(&BufferDesc::bytes(BufferType::Uniform, 512), &mut uniforms, None).unwrap();
    let id = uniforms.unwrap();
    assert_eq!(renderer.get_buffer_alignment(id), Ok(256));

    assert_eq!(
        renderer.copy_to_buffer(id, 0, &[0; 64]),
        Err(RenderError::MisalignedCopy { len: 64, alignment: 256 })
    );
    assert_eq!(
        renderer.copy_to_buffer(id, 512, &[0; 256]),
        Err(RenderError::CopyOutOfBounds { offset: 512, len: 256, size: 512 })
    );
    renderer.copy_to_buffer(id, 256, &[7; 256]).unwrap();

    // Data that cannot fit is rejected before anything is created.
    let mut vertices = None;
    let desc = BufferDesc::bytes(BufferType::Vertex, 8);
    assert!(renderer.add_buffer(&desc, &mut vertices, Some(&[0; 16])).is_err());
    assert!(vertices.is_none());
    assert_eq!(renderer.live_count(ResourceKind::Buffer), 1);

    renderer.remove_buffer(&mut uniforms).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_short_initial_data_is_rejected() {
    let mut renderer = renderer();
    let free = renderer.free_count(ResourceKind::Buffer);

    let mut vertices = None;
    let desc = BufferDesc::array(BufferType::Vertex, 12, 3);
    assert!(matches!(
        renderer.add_buffer(&desc, &mut vertices, Some(&[1; 24])),
        Err(RenderError::InvalidArgument(_))
    ));
    assert!(vertices.is_none());
    assert_eq!(renderer.free_count(ResourceKind::Buffer), free);

    // Exactly `desc.size` bytes land in full.
    let data: Vec<u8> = (1u8..=36).collect();
    renderer.add_buffer(&desc, &mut vertices, Some(&data)).unwrap();
    let native = renderer.buffer(vertices.unwrap()).unwrap().native();
    assert_eq!(renderer.backend().buffer_contents(native), data.as_slice());

    renderer.remove_buffer(&mut vertices).unwrap();
    let backend = renderer.destroy().unwrap();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_descriptor_rejects_wrong_buffer_type() {
    let mut renderer = renderer();

    let mut vertices = None;
    renderer.add_buffer(&BufferDesc::bytes(BufferType::Vertex, 64), &mut vertices, None).unwrap();

    let mut set = None;
    let desc = DescriptorSetDesc::new([Descriptor::uniform(vertices.unwrap())]);
    assert_eq!(
        renderer.add_descriptor_set(&desc, &mut set),
        Err(RenderError::WrongBufferType { expected: BufferType::Uniform, found: BufferType::Vertex })
    );
    assert!(set.is_none());

    renderer.remove_buffer(&mut vertices).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_shader_bytecode_must_be_words() {
    let mut renderer = renderer();

    let mut slot = None;
    let odd = ShaderDesc { stage: ShaderStage::Vertex, bytecode: vec![0; 6] };
    assert!(matches!(renderer.add_shader(&odd, &mut slot), Err(RenderError::InvalidArgument(_))));
    let empty = ShaderDesc { stage: ShaderStage::Vertex, bytecode: Vec::new() };
    assert!(matches!(renderer.add_shader(&empty, &mut slot), Err(RenderError::InvalidArgument(_))));
    assert!(slot.is_none());

    renderer.destroy().unwrap();
}

#[test]
fn test_pipeline_checks_shader_stages() {
    let mut renderer = renderer();

    let mut vs = None;
    let mut cs = None;
    renderer.add_shader(&shader(ShaderStage::Vertex), &mut vs).unwrap();
    renderer.add_shader(&shader(ShaderStage::Compute), &mut cs).unwrap();

    let mut pipeline = None;
    let desc = GraphicsPipelineDesc::new(vs.unwrap(), cs.unwrap());
    assert!(matches!(
        renderer.add_graphics_pipeline(&desc, &mut pipeline),
        Err(RenderError::InvalidArgument(_))
    ));
    assert_eq!(renderer.live_count(ResourceKind::GraphicsPipeline), 0);

    renderer.remove_shader(&mut cs).unwrap();
    renderer.remove_shader(&mut vs).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_render_target_owns_a_texture() {
    let mut renderer = renderer();
    let textures = renderer.live_count(ResourceKind::Texture);

    let mut depth = None;
    let desc = RenderTargetDesc::new(Format::D32Float, Extent2d::new(128, 128), ClearValue::default());
    assert!(renderer.add_render_target(&desc, &mut depth).is_err());
    renderer.add_depth_target(&desc, &mut depth).unwrap();

    let texture = renderer.render_target(depth.unwrap()).unwrap().texture();
    assert_eq!(renderer.texture(texture).unwrap().desc().format, Format::D32Float);
    assert_eq!(renderer.live_count(ResourceKind::Texture), textures + 1);

    renderer.remove_render_target(&mut depth).unwrap();
    assert!(renderer.texture(texture).is_err());
    assert_eq!(renderer.live_count(ResourceKind::Texture), textures);
    renderer.destroy().unwrap();
}

#[test]
fn test_destroy_reports_outstanding_resources() {
    let mut renderer = renderer();

    let mut sampler = None;
    renderer.add_sampler(&SamplerDesc::default(), &mut sampler).unwrap();

    assert_eq!(
        renderer.destroy().unwrap_err(),
        RenderError::ResourcesOutstanding { kind: ResourceKind::Sampler, count: 1 }
    );
}
