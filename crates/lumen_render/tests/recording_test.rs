//! Integration tests for command recording: texture uploads, mip chains,
//! layout tracking and what each recorder call puts on the queue.

use lumen_render::backend::headless::{HeadlessBackend, HeadlessOp};
use lumen_render::{
    BindPoint, BufferDesc, BufferType, ClearValue, CommandBufferId, ComputePipelineDesc,
    ConstantBlock, Descriptor, DescriptorSetDesc, DeviceLimits, DeviceRequirements, Extent2d,
    Format, ImageLayout, IndexType, Rect2d, RenderError, RenderTargetBindDesc, RenderTargetBinding,
    RenderTargetDesc, Renderer, RendererConfig, ResourceKind, SamplerFilter, ShaderDesc,
    ShaderStage, ShaderStages, TextureBarrier, TextureDesc, TextureUsage,
};
use smallvec::smallvec;

const STAGING_BYTES: u64 = 64 * 1024;

fn renderer_on(backend: HeadlessBackend) -> Renderer<HeadlessBackend> {
    let config = RendererConfig { staging_buffer_size: STAGING_BYTES, ..RendererConfig::default() };
    Renderer::new(backend, config).unwrap()
}

fn renderer() -> Renderer<HeadlessBackend> {
    renderer_on(HeadlessBackend::new(&DeviceRequirements::default()).unwrap())
}

fn texels(width: u32, height: u32) -> Vec<u8> {
    (0..width * height * 4).map(|i| (i % 251) as u8).collect()
}

fn shader(stage: ShaderStage) -> ShaderDesc {
    let words: [u32; 5] = [0x0723_0203, 0x0001_0300, 0, 1, 0];
    ShaderDesc { stage, bytecode: bytemuck::cast_slice(&words).to_vec() }
}

/// Opens an immediate command buffer for recording.
fn begin(renderer: &mut Renderer<HeadlessBackend>) -> CommandBufferId {
    let cmd = renderer.get_cmd(true).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    cmd
}

fn submit(renderer: &mut Renderer<HeadlessBackend>, cmd: CommandBufferId) {
    renderer.end_cmd(cmd).unwrap();
    renderer.submit_immediate(cmd).unwrap();
}

#[test]
fn test_upload_transitions_copies_and_mipmaps() {
    use ImageLayout::{ShaderReadOnly, TransferDst, TransferSrc, Undefined};

    let mut renderer = renderer();
    let data = texels(4, 4);

    let mut texture = None;
    let desc = TextureDesc::sampled_2d(Format::Rgba8Unorm, 4, 4, 3);
    renderer.add_texture(&desc, &mut texture, Some(&data)).unwrap();
    let id = texture.unwrap();

    let staging = renderer.staging_buffer().unwrap();
    let src = renderer.buffer(staging).unwrap().native().id();
    let tex = renderer.texture(id).unwrap().native().id();
    let barrier = |old, new, base_mip, mip_count| HeadlessOp::TextureBarrier {
        texture: tex,
        old,
        new,
        base_mip,
        mip_count,
    };
    assert_eq!(
        renderer.backend().last_submission(),
        &[
            barrier(Undefined, TransferDst, 0, 3),
            HeadlessOp::CopyBufferToTexture { src, dst: tex, bytes_per_row: 16, rows: 4 },
            barrier(TransferDst, TransferDst, 0, 3),
            barrier(TransferDst, TransferSrc, 0, 1),
            HeadlessOp::BlitMip { texture: tex, src_mip: 0, dst_mip: 1, dst_extent: Extent2d::new(2, 2) },
            barrier(TransferDst, TransferSrc, 1, 1),
            HeadlessOp::BlitMip { texture: tex, src_mip: 1, dst_mip: 2, dst_extent: Extent2d::new(1, 1) },
            barrier(TransferDst, TransferSrc, 2, 1),
            barrier(TransferSrc, ShaderReadOnly, 0, 3),
        ]
    );
    assert_eq!(renderer.texture(id).unwrap().layout(), ShaderReadOnly);

    let contents = renderer.backend().buffer_contents(renderer.buffer(staging).unwrap().native());
    assert_eq!(&contents[..data.len()], data.as_slice());

    renderer.remove_texture(&mut texture).unwrap();
    assert_eq!(renderer.destroy().unwrap().live_objects(), 0);
}

#[test]
fn test_unsampled_upload_stays_in_transfer_dst() {
    let mut renderer = renderer();

    let mut texture = None;
    let desc = TextureDesc { usage: TextureUsage::TRANSFER_DST, ..TextureDesc::sampled_2d(Format::Rgba8Unorm, 2, 2, 1) };
    renderer.add_texture(&desc, &mut texture, Some(&texels(2, 2))).unwrap();

    let ops = renderer.backend().last_submission();
    assert_eq!(ops.len(), 2);
    assert!(matches!(ops[1], HeadlessOp::CopyBufferToTexture { rows: 2, .. }));
    assert_eq!(renderer.texture(texture.unwrap()).unwrap().layout(), ImageLayout::TransferDst);

    renderer.remove_texture(&mut texture).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_upload_rows_follow_copy_pitch() {
    let limits = DeviceLimits { copy_row_alignment: 256, ..DeviceLimits::default() };
    let backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap().with_limits(limits);
    let mut renderer = renderer_on(backend);
    let data = texels(4, 2);

    let mut texture = None;
    let desc = TextureDesc::sampled_2d(Format::Rgba8Unorm, 4, 2, 1);
    renderer.add_texture(&desc, &mut texture, Some(&data)).unwrap();

    assert!(renderer
        .backend()
        .last_submission()
        .iter()
        .any(|op| matches!(op, HeadlessOp::CopyBufferToTexture { bytes_per_row: 256, rows: 2, .. })));

    let staging = renderer.staging_buffer().unwrap();
    let contents = renderer.backend().buffer_contents(renderer.buffer(staging).unwrap().native());
    assert_eq!(&contents[..16], &data[..16]);
    assert_eq!(&contents[16..256], &[0u8; 240][..]);
    assert_eq!(&contents[256..272], &data[16..]);

    renderer.remove_texture(&mut texture).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_upload_rejects_bad_data() {
    let mut renderer = renderer();

    let mut texture = None;
    let desc = TextureDesc::sampled_2d(Format::Rgba8Unorm, 256, 256, 1);
    assert_eq!(
        renderer.add_texture(&desc, &mut texture, Some(&texels(256, 256))),
        Err(RenderError::StagingOverflow { len: 256 * 256 * 4, capacity: STAGING_BYTES })
    );

    let small = TextureDesc::sampled_2d(Format::Rgba8Unorm, 4, 4, 1);
    assert!(matches!(
        renderer.add_texture(&small, &mut texture, Some(&texels(4, 3))),
        Err(RenderError::InvalidArgument(_))
    ));

    let no_mips = TextureDesc::sampled_2d(Format::Rgba8Unorm, 4, 4, 0);
    assert!(renderer.add_texture(&no_mips, &mut texture, None).is_err());

    assert!(texture.is_none());
    assert_eq!(renderer.live_count(ResourceKind::Texture), 0);
    renderer.destroy().unwrap();
}

#[test]
fn test_partial_mip_barrier_keeps_tracked_layout() {
    let mut renderer = renderer();

    let mut texture = None;
    renderer
        .add_texture(&TextureDesc::sampled_2d(Format::Rgba8Unorm, 8, 8, 4), &mut texture, None)
        .unwrap();
    let id = texture.unwrap();

    let cmd = begin(&mut renderer);
    {
        let mut rec = renderer.cmd(cmd).unwrap();
        rec.texture_barrier(&[TextureBarrier::new(id, ImageLayout::Undefined, ImageLayout::General)])
            .unwrap();
        rec.texture_barrier(&[TextureBarrier::new(id, ImageLayout::General, ImageLayout::TransferSrc).mips(2, 2)])
            .unwrap();
        assert_eq!(rec.renderer().texture(id).unwrap().layout(), ImageLayout::General);

        assert!(rec
            .texture_barrier(&[TextureBarrier::new(id, ImageLayout::General, ImageLayout::TransferDst).mips(3, 2)])
            .is_err());

        rec.generate_mipmap(id, SamplerFilter::Linear).unwrap();
        assert_eq!(rec.renderer().texture(id).unwrap().layout(), ImageLayout::TransferSrc);
    }
    submit(&mut renderer, cmd);

    let blits = renderer
        .backend()
        .last_submission()
        .iter()
        .filter(|op| matches!(op, HeadlessOp::BlitMip { .. }))
        .count();
    assert_eq!(blits, 3);

    renderer.remove_texture(&mut texture).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_fill_buffer_writes_words() {
    let mut renderer = renderer();

    let mut buffer = None;
    renderer.add_buffer(&BufferDesc::bytes(BufferType::Storage, 16), &mut buffer, None).unwrap();
    let id = buffer.unwrap();

    let cmd = begin(&mut renderer);
    {
        let mut rec = renderer.cmd(cmd).unwrap();
        assert!(matches!(rec.fill_buffer(id, 2, 4, 0), Err(RenderError::InvalidArgument(_))));
        assert!(matches!(rec.fill_buffer(id, 0, 0, 0), Err(RenderError::InvalidArgument(_))));
        assert_eq!(
            rec.fill_buffer(id, 8, 16, 0),
            Err(RenderError::CopyOutOfBounds { offset: 8, len: 16, size: 16 })
        );
        rec.fill_buffer(id, 4, 8, 0x0102_0304).unwrap();
    }
    submit(&mut renderer, cmd);

    let contents = renderer.backend().buffer_contents(renderer.buffer(id).unwrap().native());
    assert_eq!(contents, &[0, 0, 0, 0, 4, 3, 2, 1, 4, 3, 2, 1, 0, 0, 0, 0]);

    let cmd = begin(&mut renderer);
    renderer.cmd(cmd).unwrap().fill_whole_buffer(id, 0xFFFF_FFFF).unwrap();
    submit(&mut renderer, cmd);
    let contents = renderer.backend().buffer_contents(renderer.buffer(id).unwrap().native());
    assert_eq!(contents, &[0xFF; 16]);

    renderer.remove_buffer(&mut buffer).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_render_pass_over_color_and_depth() {
    let mut renderer = renderer();
    let extent = Extent2d::new(320, 200);
    let clear = ClearValue { color: [0.0, 0.0, 0.0, 1.0], depth: 0.0 };

    let mut color = None;
    let mut depth = None;
    renderer.add_render_target(&RenderTargetDesc::new(Format::Rgba8Unorm, extent, clear), &mut color).unwrap();
    renderer.add_depth_target(&RenderTargetDesc::new(Format::D32Float, extent, clear), &mut depth).unwrap();
    let (color_id, depth_id) = (color.unwrap(), depth.unwrap());
    let color_tex = renderer.texture(renderer.render_target(color_id).unwrap().texture()).unwrap().native().id();
    let depth_tex = renderer.texture(renderer.render_target(depth_id).unwrap().texture()).unwrap().native().id();

    let mut indices = None;
    renderer.add_buffer(&BufferDesc::array(BufferType::Index, 2, 6), &mut indices, None).unwrap();

    let cmd = begin(&mut renderer);
    {
        let mut rec = renderer.cmd(cmd).unwrap();
        rec.clear_render_target(color_id).unwrap();
        rec.clear_depth_target(depth_id).unwrap();
        let targets = RenderTargetBindDesc {
            colors: smallvec![RenderTargetBinding::cleared(color_id)],
            depth: Some(RenderTargetBinding::cleared(depth_id)),
        };
        rec.bind_render_targets(&targets).unwrap();
        rec.set_scissor_to(color_id).unwrap();
        rec.bind_index_buffer(indices.unwrap()).unwrap();
        assert_eq!(
            rec.bind_vertex_buffer(indices.unwrap()),
            Err(RenderError::WrongBufferType { expected: BufferType::Vertex, found: BufferType::Index })
        );
        rec.draw_indexed(6, 2, 0, 0).unwrap();
        rec.unbind_render_targets().unwrap();

        assert!(rec.bind_render_targets(&RenderTargetBindDesc::default()).is_err());
    }
    submit(&mut renderer, cmd);

    let index_buffer = renderer.buffer(indices.unwrap()).unwrap().native().id();
    assert_eq!(
        renderer.backend().last_submission(),
        &[
            HeadlessOp::ClearColor { texture: color_tex, color: clear.color },
            HeadlessOp::ClearDepth { texture: depth_tex, depth: 0.0 },
            HeadlessOp::BeginRendering {
                colors: vec![color_tex],
                depth: Some(depth_tex),
                area: Rect2d::from_extent(extent),
            },
            HeadlessOp::SetScissor(Rect2d::from_extent(extent)),
            HeadlessOp::BindIndexBuffer { buffer: index_buffer, index_type: IndexType::U16 },
            HeadlessOp::DrawIndexed { index_count: 6, instance_count: 2 },
            HeadlessOp::EndRendering,
        ]
    );

    renderer.remove_buffer(&mut indices).unwrap();
    renderer.remove_render_target(&mut depth).unwrap();
    renderer.remove_render_target(&mut color).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_compute_dispatch_binds_its_layout() {
    let mut renderer = renderer();

    let mut cs = None;
    renderer.add_shader(&shader(ShaderStage::Compute), &mut cs).unwrap();
    let mut particles = None;
    renderer.add_buffer(&BufferDesc::array(BufferType::Storage, 32, 64), &mut particles, None).unwrap();
    let mut set = None;
    renderer
        .add_descriptor_set(&DescriptorSetDesc::new([Descriptor::storage(particles.unwrap())]), &mut set)
        .unwrap();

    let mut desc = ComputePipelineDesc::new(cs.unwrap());
    desc.descriptor_sets.push(set.unwrap());
    desc.constant_blocks.push(ConstantBlock { stages: ShaderStages::COMPUTE, size: 16 });
    let mut pipeline = None;
    renderer.add_compute_pipeline(&desc, &mut pipeline).unwrap();
    let (pipeline_id, set_id) = (pipeline.unwrap(), set.unwrap());

    let cmd = begin(&mut renderer);
    {
        let mut rec = renderer.cmd(cmd).unwrap();
        rec.bind_compute_pipeline(pipeline_id).unwrap();
        rec.bind_compute_descriptor_set(pipeline_id, set_id, 0).unwrap();
        assert!(rec.bind_compute_descriptor_set(pipeline_id, set_id, 1).is_err());
        rec.set_compute_constants(pipeline_id, 0, &[0; 16]).unwrap();
        assert!(rec.set_compute_constants(pipeline_id, 0, &[0; 32]).is_err());
        assert!(rec.dispatch(0, 1, 1).is_err());
        rec.dispatch(8, 8, 1).unwrap();
    }
    submit(&mut renderer, cmd);

    let native_pipeline = renderer.compute_pipeline(pipeline_id).unwrap().native().id();
    let native_set = renderer.descriptor_set(set_id).unwrap().native().id();
    assert_eq!(
        renderer.backend().last_submission(),
        &[
            HeadlessOp::BindComputePipeline(native_pipeline),
            HeadlessOp::BindDescriptorSet { bind_point: BindPoint::Compute, set: native_set, index: 0 },
            HeadlessOp::SetConstants { bind_point: BindPoint::Compute, len: 16 },
            HeadlessOp::Dispatch { x: 8, y: 8, z: 1 },
        ]
    );

    renderer.remove_compute_pipeline(&mut pipeline).unwrap();
    renderer.remove_descriptor_set(&mut set).unwrap();
    renderer.remove_buffer(&mut particles).unwrap();
    renderer.remove_shader(&mut cs).unwrap();
    renderer.destroy().unwrap();
}

#[test]
fn test_copy_to_swap_chain_leaves_image_presentable() {
    let mut renderer = renderer();

    let mut target = None;
    let desc = RenderTargetDesc::new(Format::Rgba8Unorm, Extent2d::new(640, 360), ClearValue::default());
    renderer.add_render_target(&desc, &mut target).unwrap();
    let texture = renderer.render_target(target.unwrap()).unwrap().texture();
    let src = renderer.texture(texture).unwrap().native().id();

    let image = renderer.acquire_next_image(0).unwrap();
    let cmd = renderer.get_cmd(false).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    renderer.cmd(cmd).unwrap().copy_to_swap_chain(texture).unwrap();
    renderer.end_cmd(cmd).unwrap();
    renderer.submit_frame(cmd).unwrap();

    assert_eq!(
        renderer.backend().last_submission(),
        &[
            HeadlessOp::SwapChainBarrier { image, old: ImageLayout::Undefined, new: ImageLayout::TransferDst },
            HeadlessOp::BlitToSwapChain { src, image, dst_extent: renderer.swap_chain().extent() },
            HeadlessOp::SwapChainBarrier { image, old: ImageLayout::TransferDst, new: ImageLayout::PresentSrc },
        ]
    );
    renderer.present().unwrap();

    renderer.remove_render_target(&mut target).unwrap();
    renderer.destroy().unwrap();
}
