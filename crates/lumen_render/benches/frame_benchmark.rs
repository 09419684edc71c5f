//! # Frame Benchmark
//!
//! CPU cost of the frame protocol on the headless backend: acquire, record,
//! submit, present. The backend does no GPU work, so this measures the
//! core's own bookkeeping.
//!
//! Run with: `cargo bench --package lumen_render --bench frame_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lumen_render::backend::headless::HeadlessBackend;
use lumen_render::{
    BufferDesc, BufferId, BufferType, DeviceRequirements, ImageLayout, Renderer, RendererConfig,
};

/// Headless buffers live in host memory; keep staging small.
const STAGING_BYTES: u64 = 64 * 1024;

fn renderer() -> Renderer<HeadlessBackend> {
    let backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap();
    let config = RendererConfig { staging_buffer_size: STAGING_BYTES, ..RendererConfig::default() };
    Renderer::new(backend, config).unwrap()
}

fn frame(renderer: &mut Renderer<HeadlessBackend>, frame: u64, vertices: BufferId, draws: u32) {
    renderer.acquire_next_image(frame).unwrap();
    let cmd = renderer.get_cmd(false).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    {
        let mut rec = renderer.cmd(cmd).unwrap();
        rec.set_viewport(0.0, 0.0, 1280.0, 720.0).unwrap();
        rec.bind_vertex_buffer(vertices).unwrap();
        for _ in 0..draws {
            rec.draw(3, 1).unwrap();
        }
        rec.swap_chain_barrier(ImageLayout::PresentSrc).unwrap();
    }
    renderer.end_cmd(cmd).unwrap();
    renderer.submit_frame(cmd).unwrap();
    renderer.present().unwrap();
}

/// Benchmark: whole frames with a growing number of draws.
fn bench_frame_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_loop");

    for draws in [1u32, 64, 1024] {
        group.throughput(Throughput::Elements(u64::from(draws)));
        group.bench_with_input(BenchmarkId::from_parameter(draws), &draws, |b, &draws| {
            let mut renderer = renderer();
            let mut vertices = None;
            renderer
                .add_buffer(&BufferDesc::array(BufferType::Vertex, 12, 3), &mut vertices, None)
                .unwrap();
            let vertices = vertices.unwrap();

            let mut n = 0u64;
            b.iter(|| {
                frame(&mut renderer, n, vertices, draws);
                n += 1;
            });
            black_box(renderer.backend().present_count());
        });
    }

    group.finish();
}

/// Benchmark: immediate command buffers cycled through the ring.
fn bench_immediate_churn(c: &mut Criterion) {
    c.bench_function("immediate_get_submit", |b| {
        let mut renderer = renderer();
        b.iter(|| {
            let cmd = renderer.get_cmd(true).unwrap();
            renderer.begin_cmd(cmd).unwrap();
            renderer.end_cmd(cmd).unwrap();
            renderer.submit_immediate(cmd).unwrap();
            black_box(cmd.index());
        });
    });
}

/// Benchmark: buffer add/remove pairs through the pool.
fn bench_buffer_churn(c: &mut Criterion) {
    c.bench_function("buffer_add_remove", |b| {
        let mut renderer = renderer();
        let desc = BufferDesc::bytes(BufferType::Uniform, 256);
        b.iter(|| {
            let mut slot = None;
            renderer.add_buffer(&desc, &mut slot, None).unwrap();
            black_box(slot);
            renderer.remove_buffer(&mut slot).unwrap();
        });
    });
}

criterion_group!(benches, bench_frame_loop, bench_immediate_churn, bench_buffer_churn);
criterion_main!(benches);
