//! # LUMEN Frame Loop
//!
//! Runs the renderer core end to end on the headless backend:
//!
//! 1. Load the renderer config (TOML path as the first argument, optional)
//! 2. Bootstrap the renderer and load the demo scene
//! 3. Run frames, resizing halfway through
//! 4. Drain, tear down, and verify nothing leaked
//!
//! ```text
//! lumen_frames [config.toml] [frames]
//! RUST_LOG=lumen_render=trace lumen_frames
//! ```
//!
//! Renderer errors are fatal: they are logged and the process aborts.

use std::time::Instant;

use lumen::{init_logging, FrameScene};
use lumen_core::{Arena, OrFatal};
use lumen_render::backend::headless::HeadlessBackend;
use lumen_render::{DeviceRequirements, Extent2d, Renderer, RendererConfig};
use tracing::info;

/// Frames run when no count is given.
const DEFAULT_FRAMES: u64 = 240;

/// Per-frame host scratch.
const SCRATCH_BYTES: usize = 64 * 1024;

/// Staging size when no config file is given. The headless backend keeps
/// buffer contents in host memory, so the 128 MiB default is overkill.
const HEADLESS_STAGING_BYTES: u64 = 4 * 1024 * 1024;

fn load_config(path: Option<&str>) -> RendererConfig {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path).or_fatal("reading renderer config");
            RendererConfig::from_toml_str(&source).or_fatal("parsing renderer config")
        }
        None => RendererConfig {
            staging_buffer_size: HEADLESS_STAGING_BYTES,
            device: DeviceRequirements::relaxed(),
            ..RendererConfig::default()
        },
    }
}

fn main() {
    init_logging("info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str));
    let frames = args
        .get(1)
        .map_or(Ok(DEFAULT_FRAMES), |n| n.parse::<u64>())
        .or_fatal("parsing frame count");

    let backend = HeadlessBackend::new(&config.device).or_fatal("selecting adapter");
    let mut renderer = Renderer::new(backend, config).or_fatal("creating renderer");
    let mut scene = FrameScene::new(&mut renderer).or_fatal("loading scene");
    let mut scratch = Arena::new(SCRATCH_BYTES);

    let start = Instant::now();
    for frame in 0..frames {
        if frame == frames / 2 && frame > 0 {
            let extent = renderer.config().surface_extent;
            let resized = Extent2d::new((extent.width / 2).max(1), (extent.height / 2).max(1));
            renderer.backend_mut().set_surface_extent(Some(resized));
            renderer.resize(resized, &mut scene).or_fatal("resizing swap chain");
        }
        scene
            .render_frame(&mut renderer, frame, &mut scratch)
            .or_fatal("rendering frame");
    }
    let elapsed = start.elapsed();

    renderer.wait_idle().or_fatal("draining GPU");
    scene.destroy(&mut renderer).or_fatal("unloading scene");
    let backend = renderer.destroy().or_fatal("destroying renderer");

    let live = backend.live_objects();
    if live > 0 {
        Err::<(), _>(format!("{live} native objects leaked")).or_fatal("verifying teardown");
    }

    #[allow(clippy::cast_precision_loss)]
    let per_frame_us = elapsed.as_secs_f64() * 1e6 / frames.max(1) as f64;
    info!(
        frames,
        submissions = backend.submission_count(),
        presents = backend.present_count(),
        per_frame_us,
        "frame loop finished"
    );
}
