//! Integration tests for per-slot GPU timestamps.

use lumen_render::backend::headless::{HeadlessBackend, HeadlessOp, TIMESTAMP_TICKS};
use lumen_render::{
    BackendError, DeviceRequirements, ImageLayout, RenderError, RenderResult, Renderer,
    RendererConfig, MAX_TIMESTAMPS, TIMER_HISTORY, TIMER_START,
};

/// Interval between two consecutive headless timestamps, in milliseconds.
const STEP_MS: f64 = TIMESTAMP_TICKS as f64 / 1_000_000.0;

fn renderer(manual: bool, gpu_timer: bool) -> Renderer<HeadlessBackend> {
    let mut backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap();
    backend.set_manual_completion(manual);
    let config = RendererConfig { staging_buffer_size: 64 * 1024, gpu_timer, ..RendererConfig::default() };
    Renderer::new(backend, config).unwrap()
}

fn close_to(value: Option<f64>, expected: f64) -> bool {
    value.is_some_and(|v| (v - expected).abs() < 1e-9)
}

/// One frame with a reference stamp and two named intervals.
fn timed_frame(renderer: &mut Renderer<HeadlessBackend>, frame: u64) -> RenderResult<()> {
    renderer.acquire_next_image(frame)?;
    renderer.read_timer_results()?;
    let cmd = renderer.get_cmd(false)?;
    renderer.begin_cmd(cmd)?;
    {
        let mut rec = renderer.cmd(cmd)?;
        rec.timer_start()?;
        rec.timestamp("scene")?;
        rec.swap_chain_barrier(ImageLayout::PresentSrc)?;
        rec.timestamp("present")?;
    }
    renderer.end_cmd(cmd)?;
    renderer.submit_frame(cmd)?;
    renderer.present()
}

fn teardown(mut renderer: Renderer<HeadlessBackend>) {
    renderer.backend_mut().complete_all();
    let backend = renderer.destroy().unwrap();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_timer_is_off_unless_configured() {
    let mut renderer = renderer(false, false);
    assert!(renderer.gpu_timer().is_none());
    assert!(matches!(renderer.read_timer_results(), Err(RenderError::InvalidArgument(_))));

    renderer.acquire_next_image(0).unwrap();
    let cmd = renderer.get_cmd(false).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    assert!(matches!(renderer.cmd(cmd).unwrap().timer_start(), Err(RenderError::InvalidArgument(_))));
    assert!(matches!(renderer.cmd(cmd).unwrap().timestamp("scene"), Err(RenderError::InvalidArgument(_))));
    renderer.cmd(cmd).unwrap().swap_chain_barrier(ImageLayout::PresentSrc).unwrap();
    renderer.end_cmd(cmd).unwrap();
    renderer.submit_frame(cmd).unwrap();
    renderer.present().unwrap();

    teardown(renderer);
}

#[test]
fn test_results_wait_for_the_slot_fence() {
    let mut renderer = renderer(true, true);

    timed_frame(&mut renderer, 0).unwrap();
    let submitted = renderer.backend().last_submission();
    assert!(matches!(submitted[0], HeadlessOp::ResetQueries { count: MAX_TIMESTAMPS, .. }));
    assert!(matches!(submitted[1], HeadlessOp::WriteTimestamp { index: 0, .. }));
    assert!(matches!(submitted[2], HeadlessOp::WriteTimestamp { index: 1, .. }));
    assert!(matches!(submitted.last(), Some(HeadlessOp::WriteTimestamp { index: 2, .. })));

    timed_frame(&mut renderer, 1).unwrap();
    let timer = renderer.gpu_timer().unwrap();
    assert_eq!((timer.written(0), timer.written(1)), (3, 3));

    // Slot 0 is still in flight.
    renderer.acquire_next_image(2).unwrap();
    assert_eq!(
        renderer.read_timer_results(),
        Err(RenderError::Backend(BackendError::WouldBlock { what: "fence" }))
    );
    assert!(renderer.gpu_timer().unwrap().history("scene").is_none());

    assert!(renderer.backend_mut().complete_oldest());
    renderer.read_timer_results().unwrap();

    let timer = renderer.gpu_timer().unwrap();
    assert_eq!(timer.written(0), 0);
    assert_eq!(timer.written(1), 3);
    assert!(close_to(timer.history("scene").and_then(|h| h.last()), STEP_MS));
    assert!(close_to(timer.history("present").and_then(|h| h.last()), STEP_MS));
    assert!(timer.history(TIMER_START).is_none());
    let names: Vec<&str> = timer.timings().map(|(name, _)| name).collect();
    assert_eq!(names, ["scene", "present"]);

    // A second read of the same slot has nothing new.
    renderer.read_timer_results().unwrap();
    assert_eq!(renderer.gpu_timer().unwrap().history("scene").map(|h| h.len()), Some(1));

    teardown(renderer);
}

#[test]
fn test_history_holds_the_last_frames() {
    let mut renderer = renderer(false, true);
    let frames = TIMER_HISTORY as u64 + 10;
    for frame in 0..frames {
        timed_frame(&mut renderer, frame).unwrap();
    }

    let history = renderer.gpu_timer().unwrap().history("scene").unwrap();
    assert_eq!(history.len(), TIMER_HISTORY);
    assert!(close_to(history.average(), STEP_MS));
    assert!(history.iter().all(|ms| (ms - STEP_MS).abs() < 1e-9));

    teardown(renderer);
}

#[test]
fn test_timestamps_per_frame_are_bounded() {
    let mut renderer = renderer(false, true);
    renderer.acquire_next_image(0).unwrap();
    let cmd = renderer.get_cmd(false).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    {
        let mut rec = renderer.cmd(cmd).unwrap();
        rec.timer_start().unwrap();
        for _ in 1..MAX_TIMESTAMPS {
            rec.timestamp("pass").unwrap();
        }
        assert!(matches!(rec.timestamp("one too many"), Err(RenderError::InvalidArgument(_))));
        rec.swap_chain_barrier(ImageLayout::PresentSrc).unwrap();
    }
    renderer.end_cmd(cmd).unwrap();
    renderer.submit_frame(cmd).unwrap();
    renderer.present().unwrap();
    assert_eq!(renderer.gpu_timer().unwrap().written(0), MAX_TIMESTAMPS);

    teardown(renderer);
}
