//! Integration tests for the command ring and two-slot frame pacing.
//!
//! Most tests run the headless backend with manual completion, so the GPU
//! only "finishes" a submission when the test says so.

use lumen_render::backend::headless::HeadlessBackend;
use lumen_render::{
    BackendError, CommandBufferId, CommandBufferState, DeviceRequirements, ImageLayout, RenderError,
    RenderResult, Renderer, RendererConfig,
};

fn config(command_buffers: usize) -> RendererConfig {
    RendererConfig { command_buffers, staging_buffer_size: 64 * 1024, ..RendererConfig::default() }
}

fn renderer(command_buffers: usize) -> Renderer<HeadlessBackend> {
    let backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap();
    Renderer::new(backend, config(command_buffers)).unwrap()
}

fn manual_renderer(command_buffers: usize) -> Renderer<HeadlessBackend> {
    let backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap().manual_completion();
    Renderer::new(backend, config(command_buffers)).unwrap()
}

const FENCE_BLOCKS: RenderError = RenderError::Backend(BackendError::WouldBlock { what: "fence" });

/// Records an empty frame on `cmd`, submits and presents it.
fn finish_frame(renderer: &mut Renderer<HeadlessBackend>, cmd: CommandBufferId) -> RenderResult<()> {
    renderer.begin_cmd(cmd)?;
    renderer.cmd(cmd)?.swap_chain_barrier(ImageLayout::PresentSrc)?;
    renderer.end_cmd(cmd)?;
    renderer.submit_frame(cmd)?;
    renderer.present()
}

fn frame(renderer: &mut Renderer<HeadlessBackend>, frame: u64) -> RenderResult<CommandBufferId> {
    renderer.acquire_next_image(frame)?;
    let cmd = renderer.get_cmd(false)?;
    finish_frame(renderer, cmd)?;
    Ok(cmd)
}

fn teardown(mut renderer: Renderer<HeadlessBackend>) {
    renderer.backend_mut().complete_all();
    let backend = renderer.destroy().unwrap();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_same_slot_reclaims_after_fence_signals() {
    let mut renderer = manual_renderer(2);

    assert_eq!(frame(&mut renderer, 0).unwrap().index(), 0);
    assert_eq!(frame(&mut renderer, 1).unwrap().index(), 1);
    assert_eq!(renderer.backend().pending_submissions(), 2);

    // Frame 2 reuses slot 0, whose fence frame 0 still holds.
    renderer.acquire_next_image(2).unwrap();
    assert_eq!(renderer.active_frame(), 0);
    assert_eq!(renderer.get_cmd(false), Err(FENCE_BLOCKS));

    assert!(renderer.backend_mut().complete_oldest());
    let cmd = renderer.get_cmd(false).unwrap();
    assert_eq!(cmd.index(), 0);
    assert_eq!(renderer.command_state(cmd), Ok(CommandBufferState::Idle));
    finish_frame(&mut renderer, cmd).unwrap();

    // Buffer 0 is in flight again; only buffer 1 can be reclaimed next.
    renderer.acquire_next_image(3).unwrap();
    assert_eq!(renderer.get_cmd(false), Err(FENCE_BLOCKS));
    renderer.backend_mut().complete_oldest();
    assert_eq!(renderer.get_cmd(false).unwrap().index(), 1);

    teardown(renderer);
}

#[test]
fn test_frame_waits_for_frame_two_back() {
    const RING: usize = 16;
    let mut renderer = manual_renderer(RING);
    let mut owner: [Option<u64>; RING] = [None; RING];

    for k in 0..40u64 {
        renderer.acquire_next_image(k).unwrap();
        if k >= 2 {
            assert_eq!(renderer.get_cmd(false), Err(FENCE_BLOCKS), "frame {k} ran ahead");
            assert!(renderer.backend_mut().complete_oldest());
        }

        let cmd = renderer.get_cmd(false).unwrap();
        if let Some(previous) = owner[cmd.index()] {
            assert!(previous + 2 <= k, "frame {k} reused the buffer of frame {previous}");
        }
        owner[cmd.index()] = Some(k);

        finish_frame(&mut renderer, cmd).unwrap();
        assert!(renderer.backend().pending_submissions() <= 2);
    }

    assert_eq!(renderer.backend().present_count(), 40);
    teardown(renderer);
}

#[test]
fn test_ring_exhaustion_is_reported() {
    let mut renderer = renderer(2);

    let a = renderer.get_cmd(true).unwrap();
    renderer.begin_cmd(a).unwrap();
    let b = renderer.get_cmd(true).unwrap();
    renderer.begin_cmd(b).unwrap();
    assert_ne!(a, b);
    assert_eq!(renderer.get_cmd(true), Err(RenderError::CommandRingExhausted { capacity: 2 }));

    renderer.end_cmd(a).unwrap();
    renderer.submit_immediate(a).unwrap();
    assert_eq!(renderer.get_cmd(true), Ok(a));

    renderer.end_cmd(b).unwrap();
    renderer.submit_immediate(b).unwrap();
    teardown(renderer);
}

#[test]
fn test_unfinished_submissions_are_not_reclaimed() {
    let mut renderer = manual_renderer(2);
    frame(&mut renderer, 0).unwrap();
    frame(&mut renderer, 1).unwrap();

    assert_eq!(renderer.get_cmd(true), Err(RenderError::CommandRingExhausted { capacity: 2 }));
    assert_eq!(renderer.command_ring().count(CommandBufferState::Submitted), 2);

    renderer.backend_mut().complete_oldest();
    assert_eq!(renderer.get_cmd(true).unwrap().index(), 0);
    teardown(renderer);
}

#[test]
fn test_state_machine_rejects_out_of_order_calls() {
    use CommandBufferState::{Idle, Ready, Recording, Submitted};

    let mut renderer = renderer(1);
    let cmd = renderer.get_cmd(true).unwrap();
    let wrong = |expected, found| RenderError::InvalidCommandState { index: 0, expected, found };

    assert_eq!(renderer.end_cmd(cmd), Err(wrong(Recording, Idle)));
    assert_eq!(renderer.submit_immediate(cmd), Err(wrong(Ready, Idle)));
    assert!(renderer.cmd(cmd).is_err());

    renderer.begin_cmd(cmd).unwrap();
    assert_eq!(renderer.begin_cmd(cmd), Err(wrong(Idle, Recording)));
    assert_eq!(renderer.submit_frame(cmd), Err(wrong(Ready, Recording)));
    assert!(renderer.cmd(cmd).is_ok());

    renderer.end_cmd(cmd).unwrap();
    assert!(matches!(renderer.cmd(cmd), Err(RenderError::InvalidCommandState { .. })));
    assert_eq!(renderer.end_cmd(cmd), Err(wrong(Recording, Ready)));

    renderer.submit_immediate(cmd).unwrap();
    assert_eq!(renderer.command_state(cmd), Ok(Submitted));
    assert_eq!(renderer.begin_cmd(cmd), Err(wrong(Idle, Submitted)));

    // The immediate fence has signaled, so the only buffer comes back.
    assert_eq!(renderer.get_cmd(true), Ok(cmd));
    assert_eq!(renderer.command_state(cmd), Ok(Idle));
    teardown(renderer);
}

#[test]
fn test_present_requires_present_layout() {
    let mut renderer = renderer(4);
    renderer.acquire_next_image(0).unwrap();

    let cmd = renderer.get_cmd(false).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    renderer.end_cmd(cmd).unwrap();
    renderer.submit_frame(cmd).unwrap();

    assert_eq!(
        renderer.present(),
        Err(RenderError::NotPresentable { image: 0, layout: ImageLayout::Undefined })
    );
    assert_eq!(renderer.backend().present_count(), 0);
    teardown(renderer);
}

#[test]
fn test_frame_submit_needs_an_acquired_image() {
    let mut renderer = renderer(4);

    let cmd = renderer.get_cmd(false).unwrap();
    renderer.begin_cmd(cmd).unwrap();
    renderer.end_cmd(cmd).unwrap();
    assert_eq!(
        renderer.submit_frame(cmd),
        Err(RenderError::Backend(BackendError::SemaphoreNotSignaled))
    );
    assert_eq!(renderer.command_state(cmd), Ok(CommandBufferState::Ready));

    renderer.acquire_next_image(0).unwrap();
    renderer.submit_frame(cmd).unwrap();
    teardown(renderer);
}

#[test]
fn test_images_rotate_through_the_swap_chain() {
    let mut renderer = renderer(4);
    let count = renderer.swap_chain().image_count();
    assert_eq!(count, 3);

    let images: Vec<u32> = (0..6)
        .map(|k| {
            let image = renderer.acquire_next_image(k).unwrap();
            assert_eq!(renderer.active_frame(), (k % 2) as usize);
            let cmd = renderer.get_cmd(false).unwrap();
            finish_frame(&mut renderer, cmd).unwrap();
            image
        })
        .collect();
    assert_eq!(images, vec![0, 1, 2, 0, 1, 2]);

    for image in 0..count {
        assert_eq!(renderer.swap_chain().image_layout(image), Ok(ImageLayout::PresentSrc));
    }
    teardown(renderer);
}

#[test]
fn test_wait_idle_drains_pending_work() {
    let mut renderer = manual_renderer(4);
    frame(&mut renderer, 0).unwrap();

    assert_eq!(
        renderer.wait_idle(),
        Err(RenderError::Backend(BackendError::WouldBlock { what: "queue idle" }))
    );
    renderer.backend_mut().complete_all();
    renderer.wait_idle().unwrap();
    teardown(renderer);
}

#[test]
fn test_frame_calls_need_a_swap_chain() {
    let mut renderer = renderer(4);
    renderer.destroy_swap_chain();
    assert!(!renderer.swap_chain().is_initialized());

    assert_eq!(renderer.acquire_next_image(0), Err(RenderError::NoSwapChain));
    assert_eq!(renderer.present(), Err(RenderError::NoSwapChain));
    teardown(renderer);
}
