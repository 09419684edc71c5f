//! # Frame Pacing
//!
//! Two frame slots rotate so the CPU records frame N+1 while the GPU
//! executes frame N:
//!
//! ```text
//! frame:    0        1        2        3
//! slot:     0        1        0        1
//!           │        │        │
//!           │        │        └─ get_cmd waits on slot 0's fence,
//!           │        │           signaled when frame 0 finished
//!           └────────┴─ record + submit without waiting
//! ```
//!
//! Each slot owns an image-acquired semaphore (acquire → submit), a
//! render-complete semaphore (submit → present) and a fence (submit → CPU).
//! Frame fences start signaled so the first frames do not wait.

use tracing::{info, trace};

use crate::backend::GpuBackend;
use crate::error::{BackendResult, RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::{Extent2d, ImageLayout};

/// Frames in flight.
pub const CONCURRENT_FRAMES: usize = 2;

/// Synchronization objects of one frame slot.
pub struct FrameSlot<B: GpuBackend> {
    pub(crate) image_acquired: B::Semaphore,
    pub(crate) render_complete: B::Semaphore,
    pub(crate) fence: B::Fence,
}

impl<B: GpuBackend> FrameSlot<B> {
    pub(crate) fn new(backend: &mut B) -> BackendResult<Self> {
        Ok(Self {
            image_acquired: backend.create_semaphore()?,
            render_complete: backend.create_semaphore()?,
            fence: backend.create_fence(true)?,
        })
    }

    pub(crate) fn destroy(self, backend: &mut B) {
        backend.destroy_semaphore(self.image_acquired);
        backend.destroy_semaphore(self.render_complete);
        backend.destroy_fence(self.fence);
    }
}

/// Resources whose size follows the swap chain, rebuilt on resize.
///
/// `release` should remove pipelines, then descriptor sets, then targets;
/// `rebuild` should recreate them in the opposite order.
pub trait SwapChainDependents<B: GpuBackend> {
    /// Removes everything sized to the old swap chain.
    ///
    /// # Errors
    ///
    /// Any error from the `remove_*` calls.
    fn release(&mut self, renderer: &mut Renderer<B>) -> RenderResult<()>;

    /// Recreates everything for the new swap chain.
    ///
    /// # Errors
    ///
    /// Any error from the `add_*` calls.
    fn rebuild(&mut self, renderer: &mut Renderer<B>) -> RenderResult<()>;
}

impl<B: GpuBackend> SwapChainDependents<B> for () {
    fn release(&mut self, _renderer: &mut Renderer<B>) -> RenderResult<()> {
        Ok(())
    }

    fn rebuild(&mut self, _renderer: &mut Renderer<B>) -> RenderResult<()> {
        Ok(())
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Makes slot `frame % CONCURRENT_FRAMES` active and acquires the next
    /// swap chain image with its image-acquired semaphore.
    ///
    /// # Errors
    ///
    /// [`RenderError::NoSwapChain`], or a backend error.
    pub fn acquire_next_image(&mut self, frame: u64) -> RenderResult<u32> {
        if !self.swap_chain.is_initialized() {
            return Err(RenderError::NoSwapChain);
        }
        self.active_frame = (frame % CONCURRENT_FRAMES as u64) as usize;

        let slot = &self.frames[self.active_frame];
        let image = self.backend.acquire_next_image(&slot.image_acquired)?;
        self.swap_chain.set_active_image(image)?;

        trace!(frame, slot = self.active_frame, image, "image acquired");
        Ok(image)
    }

    /// Presents the active image once the active slot's render-complete
    /// semaphore is signaled.
    ///
    /// # Errors
    ///
    /// [`RenderError::NotPresentable`] unless the image was transitioned to
    /// PRESENT_SRC, [`RenderError::NoSwapChain`], or a backend error.
    pub fn present(&mut self) -> RenderResult<()> {
        let image = self.swap_chain.active_image();
        let layout = self.swap_chain.image_layout(image)?;
        if layout != ImageLayout::PresentSrc {
            return Err(RenderError::NotPresentable { image, layout });
        }

        let slot = &self.frames[self.active_frame];
        self.backend.present(image, &slot.render_complete)?;

        trace!(slot = self.active_frame, image, "image presented");
        Ok(())
    }

    /// Blocks until the GPU has finished all submitted work.
    ///
    /// # Errors
    ///
    /// Backend failure, or `WouldBlock` from a backend that cannot wait.
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.backend.wait_idle()?;
        Ok(())
    }

    /// Slot selected by the last acquire.
    #[must_use]
    pub const fn active_frame(&self) -> usize {
        self.active_frame
    }

    /// Rebuilds the swap chain for `extent` and everything sized to it.
    ///
    /// Runs drain, release, destroy, init, rebuild in that order.
    ///
    /// # Errors
    ///
    /// The first error from any step. Later steps do not run.
    pub fn resize<D>(&mut self, extent: Extent2d, dependents: &mut D) -> RenderResult<()>
    where
        D: SwapChainDependents<B> + ?Sized,
    {
        self.wait_idle()?;
        dependents.release(self)?;
        self.destroy_swap_chain();
        self.init_swap_chain(extent)?;
        let chosen = self.swap_chain.extent();
        self.config.surface_extent = chosen;
        dependents.rebuild(self)?;

        info!(width = chosen.width, height = chosen.height, requested_width = extent.width, "swap chain resized");
        Ok(())
    }
}
