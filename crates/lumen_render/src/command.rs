//! # Command Buffer Ring
//!
//! A fixed ring of command buffers, each driven through a small state
//! machine:
//!
//! ```text
//!            get_cmd           begin_cmd            end_cmd
//! SUBMITTED ────────→ IDLE ──────────→ RECORDING ──────────→ READY
//!     ↑  (fence signaled)                                      │
//!     └──────────────── submit_frame / submit_immediate ───────┘
//! ```
//!
//! `get_cmd` prefers an IDLE buffer and otherwise reclaims a SUBMITTED one
//! whose fence has signaled, scanning from index 0 in both passes. Frame
//! buffers share their frame slot's fence; immediate buffers share the
//! immediate fence.

use tracing::{debug, trace};

use crate::backend::{GpuBackend, SubmitSync};
use crate::error::{BackendResult, RenderError, RenderResult};
use crate::renderer::Renderer;

/// Default ring length.
pub const MAX_COMMAND_BUFFERS: usize = 16;

/// Lifecycle state of a command buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// Not allocated.
    #[default]
    Invalid,
    /// Free for `get_cmd`.
    Idle,
    /// Between `begin_cmd` and `end_cmd`.
    Recording,
    /// Recorded, waiting for submission.
    Ready,
    /// Owned by the GPU until its fence signals.
    Submitted,
}

/// Index of a command buffer in the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandBufferId(pub(crate) usize);

impl CommandBufferId {
    /// Position in the ring.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Which fence a command buffer signals on submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FenceSlot {
    /// The immediate fence, waited on right after submission.
    Immediate,
    /// The fence of frame slot `n`.
    Frame(usize),
}

/// One ring entry.
pub struct CommandBuffer<B: GpuBackend> {
    state: CommandBufferState,
    list: B::CommandList,
    fence: Option<FenceSlot>,
}

impl<B: GpuBackend> CommandBuffer<B> {
    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Fence bound by the last `get_cmd`, if any.
    #[must_use]
    pub const fn fence(&self) -> Option<FenceSlot> {
        self.fence
    }
}

/// The fixed ring of command buffers.
pub struct CommandRing<B: GpuBackend> {
    buffers: Vec<CommandBuffer<B>>,
}

impl<B: GpuBackend> CommandRing<B> {
    /// Allocates `count` native lists, all IDLE with no fence.
    pub(crate) fn new(backend: &mut B, count: usize) -> BackendResult<Self> {
        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            buffers.push(CommandBuffer {
                state: CommandBufferState::Idle,
                list: backend.create_command_list()?,
                fence: None,
            });
        }
        Ok(Self { buffers })
    }

    pub(crate) fn destroy(self, backend: &mut B) {
        for buffer in self.buffers {
            backend.destroy_command_list(buffer.list);
        }
    }

    /// Ring length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true for a ring without buffers. Never the case once
    /// the renderer is built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of buffers in `state`.
    #[must_use]
    pub fn count(&self, state: CommandBufferState) -> usize {
        self.buffers.iter().filter(|b| b.state == state).count()
    }

    fn get(&self, id: CommandBufferId) -> RenderResult<&CommandBuffer<B>> {
        self.buffers
            .get(id.0)
            .ok_or(RenderError::InvalidArgument("command buffer index out of range"))
    }

    fn get_mut(&mut self, id: CommandBufferId) -> RenderResult<&mut CommandBuffer<B>> {
        self.buffers
            .get_mut(id.0)
            .ok_or(RenderError::InvalidArgument("command buffer index out of range"))
    }

    /// Fails with `InvalidCommandState` unless `id` is in `expected`.
    pub(crate) fn expect(
        &mut self,
        id: CommandBufferId,
        expected: CommandBufferState,
    ) -> RenderResult<&mut CommandBuffer<B>> {
        let buffer = self.get_mut(id)?;
        if buffer.state != expected {
            return Err(RenderError::InvalidCommandState {
                index: id.0,
                expected,
                found: buffer.state,
            });
        }
        Ok(buffer)
    }

    /// Native list of a RECORDING buffer.
    pub(crate) fn recording_list(&mut self, id: CommandBufferId) -> RenderResult<&mut B::CommandList> {
        Ok(&mut self.expect(id, CommandBufferState::Recording)?.list)
    }

    fn find_idle(&self) -> Option<usize> {
        self.buffers.iter().position(|b| b.state == CommandBufferState::Idle)
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// Hands out a command buffer bound to the immediate fence or to the
    /// active frame's fence.
    ///
    /// A frame request first blocks until the active slot's previous work
    /// has finished. The returned buffer is IDLE with its fence reset.
    ///
    /// # Errors
    ///
    /// - [`RenderError::CommandRingExhausted`] if no buffer is IDLE and
    ///   none of the SUBMITTED ones has finished
    /// - backend errors, including `WouldBlock` from a backend that cannot
    ///   wait
    pub fn get_cmd(&mut self, immediate: bool) -> RenderResult<CommandBufferId> {
        let slot = if immediate {
            FenceSlot::Immediate
        } else {
            self.backend.wait_fence(&self.frames[self.active_frame].fence)?;
            FenceSlot::Frame(self.active_frame)
        };

        let index = match self.ring.find_idle() {
            Some(index) => index,
            None => self.reclaim()?,
        };

        let fence = match slot {
            FenceSlot::Immediate => &self.immediate_fence,
            FenceSlot::Frame(frame) => &self.frames[frame].fence,
        };
        let buffer = &mut self.ring.buffers[index];
        self.backend.reset_command_list(&mut buffer.list)?;
        buffer.fence = Some(slot);
        self.backend.reset_fence(fence)?;
        buffer.state = CommandBufferState::Idle;

        Ok(CommandBufferId(index))
    }

    /// IDLE → RECORDING.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidCommandState`] unless IDLE.
    pub fn begin_cmd(&mut self, id: CommandBufferId) -> RenderResult<()> {
        let buffer = self.ring.expect(id, CommandBufferState::Idle)?;
        self.backend.begin_command_list(&mut buffer.list)?;
        buffer.state = CommandBufferState::Recording;
        Ok(())
    }

    /// RECORDING → READY.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidCommandState`] unless RECORDING.
    pub fn end_cmd(&mut self, id: CommandBufferId) -> RenderResult<()> {
        let buffer = self.ring.expect(id, CommandBufferState::Recording)?;
        self.backend.end_command_list(&mut buffer.list)?;
        buffer.state = CommandBufferState::Ready;
        Ok(())
    }

    /// Submits a READY buffer as the active frame's work: waits on the
    /// image-acquired semaphore and signals render-complete.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidCommandState`] unless READY, or a backend
    /// error such as a semaphore that was never signaled.
    pub fn submit_frame(&mut self, id: CommandBufferId) -> RenderResult<()> {
        let frame = &self.frames[self.active_frame];
        let buffer = self.ring.expect(id, CommandBufferState::Ready)?;
        let fence = match buffer.fence {
            Some(FenceSlot::Immediate) => &self.immediate_fence,
            Some(FenceSlot::Frame(slot)) => &self.frames[slot].fence,
            None => return Err(RenderError::InvalidArgument("command buffer has no fence")),
        };

        let sync = SubmitSync {
            wait: Some(&frame.image_acquired),
            signal: Some(&frame.render_complete),
            fence,
        };
        self.backend.submit(&mut buffer.list, sync)?;
        buffer.state = CommandBufferState::Submitted;

        trace!(index = id.0, frame = self.active_frame, "frame submitted");
        Ok(())
    }

    /// Submits a READY buffer with no semaphores and blocks until it has
    /// finished.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidCommandState`] unless READY, or a backend error.
    pub fn submit_immediate(&mut self, id: CommandBufferId) -> RenderResult<()> {
        let buffer = self.ring.expect(id, CommandBufferState::Ready)?;
        let fence = match buffer.fence {
            Some(FenceSlot::Immediate) => &self.immediate_fence,
            Some(FenceSlot::Frame(slot)) => &self.frames[slot].fence,
            None => return Err(RenderError::InvalidArgument("command buffer has no fence")),
        };

        self.backend.submit(&mut buffer.list, SubmitSync { wait: None, signal: None, fence })?;
        buffer.state = CommandBufferState::Submitted;
        self.backend.wait_fence(fence)?;
        Ok(())
    }

    /// Current state of a command buffer.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] for an index outside the ring.
    pub fn command_state(&self, id: CommandBufferId) -> RenderResult<CommandBufferState> {
        Ok(self.ring.get(id)?.state)
    }

    /// The ring, for diagnostics.
    #[must_use]
    pub const fn command_ring(&self) -> &CommandRing<B> {
        &self.ring
    }

    fn reclaim(&mut self) -> RenderResult<usize> {
        for (index, buffer) in self.ring.buffers.iter().enumerate() {
            if buffer.state != CommandBufferState::Submitted {
                continue;
            }
            let fence = match buffer.fence {
                Some(FenceSlot::Immediate) => &self.immediate_fence,
                Some(FenceSlot::Frame(slot)) => &self.frames[slot].fence,
                None => continue,
            };
            if self.backend.fence_signaled(fence)? {
                debug!(index, fence = ?buffer.fence, "reclaimed command buffer");
                return Ok(index);
            }
        }
        Err(RenderError::CommandRingExhausted { capacity: self.ring.len() })
    }
}
