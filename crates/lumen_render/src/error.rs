//! # Render Error Types
//!
//! Every failure the renderer core can report. Production callers turn these
//! into process termination through [`lumen_core::OrFatal`]; tests match on
//! the values.

use lumen_core::MemoryError;
use thiserror::Error;

use crate::command::CommandBufferState;
use crate::resource::ResourceKind;
use crate::types::{BufferType, ImageLayout};

/// Errors raised by a [`GpuBackend`](crate::backend::GpuBackend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No adapter met the device requirements.
    #[error("no suitable GPU adapter")]
    NoSuitableAdapter,

    /// A wait could not be satisfied without blocking.
    ///
    /// Only the headless backend returns this; real backends block.
    #[error("would block waiting on {what}")]
    WouldBlock {
        /// What the caller was waiting on.
        what: &'static str,
    },

    /// A submission or present waited on a semaphore nobody signaled.
    #[error("semaphore waited on before being signaled")]
    SemaphoreNotSignaled,

    /// A semaphore was signaled twice without a wait in between.
    #[error("semaphore signaled while already signaled")]
    SemaphoreAlreadySignaled,

    /// The backend cannot express the request.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// The native API reported a failure.
    #[error("native API failure: {0}")]
    Native(String),
}

/// Errors that can occur in the renderer core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Pool or arena failure (exhaustion, stale handle).
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// `add` was called with a slot that already holds a handle.
    #[error("{kind} handle is not null")]
    HandleNotNull {
        /// Resource kind of the slot.
        kind: ResourceKind,
    },

    /// `remove` was called with an empty slot.
    #[error("{kind} handle is null")]
    HandleIsNull {
        /// Resource kind of the slot.
        kind: ResourceKind,
    },

    /// A command buffer operation was issued from the wrong state.
    #[error("command buffer {index} is {found:?}, expected {expected:?}")]
    InvalidCommandState {
        /// Ring index of the command buffer.
        index: usize,
        /// State the operation requires.
        expected: CommandBufferState,
        /// State the buffer was in.
        found: CommandBufferState,
    },

    /// No command buffer was idle or reclaimable.
    #[error("command ring exhausted: all {capacity} buffers in flight")]
    CommandRingExhausted {
        /// Ring size.
        capacity: usize,
    },

    /// `present` was called while the active image was not presentable.
    #[error("swap chain image {image} is in {layout:?}, not PRESENT_SRC")]
    NotPresentable {
        /// Active image index.
        image: u32,
        /// Tracked layout of that image.
        layout: ImageLayout,
    },

    /// The surface offers no formats or no present modes.
    #[error("surface offers no formats or present modes")]
    NoSurfaceSupport,

    /// A swap chain operation ran while no swap chain exists.
    #[error("no swap chain")]
    NoSwapChain,

    /// A host copy length is not a multiple of the buffer alignment.
    #[error("copy of {len} bytes is not a multiple of alignment {alignment}")]
    MisalignedCopy {
        /// Bytes requested.
        len: usize,
        /// Required alignment.
        alignment: u64,
    },

    /// A host copy would run past the end of the buffer.
    #[error("copy of {len} bytes at offset {offset} exceeds buffer size {size}")]
    CopyOutOfBounds {
        /// Destination offset.
        offset: u64,
        /// Bytes requested.
        len: usize,
        /// Buffer size.
        size: u64,
    },

    /// An upload does not fit in the staging buffer.
    #[error("upload of {len} bytes exceeds staging capacity {capacity}")]
    StagingOverflow {
        /// Bytes requested.
        len: u64,
        /// Staging buffer size.
        capacity: u64,
    },

    /// A buffer of the wrong type was bound.
    #[error("expected a {expected:?} buffer, got {found:?}")]
    WrongBufferType {
        /// Type the command requires.
        expected: BufferType,
        /// Type of the buffer passed.
        found: BufferType,
    },

    /// A descriptor or command argument violates a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Resources are still live at teardown.
    #[error("{count} {kind} handle(s) still live")]
    ResourcesOutstanding {
        /// Resource kind.
        kind: ResourceKind,
        /// Live handle count.
        count: usize,
    },

    /// Invalid renderer configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_errors_convert() {
        let err: RenderError = MemoryError::PoolExhausted { capacity: 4 }.into();
        assert_eq!(err.to_string(), "pool exhausted: capacity 4");
    }

    #[test]
    fn test_handle_errors_name_the_kind() {
        let err = RenderError::HandleNotNull { kind: ResourceKind::Texture };
        assert_eq!(err.to_string(), "texture handle is not null");
    }
}
