//! # LUMEN Core
//!
//! Host memory primitives for the LUMEN renderer core:
//! - [`Arena`]: bump allocation with checkpoint/rollback
//! - [`Pool`]: fixed-capacity slots with generation-checked [`PoolHandle`]s
//! - [`OrFatal`]: the terminate-with-diagnostic policy for renderer defects
//!
//! ## Architecture Rules
//!
//! 1. **Capacities are fixed at init** - nothing here ever grows
//! 2. **No raw addresses as handles** - stale handles are detected, not UB
//! 3. **Single writer** - no locking; one owner on the render thread
//!
//! ## Example
//!
//! ```rust
//! use lumen_core::{Arena, Pool};
//!
//! let mut scratch = Arena::new(64 * 1024);
//! let upload = scratch.push_copy(256, None).unwrap();
//! assert_eq!(upload.len(), 256);
//!
//! let mut textures: Pool<u32> = Pool::new(1024);
//! let handle = textures.alloc(7).unwrap();
//! assert_eq!(*textures.get(handle).unwrap(), 7);
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod fatal;
pub mod memory;

pub use error::{MemoryError, MemoryResult};
pub use fatal::OrFatal;
pub use memory::{Arena, ArenaCheckpoint, ArenaRegion, Pool, PoolHandle};
