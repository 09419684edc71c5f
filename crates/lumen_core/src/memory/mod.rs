//! # Memory Management
//!
//! Host-side allocators backing the renderer:
//! - Arena (bump) allocation for scratch and long-lived load data
//! - Fixed-capacity pools for GPU resource records

mod arena;
mod pool;

pub use arena::{Arena, ArenaCheckpoint, ArenaRegion};
pub use pool::{Pool, PoolHandle};
