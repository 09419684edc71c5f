//! # LUMEN Render
//!
//! Resource lifecycle and frame synchronization for a real-time GPU renderer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Renderer<B>                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Device bootstrap → Pools + Swap chain                       │
//! │        ↓                                                     │
//! │  get_cmd → begin → Recorder (barriers, draws) → end          │
//! │        ↓                                                     │
//! │  acquire → submit_frame → present      (2 frames in flight)  │
//! │        ↓                                                     │
//! │  GPU timer: per-slot timestamps, read after the slot fence   │
//! └──────────────────────────────────────────────────────────────┘
//!                             │ GpuBackend
//!              ┌──────────────┴──────────────┐
//!        HeadlessBackend                WgpuBackend
//! ```
//!
//! ## Rules
//!
//! 1. **One explicit context** - no globals, `&mut Renderer` on one thread
//! 2. **Handles, not references** - every resource is a generation-checked id
//! 3. **Add once, remove once** - handle slots catch leaks and double frees
//! 4. **Drain before destroying** - removing in-flight resources is a caller bug
//!
//! ## Example
//!
//! ```rust
//! use lumen_render::backend::headless::HeadlessBackend;
//! use lumen_render::{BufferDesc, BufferType, DeviceRequirements, Renderer, RendererConfig};
//!
//! let backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap();
//! let mut renderer = Renderer::new(backend, RendererConfig::default()).unwrap();
//!
//! let mut vertices = None;
//! let desc = BufferDesc::array(BufferType::Vertex, 12, 3);
//! renderer.add_buffer(&desc, &mut vertices, Some(&[0u8; 36])).unwrap();
//! renderer.remove_buffer(&mut vertices).unwrap();
//!
//! renderer.destroy().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod barrier;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod recorder;
pub mod renderer;
pub mod resource;
pub mod swap_chain;
pub mod timer;
pub mod types;

pub use backend::{GpuBackend, SurfaceCapabilities, SwapChainConfig};
pub use barrier::{Barrier, RenderTargetBarrier, TextureBarrier};
pub use command::{CommandBufferId, CommandBufferState, FenceSlot, MAX_COMMAND_BUFFERS};
pub use config::{PoolCapacities, RendererConfig, DEFAULT_STAGING_BUFFER_SIZE};
pub use device::{
    select_adapter, AdapterCandidate, AdapterFeatures, AdapterKind, AdapterSelection, DeviceInfo,
    DeviceLimits, DeviceRequirements, QueueFamily,
};
pub use error::{BackendError, BackendResult, RenderError, RenderResult};
pub use frame::{SwapChainDependents, CONCURRENT_FRAMES};
pub use recorder::{Recorder, RenderTargetBindDesc, RenderTargetBinding};
pub use renderer::Renderer;
pub use resource::{
    max_mip_count, BufferDesc, BufferId, ComputePipelineDesc, ComputePipelineId, ConstantBlock,
    Descriptor, DescriptorResource, DescriptorSetDesc, DescriptorSetId, DescriptorType,
    GraphicsPipelineDesc, GraphicsPipelineId, RenderTargetDesc, RenderTargetId, ResourceKind,
    SamplerDesc, SamplerId, ShaderDesc, ShaderId, ShaderStage, TextureDesc, TextureId, VertexAttrib,
    VertexLayout,
};
pub use swap_chain::{choose_swap_chain_config, SwapChain};
pub use timer::{GpuTimer, TimestampHistory, MAX_TIMESTAMPS, TIMER_HISTORY, TIMER_START};
pub use types::*;
