//! # LUMEN
//!
//! Drives the renderer core the way an application would: bootstrap, load a
//! scene, run frames, resize, tear down. The `lumen_frames` binary runs this
//! on the headless backend.

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod logging;
pub mod scene;

pub use logging::init_logging;
pub use scene::{FrameConstants, FrameScene};
