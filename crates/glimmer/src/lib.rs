//! # Glimmer: Rendering Utilities on Plain Arrays
//!
//! Math in two matrix conventions, primitive mesh generators, GPU resource
//! wrappers that survive a lost device, reflected shader programs, a GPU
//! particle system and callback-driven asset loading.
//!
//! Start with `use glimmer::prelude::*`. Rendering goes through a
//! [`Backend`](gpu::Backend): [`HeadlessBackend`](gpu::HeadlessBackend)
//! records on the CPU, `WgpuBackend` (feature `wgpu-backend`) draws on a real
//! device.

pub mod error;
pub mod geometry;
pub mod gpu;
pub mod io;
pub mod math;
pub mod model;
pub mod particles;
pub mod prelude;
pub mod shader;
pub mod time;

pub use error::{Error, Result};
