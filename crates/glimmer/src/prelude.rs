//! Convenience re-exports: `use glimmer::prelude::*` for the common items.

pub use crate::error::{Error, GeometryError, GpuError, LoadError, ParticleError, ProgramError, Result};
pub use crate::geometry::{AttribBuffer, Arrays, cube, cylinder, disc, plane, sphere, torus, truncated_cone};
pub use crate::gpu::{
    Backend, BackendConfig, BlendMode, Buffer, CubeMap, DepthTexture, Framebuffer, GpuResource, HeadlessBackend,
    Primitive, RenderTarget, SolidTexture, Texture, Texture2D, TextureCache,
};
#[cfg(feature = "wgpu-backend")]
pub use crate::gpu::WgpuBackend;
#[cfg(feature = "http")]
pub use crate::io::HttpTransport;
pub use crate::io::{Fetcher, FileTransport, Loader, Progress};
pub use crate::math::{
    ColumnMajor, Convention, Mat4, MathContext, PseudoRandom, Quat, RandomSource, RowMajor, Vec2, Vec3, Vec4,
};
pub use crate::model::Model;
pub use crate::particles::{EmitterId, OneShotId, ParticleSpec, ParticleSystem, TrailId};
pub use crate::shader::{Program, ProgramCache, UniformValue};
pub use crate::time::{Clock, ManualClock, SystemClock};
