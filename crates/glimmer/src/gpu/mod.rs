//! # GPU: Backends and Recoverable Resource Wrappers
//!
//! Rendering goes through the [`Backend`] trait, an immediate-mode surface:
//! create a buffer, write a texture, link a program, issue a draw. Two
//! implementations ship with the crate:
//!
//! - [`HeadlessBackend`]: records everything on the CPU. Used by the tests
//!   and by tools that only need to validate resources and draw calls.
//! - `WgpuBackend` (feature `wgpu-backend`): drives a real device through
//!   wgpu, rendering either offscreen or to a window surface.
//!
//! ## Handles and Context Loss
//!
//! Every GPU object is named by a small logical id ([`BufferId`],
//! [`TextureId`], ...). When the device is lost, the backend forgets all
//! native objects but the ids stay meaningful: after
//! [`Backend::restore_context`], each wrapper re-issues its creation at the
//! *same* id through the `restore_*` calls, using only the parameters and
//! data it retained. Anything holding an id (a draw call, a uniform block)
//! keeps working without being told.
//!
//! ```text
//!  Uninitialised ──create──► Uploaded ──device lost──► ContextLost
//!                               ▲                           │
//!                               └──restore_context + recover┘
//! ```
//!
//! While the context is lost every backend call fails with
//! [`GpuError::ContextLost`].
//!
//! ## Comparison
//!
//! - **luminance**: backend traits per concept (`BufferBackend`,
//!   `TextureBackend`, ...) with associated representation types. We use one
//!   object-safe trait and plain ids so wrappers can hold `&mut dyn Backend`.
//! - **WebGL**: the same immediate-mode shape; `webglcontextrestored` plays
//!   the role of `restore_context`.

mod buffer;
mod framebuffer;
mod null;
mod texture;
#[cfg(feature = "wgpu-backend")]
mod wgpu_backend;

use std::fmt;

use serde::Deserialize;

pub use buffer::Buffer;
pub use framebuffer::{CubeFramebuffer, Framebuffer};
pub use null::{DrawRecord, HeadlessBackend};
pub use texture::{
    CubeMap, DepthTexture, SolidTexture, Texture, Texture2D, TextureCache, TextureSource,
};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;

use crate::error::{GpuError, ProgramError};
use crate::shader::{ProgramLayout, ShaderStage};

// ── Handles ─────────────────────────────────────────────────────────────────

macro_rules! handle {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

handle!(BufferId, "buffer");
handle!(TextureId, "texture");
handle!(FramebufferId, "framebuffer");
handle!(ShaderId, "shader");
handle!(ProgramId, "program");

// ── Descriptors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    /// 16-bit indices.
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
    Depth,
}

/// Texel formats. Colour textures are 8-bit RGBA; depth is 32-bit float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Depth32,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    /// Bytes in one face (one layer) of level 0.
    pub fn face_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wrap {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Sampling state of a texture, re-applied after context loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerParams {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
}

/// Faces of a cube map in layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }
}

/// What a framebuffer renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferDesc {
    pub color: TextureId,
    /// Face to render when `color` is a cube map.
    pub face: Option<CubeFace>,
    pub depth: Option<TextureId>,
    pub width: u32,
    pub height: u32,
}

/// Where a clear or draw lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTarget {
    /// The backend's own target: the window surface or its offscreen image.
    #[default]
    Default,
    Framebuffer(FramebufferId),
}

/// Layout of one vertex attribute in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    /// Four bytes read as floats in `[0, 1]`.
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(self) -> u64 {
        match self {
            VertexFormat::Float32 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }

    /// Float format with `n` components, if there is one.
    pub fn float(n: usize) -> Option<Self> {
        match n {
            1 => Some(VertexFormat::Float32),
            2 => Some(VertexFormat::Float32x2),
            3 => Some(VertexFormat::Float32x3),
            4 => Some(VertexFormat::Float32x4),
            _ => None,
        }
    }
}

/// An attribute location fed from a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub buffer: BufferId,
    pub location: u32,
    pub format: VertexFormat,
    pub stride: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Primitive {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Opaque,
    /// `src * a + dst * (1 - a)`.
    Alpha,
    /// `src * a + dst`.
    Additive,
    /// `src + dst * (1 - a)`.
    Premultiplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self { test: true, write: true }
    }
}

/// A texture bound for one draw: the texture at `binding`, its sampler at
/// `binding + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    pub binding: u32,
    pub texture: TextureId,
}

/// Everything one draw needs.
#[derive(Debug, Clone)]
pub struct DrawCall<'a> {
    pub target: RenderTarget,
    pub program: ProgramId,
    pub vertices: &'a [VertexBinding],
    /// 16-bit index buffer; `None` draws vertices in order.
    pub indices: Option<BufferId>,
    pub primitive: Primitive,
    /// Index (or vertex) count.
    pub count: u32,
    pub first: u32,
    /// Contents of the uniform block at group 0, binding 0.
    pub uniforms: &'a [u8],
    pub textures: &'a [TextureBinding],
    pub blend: BlendMode,
    pub depth: DepthState,
}

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    Default,
    LowPower,
    HighPerformance,
}

/// Backend settings, loadable from JSON.
///
/// ```json
/// { "power_preference": "high_performance", "width": 1280, "height": 720 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub power_preference: PowerPreference,
    /// Size of the default render target when there is no window.
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    /// Whether the default target gets a depth attachment.
    pub depth: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::Default,
            width: 640,
            height: 480,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            depth: true,
        }
    }
}

impl BackendConfig {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ── Backend trait ───────────────────────────────────────────────────────────

/// Immediate-mode graphics surface.
///
/// `create_*` allocate a fresh id; `restore_*` rebuild the native object for
/// an id issued before the context was lost. `delete_*` on an unknown id is
/// a no-op.
pub trait Backend {
    fn name(&self) -> &str;

    fn is_context_lost(&self) -> bool;

    /// Bring the device back after a loss. Every native object is gone
    /// afterwards; wrappers must be recovered.
    fn restore_context(&mut self) -> Result<(), GpuError>;

    /// Size of [`RenderTarget::Default`].
    fn default_target_size(&self) -> (u32, u32);

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId, GpuError>;
    fn restore_buffer(&mut self, id: BufferId, kind: BufferKind, data: &[u8]) -> Result<(), GpuError>;
    /// Overwrite part of a buffer. The range must lie inside it.
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;
    fn delete_buffer(&mut self, id: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError>;
    fn restore_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<(), GpuError>;
    /// Upload level 0 of a 2D texture, or of one cube face.
    fn write_texture(&mut self, id: TextureId, face: Option<CubeFace>, data: &[u8]) -> Result<(), GpuError>;
    fn set_sampler(&mut self, id: TextureId, params: &SamplerParams) -> Result<(), GpuError>;
    fn delete_texture(&mut self, id: TextureId);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId, GpuError>;
    fn restore_framebuffer(&mut self, id: FramebufferId, desc: &FramebufferDesc) -> Result<(), GpuError>;
    fn delete_framebuffer(&mut self, id: FramebufferId);

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, ProgramError>;
    fn restore_shader(&mut self, id: ShaderId, stage: ShaderStage, source: &str) -> Result<(), ProgramError>;
    fn delete_shader(&mut self, id: ShaderId);

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, ProgramError>;
    fn restore_program(
        &mut self,
        id: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<(), ProgramError>;
    fn delete_program(&mut self, id: ProgramId);

    /// Clear colour and/or depth of a target; `None` leaves that part alone.
    fn clear(&mut self, target: RenderTarget, color: Option<[f32; 4]>, depth: Option<f32>) -> Result<(), GpuError>;

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), GpuError>;
}

/// An object owning backend state that must be rebuilt after context loss.
pub trait GpuResource {
    /// Recreate the native object(s) at the same ids and re-issue every
    /// parameter and upload from retained state.
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_json_fills_defaults() {
        let c = BackendConfig::from_json(r#"{ "width": 1280, "power_preference": "low_power" }"#).unwrap();
        assert_eq!(c.width, 1280);
        assert_eq!(c.height, 480);
        assert_eq!(c.power_preference, PowerPreference::LowPower);
        assert!(c.depth);
    }

    #[test]
    fn handles_display_their_kind() {
        assert_eq!(BufferId(3).to_string(), "buffer#3");
        assert_eq!(CubeFace::NegativeZ.layer(), 5);
        assert_eq!(VertexFormat::float(3), Some(VertexFormat::Float32x3));
        assert_eq!(VertexFormat::Float32x3.size(), 12);
    }
}
