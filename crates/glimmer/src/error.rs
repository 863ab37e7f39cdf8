//! Error types for every subsystem, plus the crate-level [`Error`].
//!
//! Geometry, GPU, program and particle errors are returned synchronously.
//! [`LoadError`] is only ever handed to a callback: fetches never fail at the
//! call site.

use std::io;
use thiserror::Error;

use crate::shader::ShaderStage;

/// Errors from the geometry generators and buffer utilities.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    /// A subdivision count below the shape's minimum
    #[error("{shape}: {what} must be at least {min}, got {got}")]
    InvalidSubdivisions {
        shape: &'static str,
        what: &'static str,
        min: u32,
        got: u32,
    },

    /// The mesh would need indices beyond the 16-bit range
    #[error("{count} vertices exceed the 16-bit index limit of 65536")]
    TooManyVertices { count: usize },

    /// Arrays being combined do not carry the same attributes
    #[error("attribute sets differ: {0}")]
    MismatchedAttributes(String),

    /// Nothing to operate on
    #[error("no geometry given")]
    Empty,
}

/// Errors from the GPU resource layer.
#[derive(Debug, Error)]
pub enum GpuError {
    /// The device was lost; recover before using the resource again
    #[error("graphics context lost")]
    ContextLost,

    /// The backend has no live object for this handle
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },

    /// Data length does not match the declared size
    #[error("expected {expected} bytes of {what}, got {got}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// The backend cannot do what was asked
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Device or adapter failure reported by the driver
    #[error("device error: {0}")]
    Device(String),

    /// Image decoding failed
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error while reading a texture source
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from shader compilation, linking and uniform binding.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// A shader stage failed to compile; `log` holds the compiler output
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },

    /// The two stages do not fit together
    #[error("program failed to link: {0}")]
    Link(String),

    /// Program has no uniform of this name
    #[error("unknown uniform `{0}`")]
    UnknownUniform(String),

    /// Program has no vertex attribute of this name
    #[error("unknown attribute `{0}`")]
    UnknownAttribute(String),

    /// Value shape does not match the uniform's declared type
    #[error("uniform `{name}` expects {expected}, got {got}")]
    UniformType {
        name: String,
        expected: String,
        got: String,
    },

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Errors from particle configuration and allocation.
#[derive(Debug, Error)]
pub enum ParticleError {
    /// Six 16-bit indices per particle cap an emitter's size
    #[error("{requested} particles requested, an emitter holds at most {max}")]
    TooManyParticles { requested: usize, max: usize },

    /// Parameter key not recognised
    #[error("unknown particle parameter `{0}`")]
    UnknownParameter(String),

    /// Parameter value could not be interpreted
    #[error("invalid value for particle parameter `{key}`: {message}")]
    InvalidParameter { key: String, message: String },

    /// Handle does not name a live emitter, one-shot or trail
    #[error("no particle drawable with handle {0}")]
    UnknownHandle(usize),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Program(#[from] ProgramError),
}

/// Errors delivered to load callbacks.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Any status other than 200 (or 0 for local files)
    #[error("error loading {url}: status {status}")]
    Status { url: String, status: u16 },

    /// Transport-level failure
    #[error("error loading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: io::Error,
    },

    /// Body was not valid UTF-8 text
    #[error("{url} is not valid UTF-8")]
    Utf8 { url: String },

    /// Body was not valid JSON for the requested type
    #[error("error parsing JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The worker thread went away before answering
    #[error("fetch worker for {url} disconnected")]
    Disconnected { url: String },

    /// Post-processing of a successful fetch failed (e.g. program build)
    #[error("{0}")]
    Other(String),
}

/// Any error this crate returns.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Particle(#[from] ParticleError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
