//! # Shader Programs
//!
//! A [`Program`] is a WGSL vertex stage plus a WGSL fragment stage, linked.
//! Both sources go through naga first, so compile errors come back with a
//! readable log before any backend sees them, and reflection yields every
//! attribute location, uniform offset and texture binding. The backend only
//! ever receives sources that validated.
//!
//! ## Binding Conventions
//!
//! ```text
//! @group(0) @binding(0)      var<uniform> u: Uniforms;   // one block, both stages
//! @group(0) @binding(N)      var tex: texture_2d<f32>;   // N >= 1
//! @group(0) @binding(N + 1)  var tex_sampler: sampler;   // paired by position
//! ```
//!
//! Uniforms are set by member name into a [`UniformBlock`], textures by
//! variable name. The block is then handed to a draw.
//!
//! ## Caching
//!
//! [`ProgramCache`] shares programs by exact source text. Compiling the same
//! pair twice returns the same `Rc<Program>`; after a context loss,
//! [`ProgramCache::recover`] rebuilds all of them.

mod reflect;
mod uniform;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub use reflect::{AttributeInfo, ProgramLayout, TextureSlot, UniformInfo, UniformType};
pub use uniform::{UniformBlock, UniformValue};

use crate::error::{LoadError, ProgramError};
use crate::gpu::{Backend, Buffer, ProgramId, ShaderId, VertexBinding};
use crate::io::Fetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A linked vertex + fragment program and its reflection tables.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    vertex: ShaderId,
    fragment: ShaderId,
    vertex_source: String,
    fragment_source: String,
    layout: ProgramLayout,
}

impl Program {
    pub fn new(backend: &mut dyn Backend, vertex_source: &str, fragment_source: &str) -> Result<Self, ProgramError> {
        let vs = reflect::reflect_stage(ShaderStage::Vertex, vertex_source)?;
        let fs = reflect::reflect_stage(ShaderStage::Fragment, fragment_source)?;
        let layout = reflect::link(&vs, &fs)?;

        let vertex = backend.compile_shader(ShaderStage::Vertex, vertex_source)?;
        let fragment = match backend.compile_shader(ShaderStage::Fragment, fragment_source) {
            Ok(id) => id,
            Err(e) => {
                backend.delete_shader(vertex);
                return Err(e);
            }
        };
        let id = match backend.link_program(vertex, fragment, &layout) {
            Ok(id) => id,
            Err(e) => {
                backend.delete_shader(vertex);
                backend.delete_shader(fragment);
                return Err(e);
            }
        };
        log::info!(
            "linked {id}: {} attributes, {} uniforms, {} textures",
            layout.attributes.len(),
            layout.uniforms.len(),
            layout.textures.len()
        );
        Ok(Self {
            id,
            vertex,
            fragment,
            vertex_source: vertex_source.to_string(),
            fragment_source: fragment_source.to_string(),
            layout,
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    /// Whether `name` is a uniform or texture of this program.
    pub fn has_uniform(&self, name: &str) -> bool {
        self.layout.uniform(name).is_some() || self.layout.texture(name).is_some()
    }

    /// A zeroed uniform block sized for this program.
    pub fn uniform_block(&self) -> UniformBlock {
        UniformBlock::new(self.layout.uniform_block_size as usize)
    }

    /// Set one uniform or texture by name.
    pub fn set_uniform(
        &self,
        block: &mut UniformBlock,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Result<(), ProgramError> {
        let value = value.into();
        if let Some(slot) = self.layout.texture(name) {
            return match value {
                UniformValue::Texture(id) => {
                    block.bind_texture(slot.binding, id);
                    Ok(())
                }
                other => Err(ProgramError::UniformType {
                    name: name.to_string(),
                    expected: "texture".into(),
                    got: other.describe(),
                }),
            };
        }
        let info = self.layout.uniform(name).ok_or_else(|| ProgramError::UnknownUniform(name.to_string()))?;
        block.write(info, &value)
    }

    /// Set every value whose name this program declares; others are skipped
    /// so one shared map can feed several programs.
    pub fn set_uniforms<'a>(
        &self,
        block: &mut UniformBlock,
        values: impl IntoIterator<Item = (&'a str, &'a UniformValue)>,
    ) -> Result<(), ProgramError> {
        for (name, value) in values {
            if self.has_uniform(name) {
                self.set_uniform(block, name, value.clone())?;
            }
        }
        Ok(())
    }

    /// Feed the named attribute from `buffer`.
    pub fn attribute_binding(&self, name: &str, buffer: &Buffer) -> Result<VertexBinding, ProgramError> {
        let attribute = self.layout.attribute(name).ok_or_else(|| ProgramError::UnknownAttribute(name.to_string()))?;
        Ok(buffer.binding(attribute.location)?)
    }

    /// Recompile both stages and relink at the same ids.
    pub fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), ProgramError> {
        backend.restore_shader(self.vertex, ShaderStage::Vertex, &self.vertex_source)?;
        backend.restore_shader(self.fragment, ShaderStage::Fragment, &self.fragment_source)?;
        backend.restore_program(self.id, self.vertex, self.fragment, &self.layout)
    }

    pub fn delete(&self, backend: &mut dyn Backend) {
        backend.delete_program(self.id);
        backend.delete_shader(self.vertex);
        backend.delete_shader(self.fragment);
    }
}

/// Programs shared by exact source text.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<String, Rc<Program>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(vertex_source: &str, fragment_source: &str) -> String {
        let mut key = String::with_capacity(vertex_source.len() + fragment_source.len());
        key.push_str(vertex_source);
        key.push_str(fragment_source);
        key
    }

    /// The cached program for this pair, compiling it on first use. Failures
    /// are not cached.
    pub fn get_or_create(
        &mut self,
        backend: &mut dyn Backend,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Rc<Program>, ProgramError> {
        let key = Self::key(vertex_source, fragment_source);
        if let Some(program) = self.programs.get(&key) {
            log::debug!("program cache hit: {}", program.id());
            return Ok(Rc::clone(program));
        }
        let program = Rc::new(Program::new(backend, vertex_source, fragment_source)?);
        self.programs.insert(key, Rc::clone(&program));
        Ok(program)
    }

    /// Like [`get_or_create`](Self::get_or_create), but reports through
    /// `on_done` instead of returning. Compile errors are logged too.
    pub fn get_or_create_with(
        &mut self,
        backend: &mut dyn Backend,
        vertex_source: &str,
        fragment_source: &str,
        on_done: impl FnOnce(Result<Rc<Program>, ProgramError>),
    ) {
        let result = self.get_or_create(backend, vertex_source, fragment_source);
        if let Err(e) = &result {
            log::warn!("{e}");
        }
        on_done(result);
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Rebuild every cached program after context loss.
    pub fn recover(&self, backend: &mut dyn Backend) -> Result<(), ProgramError> {
        for program in self.programs.values() {
            program.recover_from_lost_context(backend)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.programs.clear();
    }
}

/// Fetch both stages, then build the program through `cache` once both have
/// arrived. `on_done` runs exactly once, from [`Fetcher::poll`].
pub fn load_program<B, F>(
    fetcher: &mut Fetcher,
    backend: Rc<RefCell<B>>,
    cache: Rc<RefCell<ProgramCache>>,
    vertex_url: &str,
    fragment_url: &str,
    on_done: F,
) where
    B: Backend + 'static,
    F: FnOnce(Result<Rc<Program>, LoadError>) + 'static,
{
    struct Pending<F> {
        vertex: Option<String>,
        fragment: Option<String>,
        on_done: Option<F>,
    }

    let pending = Rc::new(RefCell::new(Pending { vertex: None, fragment: None, on_done: Some(on_done) }));

    let arrive = move |pending: &Rc<RefCell<Pending<F>>>, stage: ShaderStage, result: Result<String, LoadError>| {
        let mut guard = pending.borrow_mut();
        let state = &mut *guard;
        let source = match result {
            Ok(source) => source,
            Err(e) => {
                if let Some(on_done) = state.on_done.take() {
                    on_done(Err(e));
                }
                return;
            }
        };
        match stage {
            ShaderStage::Vertex => state.vertex = Some(source),
            ShaderStage::Fragment => state.fragment = Some(source),
        }
        let (Some(vs), Some(fs)) = (&state.vertex, &state.fragment) else { return };
        let Some(on_done) = state.on_done.take() else { return };
        let built = cache
            .borrow_mut()
            .get_or_create(&mut *backend.borrow_mut(), vs, fs)
            .map_err(|e| LoadError::Other(e.to_string()));
        on_done(built);
    };
    let arrive = Rc::new(arrive);

    for (stage, url) in [(ShaderStage::Vertex, vertex_url), (ShaderStage::Fragment, fragment_url)] {
        let pending = Rc::clone(&pending);
        let arrive = Rc::clone(&arrive);
        fetcher.load_text(url, move |result| arrive(&pending, stage, result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::AttribBuffer;
    use crate::gpu::{HeadlessBackend, TextureId};
    use crate::io::MemoryTransport;

    pub(crate) const VS: &str = r#"
struct Uniforms {
    world_view_projection: mat4x4<f32>,
    color: vec4<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) tex_coord: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u.world_view_projection * vec4<f32>(position, 1.0);
    out.uv = tex_coord;
    return out;
}
"#;

    pub(crate) const FS: &str = r#"
struct Uniforms {
    world_view_projection: mat4x4<f32>,
    color: vec4<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var diffuse: texture_2d<f32>;
@group(0) @binding(2) var diffuse_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(diffuse, diffuse_sampler, uv) * u.color;
}
"#;

    #[test]
    fn cache_hit_returns_the_same_program_without_recompiling() {
        let mut backend = HeadlessBackend::default();
        let mut cache = ProgramCache::new();
        let a = cache.get_or_create(&mut backend, VS, FS).unwrap();
        assert_eq!(backend.compile_count(), 2);
        let b = cache.get_or_create(&mut backend, VS, FS).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(backend.compile_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn compile_failures_are_reported_and_not_cached() {
        let mut backend = HeadlessBackend::default();
        let mut cache = ProgramCache::new();
        let mut seen = None;
        cache.get_or_create_with(&mut backend, VS, "@fragment fn fs_main( {", |r| seen = Some(r));
        assert!(matches!(seen, Some(Err(ProgramError::Compile { stage: ShaderStage::Fragment, .. }))));
        assert!(cache.is_empty());
        assert_eq!(backend.compile_count(), 0);
    }

    #[test]
    fn uniforms_and_textures_by_name() {
        let mut backend = HeadlessBackend::default();
        let program = Program::new(&mut backend, VS, FS).unwrap();
        let mut block = program.uniform_block();
        assert_eq!(block.as_bytes().len(), 80);

        program.set_uniform(&mut block, "color", [1.0, 0.5, 0.25, 1.0]).unwrap();
        assert_eq!(&block.as_bytes()[68..72], &0.5_f32.to_le_bytes());
        program.set_uniform(&mut block, "diffuse", TextureId(9)).unwrap();
        assert_eq!(block.textures()[0].binding, 1);

        assert!(matches!(
            program.set_uniform(&mut block, "nope", 1.0_f32),
            Err(ProgramError::UnknownUniform(_))
        ));
        assert!(program.set_uniform(&mut block, "diffuse", 1.0_f32).is_err());

        let shared = [("color", UniformValue::Vec4([0.0; 4])), ("elsewhere", UniformValue::Float(2.0))];
        program.set_uniforms(&mut block, shared.iter().map(|(n, v)| (*n, v))).unwrap();
    }

    #[test]
    fn attributes_bind_by_name() {
        let mut backend = HeadlessBackend::default();
        let program = Program::new(&mut backend, VS, FS).unwrap();
        let uv = Buffer::vertex(&mut backend, &AttribBuffer::from_vec(2, vec![0.0_f32; 6])).unwrap();
        let binding = program.attribute_binding("tex_coord", &uv).unwrap();
        assert_eq!(binding.location, 1);
        assert!(matches!(
            program.attribute_binding("normal", &uv),
            Err(ProgramError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn recover_rebuilds_cached_programs() {
        let mut backend = HeadlessBackend::default();
        let mut cache = ProgramCache::new();
        let program = cache.get_or_create(&mut backend, VS, FS).unwrap();
        backend.lose_context();
        backend.restore_context().unwrap();
        assert_eq!(backend.num_programs(), 0);
        cache.recover(&mut backend).unwrap();
        assert_eq!(backend.num_programs(), 1);
        assert!(backend.program_layout(program.id()).is_some());
        assert_eq!(backend.compile_count(), 4);
    }

    #[test]
    fn load_program_builds_once_both_sources_arrive() {
        let transport = MemoryTransport::new().with_text("a.vs", VS).with_text("a.fs", FS);
        let mut fetcher = Fetcher::new(transport);
        let backend = Rc::new(RefCell::new(HeadlessBackend::default()));
        let cache = Rc::new(RefCell::new(ProgramCache::new()));
        let result = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..2 {
            let sink = Rc::clone(&result);
            load_program(&mut fetcher, Rc::clone(&backend), Rc::clone(&cache), "a.vs", "a.fs", move |r| {
                sink.borrow_mut().push(r);
            });
            fetcher.wait();
        }
        let results = result.borrow();
        assert_eq!(results.len(), 2);
        let (Ok(first), Ok(second)) = (&results[0], &results[1]) else { panic!("both loads should succeed") };
        assert!(Rc::ptr_eq(first, second));
        assert_eq!(cache.borrow().len(), 1);
        assert_eq!(backend.borrow().compile_count(), 2);
    }

    #[test]
    fn load_program_reports_a_missing_stage_once() {
        let transport = MemoryTransport::new().with_text("a.vs", VS);
        let mut fetcher = Fetcher::new(transport);
        let backend = Rc::new(RefCell::new(HeadlessBackend::default()));
        let cache = Rc::new(RefCell::new(ProgramCache::new()));
        let calls = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&calls);
        load_program(&mut fetcher, backend, cache, "a.vs", "missing.fs", move |r| {
            sink.borrow_mut().push(r.is_err());
        });
        fetcher.wait();
        assert_eq!(*calls.borrow(), vec![true]);
    }
}
