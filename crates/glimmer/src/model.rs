//! # Model: A Mesh Bound to a Program
//!
//! A [`Model`] ties together what one kind of object needs to be drawn: a
//! program, the mesh's arrays uploaded as vertex buffers, the textures the
//! program samples, and the primitive mode.
//!
//! ## Two Kinds of Uniforms
//!
//! ```text
//!  draw_prep(shared)          once per frame: view, projection, lights
//!      │
//!      ▼
//!  draw(per_object) ──► draw(per_object) ──► ...   world matrix, colour
//! ```
//!
//! Values set by [`Model::draw_prep`] persist in the model's uniform block;
//! each [`Model::draw`] starts from that block, layers its own values on top
//! and issues one draw. Names the program does not declare are skipped, so
//! one shared map can feed several models.
//!
//! Attributes are matched by name: an array named `position` feeds the
//! shader input named `position`. Arrays the program does not read are not
//! uploaded; a program input with no array is an error.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{GpuError, ProgramError};
use crate::geometry::Arrays;
use crate::gpu::{
    Backend, BlendMode, Buffer, DepthState, DrawCall, GpuResource, Primitive, RenderTarget, TextureId, VertexBinding,
};
use crate::shader::{Program, UniformBlock, UniformValue};

#[derive(Debug)]
pub struct Model {
    program: Rc<Program>,
    /// Vertex buffers keyed by attribute name.
    buffers: BTreeMap<String, Buffer>,
    indices: Option<Buffer>,
    bindings: Vec<VertexBinding>,
    count: u32,
    primitive: Primitive,
    blend: BlendMode,
    depth: DepthState,
    block: UniformBlock,
}

impl Model {
    /// Upload `arrays` for `program` and bind `textures` by sampler name.
    pub fn new<'a>(
        backend: &mut dyn Backend,
        program: Rc<Program>,
        arrays: &Arrays,
        textures: impl IntoIterator<Item = (&'a str, TextureId)>,
        primitive: Primitive,
    ) -> Result<Self, ProgramError> {
        let layout = program.layout();
        let mut buffers = BTreeMap::new();
        let mut bindings = Vec::new();

        for attribute in &layout.attributes {
            let name = attribute.name.as_str();
            let buffer = match name {
                "color" => arrays.color.as_ref().map(|c| Buffer::colors(backend, c)),
                _ => arrays
                    .float_attributes()
                    .into_iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, data)| Buffer::vertex(backend, data)),
            };
            let buffer = buffer
                .ok_or_else(|| ProgramError::Link(format!("no array supplies attribute `{name}`")))??;
            bindings.push(program.attribute_binding(name, &buffer)?);
            buffers.insert(name.to_string(), buffer);
        }

        let (indices, count) = if arrays.indices.is_empty() {
            (None, arrays.num_vertices())
        } else {
            (Some(Buffer::index(backend, &arrays.indices)?), arrays.num_indices())
        };

        let mut block = program.uniform_block();
        for (name, texture) in textures {
            program.set_uniform(&mut block, name, texture)?;
        }
        log::debug!("model: {} attributes, {count} elements, {:?}", bindings.len(), primitive);

        Ok(Self {
            program,
            buffers,
            indices,
            bindings,
            count: count as u32,
            primitive,
            blend: BlendMode::Opaque,
            depth: DepthState::default(),
            block,
        })
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Index count, or vertex count for unindexed meshes.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn buffer(&self, attribute: &str) -> Option<&Buffer> {
        self.buffers.get(attribute)
    }

    pub fn set_blend(&mut self, blend: BlendMode) {
        self.blend = blend;
    }

    pub fn set_depth(&mut self, depth: DepthState) {
        self.depth = depth;
    }

    /// Rebind a texture by sampler name.
    pub fn set_texture(&mut self, name: &str, texture: TextureId) -> Result<(), ProgramError> {
        self.program.set_uniform(&mut self.block, name, texture)
    }

    /// Set uniforms shared by every following draw.
    pub fn draw_prep<'a>(
        &mut self,
        uniforms: impl IntoIterator<Item = (&'a str, &'a UniformValue)>,
    ) -> Result<(), ProgramError> {
        self.program.set_uniforms(&mut self.block, uniforms)
    }

    /// Draw once with `uniforms` layered over the shared ones.
    pub fn draw<'a>(
        &self,
        backend: &mut dyn Backend,
        target: RenderTarget,
        uniforms: impl IntoIterator<Item = (&'a str, &'a UniformValue)>,
    ) -> Result<(), ProgramError> {
        let mut block = self.block.clone();
        self.program.set_uniforms(&mut block, uniforms)?;
        backend.draw(&DrawCall {
            target,
            program: self.program.id(),
            vertices: &self.bindings,
            indices: self.indices.as_ref().map(Buffer::id),
            primitive: self.primitive,
            count: self.count,
            first: 0,
            uniforms: block.as_bytes(),
            textures: block.textures(),
            blend: self.blend,
            depth: self.depth,
        })?;
        Ok(())
    }

    /// Delete the buffers. The program belongs to whoever created it.
    pub fn delete(self, backend: &mut dyn Backend) {
        for buffer in self.buffers.values() {
            buffer.delete(backend);
        }
        if let Some(indices) = &self.indices {
            indices.delete(backend);
        }
    }
}

/// Restores the buffers only; programs are recovered through their cache.
impl GpuResource for Model {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        for buffer in self.buffers.values() {
            buffer.recover_from_lost_context(backend)?;
        }
        if let Some(indices) = &self.indices {
            indices.recover_from_lost_context(backend)?;
        }
        Ok(())
    }
}
