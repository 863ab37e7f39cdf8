//! A backend that keeps everything in memory and never talks to a GPU.
//!
//! It validates handles and sizes exactly like a real device would, keeps
//! buffer and texture contents so callers can inspect them, counts shader
//! compilations, and records every draw. [`HeadlessBackend::lose_context`]
//! simulates a device loss.

use std::collections::HashMap;

use super::{
    Backend, BackendConfig, BlendMode, BufferId, BufferKind, CubeFace, DrawCall, FramebufferDesc,
    FramebufferId, Primitive, ProgramId, RenderTarget, SamplerParams, ShaderId, TextureBinding,
    TextureDesc, TextureId, TextureKind,
};
use crate::error::{GpuError, ProgramError};
use crate::shader::{ProgramLayout, ShaderStage};

struct BufferEntry {
    kind: BufferKind,
    data: Vec<u8>,
}

struct TextureEntry {
    desc: TextureDesc,
    /// One entry per layer: one for 2D and depth, six for cube maps.
    faces: Vec<Vec<u8>>,
    sampler: SamplerParams,
}

struct ProgramEntry {
    vertex: ShaderId,
    fragment: ShaderId,
    layout: ProgramLayout,
}

/// One recorded draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub target: RenderTarget,
    pub program: ProgramId,
    pub primitive: Primitive,
    pub count: u32,
    pub first: u32,
    pub indexed: bool,
    pub uniforms: Vec<u8>,
    pub textures: Vec<TextureBinding>,
    pub blend: BlendMode,
}

pub struct HeadlessBackend {
    config: BackendConfig,
    lost: bool,
    next_id: u32,
    buffers: HashMap<BufferId, BufferEntry>,
    textures: HashMap<TextureId, TextureEntry>,
    framebuffers: HashMap<FramebufferId, FramebufferDesc>,
    shaders: HashMap<ShaderId, (ShaderStage, String)>,
    programs: HashMap<ProgramId, ProgramEntry>,
    compile_count: usize,
    clear_count: usize,
    draws: Vec<DrawRecord>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

impl HeadlessBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            lost: false,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            compile_count: 0,
            clear_count: 0,
            draws: Vec::new(),
        }
    }

    /// Drop every object and refuse all work until
    /// [`restore_context`](Backend::restore_context).
    pub fn lose_context(&mut self) {
        log::warn!("headless: context lost");
        self.lost = true;
        self.buffers.clear();
        self.textures.clear();
        self.framebuffers.clear();
        self.shaders.clear();
        self.programs.clear();
    }

    /// Total shader compilations, including restores.
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    pub fn clear_count(&self) -> usize {
        self.clear_count
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|b| b.data.as_slice())
    }

    pub fn texture_data(&self, id: TextureId, face: Option<CubeFace>) -> Option<&[u8]> {
        let entry = self.textures.get(&id)?;
        let layer = face.map_or(0, CubeFace::layer) as usize;
        entry.faces.get(layer).map(Vec::as_slice)
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<TextureDesc> {
        self.textures.get(&id).map(|t| t.desc)
    }

    pub fn sampler(&self, id: TextureId) -> Option<SamplerParams> {
        self.textures.get(&id).map(|t| t.sampler)
    }

    pub fn program_layout(&self, id: ProgramId) -> Option<&ProgramLayout> {
        self.programs.get(&id).map(|p| &p.layout)
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn num_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn num_programs(&self) -> usize {
        self.programs.len()
    }

    fn ensure_live(&self) -> Result<(), GpuError> {
        if self.lost {
            return Err(GpuError::ContextLost);
        }
        Ok(())
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture_entry(desc: &TextureDesc) -> TextureEntry {
        let layers = if desc.kind == TextureKind::Cube { 6 } else { 1 };
        TextureEntry {
            desc: *desc,
            faces: vec![vec![0; desc.face_size()]; layers],
            sampler: SamplerParams::default(),
        }
    }

    fn check_shader(&self, id: ShaderId, stage: ShaderStage) -> Result<(), ProgramError> {
        match self.shaders.get(&id) {
            Some((s, _)) if *s == stage => Ok(()),
            Some((s, _)) => Err(ProgramError::Link(format!("{id} is a {s} shader, expected {stage}"))),
            None => Err(GpuError::UnknownHandle { kind: "shader", id: id.0 }.into()),
        }
    }

    fn check_target(&self, target: RenderTarget) -> Result<(), GpuError> {
        match target {
            RenderTarget::Default => Ok(()),
            RenderTarget::Framebuffer(id) if self.framebuffers.contains_key(&id) => Ok(()),
            RenderTarget::Framebuffer(id) => Err(GpuError::UnknownHandle { kind: "framebuffer", id: id.0 }),
        }
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn restore_context(&mut self) -> Result<(), GpuError> {
        log::info!("headless: context restored");
        self.lost = false;
        Ok(())
    }

    fn default_target_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId, GpuError> {
        self.ensure_live()?;
        let id = BufferId(self.allocate());
        self.buffers.insert(id, BufferEntry { kind, data: data.to_vec() });
        Ok(id)
    }

    fn restore_buffer(&mut self, id: BufferId, kind: BufferKind, data: &[u8]) -> Result<(), GpuError> {
        self.ensure_live()?;
        self.buffers.insert(id, BufferEntry { kind, data: data.to_vec() });
        Ok(())
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        self.ensure_live()?;
        let entry = self
            .buffers
            .get_mut(&id)
            .ok_or(GpuError::UnknownHandle { kind: "buffer", id: id.0 })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > entry.data.len() {
            return Err(GpuError::SizeMismatch { what: "buffer write", expected: entry.data.len(), got: end });
        }
        entry.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn delete_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        self.ensure_live()?;
        let id = TextureId(self.allocate());
        self.textures.insert(id, Self::texture_entry(desc));
        Ok(id)
    }

    fn restore_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<(), GpuError> {
        self.ensure_live()?;
        self.textures.insert(id, Self::texture_entry(desc));
        Ok(())
    }

    fn write_texture(&mut self, id: TextureId, face: Option<CubeFace>, data: &[u8]) -> Result<(), GpuError> {
        self.ensure_live()?;
        let entry = self
            .textures
            .get_mut(&id)
            .ok_or(GpuError::UnknownHandle { kind: "texture", id: id.0 })?;
        let expected = entry.desc.face_size();
        if data.len() != expected {
            return Err(GpuError::SizeMismatch { what: "texture upload", expected, got: data.len() });
        }
        let layer = match (entry.desc.kind, face) {
            (TextureKind::Cube, Some(face)) => face.layer() as usize,
            (TextureKind::Cube, None) => {
                return Err(GpuError::Unsupported("cube map upload needs a face".into()));
            }
            (_, Some(_)) => return Err(GpuError::Unsupported("face given for a 2D texture".into())),
            (_, None) => 0,
        };
        entry.faces[layer].copy_from_slice(data);
        Ok(())
    }

    fn set_sampler(&mut self, id: TextureId, params: &SamplerParams) -> Result<(), GpuError> {
        self.ensure_live()?;
        let entry = self
            .textures
            .get_mut(&id)
            .ok_or(GpuError::UnknownHandle { kind: "texture", id: id.0 })?;
        entry.sampler = *params;
        Ok(())
    }

    fn delete_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId, GpuError> {
        self.ensure_live()?;
        let id = FramebufferId(self.allocate());
        self.restore_framebuffer(id, desc)?;
        Ok(id)
    }

    fn restore_framebuffer(&mut self, id: FramebufferId, desc: &FramebufferDesc) -> Result<(), GpuError> {
        self.ensure_live()?;
        for texture in std::iter::once(desc.color).chain(desc.depth) {
            if !self.textures.contains_key(&texture) {
                return Err(GpuError::UnknownHandle { kind: "texture", id: texture.0 });
            }
        }
        self.framebuffers.insert(id, *desc);
        Ok(())
    }

    fn delete_framebuffer(&mut self, id: FramebufferId) {
        self.framebuffers.remove(&id);
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, ProgramError> {
        self.ensure_live()?;
        let id = ShaderId(self.allocate());
        self.restore_shader(id, stage, source)?;
        Ok(id)
    }

    fn restore_shader(&mut self, id: ShaderId, stage: ShaderStage, source: &str) -> Result<(), ProgramError> {
        self.ensure_live()?;
        self.compile_count += 1;
        log::debug!("headless: compiled {stage} shader {id}");
        self.shaders.insert(id, (stage, source.to_string()));
        Ok(())
    }

    fn delete_shader(&mut self, id: ShaderId) {
        self.shaders.remove(&id);
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, ProgramError> {
        self.ensure_live()?;
        let id = ProgramId(self.allocate());
        self.restore_program(id, vertex, fragment, layout)?;
        Ok(id)
    }

    fn restore_program(
        &mut self,
        id: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<(), ProgramError> {
        self.ensure_live()?;
        self.check_shader(vertex, ShaderStage::Vertex)?;
        self.check_shader(fragment, ShaderStage::Fragment)?;
        self.programs.insert(id, ProgramEntry { vertex, fragment, layout: layout.clone() });
        Ok(())
    }

    fn delete_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn clear(&mut self, target: RenderTarget, _color: Option<[f32; 4]>, _depth: Option<f32>) -> Result<(), GpuError> {
        self.ensure_live()?;
        self.check_target(target)?;
        self.clear_count += 1;
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), GpuError> {
        self.ensure_live()?;
        self.check_target(call.target)?;
        let program = self
            .programs
            .get(&call.program)
            .ok_or(GpuError::UnknownHandle { kind: "program", id: call.program.0 })?;
        if !self.shaders.contains_key(&program.vertex) || !self.shaders.contains_key(&program.fragment) {
            return Err(GpuError::UnknownHandle { kind: "program", id: call.program.0 });
        }

        let uniform_size = program.layout.uniform_size() as usize;
        if call.uniforms.len() != uniform_size {
            return Err(GpuError::SizeMismatch { what: "uniform block", expected: uniform_size, got: call.uniforms.len() });
        }
        for attribute in &program.layout.attributes {
            if !call.vertices.iter().any(|v| v.location == attribute.location) {
                return Err(GpuError::Unsupported(format!(
                    "attribute '{}' (location {}) has no buffer",
                    attribute.name, attribute.location
                )));
            }
        }
        for binding in call.vertices {
            let buffer = self
                .buffers
                .get(&binding.buffer)
                .ok_or(GpuError::UnknownHandle { kind: "buffer", id: binding.buffer.0 })?;
            if buffer.kind != BufferKind::Vertex {
                return Err(GpuError::Unsupported(format!("{} is not a vertex buffer", binding.buffer)));
            }
        }
        if let Some(indices) = call.indices {
            let buffer = self
                .buffers
                .get(&indices)
                .ok_or(GpuError::UnknownHandle { kind: "buffer", id: indices.0 })?;
            let needed = (call.first as usize + call.count as usize) * 2;
            if buffer.kind != BufferKind::Index || needed > buffer.data.len() {
                return Err(GpuError::SizeMismatch { what: "index buffer", expected: needed, got: buffer.data.len() });
            }
        }
        for slot in &program.layout.textures {
            let bound = call.textures.iter().find(|t| t.binding == slot.binding).ok_or_else(|| {
                GpuError::Unsupported(format!("texture '{}' (binding {}) is not bound", slot.name, slot.binding))
            })?;
            let texture = self
                .textures
                .get(&bound.texture)
                .ok_or(GpuError::UnknownHandle { kind: "texture", id: bound.texture.0 })?;
            if texture.desc.kind != slot.kind {
                return Err(GpuError::Unsupported(format!(
                    "texture '{}' expects {:?}, got {:?}",
                    slot.name, slot.kind, texture.desc.kind
                )));
            }
        }

        self.draws.push(DrawRecord {
            target: call.target,
            program: call.program,
            primitive: call.primitive,
            count: call.count,
            first: call.first,
            indexed: call.indices.is_some(),
            uniforms: call.uniforms.to_vec(),
            textures: call.textures.to_vec(),
            blend: call.blend,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureFormat;

    fn desc(kind: TextureKind) -> TextureDesc {
        TextureDesc { kind, width: 2, height: 2, format: TextureFormat::Rgba8 }
    }

    #[test]
    fn buffer_writes_are_bounds_checked() {
        let mut b = HeadlessBackend::default();
        let id = b.create_buffer(BufferKind::Vertex, &[0; 8]).unwrap();
        b.write_buffer(id, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(b.buffer_data(id).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(b.write_buffer(id, 6, &[0; 4]), Err(GpuError::SizeMismatch { .. })));
        assert!(matches!(
            b.write_buffer(BufferId(99), 0, &[0]),
            Err(GpuError::UnknownHandle { kind: "buffer", id: 99 })
        ));
    }

    #[test]
    fn lost_context_rejects_work_and_keeps_ids_restorable() {
        let mut b = HeadlessBackend::default();
        let id = b.create_buffer(BufferKind::Index, &[1, 0]).unwrap();
        b.lose_context();
        assert!(b.is_context_lost());
        assert!(matches!(b.create_buffer(BufferKind::Vertex, &[]), Err(GpuError::ContextLost)));
        assert!(matches!(b.write_buffer(id, 0, &[0]), Err(GpuError::ContextLost)));
        assert_eq!(b.buffer_data(id), None);

        b.restore_context().unwrap();
        b.restore_buffer(id, BufferKind::Index, &[1, 0]).unwrap();
        assert_eq!(b.buffer_data(id).unwrap(), &[1, 0]);
        let fresh = b.create_buffer(BufferKind::Vertex, &[]).unwrap();
        assert_ne!(fresh, id);
    }

    #[test]
    fn cube_uploads_need_a_face() {
        let mut b = HeadlessBackend::default();
        let cube = b.create_texture(&desc(TextureKind::Cube)).unwrap();
        assert!(b.write_texture(cube, None, &[0; 16]).is_err());
        b.write_texture(cube, Some(CubeFace::NegativeY), &[7; 16]).unwrap();
        assert_eq!(b.texture_data(cube, Some(CubeFace::NegativeY)).unwrap(), &[7; 16]);
        assert_eq!(b.texture_data(cube, Some(CubeFace::PositiveX)).unwrap(), &[0; 16]);

        let flat = b.create_texture(&desc(TextureKind::D2)).unwrap();
        assert!(matches!(b.write_texture(flat, None, &[0; 15]), Err(GpuError::SizeMismatch { .. })));
    }

    #[test]
    fn framebuffer_requires_live_attachments() {
        let mut b = HeadlessBackend::default();
        let color = b.create_texture(&desc(TextureKind::D2)).unwrap();
        let fb = FramebufferDesc { color, face: None, depth: Some(TextureId(42)), width: 2, height: 2 };
        assert!(b.create_framebuffer(&fb).is_err());
        let fb = FramebufferDesc { depth: None, ..fb };
        let id = b.create_framebuffer(&fb).unwrap();
        b.clear(RenderTarget::Framebuffer(id), Some([0.0; 4]), None).unwrap();
        assert_eq!(b.clear_count(), 1);
    }
}
