use std::cell::RefCell;

use bytemuck::Pod;

use super::{Backend, BufferId, BufferKind, GpuResource, VertexBinding, VertexFormat};
use crate::error::GpuError;
use crate::geometry::AttribBuffer;

/// A vertex or index buffer that keeps a CPU copy of its contents so it can
/// be re-uploaded after the context is lost.
#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    kind: BufferKind,
    /// Layout of one element when the buffer holds a single float attribute.
    format: Option<VertexFormat>,
    num_components: usize,
    num_elements: usize,
    data: RefCell<Vec<u8>>,
}

impl Buffer {
    /// Upload raw bytes.
    pub fn from_bytes(backend: &mut dyn Backend, kind: BufferKind, data: &[u8]) -> Result<Self, GpuError> {
        let id = backend.create_buffer(kind, data)?;
        Ok(Self {
            id,
            kind,
            format: None,
            num_components: 1,
            num_elements: data.len(),
            data: RefCell::new(data.to_vec()),
        })
    }

    /// Upload a float attribute as a vertex buffer.
    pub fn vertex(backend: &mut dyn Backend, source: &AttribBuffer<f32>) -> Result<Self, GpuError> {
        let format = VertexFormat::float(source.num_components()).ok_or_else(|| {
            GpuError::Unsupported(format!("{} components per vertex", source.num_components()))
        })?;
        Self::from_attrib(backend, BufferKind::Vertex, source, Some(format))
    }

    /// Upload RGBA bytes as a normalised vertex colour buffer.
    pub fn colors(backend: &mut dyn Backend, source: &AttribBuffer<u8>) -> Result<Self, GpuError> {
        if source.num_components() != 4 {
            return Err(GpuError::Unsupported(format!("{} colour channels", source.num_components())));
        }
        Self::from_attrib(backend, BufferKind::Vertex, source, Some(VertexFormat::Unorm8x4))
    }

    /// Upload triangle indices.
    pub fn index(backend: &mut dyn Backend, source: &AttribBuffer<u16>) -> Result<Self, GpuError> {
        Self::from_attrib(backend, BufferKind::Index, source, None)
    }

    fn from_attrib<T: Pod + Default>(
        backend: &mut dyn Backend,
        kind: BufferKind,
        source: &AttribBuffer<T>,
        format: Option<VertexFormat>,
    ) -> Result<Self, GpuError> {
        let bytes = source.as_bytes();
        let id = backend.create_buffer(kind, bytes)?;
        Ok(Self {
            id,
            kind,
            format,
            num_components: source.num_components(),
            num_elements: source.num_elements(),
            data: RefCell::new(bytes.to_vec()),
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn byte_len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Replace the whole contents. The size must not change.
    ///
    /// The retained copy is updated even when the upload fails because the
    /// context is lost, so recovery uploads the newest data.
    pub fn set(&self, backend: &mut dyn Backend, data: &[u8]) -> Result<(), GpuError> {
        let len = self.byte_len();
        if data.len() != len {
            return Err(GpuError::SizeMismatch { what: "buffer contents", expected: len, got: data.len() });
        }
        self.data.borrow_mut().copy_from_slice(data);
        backend.write_buffer(self.id, 0, data)
    }

    /// Overwrite bytes starting at `offset`.
    pub fn set_range(&self, backend: &mut dyn Backend, offset: usize, data: &[u8]) -> Result<(), GpuError> {
        let len = self.byte_len();
        if offset + data.len() > len {
            return Err(GpuError::SizeMismatch { what: "buffer range", expected: len, got: offset + data.len() });
        }
        self.data.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
        backend.write_buffer(self.id, offset as u64, data)
    }

    /// Feed attribute `location` from this buffer, tightly packed.
    pub fn binding(&self, location: u32) -> Result<VertexBinding, GpuError> {
        let format = self
            .format
            .ok_or_else(|| GpuError::Unsupported(format!("{} has no single attribute layout", self.id)))?;
        Ok(VertexBinding { buffer: self.id, location, format, stride: format.size(), offset: 0 })
    }

    pub fn delete(&self, backend: &mut dyn Backend) {
        backend.delete_buffer(self.id);
    }
}

impl GpuResource for Buffer {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        backend.restore_buffer(self.id, self.kind, &self.data.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    #[test]
    fn vertex_buffer_binding_matches_components() {
        let mut backend = HeadlessBackend::default();
        let source = AttribBuffer::from_vec(3, vec![0.0_f32; 9]);
        let buffer = Buffer::vertex(&mut backend, &source).unwrap();
        let binding = buffer.binding(2).unwrap();
        assert_eq!(binding.format, VertexFormat::Float32x3);
        assert_eq!(binding.stride, 12);
        assert_eq!(buffer.num_elements(), 3);

        let indices = Buffer::index(&mut backend, &AttribBuffer::from_vec(3, vec![0u16, 1, 2])).unwrap();
        assert!(indices.binding(0).is_err());
    }

    #[test]
    fn writes_made_while_lost_survive_recovery() {
        let mut backend = HeadlessBackend::default();
        let buffer = Buffer::from_bytes(&mut backend, BufferKind::Vertex, &[0; 8]).unwrap();
        buffer.set_range(&mut backend, 0, &[1, 1]).unwrap();

        backend.lose_context();
        assert!(matches!(buffer.set_range(&mut backend, 6, &[9, 9]), Err(GpuError::ContextLost)));
        backend.restore_context().unwrap();
        buffer.recover_from_lost_context(&mut backend).unwrap();
        assert_eq!(backend.buffer_data(buffer.id()).unwrap(), &[1, 1, 0, 0, 0, 0, 9, 9]);
    }

    #[test]
    fn set_rejects_resizing() {
        let mut backend = HeadlessBackend::default();
        let buffer = Buffer::from_bytes(&mut backend, BufferKind::Vertex, &[0; 8]).unwrap();
        assert!(buffer.set(&mut backend, &[0; 4]).is_err());
        assert!(buffer.set_range(&mut backend, 6, &[0; 4]).is_err());
        buffer.set(&mut backend, &[3; 8]).unwrap();
        assert_eq!(backend.buffer_data(buffer.id()).unwrap(), &[3; 8]);
    }
}
