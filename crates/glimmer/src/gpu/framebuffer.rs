use super::{
    Backend, CubeFace, CubeMap, DepthTexture, FramebufferDesc, FramebufferId, GpuResource, RenderTarget, Texture,
    Texture2D,
};
use crate::error::GpuError;

/// An offscreen colour target with an optional depth attachment. The
/// attachments are created and torn down with the framebuffer.
#[derive(Debug)]
pub struct Framebuffer {
    id: FramebufferId,
    color: Texture2D,
    depth: Option<DepthTexture>,
}

impl Framebuffer {
    pub fn new(backend: &mut dyn Backend, width: u32, height: u32, with_depth: bool) -> Result<Self, GpuError> {
        let color = Texture2D::empty(backend, width, height)?;
        let depth = if with_depth { Some(DepthTexture::new(backend, width, height)?) } else { None };
        let id = backend.create_framebuffer(&Self::desc(&color, depth.as_ref()))?;
        log::debug!("created {width}x{height} framebuffer {id}");
        Ok(Self { id, color, depth })
    }

    fn desc(color: &Texture2D, depth: Option<&DepthTexture>) -> FramebufferDesc {
        let (width, height) = color.size();
        FramebufferDesc { color: color.id(), face: None, depth: depth.map(Texture::id), width, height }
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }

    pub fn target(&self) -> RenderTarget {
        RenderTarget::Framebuffer(self.id)
    }

    /// The texture rendered into, for sampling in later passes.
    pub fn color_texture(&self) -> &Texture2D {
        &self.color
    }

    pub fn depth_texture(&self) -> Option<&DepthTexture> {
        self.depth.as_ref()
    }

    pub fn size(&self) -> (u32, u32) {
        self.color.size()
    }

    pub fn delete(&self, backend: &mut dyn Backend) {
        backend.delete_framebuffer(self.id);
        self.color.delete(backend);
        if let Some(depth) = &self.depth {
            depth.delete(backend);
        }
    }
}

impl GpuResource for Framebuffer {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        self.color.recover_from_lost_context(backend)?;
        if let Some(depth) = &self.depth {
            depth.recover_from_lost_context(backend)?;
        }
        backend.restore_framebuffer(self.id, &Self::desc(&self.color, self.depth.as_ref()))
    }
}

/// Six framebuffers rendering into the faces of one cube map, sharing a
/// depth attachment.
#[derive(Debug)]
pub struct CubeFramebuffer {
    faces: [FramebufferId; 6],
    color: CubeMap,
    depth: Option<DepthTexture>,
}

impl CubeFramebuffer {
    pub fn new(backend: &mut dyn Backend, size: u32, with_depth: bool) -> Result<Self, GpuError> {
        let color = CubeMap::empty(backend, size)?;
        let depth = if with_depth { Some(DepthTexture::new(backend, size, size)?) } else { None };
        let mut faces = [FramebufferId(0); 6];
        for (slot, face) in faces.iter_mut().zip(CubeFace::ALL) {
            *slot = backend.create_framebuffer(&Self::desc(&color, depth.as_ref(), face))?;
        }
        Ok(Self { faces, color, depth })
    }

    fn desc(color: &CubeMap, depth: Option<&DepthTexture>, face: CubeFace) -> FramebufferDesc {
        let (size, _) = color.size();
        FramebufferDesc { color: color.id(), face: Some(face), depth: depth.map(Texture::id), width: size, height: size }
    }

    pub fn target(&self, face: CubeFace) -> RenderTarget {
        RenderTarget::Framebuffer(self.faces[face.layer() as usize])
    }

    pub fn color_texture(&self) -> &CubeMap {
        &self.color
    }

    pub fn delete(&self, backend: &mut dyn Backend) {
        for id in self.faces {
            backend.delete_framebuffer(id);
        }
        self.color.delete(backend);
        if let Some(depth) = &self.depth {
            depth.delete(backend);
        }
    }
}

impl GpuResource for CubeFramebuffer {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        self.color.recover_from_lost_context(backend)?;
        if let Some(depth) = &self.depth {
            depth.recover_from_lost_context(backend)?;
        }
        for (id, face) in self.faces.iter().zip(CubeFace::ALL) {
            backend.restore_framebuffer(*id, &Self::desc(&self.color, self.depth.as_ref(), face))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    #[test]
    fn framebuffer_owns_its_attachments() {
        let mut backend = HeadlessBackend::default();
        let fb = Framebuffer::new(&mut backend, 16, 8, true).unwrap();
        assert_eq!(backend.num_textures(), 2);
        assert_eq!(fb.size(), (16, 8));
        backend.clear(fb.target(), Some([0.0; 4]), Some(1.0)).unwrap();

        fb.delete(&mut backend);
        assert_eq!(backend.num_textures(), 0);
        assert!(backend.clear(fb.target(), Some([0.0; 4]), None).is_err());
    }

    #[test]
    fn framebuffer_recovers_after_loss() {
        let mut backend = HeadlessBackend::default();
        let fb = Framebuffer::new(&mut backend, 4, 4, false).unwrap();
        backend.lose_context();
        backend.restore_context().unwrap();
        assert!(backend.clear(fb.target(), Some([0.0; 4]), None).is_err());
        fb.recover_from_lost_context(&mut backend).unwrap();
        backend.clear(fb.target(), Some([0.0; 4]), None).unwrap();
    }

    #[test]
    fn cube_framebuffer_has_a_target_per_face() {
        let mut backend = HeadlessBackend::default();
        let fb = CubeFramebuffer::new(&mut backend, 8, true).unwrap();
        let targets: Vec<_> = CubeFace::ALL.iter().map(|f| fb.target(*f)).collect();
        for (i, t) in targets.iter().enumerate() {
            assert!(!targets[..i].contains(t));
            backend.clear(*t, Some([1.0; 4]), Some(1.0)).unwrap();
        }
        backend.lose_context();
        backend.restore_context().unwrap();
        fb.recover_from_lost_context(&mut backend).unwrap();
        backend.clear(fb.target(CubeFace::PositiveY), None, Some(1.0)).unwrap();
    }
}
