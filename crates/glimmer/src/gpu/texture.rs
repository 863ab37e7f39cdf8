//! Texture wrappers.
//!
//! Every wrapper remembers where its texels came from ([`TextureSource`]) and
//! its sampler state, which is all it needs to rebuild itself after context
//! loss. File-backed textures are decoded again from disk on recovery instead
//! of keeping the pixels in memory.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{
    Backend, CubeFace, Filter, GpuResource, SamplerParams, TextureDesc, TextureFormat, TextureId, TextureKind,
    Wrap,
};
use crate::error::GpuError;

/// Where a texture's level 0 comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    /// Uninitialised storage, e.g. a render target.
    Empty { width: u32, height: u32 },
    /// RGBA8 texels, row by row.
    Pixels { width: u32, height: u32, data: Vec<u8> },
    /// An image file, decoded to RGBA8.
    File(PathBuf),
}

impl TextureSource {
    /// Size and texels (`None` for empty storage).
    fn decode(&self) -> Result<(u32, u32, Option<Vec<u8>>), GpuError> {
        match self {
            TextureSource::Empty { width, height } => Ok((*width, *height, None)),
            TextureSource::Pixels { width, height, data } => {
                let expected = *width as usize * *height as usize * 4;
                if data.len() != expected {
                    return Err(GpuError::SizeMismatch { what: "RGBA pixels", expected, got: data.len() });
                }
                Ok((*width, *height, Some(data.clone())))
            }
            TextureSource::File(path) => {
                let image = image::open(path)?.to_rgba8();
                let (width, height) = image.dimensions();
                log::debug!("decoded {} ({width}x{height})", path.display());
                Ok((width, height, Some(image.into_raw())))
            }
        }
    }
}

/// Operations shared by every texture kind.
pub trait Texture: GpuResource {
    fn id(&self) -> TextureId;
    fn kind(&self) -> TextureKind;
    fn size(&self) -> (u32, u32);
}

/// Default sampling: power-of-two textures repeat, others clamp.
fn default_params(width: u32, height: u32) -> SamplerParams {
    let wrap = if width.is_power_of_two() && height.is_power_of_two() { Wrap::Repeat } else { Wrap::ClampToEdge };
    SamplerParams { min_filter: Filter::Linear, mag_filter: Filter::Linear, wrap_s: wrap, wrap_t: wrap }
}

/// Issue creation (or restoration when `id` is given), uploads and sampler
/// state in one go.
fn build(
    backend: &mut dyn Backend,
    id: Option<TextureId>,
    desc: &TextureDesc,
    uploads: &[(Option<CubeFace>, &[u8])],
    params: &SamplerParams,
) -> Result<TextureId, GpuError> {
    let id = match id {
        Some(id) => {
            backend.restore_texture(id, desc)?;
            id
        }
        None => backend.create_texture(desc)?,
    };
    for (face, data) in uploads {
        backend.write_texture(id, *face, data)?;
    }
    if desc.kind != TextureKind::Depth {
        backend.set_sampler(id, params)?;
    }
    Ok(id)
}

// ── Texture2D ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Texture2D {
    id: TextureId,
    source: TextureSource,
    width: u32,
    height: u32,
    params: Cell<SamplerParams>,
}

impl Texture2D {
    pub fn new(backend: &mut dyn Backend, source: TextureSource) -> Result<Self, GpuError> {
        let (width, height, data) = source.decode()?;
        let params = default_params(width, height);
        let desc = Self::desc(width, height);
        let uploads: Vec<_> = data.as_deref().map(|d| (None, d)).into_iter().collect();
        let id = build(backend, None, &desc, &uploads, &params)?;
        Ok(Self { id, source, width, height, params: Cell::new(params) })
    }

    pub fn from_pixels(backend: &mut dyn Backend, width: u32, height: u32, data: Vec<u8>) -> Result<Self, GpuError> {
        Self::new(backend, TextureSource::Pixels { width, height, data })
    }

    /// RGBA floats in `[0, 1]`, stored as 8-bit texels.
    pub fn from_floats(backend: &mut dyn Backend, width: u32, height: u32, pixels: &[f32]) -> Result<Self, GpuError> {
        let data = pixels.iter().map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8).collect();
        Self::from_pixels(backend, width, height, data)
    }

    pub fn from_file(backend: &mut dyn Backend, path: impl AsRef<Path>) -> Result<Self, GpuError> {
        Self::new(backend, TextureSource::File(path.as_ref().to_path_buf()))
    }

    /// Decode an encoded image (PNG, JPEG) held in memory.
    pub fn from_encoded(backend: &mut dyn Backend, bytes: &[u8]) -> Result<Self, GpuError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        Self::from_pixels(backend, width, height, image.into_raw())
    }

    /// Uninitialised storage for rendering into.
    pub fn empty(backend: &mut dyn Backend, width: u32, height: u32) -> Result<Self, GpuError> {
        Self::new(backend, TextureSource::Empty { width, height })
    }

    fn desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc { kind: TextureKind::D2, width, height, format: TextureFormat::Rgba8 }
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    pub fn params(&self) -> SamplerParams {
        self.params.get()
    }

    pub fn set_parameters(&self, backend: &mut dyn Backend, params: SamplerParams) -> Result<(), GpuError> {
        self.params.set(params);
        backend.set_sampler(self.id, &params)
    }

    pub fn delete(&self, backend: &mut dyn Backend) {
        backend.delete_texture(self.id);
    }
}

impl GpuResource for Texture2D {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        let (width, height, data) = self.source.decode()?;
        if (width, height) != (self.width, self.height) {
            return Err(GpuError::SizeMismatch {
                what: "texture source on recovery",
                expected: (self.width * self.height) as usize,
                got: (width * height) as usize,
            });
        }
        let uploads: Vec<_> = data.as_deref().map(|d| (None, d)).into_iter().collect();
        build(backend, Some(self.id), &Self::desc(width, height), &uploads, &self.params.get())?;
        Ok(())
    }
}

impl Texture for Texture2D {
    fn id(&self) -> TextureId {
        self.id
    }

    fn kind(&self) -> TextureKind {
        TextureKind::D2
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

// ── CubeMap ─────────────────────────────────────────────────────────────────

/// Six square faces in [`CubeFace::ALL`] order.
#[derive(Debug)]
pub struct CubeMap {
    id: TextureId,
    faces: [TextureSource; 6],
    size: u32,
    params: Cell<SamplerParams>,
}

impl CubeMap {
    pub fn new(backend: &mut dyn Backend, faces: [TextureSource; 6]) -> Result<Self, GpuError> {
        let (size, data) = Self::decode_faces(&faces)?;
        let params = SamplerParams::default();
        let uploads = Self::uploads(&data);
        let id = build(backend, None, &Self::desc(size), &uploads, &params)?;
        Ok(Self { id, faces, size, params: Cell::new(params) })
    }

    pub fn from_files(backend: &mut dyn Backend, paths: [PathBuf; 6]) -> Result<Self, GpuError> {
        Self::new(backend, paths.map(TextureSource::File))
    }

    /// Uninitialised faces of `size`², for rendering into.
    pub fn empty(backend: &mut dyn Backend, size: u32) -> Result<Self, GpuError> {
        Self::new(backend, std::array::from_fn(|_| TextureSource::Empty { width: size, height: size }))
    }

    fn desc(size: u32) -> TextureDesc {
        TextureDesc { kind: TextureKind::Cube, width: size, height: size, format: TextureFormat::Rgba8 }
    }

    fn decode_faces(faces: &[TextureSource; 6]) -> Result<(u32, Vec<Option<Vec<u8>>>), GpuError> {
        let mut size = None;
        let mut data = Vec::with_capacity(6);
        for face in faces {
            let (width, height, texels) = face.decode()?;
            if width != height {
                return Err(GpuError::Unsupported(format!("cube face is {width}x{height}, must be square")));
            }
            match size {
                None => size = Some(width),
                Some(s) if s != width => {
                    return Err(GpuError::Unsupported(format!("cube faces differ in size ({s} vs {width})")));
                }
                Some(_) => {}
            }
            data.push(texels);
        }
        Ok((size.unwrap_or(0), data))
    }

    fn uploads(data: &[Option<Vec<u8>>]) -> Vec<(Option<CubeFace>, &[u8])> {
        CubeFace::ALL
            .iter()
            .zip(data)
            .filter_map(|(face, texels)| texels.as_deref().map(|t| (Some(*face), t)))
            .collect()
    }

    pub fn params(&self) -> SamplerParams {
        self.params.get()
    }

    pub fn set_parameters(&self, backend: &mut dyn Backend, params: SamplerParams) -> Result<(), GpuError> {
        self.params.set(params);
        backend.set_sampler(self.id, &params)
    }

    pub fn delete(&self, backend: &mut dyn Backend) {
        backend.delete_texture(self.id);
    }
}

impl GpuResource for CubeMap {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        let (size, data) = Self::decode_faces(&self.faces)?;
        let uploads = Self::uploads(&data);
        build(backend, Some(self.id), &Self::desc(size), &uploads, &self.params.get())?;
        Ok(())
    }
}

impl Texture for CubeMap {
    fn id(&self) -> TextureId {
        self.id
    }

    fn kind(&self) -> TextureKind {
        TextureKind::Cube
    }

    fn size(&self) -> (u32, u32) {
        (self.size, self.size)
    }
}

// ── SolidTexture ────────────────────────────────────────────────────────────

/// A 1x1 texture of one colour.
#[derive(Debug)]
pub struct SolidTexture {
    inner: Texture2D,
    color: [f32; 4],
}

impl SolidTexture {
    pub fn new(backend: &mut dyn Backend, color: [f32; 4]) -> Result<Self, GpuError> {
        let inner = Texture2D::from_floats(backend, 1, 1, &color)?;
        Ok(Self { inner, color })
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }
}

impl GpuResource for SolidTexture {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        self.inner.recover_from_lost_context(backend)
    }
}

impl Texture for SolidTexture {
    fn id(&self) -> TextureId {
        self.inner.id
    }

    fn kind(&self) -> TextureKind {
        TextureKind::D2
    }

    fn size(&self) -> (u32, u32) {
        (1, 1)
    }
}

// ── DepthTexture ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DepthTexture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl DepthTexture {
    pub fn new(backend: &mut dyn Backend, width: u32, height: u32) -> Result<Self, GpuError> {
        let id = build(backend, None, &Self::desc(width, height), &[], &SamplerParams::default())?;
        Ok(Self { id, width, height })
    }

    fn desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc { kind: TextureKind::Depth, width, height, format: TextureFormat::Depth32 }
    }

    pub fn delete(&self, backend: &mut dyn Backend) {
        backend.delete_texture(self.id);
    }
}

impl GpuResource for DepthTexture {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        build(backend, Some(self.id), &Self::desc(self.width, self.height), &[], &SamplerParams::default())?;
        Ok(())
    }
}

impl Texture for DepthTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn kind(&self) -> TextureKind {
        TextureKind::Depth
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

// ── TextureCache ────────────────────────────────────────────────────────────

/// File-backed textures shared by path.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: HashMap<PathBuf, Rc<Texture2D>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, backend: &mut dyn Backend, path: impl AsRef<Path>) -> Result<Rc<Texture2D>, GpuError> {
        let path = path.as_ref();
        if let Some(texture) = self.textures.get(path) {
            log::debug!("texture cache hit: {}", path.display());
            return Ok(Rc::clone(texture));
        }
        let texture = Rc::new(Texture2D::from_file(backend, path)?);
        self.textures.insert(path.to_path_buf(), Rc::clone(&texture));
        Ok(texture)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn clear(&mut self) {
        self.textures.clear();
    }

    pub fn recover(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        for texture in self.textures.values() {
            texture.recover_from_lost_context(backend)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let image = image::RgbaImage::from_fn(width, height, |x, y| image::Rgba([x as u8, y as u8, 7, 255]));
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn floats_become_bytes() {
        let mut backend = HeadlessBackend::default();
        let t = Texture2D::from_floats(&mut backend, 1, 1, &[0.0, 0.5, 1.0, 2.0]).unwrap();
        assert_eq!(backend.texture_data(t.id(), None).unwrap(), &[0, 127, 255, 255]);
    }

    #[test]
    fn wrong_pixel_count_is_rejected() {
        let mut backend = HeadlessBackend::default();
        let err = Texture2D::from_pixels(&mut backend, 2, 2, vec![0; 12]).unwrap_err();
        assert!(matches!(err, GpuError::SizeMismatch { expected: 16, got: 12, .. }));
    }

    #[test]
    fn default_wrap_depends_on_power_of_two() {
        let mut backend = HeadlessBackend::default();
        let pot = Texture2D::empty(&mut backend, 4, 8).unwrap();
        let npot = Texture2D::empty(&mut backend, 3, 8).unwrap();
        assert_eq!(pot.params().wrap_s, Wrap::Repeat);
        assert_eq!(npot.params().wrap_s, Wrap::ClampToEdge);
        assert_eq!(backend.sampler(npot.id()), Some(npot.params()));
    }

    #[test]
    fn recovery_restores_pixels_and_parameters() {
        let mut backend = HeadlessBackend::default();
        let t = Texture2D::from_pixels(&mut backend, 1, 1, vec![1, 2, 3, 4]).unwrap();
        let params = SamplerParams { min_filter: Filter::Nearest, ..t.params() };
        t.set_parameters(&mut backend, params).unwrap();

        backend.lose_context();
        backend.restore_context().unwrap();
        assert_eq!(backend.texture_data(t.id(), None), None);
        t.recover_from_lost_context(&mut backend).unwrap();
        assert_eq!(backend.texture_data(t.id(), None).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(backend.sampler(t.id()).unwrap().min_filter, Filter::Nearest);
    }

    #[test]
    fn files_are_cached_by_path_and_reloaded_on_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "grid.png", 4, 2);
        let mut backend = HeadlessBackend::default();
        let mut cache = TextureCache::new();

        let a = cache.get_or_load(&mut backend, &path).unwrap();
        let b = cache.get_or_load(&mut backend, &path).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.size(), (4, 2));
        assert_eq!(backend.num_textures(), 1);

        backend.lose_context();
        backend.restore_context().unwrap();
        cache.recover(&mut backend).unwrap();
        let texels = backend.texture_data(a.id(), None).unwrap();
        assert_eq!(&texels[4..8], &[1, 0, 7, 255]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut backend = HeadlessBackend::default();
        assert!(Texture2D::from_file(&mut backend, "/nonexistent/texture.png").is_err());
    }

    #[test]
    fn cube_faces_must_match() {
        let mut backend = HeadlessBackend::default();
        let face = |n: u32| TextureSource::Pixels { width: n, height: n, data: vec![9; (n * n * 4) as usize] };
        let cube = CubeMap::new(&mut backend, std::array::from_fn(|_| face(2))).unwrap();
        assert_eq!(backend.texture_data(cube.id(), Some(CubeFace::NegativeZ)).unwrap(), &[9; 16]);

        let mut faces: [TextureSource; 6] = std::array::from_fn(|_| face(2));
        faces[3] = face(4);
        assert!(CubeMap::new(&mut backend, faces).is_err());
    }

    #[test]
    fn solid_and_depth_textures() {
        let mut backend = HeadlessBackend::default();
        let solid = SolidTexture::new(&mut backend, [1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(backend.texture_data(solid.id(), None).unwrap(), &[255, 0, 0, 255]);
        let depth = DepthTexture::new(&mut backend, 8, 8).unwrap();
        assert_eq!(backend.texture_desc(depth.id()).unwrap().format, TextureFormat::Depth32);
    }
}
