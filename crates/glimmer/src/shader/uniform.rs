//! Uniform values and the byte image of a program's uniform block.

use super::reflect::{UniformInfo, UniformType};
use crate::error::ProgramError;
use crate::gpu::{TextureBinding, TextureId};

/// A value for one uniform or texture slot.
///
/// `Vec4` also fills a `mat2x2<f32>`; `Floats` fills arrays (or a prefix of
/// one) element by element.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    Floats(Vec<f32>),
    Int(i32),
    Ints(Vec<i32>),
    Uint(u32),
    Texture(TextureId),
}

impl UniformValue {
    fn floats(&self) -> Option<&[f32]> {
        match self {
            UniformValue::Float(v) => Some(std::slice::from_ref(v)),
            UniformValue::Vec2(v) => Some(v),
            UniformValue::Vec3(v) => Some(v),
            UniformValue::Vec4(v) => Some(v),
            UniformValue::Mat3(v) => Some(v),
            UniformValue::Mat4(v) => Some(v),
            UniformValue::Floats(v) => Some(v),
            _ => None,
        }
    }

    fn words(&self) -> Option<Vec<[u8; 4]>> {
        match self {
            UniformValue::Int(v) => Some(vec![v.to_le_bytes()]),
            UniformValue::Ints(v) => Some(v.iter().map(|i| i.to_le_bytes()).collect()),
            UniformValue::Uint(v) => Some(vec![v.to_le_bytes()]),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            UniformValue::Float(_) => "f32".into(),
            UniformValue::Vec2(_) => "vec2<f32>".into(),
            UniformValue::Vec3(_) => "vec3<f32>".into(),
            UniformValue::Vec4(_) => "vec4<f32>".into(),
            UniformValue::Mat3(_) => "mat3x3<f32>".into(),
            UniformValue::Mat4(_) => "mat4x4<f32>".into(),
            UniformValue::Floats(v) => format!("{} floats", v.len()),
            UniformValue::Int(_) => "i32".into(),
            UniformValue::Ints(v) => format!("{} ints", v.len()),
            UniformValue::Uint(_) => "u32".into(),
            UniformValue::Texture(_) => "texture".into(),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for UniformValue {
            fn from(v: $ty) -> Self {
                UniformValue::$variant(v)
            }
        })*
    };
}

impl_from! {
    f32 => Float,
    [f32; 2] => Vec2,
    [f32; 3] => Vec3,
    [f32; 4] => Vec4,
    [f32; 9] => Mat3,
    [f32; 16] => Mat4,
    Vec<f32> => Floats,
    i32 => Int,
    Vec<i32> => Ints,
    u32 => Uint,
    TextureId => Texture,
}

/// Uniform bytes for one draw plus the textures bound alongside them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniformBlock {
    bytes: Vec<u8>,
    textures: Vec<TextureBinding>,
}

impl UniformBlock {
    /// A zeroed block of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self { bytes: vec![0; size], textures: Vec::new() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn textures(&self) -> &[TextureBinding] {
        &self.textures
    }

    pub(crate) fn bind_texture(&mut self, binding: u32, texture: TextureId) {
        match self.textures.iter_mut().find(|t| t.binding == binding) {
            Some(slot) => slot.texture = texture,
            None => self.textures.push(TextureBinding { binding, texture }),
        }
    }

    /// Write `value` at the offsets `info` describes.
    pub(crate) fn write(&mut self, info: &UniformInfo, value: &UniformValue) -> Result<(), ProgramError> {
        let per_element = info.ty.components() as usize;
        let max_elements = info.array_len.unwrap_or(1) as usize;
        let mismatch = || ProgramError::UniformType {
            name: info.name.clone(),
            expected: match info.array_len {
                Some(n) => format!("array<{}, {n}>", info.ty.describe()),
                None => info.ty.describe(),
            },
            got: value.describe(),
        };

        let words: Vec<[u8; 4]> = match info.ty {
            UniformType::Float(_) | UniformType::Matrix { .. } => {
                value.floats().ok_or_else(mismatch)?.iter().map(|f| f.to_le_bytes()).collect()
            }
            UniformType::Int(_) | UniformType::Uint(_) => value.words().ok_or_else(mismatch)?,
        };
        if words.is_empty() || words.len() % per_element != 0 || words.len() / per_element > max_elements {
            return Err(mismatch());
        }

        for (i, element) in words.chunks_exact(per_element).enumerate() {
            let base = info.offset as usize + i * info.stride as usize;
            match info.ty {
                UniformType::Matrix { rows, .. } => {
                    for (c, column) in element.chunks_exact(rows as usize).enumerate() {
                        self.put(base + c * info.ty.column_stride() as usize, column);
                    }
                }
                _ => self.put(base, element),
            }
        }
        Ok(())
    }

    fn put(&mut self, offset: usize, words: &[[u8; 4]]) {
        for (i, word) in words.iter().enumerate() {
            let at = offset + i * 4;
            self.bytes[at..at + 4].copy_from_slice(word);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, ty: UniformType, offset: u32, array_len: Option<u32>, stride: u32) -> UniformInfo {
        UniformInfo { name: name.into(), ty, offset, array_len, stride }
    }

    fn float_at(block: &UniformBlock, offset: usize) -> f32 {
        f32::from_le_bytes(block.as_bytes()[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn mat3_columns_are_padded_to_16_bytes() {
        let mut block = UniformBlock::new(64);
        let m = info("m", UniformType::Matrix { columns: 3, rows: 3 }, 0, None, 0);
        block.write(&m, &UniformValue::Mat3([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0])).unwrap();
        assert_eq!(float_at(&block, 0), 1.0);
        assert_eq!(float_at(&block, 8), 3.0);
        assert_eq!(float_at(&block, 12), 0.0);
        assert_eq!(float_at(&block, 16), 4.0);
        assert_eq!(float_at(&block, 32), 7.0);
        assert_eq!(float_at(&block, 40), 9.0);
    }

    #[test]
    fn mat2_takes_a_vec4_packed() {
        let mut block = UniformBlock::new(16);
        let m = info("m", UniformType::Matrix { columns: 2, rows: 2 }, 0, None, 0);
        block.write(&m, &UniformValue::Vec4([1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(float_at(&block, 8), 3.0);
        assert_eq!(float_at(&block, 12), 4.0);
    }

    #[test]
    fn arrays_use_their_stride_and_accept_a_prefix() {
        let mut block = UniformBlock::new(64);
        let a = info("a", UniformType::Float(4), 0, Some(4), 16);
        block.write(&a, &UniformValue::Floats(vec![1.0; 8])).unwrap();
        assert_eq!(float_at(&block, 28), 1.0);
        assert_eq!(float_at(&block, 32), 0.0);
        assert!(block.write(&a, &UniformValue::Floats(vec![1.0; 20])).is_err());
        assert!(block.write(&a, &UniformValue::Floats(vec![1.0; 6])).is_err());
    }

    #[test]
    fn shape_mismatch_names_both_types() {
        let mut block = UniformBlock::new(16);
        let v = info("tint", UniformType::Float(3), 0, None, 0);
        match block.write(&v, &UniformValue::Float(1.0)) {
            Err(ProgramError::UniformType { name, expected, got }) => {
                assert_eq!(name, "tint");
                assert_eq!(expected, "vec3<f32>");
                assert_eq!(got, "f32");
            }
            other => panic!("unexpected {other:?}"),
        }
        let i = info("count", UniformType::Int(1), 0, None, 0);
        assert!(block.write(&i, &UniformValue::Float(1.0)).is_err());
        block.write(&i, &UniformValue::Int(-3)).unwrap();
        assert_eq!(&block.as_bytes()[0..4], &(-3i32).to_le_bytes());
    }

    #[test]
    fn rebinding_a_texture_replaces_it() {
        let mut block = UniformBlock::default();
        block.bind_texture(1, TextureId(5));
        block.bind_texture(1, TextureId(6));
        block.bind_texture(3, TextureId(7));
        assert_eq!(block.textures().len(), 2);
        assert_eq!(block.textures()[0].texture, TextureId(6));
    }
}
