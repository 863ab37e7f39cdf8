//! Shader introspection through naga.
//!
//! Each stage is parsed and validated on its own, then the two reflections
//! are linked into a [`ProgramLayout`]: vertex attributes with their
//! locations, the uniform block at group 0 binding 0 with every member's
//! byte offset, and the textures with their paired samplers.

use naga::{AddressSpace, ArraySize, Binding, ImageClass, ImageDimension, Module, ScalarKind, TypeInner};

use super::ShaderStage;
use crate::error::ProgramError;
use crate::gpu::{TextureKind, VertexFormat};

/// Shape of one uniform (or one element of a uniform array).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float(u32),
    Int(u32),
    Uint(u32),
    Matrix { columns: u32, rows: u32 },
}

impl UniformType {
    /// Scalars in one element.
    pub fn components(self) -> u32 {
        match self {
            UniformType::Float(n) | UniformType::Int(n) | UniformType::Uint(n) => n,
            UniformType::Matrix { columns, rows } => columns * rows,
        }
    }

    /// Byte distance between matrix columns in a uniform block.
    pub fn column_stride(self) -> u32 {
        match self {
            UniformType::Matrix { rows: 2, .. } => 8,
            UniformType::Matrix { .. } => 16,
            _ => 0,
        }
    }

    /// WGSL spelling, for error messages.
    pub fn describe(self) -> String {
        fn scalar(name: &str, n: u32) -> String {
            if n == 1 { name.to_string() } else { format!("vec{n}<{name}>") }
        }
        match self {
            UniformType::Float(n) => scalar("f32", n),
            UniformType::Int(n) => scalar("i32", n),
            UniformType::Uint(n) => scalar("u32", n),
            UniformType::Matrix { columns, rows } => format!("mat{columns}x{rows}<f32>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformInfo {
    pub name: String,
    pub ty: UniformType,
    pub offset: u32,
    /// Element count for arrays.
    pub array_len: Option<u32>,
    /// Byte distance between array elements.
    pub stride: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name: String,
    pub location: u32,
    pub format: VertexFormat,
}

/// A texture at `binding` with its sampler at `binding + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    pub name: String,
    pub binding: u32,
    pub kind: TextureKind,
    pub comparison: bool,
}

impl TextureSlot {
    pub fn sampler_binding(&self) -> u32 {
        self.binding + 1
    }
}

/// Everything the backends need to know about a linked program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub attributes: Vec<AttributeInfo>,
    pub uniforms: Vec<UniformInfo>,
    /// Size of the uniform block in bytes, 0 when there is none.
    pub uniform_block_size: u32,
    pub textures: Vec<TextureSlot>,
}

impl ProgramLayout {
    pub fn uniform_size(&self) -> u64 {
        self.uniform_block_size as u64
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn texture(&self, name: &str) -> Option<&TextureSlot> {
        self.textures.iter().find(|t| t.name == name)
    }
}

/// What one stage declares.
#[derive(Debug, Clone, Default)]
pub(crate) struct StageReflection {
    pub entry: String,
    /// Vertex attributes for a vertex stage, varyings for a fragment stage.
    pub inputs: Vec<(String, u32, TypeInner)>,
    pub output_locations: Vec<u32>,
    pub uniform_block: Option<(u32, Vec<UniformInfo>)>,
    pub textures: Vec<TextureSlot>,
    pub samplers: Vec<(u32, bool)>,
}

/// Parse, validate and reflect one stage.
pub(crate) fn reflect_stage(stage: ShaderStage, source: &str) -> Result<StageReflection, ProgramError> {
    let compile_error = |log: String| ProgramError::Compile { stage, log };

    let module = naga::front::wgsl::parse_str(source).map_err(|e| compile_error(e.emit_to_string(source)))?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(source)))?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .ok_or_else(|| compile_error(format!("no @{stage} entry point")))?;

    let mut out = StageReflection { entry: entry.name.clone(), ..Default::default() };

    for arg in &entry.function.arguments {
        let name = arg.name.clone().unwrap_or_default();
        collect_locations(&module, &name, arg.ty, arg.binding.as_ref(), &mut |name, location, inner| {
            out.inputs.push((name, location, inner))
        });
    }
    if let Some(result) = &entry.function.result {
        collect_locations(&module, "", result.ty, result.binding.as_ref(), &mut |_, location, _| {
            out.output_locations.push(location)
        });
    }

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else { continue };
        let name = var.name.clone().unwrap_or_default();
        if binding.group != 0 {
            return Err(compile_error(format!("`{name}` must be in @group(0)")));
        }
        match var.space {
            AddressSpace::Uniform => {
                if binding.binding != 0 {
                    return Err(compile_error(format!("uniform block `{name}` must be at @binding(0)")));
                }
                out.uniform_block = Some(uniform_block(&module, &name, var.ty).map_err(compile_error)?);
            }
            AddressSpace::Handle => match &module.types[var.ty].inner {
                TypeInner::Image { dim, arrayed: false, class } => {
                    let kind = match (dim, class) {
                        (ImageDimension::D2, ImageClass::Sampled { kind: ScalarKind::Float, .. }) => TextureKind::D2,
                        (ImageDimension::Cube, ImageClass::Sampled { kind: ScalarKind::Float, .. }) => TextureKind::Cube,
                        (ImageDimension::D2, ImageClass::Depth { .. }) => TextureKind::Depth,
                        _ => return Err(compile_error(format!("texture `{name}` has an unsupported type"))),
                    };
                    out.textures.push(TextureSlot { name, binding: binding.binding, kind, comparison: false });
                }
                TypeInner::Sampler { comparison } => out.samplers.push((binding.binding, *comparison)),
                _ => return Err(compile_error(format!("resource `{name}` has an unsupported type"))),
            },
            _ => return Err(compile_error(format!("`{name}` uses an unsupported address space"))),
        }
    }

    for texture in &mut out.textures {
        let sampler = out.samplers.iter().find(|(b, _)| *b == texture.binding + 1);
        match sampler {
            Some((_, comparison)) => texture.comparison = *comparison,
            None => {
                return Err(compile_error(format!(
                    "texture `{}` at binding {} needs a sampler at binding {}",
                    texture.name,
                    texture.binding,
                    texture.binding + 1
                )));
            }
        }
    }
    Ok(out)
}

/// Walk an argument or result, reporting every `@location`, flattening
/// structs one level.
fn collect_locations(
    module: &Module,
    name: &str,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    report: &mut dyn FnMut(String, u32, TypeInner),
) {
    match binding {
        Some(Binding::Location { location, .. }) => report(name.to_string(), *location, module.types[ty].inner.clone()),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(Binding::Location { location, .. }) = &member.binding {
                        let member_name = member.name.clone().unwrap_or_default();
                        report(member_name, *location, module.types[member.ty].inner.clone());
                    }
                }
            }
        }
    }
}

fn uniform_block(module: &Module, name: &str, ty: naga::Handle<naga::Type>) -> Result<(u32, Vec<UniformInfo>), String> {
    let TypeInner::Struct { members, span } = &module.types[ty].inner else {
        return Err(format!("uniform block `{name}` must be a struct"));
    };
    let mut uniforms = Vec::with_capacity(members.len());
    for member in members {
        let member_name = member.name.clone().unwrap_or_default();
        let (ty, array_len, stride) = uniform_type(module, &module.types[member.ty].inner)
            .ok_or_else(|| format!("uniform `{member_name}` has an unsupported type"))?;
        uniforms.push(UniformInfo { name: member_name, ty, offset: member.offset, array_len, stride });
    }
    Ok((*span, uniforms))
}

fn uniform_type(module: &Module, inner: &TypeInner) -> Option<(UniformType, Option<u32>, u32)> {
    let scalar = |kind: ScalarKind, n: u32| match kind {
        ScalarKind::Float => Some(UniformType::Float(n)),
        ScalarKind::Sint => Some(UniformType::Int(n)),
        ScalarKind::Uint => Some(UniformType::Uint(n)),
        _ => None,
    };
    match inner {
        TypeInner::Scalar(s) => Some((scalar(s.kind, 1)?, None, 0)),
        TypeInner::Vector { size, scalar: s } => Some((scalar(s.kind, *size as u32)?, None, 0)),
        TypeInner::Matrix { columns, rows, .. } => Some((
            UniformType::Matrix { columns: *columns as u32, rows: *rows as u32 },
            None,
            0,
        )),
        TypeInner::Array { base, size: ArraySize::Constant(len), stride } => {
            let (element, None, _) = uniform_type(module, &module.types[*base].inner)? else {
                return None;
            };
            Some((element, Some(len.get()), *stride))
        }
        _ => None,
    }
}

fn attribute_format(name: &str, inner: &TypeInner) -> Result<VertexFormat, ProgramError> {
    let components = match inner {
        TypeInner::Scalar(s) if s.kind == ScalarKind::Float => Some(1),
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => Some(*size as usize),
        _ => None,
    };
    components
        .and_then(VertexFormat::float)
        .ok_or_else(|| ProgramError::Link(format!("attribute `{name}` must be f32 or a vector of f32")))
}

/// Check the stages fit together and merge what they declare.
pub(crate) fn link(vertex: &StageReflection, fragment: &StageReflection) -> Result<ProgramLayout, ProgramError> {
    for (name, location, _) in &fragment.inputs {
        if !vertex.output_locations.contains(location) {
            return Err(ProgramError::Link(format!(
                "fragment input `{name}` at location {location} is not written by the vertex stage"
            )));
        }
    }

    let mut attributes = Vec::with_capacity(vertex.inputs.len());
    for (name, location, inner) in &vertex.inputs {
        let format = attribute_format(name, inner)?;
        attributes.push(AttributeInfo { name: name.clone(), location: *location, format });
    }
    attributes.sort_by_key(|a| a.location);

    let (uniform_block_size, uniforms) = match (&vertex.uniform_block, &fragment.uniform_block) {
        (None, None) => (0, Vec::new()),
        (Some(block), None) | (None, Some(block)) => block.clone(),
        (Some((vs_size, vs_members)), Some((fs_size, fs_members))) => {
            if vs_size != fs_size {
                return Err(ProgramError::Link(format!(
                    "uniform blocks differ in size ({vs_size} vs {fs_size} bytes)"
                )));
            }
            let mut merged = vs_members.clone();
            for member in fs_members {
                match merged.iter().find(|m| m.name == member.name) {
                    Some(existing) if existing != member => {
                        return Err(ProgramError::Link(format!(
                            "uniform `{}` is declared differently in each stage",
                            member.name
                        )));
                    }
                    Some(_) => {}
                    None => merged.push(member.clone()),
                }
            }
            (*vs_size, merged)
        }
    };

    let mut textures: Vec<TextureSlot> = vertex.textures.clone();
    for slot in &fragment.textures {
        match textures.iter().find(|t| t.binding == slot.binding) {
            Some(existing) if existing != slot => {
                return Err(ProgramError::Link(format!(
                    "binding {} is `{}` in one stage and `{}` in the other",
                    slot.binding, existing.name, slot.name
                )));
            }
            Some(_) => {}
            None => textures.push(slot.clone()),
        }
    }
    textures.sort_by_key(|t| t.binding);
    if let Some(clash) = textures.iter().find(|t| t.binding == 0 && uniform_block_size > 0) {
        return Err(ProgramError::Link(format!("texture `{}` collides with the uniform block", clash.name)));
    }

    Ok(ProgramLayout {
        vertex_entry: vertex.entry.clone(),
        fragment_entry: fragment.entry.clone(),
        attributes,
        uniforms,
        uniform_block_size,
        textures,
    })
}
