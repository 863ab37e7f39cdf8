//! [`Backend`] on a real device through wgpu.
//!
//! Every draw and every clear is its own encoder, pass and submit, so calls
//! land in the order they are made, as with an immediate-mode API. Render
//! pipelines depend on the vertex layout, blend, depth and target format of
//! a draw; they are built on first use and cached under that key.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use wgpu::util::DeviceExt;

use super::{
    Backend, BackendConfig, BlendMode, BufferId, BufferKind, CubeFace, DepthState, DrawCall, Filter, FramebufferDesc,
    FramebufferId, PowerPreference, Primitive, ProgramId, RenderTarget, SamplerParams, ShaderId, TextureDesc,
    TextureId, TextureKind, VertexBinding, VertexFormat, Wrap,
};
use crate::error::{GpuError, ProgramError};
use crate::shader::{ProgramLayout, ShaderStage};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

struct Gpu {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

struct NativeBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
    len: usize,
    /// Contents padded to 4 bytes; writes go through it so unaligned ranges
    /// can be uploaded whole.
    shadow: Vec<u8>,
}

struct NativeTexture {
    texture: wgpu::Texture,
    desc: TextureDesc,
    sampler: wgpu::Sampler,
}

struct NativeShader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct NativeProgram {
    vertex: ShaderId,
    fragment: ShaderId,
    layout: ProgramLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

/// Attributes read from one buffer at one stride.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexSlot {
    stride: u64,
    attributes: Vec<(u32, VertexFormat, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    slots: Vec<VertexSlot>,
    blend: BlendMode,
    depth: DepthState,
    primitive: Primitive,
    indexed: bool,
    format: wgpu::TextureFormat,
    has_depth: bool,
}

struct ResolvedTarget {
    color: wgpu::TextureView,
    depth: Option<wgpu::TextureView>,
    format: wgpu::TextureFormat,
}

/// Renders with wgpu, offscreen or into a window surface.
///
/// With a surface, the first clear or draw of a frame acquires the surface
/// texture and [`end_frame`](Self::end_frame) presents it.
pub struct WgpuBackend {
    config: BackendConfig,
    instance: wgpu::Instance,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    gpu: Gpu,
    lost: Arc<AtomicBool>,
    next_id: u32,
    size: (u32, u32),
    offscreen: Option<wgpu::Texture>,
    default_depth: Option<wgpu::Texture>,
    frame: Option<wgpu::SurfaceTexture>,
    buffers: HashMap<BufferId, NativeBuffer>,
    textures: HashMap<TextureId, NativeTexture>,
    framebuffers: HashMap<FramebufferId, FramebufferDesc>,
    shaders: HashMap<ShaderId, NativeShader>,
    programs: HashMap<ProgramId, NativeProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

fn request_gpu(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
    power: PowerPreference,
    lost: &Arc<AtomicBool>,
) -> Result<Gpu, GpuError> {
    let power_preference = match power {
        PowerPreference::Default => wgpu::PowerPreference::default(),
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
    };
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference,
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .map_err(|e| GpuError::Device(format!("no suitable adapter: {e}")))?;
    log::info!("wgpu adapter: {} ({:?})", adapter.get_info().name, adapter.get_info().backend);

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("glimmer device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        ..Default::default()
    }))
    .map_err(|e| GpuError::Device(e.to_string()))?;

    let flag = Arc::clone(lost);
    device.set_device_lost_callback(move |reason, message| {
        log::warn!("device lost ({reason:?}): {message}");
        flag.store(true, Ordering::SeqCst);
    });
    Ok(Gpu { adapter, device, queue })
}

fn surface_configuration(
    surface: &wgpu::Surface<'_>,
    adapter: &wgpu::Adapter,
    width: u32,
    height: u32,
) -> Result<wgpu::SurfaceConfiguration, GpuError> {
    let caps = surface.get_capabilities(adapter);
    let format = caps
        .formats
        .iter()
        .find(|f| !f.is_srgb())
        .or_else(|| caps.formats.first())
        .copied()
        .ok_or_else(|| GpuError::Unsupported("surface reports no formats".into()))?;
    Ok(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    })
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
        Wrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32 => wgpu::VertexFormat::Float32,
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Premultiplied => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
    }
}

/// Group bindings sharing a buffer and stride into one vertex buffer slot,
/// in order of first appearance.
fn vertex_slots(bindings: &[VertexBinding]) -> (Vec<VertexSlot>, Vec<BufferId>) {
    let mut slots: Vec<(BufferId, VertexSlot)> = Vec::new();
    for b in bindings {
        let attribute = (b.location, b.format, b.offset);
        match slots.iter_mut().find(|(id, slot)| *id == b.buffer && slot.stride == b.stride) {
            Some((_, slot)) => slot.attributes.push(attribute),
            None => slots.push((b.buffer, VertexSlot { stride: b.stride, attributes: vec![attribute] })),
        }
    }
    slots.into_iter().map(|(id, slot)| (slot, id)).unzip()
}

fn build_pipeline(
    device: &wgpu::Device,
    program: &NativeProgram,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    key: &PipelineKey,
) -> Result<wgpu::RenderPipeline, GpuError> {
    let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
        .slots
        .iter()
        .map(|slot| {
            slot.attributes
                .iter()
                .map(|&(location, format, offset)| wgpu::VertexAttribute {
                    format: vertex_format(format),
                    offset,
                    shader_location: location,
                })
                .collect()
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout> = key
        .slots
        .iter()
        .zip(&attributes)
        .map(|(slot, attributes)| wgpu::VertexBufferLayout {
            array_stride: slot.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        })
        .collect();
    let strip = matches!(key.primitive, Primitive::TriangleStrip | Primitive::LineStrip);

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("glimmer pipeline"),
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some(program.layout.vertex_entry.as_str()),
            buffers: &buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some(program.layout.fragment_entry.as_str()),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: blend_state(key.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: topology(key.primitive),
            strip_index_format: (strip && key.indexed).then_some(wgpu::IndexFormat::Uint16),
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: key.has_depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: key.depth.write,
            depth_compare: if key.depth.test { wgpu::CompareFunction::LessEqual } else { wgpu::CompareFunction::Always },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(GpuError::Device(format!("pipeline for {}: {err}", key.program)));
    }
    log::debug!("built pipeline for {} ({:?}, {:?})", key.program, key.primitive, key.blend);
    Ok(pipeline)
}

impl WgpuBackend {
    /// Render into an offscreen `config.width` x `config.height` image.
    pub fn new_offscreen(config: BackendConfig) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let lost = Arc::new(AtomicBool::new(false));
        let gpu = request_gpu(&instance, None, config.power_preference, &lost)?;
        let (width, height) = (config.width, config.height);
        let mut backend = Self::assemble(config, instance, None, None, gpu, lost);
        backend.create_default_target(width, height);
        Ok(backend)
    }

    /// Render into a window (anything wgpu can make a surface from, e.g.
    /// an `Arc<winit::window::Window>`).
    pub fn with_surface(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        config: BackendConfig,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(target).map_err(|e| GpuError::Device(e.to_string()))?;
        let lost = Arc::new(AtomicBool::new(false));
        let gpu = request_gpu(&instance, Some(&surface), config.power_preference, &lost)?;
        let surface_config = surface_configuration(&surface, &gpu.adapter, width, height)?;
        surface.configure(&gpu.device, &surface_config);
        log::info!("surface {}x{} {:?}", surface_config.width, surface_config.height, surface_config.format);
        let mut backend = Self::assemble(config, instance, Some(surface), Some(surface_config), gpu, lost);
        backend.create_default_target(width, height);
        Ok(backend)
    }

    fn assemble(
        config: BackendConfig,
        instance: wgpu::Instance,
        surface: Option<wgpu::Surface<'static>>,
        surface_config: Option<wgpu::SurfaceConfiguration>,
        gpu: Gpu,
        lost: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            instance,
            surface,
            surface_config,
            gpu,
            lost,
            next_id: 1,
            size: (0, 0),
            offscreen: None,
            default_depth: None,
            frame: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.gpu.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu.queue
    }

    /// The offscreen image behind [`RenderTarget::Default`], when there is
    /// no surface.
    pub fn offscreen_texture(&self) -> Option<&wgpu::Texture> {
        self.offscreen.as_ref()
    }

    /// Resize the default target (and the surface, if any).
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.frame = None;
        if let (Some(surface), Some(config)) = (&self.surface, &mut self.surface_config) {
            config.width = width;
            config.height = height;
            surface.configure(&self.gpu.device, config);
        }
        self.create_default_target(width, height);
    }

    /// Acquire the surface texture now rather than on the first clear or
    /// draw.
    pub fn begin_frame(&mut self) -> Result<(), GpuError> {
        self.ensure_live()?;
        if self.surface.is_some() {
            self.acquire_frame()?;
        }
        Ok(())
    }

    /// Present the frame drawn since the last call.
    pub fn end_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
    }

    /// Destroy the device, as a driver reset would. The lost callback fires
    /// and every call fails until [`Backend::restore_context`].
    pub fn simulate_context_loss(&mut self) {
        log::warn!("simulating context loss");
        self.frame = None;
        self.gpu.device.destroy();
        self.lost.store(true, Ordering::SeqCst);
    }

    fn ensure_live(&self) -> Result<(), GpuError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(GpuError::ContextLost);
        }
        Ok(())
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_default_target(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        self.size = (width, height);
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let device = &self.gpu.device;
        let texture = |label, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        self.offscreen = self.surface.is_none().then(|| {
            texture(
                "glimmer offscreen target",
                COLOR_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::TEXTURE_BINDING,
            )
        });
        self.default_depth = self
            .config
            .depth
            .then(|| texture("glimmer default depth", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT));
    }

    fn acquire_frame(&mut self) -> Result<wgpu::TextureView, GpuError> {
        let (Some(surface), Some(config)) = (&self.surface, &self.surface_config) else {
            return Err(GpuError::Unsupported("backend has no surface".into()));
        };
        if self.frame.is_none() {
            let frame = match surface.get_current_texture() {
                Ok(frame) => frame,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    surface.configure(&self.gpu.device, config);
                    surface.get_current_texture().map_err(|e| GpuError::Device(e.to_string()))?
                }
                Err(e) => return Err(GpuError::Device(e.to_string())),
            };
            self.frame = Some(frame);
        }
        match &self.frame {
            Some(frame) => Ok(frame.texture.create_view(&wgpu::TextureViewDescriptor::default())),
            None => Err(GpuError::Device("surface frame unavailable".into())),
        }
    }

    fn resolve_target(&mut self, target: RenderTarget) -> Result<ResolvedTarget, GpuError> {
        match target {
            RenderTarget::Default => {
                let (color, format) = if let Some(texture) = &self.offscreen {
                    (texture.create_view(&wgpu::TextureViewDescriptor::default()), COLOR_FORMAT)
                } else {
                    let format = self
                        .surface_config
                        .as_ref()
                        .map(|c| c.format)
                        .ok_or_else(|| GpuError::Unsupported("no default target".into()))?;
                    (self.acquire_frame()?, format)
                };
                let depth = self
                    .default_depth
                    .as_ref()
                    .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));
                Ok(ResolvedTarget { color, depth, format })
            }
            RenderTarget::Framebuffer(id) => {
                let desc = self
                    .framebuffers
                    .get(&id)
                    .ok_or(GpuError::UnknownHandle { kind: "framebuffer", id: id.0 })?;
                let color = self.texture(desc.color)?;
                let color = match desc.face {
                    Some(face) => face_view(&color.texture, face),
                    None => color.texture.create_view(&wgpu::TextureViewDescriptor::default()),
                };
                let depth = match desc.depth {
                    Some(depth) => Some(self.texture(depth)?.texture.create_view(&wgpu::TextureViewDescriptor::default())),
                    None => None,
                };
                Ok(ResolvedTarget { color, depth, format: COLOR_FORMAT })
            }
        }
    }

    fn texture(&self, id: TextureId) -> Result<&NativeTexture, GpuError> {
        self.textures.get(&id).ok_or(GpuError::UnknownHandle { kind: "texture", id: id.0 })
    }

    fn buffer(&self, id: BufferId, kind: BufferKind) -> Result<&NativeBuffer, GpuError> {
        let buffer = self.buffers.get(&id).ok_or(GpuError::UnknownHandle { kind: "buffer", id: id.0 })?;
        if buffer.kind != kind {
            return Err(GpuError::Unsupported(format!("{id} is a {:?} buffer, expected {kind:?}", buffer.kind)));
        }
        Ok(buffer)
    }

    fn native_buffer(&self, kind: BufferKind, data: &[u8]) -> NativeBuffer {
        let mut shadow = data.to_vec();
        shadow.resize(align4(data.len()).max(4), 0);
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        let buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("glimmer buffer"),
            contents: &shadow,
            usage,
        });
        NativeBuffer { buffer, kind, len: data.len(), shadow }
    }

    fn create_sampler(&self, params: &SamplerParams) -> wgpu::Sampler {
        self.gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glimmer sampler"),
            address_mode_u: address_mode(params.wrap_s),
            address_mode_v: address_mode(params.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode(params.mag_filter),
            min_filter: filter_mode(params.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }

    fn depth_sampler(&self, comparison: bool) -> wgpu::Sampler {
        let filter = if comparison { wgpu::FilterMode::Linear } else { wgpu::FilterMode::Nearest };
        self.gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glimmer depth sampler"),
            mag_filter: filter,
            min_filter: filter,
            compare: comparison.then_some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        })
    }

    fn native_texture(&self, desc: &TextureDesc) -> Result<NativeTexture, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::Unsupported(format!("{}x{} texture", desc.width, desc.height)));
        }
        let (format, usage) = match desc.kind {
            TextureKind::Depth => {
                (DEPTH_FORMAT, wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT)
            }
            TextureKind::D2 | TextureKind::Cube => (
                COLOR_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
            ),
        };
        let layers = if desc.kind == TextureKind::Cube { 6 } else { 1 };
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glimmer texture"),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: layers },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        Ok(NativeTexture { texture, desc: *desc, sampler: self.create_sampler(&SamplerParams::default()) })
    }

    fn create_module(&self, stage: ShaderStage, source: &str) -> Result<wgpu::ShaderModule, ProgramError> {
        let device = &self.gpu.device;
        let label = format!("glimmer {stage} shader");
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_string())),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ProgramError::Compile { stage, log: err.to_string() });
        }
        Ok(module)
    }

    fn native_program(
        &self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<NativeProgram, ProgramError> {
        for (id, stage) in [(vertex, ShaderStage::Vertex), (fragment, ShaderStage::Fragment)] {
            match self.shaders.get(&id) {
                Some(s) if s.stage == stage => {}
                Some(s) => return Err(ProgramError::Link(format!("{id} is a {} shader, expected {stage}", s.stage))),
                None => return Err(GpuError::UnknownHandle { kind: "shader", id: id.0 }.into()),
            }
        }

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let mut entries = Vec::new();
        if layout.uniform_block_size > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(layout.uniform_size()),
                },
                count: None,
            });
        }
        for slot in &layout.textures {
            let (sample_type, view_dimension, sampler) = match (slot.kind, slot.comparison) {
                (TextureKind::D2, _) => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                    wgpu::SamplerBindingType::Filtering,
                ),
                (TextureKind::Cube, _) => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                    wgpu::SamplerBindingType::Filtering,
                ),
                (TextureKind::Depth, true) => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::D2,
                    wgpu::SamplerBindingType::Comparison,
                ),
                (TextureKind::Depth, false) => (
                    wgpu::TextureSampleType::Depth,
                    wgpu::TextureViewDimension::D2,
                    wgpu::SamplerBindingType::NonFiltering,
                ),
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.binding,
                visibility,
                ty: wgpu::BindingType::Texture { sample_type, view_dimension, multisampled: false },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.sampler_binding(),
                visibility,
                ty: wgpu::BindingType::Sampler(sampler),
                count: None,
            });
        }

        let device = &self.gpu.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glimmer program bindings"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glimmer program layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        Ok(NativeProgram { vertex, fragment, layout: layout.clone(), bind_group_layout, pipeline_layout })
    }

    fn submit_pass(
        &self,
        label: &str,
        target: &ResolvedTarget,
        color: wgpu::LoadOp<wgpu::Color>,
        depth: wgpu::LoadOp<f32>,
        record: impl FnOnce(&mut wgpu::RenderPass<'_>),
    ) {
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color,
                    resolve_target: None,
                    ops: wgpu::Operations { load: color, store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: target.depth.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations { load: depth, store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            record(&mut pass);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn face_view(texture: &wgpu::Texture, face: CubeFace) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("glimmer cube face"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_array_layer: face.layer(),
        array_layer_count: Some(1),
        ..Default::default()
    })
}

impl Backend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn restore_context(&mut self) -> Result<(), GpuError> {
        self.frame = None;
        self.buffers.clear();
        self.textures.clear();
        self.framebuffers.clear();
        self.shaders.clear();
        self.programs.clear();
        self.pipelines.clear();

        self.gpu = request_gpu(&self.instance, self.surface.as_ref(), self.config.power_preference, &self.lost)?;
        if let (Some(surface), Some(config)) = (&self.surface, &self.surface_config) {
            surface.configure(&self.gpu.device, config);
        }
        let (width, height) = self.size;
        self.create_default_target(width, height);
        self.lost.store(false, Ordering::SeqCst);
        log::info!("wgpu: context restored");
        Ok(())
    }

    fn default_target_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId, GpuError> {
        self.ensure_live()?;
        let id = BufferId(self.allocate());
        self.restore_buffer(id, kind, data)?;
        Ok(id)
    }

    fn restore_buffer(&mut self, id: BufferId, kind: BufferKind, data: &[u8]) -> Result<(), GpuError> {
        self.ensure_live()?;
        let buffer = self.native_buffer(kind, data);
        self.buffers.insert(id, buffer);
        Ok(())
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        self.ensure_live()?;
        let native = self
            .buffers
            .get_mut(&id)
            .ok_or(GpuError::UnknownHandle { kind: "buffer", id: id.0 })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > native.len {
            return Err(GpuError::SizeMismatch { what: "buffer write", expected: native.len, got: end });
        }
        native.shadow[start..end].copy_from_slice(data);
        let (aligned_start, aligned_end) = (start & !3, align4(end));
        self.gpu
            .queue
            .write_buffer(&native.buffer, aligned_start as u64, &native.shadow[aligned_start..aligned_end]);
        Ok(())
    }

    fn delete_buffer(&mut self, id: BufferId) {
        if let Some(native) = self.buffers.remove(&id) {
            native.buffer.destroy();
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        self.ensure_live()?;
        let id = TextureId(self.allocate());
        self.restore_texture(id, desc)?;
        Ok(id)
    }

    fn restore_texture(&mut self, id: TextureId, desc: &TextureDesc) -> Result<(), GpuError> {
        self.ensure_live()?;
        let texture = self.native_texture(desc)?;
        self.textures.insert(id, texture);
        Ok(())
    }

    fn write_texture(&mut self, id: TextureId, face: Option<CubeFace>, data: &[u8]) -> Result<(), GpuError> {
        self.ensure_live()?;
        let native = self.texture(id)?;
        let desc = native.desc;
        let layer = match (desc.kind, face) {
            (TextureKind::Depth, _) => return Err(GpuError::Unsupported("depth textures cannot be uploaded".into())),
            (TextureKind::Cube, Some(face)) => face.layer(),
            (TextureKind::Cube, None) => return Err(GpuError::Unsupported("cube map upload needs a face".into())),
            (TextureKind::D2, Some(_)) => return Err(GpuError::Unsupported("face given for a 2D texture".into())),
            (TextureKind::D2, None) => 0,
        };
        let expected = desc.face_size();
        if data.len() != expected {
            return Err(GpuError::SizeMismatch { what: "texture upload", expected, got: data.len() });
        }
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &native.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_texel() as u32),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 },
        );
        Ok(())
    }

    fn set_sampler(&mut self, id: TextureId, params: &SamplerParams) -> Result<(), GpuError> {
        self.ensure_live()?;
        let sampler = self.create_sampler(params);
        let native = self
            .textures
            .get_mut(&id)
            .ok_or(GpuError::UnknownHandle { kind: "texture", id: id.0 })?;
        native.sampler = sampler;
        Ok(())
    }

    fn delete_texture(&mut self, id: TextureId) {
        if let Some(native) = self.textures.remove(&id) {
            native.texture.destroy();
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferId, GpuError> {
        self.ensure_live()?;
        let id = FramebufferId(self.allocate());
        self.restore_framebuffer(id, desc)?;
        Ok(id)
    }

    fn restore_framebuffer(&mut self, id: FramebufferId, desc: &FramebufferDesc) -> Result<(), GpuError> {
        self.ensure_live()?;
        let color = self.texture(desc.color)?;
        match (color.desc.kind, desc.face) {
            (TextureKind::D2, None) | (TextureKind::Cube, Some(_)) => {}
            (kind, face) => {
                return Err(GpuError::Unsupported(format!("cannot render into a {kind:?} texture with face {face:?}")));
            }
        }
        if let Some(depth) = desc.depth {
            if self.texture(depth)?.desc.kind != TextureKind::Depth {
                return Err(GpuError::Unsupported(format!("{depth} is not a depth texture")));
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
        let module = self.create_module(stage, source)?;
        self.shaders.insert(id, NativeShader { stage, module });
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
        let program = self.native_program(vertex, fragment, layout)?;
        self.pipelines.retain(|key, _| key.program != id);
        self.programs.insert(id, program);
        Ok(())
    }

    fn delete_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
        self.pipelines.retain(|key, _| key.program != id);
    }

    fn clear(&mut self, target: RenderTarget, color: Option<[f32; 4]>, depth: Option<f32>) -> Result<(), GpuError> {
        self.ensure_live()?;
        let resolved = self.resolve_target(target)?;
        let color = match color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 }),
            None => wgpu::LoadOp::Load,
        };
        let depth = depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
        self.submit_pass("glimmer clear", &resolved, color, depth, |_| {});
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), GpuError> {
        self.ensure_live()?;
        let target = self.resolve_target(call.target)?;
        let program = self
            .programs
            .get(&call.program)
            .ok_or(GpuError::UnknownHandle { kind: "program", id: call.program.0 })?;

        let uniform_size = program.layout.uniform_size() as usize;
        if call.uniforms.len() != uniform_size {
            return Err(GpuError::SizeMismatch { what: "uniform block", expected: uniform_size, got: call.uniforms.len() });
        }

        let (slots, slot_buffers) = vertex_slots(call.vertices);
        let key = PipelineKey {
            program: call.program,
            slots,
            blend: call.blend,
            depth: call.depth,
            primitive: call.primitive,
            indexed: call.indices.is_some(),
            format: target.format,
            has_depth: target.depth.is_some(),
        };
        if !self.pipelines.contains_key(&key) {
            let shader = |id: ShaderId| {
                self.shaders
                    .get(&id)
                    .map(|s| &s.module)
                    .ok_or(GpuError::UnknownHandle { kind: "shader", id: id.0 })
            };
            let pipeline = build_pipeline(&self.gpu.device, program, shader(program.vertex)?, shader(program.fragment)?, &key)?;
            self.pipelines.insert(key.clone(), pipeline);
        }
        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| GpuError::Device(format!("no pipeline for {}", call.program)))?;

        let mut resources = Vec::with_capacity(program.layout.textures.len());
        for slot in &program.layout.textures {
            let bound = call.textures.iter().find(|t| t.binding == slot.binding).ok_or_else(|| {
                GpuError::Unsupported(format!("texture '{}' (binding {}) is not bound", slot.name, slot.binding))
            })?;
            let native = self.texture(bound.texture)?;
            if native.desc.kind != slot.kind {
                return Err(GpuError::Unsupported(format!(
                    "texture '{}' expects {:?}, got {:?}",
                    slot.name, slot.kind, native.desc.kind
                )));
            }
            let view = match slot.kind {
                TextureKind::Cube => native.texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::Cube),
                    ..Default::default()
                }),
                TextureKind::D2 | TextureKind::Depth => {
                    native.texture.create_view(&wgpu::TextureViewDescriptor::default())
                }
            };
            let sampler = match slot.kind {
                TextureKind::Depth => self.depth_sampler(slot.comparison),
                TextureKind::D2 | TextureKind::Cube => native.sampler.clone(),
            };
            resources.push((slot.binding, view, slot.sampler_binding(), sampler));
        }

        let vertex_buffers = slot_buffers
            .iter()
            .map(|&id| self.buffer(id, BufferKind::Vertex).map(|b| &b.buffer))
            .collect::<Result<Vec<_>, _>>()?;
        let index_buffer = match call.indices {
            Some(id) => {
                let native = self.buffer(id, BufferKind::Index)?;
                let needed = (call.first as usize + call.count as usize) * 2;
                if needed > native.len {
                    return Err(GpuError::SizeMismatch { what: "index buffer", expected: needed, got: native.len });
                }
                Some(&native.buffer)
            }
            None => None,
        };

        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let uniform_buffer = (uniform_size > 0).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("glimmer uniforms"),
                contents: call.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });
        let mut entries = Vec::with_capacity(1 + resources.len() * 2);
        if let Some(buffer) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() });
        }
        for (texture_binding, view, sampler_binding, sampler) in &resources {
            entries.push(wgpu::BindGroupEntry { binding: *texture_binding, resource: wgpu::BindingResource::TextureView(view) });
            entries.push(wgpu::BindGroupEntry { binding: *sampler_binding, resource: wgpu::BindingResource::Sampler(sampler) });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glimmer draw bindings"),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let range = call.first..call.first + call.count;
        self.submit_pass("glimmer draw", &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load, |pass| {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            for (slot, buffer) in vertex_buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            match index_buffer {
                Some(indices) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(range, 0, 0..1);
                }
                None => pass.draw(range, 0..1),
            }
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::Device(format!("draw with {}: {err}", call.program)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(buffer: u32, location: u32, format: VertexFormat, stride: u64, offset: u64) -> VertexBinding {
        VertexBinding { buffer: BufferId(buffer), location, format, stride, offset }
    }

    #[test]
    fn interleaved_attributes_share_one_slot() {
        let bindings = [
            binding(1, 0, VertexFormat::Float32x4, 32, 0),
            binding(2, 1, VertexFormat::Float32x2, 8, 0),
            binding(1, 2, VertexFormat::Float32x4, 32, 16),
        ];
        let (slots, buffers) = vertex_slots(&bindings);
        assert_eq!(buffers, vec![BufferId(1), BufferId(2)]);
        assert_eq!(slots[0].attributes, vec![(0, VertexFormat::Float32x4, 0), (2, VertexFormat::Float32x4, 16)]);
        assert_eq!(slots[1].stride, 8);
    }

    #[test]
    fn writes_are_widened_to_four_bytes() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(5), 8);
        assert_eq!(align4(8), 8);
        assert_eq!(6 & !3, 4);
    }
}
