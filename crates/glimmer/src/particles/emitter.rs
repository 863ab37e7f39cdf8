use bytemuck::{Pod, Zeroable};

use super::spec::ParticleSpec;
use super::{FrameState, PerParticle};
use crate::error::{GpuError, ParticleError};
use crate::gpu::{
    Backend, BlendMode, Buffer, BufferKind, DepthState, DrawCall, GpuResource, Primitive, SamplerParams, Texture,
    Texture2D, TextureId, VertexBinding, VertexFormat, Wrap,
};
use crate::math::convention::{RowMajor, compose4, mul4};
use crate::math::transform::translation;
use crate::math::{Mat4, RandomSource, Vec3};

/// Quad corners in particle space, in the order the index pattern expects.
pub const CORNERS: [[f32; 2]; 4] = [[-0.5, -0.5], [0.5, -0.5], [0.5, 0.5], [-0.5, 0.5]];

const CORNER_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Six 16-bit indices per particle must stay addressable.
pub const MAX_PARTICLES: usize = 65_536 / CORNER_INDICES.len();

/// One corner of one particle, as the vertex shaders read it.
///
/// Seven `vec4`s at locations 0 to 6, interleaved in a single buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub uv_lifetime_frame_start: [f32; 4],
    pub position_start_time: [f32; 4],
    pub velocity_start_size: [f32; 4],
    pub acceleration_end_size: [f32; 4],
    pub spin_start_spin_speed: [f32; 4],
    pub orientation: [f32; 4],
    pub color_mult: [f32; 4],
}

const ATTRIBUTES: u32 = 7;
const STRIDE: usize = std::mem::size_of::<ParticleVertex>();

fn plus_minus3(rng: &mut dyn RandomSource, v: Vec3, range: Vec3) -> Vec3 {
    std::array::from_fn(|i| v[i] + rng.plus_minus(range[i]))
}

/// Corner records for `count` particles.
///
/// `per_particle` sees the particle index and may edit the `ParticleSpec`
/// before that particle is rolled; edits carry over to later particles.
pub(crate) fn generate(
    rng: &mut dyn RandomSource,
    count: usize,
    spec: &ParticleSpec,
    mut per_particle: Option<&mut PerParticle>,
) -> Vec<ParticleVertex> {
    let mut params = spec.clone();
    let mut records = Vec::with_capacity(count * CORNERS.len());
    for i in 0..count {
        if let Some(f) = per_particle.as_deref_mut() {
            f(i, &mut params);
        }
        let p = &params;
        let life_time = p.life_time + rng.plus_minus(p.life_time_range);
        let start_time = p.start_time.unwrap_or(i as f32 * p.life_time / count as f32);
        let frame_start = p.frame_start + rng.plus_minus(p.frame_start_range);
        let position = plus_minus3(rng, p.position, p.position_range);
        let velocity = plus_minus3(rng, p.velocity, p.velocity_range);
        let acceleration = plus_minus3(rng, p.acceleration, p.acceleration_range);
        let color_mult: [f32; 4] = std::array::from_fn(|c| p.color_mult[c] + rng.plus_minus(p.color_mult_range[c]));
        let spin_start = p.spin_start + rng.plus_minus(p.spin_start_range);
        let spin_speed = p.spin_speed + rng.plus_minus(p.spin_speed_range);
        let start_size = p.start_size + rng.plus_minus(p.start_size_range);
        let end_size = p.end_size + rng.plus_minus(p.end_size_range);

        for [cu, cv] in CORNERS {
            records.push(ParticleVertex {
                uv_lifetime_frame_start: [cu, cv, life_time, frame_start],
                position_start_time: [position[0], position[1], position[2], start_time],
                velocity_start_size: [velocity[0], velocity[1], velocity[2], start_size],
                acceleration_end_size: [acceleration[0], acceleration[1], acceleration[2], end_size],
                spin_start_spin_speed: [spin_start, spin_speed, 0.0, 0.0],
                orientation: p.orientation,
                color_mult,
            });
        }
    }
    records
}

/// A slot nothing has been born into yet: zero size for its whole life, so
/// it collapses to a point.
fn dormant([u, v]: [f32; 2]) -> ParticleVertex {
    ParticleVertex { uv_lifetime_frame_start: [u, v, 1.0, 0.0], ..Default::default() }
}

/// Two triangles per particle over its four corners.
pub(crate) fn quad_indices(num_particles: usize) -> Vec<u16> {
    (0..num_particles)
        .flat_map(|i| CORNER_INDICES.map(|c| (i * CORNERS.len()) as u16 + c))
        .collect()
}

#[derive(Debug)]
struct Geometry {
    vertices: Buffer,
    indices: Buffer,
    num_particles: usize,
}

/// A block of particles sharing one spec, texture and blend mode.
///
/// Created through [`ParticleSystem::create_emitter`](super::ParticleSystem::create_emitter);
/// nothing is drawn until parameters are set.
#[derive(Debug)]
pub struct ParticleEmitter {
    spec: ParticleSpec,
    texture: Option<TextureId>,
    ramp: Option<Texture2D>,
    blend: BlendMode,
    translation: Vec3,
    geometry: Option<Geometry>,
    /// Only drawn through its one-shots.
    one_shot_template: bool,
}

impl ParticleEmitter {
    pub(crate) fn new(texture: Option<TextureId>) -> Self {
        Self {
            spec: ParticleSpec::default(),
            texture,
            ramp: None,
            blend: BlendMode::Alpha,
            translation: [0.0; 3],
            geometry: None,
            one_shot_template: false,
        }
    }

    /// The `ParticleSpec` last passed to `set_parameters`.
    pub fn spec(&self) -> &ParticleSpec {
        &self.spec
    }

    /// Allocated particle slots; zero before parameters are set.
    pub fn num_particles(&self) -> usize {
        self.geometry.as_ref().map_or(0, |g| g.num_particles)
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn set_blend(&mut self, blend: BlendMode) {
        self.blend = blend;
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// Offset applied before the world matrix handed to draw.
    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Colour texture; `None` uses the system's soft dot.
    pub fn set_texture(&mut self, texture: Option<TextureId>) {
        self.texture = texture;
    }

    pub fn vertex_buffer(&self) -> Option<&Buffer> {
        self.geometry.as_ref().map(|g| &g.vertices)
    }

    pub fn index_buffer(&self) -> Option<&Buffer> {
        self.geometry.as_ref().map(|g| &g.indices)
    }

    /// Whether one-shots have been made from this emitter, which stops it
    /// drawing on its own.
    pub fn is_one_shot_template(&self) -> bool {
        self.one_shot_template
    }

    pub(crate) fn mark_one_shot_template(&mut self) {
        self.one_shot_template = true;
    }

    pub(crate) fn ramp_texture(&self) -> Option<TextureId> {
        self.ramp.as_ref().map(|r| r.id())
    }

    /// Replace the colour-over-life ramp with RGBA floats, one texel per
    /// four values.
    pub(crate) fn set_color_ramp(&mut self, backend: &mut dyn Backend, colors: &[f32]) -> Result<(), ParticleError> {
        if colors.is_empty() || colors.len() % 4 != 0 {
            return Err(ParticleError::InvalidParameter {
                key: "color_ramp".into(),
                message: format!("{} values is not a whole number of RGBA texels", colors.len()),
            });
        }
        let ramp = Texture2D::from_floats(backend, (colors.len() / 4) as u32, 1, colors)?;
        ramp.set_parameters(backend, ramp_sampler())?;
        if let Some(old) = self.ramp.replace(ramp) {
            old.delete(backend);
        }
        Ok(())
    }

    /// Make room for `num_particles`, reusing the buffers when the count is
    /// unchanged.
    pub(crate) fn allocate(&mut self, backend: &mut dyn Backend, num_particles: usize) -> Result<(), ParticleError> {
        if num_particles > MAX_PARTICLES {
            return Err(ParticleError::TooManyParticles { requested: num_particles, max: MAX_PARTICLES });
        }
        if self.num_particles() == num_particles {
            return Ok(());
        }
        if let Some(old) = self.geometry.take() {
            old.vertices.delete(backend);
            old.indices.delete(backend);
        }
        let slots: Vec<ParticleVertex> = (0..num_particles).flat_map(|_| CORNERS.map(dormant)).collect();
        let vertices = Buffer::from_bytes(backend, BufferKind::Vertex, bytemuck::cast_slice(&slots))?;
        let indices = Buffer::from_bytes(backend, BufferKind::Index, bytemuck::cast_slice(&quad_indices(num_particles)))?;
        log::debug!("allocated {num_particles} particles in {}", vertices.id());
        self.geometry = Some(Geometry { vertices, indices, num_particles });
        Ok(())
    }

    /// Roll `count` particles into the slots starting at `first`.
    pub(crate) fn create_particles(
        &self,
        backend: &mut dyn Backend,
        rng: &mut dyn RandomSource,
        first: usize,
        count: usize,
        spec: &ParticleSpec,
        per_particle: Option<&mut PerParticle>,
    ) -> Result<(), ParticleError> {
        let geometry = self.geometry.as_ref().ok_or_else(|| GpuError::Unsupported("emitter has no particles".into()))?;
        if first + count > geometry.num_particles {
            return Err(GpuError::SizeMismatch {
                what: "particle range",
                expected: geometry.num_particles,
                got: first + count,
            }
            .into());
        }
        let records = generate(rng, count, spec, per_particle);
        geometry.vertices.set_range(backend, first * CORNERS.len() * STRIDE, bytemuck::cast_slice(&records))?;
        Ok(())
    }

    /// Adopt `spec` for drawing and allocate `capacity` dormant slots without
    /// rolling any particles.
    pub(crate) fn reserve(
        &mut self,
        backend: &mut dyn Backend,
        capacity: usize,
        spec: ParticleSpec,
    ) -> Result<(), ParticleError> {
        spec.validate()?;
        self.allocate(backend, capacity)?;
        self.spec = spec;
        Ok(())
    }

    pub(crate) fn set_parameters(
        &mut self,
        backend: &mut dyn Backend,
        rng: &mut dyn RandomSource,
        spec: ParticleSpec,
        per_particle: Option<&mut PerParticle>,
    ) -> Result<(), ParticleError> {
        self.reserve(backend, spec.num_particles, spec)?;
        let n = self.spec.num_particles;
        self.create_particles(backend, rng, 0, n, &self.spec, per_particle)
    }

    pub(crate) fn draw(
        &self,
        backend: &mut dyn Backend,
        frame: &FrameState<'_>,
        world: Mat4,
        time_offset: f32,
    ) -> Result<(), ParticleError> {
        let Some(geometry) = &self.geometry else {
            return Ok(());
        };
        let program = if self.spec.billboard { frame.billboard } else { frame.oriented };
        let world = compose4::<RowMajor>(translation(self.translation), world);
        let spec = &self.spec;

        let mut block = program.uniform_block();
        program.set_uniform(&mut block, "world_view_projection", mul4::<RowMajor>(world, frame.view_projection))?;
        program.set_uniform(&mut block, "view_projection", frame.view_projection)?;
        program.set_uniform(&mut block, "world", world)?;
        program.set_uniform(&mut block, "view_inverse", frame.view_inverse)?;
        program.set_uniform(&mut block, "world_velocity", spec.world_velocity)?;
        program.set_uniform(&mut block, "world_acceleration", spec.world_acceleration)?;
        program.set_uniform(&mut block, "num_frames", spec.num_frames)?;
        program.set_uniform(&mut block, "frame_duration", spec.frame_duration)?;
        program.set_uniform(&mut block, "time", frame.time)?;
        program.set_uniform(&mut block, "time_range", spec.time_range)?;
        program.set_uniform(&mut block, "time_offset", time_offset)?;
        program.set_uniform(&mut block, "color_texture", self.texture.unwrap_or(frame.default_color))?;
        program.set_uniform(&mut block, "ramp_texture", self.ramp_texture().unwrap_or(frame.default_ramp))?;

        let buffer = geometry.vertices.id();
        let bindings: Vec<VertexBinding> = (0..ATTRIBUTES)
            .map(|location| VertexBinding {
                buffer,
                location,
                format: VertexFormat::Float32x4,
                stride: STRIDE as u64,
                offset: location as u64 * 16,
            })
            .collect();

        backend.draw(&DrawCall {
            target: frame.target,
            program: program.id(),
            vertices: &bindings,
            indices: Some(geometry.indices.id()),
            primitive: Primitive::Triangles,
            count: (geometry.num_particles * CORNER_INDICES.len()) as u32,
            first: 0,
            uniforms: block.as_bytes(),
            textures: block.textures(),
            blend: self.blend,
            depth: DepthState { test: true, write: false },
        })?;
        Ok(())
    }

    pub(crate) fn delete(&mut self, backend: &mut dyn Backend) {
        if let Some(geometry) = self.geometry.take() {
            geometry.vertices.delete(backend);
            geometry.indices.delete(backend);
        }
        if let Some(ramp) = self.ramp.take() {
            ramp.delete(backend);
        }
    }
}

impl GpuResource for ParticleEmitter {
    fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), GpuError> {
        if let Some(geometry) = &self.geometry {
            geometry.vertices.recover_from_lost_context(backend)?;
            geometry.indices.recover_from_lost_context(backend)?;
        }
        if let Some(ramp) = &self.ramp {
            ramp.recover_from_lost_context(backend)?;
        }
        Ok(())
    }
}

/// Ramps are sampled across their width only and must not wrap.
pub(crate) fn ramp_sampler() -> SamplerParams {
    SamplerParams { wrap_s: Wrap::ClampToEdge, wrap_t: Wrap::ClampToEdge, ..SamplerParams::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PseudoRandom;

    #[test]
    fn records_are_112_bytes() {
        assert_eq!(STRIDE, 112);
        assert_eq!(MAX_PARTICLES, 10_922);
    }

    #[test]
    fn indices_follow_the_quad_pattern() {
        assert_eq!(quad_indices(2), vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
        assert_eq!(quad_indices(MAX_PARTICLES).last(), Some(&((MAX_PARTICLES * 4 - 1) as u16)));
    }

    #[test]
    fn unset_start_time_staggers_births_over_one_life() {
        let spec = ParticleSpec { num_particles: 4, life_time: 2.0, ..Default::default() };
        let records = generate(&mut PseudoRandom::new(), 4, &spec, None);
        let starts: Vec<f32> = records.iter().step_by(4).map(|r| r.position_start_time[3]).collect();
        assert_eq!(starts, vec![0.0, 0.5, 1.0, 1.5]);
        for (corner, record) in CORNERS.iter().zip(&records) {
            assert_eq!(&record.uv_lifetime_frame_start[..2], corner);
        }
    }

    #[test]
    fn ranges_stay_within_bounds() {
        let spec = ParticleSpec {
            num_particles: 200,
            start_time: Some(3.0),
            velocity: [0.0, 5.0, 0.0],
            velocity_range: [1.0, 0.0, 1.0],
            start_size: 2.0,
            start_size_range: 0.5,
            ..Default::default()
        };
        let records = generate(&mut PseudoRandom::with_seed(7), 200, &spec, None);
        for particle in records.chunks(4) {
            let first = particle[0];
            assert!(particle.iter().all(|c| c.velocity_start_size == first.velocity_start_size));
            let [vx, vy, vz, size] = first.velocity_start_size;
            assert!(vx.abs() <= 1.0 && vz.abs() <= 1.0);
            assert_eq!(vy, 5.0);
            assert!((1.5..=2.5).contains(&size));
            assert_eq!(first.position_start_time[3], 3.0);
        }
    }

    #[test]
    fn per_particle_edits_carry_forward() {
        let spec = ParticleSpec { num_particles: 3, ..Default::default() };
        let mut bump = |i: usize, p: &mut ParticleSpec| {
            if i == 1 {
                p.position = [9.0, 0.0, 0.0];
            }
        };
        let records = generate(&mut PseudoRandom::new(), 3, &spec, Some(&mut bump));
        let xs: Vec<f32> = records.iter().step_by(4).map(|r| r.position_start_time[0]).collect();
        assert_eq!(xs, vec![0.0, 9.0, 9.0]);
    }
}
