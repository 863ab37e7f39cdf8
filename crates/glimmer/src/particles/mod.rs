//! # Particles
//!
//! GPU-animated particles. Every particle is four corner records written
//! once; the vertex shader works out where each corner is from the clock,
//! so a running effect costs one uniform upload per draw and no CPU work.
//!
//! ```text
//!  ParticleSystem
//!   ├── programs      billboard + oriented (shared cache)
//!   ├── defaults      8x8 soft dot, 2x1 white→transparent ramp
//!   ├── clock, rng
//!   └── drawables     drawn in insertion order
//!        ├── Emitter ◄──── OneShot (replays the emitter's particles)
//!        ├── Trail         (owns a ring-buffer emitter)
//!        └── ...
//! ```
//!
//! Particles are not depth-sorted; draw order is creation order, and they
//! test against depth without writing it.
//!
//! ## Lifetime of One Particle
//!
//! ```text
//!  local_time   = (time - time_offset - start_time) mod time_range
//!  percent_life = local_time / life_time       outside [0, 1] → size 0
//!  position     = p0 + v·t + a·t²              v, a include world_*
//!  size         = mix(start_size, end_size, percent_life)
//!  colour       = ramp(percent_life) · color_mult · texture(frame)
//! ```

mod emitter;
mod one_shot;
mod spec;
mod trail;

use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;

pub use emitter::{CORNERS, MAX_PARTICLES, ParticleEmitter, ParticleVertex};
pub use one_shot::OneShot;
pub use spec::ParticleSpec;
pub use trail::Trail;

use crate::error::ParticleError;
use crate::gpu::{Backend, GpuResource, RenderTarget, Texture, Texture2D, TextureId};
use crate::math::convention::{RowMajor, mul4};
use crate::math::{Mat4, RandomSource, Vec3};
use crate::shader::{Program, ProgramCache};
use crate::time::{Clock, SystemClock};

const BILLBOARD_VS: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/billboard.wgsl"));
const ORIENTED_VS: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/oriented.wgsl"));
const PARTICLE_FS: &str = include_str!("shaders/particle_fs.wgsl");

/// Called with each particle's index before it is rolled; edits to the
/// spec carry over to the following particles.
pub type PerParticle = dyn FnMut(usize, &mut ParticleSpec);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmitterId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OneShotId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrailId(usize);

enum Drawable {
    Emitter(ParticleEmitter),
    OneShot(OneShot),
    Trail(Trail),
}

/// Everything an emitter needs from the system for one draw.
pub(crate) struct FrameState<'a> {
    pub target: RenderTarget,
    pub view_projection: Mat4,
    pub view_inverse: Mat4,
    pub time: f32,
    pub billboard: &'a Program,
    pub oriented: &'a Program,
    pub default_color: TextureId,
    pub default_ramp: TextureId,
}

/// Owns every particle effect of a scene and draws them together.
pub struct ParticleSystem {
    billboard: Rc<Program>,
    oriented: Rc<Program>,
    default_color: Texture2D,
    default_ramp: Texture2D,
    clock: Box<dyn Clock>,
    rng: Box<dyn RandomSource>,
    drawables: Vec<Drawable>,
}

impl ParticleSystem {
    /// A system on the wall clock with an entropy-seeded generator.
    pub fn new(backend: &mut dyn Backend, programs: &mut ProgramCache) -> Result<Self, ParticleError> {
        Self::with_sources(backend, programs, SystemClock::new(), StdRng::from_os_rng())
    }

    /// A system with an explicit time source and random source, e.g. a
    /// [`ManualClock`](crate::time::ManualClock) and a seeded
    /// [`PseudoRandom`](crate::math::PseudoRandom) for reproducible runs.
    pub fn with_sources(
        backend: &mut dyn Backend,
        programs: &mut ProgramCache,
        clock: impl Clock + 'static,
        rng: impl RandomSource + 'static,
    ) -> Result<Self, ParticleError> {
        let billboard = programs.get_or_create(backend, BILLBOARD_VS, PARTICLE_FS)?;
        let oriented = programs.get_or_create(backend, ORIENTED_VS, PARTICLE_FS)?;

        const FALLOFF: [f32; 8] = [0.0, 0.2, 0.7, 1.0, 0.7, 0.2, 0.0, 0.0];
        let dot: Vec<f32> = FALLOFF
            .iter()
            .flat_map(|y| FALLOFF.iter().flat_map(move |x| [x * y; 4]))
            .collect();
        let default_color = Texture2D::from_floats(backend, 8, 8, &dot)?;
        default_color.set_parameters(backend, emitter::ramp_sampler())?;
        let default_ramp = Texture2D::from_floats(backend, 2, 1, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0])?;
        default_ramp.set_parameters(backend, emitter::ramp_sampler())?;

        Ok(Self {
            billboard,
            oriented,
            default_color,
            default_ramp,
            clock: Box::new(clock),
            rng: Box::new(rng),
            drawables: Vec::new(),
        })
    }

    /// Current time on the system's clock.
    pub fn now(&self) -> f32 {
        self.clock.now()
    }

    /// Number of emitters, one-shots and trails.
    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    /// An emitter with no particles yet. `texture` overrides the default
    /// soft dot.
    pub fn create_emitter(&mut self, texture: Option<TextureId>) -> EmitterId {
        self.drawables.push(Drawable::Emitter(ParticleEmitter::new(texture)));
        EmitterId(self.drawables.len() - 1)
    }

    pub fn emitter(&self, id: EmitterId) -> Result<&ParticleEmitter, ParticleError> {
        match self.drawables.get(id.0) {
            Some(Drawable::Emitter(e)) => Ok(e),
            _ => Err(ParticleError::UnknownHandle(id.0)),
        }
    }

    pub fn emitter_mut(&mut self, id: EmitterId) -> Result<&mut ParticleEmitter, ParticleError> {
        match self.drawables.get_mut(id.0) {
            Some(Drawable::Emitter(e)) => Ok(e),
            _ => Err(ParticleError::UnknownHandle(id.0)),
        }
    }

    /// Reallocate and reroll every particle of an emitter.
    pub fn set_parameters(
        &mut self,
        backend: &mut dyn Backend,
        id: EmitterId,
        spec: ParticleSpec,
        per_particle: Option<&mut PerParticle>,
    ) -> Result<(), ParticleError> {
        let emitter = match self.drawables.get_mut(id.0) {
            Some(Drawable::Emitter(e)) => e,
            _ => return Err(ParticleError::UnknownHandle(id.0)),
        };
        emitter.set_parameters(backend, self.rng.as_mut(), spec, per_particle)
    }

    /// Colour over life as RGBA floats, four per texel.
    pub fn set_color_ramp(&mut self, backend: &mut dyn Backend, id: EmitterId, colors: &[f32]) -> Result<(), ParticleError> {
        self.emitter_mut(id)?.set_color_ramp(backend, colors)
    }

    /// A hidden one-shot replaying `emitter`'s particles. From now on the
    /// emitter itself is drawn only through its one-shots.
    pub fn create_one_shot(&mut self, emitter: EmitterId) -> Result<OneShotId, ParticleError> {
        self.emitter_mut(emitter)?.mark_one_shot_template();
        self.drawables.push(Drawable::OneShot(OneShot::new(emitter)));
        Ok(OneShotId(self.drawables.len() - 1))
    }

    pub fn one_shot(&self, id: OneShotId) -> Result<&OneShot, ParticleError> {
        match self.drawables.get(id.0) {
            Some(Drawable::OneShot(s)) => Ok(s),
            _ => Err(ParticleError::UnknownHandle(id.0)),
        }
    }

    fn one_shot_mut(&mut self, id: OneShotId) -> Result<&mut OneShot, ParticleError> {
        match self.drawables.get_mut(id.0) {
            Some(Drawable::OneShot(s)) => Ok(s),
            _ => Err(ParticleError::UnknownHandle(id.0)),
        }
    }

    /// Restart a one-shot now, at `world` with its translation replaced by
    /// `position` when given.
    pub fn trigger(&mut self, id: OneShotId, position: Option<Vec3>, world: Option<Mat4>) -> Result<(), ParticleError> {
        let now = self.clock.now();
        self.one_shot_mut(id)?.trigger(now, position, world);
        Ok(())
    }

    pub fn hide(&mut self, id: OneShotId) -> Result<(), ParticleError> {
        self.one_shot_mut(id)?.hide();
        Ok(())
    }

    /// A trail of `capacity` slots; each birth rolls `spec.num_particles`.
    pub fn create_trail(
        &mut self,
        backend: &mut dyn Backend,
        capacity: usize,
        spec: ParticleSpec,
        texture: Option<TextureId>,
        per_particle: Option<Box<PerParticle>>,
    ) -> Result<TrailId, ParticleError> {
        let trail = Trail::new(backend, capacity, spec, texture, per_particle)?;
        self.drawables.push(Drawable::Trail(trail));
        Ok(TrailId(self.drawables.len() - 1))
    }

    pub fn trail(&self, id: TrailId) -> Result<&Trail, ParticleError> {
        match self.drawables.get(id.0) {
            Some(Drawable::Trail(t)) => Ok(t),
            _ => Err(ParticleError::UnknownHandle(id.0)),
        }
    }

    pub fn trail_mut(&mut self, id: TrailId) -> Result<&mut Trail, ParticleError> {
        match self.drawables.get_mut(id.0) {
            Some(Drawable::Trail(t)) => Ok(t),
            _ => Err(ParticleError::UnknownHandle(id.0)),
        }
    }

    /// Emit a batch from a trail at `position`, born now.
    pub fn birth_particles(&mut self, backend: &mut dyn Backend, id: TrailId, position: Vec3) -> Result<(), ParticleError> {
        let now = self.clock.now();
        let trail = match self.drawables.get_mut(id.0) {
            Some(Drawable::Trail(t)) => t,
            _ => return Err(ParticleError::UnknownHandle(id.0)),
        };
        trail.birth_particles(backend, self.rng.as_mut(), now, position)
    }

    /// Draw every effect in creation order.
    pub fn draw(
        &self,
        backend: &mut dyn Backend,
        target: RenderTarget,
        view_projection: Mat4,
        world: Mat4,
        view_inverse: Mat4,
    ) -> Result<(), ParticleError> {
        let frame = FrameState {
            target,
            view_projection,
            view_inverse,
            time: self.clock.now(),
            billboard: &self.billboard,
            oriented: &self.oriented,
            default_color: self.default_color.id(),
            default_ramp: self.default_ramp.id(),
        };
        for drawable in &self.drawables {
            match drawable {
                Drawable::Emitter(e) if !e.is_one_shot_template() => e.draw(backend, &frame, world, 0.0)?,
                Drawable::Emitter(_) => {}
                Drawable::OneShot(shot) if shot.is_visible() => {
                    let emitter = self.emitter(shot.emitter())?;
                    emitter.draw(backend, &frame, mul4::<RowMajor>(shot.world(), world), shot.time_offset())?;
                }
                Drawable::OneShot(_) => {}
                Drawable::Trail(t) => t.emitter().draw(backend, &frame, world, 0.0)?,
            }
        }
        Ok(())
    }

    /// Rebuild programs, default textures and every emitter's buffers after
    /// the backend restored its context.
    pub fn recover_from_lost_context(&self, backend: &mut dyn Backend) -> Result<(), ParticleError> {
        self.billboard.recover_from_lost_context(backend)?;
        self.oriented.recover_from_lost_context(backend)?;
        self.default_color.recover_from_lost_context(backend)?;
        self.default_ramp.recover_from_lost_context(backend)?;
        for drawable in &self.drawables {
            match drawable {
                Drawable::Emitter(e) => e.recover_from_lost_context(backend)?,
                Drawable::Trail(t) => t.emitter().recover_from_lost_context(backend)?,
                Drawable::OneShot(_) => {}
            }
        }
        log::info!("recovered {} particle drawables", self.drawables.len());
        Ok(())
    }

    /// Release every GPU object the system created. Programs stay in the
    /// cache they came from.
    pub fn delete(mut self, backend: &mut dyn Backend) {
        for drawable in &mut self.drawables {
            match drawable {
                Drawable::Emitter(e) => e.delete(backend),
                Drawable::Trail(t) => t.emitter_mut().delete(backend),
                Drawable::OneShot(_) => {}
            }
        }
        self.default_color.delete(backend);
        self.default_ramp.delete(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{BlendMode, HeadlessBackend};
    use crate::math::PseudoRandom;
    use crate::math::matrix::identity4;
    use crate::math::transform::translation;
    use crate::time::ManualClock;

    fn setup() -> (HeadlessBackend, ParticleSystem, ManualClock) {
        let mut backend = HeadlessBackend::default();
        let mut cache = ProgramCache::new();
        let clock = ManualClock::new(0.0);
        let system =
            ParticleSystem::with_sources(&mut backend, &mut cache, clock.clone(), PseudoRandom::with_seed(1)).unwrap();
        (backend, system, clock)
    }

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn uniform(backend: &HeadlessBackend, draw: usize, name: &str, index: usize) -> f32 {
        let record = &backend.draws()[draw];
        let layout = backend.program_layout(record.program).unwrap();
        let offset = layout.uniform(name).unwrap().offset as usize;
        read_f32(&record.uniforms, offset + index * 4)
    }

    fn draw(backend: &mut HeadlessBackend, system: &ParticleSystem) {
        system
            .draw(backend, RenderTarget::Default, identity4(), identity4(), identity4())
            .unwrap();
    }

    #[test]
    fn forty_particles_make_160_records_and_240_indices() {
        let (mut backend, mut system, _) = setup();
        let id = system.create_emitter(None);
        let spec = ParticleSpec { num_particles: 40, ..Default::default() };
        system.set_parameters(&mut backend, id, spec, None).unwrap();

        let emitter = system.emitter(id).unwrap();
        let vertices = emitter.vertex_buffer().unwrap();
        assert_eq!(vertices.byte_len(), 160 * 112);
        assert_eq!(backend.buffer_data(vertices.id()).unwrap().len(), 17_920);
        assert_eq!(emitter.index_buffer().unwrap().byte_len(), 240 * 2);

        draw(&mut backend, &system);
        let record = &backend.draws()[0];
        assert_eq!(record.count, 240);
        assert!(record.indexed);
        assert_eq!(record.blend, BlendMode::Alpha);
    }

    #[test]
    fn more_than_max_particles_is_rejected() {
        let (mut backend, mut system, _) = setup();
        let id = system.create_emitter(None);
        let spec = ParticleSpec { num_particles: MAX_PARTICLES + 1, ..Default::default() };
        let err = system.set_parameters(&mut backend, id, spec, None).unwrap_err();
        assert!(matches!(err, ParticleError::TooManyParticles { requested: 10_923, max: 10_922 }));
        assert_eq!(system.emitter(id).unwrap().num_particles(), 0);
    }

    #[test]
    fn emitters_without_parameters_draw_nothing() {
        let (mut backend, mut system, _) = setup();
        system.create_emitter(None);
        draw(&mut backend, &system);
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn retriggering_a_one_shot_keeps_only_the_latest() {
        let (mut backend, mut system, clock) = setup();
        let emitter = system.create_emitter(None);
        system.set_parameters(&mut backend, emitter, ParticleSpec::default(), None).unwrap();
        let shot = system.create_one_shot(emitter).unwrap();

        draw(&mut backend, &system);
        assert!(backend.draws().is_empty(), "template and untriggered shot stay hidden");

        clock.set(2.0);
        system.trigger(shot, Some([1.0, 2.0, 3.0]), None).unwrap();
        clock.set(5.0);
        system.trigger(shot, Some([4.0, 5.0, 6.0]), None).unwrap();
        draw(&mut backend, &system);

        assert_eq!(backend.draws().len(), 1);
        assert_eq!(uniform(&backend, 0, "time_offset", 0), 5.0);
        assert_eq!(uniform(&backend, 0, "time", 0), 5.0);
        let placed: Vec<f32> = (12..15).map(|i| uniform(&backend, 0, "world", i)).collect();
        assert_eq!(placed, vec![4.0, 5.0, 6.0]);

        system.trigger(shot, None, Some(translation([7.0, 0.0, 0.0]))).unwrap();
        backend.take_draws();
        draw(&mut backend, &system);
        assert_eq!(uniform(&backend, 0, "world", 12), 7.0);
        assert_eq!(uniform(&backend, 0, "world", 13), 0.0);
    }

    #[test]
    fn emitter_translation_is_applied_before_world() {
        let (mut backend, mut system, _) = setup();
        let id = system.create_emitter(None);
        system.set_parameters(&mut backend, id, ParticleSpec::default(), None).unwrap();
        system.emitter_mut(id).unwrap().set_translation([1.0, 0.0, 0.0]);
        system
            .draw(&mut backend, RenderTarget::Default, identity4(), translation([0.0, 2.0, 0.0]), identity4())
            .unwrap();
        assert_eq!(uniform(&backend, 0, "world", 12), 1.0);
        assert_eq!(uniform(&backend, 0, "world", 13), 2.0);
    }

    #[test]
    fn trail_births_wrap_around_the_ring() {
        let (mut backend, mut system, clock) = setup();
        let spec = ParticleSpec { num_particles: 2, ..Default::default() };
        let id = system.create_trail(&mut backend, 5, spec, None, None).unwrap();

        for (t, x) in [(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)] {
            clock.set(t);
            system.birth_particles(&mut backend, id, [x, 0.0, 0.0]).unwrap();
        }
        let trail = system.trail(id).unwrap();
        assert_eq!(trail.birth_index(), 1);

        let data = backend.buffer_data(trail.emitter().vertex_buffer().unwrap().id()).unwrap();
        let particle = |i: usize| {
            let base = i * 4 * 112 + 16;
            (read_f32(data, base), read_f32(data, base + 12))
        };
        assert_eq!(particle(0), (30.0, 3.0));
        assert_eq!(particle(1), (10.0, 1.0));
        assert_eq!(particle(2), (20.0, 2.0));
        assert_eq!(particle(3), (20.0, 2.0));
        assert_eq!(particle(4), (30.0, 3.0));
    }

    #[test]
    fn filling_the_ring_exactly_wraps_the_cursor() {
        let (mut backend, mut system, _) = setup();
        let spec = ParticleSpec { num_particles: 3, ..Default::default() };
        let id = system.create_trail(&mut backend, 3, spec, None, None).unwrap();
        system.birth_particles(&mut backend, id, [0.0; 3]).unwrap();
        assert_eq!(system.trail(id).unwrap().birth_index(), 0);
    }

    #[test]
    fn drawables_draw_in_creation_order() {
        let (mut backend, mut system, _) = setup();
        let a = system.create_emitter(None);
        system
            .set_parameters(&mut backend, a, ParticleSpec { num_particles: 3, ..Default::default() }, None)
            .unwrap();
        system
            .create_trail(&mut backend, 7, ParticleSpec::default(), None, None)
            .unwrap();
        let b = system.create_emitter(None);
        system
            .set_parameters(&mut backend, b, ParticleSpec { num_particles: 5, billboard: false, ..Default::default() }, None)
            .unwrap();

        draw(&mut backend, &system);
        let counts: Vec<u32> = backend.draws().iter().map(|d| d.count).collect();
        assert_eq!(counts, vec![18, 42, 30]);
        assert_ne!(backend.draws()[0].program, backend.draws()[2].program);
    }

    #[test]
    fn color_ramp_replaces_the_default() {
        let (mut backend, mut system, _) = setup();
        let id = system.create_emitter(None);
        system.set_parameters(&mut backend, id, ParticleSpec::default(), None).unwrap();
        assert!(matches!(
            system.set_color_ramp(&mut backend, id, &[1.0, 0.0, 0.0]),
            Err(ParticleError::InvalidParameter { .. })
        ));
        system
            .set_color_ramp(&mut backend, id, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0])
            .unwrap();
        draw(&mut backend, &system);

        let ramp = system.emitter(id).unwrap().ramp_texture().unwrap();
        let bound: Vec<_> = backend.draws()[0].textures.iter().map(|t| (t.binding, t.texture)).collect();
        assert!(bound.contains(&(1, ramp)));
        assert_eq!(backend.texture_desc(ramp).unwrap().width, 3);
    }

    #[test]
    fn wrong_handles_are_reported() {
        let (_, mut system, _) = setup();
        let emitter = system.create_emitter(None);
        let shot = system.create_one_shot(emitter).unwrap();
        assert!(matches!(system.emitter(EmitterId(shot.0)), Err(ParticleError::UnknownHandle(1))));
        assert!(matches!(system.trigger(OneShotId(9), None, None), Err(ParticleError::UnknownHandle(9))));
    }

    #[test]
    fn recovery_rebuilds_everything() {
        let (mut backend, mut system, _) = setup();
        let id = system.create_emitter(None);
        system
            .set_parameters(&mut backend, id, ParticleSpec { num_particles: 4, ..Default::default() }, None)
            .unwrap();
        system
            .create_trail(&mut backend, 4, ParticleSpec::default(), None, None)
            .unwrap();
        let (buffers, textures) = (backend.num_buffers(), backend.num_textures());

        backend.lose_context();
        assert!(
            system
                .draw(&mut backend, RenderTarget::Default, identity4(), identity4(), identity4())
                .is_err()
        );
        backend.restore_context().unwrap();
        system.recover_from_lost_context(&mut backend).unwrap();
        assert_eq!(backend.num_buffers(), buffers);
        assert_eq!(backend.num_textures(), textures);
        draw(&mut backend, &system);
        assert_eq!(backend.draws().len(), 2);
    }
}
