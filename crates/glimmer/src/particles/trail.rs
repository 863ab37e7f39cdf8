use std::fmt;

use super::emitter::ParticleEmitter;
use super::spec::ParticleSpec;
use super::PerParticle;
use crate::error::ParticleError;
use crate::gpu::{Backend, TextureId};
use crate::math::{RandomSource, Vec3};

/// A fixed ring of particle slots filled on demand.
///
/// Every birth rolls `spec.num_particles` particles at the cursor, wrapping
/// to the start and overwriting the oldest slots once the ring is full.
///
/// ```text
///  capacity 5, 2 per birth
///
///  birth 1   [a a . . .]  cursor 2
///  birth 2   [a a b b .]  cursor 4
///  birth 3   [c a b b c]  cursor 1
/// ```
pub struct Trail {
    emitter: ParticleEmitter,
    capacity: usize,
    birth_index: usize,
    per_particle: Option<Box<PerParticle>>,
}

impl fmt::Debug for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trail")
            .field("emitter", &self.emitter)
            .field("capacity", &self.capacity)
            .field("birth_index", &self.birth_index)
            .field("per_particle", &self.per_particle.is_some())
            .finish()
    }
}

impl Trail {
    pub(crate) fn new(
        backend: &mut dyn Backend,
        capacity: usize,
        spec: ParticleSpec,
        texture: Option<TextureId>,
        per_particle: Option<Box<PerParticle>>,
    ) -> Result<Self, ParticleError> {
        if capacity == 0 {
            return Err(ParticleError::InvalidParameter {
                key: "capacity".into(),
                message: "a trail needs at least one slot".into(),
            });
        }
        let mut emitter = ParticleEmitter::new(texture);
        emitter.reserve(backend, capacity, spec)?;
        Ok(Self { emitter, capacity, birth_index: 0, per_particle })
    }

    pub fn emitter(&self) -> &ParticleEmitter {
        &self.emitter
    }

    /// Blend mode, translation and texture are set here.
    pub fn emitter_mut(&mut self) -> &mut ParticleEmitter {
        &mut self.emitter
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot the next birth starts at.
    pub fn birth_index(&self) -> usize {
        self.birth_index
    }

    /// Roll a batch born at `now` around `position`.
    pub(crate) fn birth_particles(
        &mut self,
        backend: &mut dyn Backend,
        rng: &mut dyn RandomSource,
        now: f32,
        position: Vec3,
    ) -> Result<(), ParticleError> {
        let mut spec = self.emitter.spec().clone();
        spec.start_time = Some(now);
        spec.position = position;

        let mut remaining = spec.num_particles;
        while self.birth_index + remaining >= self.capacity {
            let to_end = self.capacity - self.birth_index;
            self.emitter.create_particles(backend, rng, self.birth_index, to_end, &spec, self.per_particle.as_deref_mut())?;
            remaining -= to_end;
            self.birth_index = 0;
        }
        if remaining > 0 {
            self.emitter.create_particles(backend, rng, self.birth_index, remaining, &spec, self.per_particle.as_deref_mut())?;
            self.birth_index += remaining;
        }
        Ok(())
    }
}
