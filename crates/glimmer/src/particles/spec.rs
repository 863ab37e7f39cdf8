use serde::{Deserialize, Serialize};

use crate::error::ParticleError;
use crate::math::{Quat, Vec3, Vec4};

/// How an emitter spawns its particles.
///
/// Every `*_range` field randomises its partner: each particle draws
/// `value + (random - 0.5) * 2 * range` per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticleSpec {
    pub num_particles: usize,
    /// Frames in the texture strip; the colour texture is split
    /// horizontally into this many cells.
    pub num_frames: f32,
    /// Seconds each frame shows.
    pub frame_duration: f32,
    pub frame_start: f32,
    pub frame_start_range: f32,
    /// Period after which particles are reborn.
    pub time_range: f32,
    /// Birth time for every particle; `None` staggers births over one
    /// lifetime.
    pub start_time: Option<f32>,
    pub life_time: f32,
    pub life_time_range: f32,
    pub start_size: f32,
    pub start_size_range: f32,
    pub end_size: f32,
    pub end_size_range: f32,
    pub position: Vec3,
    pub position_range: Vec3,
    pub velocity: Vec3,
    pub velocity_range: Vec3,
    pub acceleration: Vec3,
    pub acceleration_range: Vec3,
    pub spin_start: f32,
    pub spin_start_range: f32,
    pub spin_speed: f32,
    pub spin_speed_range: f32,
    pub color_mult: Vec4,
    pub color_mult_range: Vec4,
    /// Added to every particle's velocity in world space.
    pub world_velocity: Vec3,
    pub world_acceleration: Vec3,
    /// Face the camera. When false, particles lie in their local XZ plane
    /// rotated by `orientation`.
    pub billboard: bool,
    pub orientation: Quat,
}

impl Default for ParticleSpec {
    fn default() -> Self {
        Self {
            num_particles: 1,
            num_frames: 1.0,
            frame_duration: 1.0,
            frame_start: 0.0,
            frame_start_range: 0.0,
            time_range: 99_999_999.0,
            start_time: None,
            life_time: 1.0,
            life_time_range: 0.0,
            start_size: 1.0,
            start_size_range: 0.0,
            end_size: 1.0,
            end_size_range: 0.0,
            position: [0.0; 3],
            position_range: [0.0; 3],
            velocity: [0.0; 3],
            velocity_range: [0.0; 3],
            acceleration: [0.0; 3],
            acceleration_range: [0.0; 3],
            spin_start: 0.0,
            spin_start_range: 0.0,
            spin_speed: 0.0,
            spin_speed_range: 0.0,
            color_mult: [1.0; 4],
            color_mult_range: [0.0; 4],
            world_velocity: [0.0; 3],
            world_acceleration: [0.0; 3],
            billboard: true,
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl ParticleSpec {
    /// Set one field by name from a JSON value.
    pub fn set_parameter(&mut self, key: &str, value: serde_json::Value) -> Result<(), ParticleError> {
        let invalid = |message: String| ParticleError::InvalidParameter { key: key.to_string(), message };

        let mut fields = match serde_json::to_value(&*self) {
            Ok(serde_json::Value::Object(fields)) => fields,
            Ok(_) => return Err(invalid("spec is not an object".into())),
            Err(e) => return Err(invalid(e.to_string())),
        };
        match fields.get_mut(key) {
            Some(slot) => *slot = value,
            None => return Err(ParticleError::UnknownParameter(key.to_string())),
        }
        *self = serde_json::from_value(serde_json::Value::Object(fields)).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Apply every entry of a JSON object, stopping at the first bad one.
    pub fn set_parameters(&mut self, values: serde_json::Map<String, serde_json::Value>) -> Result<(), ParticleError> {
        for (key, value) in values {
            self.set_parameter(&key, value)?;
        }
        Ok(())
    }

    /// Defaults overridden by a JSON object.
    pub fn from_json(json: &str) -> Result<Self, ParticleError> {
        let values: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| ParticleError::InvalidParameter {
                key: String::new(),
                message: e.to_string(),
            })?;
        let mut spec = Self::default();
        spec.set_parameters(values)?;
        Ok(spec)
    }

    /// Reject values the shaders cannot work with.
    pub fn validate(&self) -> Result<(), ParticleError> {
        let check = |ok: bool, key: &str, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(ParticleError::InvalidParameter { key: key.to_string(), message: message.to_string() })
            }
        };
        check(self.num_particles >= 1, "num_particles", "must be at least 1")?;
        check(self.num_frames >= 1.0, "num_frames", "must be at least 1")?;
        check(self.frame_duration > 0.0, "frame_duration", "must be positive")?;
        check(self.time_range > 0.0, "time_range", "must be positive")?;
        Ok(())
    }
}
