use super::EmitterId;
use crate::math::matrix::identity4;
use crate::math::{Mat4, Vec3};

/// A replayable burst that borrows an emitter's particles.
///
/// Each trigger restarts the burst at the current time and at a new place;
/// only the most recent trigger is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct OneShot {
    emitter: EmitterId,
    world: Mat4,
    time_offset: f32,
    visible: bool,
}

impl OneShot {
    pub(crate) fn new(emitter: EmitterId) -> Self {
        Self { emitter, world: identity4(), time_offset: 0.0, visible: false }
    }

    pub fn emitter(&self) -> EmitterId {
        self.emitter
    }

    /// Placement from the last trigger.
    pub fn world(&self) -> Mat4 {
        self.world
    }

    /// Clock time of the last trigger.
    pub fn time_offset(&self) -> f32 {
        self.time_offset
    }

    /// False until the first trigger.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Restart at `now`. The placement is `world` (identity if absent) with
    /// its translation replaced by `position` when given.
    pub(crate) fn trigger(&mut self, now: f32, position: Option<Vec3>, world: Option<Mat4>) {
        self.world = world.unwrap_or_else(identity4);
        if let Some([x, y, z]) = position {
            self.world[12] = x;
            self.world[13] = y;
            self.world[14] = z;
        }
        self.time_offset = now;
        self.visible = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::transform::{rotation_y, translation};

    #[test]
    fn trigger_replaces_the_previous_placement() {
        let mut shot = OneShot::new(EmitterId(0));
        assert!(!shot.is_visible());

        shot.trigger(1.0, None, Some(rotation_y(1.0)));
        shot.trigger(2.5, Some([1.0, 2.0, 3.0]), None);
        assert!(shot.is_visible());
        assert_eq!(shot.time_offset(), 2.5);
        assert_eq!(shot.world(), translation([1.0, 2.0, 3.0]));

        shot.hide();
        assert!(!shot.is_visible());
    }
}
