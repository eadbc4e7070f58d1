use crate::joints::JointId;
use nalgebra as na;

/// Position and absolute orientation of a single tracked joint, in sensor space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub position: na::Point3<f32>,
    pub orientation: na::UnitQuaternion<f32>,
}

impl Default for JointPose {
    fn default() -> Self {
        Self {
            position: na::Point3::origin(),
            orientation: na::UnitQuaternion::identity(),
        }
    }
}

/// One detected person. Bodies live in a pre-allocated pool and are
/// overwritten in place every capture cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedBody {
    pub id: u32,
    pub joints: [JointPose; JointId::COUNT],
}

impl Default for TrackedBody {
    fn default() -> Self {
        Self {
            id: 0,
            joints: [JointPose::default(); JointId::COUNT],
        }
    }
}

impl TrackedBody {
    pub fn joint(&self, joint: JointId) -> &JointPose {
        &self.joints[joint.index()]
    }

    pub fn joint_mut(&mut self, joint: JointId) -> &mut JointPose {
        &mut self.joints[joint.index()]
    }

    pub fn root(&self) -> &JointPose {
        self.joint(JointId::ROOT)
    }
}

/// Sensor space has Y pointing down, viewer space has Y pointing up.
pub fn sensor_to_view(position: &na::Point3<f32>) -> na::Point3<f32> {
    na::Point3::new(position.x, -position.y, position.z)
}

/// A body count together with the pool it indexes into.
///
/// Only `bodies[..body_count]` hold data for the current cycle. The rest of
/// the pool is left over from earlier cycles.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    generation: u64,
    body_count: usize,
    bodies: Vec<TrackedBody>,
}

impl FrameSnapshot {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generation: 0,
            body_count: 0,
            bodies: vec![TrackedBody::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.bodies.len()
    }

    /// Number of publishes that produced this snapshot, zero if never published.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn body_count(&self) -> usize {
        self.body_count
    }

    pub fn bodies(&self) -> &[TrackedBody] {
        &self.bodies[..self.body_count]
    }

    pub fn body(&self, index: usize) -> Option<&TrackedBody> {
        self.bodies().get(index)
    }

    /// The whole pool, including slots past the current count.
    pub fn pool_mut(&mut self) -> &mut [TrackedBody] {
        &mut self.bodies
    }

    /// Clamped to the pool capacity.
    pub fn set_body_count(&mut self, count: usize) {
        self.body_count = count.min(self.bodies.len());
    }

    /// Copies the valid bodies of `other` into this snapshot's pool without
    /// reallocating.
    pub fn copy_from(&mut self, other: &FrameSnapshot) {
        let count = other.body_count.min(self.bodies.len());
        self.bodies[..count].copy_from_slice(&other.bodies[..count]);
        self.body_count = count;
        self.generation = other.generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_count_is_clamped_to_pool() {
        let mut frame = FrameSnapshot::with_capacity(3);
        frame.set_body_count(7);
        assert_eq!(frame.body_count(), 3);
        assert_eq!(frame.bodies().len(), 3);
        assert!(frame.body(3).is_none());
    }

    #[test]
    fn copy_keeps_pool_size() {
        let mut source = FrameSnapshot::with_capacity(4);
        source.pool_mut()[1].id = 42;
        source.set_body_count(2);
        source.set_generation(9);

        let mut target = FrameSnapshot::with_capacity(4);
        target.copy_from(&source);
        assert_eq!(target.capacity(), 4);
        assert_eq!(target.body_count(), 2);
        assert_eq!(target.generation(), 9);
        assert_eq!(target.bodies()[1].id, 42);
    }

    #[test]
    fn view_space_flips_y() {
        let view = sensor_to_view(&na::Point3::new(1.0, 2.0, 3.0));
        assert_eq!(view, na::Point3::new(1.0, -2.0, 3.0));
    }
}
