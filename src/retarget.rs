use crate::body::TrackedBody;
use crate::joints::{BoneId, JointId, JointMapping};
use crate::skeleton::{NodeId, SkeletonHost};
use log::*;
use nalgebra as na;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RetargetError {
    #[error("Skeleton root {0:?} is not a node of the rig")]
    UnknownRoot(String),
    #[error("Joint {joint:?} maps to bone {bone:?} which the rig does not have")]
    MissingBone { joint: JointId, bone: BoneId },
    #[error("Bind pose walk from bone {bone:?} (joint {joint:?}) never reached the skeleton root")]
    RootNotReached { joint: JointId, bone: BoneId },
    #[error("Bind pose from bone {bone:?} (joint {joint:?}) to the skeleton root is not a rotation")]
    InvalidBindPose { joint: JointId, bone: BoneId },
}

/// Placement of the character root relative to the tracked pelvis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootOffset {
    pub vertical: f32,
    pub depth: f32,
    pub anchor: na::Point3<f32>,
}

impl RootOffset {
    pub fn root_position(&self, tracked: &na::Point3<f32>) -> na::Point3<f32> {
        self.anchor + na::Vector3::new(tracked.x, tracked.y + self.vertical, tracked.z - self.depth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RestOffset {
    node: NodeId,
    rotation: na::UnitQuaternion<f32>,
}

/// Accumulated bind pose rotation from the skeleton root down to each mapped bone.
#[derive(Debug, Clone, PartialEq)]
pub struct RestOffsets {
    entries: [Option<RestOffset>; JointId::COUNT],
}

impl RestOffsets {
    pub fn compute<H: SkeletonHost + ?Sized>(
        host: &H,
        mapping: &JointMapping,
        root: NodeId,
    ) -> Result<Self, RetargetError> {
        let mut entries = [None; JointId::COUNT];
        for (joint, bone) in mapping.iter() {
            let node = host
                .bone_node(bone)
                .ok_or(RetargetError::MissingBone { joint, bone })?;
            let rotation = accumulate_bind_rotation(host, node, root)
                .ok_or(RetargetError::RootNotReached { joint, bone })?;
            if !rotation.coords.iter().all(|component| component.is_finite()) {
                return Err(RetargetError::InvalidBindPose { joint, bone });
            }
            entries[joint.index()] = Some(RestOffset { node, rotation });
        }
        let offsets = Self { entries };
        debug!("Computed rest offsets for {} joints", offsets.len());
        Ok(offsets)
    }

    pub fn get(&self, joint: JointId) -> Option<na::UnitQuaternion<f32>> {
        self.entries[joint.index()].map(|entry| entry.rotation)
    }

    pub fn node(&self, joint: JointId) -> Option<NodeId> {
        self.entries[joint.index()].map(|entry| entry.node)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Composes bind rotations from `node` up to and including `root`, the node's
/// own rotation applied first.
///
/// Gives up after visiting every node once so a broken hierarchy cannot spin.
fn accumulate_bind_rotation<H: SkeletonHost + ?Sized>(
    host: &H,
    node: NodeId,
    root: NodeId,
) -> Option<na::UnitQuaternion<f32>> {
    let mut current = node;
    let mut rotation = host.bind_rotation(current);
    for _ in 0..host.node_count() {
        if current == root {
            return Some(rotation);
        }
        current = host.parent(current)?;
        rotation = host.bind_rotation(current) * rotation;
    }
    None
}

/// Re-expresses an absolute sensor rotation in the bone's rest pose frame.
///
/// `offset * offset⁻¹ * sensor * offset` collapses to `sensor * offset`.
pub fn retarget_rotation(
    offset: &na::UnitQuaternion<f32>,
    sensor: &na::UnitQuaternion<f32>,
) -> na::UnitQuaternion<f32> {
    sensor * offset
}

/// Drives a skeleton host from tracked bodies.
pub struct RetargetEngine {
    offsets: RestOffsets,
    root_offset: RootOffset,
}

impl RetargetEngine {
    pub fn new<H: SkeletonHost + ?Sized>(
        host: &H,
        mapping: &JointMapping,
        skeleton_root: &str,
        root_offset: RootOffset,
    ) -> Result<Self, RetargetError> {
        let root = host
            .node_by_name(skeleton_root)
            .ok_or_else(|| RetargetError::UnknownRoot(skeleton_root.to_owned()))?;
        let offsets = RestOffsets::compute(host, mapping, root)?;
        Ok(Self {
            offsets,
            root_offset,
        })
    }

    pub fn rest_offsets(&self) -> &RestOffsets {
        &self.offsets
    }

    pub fn root_offset(&self) -> &RootOffset {
        &self.root_offset
    }

    /// Writes world rotations for every mapped joint and the root position.
    ///
    /// Does nothing without a body, so the character holds its last pose.
    pub fn apply_frame<H: SkeletonHost + ?Sized>(&self, body: Option<&TrackedBody>, host: &mut H) {
        let body = match body {
            Some(body) => body,
            None => return,
        };
        for (joint, entry) in JointId::ALL.iter().zip(self.offsets.entries.iter()) {
            let entry = match entry {
                Some(entry) => entry,
                None => continue,
            };
            let pose = body.joint(*joint);
            let rotation = retarget_rotation(&entry.rotation, &pose.orientation);
            host.set_world_rotation(entry.node, rotation);
            if joint.is_root() {
                host.set_world_position(entry.node, self.root_offset.root_position(&pose.position));
            }
        }
    }
}
