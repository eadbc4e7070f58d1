use crate::joints::BoneId;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, PI};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The surface of an animated character the retargeting engine drives.
pub trait SkeletonHost {
    fn node_count(&self) -> usize;
    fn node_by_name(&self, name: &str) -> Option<NodeId>;
    fn bone_node(&self, bone: BoneId) -> Option<NodeId>;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    /// Bind pose rotation of `node` relative to its parent.
    fn bind_rotation(&self, node: NodeId) -> na::UnitQuaternion<f32>;
    fn set_world_rotation(&mut self, node: NodeId, rotation: na::UnitQuaternion<f32>);
    fn set_world_position(&mut self, node: NodeId, position: na::Point3<f32>);
}

#[derive(Error, Debug, PartialEq)]
pub enum RigError {
    #[error("Node {node:?} references unknown parent {parent:?}")]
    UnknownParent { node: String, parent: String },
    #[error("Node name {0:?} is used twice")]
    DuplicateNode(String),
    #[error("Bone {0:?} is assigned to more than one node")]
    DuplicateBone(BoneId),
    #[error("Node {0:?} has a bind rotation that is not a valid rotation")]
    InvalidRotation(String),
}

/// Quaternions shorter than this cannot be normalized into a rotation.
const MIN_ROTATION_NORM: f32 = 1e-6;

type NodeRow = (
    &'static str,
    Option<&'static str>,
    na::Vector3<f32>,
    na::UnitQuaternion<f32>,
    Option<BoneId>,
);

#[derive(Debug, Clone)]
struct RigNode {
    name: String,
    parent: Option<NodeId>,
    bind_translation: na::Vector3<f32>,
    bind_rotation: na::UnitQuaternion<f32>,
    world_rotation: Option<na::UnitQuaternion<f32>>,
    world_position: Option<na::Point3<f32>>,
}

/// Named node hierarchy with a bind pose and per-node world pose overrides.
///
/// Nodes are stored parents first, so a single forward pass resolves world
/// transforms.
#[derive(Debug, Clone)]
pub struct Rig {
    nodes: Vec<RigNode>,
    names: HashMap<String, NodeId>,
    bones: HashMap<BoneId, NodeId>,
}

impl Rig {
    pub fn builder() -> RigBuilder {
        RigBuilder::default()
    }

    pub fn from_description(description: &RigDescription) -> Result<Self, RigError> {
        let mut builder = Rig::builder();
        for node in &description.nodes {
            let [x, y, z] = node.translation;
            let [qx, qy, qz, qw] = node.rotation;
            if !node.rotation.iter().all(|component| component.is_finite()) {
                return Err(RigError::InvalidRotation(node.name.clone()));
            }
            let rotation = na::Quaternion::new(qw, qx, qy, qz);
            let rotation = na::UnitQuaternion::try_new(rotation, MIN_ROTATION_NORM)
                .ok_or_else(|| RigError::InvalidRotation(node.name.clone()))?;
            builder = builder.node(
                &node.name,
                node.parent.as_deref(),
                na::Vector3::new(x, y, z),
                rotation,
                node.bone,
            )?;
        }
        Ok(builder.build())
    }

    /// A T-posed humanoid where every bone's local +Y runs along the bone.
    pub fn humanoid() -> Self {
        let up = na::UnitQuaternion::identity();
        let left = na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), -FRAC_PI_2);
        let right = na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), FRAC_PI_2);
        let down = na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), PI);
        let forward = na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), FRAC_PI_2);
        let along = |length: f32| na::Vector3::new(0.0, length, 0.0);

        let nodes: &[NodeRow] = &[
            ("Armature", None, na::Vector3::zeros(), up, None),
            ("Hips", Some("Armature"), along(1.0), up, Some(BoneId::Hips)),
            ("Spine", Some("Hips"), along(0.1), up, Some(BoneId::Spine)),
            ("Chest", Some("Spine"), along(0.15), up, Some(BoneId::Chest)),
            ("Neck", Some("Chest"), along(0.25), up, Some(BoneId::Neck)),
            ("Head", Some("Neck"), along(0.1), up, Some(BoneId::Head)),
            (
                "LeftShoulder",
                Some("Chest"),
                na::Vector3::new(0.03, 0.2, 0.0),
                left,
                Some(BoneId::LeftShoulder),
            ),
            (
                "LeftUpperArm",
                Some("LeftShoulder"),
                along(0.12),
                up,
                Some(BoneId::LeftUpperArm),
            ),
            (
                "LeftLowerArm",
                Some("LeftUpperArm"),
                along(0.28),
                up,
                Some(BoneId::LeftLowerArm),
            ),
            (
                "LeftHand",
                Some("LeftLowerArm"),
                along(0.25),
                up,
                Some(BoneId::LeftHand),
            ),
            (
                "RightShoulder",
                Some("Chest"),
                na::Vector3::new(-0.03, 0.2, 0.0),
                right,
                Some(BoneId::RightShoulder),
            ),
            (
                "RightUpperArm",
                Some("RightShoulder"),
                along(0.12),
                up,
                Some(BoneId::RightUpperArm),
            ),
            (
                "RightLowerArm",
                Some("RightUpperArm"),
                along(0.28),
                up,
                Some(BoneId::RightLowerArm),
            ),
            (
                "RightHand",
                Some("RightLowerArm"),
                along(0.25),
                up,
                Some(BoneId::RightHand),
            ),
            (
                "LeftUpperLeg",
                Some("Hips"),
                na::Vector3::new(0.1, 0.0, 0.0),
                down,
                Some(BoneId::LeftUpperLeg),
            ),
            (
                "LeftLowerLeg",
                Some("LeftUpperLeg"),
                along(0.5),
                up,
                Some(BoneId::LeftLowerLeg),
            ),
            (
                "LeftFoot",
                Some("LeftLowerLeg"),
                along(0.5),
                forward,
                Some(BoneId::LeftFoot),
            ),
            (
                "LeftToes",
                Some("LeftFoot"),
                along(0.12),
                up,
                Some(BoneId::LeftToes),
            ),
            (
                "RightUpperLeg",
                Some("Hips"),
                na::Vector3::new(-0.1, 0.0, 0.0),
                down,
                Some(BoneId::RightUpperLeg),
            ),
            (
                "RightLowerLeg",
                Some("RightUpperLeg"),
                along(0.5),
                up,
                Some(BoneId::RightLowerLeg),
            ),
            (
                "RightFoot",
                Some("RightLowerLeg"),
                along(0.5),
                forward,
                Some(BoneId::RightFoot),
            ),
            (
                "RightToes",
                Some("RightFoot"),
                along(0.12),
                up,
                Some(BoneId::RightToes),
            ),
        ];

        let mut builder = RigBuilder::default();
        for (name, parent, translation, rotation, bone) in nodes {
            builder.push(name, *parent, *translation, *rotation, *bone);
        }
        builder.build()
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Drops all pose overrides, returning the rig to its bind pose.
    pub fn reset_pose(&mut self) {
        for node in &mut self.nodes {
            node.world_rotation = None;
            node.world_position = None;
        }
    }

    pub fn world_rotation_override(&self, node: NodeId) -> Option<na::UnitQuaternion<f32>> {
        self.nodes[node.0].world_rotation
    }

    pub fn world_position_override(&self, node: NodeId) -> Option<na::Point3<f32>> {
        self.nodes[node.0].world_position
    }

    /// Resolves the world transform of every node into `out`, indexed by node.
    ///
    /// Nodes without a rotation override inherit their parent's world rotation
    /// composed with their bind rotation.
    pub fn solve(&self, out: &mut Vec<na::Isometry3<f32>>) {
        out.clear();
        for node in &self.nodes {
            let (parent_position, parent_rotation) = match node.parent {
                Some(parent) => {
                    let parent = &out[parent.0];
                    (parent.translation.vector, parent.rotation)
                }
                None => (na::Vector3::zeros(), na::UnitQuaternion::identity()),
            };
            let rotation = node
                .world_rotation
                .unwrap_or_else(|| parent_rotation * node.bind_rotation);
            let position = node
                .world_position
                .map(|position| position.coords)
                .unwrap_or_else(|| parent_position + parent_rotation * node.bind_translation);
            out.push(na::Isometry3::from_parts(position.into(), rotation));
        }
    }
}

impl SkeletonHost for Rig {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    fn bone_node(&self, bone: BoneId) -> Option<NodeId> {
        self.bones.get(&bone).copied()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn bind_rotation(&self, node: NodeId) -> na::UnitQuaternion<f32> {
        self.nodes[node.0].bind_rotation
    }

    fn set_world_rotation(&mut self, node: NodeId, rotation: na::UnitQuaternion<f32>) {
        self.nodes[node.0].world_rotation = Some(rotation);
    }

    fn set_world_position(&mut self, node: NodeId, position: na::Point3<f32>) {
        self.nodes[node.0].world_position = Some(position);
    }
}

#[derive(Debug, Default)]
pub struct RigBuilder {
    nodes: Vec<RigNode>,
    names: HashMap<String, NodeId>,
    bones: HashMap<BoneId, NodeId>,
}

impl RigBuilder {
    /// Adds a node. Parents must be added before their children.
    pub fn node(
        mut self,
        name: &str,
        parent: Option<&str>,
        translation: na::Vector3<f32>,
        rotation: na::UnitQuaternion<f32>,
        bone: Option<BoneId>,
    ) -> Result<Self, RigError> {
        if self.names.contains_key(name) {
            return Err(RigError::DuplicateNode(name.to_owned()));
        }
        if let Some(parent) = parent {
            if !self.names.contains_key(parent) {
                return Err(RigError::UnknownParent {
                    node: name.to_owned(),
                    parent: parent.to_owned(),
                });
            }
        }
        if let Some(bone) = bone {
            if self.bones.contains_key(&bone) {
                return Err(RigError::DuplicateBone(bone));
            }
        }
        self.push(name, parent, translation, rotation, bone);
        Ok(self)
    }

    fn push(
        &mut self,
        name: &str,
        parent: Option<&str>,
        translation: na::Vector3<f32>,
        rotation: na::UnitQuaternion<f32>,
        bone: Option<BoneId>,
    ) {
        let id = NodeId(self.nodes.len());
        let parent = parent.and_then(|parent| self.names.get(parent).copied());
        self.nodes.push(RigNode {
            name: name.to_owned(),
            parent,
            bind_translation: translation,
            bind_rotation: rotation,
            world_rotation: None,
            world_position: None,
        });
        self.names.insert(name.to_owned(), id);
        if let Some(bone) = bone {
            self.bones.insert(bone, id);
        }
    }

    pub fn build(self) -> Rig {
        Rig {
            nodes: self.nodes,
            names: self.names,
            bones: self.bones,
        }
    }
}

/// Serialized rig, nodes listed parents first.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RigDescription {
    pub nodes: Vec<NodeDescription>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeDescription {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub translation: [f32; 3],
    /// x, y, z, w
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default)]
    pub bone: Option<BoneId>,
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl RigDescription {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
