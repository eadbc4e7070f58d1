use serde::{Deserialize, Serialize};

/// Joints reported by the body tracker, in tracker order.
///
/// `Pelvis` is the root of the tracked skeleton and the only joint that
/// drives translation when retargeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JointId {
    Pelvis,
    SpineNavel,
    SpineChest,
    Neck,
    ClavicleLeft,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    HandTipLeft,
    ThumbLeft,
    ClavicleRight,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HandTipRight,
    ThumbRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    Head,
    Nose,
    EyeLeft,
    EarLeft,
    EyeRight,
    EarRight,
}

impl JointId {
    pub const COUNT: usize = 32;
    pub const ROOT: JointId = JointId::Pelvis;

    pub const ALL: [JointId; JointId::COUNT] = [
        JointId::Pelvis,
        JointId::SpineNavel,
        JointId::SpineChest,
        JointId::Neck,
        JointId::ClavicleLeft,
        JointId::ShoulderLeft,
        JointId::ElbowLeft,
        JointId::WristLeft,
        JointId::HandLeft,
        JointId::HandTipLeft,
        JointId::ThumbLeft,
        JointId::ClavicleRight,
        JointId::ShoulderRight,
        JointId::ElbowRight,
        JointId::WristRight,
        JointId::HandRight,
        JointId::HandTipRight,
        JointId::ThumbRight,
        JointId::HipLeft,
        JointId::KneeLeft,
        JointId::AnkleLeft,
        JointId::FootLeft,
        JointId::HipRight,
        JointId::KneeRight,
        JointId::AnkleRight,
        JointId::FootRight,
        JointId::Head,
        JointId::Nose,
        JointId::EyeLeft,
        JointId::EarLeft,
        JointId::EyeRight,
        JointId::EarRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<JointId> {
        JointId::ALL.get(index).copied()
    }

    pub fn is_root(self) -> bool {
        self == JointId::ROOT
    }

    /// Parent joint in the tracker's skeleton hierarchy.
    pub fn parent(self) -> Option<JointId> {
        use JointId::*;
        let parent = match self {
            Pelvis => return None,
            SpineNavel | HipLeft | HipRight => Pelvis,
            SpineChest => SpineNavel,
            Neck | ClavicleLeft | ClavicleRight => SpineChest,
            ShoulderLeft => ClavicleLeft,
            ElbowLeft => ShoulderLeft,
            WristLeft => ElbowLeft,
            HandLeft | ThumbLeft => WristLeft,
            HandTipLeft => HandLeft,
            ShoulderRight => ClavicleRight,
            ElbowRight => ShoulderRight,
            WristRight => ElbowRight,
            HandRight | ThumbRight => WristRight,
            HandTipRight => HandRight,
            KneeLeft => HipLeft,
            AnkleLeft => KneeLeft,
            FootLeft => AnkleLeft,
            KneeRight => HipRight,
            AnkleRight => KneeRight,
            FootRight => AnkleRight,
            Head => Neck,
            Nose | EyeLeft | EarLeft | EyeRight | EarRight => Head,
        };
        Some(parent)
    }
}

/// Humanoid bones a target rig can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoneId {
    Hips,
    Spine,
    Chest,
    UpperChest,
    Neck,
    Head,
    Jaw,
    LeftEye,
    RightEye,
    LeftShoulder,
    LeftUpperArm,
    LeftLowerArm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightLowerArm,
    RightHand,
    LeftUpperLeg,
    LeftLowerLeg,
    LeftFoot,
    LeftToes,
    RightUpperLeg,
    RightLowerLeg,
    RightFoot,
    RightToes,
}

/// Total lookup from tracker joints to rig bones.
///
/// `None` means the joint has no counterpart on the rig and is skipped by
/// consumers. The table is fixed once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointMapping {
    bones: [Option<BoneId>; JointId::COUNT],
}

impl JointMapping {
    /// A table with every joint unmapped.
    pub fn empty() -> Self {
        Self {
            bones: [None; JointId::COUNT],
        }
    }

    /// Mapping from tracker joints onto a standard humanoid rig.
    pub fn standard() -> Self {
        use BoneId as B;
        use JointId as J;
        Self::empty()
            .with(J::Pelvis, B::Hips)
            .with(J::SpineNavel, B::Spine)
            .with(J::SpineChest, B::Chest)
            .with(J::Neck, B::Neck)
            .with(J::Head, B::Head)
            .with(J::ClavicleLeft, B::LeftShoulder)
            .with(J::ShoulderLeft, B::LeftUpperArm)
            .with(J::ElbowLeft, B::LeftLowerArm)
            .with(J::WristLeft, B::LeftHand)
            .with(J::ClavicleRight, B::RightShoulder)
            .with(J::ShoulderRight, B::RightUpperArm)
            .with(J::ElbowRight, B::RightLowerArm)
            .with(J::WristRight, B::RightHand)
            .with(J::HipLeft, B::LeftUpperLeg)
            .with(J::KneeLeft, B::LeftLowerLeg)
            .with(J::AnkleLeft, B::LeftFoot)
            .with(J::FootLeft, B::LeftToes)
            .with(J::HipRight, B::RightUpperLeg)
            .with(J::KneeRight, B::RightLowerLeg)
            .with(J::AnkleRight, B::RightFoot)
            .with(J::FootRight, B::RightToes)
    }

    pub fn with(mut self, joint: JointId, bone: BoneId) -> Self {
        self.bones[joint.index()] = Some(bone);
        self
    }

    pub fn map_joint(&self, joint: JointId) -> Option<BoneId> {
        self.bones[joint.index()]
    }

    /// Mapped pairs in joint order.
    pub fn iter(&self) -> impl Iterator<Item = (JointId, BoneId)> + '_ {
        JointId::ALL
            .iter()
            .filter_map(move |&joint| self.map_joint(joint).map(|bone| (joint, bone)))
    }
}

impl Default for JointMapping {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn joint_table_is_in_tracker_order() {
        for (index, joint) in JointId::ALL.iter().enumerate() {
            assert_eq!(joint.index(), index);
            assert_eq!(JointId::from_index(index), Some(*joint));
        }
        assert_eq!(JointId::from_index(JointId::COUNT), None);
    }

    #[test]
    fn every_joint_reaches_root() {
        for joint in JointId::ALL.iter() {
            let mut current = *joint;
            let mut steps = 0;
            while let Some(parent) = current.parent() {
                current = parent;
                steps += 1;
                assert!(steps < JointId::COUNT);
            }
            assert_eq!(current, JointId::ROOT);
        }
    }

    #[test]
    fn standard_mapping_is_total_and_injective() {
        let mapping = JointMapping::standard();
        let mut seen = HashSet::new();
        for joint in JointId::ALL.iter() {
            if let Some(bone) = mapping.map_joint(*joint) {
                assert!(seen.insert(bone), "{:?} mapped twice", bone);
            }
        }
        assert_eq!(mapping.map_joint(JointId::Pelvis), Some(BoneId::Hips));
        assert_eq!(mapping.map_joint(JointId::WristRight), Some(BoneId::RightHand));
        assert_eq!(mapping.map_joint(JointId::HandTipLeft), None);
        assert_eq!(mapping.map_joint(JointId::Nose), None);
        assert_eq!(mapping.iter().count(), seen.len());
    }

    #[test]
    fn custom_mapping_overrides_entries() {
        let mapping = JointMapping::empty().with(JointId::HandRight, BoneId::RightHand);
        assert_eq!(mapping.map_joint(JointId::HandRight), Some(BoneId::RightHand));
        assert_eq!(
            mapping.iter().collect::<Vec<_>>(),
            vec![(JointId::HandRight, BoneId::RightHand)]
        );
    }
}
