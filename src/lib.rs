pub mod body;
pub mod capture;
pub mod config;
pub mod exchange;
pub mod joints;
pub mod retarget;
pub mod selector;
pub mod sensor;
pub mod simulated;
pub mod skeleton;

pub use body::{FrameSnapshot, JointPose, TrackedBody};
pub use capture::{CancellationToken, CaptureError, CaptureLoop, CaptureState};
pub use joints::{BoneId, JointId, JointMapping};
pub use retarget::{RetargetEngine, RetargetError, RootOffset};
pub use selector::select_closest;
pub use skeleton::{Rig, SkeletonHost};
