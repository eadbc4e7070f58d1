//! Scripted stand-in for the depth sensor and body tracking SDK.
//!
//! Bodies come from a scene closure called with the capture cycle number. Open
//! handles are counted in [`SimulatedStats`] so callers can check that every
//! device, tracker, capture and result was released.

use crate::body::{JointPose, TrackedBody};
use crate::joints::JointId;
use crate::sensor::{
    BodyTracker, DeviceConfiguration, SensorBackend, SensorDevice, SensorError,
    TrackerConfiguration, TrackerFrame,
};
use nalgebra as na;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type Scene = Box<dyn FnMut(u64) -> Vec<TrackedBody> + Send>;
type EnqueueHook = Box<dyn FnMut(u64) + Send>;

#[derive(Debug, Default)]
pub struct SimulatedStats {
    pub devices_opened: AtomicUsize,
    pub open_devices: AtomicUsize,
    pub open_trackers: AtomicUsize,
    pub live_captures: AtomicUsize,
    pub live_frames: AtomicUsize,
    pub captures_taken: AtomicU64,
    pub misses: AtomicU64,
}

pub struct SimulatedSensor {
    scene: Option<Scene>,
    on_enqueue: Option<EnqueueHook>,
    frame_interval: Duration,
    latency: usize,
    fail_open: bool,
    fail_tracker: bool,
    fail_capture_after: Option<u64>,
    stats: Arc<SimulatedStats>,
}

impl SimulatedSensor {
    pub fn new(scene: impl FnMut(u64) -> Vec<TrackedBody> + Send + 'static) -> Self {
        Self {
            scene: Some(Box::new(scene)),
            on_enqueue: None,
            frame_interval: Duration::from_secs(0),
            latency: 0,
            fail_open: false,
            fail_tracker: false,
            fail_capture_after: None,
            stats: Arc::new(SimulatedStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SimulatedStats> {
        Arc::clone(&self.stats)
    }

    /// Time each capture blocks for, emulating the camera frame rate.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Number of captures the tracker holds before the first result is ready.
    pub fn with_latency(mut self, latency: usize) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_tracker(mut self) -> Self {
        self.fail_tracker = true;
        self
    }

    /// Fails every capture after the first `count`.
    pub fn failing_capture_after(mut self, count: u64) -> Self {
        self.fail_capture_after = Some(count);
        self
    }

    /// Called with the cycle number after each capture is enqueued.
    pub fn on_enqueue(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_enqueue = Some(Box::new(hook));
        self
    }
}

impl SensorBackend for SimulatedSensor {
    type Device = SimulatedDevice;
    type Tracker = SimulatedTracker;

    fn open(&mut self, device_id: u32) -> Result<SimulatedDevice, SensorError> {
        if self.fail_open {
            return Err(SensorError::new(format!("no sensor at index {}", device_id)));
        }
        self.stats.devices_opened.fetch_add(1, Ordering::SeqCst);
        self.stats.open_devices.fetch_add(1, Ordering::SeqCst);
        Ok(SimulatedDevice {
            serial_number: format!("SIM{:06}", device_id),
            started: None,
            next_cycle: 0,
            frame_interval: self.frame_interval,
            fail_capture_after: self.fail_capture_after,
            stats: Arc::clone(&self.stats),
        })
    }

    fn create_tracker(
        &mut self,
        _calibration: &SimulatedCalibration,
        _config: &TrackerConfiguration,
    ) -> Result<SimulatedTracker, SensorError> {
        if self.fail_tracker {
            return Err(SensorError::new("tracker model failed to load"));
        }
        let scene = self
            .scene
            .take()
            .ok_or_else(|| SensorError::new("tracker already created"))?;
        self.stats.open_trackers.fetch_add(1, Ordering::SeqCst);
        Ok(SimulatedTracker {
            scene,
            on_enqueue: self.on_enqueue.take(),
            pending: VecDeque::new(),
            latency: self.latency,
            stats: Arc::clone(&self.stats),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedCalibration {
    pub config: DeviceConfiguration,
}

pub struct SimulatedDevice {
    serial_number: String,
    started: Option<DeviceConfiguration>,
    next_cycle: u64,
    frame_interval: Duration,
    fail_capture_after: Option<u64>,
    stats: Arc<SimulatedStats>,
}

impl SensorDevice for SimulatedDevice {
    type Capture = SimulatedCapture;
    type Calibration = SimulatedCalibration;

    fn serial_number(&self) -> String {
        self.serial_number.clone()
    }

    fn start_cameras(&mut self, config: &DeviceConfiguration) -> Result<(), SensorError> {
        self.started = Some(*config);
        Ok(())
    }

    fn calibration(&self) -> Result<SimulatedCalibration, SensorError> {
        self.started
            .map(|config| SimulatedCalibration { config })
            .ok_or_else(|| SensorError::new("cameras not started"))
    }

    fn get_capture(&mut self) -> Result<SimulatedCapture, SensorError> {
        if self.started.is_none() {
            return Err(SensorError::new("cameras not started"));
        }
        if let Some(limit) = self.fail_capture_after {
            if self.next_cycle >= limit {
                return Err(SensorError::new("device disconnected"));
            }
        }
        if self.frame_interval > Duration::from_secs(0) {
            thread::sleep(self.frame_interval);
        }
        let cycle = self.next_cycle;
        self.next_cycle += 1;
        self.stats.captures_taken.fetch_add(1, Ordering::SeqCst);
        self.stats.live_captures.fetch_add(1, Ordering::SeqCst);
        Ok(SimulatedCapture {
            cycle,
            stats: Arc::clone(&self.stats),
        })
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stats.open_devices.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SimulatedCapture {
    cycle: u64,
    stats: Arc<SimulatedStats>,
}

impl Drop for SimulatedCapture {
    fn drop(&mut self) {
        self.stats.live_captures.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SimulatedTracker {
    scene: Scene,
    on_enqueue: Option<EnqueueHook>,
    pending: VecDeque<u64>,
    latency: usize,
    stats: Arc<SimulatedStats>,
}

impl BodyTracker for SimulatedTracker {
    type Capture = SimulatedCapture;
    type Frame = SimulatedFrame;

    fn enqueue_capture(&mut self, capture: &SimulatedCapture) -> Result<(), SensorError> {
        self.pending.push_back(capture.cycle);
        if let Some(hook) = self.on_enqueue.as_mut() {
            hook(capture.cycle);
        }
        Ok(())
    }

    fn pop_result(&mut self, _timeout: Duration) -> Option<SimulatedFrame> {
        if self.pending.len() <= self.latency {
            self.stats.misses.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        let cycle = self.pending.pop_front()?;
        self.stats.live_frames.fetch_add(1, Ordering::SeqCst);
        Some(SimulatedFrame {
            bodies: (self.scene)(cycle),
            stats: Arc::clone(&self.stats),
        })
    }
}

impl Drop for SimulatedTracker {
    fn drop(&mut self) {
        self.stats.open_trackers.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SimulatedFrame {
    bodies: Vec<TrackedBody>,
    stats: Arc<SimulatedStats>,
}

impl TrackerFrame for SimulatedFrame {
    fn number_of_bodies(&self) -> usize {
        self.bodies.len()
    }

    fn copy_body(&self, index: usize, body: &mut TrackedBody) {
        *body = self.bodies[index];
    }
}

impl Drop for SimulatedFrame {
    fn drop(&mut self) {
        self.stats.live_frames.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Offset of each joint from its parent in a T-pose, meters, Y up.
fn bone_vector(joint: JointId) -> na::Vector3<f32> {
    use JointId::*;
    let (x, y, z) = match joint {
        Pelvis => (0.0, 0.0, 0.0),
        SpineNavel => (0.0, 0.1, 0.0),
        SpineChest => (0.0, 0.15, 0.0),
        Neck => (0.0, 0.25, 0.0),
        Head => (0.0, 0.1, 0.0),
        Nose => (0.0, 0.05, 0.1),
        EyeLeft => (0.03, 0.08, 0.08),
        EyeRight => (-0.03, 0.08, 0.08),
        EarLeft => (0.07, 0.05, 0.0),
        EarRight => (-0.07, 0.05, 0.0),
        ClavicleLeft => (0.03, 0.2, 0.0),
        ClavicleRight => (-0.03, 0.2, 0.0),
        ShoulderLeft => (0.12, 0.0, 0.0),
        ShoulderRight => (-0.12, 0.0, 0.0),
        ElbowLeft => (0.28, 0.0, 0.0),
        ElbowRight => (-0.28, 0.0, 0.0),
        WristLeft => (0.25, 0.0, 0.0),
        WristRight => (-0.25, 0.0, 0.0),
        HandLeft => (0.08, 0.0, 0.0),
        HandRight => (-0.08, 0.0, 0.0),
        HandTipLeft => (0.07, 0.0, 0.0),
        HandTipRight => (-0.07, 0.0, 0.0),
        ThumbLeft => (0.03, 0.0, 0.04),
        ThumbRight => (-0.03, 0.0, 0.04),
        HipLeft => (0.1, 0.0, 0.0),
        HipRight => (-0.1, 0.0, 0.0),
        KneeLeft | KneeRight | AnkleLeft | AnkleRight => (0.0, -0.5, 0.0),
        FootLeft | FootRight => (0.0, 0.0, 0.12),
    };
    na::Vector3::new(x, y, z)
}

/// Builds a body from a pelvis position and per-joint rotations relative to
/// the parent joint.
///
/// Positions are reported in sensor space (Y down). Orientations are absolute
/// and already expressed in the Y up character basis.
pub fn pose_body(
    id: u32,
    pelvis: na::Point3<f32>,
    local_rotation: impl Fn(JointId) -> na::UnitQuaternion<f32>,
) -> TrackedBody {
    let mut world = [JointPose::default(); JointId::COUNT];
    for joint in JointId::ALL.iter() {
        let rotation = local_rotation(*joint);
        world[joint.index()] = match joint.parent() {
            Some(parent) => {
                let parent = world[parent.index()];
                JointPose {
                    position: parent.position + parent.orientation * bone_vector(*joint),
                    orientation: parent.orientation * rotation,
                }
            }
            None => JointPose {
                position: pelvis,
                orientation: rotation,
            },
        };
    }
    let mut body = TrackedBody {
        id,
        joints: world,
    };
    for joint in body.joints.iter_mut() {
        joint.position.y = -joint.position.y;
    }
    body
}

/// One person waving about two meters from the sensor and a second person
/// standing still further back.
pub fn demo_scene(frame_rate: u32) -> Scene {
    let frame_rate = frame_rate.max(1) as f32;
    Box::new(move |cycle| {
        let t = cycle as f32 / frame_rate;
        let about = |axis: na::Unit<na::Vector3<f32>>, angle: f32| {
            na::UnitQuaternion::from_axis_angle(&axis, angle)
        };
        let waving = pose_body(
            1,
            na::Point3::new(0.3 * (0.3 * t).sin(), 0.0, 2.0 + 0.2 * (0.2 * t).sin()),
            |joint| match joint {
                JointId::Pelvis => about(na::Vector3::y_axis(), 0.3 * (0.5 * t).sin()),
                JointId::SpineNavel => about(na::Vector3::z_axis(), 0.05 * t.sin()),
                JointId::ShoulderRight => {
                    about(na::Vector3::z_axis(), -0.8 - 0.3 * (2.0 * t).sin())
                }
                JointId::ElbowRight => about(na::Vector3::z_axis(), -0.6 * (1.0 + (4.0 * t).sin())),
                JointId::ShoulderLeft => about(na::Vector3::z_axis(), -1.2),
                JointId::HipLeft => about(na::Vector3::x_axis(), 0.2 * (1.5 * t).sin()),
                JointId::HipRight => about(na::Vector3::x_axis(), -0.2 * (1.5 * t).sin()),
                _ => na::UnitQuaternion::identity(),
            },
        );
        let standing = pose_body(2, na::Point3::new(-1.0, 0.0, 3.5), |_| {
            na::UnitQuaternion::identity()
        });
        vec![waving, standing]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posed_body_reports_sensor_space_positions() {
        let body = pose_body(7, na::Point3::new(0.0, 0.0, 2.0), |_| {
            na::UnitQuaternion::identity()
        });
        assert_eq!(body.id, 7);
        let head = body.joint(JointId::Head).position;
        assert!((head.y + 0.6).abs() < 1e-5);
        let ankle = body.joint(JointId::AnkleLeft).position;
        assert!((ankle.y - 1.0).abs() < 1e-5);
        assert!((body.joint(JointId::HandTipRight).position.x + 0.83).abs() < 1e-5);
    }

    #[test]
    fn child_positions_follow_parent_rotation() {
        let quarter = na::UnitQuaternion::from_axis_angle(
            &na::Vector3::z_axis(),
            std::f32::consts::FRAC_PI_2,
        );
        let body = pose_body(1, na::Point3::origin(), |joint| {
            if joint == JointId::ShoulderLeft {
                quarter
            } else {
                na::UnitQuaternion::identity()
            }
        });
        let shoulder = body.joint(JointId::ShoulderLeft).position;
        let elbow = body.joint(JointId::ElbowLeft).position;
        // arm raised straight up, which is -Y in sensor space
        assert!((elbow - shoulder - na::Vector3::new(0.0, -0.28, 0.0)).norm() < 1e-5);
        assert!(body.joint(JointId::ElbowLeft).orientation.angle_to(&quarter) < 1e-5);
    }

    #[test]
    fn demo_scene_puts_waving_body_closest() {
        let mut scene = demo_scene(30);
        for cycle in &[0, 17, 90] {
            let bodies = scene(*cycle);
            assert_eq!(bodies.len(), 2);
            let distance = |body: &TrackedBody| body.root().position.coords.norm();
            assert!(distance(&bodies[0]) < distance(&bodies[1]));
        }
    }
}
