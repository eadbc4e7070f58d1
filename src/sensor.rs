//! Seams to the depth sensor and its body tracking SDK.
//!
//! Every handle type releases its native resource when dropped, so scoping a
//! value is enough to guarantee release on every exit path.

use crate::body::TrackedBody;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the sensor or tracker SDK.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct SensorError(pub String);

impl SensorError {
    pub fn new(message: impl Into<String>) -> Self {
        SensorError(message.into())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameRate {
    Fps5,
    Fps15,
    Fps30,
}

impl FrameRate {
    pub fn frames_per_second(self) -> u32 {
        match self {
            FrameRate::Fps5 => 5,
            FrameRate::Fps15 => 15,
            FrameRate::Fps30 => 30,
        }
    }

    pub fn frame_interval(self) -> Duration {
        Duration::from_secs(1) / self.frames_per_second()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    NfovBinned,
    NfovUnbinned,
    WfovBinned,
    WfovUnbinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorResolution {
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiredSyncMode {
    Standalone,
}

/// Camera settings for body tracking: depth only, no color, no external sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfiguration {
    pub camera_fps: FrameRate,
    pub depth_mode: DepthMode,
    pub color_resolution: ColorResolution,
    pub wired_sync_mode: WiredSyncMode,
}

impl DeviceConfiguration {
    pub fn body_tracking(camera_fps: FrameRate, depth_mode: DepthMode) -> Self {
        Self {
            camera_fps,
            depth_mode,
            color_resolution: ColorResolution::Off,
            wired_sync_mode: WiredSyncMode::Standalone,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorOrientation {
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfiguration {
    pub processing_mode: ProcessingMode,
    pub sensor_orientation: SensorOrientation,
}

impl TrackerConfiguration {
    pub fn new(processing_mode: ProcessingMode) -> Self {
        Self {
            processing_mode,
            sensor_orientation: SensorOrientation::Default,
        }
    }
}

/// An opened sensor.
pub trait SensorDevice {
    type Capture;
    type Calibration;

    fn serial_number(&self) -> String;
    fn start_cameras(&mut self, config: &DeviceConfiguration) -> Result<(), SensorError>;
    fn calibration(&self) -> Result<Self::Calibration, SensorError>;
    /// Blocks until the next capture is available.
    fn get_capture(&mut self) -> Result<Self::Capture, SensorError>;
}

/// Body tracker fed with raw captures.
pub trait BodyTracker {
    type Capture;
    type Frame: TrackerFrame;

    fn enqueue_capture(&mut self, capture: &Self::Capture) -> Result<(), SensorError>;
    /// Returns `None` when no result is ready within `timeout`.
    fn pop_result(&mut self, timeout: Duration) -> Option<Self::Frame>;
}

/// One tracking result.
pub trait TrackerFrame {
    fn number_of_bodies(&self) -> usize;
    /// Overwrites `body` with the joints of body `index` in this result.
    fn copy_body(&self, index: usize, body: &mut TrackedBody);
}

/// Entry point to a sensor SDK.
pub trait SensorBackend {
    type Device: SensorDevice;
    type Tracker: BodyTracker<Capture = <Self::Device as SensorDevice>::Capture>;

    fn open(&mut self, device_id: u32) -> Result<Self::Device, SensorError>;
    fn create_tracker(
        &mut self,
        calibration: &<Self::Device as SensorDevice>::Calibration,
        config: &TrackerConfiguration,
    ) -> Result<Self::Tracker, SensorError>;
}
