use crate::retarget::RootOffset;
use crate::sensor::{
    DepthMode, DeviceConfiguration, FrameRate, ProcessingMode, TrackerConfiguration,
};
use crate::skeleton::{Rig, RigDescription};
use anyhow::{Context, Result};
use nalgebra as na;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub retarget: RetargetConfig,
    /// JSON rig description, the built in humanoid when absent
    #[serde(default)]
    pub rig: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default)]
    pub device_id: u32,
    /// Number of bodies kept per frame, extra bodies are dropped
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: FrameRate,
    #[serde(default = "default_depth_mode")]
    pub depth_mode: DepthMode,
    #[serde(default = "default_processing_mode")]
    pub processing_mode: ProcessingMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetargetConfig {
    /// Node the bind pose walk stops at
    #[serde(default = "default_skeleton_root")]
    pub skeleton_root: String,
    #[serde(default = "default_vertical_offset")]
    pub vertical_offset: f32,
    #[serde(default = "default_depth_offset")]
    pub depth_offset: f32,
    #[serde(default)]
    pub anchor: [f32; 3],
}

fn default_pool_capacity() -> usize {
    20
}

fn default_frame_rate() -> FrameRate {
    FrameRate::Fps30
}

fn default_depth_mode() -> DepthMode {
    DepthMode::NfovUnbinned
}

fn default_processing_mode() -> ProcessingMode {
    ProcessingMode::Cpu
}

fn default_skeleton_root() -> String {
    "Armature".to_string()
}

fn default_vertical_offset() -> f32 {
    1.0
}

fn default_depth_offset() -> f32 {
    2.0
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            pool_capacity: default_pool_capacity(),
            frame_rate: default_frame_rate(),
            depth_mode: default_depth_mode(),
            processing_mode: default_processing_mode(),
        }
    }
}

impl CaptureConfig {
    pub fn device_configuration(&self) -> DeviceConfiguration {
        DeviceConfiguration::body_tracking(self.frame_rate, self.depth_mode)
    }

    pub fn tracker_configuration(&self) -> TrackerConfiguration {
        TrackerConfiguration::new(self.processing_mode)
    }
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            skeleton_root: default_skeleton_root(),
            vertical_offset: default_vertical_offset(),
            depth_offset: default_depth_offset(),
            anchor: [0.0; 3],
        }
    }
}

impl RetargetConfig {
    pub fn root_offset(&self) -> RootOffset {
        let [x, y, z] = self.anchor;
        RootOffset {
            vertical: self.vertical_offset,
            depth: self.depth_offset,
            anchor: na::Point3::new(x, y, z),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Config from the first command line argument, defaults without one.
    pub fn from_args() -> Result<Self> {
        match std::env::args().nth(1) {
            Some(path) => Config::load(path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_rig(&self) -> Result<Rig> {
        match &self.rig {
            Some(path) => {
                let description = RigDescription::load(path)
                    .with_context(|| format!("Failed to load rig {}", path.display()))?;
                Ok(Rig::from_description(&description)?)
            }
            None => Ok(Rig::humanoid()),
        }
    }
}
