use kinect_puppet::body::sensor_to_view;
use kinect_puppet::config::Config;
use kinect_puppet::simulated::{demo_scene, SimulatedSensor};
use kinect_puppet::{select_closest, CaptureLoop, JointId};

use anyhow::Result;
use log::*;
use simplelog::{LevelFilter, TermLogger, TerminalMode};
use std::thread::sleep;
use std::time::{Duration, Instant};

const RUN_TIME: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    TermLogger::init(
        LevelFilter::Info,
        simplelog::Config::default(),
        TerminalMode::Mixed,
    )?;
    let config = Config::from_args()?;
    let frame_rate = config.capture.frame_rate;
    let sensor = SimulatedSensor::new(demo_scene(frame_rate.frames_per_second()))
        .with_frame_interval(frame_rate.frame_interval())
        .with_latency(1);
    let capture = CaptureLoop::start(sensor, &config.capture)?;
    let mut reader = capture.reader();

    let started = Instant::now();
    while started.elapsed() < RUN_TIME {
        sleep(Duration::from_millis(500));
        if !reader.refresh() {
            info!("No new frame, capture {:?}", capture.state());
            continue;
        }
        let frame = match reader.latest() {
            Some(frame) => frame,
            None => continue,
        };
        match select_closest(frame).and_then(|index| frame.body(index)) {
            Some(body) => {
                let right = sensor_to_view(&body.joint(JointId::HandRight).position);
                let left = sensor_to_view(&body.joint(JointId::HandLeft).position);
                info!(
                    "frame {} bodies {} closest {} right hand ({:.2}, {:.2}, {:.2}) left hand ({:.2}, {:.2}, {:.2})",
                    frame.generation(),
                    frame.body_count(),
                    body.id,
                    right.x,
                    right.y,
                    right.z,
                    left.x,
                    left.y,
                    left.z
                );
            }
            None => info!("frame {} has no bodies", frame.generation()),
        }
    }

    capture.stop()?;
    Ok(())
}
