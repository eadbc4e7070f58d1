use kinect_puppet::body::{sensor_to_view, TrackedBody};
use kinect_puppet::config::Config;
use kinect_puppet::retarget::RootOffset;
use kinect_puppet::simulated::{demo_scene, SimulatedSensor};
use kinect_puppet::skeleton::Rig;
use kinect_puppet::{
    select_closest, CaptureLoop, JointId, JointMapping, RetargetEngine, SkeletonHost,
};

use anyhow::Result;
use kiss3d::window::Window;
use log::*;
use nalgebra as na;
use simplelog::{LevelFilter, TermLogger, TerminalMode};

/// Raw tracked bodies are drawn beside the puppet.
const RAW_BODY_SHIFT: f32 = 1.5;

const GROUND_TILES: usize = 4;
const GROUND_TILE_SIZE: f32 = 0.5;

/// Centers of a checkerboard of tiles on the floor plane around `anchor`.
fn ground_tile_centers(anchor: &na::Point3<f32>) -> Vec<(na::Point3<f32>, bool)> {
    let half = (GROUND_TILES as f32 - 1.0) / 2.0;
    let mut tiles = Vec::with_capacity(GROUND_TILES * GROUND_TILES);
    for row in 0..GROUND_TILES {
        for column in 0..GROUND_TILES {
            let x = (column as f32 - half) * GROUND_TILE_SIZE;
            let z = (row as f32 - half) * GROUND_TILE_SIZE;
            tiles.push((
                na::Point3::new(anchor.x + x, anchor.y, anchor.z + z),
                (row + column) % 2 == 0,
            ));
        }
    }
    tiles
}

fn add_ground_plane(window: &mut Window, anchor: &na::Point3<f32>) {
    let flat = na::UnitQuaternion::from_euler_angles(-std::f32::consts::FRAC_PI_2, 0.0, 0.0);
    for (center, light) in ground_tile_centers(anchor) {
        let mut tile = window.add_cube(GROUND_TILE_SIZE, GROUND_TILE_SIZE, 0.001);
        if light {
            tile.set_color(0.8, 0.8, 0.75);
        } else {
            tile.set_color(0.25, 0.3, 0.35);
        }
        tile.set_local_transformation(na::Isometry3::from_parts(
            na::Translation3::from(center.coords),
            flat,
        ));
    }
}

fn draw_rig(window: &mut Window, rig: &Rig, transforms: &[na::Isometry3<f32>]) {
    let color = na::Point3::new(1.0, 1.0, 0.0);
    for node in rig.node_ids() {
        if let Some(parent) = rig.parent(node) {
            let from = transforms[parent.index()] * na::Point3::origin();
            let to = transforms[node.index()] * na::Point3::origin();
            window.draw_line(&from, &to, &color);
        }
    }
}

fn raw_to_scene(position: &na::Point3<f32>, offset: &RootOffset) -> na::Point3<f32> {
    let view = sensor_to_view(position);
    offset.anchor
        + na::Vector3::new(
            view.x + RAW_BODY_SHIFT,
            view.y + offset.vertical,
            view.z - offset.depth,
        )
}

fn draw_tracked_body(window: &mut Window, body: &TrackedBody, offset: &RootOffset, selected: bool) {
    let color = if selected {
        na::Point3::new(0.0, 1.0, 0.0)
    } else {
        na::Point3::new(0.4, 0.4, 0.4)
    };
    for joint in JointId::ALL.iter() {
        if let Some(parent) = joint.parent() {
            window.draw_line(
                &raw_to_scene(&body.joint(parent).position, offset),
                &raw_to_scene(&body.joint(*joint).position, offset),
                &color,
            );
        }
    }
    if selected {
        let hand_color = na::Point3::new(0.0, 0.0, 1.0);
        for hand in &[JointId::HandLeft, JointId::HandRight] {
            window.draw_point(&raw_to_scene(&body.joint(*hand).position, offset), &hand_color);
        }
    }
}

fn main() -> Result<()> {
    TermLogger::init(
        LevelFilter::Info,
        simplelog::Config::default(),
        TerminalMode::Mixed,
    )?;
    let config = Config::from_args()?;
    let white = na::Point3::new(1.0, 1.0, 1.0);

    let mut rig = config.load_rig()?;
    let root_offset = config.retarget.root_offset();
    let engine = RetargetEngine::new(
        &rig,
        &JointMapping::standard(),
        &config.retarget.skeleton_root,
        root_offset,
    )?;

    let frame_rate = config.capture.frame_rate;
    let sensor = SimulatedSensor::new(demo_scene(frame_rate.frames_per_second()))
        .with_frame_interval(frame_rate.frame_interval())
        .with_latency(1);
    let capture = CaptureLoop::start(sensor, &config.capture)?;
    let mut reader = capture.reader();

    let mut window = Window::new("Kinect puppet");
    window.set_background_color(0.5, 0.5, 0.5);
    window.set_point_size(10.0);
    add_ground_plane(&mut window, &root_offset.anchor);

    let mut transforms = Vec::with_capacity(rig.node_count());
    while window.render() {
        reader.refresh();
        let mut status = format!("capture: {:?}", capture.state());
        if let Some(frame) = reader.latest() {
            let selected = select_closest(frame);
            engine.apply_frame(selected.and_then(|index| frame.body(index)), &mut rig);
            for (index, body) in frame.bodies().iter().enumerate() {
                draw_tracked_body(&mut window, body, &root_offset, Some(index) == selected);
            }
            status.push_str(&format!(
                "\nframe: {}\nbodies: {}",
                frame.generation(),
                frame.body_count()
            ));
        }

        rig.solve(&mut transforms);
        draw_rig(&mut window, &rig, &transforms);
        window.draw_text(
            &status,
            &na::Point2::new(1.0, 1.0),
            50.0,
            &kiss3d::text::Font::default(),
            &white,
        );
    }

    info!("Window closed, stopping capture");
    capture.stop()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_plane_is_centered_on_anchor() {
        let anchor = na::Point3::new(1.0, 0.0, -1.0);
        let tiles = ground_tile_centers(&anchor);
        assert_eq!(tiles.len(), GROUND_TILES * GROUND_TILES);

        let sum = tiles
            .iter()
            .fold(na::Vector3::zeros(), |sum, (center, _)| sum + center.coords);
        let mean = sum / tiles.len() as f32;
        assert!((mean - anchor.coords).norm() < 1e-5);
        assert!(tiles.iter().all(|(center, _)| center.y == anchor.y));
        assert_eq!(tiles.iter().filter(|(_, light)| *light).count(), 8);
    }
}
