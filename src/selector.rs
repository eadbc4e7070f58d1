use crate::body::FrameSnapshot;
use crate::joints::JointId;

/// Joint used to measure a body's distance from the sensor.
pub const REFERENCE_JOINT: JointId = JointId::Pelvis;

/// Index of the body whose pelvis is closest to the sensor origin.
///
/// Ties go to the lowest index. Bodies with a non-finite pelvis position are
/// skipped. Returns `None` when the frame holds no such body.
pub fn select_closest(frame: &FrameSnapshot) -> Option<usize> {
    let mut closest: Option<(usize, f32)> = None;
    for (index, body) in frame.bodies().iter().enumerate() {
        let distance = body.joint(REFERENCE_JOINT).position.coords.norm();
        if !distance.is_finite() {
            continue;
        }
        match closest {
            Some((_, best)) if distance >= best => {}
            _ => closest = Some((index, distance)),
        }
    }
    closest.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra as na;

    fn frame_with_pelvis_positions(positions: &[[f32; 3]]) -> FrameSnapshot {
        let mut frame = FrameSnapshot::with_capacity(8);
        for (body, position) in frame.pool_mut().iter_mut().zip(positions) {
            body.joint_mut(REFERENCE_JOINT).position =
                na::Point3::new(position[0], position[1], position[2]);
        }
        frame.set_body_count(positions.len());
        frame
    }

    #[test]
    fn empty_frame_selects_nothing() {
        let frame = frame_with_pelvis_positions(&[]);
        assert_eq!(select_closest(&frame), None);
    }

    #[test]
    fn stale_slots_are_ignored() {
        let mut frame = frame_with_pelvis_positions(&[[0.0, 0.0, 3.0], [0.0, 0.0, 0.5]]);
        frame.set_body_count(1);
        assert_eq!(select_closest(&frame), Some(0));
    }

    #[test]
    fn picks_minimum_distance() {
        let frame = frame_with_pelvis_positions(&[
            [0.0, 0.0, 3.0],
            [0.5, -0.2, 1.2],
            [0.0, 0.0, 2.0],
        ]);
        assert_eq!(select_closest(&frame), Some(1));
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let frame = frame_with_pelvis_positions(&[
            [0.0, 0.0, 4.0],
            [0.0, 2.0, 0.0],
            [2.0, 0.0, 0.0],
        ]);
        assert_eq!(select_closest(&frame), Some(1));
    }

    #[test]
    fn non_finite_positions_are_skipped() {
        let frame = frame_with_pelvis_positions(&[
            [0.0, 0.0, 1.0],
            [f32::NAN, 0.0, 1.0],
            [0.0, f32::INFINITY, 0.5],
        ]);
        assert_eq!(select_closest(&frame), Some(0));

        let frame = frame_with_pelvis_positions(&[[f32::NAN, 0.0, 0.0]]);
        assert_eq!(select_closest(&frame), None);
    }

    #[test]
    fn far_bodies_are_still_selected() {
        let frame = frame_with_pelvis_positions(&[[0.0, 0.0, 9000.0]]);
        assert_eq!(select_closest(&frame), Some(0));
    }

    #[test]
    fn selected_body_is_no_farther_than_any_other() {
        let positions = [
            [1.0, 2.0, 3.0],
            [-0.5, 0.1, 2.2],
            [0.3, 0.3, 2.0],
            [0.0, -1.0, 1.9],
            [-0.3, 0.3, 2.0],
        ];
        let frame = frame_with_pelvis_positions(&positions);
        let selected = select_closest(&frame).unwrap();
        let distance =
            |body: &crate::body::TrackedBody| body.joint(REFERENCE_JOINT).position.coords.norm();
        let best = distance(&frame.bodies()[selected]);
        for body in frame.bodies() {
            assert!(best <= distance(body));
        }
    }
}
