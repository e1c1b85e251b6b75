//! Noise-free synthetic observations rendered from a known pose.
//!
//! Used by the test suites to close the loop: evaluate the forward
//! model at a ground-truth parameter vector, render what a perfect
//! detector would report, and check that the estimator recovers the
//! truth.

use hand_core::projection::project;
use hand_core::skeleton::keypoint;
use hand_core::{HandPose, Iso3, Quat, Real};

use crate::observation::{FrameInput, JointObservation, ViewObservation};

/// Render one view of a pose with full confidence and no noise.
///
/// `cam_from_left` maps left-camera points into this view's camera
/// frame. The relative-depth channel is expressed in units of the
/// pose's own wrist to middle-proximal distance, matching the
/// convention of the real detector.
pub fn render_view(
    pose: &HandPose<Real>,
    cam_from_left: &Iso3,
    look_dir: Quat,
    stereographic_radius: Real,
) -> ViewObservation {
    let hand_size = (pose.keypoint(keypoint::MIDDLE_MCP) - pose.keypoint(keypoint::WRIST)).norm();
    let middle_dist = (cam_from_left.rotation.transform_vector(pose.keypoint(keypoint::MIDDLE_MCP))
        + cam_from_left.translation.vector)
        .norm();
    let look_inv = look_dir.inverse();

    let mut view = ViewObservation {
        active: true,
        look_dir,
        stereographic_radius,
        ..Default::default()
    };
    for (k, joint) in view.joints.iter_mut().enumerate() {
        let p_cam = cam_from_left.rotation.transform_vector(pose.keypoint(k))
            + cam_from_left.translation.vector;
        let dist = p_cam.norm();
        let local = look_inv.transform_vector(&(p_cam / dist));
        *joint = JointObservation {
            pos: project(&local) / stereographic_radius,
            depth: (dist - middle_dist) / hand_size,
            conf_xy: 1.0,
            conf_depth: 1.0,
        };
    }
    view
}

/// Render both views of a stereo frame with identity look directions.
pub fn render_frame(pose: &HandPose<Real>, t_right_left: &Iso3, stereographic_radius: Real) -> FrameInput {
    FrameInput {
        views: [
            render_view(pose, &Iso3::identity(), Quat::identity(), stereographic_radius),
            render_view(pose, t_right_left, Quat::identity(), stereographic_radius),
        ],
    }
}
