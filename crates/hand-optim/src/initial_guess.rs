//! Closed-form initial wrist-pose estimate from stereo ray geometry.
//!
//! Seeds (or re-seeds) the optimizer when the hand was not tracked last
//! frame. Per active view the wrist and middle-proximal observation rays
//! plus the observed wrist relative depth and an anthropometric hand
//! size pin down the camera-to-hand distance through the law of cosines;
//! the proximal-row rays then give enough structure for an orthonormal
//! wrist orientation. No iteration anywhere.
//!
//! Degenerate geometry (collinear rays, impossible depth separation) is
//! reported as an error rather than a silently-wrong pose; the driver
//! falls back to a default placement and logs.

use nalgebra::Rotation3;
use thiserror::Error;

use hand_core::projection::unproject;
use hand_core::skeleton::keypoint;
use hand_core::{Handedness, Iso3, Pt3, Real, Vec3};

use crate::observation::{FrameInput, ViewObservation};

/// Minimum ray separation (on `2(1 − cosθ)`) before the quadratic is
/// considered degenerate.
const MIN_RAY_SEPARATION: Real = 1.0e-9;

#[derive(Debug, Error)]
pub enum InitialGuessError {
    #[error("no active observation views")]
    NoActiveViews,
    #[error("degenerate ray geometry for the wrist estimate")]
    DegenerateGeometry,
}

/// Anchor points recovered from a single view, in that view's frame.
struct ViewAnchors {
    wrist: Vec3,
    middle: Vec3,
    index: Vec3,
    little: Vec3,
}

/// Unit ray of one observed keypoint in the view's camera frame.
fn keypoint_ray(view: &ViewObservation, index: usize) -> Vec3 {
    let p = view.joints[index].pos * view.stereographic_radius;
    view.look_dir * unproject(&p)
}

/// Solve one view's camera-to-hand distance and anchor positions.
///
/// With `d_m` the middle-proximal distance, `δ` the observed wrist depth
/// offset and `h` the hand size, `|d_w·r_w − d_m·r_m| = h` with
/// `d_w = d_m + δ` is a quadratic in `d_m`; the positive root is the
/// physical solution.
fn solve_view(view: &ViewObservation, hand_size: Real) -> Result<ViewAnchors, InitialGuessError> {
    let r_wrist = keypoint_ray(view, keypoint::WRIST);
    let r_middle = keypoint_ray(view, keypoint::MIDDLE_MCP);

    let cos_theta = r_wrist.dot(&r_middle);
    let a = 2.0 * (1.0 - cos_theta);
    if !(a > MIN_RAY_SEPARATION) {
        return Err(InitialGuessError::DegenerateGeometry);
    }

    let delta = view.joints[keypoint::WRIST].depth * hand_size;
    let b = delta * a;
    let c = delta * delta - hand_size * hand_size;
    let disc = b * b - 4.0 * a * c;
    if !(disc >= 0.0) {
        return Err(InitialGuessError::DegenerateGeometry);
    }

    let d_middle = (-b + disc.sqrt()) / (2.0 * a);
    if !(d_middle.is_finite() && d_middle > 0.0) {
        return Err(InitialGuessError::DegenerateGeometry);
    }
    let d_wrist = d_middle + delta;

    Ok(ViewAnchors {
        wrist: r_wrist * d_wrist,
        middle: r_middle * d_middle,
        index: keypoint_ray(view, keypoint::INDEX_MCP) * d_middle,
        little: keypoint_ray(view, keypoint::LITTLE_MCP) * d_middle,
    })
}

/// Estimate a wrist pose (left-camera frame) from one frame's views.
///
/// `t_right_left` maps left-camera points into the right camera's frame;
/// its inverse brings right-view results back before averaging.
pub fn estimate_initial_pose(
    input: &FrameInput,
    t_right_left: &Iso3,
    hand_size: Real,
    handedness: Handedness,
) -> Result<Iso3, InitialGuessError> {
    let left_from_right = t_right_left.inverse();

    let mut wrist = Vec3::zeros();
    let mut middle = Vec3::zeros();
    let mut index = Vec3::zeros();
    let mut little = Vec3::zeros();
    let mut count = 0.0;

    for (view_idx, view) in input.views.iter().enumerate() {
        if !view.active {
            continue;
        }
        let anchors = solve_view(view, hand_size)?;
        let to_left = |p: Vec3| -> Vec3 {
            if view_idx == 0 {
                p
            } else {
                left_from_right.transform_point(&Pt3::from(p)).coords
            }
        };
        wrist += to_left(anchors.wrist);
        middle += to_left(anchors.middle);
        index += to_left(anchors.index);
        little += to_left(anchors.little);
        count += 1.0;
    }

    if count == 0.0 {
        return Err(InitialGuessError::NoActiveViews);
    }
    wrist /= count;
    middle /= count;
    index /= count;
    little /= count;

    // Forward along the middle metacarpal, radial across the knuckle row.
    let forward = middle - wrist;
    let forward_norm = forward.norm();
    if forward_norm < hand_size * 1.0e-3 {
        return Err(InitialGuessError::DegenerateGeometry);
    }
    let forward = forward / forward_norm;

    let mut radial = index - little;
    if handedness == Handedness::Right {
        radial = -radial;
    }
    radial -= forward * radial.dot(&forward);
    let radial_norm = radial.norm();
    if radial_norm < hand_size * 1.0e-3 {
        return Err(InitialGuessError::DegenerateGeometry);
    }
    let radial = radial / radial_norm;
    let palmar_up = forward.cross(&radial);

    let basis = nalgebra::Matrix3::from_columns(&[radial, palmar_up, forward]);
    let rotation = nalgebra::UnitQuaternion::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(basis),
    );

    let pose = Iso3::from_parts(wrist.into(), rotation);
    if !pose.translation.vector.iter().all(|v| v.is_finite()) {
        return Err(InitialGuessError::DegenerateGeometry);
    }
    Ok(pose)
}
