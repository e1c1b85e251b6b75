//! Scalar-generic rotation constructions for the hand model.
//!
//! Finger joints are parameterized as swing/twist pairs (metacarpals),
//! swing-only pairs (proximal joints) and single-axis curls
//! (intermediate/distal joints). All constructions go through a
//! small-angle-safe axis-angle map so that dual-number derivatives stay
//! finite at exactly zero rotation, which is the warm-started rest state
//! of most parameters.

use nalgebra::{Quaternion, RealField, UnitQuaternion, Vector3};

/// Squared angle below which the axis-angle map switches to its Taylor
/// expansion.
const SMALL_ANGLE_SQ: f64 = 1.0e-9;

/// Axis-angle (scaled axis) to quaternion with a finite derivative at zero.
///
/// `UnitQuaternion::from_scaled_axis` normalizes the axis, which is
/// undefined at zero rotation and produces NaN derivatives when evaluated
/// with dual numbers. This version expands `sin(θ/2)/θ` and `cos(θ/2)`
/// around zero instead of branching on a normalized axis.
pub fn quat_from_scaled_axis_safe<T: RealField>(v: Vector3<T>) -> UnitQuaternion<T> {
    let theta_sq = v.norm_squared();
    let (w, k) = if theta_sq < T::from_f64(SMALL_ANGLE_SQ).unwrap() {
        // cos(θ/2) ≈ 1 − θ²/8, sin(θ/2)/θ ≈ 1/2 − θ²/48
        let w = T::one() - theta_sq.clone() / T::from_f64(8.0).unwrap();
        let k = T::from_f64(0.5).unwrap() - theta_sq / T::from_f64(48.0).unwrap();
        (w, k)
    } else {
        let theta = theta_sq.sqrt();
        let half = theta.clone() * T::from_f64(0.5).unwrap();
        (half.clone().cos(), half.sin() / theta)
    };
    // Unit up to O(θ⁴) in the Taylor branch.
    UnitQuaternion::new_unchecked(Quaternion::from_parts(w, v * k))
}

/// Swing (bend about an axis in the X–Y plane) followed by twist about +Z.
///
/// The swing components are the scaled-axis X/Y coordinates of the bend;
/// the twist is an axial roll about the bone direction.
pub fn quat_from_swing_twist<T: RealField>(
    swing_x: T,
    swing_y: T,
    twist: T,
) -> UnitQuaternion<T> {
    let swing = quat_from_scaled_axis_safe(Vector3::new(swing_x, swing_y, T::zero()));
    let twist = quat_from_scaled_axis_safe(Vector3::new(T::zero(), T::zero(), twist));
    swing * twist
}

/// Single-axis curl: flexion about +X, folding the finger toward the palm.
pub fn quat_from_curl<T: RealField>(curl: T) -> UnitQuaternion<T> {
    quat_from_scaled_axis_safe(Vector3::new(curl, T::zero(), T::zero()))
}
