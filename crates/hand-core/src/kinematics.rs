//! Forward kinematics: parameter vector → absolute joint poses.
//!
//! Each of the five digit chains is walked independently from the shared
//! wrist pose. Orientations compose parent-to-child from swing/twist,
//! swing-only and curl rotations; translations add the parent orientation
//! applied to fixed anthropometric bone offsets scaled by hand size.
//!
//! The evaluation is a pure, total function of its inputs: identical
//! inputs produce bit-identical joint tables, and no input produces a
//! failure. It is generic over the scalar so the optimizer can run it
//! with dual numbers.

use nalgebra::{RealField, UnitQuaternion, Vector3};

use crate::anthropometry::{self, DigitProportions};
use crate::layout::{self, ParamLayout};
use crate::math::{
    quat_cast, quat_from_curl, quat_from_scaled_axis_safe, quat_from_swing_twist, vec3_cast, Iso3,
    Real,
};
use crate::skeleton::{Finger, FingerPose, HandPose, Handedness, ThumbPose};

/// Hand size under the given layout: the trailing parameter when
/// calibrating, the fixed input otherwise.
pub fn hand_size_param<T: RealField>(x: &[T], layout: ParamLayout, fixed_hand_size: Real) -> T {
    debug_assert_eq!(x.len(), layout.param_dim());
    if layout.optimizes_hand_size() {
        x[layout::HAND_SIZE_OFFSET].clone()
    } else {
        T::from_f64(fixed_hand_size).unwrap()
    }
}

/// Reflection across the YZ plane, applied to right-hand local offsets.
fn mirror_vec3<T: RealField>(v: Vector3<T>, mirrored: bool) -> Vector3<T> {
    if mirrored {
        Vector3::new(-v.x.clone(), v.y.clone(), v.z.clone())
    } else {
        v
    }
}

/// The same reflection applied to a local rotation: axes in the mirror
/// plane flip sign.
fn mirror_quat<T: RealField>(q: UnitQuaternion<T>, mirrored: bool) -> UnitQuaternion<T> {
    if mirrored {
        let q = q.into_inner();
        UnitQuaternion::new_unchecked(nalgebra::Quaternion::new(
            q.w.clone(),
            q.i.clone(),
            -q.j.clone(),
            -q.k.clone(),
        ))
    } else {
        q
    }
}

/// Bone offset along the local +Z axis, scaled by hand size.
fn bone<T: RealField>(length: Real, hand_size: &T) -> Vector3<T> {
    Vector3::new(
        T::zero(),
        T::zero(),
        T::from_f64(length).unwrap() * hand_size.clone(),
    )
}

/// Expand a parameter vector into absolute joint poses.
///
/// `pre_transform` is the persistent warm-start wrist pose; the wrist
/// block of `x` is a delta applied on top of it. `fixed_hand_size` is
/// consulted only under [`ParamLayout::FixedSize`].
pub fn eval_hand_pose<T: RealField>(
    x: &[T],
    layout: ParamLayout,
    pre_transform: &Iso3,
    handedness: Handedness,
    fixed_hand_size: Real,
) -> HandPose<T> {
    debug_assert_eq!(x.len(), layout.param_dim());
    let mirrored = handedness == Handedness::Right;
    let hand_size = hand_size_param(x, layout, fixed_hand_size);

    let pre_rot = quat_cast::<T>(&pre_transform.rotation);
    let pre_pos = vec3_cast::<T>(&pre_transform.translation.vector);

    let delta_t = Vector3::new(x[0].clone(), x[1].clone(), x[2].clone());
    let delta_r =
        quat_from_scaled_axis_safe(Vector3::new(x[3].clone(), x[4].clone(), x[5].clone()));
    let wrist_position = &pre_pos + pre_rot.transform_vector(&delta_t);
    let wrist_orientation = pre_rot * delta_r;

    let thumb = eval_thumb(
        x,
        &wrist_position,
        &wrist_orientation,
        &hand_size,
        mirrored,
    );

    let fingers = [Finger::Index, Finger::Middle, Finger::Ring, Finger::Little].map(|finger| {
        eval_finger(
            x,
            finger,
            &wrist_position,
            &wrist_orientation,
            &hand_size,
            mirrored,
        )
    });

    HandPose {
        wrist_position,
        wrist_orientation,
        thumb,
        fingers,
    }
}

fn eval_thumb<T: RealField>(
    x: &[T],
    wrist_position: &Vector3<T>,
    wrist_orientation: &UnitQuaternion<T>,
    hand_size: &T,
    mirrored: bool,
) -> ThumbPose<T> {
    let o = layout::finger_offset(Finger::Thumb);
    let d: &DigitProportions = anthropometry::digit(Finger::Thumb);

    let base = mirror_vec3(
        vec3_cast::<T>(&anthropometry::base_offset(Finger::Thumb)),
        mirrored,
    );
    let cmc = wrist_position + wrist_orientation.transform_vector(&(base * hand_size.clone()));

    let [roll, pitch, yaw] = anthropometry::THUMB_METACARPAL_EULER;
    let hidden = mirror_quat(
        UnitQuaternion::from_euler_angles(
            T::from_f64(roll).unwrap(),
            T::from_f64(pitch).unwrap(),
            T::from_f64(yaw).unwrap(),
        ),
        mirrored,
    );
    let swing_twist = mirror_quat(
        quat_from_swing_twist(x[o].clone(), x[o + 1].clone(), x[o + 2].clone()),
        mirrored,
    );
    let metacarpal_rot = wrist_orientation.clone() * hidden * swing_twist;
    let mcp = &cmc + metacarpal_rot.transform_vector(&bone(d.metacarpal, hand_size));

    // Curl axes lie in the mirror plane, so curls need no mirroring.
    let proximal_rot = metacarpal_rot.clone() * quat_from_curl(x[o + 3].clone());
    let ip = &mcp + proximal_rot.transform_vector(&bone(d.proximal, hand_size));

    let distal_rot = proximal_rot.clone() * quat_from_curl(x[o + 4].clone());
    let tip = &ip + distal_rot.transform_vector(&bone(d.distal, hand_size));

    ThumbPose {
        joints: [cmc, mcp, ip, tip],
        orientations: [metacarpal_rot, proximal_rot, distal_rot],
    }
}

fn eval_finger<T: RealField>(
    x: &[T],
    finger: Finger,
    wrist_position: &Vector3<T>,
    wrist_orientation: &UnitQuaternion<T>,
    hand_size: &T,
    mirrored: bool,
) -> FingerPose<T> {
    let o = layout::finger_offset(finger);
    let d: &DigitProportions = anthropometry::digit(finger);

    let base_offset = mirror_vec3(vec3_cast::<T>(&anthropometry::base_offset(finger)), mirrored);
    let base =
        wrist_position + wrist_orientation.transform_vector(&(base_offset * hand_size.clone()));

    let metacarpal_rot = wrist_orientation.clone()
        * mirror_quat(
            quat_from_swing_twist(x[o].clone(), x[o + 1].clone(), x[o + 2].clone()),
            mirrored,
        );
    let mcp = &base + metacarpal_rot.transform_vector(&bone(d.metacarpal, hand_size));

    let proximal_rot = metacarpal_rot.clone()
        * mirror_quat(
            quat_from_swing_twist(x[o + 3].clone(), x[o + 4].clone(), T::zero()),
            mirrored,
        );
    let pip = &mcp + proximal_rot.transform_vector(&bone(d.proximal, hand_size));

    let intermediate_rot = proximal_rot.clone() * quat_from_curl(x[o + 5].clone());
    let dip = &pip + intermediate_rot.transform_vector(&bone(d.intermediate, hand_size));

    let distal_rot = intermediate_rot.clone() * quat_from_curl(x[o + 6].clone());
    let tip = &dip + distal_rot.transform_vector(&bone(d.distal, hand_size));

    FingerPose {
        joints: [base, mcp, pip, dip, tip],
        orientations: [metacarpal_rot, proximal_rot, intermediate_rot, distal_rot],
    }
}
