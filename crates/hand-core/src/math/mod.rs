//! Mathematical type definitions and scalar-generic helpers.
//!
//! The aliases fix the plain scalar type used at the API surface; the
//! helpers in [`rotation`] and the cast functions below are generic over
//! `T: RealField` so they can be evaluated with dual numbers as well.

use nalgebra::{Isometry3, Point3, Quaternion, RealField, UnitQuaternion, Vector2, Vector3};

pub mod rotation;

pub use rotation::{quat_from_curl, quat_from_scaled_axis_safe, quat_from_swing_twist};

/// Scalar type used at the non-generic API surface (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// Unit quaternion with [`Real`] components.
pub type Quat = UnitQuaternion<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Lift a plain 3-vector into the generic scalar type.
pub fn vec3_cast<T: RealField>(v: &Vec3) -> Vector3<T> {
    Vector3::new(
        T::from_f64(v.x).unwrap(),
        T::from_f64(v.y).unwrap(),
        T::from_f64(v.z).unwrap(),
    )
}

/// Lift a plain unit quaternion into the generic scalar type.
pub fn quat_cast<T: RealField>(q: &Quat) -> UnitQuaternion<T> {
    let q = q.quaternion();
    UnitQuaternion::new_unchecked(Quaternion::new(
        T::from_f64(q.w).unwrap(),
        T::from_f64(q.i).unwrap(),
        T::from_f64(q.j).unwrap(),
        T::from_f64(q.k).unwrap(),
    ))
}
