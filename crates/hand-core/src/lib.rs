//! Core math and skeleton model for stereo camera hand tracking.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...) and
//!   scalar-generic rotation helpers (swing/twist, safe axis-angle),
//! - the stereographic projection used to compare 3D hypotheses against
//!   2D keypoint observations,
//! - the skeleton naming, anthropometric bone tables, and parameter-vector
//!   layout of the articulated hand model,
//! - the forward kinematics expanding a parameter vector into absolute
//!   per-joint poses.
//!
//! Everything evaluated inside the optimizer loop is generic over the
//! scalar type `T: RealField` so the same code runs with plain `f64` and
//! with dual numbers carrying derivatives.

/// Anthropometric bone tables and hand-size bounds.
pub mod anthropometry;
/// Forward kinematics of the articulated hand model.
pub mod kinematics;
/// Parameter-vector layout shared by packing, unpacking and sizing code.
pub mod layout;
/// Linear algebra type aliases and rotation helpers.
pub mod math;
/// Stereographic projection between unit directions and plane coordinates.
pub mod projection;
/// Skeleton naming, joint tables and the externally-consumed joint set.
pub mod skeleton;

pub use layout::ParamLayout;
pub use math::{Iso3, Pt3, Quat, Real, Vec2, Vec3};
pub use skeleton::{
    Finger, HandJoint, HandJointSet, HandPose, Handedness, JointPose, JOINT_COUNT,
};
