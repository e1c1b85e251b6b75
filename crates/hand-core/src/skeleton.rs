//! Skeleton naming, per-digit joint tables and the external joint set.
//!
//! Internally the hand is five independent chains hanging off one wrist
//! pose: the thumb (CMC, MCP, IP, tip) and four fingers (metacarpal
//! base, MCP, PIP, DIP, tip). The detector observes 21 keypoints in
//! MediaPipe order; [`HandPose::keypoint`] maps the internal tables onto
//! that order (finger metacarpal bases are modeled but never observed).
//! [`HandJointSet`] is the 21+1-joint output consumed by the runtime.

use nalgebra::{RealField, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::{Quat, Real, Vec3};

/// Which hand a tracker instance follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// Digit index, thumb first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(usize)]
pub enum Finger {
    Thumb = 0,
    Index = 1,
    Middle = 2,
    Ring = 3,
    Little = 4,
}

impl Finger {
    /// All five digits, thumb first.
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Little,
    ];
}

/// Observed-keypoint indices (MediaPipe order: wrist, then four joints
/// per digit from the knuckle outward).
pub mod keypoint {
    /// Number of observed keypoints per view.
    pub const COUNT: usize = 21;

    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const INDEX_MCP: usize = 5;
    pub const MIDDLE_MCP: usize = 9;
    pub const RING_MCP: usize = 13;
    pub const LITTLE_MCP: usize = 17;
}

/// Thumb chain: CMC, MCP, IP, tip; orientations at the three bones.
#[derive(Debug, Clone)]
pub struct ThumbPose<T: RealField> {
    pub joints: [Vector3<T>; 4],
    pub orientations: [UnitQuaternion<T>; 3],
}

/// Finger chain: metacarpal base, MCP, PIP, DIP, tip; orientations at
/// the four bones.
#[derive(Debug, Clone)]
pub struct FingerPose<T: RealField> {
    pub joints: [Vector3<T>; 5],
    pub orientations: [UnitQuaternion<T>; 4],
}

/// Absolute joint tables for one hand, in the left-camera frame.
///
/// A pure product of forward kinematics: computed fresh from a parameter
/// vector every evaluation, never mutated in place.
#[derive(Debug, Clone)]
pub struct HandPose<T: RealField> {
    pub wrist_position: Vector3<T>,
    pub wrist_orientation: UnitQuaternion<T>,
    pub thumb: ThumbPose<T>,
    /// Index, middle, ring, little.
    pub fingers: [FingerPose<T>; 4],
}

impl<T: RealField> HandPose<T> {
    /// Position of one observed keypoint (MediaPipe index, `0..21`).
    pub fn keypoint(&self, index: usize) -> &Vector3<T> {
        debug_assert!(index < keypoint::COUNT, "keypoint index out of range");
        match index {
            keypoint::WRIST => &self.wrist_position,
            1..=4 => &self.thumb.joints[index - 1],
            _ => {
                let finger = (index - 5) / 4;
                let joint = (index - 5) % 4;
                // Keypoints start at the knuckle; the metacarpal base at
                // table slot 0 is not observed.
                &self.fingers[finger].joints[joint + 1]
            }
        }
    }
}

/// Externally-consumed joint names: palm + wrist + 20 digit joints.
///
/// Thumb joints follow the metacarpal/proximal/distal convention; the
/// four fingers expose their observed chain from the knuckle outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(usize)]
pub enum HandJoint {
    Palm = 0,
    Wrist,
    ThumbMetacarpal,
    ThumbProximal,
    ThumbDistal,
    ThumbTip,
    IndexProximal,
    IndexIntermediate,
    IndexDistal,
    IndexTip,
    MiddleProximal,
    MiddleIntermediate,
    MiddleDistal,
    MiddleTip,
    RingProximal,
    RingIntermediate,
    RingDistal,
    RingTip,
    LittleProximal,
    LittleIntermediate,
    LittleDistal,
    LittleTip,
}

/// Number of joints in [`HandJointSet`].
pub const JOINT_COUNT: usize = 22;

/// Pose of one output joint, left-camera frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for JointPose {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: Quat::identity(),
        }
    }
}

/// The full output joint set for one hand and one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandJointSet {
    pub joints: [JointPose; JOINT_COUNT],
    /// Whether the set as a whole may be trusted this frame.
    pub is_valid: bool,
}

impl Default for HandJointSet {
    fn default() -> Self {
        Self {
            joints: [JointPose::default(); JOINT_COUNT],
            is_valid: false,
        }
    }
}

impl HandJointSet {
    /// Expand a kinematic pose into the external joint naming.
    ///
    /// Tip joints reuse the distal bone orientation; the palm joint is
    /// synthesized midway along the middle proximal phalanx.
    pub fn from_pose(pose: &HandPose<Real>) -> Self {
        let mut joints = [JointPose::default(); JOINT_COUNT];

        joints[HandJoint::Wrist as usize] = JointPose {
            position: pose.wrist_position,
            orientation: pose.wrist_orientation,
        };

        let thumb = &pose.thumb;
        for (slot, (joint, orient)) in [(0, 0), (1, 1), (2, 2), (3, 2)].into_iter().enumerate() {
            joints[HandJoint::ThumbMetacarpal as usize + slot] = JointPose {
                position: thumb.joints[joint],
                orientation: thumb.orientations[orient],
            };
        }

        for (f, finger) in pose.fingers.iter().enumerate() {
            let base = HandJoint::IndexProximal as usize + 4 * f;
            for (slot, (joint, orient)) in
                [(1, 1), (2, 2), (3, 3), (4, 3)].into_iter().enumerate()
            {
                joints[base + slot] = JointPose {
                    position: finger.joints[joint],
                    orientation: finger.orientations[orient],
                };
            }
        }

        let middle = &pose.fingers[Finger::Middle as usize - 1];
        joints[HandJoint::Palm as usize] = JointPose {
            position: (middle.joints[1] + middle.joints[2]) * 0.5,
            orientation: middle.orientations[1],
        };

        Self {
            joints,
            is_valid: true,
        }
    }

    /// Pose of one named joint.
    pub fn joint(&self, joint: HandJoint) -> &JointPose {
        &self.joints[joint as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_pose() -> HandPose<Real> {
        // Distinct positions so the mapping test can detect collisions.
        let mut counter = 0.0;
        let mut next = || {
            counter += 1.0;
            Vec3::new(counter, 0.0, 0.0)
        };
        HandPose {
            wrist_position: next(),
            wrist_orientation: Quat::identity(),
            thumb: ThumbPose {
                joints: std::array::from_fn(|_| next()),
                orientations: std::array::from_fn(|_| Quat::identity()),
            },
            fingers: std::array::from_fn(|_| FingerPose {
                joints: std::array::from_fn(|_| next()),
                orientations: std::array::from_fn(|_| Quat::identity()),
            }),
        }
    }

    #[test]
    fn keypoints_are_distinct_and_cover_all_digits() {
        let pose = dummy_pose();
        let mut seen = Vec::new();
        for i in 0..keypoint::COUNT {
            let p = pose.keypoint(i).x;
            assert!(!seen.contains(&p.to_bits()), "keypoint {i} duplicated");
            seen.push(p.to_bits());
        }
    }

    #[test]
    fn finger_keypoints_skip_the_metacarpal_base() {
        let pose = dummy_pose();
        let index = &pose.fingers[0];
        assert_eq!(pose.keypoint(keypoint::INDEX_MCP), &index.joints[1]);
        assert_eq!(pose.keypoint(keypoint::INDEX_MCP + 3), &index.joints[4]);
    }

    #[test]
    fn palm_sits_on_the_middle_proximal_phalanx() {
        let pose = dummy_pose();
        let set = HandJointSet::from_pose(&pose);
        let middle = &pose.fingers[1];
        let expect = (middle.joints[1] + middle.joints[2]) * 0.5;
        assert_eq!(set.joint(HandJoint::Palm).position, expect);
        assert!(set.is_valid);
    }
}
