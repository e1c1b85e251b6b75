//! Average adult hand proportions.
//!
//! All lengths are expressed in units of hand size, where hand size is
//! the metric distance from the wrist to the middle-finger metacarpal
//! head (MCP). The tables describe a left hand in the wrist frame:
//! +X toward the thumb (radial) side, +Y toward the back of the hand,
//! +Z from the wrist toward the fingertips. Right-hand evaluation
//! mirrors the X component of every local offset.
//!
//! These constants are data, not behavior; the skeleton sanity tests in
//! [`crate::kinematics`] target them.

use crate::math::{Real, Vec3};
use crate::skeleton::Finger;

/// Default metric hand size (wrist → middle MCP), metres.
pub const DEFAULT_HAND_SIZE: Real = 0.09;
/// Smallest plausible adult hand size, metres.
pub const MIN_HAND_SIZE: Real = 0.06;
/// Largest plausible adult hand size, metres.
pub const MAX_HAND_SIZE: Real = 0.13;

/// Phalanx lengths for one digit, proximal to distal, in hand-size units.
#[derive(Debug, Clone, Copy)]
pub struct DigitProportions {
    /// Offset of the metacarpal base (thumb: CMC joint) from the wrist.
    pub base_offset: [Real; 3],
    /// Metacarpal length, base → MCP (thumb: CMC → MCP).
    pub metacarpal: Real,
    /// Proximal phalanx length.
    pub proximal: Real,
    /// Intermediate phalanx length (thumb: unused, zero).
    pub intermediate: Real,
    /// Distal phalanx length, ending at the fingertip.
    pub distal: Real,
}

/// Proportions for all five digits, indexed by [`Finger`].
///
/// The middle-finger chain is calibrated so that with all joint
/// parameters at zero the wrist → middle MCP distance is exactly 1.
pub const DIGITS: [DigitProportions; 5] = [
    // Thumb: CMC sits low on the radial side; no intermediate phalanx.
    DigitProportions {
        base_offset: [0.25, -0.10, 0.12],
        metacarpal: 0.50,
        proximal: 0.36,
        intermediate: 0.0,
        distal: 0.28,
    },
    // Index
    DigitProportions {
        base_offset: [0.18, 0.01, 0.24],
        metacarpal: 0.70,
        proximal: 0.45,
        intermediate: 0.27,
        distal: 0.21,
    },
    // Middle
    DigitProportions {
        base_offset: [0.0, 0.0, 0.25],
        metacarpal: 0.75,
        proximal: 0.50,
        intermediate: 0.31,
        distal: 0.22,
    },
    // Ring
    DigitProportions {
        base_offset: [-0.16, 0.0, 0.24],
        metacarpal: 0.68,
        proximal: 0.46,
        intermediate: 0.30,
        distal: 0.22,
    },
    // Little
    DigitProportions {
        base_offset: [-0.30, 0.0, 0.22],
        metacarpal: 0.62,
        proximal: 0.35,
        intermediate: 0.22,
        distal: 0.19,
    },
];

/// Fixed orientation of the thumb metacarpal root, left hand.
///
/// The thumb column does not lie in the palm plane; this hand-tuned
/// rotation tilts the chain palmar and radial before the optimized
/// swing/twist applies. Euler angles (roll, pitch, yaw) in radians.
pub const THUMB_METACARPAL_EULER: [Real; 3] = [0.5, 0.9, 0.2];

/// Look up the proportions of one digit.
pub fn digit(finger: Finger) -> &'static DigitProportions {
    &DIGITS[finger as usize]
}

/// Metacarpal base offset as a vector, left hand, hand-size units.
pub fn base_offset(finger: Finger) -> Vec3 {
    let o = DIGITS[finger as usize].base_offset;
    Vec3::new(o[0], o[1], o[2])
}
