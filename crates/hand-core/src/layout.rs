//! Parameter-vector layout of the hand optimization problem.
//!
//! Every component that packs, unpacks or sizes the parameter vector
//! derives its offsets from this module, so the layout can only be
//! changed in one place.
//!
//! Core layout (39 scalars):
//! - wrist: 3 translation deltas + 3 scaled-axis rotation deltas,
//!   relative to the persistent pre-transform pose;
//! - thumb: metacarpal swing X/Y + twist, then two curls;
//! - each finger: metacarpal swing X/Y + twist, proximal swing X/Y,
//!   then two curls.
//!
//! When hand-size calibration is active a single trailing scale factor
//! is appended, giving 40 scalars. The two lengths are the only layouts
//! that exist; [`ParamLayout`] is the closed set selecting between them.

use serde::{Deserialize, Serialize};

use crate::skeleton::Finger;

/// Wrist block: translation delta + rotation delta.
pub const WRIST_DIM: usize = 6;
/// Thumb block: swing X/Y, twist, two curls.
pub const THUMB_DIM: usize = 5;
/// Finger block: metacarpal swing X/Y, twist, proximal swing X/Y, two curls.
pub const FINGER_DIM: usize = 7;
/// All pose parameters excluding hand size.
pub const CORE_DIM: usize = WRIST_DIM + THUMB_DIM + 4 * FINGER_DIM;

/// Parameter count when hand size is fixed.
pub const PARAM_DIM_FIXED: usize = CORE_DIM;
/// Parameter count when hand size is a free parameter.
pub const PARAM_DIM_CALIBRATING: usize = CORE_DIM + 1;

/// Index of the wrist block.
pub const WRIST_OFFSET: usize = 0;
/// Index of the trailing hand-size scalar (calibrating layout only).
pub const HAND_SIZE_OFFSET: usize = CORE_DIM;

/// Offset of one digit's parameter block.
pub const fn finger_offset(finger: Finger) -> usize {
    match finger {
        Finger::Thumb => WRIST_DIM,
        Finger::Index => WRIST_DIM + THUMB_DIM,
        Finger::Middle => WRIST_DIM + THUMB_DIM + FINGER_DIM,
        Finger::Ring => WRIST_DIM + THUMB_DIM + 2 * FINGER_DIM,
        Finger::Little => WRIST_DIM + THUMB_DIM + 3 * FINGER_DIM,
    }
}

/// Offsets of the two curl scalars inside one digit's block.
pub const fn curl_offsets(finger: Finger) -> (usize, usize) {
    let base = finger_offset(finger);
    match finger {
        Finger::Thumb => (base + 3, base + 4),
        _ => (base + 5, base + 6),
    }
}

/// The closed set of parameter-vector flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamLayout {
    /// Hand size is a fixed input; 39 parameters.
    FixedSize,
    /// Hand size is optimized with a target-anchoring residual; 40.
    CalibratingSize,
}

impl ParamLayout {
    /// Length of the parameter vector under this layout.
    pub const fn param_dim(self) -> usize {
        match self {
            ParamLayout::FixedSize => PARAM_DIM_FIXED,
            ParamLayout::CalibratingSize => PARAM_DIM_CALIBRATING,
        }
    }

    /// Whether the trailing hand-size scalar is present.
    pub const fn optimizes_hand_size(self) -> bool {
        matches!(self, ParamLayout::CalibratingSize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_tile_the_core_vector() {
        assert_eq!(finger_offset(Finger::Thumb), WRIST_DIM);
        assert_eq!(
            finger_offset(Finger::Index),
            finger_offset(Finger::Thumb) + THUMB_DIM
        );
        assert_eq!(
            finger_offset(Finger::Little) + FINGER_DIM,
            CORE_DIM
        );
    }

    #[test]
    fn layout_dims() {
        assert_eq!(CORE_DIM, 39);
        assert_eq!(ParamLayout::FixedSize.param_dim(), 39);
        assert_eq!(ParamLayout::CalibratingSize.param_dim(), 40);
        assert!(ParamLayout::CalibratingSize.optimizes_hand_size());
        assert!(!ParamLayout::FixedSize.optimizes_hand_size());
    }

    #[test]
    fn curl_offsets_sit_at_the_block_tail() {
        let (a, b) = curl_offsets(Finger::Thumb);
        assert_eq!(b, a + 1);
        assert_eq!(b, finger_offset(Finger::Thumb) + THUMB_DIM - 1);
        let (a, b) = curl_offsets(Finger::Ring);
        assert_eq!(b, a + 1);
        assert_eq!(b, finger_offset(Finger::Ring) + FINGER_DIM - 1);
    }
}
