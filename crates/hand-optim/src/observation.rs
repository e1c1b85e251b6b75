//! Per-frame observation records handed over by the external detector.
//!
//! Each frame carries up to two active views (left camera first). The
//! optimizer treats the records as read-only; only the curl values are
//! copied into persistent state after a solve. [`FrameInput::sanitized`]
//! clamps confidences and variances away from exact zero so no residual
//! weight can divide by or collapse to nothing.

use serde::{Deserialize, Serialize};

use hand_core::skeleton::keypoint;
use hand_core::{Quat, Real, Vec2};

/// Smallest confidence a sanitized observation can carry.
pub const MIN_CONFIDENCE: Real = 1.0e-4;
/// Smallest curl variance a sanitized observation can carry.
pub const MIN_VARIANCE: Real = 1.0e-6;

/// One observed keypoint in one view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointObservation {
    /// Stereographic coordinate in the network's normalized [-1, 1]
    /// output space; multiply by the view's stereographic radius for
    /// true stereographic units.
    pub pos: Vec2,
    /// Distance from the camera relative to the middle-proximal joint,
    /// signed, in units of hand size.
    pub depth: Real,
    /// Confidence of the 2D channel, (0, 1].
    pub conf_xy: Real,
    /// Confidence of the depth channel, (0, 1].
    pub conf_depth: Real,
}

impl Default for JointObservation {
    fn default() -> Self {
        Self {
            pos: Vec2::zeros(),
            depth: 0.0,
            conf_xy: MIN_CONFIDENCE,
            conf_depth: MIN_CONFIDENCE,
        }
    }
}

/// Per-finger curl estimate with its variance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurlObservation {
    pub value: Real,
    pub variance: Real,
}

impl Default for CurlObservation {
    fn default() -> Self {
        Self {
            value: 0.0,
            variance: 1.0,
        }
    }
}

/// Everything the detector produced for one camera view of one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewObservation {
    /// Whether this view currently has a valid hand detection.
    pub active: bool,
    /// Orientation of the stereographic optical axis in this view's
    /// camera frame (accounts for crop/rotation applied before the
    /// network ran).
    pub look_dir: Quat,
    /// Scale mapping normalized network output to stereographic units.
    pub stereographic_radius: Real,
    pub joints: [JointObservation; keypoint::COUNT],
    /// Thumb, index, middle, ring, little.
    pub curls: [CurlObservation; 5],
}

impl Default for ViewObservation {
    fn default() -> Self {
        Self {
            active: false,
            look_dir: Quat::identity(),
            stereographic_radius: 1.0,
            joints: [JointObservation::default(); keypoint::COUNT],
            curls: [CurlObservation::default(); 5],
        }
    }
}

impl ViewObservation {
    /// Clamp confidences and variances away from exact zero.
    pub fn sanitize(&mut self) {
        for joint in &mut self.joints {
            joint.conf_xy = joint.conf_xy.clamp(MIN_CONFIDENCE, 1.0);
            joint.conf_depth = joint.conf_depth.clamp(MIN_CONFIDENCE, 1.0);
        }
        for curl in &mut self.curls {
            curl.variance = curl.variance.max(MIN_VARIANCE);
        }
    }
}

/// Both views of one frame; index 0 is the left camera, 1 the right.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameInput {
    pub views: [ViewObservation; 2],
}

impl FrameInput {
    /// Number of views with a valid detection this frame.
    pub fn active_views(&self) -> usize {
        self.views.iter().filter(|v| v.active).count()
    }

    /// A copy with all confidences and variances clamped into range.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        for view in &mut out.views {
            view.sanitize();
        }
        out
    }

    /// Inverse-variance weighted curl estimate across active views.
    ///
    /// `None` when no view is active.
    pub fn combined_curl(&self, finger: usize) -> Option<Real> {
        let mut num = 0.0;
        let mut den = 0.0;
        for view in &self.views {
            if !view.active {
                continue;
            }
            let curl = &view.curls[finger];
            let w = 1.0 / curl.variance.max(MIN_VARIANCE);
            num += curl.value * w;
            den += w;
        }
        (den > 0.0).then(|| num / den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_floors_confidences_and_variances() {
        let mut input = FrameInput::default();
        input.views[0].active = true;
        input.views[0].joints[3].conf_xy = 0.0;
        input.views[0].joints[3].conf_depth = -1.0;
        input.views[0].curls[2].variance = 0.0;
        let clean = input.sanitized();
        assert!(clean.views[0].joints[3].conf_xy >= MIN_CONFIDENCE);
        assert!(clean.views[0].joints[3].conf_depth >= MIN_CONFIDENCE);
        assert!(clean.views[0].curls[2].variance >= MIN_VARIANCE);
    }

    #[test]
    fn active_view_count() {
        let mut input = FrameInput::default();
        assert_eq!(input.active_views(), 0);
        input.views[1].active = true;
        assert_eq!(input.active_views(), 1);
        input.views[0].active = true;
        assert_eq!(input.active_views(), 2);
    }

    #[test]
    fn combined_curl_prefers_low_variance() {
        let mut input = FrameInput::default();
        input.views[0].active = true;
        input.views[1].active = true;
        input.views[0].curls[0] = CurlObservation {
            value: 1.0,
            variance: 0.01,
        };
        input.views[1].curls[0] = CurlObservation {
            value: 0.0,
            variance: 1.0,
        };
        let curl = input.combined_curl(0).unwrap();
        assert!(curl > 0.9);
        assert!(input.combined_curl(1).is_some());

        let empty = FrameInput::default();
        assert!(empty.combined_curl(0).is_none());
    }
}
