//! Residual assembly for the per-frame hand solve.
//!
//! The residual vector is assembled in a fixed section order so its
//! length is a pure function of the configuration:
//! 1. per active view, per keypoint: two stereographic reprojection rows
//!    and one relative-depth row;
//! 2. after the first tracked frame, one temporal-stability row per core
//!    parameter; on the first frame instead one weak prior row per digit
//!    twist (a straight finger's twist moves no keypoint, so without the
//!    prior that direction is a null space of the reprojection terms);
//! 3. under the calibrating layout: one hand-size anchoring row.
//!
//! Everything here is generic over the scalar so the same code produces
//! plain residuals and dual-number residuals for the Jacobian. Weights
//! are plain constants and are never differentiated. All rows are finite
//! for any finite input; a NaN here means corrupt upstream data and is
//! a bug, not a runtime condition.

use nalgebra::{DVector, RealField, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use hand_core::kinematics::{eval_hand_pose, hand_size_param};
use hand_core::layout::{self, CORE_DIM, WRIST_DIM};
use hand_core::math::{quat_cast, vec3_cast};
use hand_core::projection::project;
use hand_core::skeleton::keypoint;
use hand_core::{Finger, HandPose, Handedness, Iso3, ParamLayout, Real};

use crate::observation::{FrameInput, ViewObservation};

/// Rows contributed by one keypoint in one view (x, y, depth).
pub const ROWS_PER_KEYPOINT: usize = 3;
/// Rows contributed by one active view.
pub const ROWS_PER_VIEW: usize = keypoint::COUNT * ROWS_PER_KEYPOINT;
/// First-frame twist prior rows, one per digit.
pub const TWIST_PRIOR_ROWS: usize = 5;

/// Guard added to ray norms before normalization.
const DIRECTION_EPS: f64 = 1.0e-12;

/// Per-term weights of the temporal-stability and auxiliary residuals.
///
/// The individual values are empirically tuned; their relative order of
/// magnitude matters more than their exact values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityWeights {
    pub wrist_translation: Real,
    pub wrist_rotation: Real,
    pub metacarpal_swing: Real,
    pub metacarpal_twist: Real,
    pub proximal_swing: Real,
    pub curl: Real,
    /// Slack added to the curl agreement before clamping to [0, 1].
    pub curl_slack: Real,
    /// Weight of the relative-depth channel.
    pub depth: Real,
    /// Base weight of the hand-size anchoring row. Kept well below the
    /// per-keypoint weights so exact observations win over the anchor.
    pub hand_size: Real,
    /// First-frame prior pinning each digit's metacarpal twist.
    pub twist_prior: Real,
}

impl Default for StabilityWeights {
    fn default() -> Self {
        Self {
            wrist_translation: 2.0,
            wrist_rotation: 1.0,
            metacarpal_swing: 2.5,
            metacarpal_twist: 3.0,
            proximal_swing: 1.2,
            curl: 0.9,
            curl_slack: 0.2,
            depth: 0.25,
            hand_size: 0.15,
            twist_prior: 0.1,
        }
    }
}

impl StabilityWeights {
    /// Scale the temporal terms by a single smoothing factor.
    ///
    /// The depth and hand-size weights are observation weights, not
    /// smoothing terms, and are left untouched.
    pub fn from_smoothing(factor: Real) -> Self {
        let base = Self::default();
        Self {
            wrist_translation: base.wrist_translation * factor,
            wrist_rotation: base.wrist_rotation * factor,
            metacarpal_swing: base.metacarpal_swing * factor,
            metacarpal_twist: base.metacarpal_twist * factor,
            proximal_swing: base.proximal_swing * factor,
            curl: base.curl * factor,
            ..base
        }
    }
}

/// Confidence in the temporal curl prior, from the disagreement between
/// the current observation and the previous converged curl.
///
/// Strong disagreement (fast motion) lowers the weight so fresh
/// observations win; agreement raises it so jitter is suppressed. The
/// clamp saturates the heuristic at both extremes.
pub fn curl_confidence(observed: Real, previous: Real, slack: Real) -> Real {
    (1.0 - (observed - previous).abs() + slack).clamp(0.0, 1.0)
}

/// Everything held constant during one frame's solve.
pub struct ResidualContext<'a> {
    pub input: &'a FrameInput,
    /// Maps left-camera points into the right camera's frame.
    pub t_right_left: &'a Iso3,
    /// Persistent warm-start wrist pose; the wrist parameter block is a
    /// delta on top of this.
    pub pre_transform: &'a Iso3,
    pub handedness: Handedness,
    pub layout: ParamLayout,
    /// Hand size used under [`ParamLayout::FixedSize`].
    pub fixed_hand_size: Real,
    /// Anchor for the hand-size residual (calibrating layout only).
    pub target_hand_size: Real,
    /// Caller-supplied multiplier on the hand-size residual.
    pub hand_size_error_weight: Real,
    /// Previous frame's converged core parameters, wrist block zeroed.
    /// `None` disables the temporal and depth terms (first frame).
    pub prev_params: Option<&'a [Real; CORE_DIM]>,
    /// Previous frame's converged curl sums per digit.
    pub prev_curls: [Real; 5],
    pub weights: StabilityWeights,
}

impl ResidualContext<'_> {
    /// Whether this is the first tracked frame for this hand.
    pub fn first_frame(&self) -> bool {
        self.prev_params.is_none()
    }

    /// Length of the residual vector this context assembles.
    pub fn residual_dim(&self) -> usize {
        residual_dim(
            self.input.active_views(),
            self.first_frame(),
            self.layout,
        )
    }
}

/// Residual-vector length as a function of the configuration.
pub fn residual_dim(active_views: usize, first_frame: bool, layout: ParamLayout) -> usize {
    ROWS_PER_VIEW * active_views
        + if first_frame { TWIST_PRIOR_ROWS } else { CORE_DIM }
        + usize::from(layout.optimizes_hand_size())
}

/// Rigid transform from the left-camera frame into one view's frame.
fn view_transform<T: RealField>(
    ctx: &ResidualContext<'_>,
    view_idx: usize,
) -> (UnitQuaternion<T>, Vector3<T>) {
    if view_idx == 0 {
        (UnitQuaternion::identity(), Vector3::zeros())
    } else {
        (
            quat_cast::<T>(&ctx.t_right_left.rotation),
            vec3_cast::<T>(&ctx.t_right_left.translation.vector),
        )
    }
}

/// Project one camera-space point through a view's stereographic model.
///
/// Returns the stereographic coordinate and the camera distance.
fn project_in_view<T: RealField>(
    p_cam: &Vector3<T>,
    look_inv: &UnitQuaternion<T>,
) -> (Vector2<T>, T) {
    let dist = p_cam.norm();
    let dir = p_cam / (dist.clone() + T::from_f64(DIRECTION_EPS).unwrap());
    let local = look_inv.transform_vector(&dir);
    (project(&local), dist)
}

fn push_view_rows<T: RealField>(
    rows: &mut Vec<T>,
    pose: &HandPose<T>,
    hand_size: &T,
    view: &ViewObservation,
    view_idx: usize,
    ctx: &ResidualContext<'_>,
) {
    let (view_rot, view_trans) = view_transform::<T>(ctx, view_idx);
    let look_inv = quat_cast::<T>(&view.look_dir.inverse());
    let radius = T::from_f64(view.stereographic_radius).unwrap();

    // Depth is discounted aggressively: unreliable depth estimates get
    // their confidence cubed, and the channel stays off until a
    // trustworthy previous frame exists. While calibrating hand size it
    // is always on; the depth rows are the strongest size observation
    // and calibration without them settles at the anchor instead of the
    // data.
    let depth_ramp = if ctx.first_frame() && !ctx.layout.optimizes_hand_size() {
        0.0
    } else {
        ctx.weights.depth
    };

    let middle_cam = view_rot.transform_vector(pose.keypoint(keypoint::MIDDLE_MCP))
        + view_trans.clone();
    let middle_dist = middle_cam.norm();

    for k in 0..keypoint::COUNT {
        let p_cam = view_rot.transform_vector(pose.keypoint(k)) + view_trans.clone();
        let (proj, dist) = project_in_view(&p_cam, &look_inv);

        let obs = &view.joints[k];
        let w_xy = T::from_f64(obs.conf_xy).unwrap();
        let obs_x = T::from_f64(obs.pos.x).unwrap() * radius.clone();
        let obs_y = T::from_f64(obs.pos.y).unwrap() * radius.clone();
        rows.push((proj.x.clone() - obs_x) * w_xy.clone());
        rows.push((proj.y.clone() - obs_y) * w_xy);

        let w_depth = T::from_f64(obs.conf_depth.powi(3) * depth_ramp).unwrap();
        let model_depth = (dist - middle_dist.clone()) / hand_size.clone();
        rows.push((model_depth - T::from_f64(obs.depth).unwrap()) * w_depth);
    }
}

/// Per-parameter weights of the temporal-stability section.
fn stability_row_weights(ctx: &ResidualContext<'_>) -> [Real; CORE_DIM] {
    let w = &ctx.weights;
    let mut out = [0.0; CORE_DIM];
    out[..3].fill(w.wrist_translation);
    out[3..WRIST_DIM].fill(w.wrist_rotation);

    for (f, finger) in Finger::ALL.into_iter().enumerate() {
        let o = layout::finger_offset(finger);
        out[o] = w.metacarpal_swing;
        out[o + 1] = w.metacarpal_swing;
        out[o + 2] = w.metacarpal_twist;
        if finger != Finger::Thumb {
            out[o + 3] = w.proximal_swing;
            out[o + 4] = w.proximal_swing;
        }

        let curl_conf = match ctx.input.combined_curl(f) {
            Some(observed) => curl_confidence(observed, ctx.prev_curls[f], w.curl_slack),
            None => 1.0,
        };
        let (c0, c1) = layout::curl_offsets(finger);
        out[c0] = w.curl * curl_conf;
        out[c1] = w.curl * curl_conf;
    }
    out
}

/// Assemble the full residual vector for one candidate parameter vector.
pub fn residuals<T: RealField>(x: &[T], ctx: &ResidualContext<'_>) -> DVector<T> {
    debug_assert_eq!(x.len(), ctx.layout.param_dim());
    let pose = eval_hand_pose(
        x,
        ctx.layout,
        ctx.pre_transform,
        ctx.handedness,
        ctx.fixed_hand_size,
    );
    let hand_size = hand_size_param(x, ctx.layout, ctx.fixed_hand_size);

    let expected = ctx.residual_dim();
    let mut rows: Vec<T> = Vec::with_capacity(expected);

    for (view_idx, view) in ctx.input.views.iter().enumerate() {
        if !view.active {
            continue;
        }
        push_view_rows(&mut rows, &pose, &hand_size, view, view_idx, ctx);
    }

    match ctx.prev_params {
        Some(prev) => {
            let weights = stability_row_weights(ctx);
            for i in 0..CORE_DIM {
                rows.push(
                    (x[i].clone() - T::from_f64(prev[i]).unwrap())
                        * T::from_f64(weights[i]).unwrap(),
                );
            }
        }
        // A straight digit's metacarpal twist moves no keypoint, so on
        // the first frame the reprojection terms alone leave it
        // unconstrained. A weak pull to neutral pins that direction
        // without fighting the data once the digit bends.
        None => {
            let w = T::from_f64(ctx.weights.twist_prior).unwrap();
            for finger in Finger::ALL {
                let o = layout::finger_offset(finger);
                rows.push(x[o + 2].clone() * w.clone());
            }
        }
    }

    if ctx.layout.optimizes_hand_size() {
        let target = T::from_f64(ctx.target_hand_size).unwrap();
        let w = T::from_f64(ctx.weights.hand_size * ctx.hand_size_error_weight).unwrap();
        rows.push((x[layout::HAND_SIZE_OFFSET].clone() - target.clone()) / target * w);
    }

    // Length mismatch means the sizing formula and the assembly above
    // disagree on the configuration; kept as a hard check in release.
    assert_eq!(rows.len(), expected, "residual layout mismatch");
    // Sanitized inputs cannot produce NaN/Inf here; a hit means corrupt
    // upstream data or a model bug.
    debug_assert!(
        rows.iter().all(|r| r.is_finite()),
        "non-finite residual assembled"
    );
    DVector::from_vec(rows)
}

/// Mean confidence-unweighted reprojection error, stereographic units.
///
/// The quality signal surfaced to the caller; infinite when no view is
/// active.
pub fn mean_reprojection_error(x: &[Real], ctx: &ResidualContext<'_>) -> Real {
    let pose = eval_hand_pose::<Real>(
        x,
        ctx.layout,
        ctx.pre_transform,
        ctx.handedness,
        ctx.fixed_hand_size,
    );

    let mut sum = 0.0;
    let mut count = 0usize;
    for (view_idx, view) in ctx.input.views.iter().enumerate() {
        if !view.active {
            continue;
        }
        let (view_rot, view_trans) = view_transform::<Real>(ctx, view_idx);
        let look_inv = view.look_dir.inverse();
        for k in 0..keypoint::COUNT {
            let p_cam = view_rot.transform_vector(pose.keypoint(k)) + view_trans;
            let (proj, _) = project_in_view(&p_cam, &look_inv);
            let obs = view.joints[k].pos * view.stereographic_radius;
            sum += (proj - obs).norm();
            count += 1;
        }
    }

    if count == 0 {
        Real::INFINITY
    } else {
        sum / count as Real
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use approx::assert_relative_eq;
    use hand_core::layout::{PARAM_DIM_CALIBRATING, PARAM_DIM_FIXED};
    use nalgebra::Translation3;

    fn test_extrinsic() -> Iso3 {
        Iso3::from_parts(Translation3::new(-0.064, 0.0, 0.0), Default::default())
    }

    fn reference_params() -> Vec<Real> {
        let mut x = vec![0.0; PARAM_DIM_FIXED];
        for finger in Finger::ALL {
            let (c0, c1) = layout::curl_offsets(finger);
            x[c0] = 0.3;
            x[c1] = 0.2;
        }
        x
    }

    fn make_input(active: [bool; 2]) -> FrameInput {
        let pre = Iso3::from_parts(Translation3::new(0.0, 0.0, 0.35), Default::default());
        let pose = eval_hand_pose::<Real>(
            &reference_params(),
            ParamLayout::FixedSize,
            &pre,
            Handedness::Left,
            0.09,
        );
        let mut input = synthetic::render_frame(&pose, &test_extrinsic(), 0.8);
        input.views[0].active = active[0];
        input.views[1].active = active[1];
        input
    }

    #[test]
    fn residual_length_matches_the_formula_for_every_configuration() {
        let t_rl = test_extrinsic();
        let pre = Iso3::from_parts(Translation3::new(0.0, 0.0, 0.35), Default::default());
        let prev = [0.0; CORE_DIM];

        for active in [[false, false], [true, false], [false, true], [true, true]] {
            let input = make_input(active);
            for layout_kind in [ParamLayout::FixedSize, ParamLayout::CalibratingSize] {
                for first in [true, false] {
                    let ctx = ResidualContext {
                        input: &input,
                        t_right_left: &t_rl,
                        pre_transform: &pre,
                        handedness: Handedness::Left,
                        layout: layout_kind,
                        fixed_hand_size: 0.09,
                        target_hand_size: 0.09,
                        hand_size_error_weight: 1.0,
                        prev_params: (!first).then_some(&prev),
                        prev_curls: [0.0; 5],
                        weights: StabilityWeights::default(),
                    };
                    let mut x: Vec<Real> = vec![0.0; layout_kind.param_dim()];
                    if layout_kind.optimizes_hand_size() {
                        x[layout::HAND_SIZE_OFFSET] = 0.09;
                    }
                    let r = residuals(&x, &ctx);
                    assert_eq!(
                        r.len(),
                        residual_dim(input.active_views(), first, layout_kind)
                    );
                    assert!(r.iter().all(|v| f64::is_finite(*v)));
                }
            }
        }
    }

    #[test]
    fn residuals_vanish_at_the_generating_pose() {
        let input = make_input([true, true]);
        let t_rl = test_extrinsic();
        let pre = Iso3::from_parts(Translation3::new(0.0, 0.0, 0.35), Default::default());
        let ctx = ResidualContext {
            input: &input,
            t_right_left: &t_rl,
            pre_transform: &pre,
            handedness: Handedness::Left,
            layout: ParamLayout::FixedSize,
            fixed_hand_size: 0.09,
            target_hand_size: 0.09,
            hand_size_error_weight: 1.0,
            prev_params: None,
            prev_curls: [0.0; 5],
            weights: StabilityWeights::default(),
        };
        let r = residuals(&reference_params(), &ctx);
        assert_relative_eq!(r.norm(), 0.0, epsilon = 1e-9);
        assert!(mean_reprojection_error(&reference_params(), &ctx) < 1e-10);
    }

    #[test]
    fn curl_disagreement_lowers_the_temporal_weight() {
        assert!(curl_confidence(1.0, 0.0, 0.2) < curl_confidence(0.1, 0.0, 0.2));
        // Saturates at both extremes.
        assert_eq!(curl_confidence(0.0, 0.0, 0.2), 1.0);
        assert_eq!(curl_confidence(3.0, 0.0, 0.2), 0.0);
    }

    #[test]
    fn curl_stability_rows_are_modulated_by_observation_disagreement() {
        let mut input = make_input([true, true]);
        let t_rl = test_extrinsic();
        let pre = Iso3::identity();
        let prev = [0.0; CORE_DIM];

        let weights_for = |input: &FrameInput| {
            let ctx = ResidualContext {
                input,
                t_right_left: &t_rl,
                pre_transform: &pre,
                handedness: Handedness::Left,
                layout: ParamLayout::FixedSize,
                fixed_hand_size: 0.09,
                target_hand_size: 0.09,
                hand_size_error_weight: 1.0,
                prev_params: Some(&prev),
                prev_curls: [0.5; 5],
                weights: StabilityWeights::default(),
            };
            stability_row_weights(&ctx)
        };

        // Agreeing observation.
        for view in &mut input.views {
            view.curls[1].value = 0.5;
            view.curls[1].variance = 0.01;
        }
        let agreeing = weights_for(&input);

        // Sharply disagreeing observation.
        for view in &mut input.views {
            view.curls[1].value = 1.4;
        }
        let disagreeing = weights_for(&input);

        let (c0, _) = layout::curl_offsets(Finger::Index);
        assert!(disagreeing[c0] < agreeing[c0]);
        // Non-curl rows are unaffected.
        let o = layout::finger_offset(Finger::Index);
        assert_eq!(disagreeing[o], agreeing[o]);
    }

    #[test]
    fn depth_rows_are_disabled_on_the_first_frame() {
        let input = make_input([true, false]);
        let t_rl = test_extrinsic();
        let pre = Iso3::from_parts(Translation3::new(0.0, 0.0, 0.35), Default::default());
        let mut x: Vec<Real> = vec![0.0; PARAM_DIM_FIXED];
        // Perturb the wrist so depth rows would be nonzero if enabled.
        x[2] = 0.05;

        let ctx = ResidualContext {
            input: &input,
            t_right_left: &t_rl,
            pre_transform: &pre,
            handedness: Handedness::Left,
            layout: ParamLayout::FixedSize,
            fixed_hand_size: 0.09,
            target_hand_size: 0.09,
            hand_size_error_weight: 1.0,
            prev_params: None,
            prev_curls: [0.0; 5],
            weights: StabilityWeights::default(),
        };
        let r = residuals(&x, &ctx);
        for k in 0..keypoint::COUNT {
            assert_eq!(r[ROWS_PER_KEYPOINT * k + 2], 0.0);
        }
    }

    #[test]
    fn hand_size_row_scales_with_the_caller_multiplier() {
        let input = make_input([true, true]);
        let t_rl = test_extrinsic();
        let pre = Iso3::from_parts(Translation3::new(0.0, 0.0, 0.35), Default::default());
        let mut x: Vec<Real> = vec![0.0; PARAM_DIM_CALIBRATING];
        x[layout::HAND_SIZE_OFFSET] = 0.099;

        let row_with = |mult: Real| {
            let ctx = ResidualContext {
                input: &input,
                t_right_left: &t_rl,
                pre_transform: &pre,
                handedness: Handedness::Left,
                layout: ParamLayout::CalibratingSize,
                fixed_hand_size: 0.09,
                target_hand_size: 0.09,
                hand_size_error_weight: mult,
                prev_params: None,
                prev_curls: [0.0; 5],
                weights: StabilityWeights::default(),
            };
            let r = residuals(&x, &ctx);
            r[r.len() - 1]
        };
        assert_relative_eq!(row_with(2.0), 2.0 * row_with(1.0), epsilon = 1e-12);
        assert!(row_with(1.0) > 0.0);
    }
}
