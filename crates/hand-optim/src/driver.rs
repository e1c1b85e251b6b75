//! Per-hand tracker driving one optimizer run per stereo frame.
//!
//! The tracker owns all state carried between frames: the warm-start
//! wrist transform, the previous converged parameters and curls, and
//! the calibrated hand size. Callers feed it one [`FrameInput`] per
//! frame and get back world-space joint poses.

use log::{debug, warn};
use nalgebra::{SVector, Translation3};
use serde::{Deserialize, Serialize};

use hand_core::anthropometry::{DEFAULT_HAND_SIZE, MAX_HAND_SIZE, MIN_HAND_SIZE};
use hand_core::kinematics::eval_hand_pose;
use hand_core::layout::{self, CORE_DIM, PARAM_DIM_CALIBRATING, PARAM_DIM_FIXED, WRIST_DIM};
use hand_core::math::quat_from_scaled_axis_safe;
use hand_core::{Finger, HandJointSet, Handedness, Iso3, ParamLayout, Real, Vec3};

use crate::initial_guess::estimate_initial_pose;
use crate::observation::FrameInput;
use crate::residuals::{mean_reprojection_error, ResidualContext, StabilityWeights};
use crate::solver::{solve_frame, SolveOptions, SolveReport};

/// Configuration fixed for the lifetime of a tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackerOptions {
    pub max_iterations: usize,
    /// Hand size assumed until calibration provides a better one.
    pub initial_hand_size: Real,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            initial_hand_size: DEFAULT_HAND_SIZE,
        }
    }
}

/// Per-frame knobs supplied by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrameOptions {
    /// Solve for hand size this frame instead of holding it fixed.
    pub optimize_hand_size: bool,
    /// Anchor of the hand-size residual while calibrating.
    pub target_hand_size: Real,
    /// Multiplier on the hand-size anchoring residual.
    pub hand_size_error_weight: Real,
    /// The hand was lost since the previous frame; temporal state is
    /// discarded before solving.
    pub untracked_last_frame: bool,
    /// Scales the temporal-stability terms; 1 is nominal.
    pub smoothing_factor: Real,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            optimize_hand_size: false,
            target_hand_size: DEFAULT_HAND_SIZE,
            hand_size_error_weight: 1.0,
            untracked_last_frame: false,
            smoothing_factor: 1.0,
        }
    }
}

/// Output of one frame.
#[derive(Debug, Clone)]
pub struct FrameResult {
    /// World-space joint poses, valid only when `tracked`.
    pub joints: HandJointSet,
    /// Hand size after this frame, metres.
    pub hand_size: Real,
    /// Mean unweighted reprojection error in stereographic units;
    /// infinite when the frame could not be solved.
    pub reprojection_error: Real,
    pub tracked: bool,
    pub report: Option<SolveReport>,
}

impl FrameResult {
    fn untracked(hand_size: Real) -> Self {
        Self {
            joints: HandJointSet::default(),
            hand_size,
            reprojection_error: Real::INFINITY,
            tracked: false,
            report: None,
        }
    }
}

/// Stateful optimizer for one hand.
pub struct HandTracker {
    handedness: Handedness,
    /// Maps left-camera points into the right camera's frame.
    t_right_left: Iso3,
    max_iterations: usize,
    /// Warm-start wrist pose; the solved wrist delta is folded back in
    /// after every frame so the parameter block restarts near zero.
    pre_transform: Iso3,
    hand_size: Real,
    prev_params: Option<[Real; CORE_DIM]>,
    prev_curls: [Real; 5],
}

impl HandTracker {
    pub fn new(handedness: Handedness, t_right_left: Iso3, options: TrackerOptions) -> Self {
        Self {
            handedness,
            t_right_left,
            max_iterations: options.max_iterations,
            pre_transform: Iso3::identity(),
            hand_size: options
                .initial_hand_size
                .clamp(MIN_HAND_SIZE, MAX_HAND_SIZE),
            prev_params: None,
            prev_curls: [0.0; 5],
        }
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Current hand-size estimate, metres.
    pub fn hand_size(&self) -> Real {
        self.hand_size
    }

    /// Drop all temporal state; the next frame solves cold.
    pub fn reset(&mut self) {
        self.pre_transform = Iso3::identity();
        self.prev_params = None;
        self.prev_curls = [0.0; 5];
    }

    /// Solve one stereo frame.
    pub fn run_frame(&mut self, input: &FrameInput, options: &FrameOptions) -> FrameResult {
        if options.untracked_last_frame {
            self.reset();
        }

        let input = input.sanitized();
        if input.active_views() == 0 {
            self.reset();
            return FrameResult::untracked(self.hand_size);
        }

        // A cold tracker needs a fresh wrist estimate; a warm one keeps
        // following its own prediction.
        if self.prev_params.is_none() {
            match estimate_initial_pose(&input, &self.t_right_left, self.hand_size, self.handedness)
            {
                Ok(pose) => self.pre_transform = pose,
                Err(err) => {
                    warn!("initial pose estimation failed ({err}), using fallback");
                    self.pre_transform =
                        Iso3::from_parts(Translation3::new(0.0, 0.0, 0.4), Default::default());
                }
            }
        }

        let layout_kind = if options.optimize_hand_size {
            ParamLayout::CalibratingSize
        } else {
            ParamLayout::FixedSize
        };
        let ctx = ResidualContext {
            input: &input,
            t_right_left: &self.t_right_left,
            pre_transform: &self.pre_transform,
            handedness: self.handedness,
            layout: layout_kind,
            fixed_hand_size: self.hand_size,
            target_hand_size: options.target_hand_size,
            hand_size_error_weight: options.hand_size_error_weight,
            prev_params: self.prev_params.as_ref(),
            prev_curls: self.prev_curls,
            weights: StabilityWeights::from_smoothing(options.smoothing_factor),
        };
        let solve_opts = SolveOptions {
            max_iters: self.max_iterations,
        };

        let (core, size, report) = match layout_kind {
            ParamLayout::FixedSize => {
                let mut x0 = SVector::<Real, PARAM_DIM_FIXED>::zeros();
                if let Some(prev) = &self.prev_params {
                    x0.as_mut_slice().copy_from_slice(prev);
                }
                let (x, report) = solve_frame(&ctx, x0, &solve_opts);
                let mut core = [0.0; CORE_DIM];
                core.copy_from_slice(x.as_slice());
                (core, self.hand_size, report)
            }
            ParamLayout::CalibratingSize => {
                let mut x0 = SVector::<Real, PARAM_DIM_CALIBRATING>::zeros();
                if let Some(prev) = &self.prev_params {
                    x0.as_mut_slice()[..CORE_DIM].copy_from_slice(prev);
                }
                x0[layout::HAND_SIZE_OFFSET] = self.hand_size;
                let (x, report) = solve_frame(&ctx, x0, &solve_opts);
                let mut core = [0.0; CORE_DIM];
                core.copy_from_slice(&x.as_slice()[..CORE_DIM]);
                (core, x[layout::HAND_SIZE_OFFSET], report)
            }
        };

        let mut full = core.to_vec();
        if layout_kind.optimizes_hand_size() {
            full.push(size);
        }
        let reprojection_error = mean_reprojection_error(&full, &ctx);
        let pose = eval_hand_pose::<Real>(
            &full,
            layout_kind,
            &self.pre_transform,
            self.handedness,
            self.hand_size,
        );

        self.absorb_wrist_delta(&core);
        self.hand_size = size.clamp(MIN_HAND_SIZE, MAX_HAND_SIZE);
        for (f, finger) in Finger::ALL.into_iter().enumerate() {
            let (c0, c1) = layout::curl_offsets(finger);
            self.prev_curls[f] = core[c0] + core[c1];
        }
        let mut stored = core;
        stored[..WRIST_DIM].fill(0.0);
        self.prev_params = Some(stored);

        debug!(
            "{:?} hand: {} evaluations, cost {:.3e}, reprojection {:.3e}",
            self.handedness, report.iterations, report.final_cost, reprojection_error
        );

        FrameResult {
            joints: HandJointSet::from_pose(&pose),
            hand_size: self.hand_size,
            reprojection_error,
            tracked: true,
            report: Some(report),
        }
    }

    /// Fold the solved wrist delta into the persistent warm-start
    /// transform so the next frame's wrist block starts at zero.
    fn absorb_wrist_delta(&mut self, core: &[Real; CORE_DIM]) {
        let delta_t = Vec3::new(core[0], core[1], core[2]);
        let delta_q = quat_from_scaled_axis_safe(Vec3::new(core[3], core[4], core[5]));
        self.pre_transform *= Iso3::from_parts(Translation3::from(delta_t), delta_q);
    }
}
