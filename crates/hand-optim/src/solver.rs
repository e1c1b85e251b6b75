//! Levenberg-Marquardt wrapper for the per-frame solve.
//!
//! The parameter layout is known at compile time, so the Jacobian comes
//! from forward-mode dual numbers over a statically sized parameter
//! vector; no analytic derivatives are maintained by hand. The solver
//! itself runs on dynamically sized storage.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, Const, DMatrix, DVector, Dyn, OMatrix, SVector};
use num_dual::{jacobian, DualSVec64};
use serde::{Deserialize, Serialize};

use hand_core::Real;

use crate::residuals::{residuals, ResidualContext};

/// Solver knobs kept per tracker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Iteration cap; real-time callers keep this small.
    pub max_iters: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self { max_iters: 30 }
    }
}

/// Outcome summary of one frame's solve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    /// Final value of 0.5 * ||r||^2.
    pub final_cost: Real,
    pub converged: bool,
}

/// Residuals and Jacobian at one parameter vector, via dual numbers.
pub(crate) fn jacobian_ad<const N: usize>(
    ctx: &ResidualContext<'_>,
    x: &SVector<Real, N>,
) -> (DVector<Real>, OMatrix<Real, Dyn, Const<N>>) {
    jacobian(|p: SVector<DualSVec64<N>, N>| residuals(p.as_slice(), ctx), *x)
}

struct FrameProblem<'a, const N: usize> {
    ctx: &'a ResidualContext<'a>,
    params: DVector<Real>,
}

impl<const N: usize> FrameProblem<'_, N> {
    fn params_static(&self) -> SVector<Real, N> {
        SVector::from_column_slice(self.params.as_slice())
    }
}

impl<const N: usize> LeastSquaresProblem<Real, Dyn, Dyn> for FrameProblem<'_, N> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        Some(residuals(self.params.as_slice(), self.ctx))
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let (_, jac) = jacobian_ad(self.ctx, &self.params_static());
        Some(DMatrix::from_iterator(
            jac.nrows(),
            N,
            jac.iter().copied(),
        ))
    }
}

/// Minimize the frame residual starting from `x0`.
pub fn solve_frame<const N: usize>(
    ctx: &ResidualContext<'_>,
    x0: SVector<Real, N>,
    opts: &SolveOptions,
) -> (SVector<Real, N>, SolveReport) {
    let lm = LevenbergMarquardt::new()
        .with_ftol(Real::EPSILON)
        .with_xtol(Real::EPSILON)
        .with_gtol(Real::EPSILON)
        .with_patience(opts.max_iters.max(1));

    let problem = FrameProblem::<N> {
        ctx,
        params: DVector::from_column_slice(x0.as_slice()),
    };
    let (problem, report) = lm.minimize(problem);

    (
        problem.params_static(),
        SolveReport {
            iterations: report.number_of_evaluations,
            final_cost: report.objective_function,
            converged: report.termination.was_successful(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::FrameInput;
    use crate::residuals::StabilityWeights;
    use crate::synthetic;
    use approx::assert_relative_eq;
    use hand_core::kinematics::eval_hand_pose;
    use hand_core::layout::PARAM_DIM_FIXED;
    use hand_core::{Handedness, Iso3, ParamLayout, Real};
    use nalgebra::Translation3;

    fn test_setup() -> (FrameInput, Iso3, Iso3) {
        let t_rl = Iso3::from_parts(Translation3::new(-0.064, 0.0, 0.0), Default::default());
        let pre = Iso3::from_parts(Translation3::new(0.0, 0.0, 0.35), Default::default());
        let pose = eval_hand_pose::<Real>(
            &[0.0; PARAM_DIM_FIXED],
            ParamLayout::FixedSize,
            &pre,
            Handedness::Left,
            0.09,
        );
        let input = synthetic::render_frame(&pose, &t_rl, 0.8);
        (input, t_rl, pre)
    }

    fn test_context<'a>(input: &'a FrameInput, t_rl: &'a Iso3, pre: &'a Iso3) -> ResidualContext<'a> {
        ResidualContext {
            input,
            t_right_left: t_rl,
            pre_transform: pre,
            handedness: Handedness::Left,
            layout: ParamLayout::FixedSize,
            fixed_hand_size: 0.09,
            target_hand_size: 0.09,
            hand_size_error_weight: 1.0,
            prev_params: None,
            prev_curls: [0.0; 5],
            weights: StabilityWeights::default(),
        }
    }

    #[test]
    fn dual_jacobian_matches_central_differences() {
        let (input, t_rl, pre) = test_setup();
        let ctx = test_context(&input, &t_rl, &pre);

        let mut x = SVector::<Real, PARAM_DIM_FIXED>::zeros();
        x[0] = 0.01;
        x[4] = 0.05;
        x[8] = 0.2;

        let (r0, jac) = jacobian_ad(&ctx, &x);
        assert_eq!(jac.nrows(), r0.len());

        let h = 1e-6;
        for col in 0..PARAM_DIM_FIXED {
            let mut xp = x;
            let mut xm = x;
            xp[col] += h;
            xm[col] -= h;
            let rp = crate::residuals::residuals(xp.as_slice(), &ctx);
            let rm = crate::residuals::residuals(xm.as_slice(), &ctx);
            for row in 0..r0.len() {
                let fd = (rp[row] - rm[row]) / (2.0 * h);
                assert_relative_eq!(jac[(row, col)], fd, epsilon = 1e-5, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn first_frame_solve_pins_the_twist_null_directions() {
        // A straight finger's metacarpal twist does not move any
        // keypoint, so only the first-frame prior rows constrain it.
        let (input, t_rl, pre) = test_setup();
        let ctx = test_context(&input, &t_rl, &pre);

        let mut x0 = SVector::<Real, PARAM_DIM_FIXED>::zeros();
        for finger in hand_core::Finger::ALL {
            x0[hand_core::layout::finger_offset(finger) + 2] = 0.7;
        }

        let (x, report) = solve_frame(&ctx, x0, &SolveOptions { max_iters: 40 });
        assert!(report.converged);
        for finger in hand_core::Finger::ALL {
            let twist = x[hand_core::layout::finger_offset(finger) + 2];
            assert_relative_eq!(twist, 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn solve_recovers_a_small_wrist_perturbation() {
        let (input, t_rl, pre) = test_setup();
        let ctx = test_context(&input, &t_rl, &pre);

        let mut x0 = SVector::<Real, PARAM_DIM_FIXED>::zeros();
        x0[0] = 0.02;
        x0[1] = -0.015;
        x0[5] = 0.1;

        let (x, report) = solve_frame(&ctx, x0, &SolveOptions::default());
        assert!(report.converged);
        assert!(report.final_cost < 1e-10);
        for i in 0..PARAM_DIM_FIXED {
            assert_relative_eq!(x[i], 0.0, epsilon = 1e-4);
        }
    }
}
