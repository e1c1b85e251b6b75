//! Per-frame nonlinear least-squares hand-pose optimizer.
//!
//! This crate fits the articulated hand model from `hand-core` to noisy
//! per-view 2D/2.5D keypoint observations produced by an external stereo
//! detector. It contains:
//! - the observation data model ([`observation`]),
//! - a closed-form initial wrist-pose guess ([`initial_guess`]),
//! - residual assembly over a generic scalar ([`residuals`]),
//! - the autodiff Jacobian and Levenberg–Marquardt backend ([`solver`]),
//! - the per-hand driver owning persistent warm-start state ([`driver`]),
//! - deterministic synthetic observation generation for tests
//!   ([`synthetic`]).
//!
//! One [`driver::HandTracker`] instance per tracked hand; instances share
//! no mutable state, so left and right hands may be solved concurrently.

pub mod driver;
pub mod initial_guess;
pub mod observation;
pub mod residuals;
pub mod solver;
pub mod synthetic;

pub use driver::{FrameOptions, FrameResult, HandTracker, TrackerOptions};
pub use initial_guess::{estimate_initial_pose, InitialGuessError};
pub use observation::{CurlObservation, FrameInput, JointObservation, ViewObservation};
pub use residuals::{residual_dim, ResidualContext, StabilityWeights};
pub use solver::{SolveOptions, SolveReport};
