//! Health scoring.
//!
//! Four parallel channels computed from the same inputs under different
//! failure sets:
//!
//! - `overall`: lenient (Open counts against you), both pools blended
//! - `objective`: lenient, mechanical pool only
//! - `strict`: Open + Wontfix, both pools
//! - `verified_strict`: Open + Wontfix + Fixed + FalsePositive, both pools
//!
//! Scoring is a pure function of (findings, potentials, assessments,
//! policy): same inputs reproduce the same outputs to 0.001 anywhere.
//! Every threshold lives in `policy`: single-site by design contract.

pub mod compute;
pub mod policy;

pub use compute::{compute_scores, ScoreBundle};
pub use policy::{ScoreMode, HOLISTIC_MULTIPLIER, MIN_SAMPLE, SUBJECTIVE_CHECKS};
