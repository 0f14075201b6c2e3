//! Detector phase pipeline.
//!
//! A scan runs an ordered sequence of phases. Each phase examines the
//! scanned files (and the import graph) and reports findings plus
//! *potentials*: the per-detector denominator scoring divides by. Phases
//! are independent: one failing or timing out zeroes its own potentials and
//! the scan moves on.

pub mod base;
pub mod dupes;
pub mod engine;
pub mod graph_phase;
pub mod lint;
pub mod review_coverage;
pub mod security;
pub mod smells;
pub mod structural;
pub mod test_coverage;
pub mod unused_imports;

pub use base::{Phase, PhaseOutput, ScanContext};
pub use engine::{run_phases, PhaseReport};

/// The standard phase ordering. Language plugins return this from
/// `phases()` unless they need to reorder or extend it.
pub fn standard_phases() -> Vec<Box<dyn Phase>> {
    vec![
        Box::new(lint::LintPhase),
        Box::new(structural::StructuralPhase),
        Box::new(smells::SmellsPhase),
        Box::new(unused_imports::UnusedImportsPhase),
        Box::new(security::SecurityPhase),
        Box::new(graph_phase::GraphPhase),
        Box::new(test_coverage::TestCoveragePhase),
        Box::new(review_coverage::ReviewCoveragePhase),
        Box::new(dupes::DupesPhase),
    ]
}
