//! apigate CI - compatibility gating of API versions
//!
//! Provides the two front-ends of the gate:
//! - `RemoteGate` checks every version a running candidate service publishes
//! - `Linter` checks dated resource directories against a git reference
//!
//! Both hand document pairs to an `Evaluator` and fold the outcomes into a
//! `GateReport`.

pub mod evaluator;
pub mod gate;
pub mod lint;
pub mod locate;
pub mod pipeline;

// Re-export key types
pub use evaluator::{
    Evaluation, EvaluationRequest, Evaluator, InProcessEvaluator, ProcessEvaluator,
};
pub use gate::{GateReport, GateVerdict, VersionCheck};
pub use lint::{LintPlan, Linter, DEFAULT_BASELINE_REF, SPEC_FILE};
pub use locate::{default_candidates, locate_evaluator, ENV_EVALUATOR, EVALUATOR_NAME};
pub use pipeline::RemoteGate;
