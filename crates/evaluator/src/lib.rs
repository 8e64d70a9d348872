//! Tree-walking evaluator (spec §4.4): the reference execution semantics.
//!
//! Generalizes `navicore-cem3::runtime::Interpreter` (a single-heap
//! tree-walker owning its environment stack and native-function table) to
//! Lattice's dual-phase value model: one `Evaluator` additionally owns the
//! region manager's GC roots, and the bonds/reactions/seeds/pressures
//! registries spec §4.4 names as the reactive surface over phase changes.

pub mod call;
pub mod concurrency;
pub mod control_flow;
pub mod eval;
pub mod module;
pub mod pattern;
pub mod test_run;

pub use control_flow::ControlFlow;
pub use eval::Evaluator;
pub use module::{ModuleResolver, NoModules};
pub use test_run::{test_run, TestResult, TestSummary};
