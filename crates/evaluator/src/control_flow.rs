//! The statement-evaluation result signal (spec §4.4, §9): modeled as an
//! explicit enum bubbled up through `eval_block`/`eval_stmt` rather than
//! language-level unwinding, per the spec's own design note.

use lattice_runtime::Value;

#[derive(Debug, Clone)]
pub enum ControlFlow {
    None,
    Return(Value),
    Break,
    Continue,
}

impl ControlFlow {
    pub fn is_none(&self) -> bool {
        matches!(self, ControlFlow::None)
    }

    /// True for any signal that should unwind a statement block immediately
    /// (every variant except `None`).
    pub fn interrupts(&self) -> bool {
        !self.is_none()
    }
}
