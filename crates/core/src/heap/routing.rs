//! Allocation routing (spec §3.2, §9): "every allocation decision is routed
//! ... if [a region is] set, routed allocation uses the region; otherwise it
//! uses the fluid GC."
//!
//! Spec §9 explicitly rejects a true global for the "current routed arena"
//! in favor of an explicit handle threaded through value operations, or a
//! task-local fallback. This crate provides both: `AllocCtx` is the
//! explicit handle callers should thread through `Environment`, the
//! evaluator, and VM call frames; `AllocCtx::current`/`AllocCtx::with` are a
//! thread-local fallback for built-ins that have not (yet) had the context
//! threaded to them explicitly. The fallback is sound specifically because
//! Lattice's scheduler is single-OS-thread and cooperative (spec §5) — no
//! two tasks ever observe or mutate the thread-local concurrently, so it
//! behaves exactly like the task-local context the spec asks for, without
//! reaching for a process-wide `static`.

use super::crystal::RegionId;
use std::cell::Cell;

thread_local! {
    static CURRENT_REGION: Cell<Option<u32>> = const { Cell::new(None) };
}

/// The explicit allocation context: either routed into a crystal region, or
/// fluid (the default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocCtx {
    Fluid,
    Crystal(RegionId),
}

impl Default for AllocCtx {
    fn default() -> Self {
        AllocCtx::Fluid
    }
}

impl AllocCtx {
    pub fn is_crystal(self) -> bool {
        matches!(self, AllocCtx::Crystal(_))
    }

    pub fn region(self) -> Option<RegionId> {
        match self {
            AllocCtx::Crystal(id) => Some(id),
            AllocCtx::Fluid => None,
        }
    }

    /// Read the thread-local fallback context (used by built-ins that
    /// haven't been threaded an explicit `AllocCtx` yet).
    pub fn current() -> AllocCtx {
        CURRENT_REGION.with(|c| match c.get() {
            Some(raw) => AllocCtx::Crystal(RegionId(raw)),
            None => AllocCtx::Fluid,
        })
    }

    /// Install `ctx` as the thread-local fallback for the duration of `f`,
    /// restoring the previous value afterward even if `f` panics.
    pub fn with<R>(ctx: AllocCtx, f: impl FnOnce() -> R) -> R {
        let previous = CURRENT_REGION.with(|c| c.get());
        CURRENT_REGION.with(|c| c.set(ctx.region().map(|r| r.0)));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
        CURRENT_REGION.with(|c| c.set(previous));
        match result {
            Ok(v) => v,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_fluid() {
        assert_eq!(AllocCtx::current(), AllocCtx::Fluid);
    }

    #[test]
    fn with_installs_and_restores_context() {
        assert_eq!(AllocCtx::current(), AllocCtx::Fluid);
        let observed = AllocCtx::with(AllocCtx::Crystal(RegionId(3)), AllocCtx::current);
        assert_eq!(observed, AllocCtx::Crystal(RegionId(3)));
        assert_eq!(AllocCtx::current(), AllocCtx::Fluid);
    }

    #[test]
    fn nested_with_composes_to_the_inner_region() {
        let observed = AllocCtx::with(AllocCtx::Crystal(RegionId(1)), || {
            AllocCtx::with(AllocCtx::Crystal(RegionId(2)), AllocCtx::current)
        });
        assert_eq!(observed, AllocCtx::Crystal(RegionId(2)));
    }
}
