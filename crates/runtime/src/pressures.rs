//! Pressures (spec §4.4): soft constraints — `no_grow`, `no_shrink`,
//! `no_resize`, `read_heavy` — enforced on the next mutating operation that
//! would violate them. New; no direct teacher analogue, structured like
//! `bonds.rs`/`reactions.rs`/`seeds.rs` as an independent keyed registry.

use lattice_core::containers::OpenMap;
use lattice_core::{LatticeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureKind {
    NoGrow,
    NoShrink,
    NoResize,
    ReadHeavy,
}

/// The shape of a mutation about to be attempted, checked against a
/// target's registered pressures before it's allowed to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Grow,
    Shrink,
    Resize,
    Write,
}

#[derive(Default)]
pub struct PressureRegistry {
    by_target: OpenMap<Vec<PressureKind>>,
}

impl PressureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: &str, kind: PressureKind) {
        match self.by_target.get_mut(target) {
            Some(list) => {
                if !list.contains(&kind) {
                    list.push(kind);
                }
            }
            None => {
                self.by_target.set(target, vec![kind]);
            }
        }
    }

    pub fn clear(&mut self, target: &str) {
        self.by_target.remove(target);
    }

    /// Checks `attempted` against every pressure registered for `target`.
    /// Returns a `PhaseViolation`-shaped error on the first conflict — the
    /// same "this mutation cannot proceed" taxonomy freeze/crystal
    /// violations use, since both are the evaluator refusing a mutating op.
    pub fn check(&self, target: &str, attempted: MutationKind) -> Result<()> {
        let Some(kinds) = self.by_target.get(target) else {
            return Ok(());
        };
        for kind in kinds {
            let blocks = matches!(
                (kind, attempted),
                (PressureKind::NoGrow, MutationKind::Grow)
                    | (PressureKind::NoShrink, MutationKind::Shrink)
                    | (PressureKind::NoResize, MutationKind::Resize)
                    | (PressureKind::ReadHeavy, MutationKind::Write)
            );
            if blocks {
                return Err(LatticeError::phase_violation(format!(
                    "`{target}` is under a {kind:?} pressure; {attempted:?} is not permitted"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_grow_blocks_grow_but_not_shrink() {
        let mut reg = PressureRegistry::new();
        reg.register("arr", PressureKind::NoGrow);
        assert!(reg.check("arr", MutationKind::Grow).is_err());
        assert!(reg.check("arr", MutationKind::Shrink).is_ok());
    }

    #[test]
    fn unregistered_target_permits_everything() {
        let reg = PressureRegistry::new();
        assert!(reg.check("nope", MutationKind::Grow).is_ok());
    }

    #[test]
    fn clear_lifts_every_pressure_on_a_target() {
        let mut reg = PressureRegistry::new();
        reg.register("arr", PressureKind::NoGrow);
        reg.clear("arr");
        assert!(reg.check("arr", MutationKind::Grow).is_ok());
    }
}
