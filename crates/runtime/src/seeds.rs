//! Seeds (spec §4.4): contracts registered at bind time but deferred — only
//! checked when their target is eventually frozen. New; no direct teacher
//! analogue, structured like `reactions.rs`/`bonds.rs` as an independent
//! keyed registry.

use crate::value::Value;
use lattice_core::containers::OpenMap;

/// A deferred contract: `check` is expected to be a `Value::Closure`
/// evaluated by the caller against the target's value at freeze time.
pub struct Seed {
    pub check: Value,
    pub message: Option<String>,
}

#[derive(Default)]
pub struct SeedRegistry {
    by_target: OpenMap<Vec<Seed>>,
}

impl SeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: &str, seed: Seed) {
        match self.by_target.get_mut(target) {
            Some(list) => list.push(seed),
            None => {
                self.by_target.set(target, vec![seed]);
            }
        }
    }

    /// The seeds due at `target`'s next freeze. Consumes them — once checked
    /// they don't re-fire on a later freeze of the same binding unless
    /// re-registered.
    pub fn take(&mut self, target: &str) -> Vec<Seed> {
        self.by_target.remove(target).unwrap_or_default()
    }

    pub fn pending(&self, target: &str) -> usize {
        self.by_target.get(target).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_seeds_are_taken_exactly_once() {
        let mut reg = SeedRegistry::new();
        reg.register(
            "x",
            Seed {
                check: Value::bool(true),
                message: None,
            },
        );
        assert_eq!(reg.pending("x"), 1);
        let taken = reg.take("x");
        assert_eq!(taken.len(), 1);
        assert_eq!(reg.pending("x"), 0);
    }
}
