//! Bonds (spec §4.4): a declarative link between a target variable and a
//! parallel list of dependencies that co-transition phase when the target
//! does. No direct teacher analogue (Seq has no phase model); structured as
//! an independent keyed registry the way the teacher structures its
//! `memory_stats`/`scheduler` registries.

use lattice_core::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondStrategy {
    /// The dependency's phase always matches the target's.
    Mirror,
    /// The dependency's phase is always the opposite of the target's.
    Inverse,
    /// The dependency's phase refreshes to match the target's, but the
    /// transition can be vetoed by the caller before it's applied.
    Gate,
}

pub struct BondLink {
    pub dependency: String,
    pub strategy: BondStrategy,
}

struct Bond {
    target: String,
    links: Vec<BondLink>,
}

/// What a bond propagation step asks the caller to do with one dependency.
pub enum BondEffect {
    /// Apply this phase to the dependency unconditionally.
    SetPhase(Phase),
    /// Apply this phase to the dependency only if the caller's veto check
    /// (a `Gate` link) passes.
    SetPhaseIfNotVetoed(Phase),
}

#[derive(Default)]
pub struct BondRegistry {
    bonds: Vec<Bond>,
}

impl BondRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the bond for `target`.
    pub fn register(&mut self, target: impl Into<String>, links: Vec<BondLink>) {
        let target = target.into();
        self.bonds.retain(|b| b.target != target);
        self.bonds.push(Bond { target, links });
    }

    pub fn remove(&mut self, target: &str) {
        self.bonds.retain(|b| b.target != target);
    }

    /// When `target` transitions to `new_phase`, returns the effect each
    /// dependency's phase should undergo.
    pub fn propagate(&self, target: &str, new_phase: Phase) -> Vec<(String, BondEffect)> {
        let Some(bond) = self.bonds.iter().find(|b| b.target == target) else {
            return Vec::new();
        };
        bond.links
            .iter()
            .map(|link| {
                let effect = match link.strategy {
                    BondStrategy::Mirror => BondEffect::SetPhase(new_phase),
                    BondStrategy::Inverse => BondEffect::SetPhase(opposite(new_phase)),
                    BondStrategy::Gate => BondEffect::SetPhaseIfNotVetoed(new_phase),
                };
                (link.dependency.clone(), effect)
            })
            .collect()
    }
}

fn opposite(phase: Phase) -> Phase {
    match phase {
        Phase::Fluid => Phase::Crystal,
        Phase::Crystal => Phase::Fluid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_strategy_matches_the_target_phase() {
        let mut reg = BondRegistry::new();
        reg.register(
            "a",
            vec![BondLink {
                dependency: "b".to_string(),
                strategy: BondStrategy::Mirror,
            }],
        );
        let effects = reg.propagate("a", Phase::Crystal);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0].1, BondEffect::SetPhase(Phase::Crystal)));
    }

    #[test]
    fn inverse_strategy_opposes_the_target_phase() {
        let mut reg = BondRegistry::new();
        reg.register(
            "a",
            vec![BondLink {
                dependency: "b".to_string(),
                strategy: BondStrategy::Inverse,
            }],
        );
        let effects = reg.propagate("a", Phase::Crystal);
        assert!(matches!(effects[0].1, BondEffect::SetPhase(Phase::Fluid)));
    }

    #[test]
    fn gate_strategy_requires_a_veto_check() {
        let mut reg = BondRegistry::new();
        reg.register(
            "a",
            vec![BondLink {
                dependency: "b".to_string(),
                strategy: BondStrategy::Gate,
            }],
        );
        let effects = reg.propagate("a", Phase::Fluid);
        assert!(matches!(
            effects[0].1,
            BondEffect::SetPhaseIfNotVetoed(Phase::Fluid)
        ));
    }

    #[test]
    fn untracked_target_propagates_nothing() {
        let reg = BondRegistry::new();
        assert!(reg.propagate("nope", Phase::Fluid).is_empty());
    }
}
