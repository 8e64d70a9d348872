//! Contract checking (spec §4.5): `require`/`ensure` pairs, toggled globally
//! by `RuntimeFlags::assertions`.
//!
//! Condition expressions are evaluated by the caller (the evaluator/VM,
//! which owns the AST); this module only applies the pass/fail policy once
//! a condition has already produced a boolean, keeping `lattice-runtime`
//! free of a dependency back up to `lattice-evaluator`.

use lattice_core::{LatticeError, Result, RuntimeFlags, SourceLoc};

/// One `require`/`ensure` clause, already evaluated by the caller.
pub struct ContractClause {
    pub passed: bool,
    pub message: Option<String>,
    pub loc: Option<SourceLoc>,
}

/// Checks every clause in order; the first failure raises a
/// `ContractViolation` naming `function`. No-op when assertions are
/// disabled (spec §6.3).
pub fn check(flags: &RuntimeFlags, function: &str, clauses: &[ContractClause]) -> Result<()> {
    if !flags.assertions {
        return Ok(());
    }
    for clause in clauses {
        if !clause.passed {
            return Err(LatticeError::ContractViolation {
                function: function.to_string(),
                message: clause
                    .message
                    .clone()
                    .unwrap_or_else(|| "contract failed".to_string()),
                loc: clause.loc,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passing_clauses_are_ok() {
        let flags = RuntimeFlags::default();
        let clauses = [ContractClause {
            passed: true,
            message: None,
            loc: None,
        }];
        assert!(check(&flags, "add", &clauses).is_ok());
    }

    #[test]
    fn failing_clause_names_the_function() {
        let flags = RuntimeFlags::default();
        let clauses = [ContractClause {
            passed: false,
            message: Some("a > 0".to_string()),
            loc: None,
        }];
        let err = check(&flags, "add", &clauses).unwrap_err();
        assert_eq!(err.message(), "add: a > 0");
    }

    #[test]
    fn disabled_assertions_skip_checking_entirely() {
        let mut flags = RuntimeFlags::default();
        flags.assertions = false;
        let clauses = [ContractClause {
            passed: false,
            message: None,
            loc: None,
        }];
        assert!(check(&flags, "add", &clauses).is_ok());
    }
}
