//! Executing `test` items (spec §6.2(c), test-run mode), grounded on the
//! teacher's `compiler::test_runner` (`TestResult`/`TestSummary` shape),
//! generalized from discovering `test-*.seq` files on disk to iterating a
//! `Program`'s test items directly — there is no lexer/parser front end in
//! this crate to discover files with.

use std::time::Instant;

use lattice_ast::{Item, Program};
use lattice_core::flags::RuntimeFlags;

use crate::eval::Evaluator;

#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub error_output: Option<String>,
}

#[derive(Debug, Default)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

/// Registers every non-test item of `program`, then runs each `test "..."`
/// body in declaration order against the resulting globals and reports
/// pass/fail. A top-level registration failure (e.g. a bad `struct`/`impl`)
/// is reported as a single synthetic failing result rather than a panic.
pub fn test_run(program: &Program, flags: RuntimeFlags) -> TestSummary {
    let mut evaluator = Evaluator::new(flags);
    if let Err(e) = evaluator.eval_program(program) {
        return TestSummary {
            total: 1,
            passed: 0,
            failed: 1,
            results: vec![TestResult {
                name: "<top-level>".to_string(),
                passed: false,
                duration_ms: 0,
                error_output: Some(e.to_string()),
            }],
        };
    }

    let mut summary = TestSummary::default();
    for item in &program.items {
        let Item::Test(test) = item else { continue };
        let start = Instant::now();
        let env = evaluator.globals.clone();
        let outcome = evaluator.eval_block(&env, &test.body);
        let duration_ms = start.elapsed().as_millis() as u64;
        let (passed, error_output) = match outcome {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        if passed {
            summary.passed += 1;
        } else {
            summary.failed += 1;
        }
        summary.total += 1;
        summary.results.push(TestResult { name: test.name.clone(), passed, duration_ms, error_output });
    }
    summary
}
