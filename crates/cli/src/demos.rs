//! Built-in sample programs, standing in for source files a real lexer/
//! parser would hand this binary (spec §6.1): assembled directly with
//! `lattice_ast::builders`, the same interface the crate's own tests use.

use lattice_ast::builders::*;
use lattice_ast::{BinOp, BindingKind, Program};

/// Closures, phase operators, and the `print` built-in.
pub fn hello() -> Program {
    program([
        function(
            "greet",
            [param("name")],
            [expr_stmt(call_fn("print", [binary(
                BinOp::Add,
                binary(BinOp::Add, string("Hello, "), ident("name")),
                string("!"),
            )]))],
        ),
        expr_stmt(call_fn("greet", [string("Lattice")])),
        let_binding(BindingKind::Let, "nums", array([int(1), int(2), int(3)])),
        let_binding(BindingKind::Fix, "frozen", ident("nums")),
        expr_stmt(call_fn("print", [ident("frozen")])),
        expr_stmt(call_fn("print", [method_call(ident("frozen"), "len", [])])),
    ])
}

/// A `requires` contract (spec §4.5) exercised by two tests, one passing and
/// one failing, to show `test`-mode reporting both outcomes.
pub fn contracts() -> Program {
    program([
        function_with_requires(
            "half",
            [param("n")],
            [requires(
                binary(BinOp::Eq, binary(BinOp::Mod, ident("n"), int(2)), int(0)),
                Some("n must be even"),
            )],
            [return_stmt(Some(binary(BinOp::Div, ident("n"), int(2))))],
        ),
        test(
            "half of an even number",
            [if_stmt(
                binary(BinOp::Ne, call_fn("half", [int(4)]), int(2)),
                vec![return_stmt(Some(int(1)))],
                None,
            )],
        ),
        test("half of an odd number is rejected", [expr_stmt(call_fn("half", [int(3)]))]),
    ])
}

pub fn by_name(name: &str) -> Option<Program> {
    match name {
        "hello" => Some(hello()),
        "contracts" => Some(contracts()),
        _ => None,
    }
}

pub const NAMES: &[&str] = &["hello", "contracts"];
