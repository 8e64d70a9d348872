//! Constructor functions standing in for the external parser's output
//! (spec §6.1): tests and the demonstration CLI assemble a `Program`
//! directly with these instead of parsing source text.

use crate::ast::*;

pub fn program(items: impl IntoIterator<Item = Item>) -> Program {
    Program {
        items: items.into_iter().collect(),
    }
}

pub fn int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn float(n: f64) -> Expr {
    Expr::Literal(Literal::Float(n))
}

pub fn bool_(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

pub fn nil() -> Expr {
    Expr::Literal(Literal::Nil)
}

pub fn unit() -> Expr {
    Expr::Literal(Literal::Unit)
}

pub fn string(s: impl Into<String>) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

pub fn ident(name: impl Into<String>) -> Expr {
    Expr::Ident(name.into())
}

pub fn array(elements: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Array(elements.into_iter().collect())
}

pub fn call(callee: Expr, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args: args.into_iter().collect(),
    }
}

pub fn call_fn(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Expr {
    call(ident(name), args)
}

pub fn method_call(
    receiver: Expr,
    method: impl Into<String>,
    args: impl IntoIterator<Item = Expr>,
) -> Expr {
    Expr::MethodCall {
        receiver: Box::new(receiver),
        method: method.into(),
        args: args.into_iter().collect(),
    }
}

pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

pub fn unary(op: UnOp, operand: Expr) -> Expr {
    Expr::Unary {
        op,
        operand: Box::new(operand),
    }
}

pub fn field(base: Expr, field: impl Into<String>) -> Expr {
    Expr::FieldAccess {
        base: Box::new(base),
        field: field.into(),
    }
}

pub fn index(base: Expr, idx: Expr) -> Expr {
    Expr::Index {
        base: Box::new(base),
        index: Box::new(idx),
    }
}

pub fn freeze(operand: Expr) -> Expr {
    Expr::Phase {
        op: PhaseOp::Freeze,
        operand: Box::new(operand),
        closure: None,
        except: Vec::new(),
        contract: None,
    }
}

pub fn thaw(operand: Expr) -> Expr {
    Expr::Phase {
        op: PhaseOp::Thaw,
        operand: Box::new(operand),
        closure: None,
        except: Vec::new(),
        contract: None,
    }
}

pub fn clone_of(operand: Expr) -> Expr {
    Expr::Phase {
        op: PhaseOp::Clone,
        operand: Box::new(operand),
        closure: None,
        except: Vec::new(),
        contract: None,
    }
}

pub fn anneal(operand: Expr, mutator: Expr) -> Expr {
    Expr::Phase {
        op: PhaseOp::Crystallize,
        operand: Box::new(operand),
        closure: Some(Box::new(mutator)),
        except: Vec::new(),
        contract: None,
    }
}

pub fn param(name: impl Into<String>) -> Param {
    Param {
        name: name.into(),
        default: None,
    }
}

pub fn param_default(name: impl Into<String>, default: Expr) -> Param {
    Param {
        name: name.into(),
        default: Some(default),
    }
}

pub fn closure(
    params: impl IntoIterator<Item = Param>,
    body: impl IntoIterator<Item = Stmt>,
) -> Expr {
    Expr::Closure {
        params: params.into_iter().collect(),
        variadic: None,
        body: body.into_iter().collect(),
    }
}

pub fn function(
    name: impl Into<String>,
    params: impl IntoIterator<Item = Param>,
    body: impl IntoIterator<Item = Stmt>,
) -> Item {
    Item::Function(std::rc::Rc::new(FunctionDecl {
        name: name.into(),
        params: params.into_iter().collect(),
        variadic: None,
        requires: Vec::new(),
        ensures: Vec::new(),
        body: body.into_iter().collect(),
        loc: None,
    }))
}

pub fn function_with_requires(
    name: impl Into<String>,
    params: impl IntoIterator<Item = Param>,
    requires: impl IntoIterator<Item = Contract>,
    body: impl IntoIterator<Item = Stmt>,
) -> Item {
    Item::Function(std::rc::Rc::new(FunctionDecl {
        name: name.into(),
        params: params.into_iter().collect(),
        variadic: None,
        requires: requires.into_iter().collect(),
        ensures: Vec::new(),
        body: body.into_iter().collect(),
        loc: None,
    }))
}

pub fn requires(condition: Expr, message: Option<&str>) -> Contract {
    Contract {
        condition,
        message: message.map(str::to_string),
        loc: None,
    }
}

pub fn let_binding(kind: BindingKind, name: impl Into<String>, init: Expr) -> Stmt {
    Stmt::Let {
        kind,
        pattern: Pattern::Binding(name.into()),
        init,
        loc: None,
    }
}

pub fn expr_stmt(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

pub fn return_stmt(e: Option<Expr>) -> Stmt {
    Stmt::Return(e)
}

pub fn if_stmt(cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If {
        cond,
        then_branch,
        else_branch,
    }
}

pub fn try_catch(
    try_body: impl IntoIterator<Item = Stmt>,
    catch_binding: impl Into<String>,
    catch_body: impl IntoIterator<Item = Stmt>,
) -> Expr {
    Expr::TryCatch {
        try_body: try_body.into_iter().collect(),
        catch_binding: catch_binding.into(),
        catch_body: catch_body.into_iter().collect(),
    }
}

pub fn match_expr(scrutinee: Expr, arms: impl IntoIterator<Item = MatchArm>) -> Expr {
    Expr::Match {
        scrutinee: Box::new(scrutinee),
        arms: arms.into_iter().collect(),
    }
}

pub fn arm(pattern: MatchPattern, body: Vec<Stmt>) -> MatchArm {
    MatchArm {
        pattern,
        guard: None,
        phase_qualifier: None,
        body,
    }
}

pub fn spawn(body: impl IntoIterator<Item = Stmt>) -> Expr {
    Expr::Spawn(body.into_iter().collect())
}

pub fn test(name: impl Into<String>, body: impl IntoIterator<Item = Stmt>) -> Item {
    Item::Test(std::rc::Rc::new(TestDecl {
        name: name.into(),
        body: body.into_iter().collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_scenario_one_from_spec_table() {
        // flux a = [1,2,3]; fix b = freeze(a); a.push(4); print(a.len(), b.len())
        let prog = program([
            function(
                "main",
                [],
                [
                    let_binding(BindingKind::Flux, "a", array([int(1), int(2), int(3)])),
                    let_binding(BindingKind::Fix, "b", freeze(ident("a"))),
                    expr_stmt(method_call(ident("a"), "push", [int(4)])),
                    expr_stmt(call_fn(
                        "print",
                        [
                            method_call(ident("a"), "len", []),
                            method_call(ident("b"), "len", []),
                        ],
                    )),
                ],
            ),
        ]);
        assert_eq!(prog.items.len(), 1);
    }
}
