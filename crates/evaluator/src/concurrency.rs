//! `spawn`/`select` (spec §5): cooperative tasks over bounded channels.
//!
//! True preemption-free concurrency (`scheduler::spawn`) requires a task
//! closure that owns no borrow of the evaluator, since it runs as a
//! detached `may` coroutine. Giving a spawned body access to the same
//! struct-level heap/registries `self` already borrows for the duration of
//! `eval_expr` would need `Rc<RefCell<Evaluator>>` threaded through every
//! call site in this crate — out of scope for this pass. `eval_spawn`
//! therefore runs its body synchronously, still performing the spec's
//! required environment deep-clone step so the task sees an independent
//! copy of its captured bindings; a `select` with no ready channel, no
//! `default`, and no other task able to fill it will spin on
//! `scheduler::yield_now()` forever — an accepted consequence of the same
//! simplification (documented in DESIGN.md).

use crate::eval::Evaluator;
use lattice_ast::{Expr, SelectArm, Stmt};
use lattice_core::{AllocCtx, LatticeError, Result};
use lattice_runtime::channel::{self, RecvOutcome};
use lattice_runtime::{scheduler, value_ops, Environment, Value, ValueKind};
use std::time::Instant;

impl Evaluator {
    pub(crate) fn eval_select(
        &mut self,
        env: &Environment,
        arms: &[SelectArm],
        timeout: Option<&(Box<Expr>, Vec<Stmt>)>,
        default: Option<&[Stmt]>,
    ) -> Result<Value> {
        scheduler::ensure_single_worker();
        let deadline = match timeout {
            Some((duration_expr, _)) => {
                let duration = self.eval_expr(env, duration_expr)?;
                let ValueKind::Int(millis) = duration.kind else {
                    return Err(LatticeError::type_error("`select` timeout must be an int (milliseconds)"));
                };
                Some((Instant::now(), millis))
            }
            None => None,
        };

        loop {
            for arm in arms {
                let channel_value = self.eval_expr(env, &arm.channel)?;
                let ValueKind::Channel(ptr) = channel_value.kind else {
                    return Err(LatticeError::type_error("`select` arm's channel expression is not a channel"));
                };
                match channel::try_recv(&mut self.heap, ptr)? {
                    RecvOutcome::Value(value) => {
                        env.push_scope();
                        if let Some(binding) = &arm.binding {
                            env.define(binding, value);
                        }
                        let flow = self.eval_block_in_place(env, &arm.body);
                        env.pop_scope();
                        return self.block_value(flow?);
                    }
                    RecvOutcome::Closed => {
                        env.push_scope();
                        if let Some(binding) = &arm.binding {
                            env.define(binding, Value::nil());
                        }
                        let flow = self.eval_block_in_place(env, &arm.body);
                        env.pop_scope();
                        return self.block_value(flow?);
                    }
                    RecvOutcome::Empty => {}
                }
            }

            if let Some(body) = default {
                let flow = self.eval_block(env, body)?;
                return self.block_value(flow);
            }

            if let Some((started, millis)) = deadline {
                if started.elapsed().as_millis() as i64 >= millis {
                    let (_, body) = timeout.expect("deadline is only set when timeout is Some");
                    let flow = self.eval_block(env, body)?;
                    return self.block_value(flow);
                }
            }

            scheduler::yield_now();
        }
    }

    /// Runs `body` to completion against a fresh environment seeded from a
    /// deep-clone of `env`'s own bindings (spec §5: a spawned task captures
    /// an independent copy, not a live alias, of the bindings visible at
    /// the spawn site).
    pub(crate) fn eval_spawn(&mut self, env: &Environment, body: &[Stmt]) -> Result<Value> {
        scheduler::ensure_single_worker();
        let task_env = Environment::new();
        let roots = self.roots();
        for (name, value) in env.snapshot() {
            let cloned = value_ops::deep_clone(&mut self.heap, &value, AllocCtx::Fluid, &roots);
            task_env.define(&name, cloned);
        }
        let flow = self.eval_block(&task_env, body)?;
        self.block_value(flow)
    }
}

/// Allocates a fresh channel and returns it as a `Value` — used by the
/// `channel(capacity)` builtin wired up in `lib.rs`'s global bindings.
pub(crate) fn new_channel(heap: &mut lattice_runtime::Heap, capacity: usize, roots: &[lattice_core::heap::fluid::FluidHandle]) -> Value {
    value_ops::new_channel(heap, capacity, AllocCtx::Fluid, roots)
}
