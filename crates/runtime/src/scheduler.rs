//! Cooperative task scheduler (spec §5): single OS thread, suspension points
//! exactly at channel send/receive, `select`, timeout expiration, and the
//! explicit `yield` built-in.
//!
//! Grounded directly on `navicore-cem3::runtime::scheduler`'s use of `may`
//! green threads, pinned here to exactly one worker
//! (`may::config().set_workers(1)`, called once via `ensure_single_worker`)
//! so `Value`'s `Rc`-based heap pointers never cross a real OS thread
//! boundary — spec §5's "no two tasks ever observe or mutate concurrently"
//! invariant depends on this. Because Lattice values are `Rc`-based they are
//! `!Send`, yet `may::go!` is typed to accept `Send + 'static` closures
//! (it's a general M:N scheduler, not a single-worker one by default); the
//! `AssertSend` wrapper below carries a `!Send` task across that API without
//! actually moving it off the thread it was spawned on, the same pattern
//! single-threaded async executors use to host non-`Send` work (e.g.
//! `tokio::task::LocalSet`, `wasm_bindgen_futures::spawn_local`'s internal
//! handling). It's sound only because of the single-worker pin above; if
//! that pin is ever removed this wrapper becomes unsound.

use std::cell::Cell;

struct AssertSend<T>(T);
unsafe impl<T> Send for AssertSend<T> {}

thread_local! {
    static WORKERS_CONFIGURED: Cell<bool> = const { Cell::new(false) };
}

/// Pins `may`'s scheduler to a single OS worker thread. Idempotent; must run
/// before the first `spawn`.
pub fn ensure_single_worker() {
    WORKERS_CONFIGURED.with(|configured| {
        if !configured.get() {
            may::config().set_workers(1);
            configured.set(true);
        }
    });
}

/// Spawns `task` as a cooperative coroutine (spec §5 `spawn` expression).
/// `task` runs until it returns or cooperatively suspends at a channel op,
/// `select`, or `yield`.
pub fn spawn(task: impl FnOnce() + 'static) -> may::coroutine::JoinHandle<()> {
    ensure_single_worker();
    let wrapped = AssertSend(task);
    may::go!(move || {
        let AssertSend(f) = wrapped;
        f();
    })
}

/// The explicit `yield` built-in: cooperatively give up the current task's turn.
pub fn yield_now() {
    may::coroutine::yield_now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn spawned_task_runs_to_completion() {
        ensure_single_worker();
        let ran = Rc::new(RefCell::new(false));
        let ran_clone = ran.clone();
        let handle = spawn(move || {
            *ran_clone.borrow_mut() = true;
        });
        handle.join().expect("spawned task should not panic");
        assert!(*ran.borrow());
    }
}
