//! Lattice Runtime: the `Value` model, its phase-aware operations, the
//! lexical environment, built-in methods, and the cross-cutting evaluator
//! services (contracts, bonds, reactions, seeds, pressures, module cache)
//! and concurrency primitives that both the tree-walking evaluator
//! (`lattice-evaluator`) and the bytecode VM (`lattice-vm`) share.
//!
//! `Value` is a single type shared identically between both execution
//! backends (spec §2/§3.1) — this crate has no notion of which backend is
//! running it.

pub mod bonds;
pub mod builtins;
pub mod channel;
pub mod contracts;
pub mod environment;
pub mod heap;
pub mod heap_object;
pub mod module_cache;
pub mod pressures;
pub mod reactions;
pub mod scheduler;
pub mod seeds;
pub mod serialize;
pub mod string;
pub mod value;
pub mod value_ops;

pub use environment::Environment;
pub use heap::Heap;
pub use string::LString;
pub use value::{HeapPtr, Value, ValueKind};
