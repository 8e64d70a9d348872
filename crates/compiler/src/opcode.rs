//! The instruction set (spec §4.6, §4.7): one variant per opcode, carrying
//! its operands inline rather than a packed byte stream — `lattice-vm`
//! matches on `OpCode` directly instead of decoding a byte cursor, the way
//! the teacher's own `compiler::codegen` emits typed LLVM IR instructions
//! rather than hand-packed machine bytes. `serialize.rs` round-trips this
//! enum through `bincode` for the on-disk chunk format (spec §6.2), so the
//! representation only needs to be `Serialize`/`Deserialize`, not byte-exact.

use serde::{Deserialize, Serialize};

/// Index into a `Chunk`'s constant pool.
pub type ConstIdx = u32;
/// Index into a `Chunk`'s nested function-descriptor table.
pub type FnIdx = u32;
/// Local-slot index within the current call frame.
pub type Slot = u32;
/// Upvalue index within the current closure.
pub type UpvalIdx = u32;
/// Absolute instruction index within the current chunk's `code`.
pub type Addr = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OpCode {
    // --- constants & stack shape ---
    Const(ConstIdx),
    Nil,
    True,
    False,
    Unit,
    Pop,
    Dup,

    // --- variables ---
    GetLocal(Slot),
    SetLocal(Slot),
    GetGlobal(ConstIdx),
    DefineGlobal(ConstIdx),
    SetGlobal(ConstIdx),
    GetUpvalue(UpvalIdx),
    SetUpvalue(UpvalIdx),

    // --- containers ---
    MakeArray(u32),
    MakeTuple(u32),
    /// Pops `2 * count` values, alternating key then value per pair
    /// (innermost-pushed pair last), and builds a map from them.
    MakeMap(u32),
    MakeSet(u32),
    GetField(ConstIdx),
    SetField(ConstIdx),
    GetIndex,
    SetIndex,

    // --- operators ---
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitAnd,
    BitXor,
    Neg,
    Not,

    // --- control flow ---
    Jump(Addr),
    JumpIfFalse(Addr),
    /// Pops only when the branch is *not* taken — used for `&&`/`||`
    /// short-circuit (spec §4.6): the shared operand stays on the stack as
    /// the expression's value when the jump fires.
    JumpIfFalseNoPop(Addr),
    JumpIfTrueNoPop(Addr),
    Loop(Addr),

    // --- calls & closures ---
    /// Pushes the number of arguments the *current* frame was actually
    /// called with, as an `Int` — lets a function prologue tell a supplied
    /// argument from one falling back to its declared default (spec §4.3:
    /// only a missing trailing argument defaults, independent of its
    /// truthiness).
    ArgCount,
    Call(u32),
    MethodCall(ConstIdx, u32),
    /// Precedes a `MakeClosure`: captures the enclosing frame's local slot
    /// `Slot` as the new closure's next upvalue.
    CaptureLocal(Slot),
    /// Precedes a `MakeClosure`: captures the enclosing closure's upvalue
    /// `UpvalIdx` as the new closure's next upvalue (re-exporting an
    /// already-captured variable one level further out).
    CaptureUpvalue(UpvalIdx),
    MakeClosure(FnIdx),
    Return,

    // --- phase operators (spec §4.2, §4.4) ---
    /// `except` names and an optional contract closure are passed as already
    /// evaluated values below the operand on the operand stack; `bool` is
    /// `true` when a contract value is present.
    Freeze { except_count: u32, has_contract: bool },
    Thaw,
    CloneValue,
    /// Anneal: the operand and mutator closure are both already on the
    /// stack (operand below mutator); `has_contract` mirrors `Freeze`.
    Anneal { has_contract: bool },
    PushForgeRegion,
    PopForgeRegion,

    // --- structs & enums ---
    /// Pops `2 * field_count` values, alternating field-name `String` then
    /// value per pair, in the literal's source order (not necessarily the
    /// struct's declared field order) — the VM matches each name against
    /// the registered `StructProto`, like
    /// `lattice-evaluator::eval_struct_init`'s own lookup-by-name.
    MakeStruct { type_name: ConstIdx, field_count: u32 },
    MakeEnum { enum_name: Option<ConstIdx>, variant: ConstIdx, payload_count: u32 },

    /// Pops the scrutinee, pushing whether its phase is crystal (`true`)
    /// or fluid (`false`) matches `is_crystal` — lowers a match arm's
    /// optional `fluid|crystal` qualifier (spec §4.4 Match).
    TestPhase { is_crystal: bool },

    // --- pattern matching (spec §4.6) ---
    /// Tests the value on top of the stack against constant pool entry
    /// `ConstIdx` for equality, pushing a bool (used for literal arms).
    TestEq(ConstIdx),
    /// Tests an inclusive-exclusive range `[lo, hi)` against the top of
    /// stack, pushing a bool.
    TestRange { lo: ConstIdx, hi: ConstIdx },
    /// Pops the scrutinee, testing whether it's an enum instance of the
    /// named variant (and enum, if given), and pushes a bool. The
    /// scrutinee itself is always kept available separately in a local, so
    /// a following `DestructureVariant` re-fetches it rather than relying
    /// on stack position.
    TestVariant { enum_name: Option<ConstIdx>, variant: ConstIdx, arity: u32 },
    /// Pops the scrutinee (already known to be a matching variant),
    /// storing its `arity` payload values directly into consecutive local
    /// slots starting at `first_slot` — no stack push.
    DestructureVariant { arity: u32, first_slot: Slot },

    /// Raises `LatticeError::ContractViolation` (spec §4.5) unconditionally;
    /// the lowering pass only reaches this opcode on the branch where the
    /// clause's condition was falsy.
    RaiseContract { function: ConstIdx, message: ConstIdx },
    /// Raises a plain `LatticeError::TypeError` unconditionally (e.g. an
    /// exhausted `match`, spec §4.4).
    RaiseError { message: ConstIdx },

    /// Postfix `?` (spec §4.1, §7): pops a value; if it's an `Enum` instance
    /// whose variant is named `Err`/`None`, raises a `TypeError` built from
    /// its first payload value (or the `enum.variant` name if it has none);
    /// otherwise pushes its first payload value (or `Unit`), or the popped
    /// value unchanged if it wasn't an enum at all. Mirrors
    /// `lattice-evaluator::eval_try` as a single VM-native check rather than
    /// a decomposed test+branch, the same way `TestVariant` is opaque.
    UnwrapTry,

    // --- error handling & cleanup (spec §4.6, §4.7) ---
    /// Installs a handler record (operand-stack depth, frame depth, defer
    /// depth, catch target) on the VM's handler stack.
    TryBegin(Addr),
    TryEnd,
    /// Binds the caught error's message (already pushed as a string by the
    /// VM's unwind) into `Slot`.
    BindCaught(Slot),
    /// Registers the `count` instructions starting at `Addr` as a deferred
    /// block on the current frame's defer stack (spec §4.4 Defer); does not
    /// execute them.
    DeferBlock { start: Addr, count: u32 },

    // --- concurrency (spec §5) ---
    /// `channel(capacity)`; capacity is already on the stack.
    MakeChannel,
    /// Channel is already on stack below the value being sent.
    ChannelSend,
    /// Blocking receive, for the `chan.recv()` method surface.
    ChannelRecv,
    /// Non-blocking receive used only by `select`'s polling loop — never
    /// reachable from surface syntax, the bytecode analog of
    /// `lattice-evaluator::channel::try_recv`. Pops the channel, pushes the
    /// received value (`Nil` if none were ready), then pushes a status
    /// `Int`: `0` empty, `1` value ready, `2` channel closed.
    TryRecv,
    /// Pushes the current monotonic clock reading in milliseconds, as an
    /// `Int` — used to evaluate `select`'s `timeout` deadline. The VM reads
    /// real wall-clock time to implement this; it's a native capability of
    /// the VM's own host code, not something bytecode data can represent.
    NowMillis,
    /// Runs the `count` instructions starting at `Addr` as a spawned task
    /// body over a deep clone of the current frame's locals (spec §5;
    /// `lattice-vm` runs it synchronously to completion, the same
    /// documented simplification as `lattice-evaluator::eval_spawn`),
    /// pushing the body's `block_value` onto the *caller's* stack.
    Spawn { start: Addr, count: u32 },
    Yield,

    Halt,
}
