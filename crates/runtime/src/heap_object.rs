//! `HeapObject`: the single type stored in both the fluid slab and the
//! crystal regions (spec §3.2), unifying every heap-bearing `Value` variant
//! so the fluid GC only needs one `Trace` implementation.

use crate::value::{ChannelObj, ClosureObj, EnumInstance, StructInstance, Value, VmClosureObj};
use lattice_core::containers::OpenMap;
use lattice_core::heap::fluid::{FluidHandle, Trace};

pub enum HeapObject {
    Array(Vec<Value>),
    /// Map: string keys to values (spec §3.1, §4.1).
    Map(OpenMap<Value>),
    /// Set: keyed internally by each member's display form (spec §3.1).
    Set(OpenMap<Value>),
    Buffer(Vec<u8>),
    Struct(StructInstance),
    Enum(EnumInstance),
    Closure(ClosureObj),
    /// The bytecode-VM counterpart of `Closure`, used only by `lattice-vm`.
    VmClosure(VmClosureObj),
    Channel(ChannelObj),
    RefCell(Value),
}

fn trace_value(v: &Value, out: &mut Vec<FluidHandle>) {
    use crate::value::HeapPtr;
    if let Some(HeapPtr::Fluid(h)) = v.heap_ptr() {
        out.push(h);
    }
    if let crate::value::ValueKind::Tuple(items) = &v.kind {
        for item in items.iter() {
            trace_value(item, out);
        }
    }
}

impl Trace for HeapObject {
    fn trace(&self, out: &mut Vec<FluidHandle>) {
        match self {
            HeapObject::Array(items) => {
                for v in items {
                    trace_value(v, out);
                }
            }
            HeapObject::Map(m) | HeapObject::Set(m) => {
                for (_, v) in m.iter() {
                    trace_value(v, out);
                }
            }
            HeapObject::Buffer(_) => {}
            HeapObject::Struct(s) => {
                for v in &s.fields {
                    trace_value(v, out);
                }
            }
            HeapObject::Enum(e) => {
                for v in &e.payload {
                    trace_value(v, out);
                }
            }
            HeapObject::Closure(c) => {
                c.captured_env.trace_into(out);
            }
            HeapObject::VmClosure(c) => {
                for cell in &c.upvalues {
                    trace_value(&cell.borrow(), out);
                }
            }
            HeapObject::Channel(ch) => {
                for v in &ch.buffer {
                    trace_value(v, out);
                }
            }
            HeapObject::RefCell(v) => trace_value(v, out),
        }
    }
}
