//! Channel operations (spec §5): a bounded FIFO shared between cooperative
//! tasks. A channel is a `Ref`-shaped value — `send`/`recv`/`close` mutate it
//! through a `HeapPtr` the same way array/map mutation does; closing is
//! irreversible.

use crate::heap::Heap;
use crate::heap_object::HeapObject;
use crate::value::{ChannelObj, HeapPtr, Value};
use lattice_core::{LatticeError, Result};

pub fn new(capacity: usize) -> ChannelObj {
    ChannelObj {
        buffer: std::collections::VecDeque::with_capacity(capacity),
        capacity,
        closed: false,
    }
}

/// A single non-suspending send attempt. The scheduler retries (yielding
/// between attempts) on `Full` until it succeeds or the channel closes.
pub enum SendOutcome {
    Sent,
    Full,
    Closed,
}

/// A single non-suspending receive attempt. Per spec §5: "receive on a
/// closed empty channel returns the closed sentinel (Nil)" — callers that
/// want the suspend-then-retry behavior loop on `Empty`.
pub enum RecvOutcome {
    Value(Value),
    Empty,
    Closed,
}

pub fn try_send(heap: &mut Heap, ptr: HeapPtr, value: Value) -> Result<SendOutcome> {
    match heap.get_mut(ptr) {
        Some(HeapObject::Channel(ch)) => {
            if ch.closed {
                Ok(SendOutcome::Closed)
            } else if ch.buffer.len() >= ch.capacity {
                Ok(SendOutcome::Full)
            } else {
                ch.buffer.push_back(value);
                Ok(SendOutcome::Sent)
            }
        }
        _ => Err(LatticeError::type_error("not a channel")),
    }
}

pub fn try_recv(heap: &mut Heap, ptr: HeapPtr) -> Result<RecvOutcome> {
    match heap.get_mut(ptr) {
        Some(HeapObject::Channel(ch)) => {
            if let Some(v) = ch.buffer.pop_front() {
                Ok(RecvOutcome::Value(v))
            } else if ch.closed {
                Ok(RecvOutcome::Closed)
            } else {
                Ok(RecvOutcome::Empty)
            }
        }
        _ => Err(LatticeError::type_error("not a channel")),
    }
}

/// Irreversible (spec §5: "closing is irreversible").
pub fn close(heap: &mut Heap, ptr: HeapPtr) -> Result<()> {
    match heap.get_mut(ptr) {
        Some(HeapObject::Channel(ch)) => {
            ch.closed = true;
            Ok(())
        }
        _ => Err(LatticeError::type_error("not a channel")),
    }
}

pub fn is_closed(heap: &Heap, ptr: HeapPtr) -> Result<bool> {
    match heap.get(ptr) {
        Some(HeapObject::Channel(ch)) => Ok(ch.closed),
        _ => Err(LatticeError::type_error("not a channel")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::heap::routing::AllocCtx;
    use lattice_core::RuntimeFlags;

    fn new_channel(heap: &mut Heap, capacity: usize) -> HeapPtr {
        heap.alloc(HeapObject::Channel(new(capacity)), AllocCtx::Fluid, &[])
    }

    #[test]
    fn send_fills_then_reports_full() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = new_channel(&mut heap, 1);
        assert!(matches!(try_send(&mut heap, ptr, Value::int(1)).unwrap(), SendOutcome::Sent));
        assert!(matches!(try_send(&mut heap, ptr, Value::int(2)).unwrap(), SendOutcome::Full));
    }

    #[test]
    fn recv_drains_fifo_order() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = new_channel(&mut heap, 2);
        try_send(&mut heap, ptr, Value::int(1)).unwrap();
        try_send(&mut heap, ptr, Value::int(2)).unwrap();
        match try_recv(&mut heap, ptr).unwrap() {
            RecvOutcome::Value(v) => assert!(matches!(v.kind, crate::value::ValueKind::Int(1))),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn recv_on_closed_empty_channel_reports_closed() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = new_channel(&mut heap, 1);
        close(&mut heap, ptr).unwrap();
        assert!(matches!(try_recv(&mut heap, ptr).unwrap(), RecvOutcome::Closed));
    }
}
