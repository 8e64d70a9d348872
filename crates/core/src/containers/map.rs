//! Open-addressed mapping with linear probing and tombstones (spec §4.1).
//!
//! Slots have states {Empty, Occupied, Tombstone}. Resize is triggered once
//! (Occupied + Tombstone) crosses ~70% load factor. Keys are owned strings;
//! hashing is FNV-1a (`containers::fnv`). Iteration order is deterministic
//! for a given insertion history within a single build only — tests must
//! not assume cross-build order, per spec.

use super::fnv::fnv1a;

#[derive(Clone)]
enum Slot<V> {
    Empty,
    Occupied(Box<str>, V),
    Tombstone,
}

/// An open-addressed map from owned string keys to `V`.
#[derive(Clone)]
pub struct OpenMap<V> {
    slots: Vec<Slot<V>>,
    occupied: usize,
    tombstones: usize,
}

const INITIAL_CAPACITY: usize = 8;
const LOAD_FACTOR_NUM: usize = 7;
const LOAD_FACTOR_DEN: usize = 10;

impl<V> Default for OpenMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> OpenMap<V> {
    pub fn new() -> Self {
        OpenMap {
            slots: (0..INITIAL_CAPACITY).map(|_| Slot::Empty).collect(),
            occupied: 0,
            tombstones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    fn probe_index(&self, key: &str, i: usize) -> usize {
        let h = fnv1a(key.as_bytes()) as usize;
        (h.wrapping_add(i)) % self.slots.len()
    }

    fn needs_resize(&self) -> bool {
        (self.occupied + self.tombstones) * LOAD_FACTOR_DEN >= self.slots.len() * LOAD_FACTOR_NUM
    }

    fn resize(&mut self) {
        let new_cap = self.slots.len() * 2;
        let old = std::mem::replace(
            &mut self.slots,
            (0..new_cap).map(|_| Slot::Empty).collect(),
        );
        self.occupied = 0;
        self.tombstones = 0;
        for slot in old {
            if let Slot::Occupied(k, v) = slot {
                self.insert_fresh(&k, v);
            }
        }
    }

    /// Insert into an already-sized table with no tombstone reuse, used by resize.
    fn insert_fresh(&mut self, key: &str, value: V) {
        let mut i = 0;
        loop {
            let idx = self.probe_index(key, i);
            if matches!(self.slots[idx], Slot::Empty) {
                self.slots[idx] = Slot::Occupied(key.into(), value);
                self.occupied += 1;
                return;
            }
            i += 1;
        }
    }

    /// `set` replaces the value if `key` is present, otherwise inserts.
    /// Returns the previous value, if any.
    pub fn set(&mut self, key: &str, value: V) -> Option<V> {
        if self.needs_resize() {
            self.resize();
        }
        let mut i = 0;
        let mut first_tombstone: Option<usize> = None;
        loop {
            let idx = self.probe_index(key, i);
            match &self.slots[idx] {
                Slot::Empty => {
                    let target = first_tombstone.unwrap_or(idx);
                    if first_tombstone.is_some() {
                        self.tombstones -= 1;
                    }
                    self.slots[target] = Slot::Occupied(key.into(), value);
                    self.occupied += 1;
                    return None;
                }
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(idx);
                    }
                }
                Slot::Occupied(k, _) if &**k == key => {
                    if let Slot::Occupied(_, old) =
                        std::mem::replace(&mut self.slots[idx], Slot::Occupied(key.into(), value))
                    {
                        return Some(old);
                    }
                    unreachable!()
                }
                Slot::Occupied(_, _) => {}
            }
            i += 1;
            if i > self.slots.len() {
                // table full of tombstones/occupied with no match and no empty
                self.resize();
                return self.set(key, value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let mut i = 0;
        loop {
            let idx = self.probe_index(key, i);
            match &self.slots[idx] {
                Slot::Empty => return None,
                Slot::Occupied(k, v) if &**k == key => return Some(v),
                _ => {}
            }
            i += 1;
            if i > self.slots.len() {
                return None;
            }
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let mut i = 0;
        loop {
            let idx = self.probe_index(key, i);
            match &self.slots[idx] {
                Slot::Empty => return None,
                Slot::Occupied(k, _) if &**k == key => {
                    if let Slot::Occupied(_, v) = &mut self.slots[idx] {
                        return Some(v);
                    }
                    unreachable!()
                }
                _ => {}
            }
            i += 1;
            if i > self.slots.len() {
                return None;
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// `remove` sets Tombstone and decrements live count.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let mut i = 0;
        loop {
            let idx = self.probe_index(key, i);
            match &self.slots[idx] {
                Slot::Empty => return None,
                Slot::Occupied(k, _) if &**k == key => {
                    let old = std::mem::replace(&mut self.slots[idx], Slot::Tombstone);
                    self.occupied -= 1;
                    self.tombstones += 1;
                    if let Slot::Occupied(_, v) = old {
                        return Some(v);
                    }
                    unreachable!()
                }
                _ => {}
            }
            i += 1;
            if i > self.slots.len() {
                return None;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Occupied(k, v) => Some((&**k, v)),
            _ => None,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }
}

impl<V: PartialEq> PartialEq for OpenMap<V> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_roundtrip() {
        let mut m: OpenMap<i64> = OpenMap::new();
        assert_eq!(m.set("a", 1), None);
        assert_eq!(m.set("b", 2), None);
        assert_eq!(m.get("a"), Some(&1));
        assert_eq!(m.set("a", 10), Some(1));
        assert_eq!(m.get("a"), Some(&10));
        assert_eq!(m.remove("a"), Some(10));
        assert_eq!(m.get("a"), None);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn resizes_past_load_factor_without_losing_entries() {
        let mut m: OpenMap<i64> = OpenMap::new();
        for i in 0..200 {
            m.set(&format!("k{i}"), i);
        }
        assert_eq!(m.len(), 200);
        for i in 0..200 {
            assert_eq!(m.get(&format!("k{i}")), Some(&i));
        }
    }

    #[test]
    fn tombstone_slot_is_reused_on_insert() {
        let mut m: OpenMap<i64> = OpenMap::new();
        m.set("a", 1);
        m.remove("a");
        m.set("b", 2);
        assert_eq!(m.get("b"), Some(&2));
        assert_eq!(m.get("a"), None);
    }
}
