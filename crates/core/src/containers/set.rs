//! `Value::Set`'s backing store: a set keyed by each member's display form,
//! built as a thin wrapper over `OpenMap<()>` (spec §3.1, §4.1).

use super::map::OpenMap;

#[derive(Clone, Default)]
pub struct OpenSet {
    inner: OpenMap<()>,
}

impl OpenSet {
    pub fn new() -> Self {
        OpenSet {
            inner: OpenMap::new(),
        }
    }

    /// Returns true if `key` was newly inserted.
    pub fn insert(&mut self, key: &str) -> bool {
        self.inner.set(key, ()).is_none()
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.inner.keys()
    }
}

impl PartialEq for OpenSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|k| other.contains(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut s = OpenSet::new();
        assert!(s.insert("a"));
        assert!(!s.insert("a"));
        assert_eq!(s.len(), 1);
    }
}
