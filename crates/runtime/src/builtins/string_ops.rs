//! `String` methods (spec §3.1). Strings are immutable payloads (see
//! `string.rs`'s doc comment) so every op here returns a fresh `Value`
//! rather than mutating in place.

use super::normalize_index;
use crate::string::LString;
use crate::value::{Value, ValueKind};
use lattice_core::heap::crystal::RegionId;
use lattice_core::{LatticeError, Phase, Result};

fn routed(phase: Phase, region: Option<RegionId>, s: String) -> LString {
    match (phase, region) {
        (Phase::Crystal, Some(region)) => LString::new_crystal(region, s),
        _ => LString::new_fluid(s),
    }
}

pub fn len(s: &LString) -> usize {
    s.len()
}

pub fn concat(a: &LString, b: &LString, phase: Phase, region: Option<RegionId>) -> Value {
    let joined = format!("{}{}", a.as_str(), b.as_str());
    Value::new(phase, ValueKind::String(routed(phase, region, joined)))
}

pub fn char_at(s: &LString, index: i64) -> Result<String> {
    let chars: Vec<char> = s.as_str().chars().collect();
    normalize_index(index, chars.len())
        .map(|i| chars[i].to_string())
        .ok_or_else(|| LatticeError::IndexError {
            message: format!("character index {index} out of bounds"),
            loc: None,
        })
}

pub fn slice(s: &LString, start: i64, end: i64, phase: Phase, region: Option<RegionId>) -> Result<Value> {
    let chars: Vec<char> = s.as_str().chars().collect();
    let len = chars.len();
    let start = normalize_index(start, len + 1).unwrap_or(len);
    let end = normalize_index(end, len + 1).unwrap_or(len);
    if start > end {
        return Err(LatticeError::IndexError {
            message: format!("slice start {start} after end {end}"),
            loc: None,
        });
    }
    let sliced: String = chars[start..end].iter().collect();
    Ok(Value::new(phase, ValueKind::String(routed(phase, region, sliced))))
}

pub fn split(s: &LString, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        s.as_str().chars().map(|c| c.to_string()).collect()
    } else {
        s.as_str().split(sep).map(str::to_string).collect()
    }
}

pub fn contains(s: &LString, needle: &str) -> bool {
    s.as_str().contains(needle)
}

pub fn index_of(s: &LString, needle: &str) -> Option<usize> {
    s.as_str().find(needle).map(|byte_idx| s.as_str()[..byte_idx].chars().count())
}

pub fn to_upper(s: &LString, phase: Phase, region: Option<RegionId>) -> Value {
    Value::new(
        phase,
        ValueKind::String(routed(phase, region, s.as_str().to_uppercase())),
    )
}

pub fn to_lower(s: &LString, phase: Phase, region: Option<RegionId>) -> Value {
    Value::new(
        phase,
        ValueKind::String(routed(phase, region, s.as_str().to_lowercase())),
    )
}

pub fn trim(s: &LString, phase: Phase, region: Option<RegionId>) -> Value {
    Value::new(
        phase,
        ValueKind::String(routed(phase, region, s.as_str().trim().to_string())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_joins_payloads() {
        let a = LString::new_fluid("foo");
        let b = LString::new_fluid("bar");
        let v = concat(&a, &b, Phase::Fluid, None);
        assert!(matches!(&v.kind, ValueKind::String(s) if s.as_str() == "foobar"));
    }

    #[test]
    fn slice_takes_a_character_range() {
        let s = LString::new_fluid("hello");
        let v = slice(&s, 1, 4, Phase::Fluid, None).unwrap();
        assert!(matches!(&v.kind, ValueKind::String(s) if s.as_str() == "ell"));
    }

    #[test]
    fn split_on_empty_separator_yields_characters() {
        let s = LString::new_fluid("abc");
        assert_eq!(split(&s, ""), vec!["a", "b", "c"]);
    }

    #[test]
    fn index_of_counts_characters_not_bytes() {
        let s = LString::new_fluid("héllo");
        assert_eq!(index_of(&s, "llo"), Some(2));
    }
}
