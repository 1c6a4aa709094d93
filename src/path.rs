// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! idShortPath codec.
//!
//! An element's address inside its submodel is the chain of segments from
//! the top-level element down to it. Named children are joined with `.`,
//! list items with a bracketed index:
//!
//! ```text
//! sensor                 top-level element
//! sensor.readings        named child of a collection
//! sensor.readings[2]     third item of a list
//! sensor.readings[2].ts  named child of that item
//! ```
//!
//! Everything here is pure. Prefix lookups are expressed as half-open string
//! ranges ([`prefix_range`]) so that no path character can act as a SQL
//! wildcard.

use crate::error::StoreError;
use crate::model::{Key, KeyType, ModelType, Reference};

/// One step of an idShortPath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Name(String),
    Index(usize),
}

/// Compute the path of a child given its parent's path and addressing mode.
///
/// An empty `parent_path` means the element is top-level.
pub fn compute_path(parent_path: &str, positional: bool, position: usize, id_short: &str) -> String {
    match (parent_path.is_empty(), positional) {
        (true, true) => format!("[{}]", position),
        (true, false) => id_short.to_string(),
        (false, true) => format!("{}[{}]", parent_path, position),
        (false, false) => format!("{}.{}", parent_path, id_short),
    }
}

/// Split a path into its segments.
///
/// Fails with `BadRequest` on unterminated or empty brackets, non-numeric
/// indices, empty name segments or stray `]`.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, StoreError> {
    if path.is_empty() {
        return Err(bad_path(path, "path is empty"));
    }

    let mut segments = Vec::new();
    let mut name = String::new();
    // True right after a ']' : only '.', '[' or end may follow
    let mut after_index = false;
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if after_index {
                    after_index = false;
                } else {
                    if name.is_empty() {
                        return Err(bad_path(path, "empty name segment"));
                    }
                    segments.push(PathSegment::Name(std::mem::take(&mut name)));
                }
                if chars.peek().is_none() {
                    return Err(bad_path(path, "empty name segment"));
                }
            }
            '[' => {
                if !name.is_empty() {
                    segments.push(PathSegment::Name(std::mem::take(&mut name)));
                } else if !after_index && !segments.is_empty() {
                    // "a.[0]"
                    return Err(bad_path(path, "empty name segment"));
                }
                let mut digits = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == ']' {
                        closed = true;
                        break;
                    }
                    digits.push(d);
                }
                if !closed {
                    return Err(bad_path(path, "unterminated index"));
                }
                if digits.is_empty() {
                    return Err(bad_path(path, "empty index"));
                }
                if !digits.chars().all(|d| d.is_ascii_digit()) {
                    return Err(bad_path(path, "index is not a non-negative integer"));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| bad_path(path, "index out of range"))?;
                segments.push(PathSegment::Index(index));
                after_index = true;
            }
            ']' => return Err(bad_path(path, "unexpected ']'")),
            other => {
                if after_index {
                    return Err(bad_path(path, "expected '.' or '[' after index"));
                }
                name.push(other);
            }
        }
    }

    if !name.is_empty() {
        segments.push(PathSegment::Name(name));
    }
    Ok(segments)
}

fn bad_path(path: &str, reason: &str) -> StoreError {
    StoreError::BadRequest(format!("invalid idShortPath '{}': {}", path, reason))
}

/// Render segments back into a path.
pub fn join_segments(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            PathSegment::Name(n) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(n);
            }
            PathSegment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// True when the element at `path` is addressed by position.
#[inline]
pub fn is_positional(path: &str) -> bool {
    path.ends_with(']')
}

/// Parent path and final segment: `a.b[3]` -> (`a.b`, `[3]`), `a.b` -> (`a`, `b`),
/// `a` -> (``, `a`).
pub fn split_last(path: &str) -> (&str, &str) {
    if is_positional(path) {
        if let Some(idx) = path.rfind('[') {
            return (&path[..idx], &path[idx..]);
        }
    }
    match path.rfind('.') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// The parent's path, or `None` for a top-level element.
pub fn parent_of(path: &str) -> Option<&str> {
    let (parent, _) = split_last(path);
    if parent.is_empty() {
        None
    } else {
        Some(parent)
    }
}

/// Replace the final name segment of a named path.
///
/// `a.b.c` renamed to `x` -> `a.b.x`; `a` -> `x`; `l[0].c` -> `l[0].x`.
pub fn rename_path(path: &str, new_id_short: &str) -> String {
    match path.rfind('.') {
        Some(idx) => format!("{}.{}", &path[..idx], new_id_short),
        None => new_id_short.to_string(),
    }
}

/// Prefixes every descendant path starts with: `path.` and `path[`.
pub fn descendant_prefixes(path: &str) -> [String; 2] {
    [format!("{}.", path), format!("{}[", path)]
}

/// Half-open range `[lo, hi)` containing exactly the strings that start with `prefix`.
///
/// Prefixes built by this module always end in `.` or `[`, so bumping the
/// last character never overflows.
pub fn prefix_range(prefix: &str) -> (String, String) {
    let mut upper: Vec<char> = prefix.chars().collect();
    match upper.pop() {
        Some(last) => {
            let bumped = char::from_u32(last as u32 + 1).unwrap_or(char::MAX);
            upper.push(bumped);
            (prefix.to_string(), upper.into_iter().collect())
        }
        None => (String::new(), char::MAX.to_string()),
    }
}

/// True when `candidate` is exactly one segment below `parent`.
pub fn is_direct_child(parent: &str, candidate: &str) -> bool {
    if let Some(rest) = candidate.strip_prefix(parent) {
        if let Some(name) = rest.strip_prefix('.') {
            return !name.is_empty() && !name.contains('.') && !name.contains('[');
        }
        if rest.starts_with('[') {
            return rest.ends_with(']') && rest.matches('[').count() == 1 && !rest.contains('.');
        }
    }
    false
}

/// Build the ModelReference addressing an element purely from its path.
///
/// The first key is the owning submodel; index segments become list keys,
/// interior names collection keys and the last segment the element's own type.
pub fn element_reference(submodel_id: &str, path: &str, model_type: ModelType) -> Result<Reference, StoreError> {
    let segments = parse_path(path)?;
    let mut keys = Vec::with_capacity(segments.len() + 1);
    keys.push(Key::new(KeyType::Submodel, submodel_id));
    let last = segments.len() - 1;
    for (i, seg) in segments.iter().enumerate() {
        let key = match seg {
            PathSegment::Index(idx) => Key::new(KeyType::SubmodelElementList, idx.to_string()),
            PathSegment::Name(name) if i == last => Key::new(model_type.key_type(), name.clone()),
            PathSegment::Name(name) => Key::new(KeyType::SubmodelElementCollection, name.clone()),
        };
        keys.push(key);
    }
    Ok(Reference::model(keys))
}

/// Check an idShort is usable as a named path segment.
pub fn validate_id_short(id_short: &str) -> Result<(), StoreError> {
    let mut chars = id_short.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::BadRequest(format!("invalid idShort '{}'", id_short)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_path() {
        assert_eq!(compute_path("", false, 0, "sensor"), "sensor");
        assert_eq!(compute_path("", true, 3, "ignored"), "[3]");
        assert_eq!(compute_path("sensor", false, 0, "temp"), "sensor.temp");
        assert_eq!(compute_path("sensor.readings", true, 2, ""), "sensor.readings[2]");
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(
            parse_path("sensor.readings[2].ts").unwrap(),
            vec![
                PathSegment::Name("sensor".into()),
                PathSegment::Name("readings".into()),
                PathSegment::Index(2),
                PathSegment::Name("ts".into()),
            ]
        );
        assert_eq!(
            parse_path("m[0][1]").unwrap(),
            vec![PathSegment::Name("m".into()), PathSegment::Index(0), PathSegment::Index(1)]
        );
        assert_eq!(parse_path("[4]").unwrap(), vec![PathSegment::Index(4)]);
    }

    #[test]
    fn test_parse_path_rejects_malformed() {
        for bad in ["", "a..b", ".a", "a.", "a[", "a[]", "a[x]", "a[-1]", "a]", "a[0]b", "a.[0]"] {
            let err = parse_path(bad).unwrap_err();
            assert!(err.is_bad_request(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_join_inverts_parse() {
        for p in ["a", "a.b", "a[0]", "a.b[10].c[2][3]", "[0].x"] {
            assert_eq!(join_segments(&parse_path(p).unwrap()), p);
        }
    }

    #[test]
    fn test_split_last_and_parent() {
        assert_eq!(split_last("a.b[3]"), ("a.b", "[3]"));
        assert_eq!(split_last("a.b"), ("a", "b"));
        assert_eq!(split_last("a"), ("", "a"));
        assert_eq!(split_last("l[0].x"), ("l[0]", "x"));
        assert_eq!(parent_of("a"), None);
        assert_eq!(parent_of("a[1]"), Some("a"));
    }

    #[test]
    fn test_rename_path() {
        assert_eq!(rename_path("sensor", "sensorX"), "sensorX");
        assert_eq!(rename_path("a.b.c", "x"), "a.b.x");
        assert_eq!(rename_path("l[0].c", "x"), "l[0].x");
    }

    #[test]
    fn test_prefix_range_covers_descendants_only() {
        let [dot, bracket] = descendant_prefixes("sensor");
        let (lo, hi) = prefix_range(&dot);
        assert_eq!(lo, "sensor.");
        assert_eq!(hi, "sensor/");
        let inside = |p: &str| p >= lo.as_str() && p < hi.as_str();
        assert!(inside("sensor.temp"));
        assert!(inside("sensor.a.b[1]"));
        assert!(!inside("sensor"));
        assert!(!inside("sensorBackup"));
        assert!(!inside("sensor_x"));

        let (lo, hi) = prefix_range(&bracket);
        assert_eq!((lo.as_str(), hi.as_str()), ("sensor[", "sensor\\"));
        assert!("sensor[0]" >= lo.as_str() && "sensor[0]" < hi.as_str());
    }

    #[test]
    fn test_is_direct_child() {
        assert!(is_direct_child("e", "e.s1"));
        assert!(is_direct_child("e", "e[0]"));
        assert!(!is_direct_child("e", "e.s1.x"));
        assert!(!is_direct_child("e", "e.s1[0]"));
        assert!(!is_direct_child("e", "e[0].x"));
        assert!(!is_direct_child("e", "ex"));
        assert!(!is_direct_child("e", "e"));
    }

    #[test]
    fn test_element_reference() {
        let r = element_reference("urn:sm", "sensor.readings[2]", ModelType::Property).unwrap();
        let keys: Vec<(KeyType, &str)> = r.keys.iter().map(|k| (k.key_type, k.value.as_str())).collect();
        assert_eq!(keys, vec![
            (KeyType::Submodel, "urn:sm"),
            (KeyType::SubmodelElementCollection, "sensor"),
            (KeyType::SubmodelElementCollection, "readings"),
            (KeyType::SubmodelElementList, "2"),
        ]);

        let r = element_reference("urn:sm", "alpha", ModelType::Range).unwrap();
        assert_eq!(r.keys[1], Key::new(KeyType::Range, "alpha"));
        assert!(element_reference("urn:sm", "a[", ModelType::Range).is_err());
    }

    #[test]
    fn test_validate_id_short() {
        assert!(validate_id_short("alpha").is_ok());
        assert!(validate_id_short("A_1-b").is_ok());
        for bad in ["", "1abc", "a.b", "a[0]", "_x", "sp ace"] {
            assert!(validate_id_short(bad).is_err(), "{} should be rejected", bad);
        }
    }
}
