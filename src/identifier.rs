//! Identifier & Property Model
//!
//! Pure value types and validators for namespace paths, table identifiers,
//! and property maps. No state; everything here is a pure function over its
//! inputs, per the teacher's `validation::input` module style.

use std::collections::HashMap;
use std::fmt;

use crate::error::{IcebergError, Result};

/// Reserved property key, synthesized on read and rejected on write.
pub const EXISTS_PROPERTY: &str = "exists";

const MAX_PROPERTY_KEY_BYTES: usize = 255;
const MAX_PROPERTY_VALUE_BYTES: usize = 4096;
const FORBIDDEN_TABLE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// An ordered, non-empty sequence of namespace name segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    segments: Vec<String>,
}

impl Namespace {
    /// Build a namespace from segments, validating them.
    pub fn new(segments: Vec<String>) -> Result<Self> {
        validate_namespace(&segments)?;
        Ok(Self { segments })
    }

    /// Build a namespace from segments without validation. Only for internal
    /// callers that already know the segments are well-formed (e.g. decoded
    /// from a trusted catalog-state document).
    pub(crate) fn new_unchecked(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Canonical dot-joined string form. Lossless: `parse(canonicalize(ns)) == ns`.
    pub fn canonicalize(&self) -> String {
        self.segments.join(".")
    }

    /// Parse a canonical string form. The empty string maps to the empty namespace.
    pub fn parse(s: &str) -> Namespace {
        if s.is_empty() {
            return Namespace { segments: vec![] };
        }
        Namespace {
            segments: s.split('.').map(|p| p.to_string()).collect(),
        }
    }

    /// Is `self` a direct parent of `child` (i.e. `child` has exactly one more segment)?
    pub fn is_direct_parent_of(&self, child: &Namespace) -> bool {
        child.segments.len() == self.segments.len() + 1
            && child.segments[..self.segments.len()] == self.segments[..]
    }

    /// Whether this namespace is top-level (contains no further `.` when canonicalized).
    pub fn is_top_level(&self) -> bool {
        !self.canonicalize().contains('.')
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonicalize())
    }
}

/// A namespace plus a final table-name segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdent {
    pub namespace: Namespace,
    pub name: String,
}

impl TableIdent {
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_table_name(&name)?;
        Ok(Self { namespace, name })
    }

    /// `<namespace>.<name>` key used by the JSON/SQL backends to index tables.
    pub fn storage_key(&self) -> String {
        format!("{}.{}", self.namespace.canonicalize(), self.name)
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

fn has_control_char(s: &str) -> bool {
    s.chars().any(|c| c.is_control())
}

/// Validate-namespace(ids): fails with `invalid-identifier` on an empty
/// namespace, an empty/whitespace-only/control-char segment, or a segment
/// containing the `.` separator.
pub fn validate_namespace(segments: &[String]) -> Result<()> {
    if segments.is_empty() {
        return Err(IcebergError::InvalidIdentifier(
            "namespace must have at least one segment".to_string(),
        ));
    }
    for seg in segments {
        if seg.is_empty() || seg.trim().is_empty() {
            return Err(IcebergError::InvalidIdentifier(format!(
                "namespace segment must not be empty or whitespace-only: {seg:?}"
            )));
        }
        if has_control_char(seg) {
            return Err(IcebergError::InvalidIdentifier(format!(
                "namespace segment contains control characters: {seg:?}"
            )));
        }
        if seg.contains('.') {
            return Err(IcebergError::InvalidIdentifier(format!(
                "namespace segment must not contain '.': {seg:?}"
            )));
        }
    }
    Ok(())
}

/// Validate-table(id): requires a namespace of length >= 1 (checked by the
/// caller constructing `Namespace`) and a final segment meeting the
/// character policy.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() || name.trim().is_empty() {
        return Err(IcebergError::InvalidIdentifier(
            "table name must not be empty or whitespace-only".to_string(),
        ));
    }
    if has_control_char(name) {
        return Err(IcebergError::InvalidIdentifier(format!(
            "table name contains control characters: {name:?}"
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_TABLE_CHARS.contains(c)) {
        return Err(IcebergError::InvalidIdentifier(format!(
            "table name contains forbidden character '{c}': {name:?}"
        )));
    }
    Ok(())
}

/// Validate-property(k,v): enforces key/value length and character limits;
/// rejects the reserved `exists` key on write.
pub fn validate_property(key: &str, value: &str) -> Result<()> {
    if key.is_empty() {
        return Err(IcebergError::InvalidProperty(
            "property key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_PROPERTY_KEY_BYTES {
        return Err(IcebergError::InvalidProperty(format!(
            "property key exceeds {MAX_PROPERTY_KEY_BYTES} bytes: {key:?}"
        )));
    }
    if key
        .bytes()
        .any(|b| b == 0 || b == b'\r' || b == b'\n' || b == b'\t')
    {
        return Err(IcebergError::InvalidProperty(format!(
            "property key contains a disallowed control byte: {key:?}"
        )));
    }
    if key == EXISTS_PROPERTY {
        return Err(IcebergError::InvalidProperty(
            "'exists' is a reserved property key".to_string(),
        ));
    }
    if value.len() > MAX_PROPERTY_VALUE_BYTES {
        return Err(IcebergError::InvalidProperty(format!(
            "property value exceeds {MAX_PROPERTY_VALUE_BYTES} bytes for key {key:?}"
        )));
    }
    if value.bytes().any(|b| b == 0) {
        return Err(IcebergError::InvalidProperty(format!(
            "property value contains a NUL byte for key {key:?}"
        )));
    }
    Ok(())
}

/// Validate a whole property map at once (used on namespace/table creation).
pub fn validate_properties(props: &HashMap<String, String>) -> Result<()> {
    for (k, v) in props {
        validate_property(k, v)?;
    }
    Ok(())
}

/// Summary of an `update-namespace-properties` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyUpdateSummary {
    pub removed: Vec<String>,
    pub updated: Vec<String>,
    pub missing: Vec<String>,
}

/// Apply removals then updates to a property map, per spec semantics: a key
/// in both lists nets to an update (remove then add), `exists` is rejected
/// up front, and removing a missing key is reported rather than erroring.
pub fn apply_property_update(
    props: &mut HashMap<String, String>,
    removals: &[String],
    updates: &HashMap<String, String>,
) -> Result<PropertyUpdateSummary> {
    for key in removals {
        if key == EXISTS_PROPERTY {
            return Err(IcebergError::InvalidProperty(
                "'exists' is a reserved property key".to_string(),
            ));
        }
    }
    validate_properties(updates)?;

    let mut summary = PropertyUpdateSummary::default();
    for key in removals {
        if props.remove(key).is_some() {
            summary.removed.push(key.clone());
        } else {
            summary.missing.push(key.clone());
        }
    }
    for (k, v) in updates {
        props.insert(k.clone(), v.clone());
        summary.updated.push(k.clone());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_round_trip() {
        let ns = Namespace::new(vec!["analytics".into(), "events".into()]).unwrap();
        let s = ns.canonicalize();
        assert_eq!(s, "analytics.events");
        assert_eq!(Namespace::parse(&s), ns);
    }

    #[test]
    fn empty_string_round_trips_to_empty_namespace() {
        let ns = Namespace::parse("");
        assert!(ns.is_empty());
        assert_eq!(ns.canonicalize(), "");
    }

    #[test]
    fn namespace_rejects_empty_segment() {
        let err = Namespace::new(vec!["a".into(), "".into()]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidIdentifier);
    }

    #[test]
    fn namespace_rejects_dot_in_segment() {
        assert!(Namespace::new(vec!["a.b".into()]).is_err());
    }

    #[test]
    fn table_name_rejects_forbidden_chars() {
        assert!(validate_table_name("a/b").is_err());
        assert!(validate_table_name("a:b").is_err());
        assert!(validate_table_name("ok_name").is_ok());
    }

    #[test]
    fn property_rejects_reserved_key_on_write() {
        assert!(validate_property(EXISTS_PROPERTY, "true").is_err());
    }

    #[test]
    fn top_level_detection() {
        let a = Namespace::new(vec!["a".into()]).unwrap();
        let ab = Namespace::new(vec!["a".into(), "b".into()]).unwrap();
        assert!(a.is_top_level());
        assert!(!ab.is_top_level());
        assert!(a.is_direct_parent_of(&ab));
    }

    #[test]
    fn property_update_summary_semantics() {
        let mut props = HashMap::from([("owner".to_string(), "u".to_string())]);
        let updates = HashMap::from([
            ("owner".to_string(), "v".to_string()),
            ("env".to_string(), "test".to_string()),
        ]);
        let summary =
            apply_property_update(&mut props, &["owner".to_string(), "gone".to_string()], &updates)
                .unwrap();
        assert_eq!(summary.removed, vec!["owner".to_string()]);
        assert_eq!(summary.missing, vec!["gone".to_string()]);
        assert!(summary.updated.contains(&"owner".to_string()));
        assert!(summary.updated.contains(&"env".to_string()));
        assert_eq!(props.get("owner"), Some(&"v".to_string()));
        assert_eq!(props.get("env"), Some(&"test".to_string()));
    }
}
