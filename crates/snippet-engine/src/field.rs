//! Generated field names and the name-to-kind mapping shared by the token
//! rewriter, the unit compiler and the row binder.

use serde::{Deserialize, Serialize};
use snippet_model::ValueKind;

/// Reserved field name bound to the 0-based row index
/// (written as `$$ROWNUMBER$$` in snippet text).
pub const ROW_INDEX: &str = "ROWNUMBER";

/// Reserved field name bound to the row key
/// (written as `$$ROWKEY$$` in snippet text).
pub const ROW_KEY: &str = "ROWKEY";

/// Field name of the column at `index`, as used in rewritten snippet bodies.
///
/// Deterministic in the column position so that the rewriter, the unit
/// compiler and the row binder agree on names without re-running the rewrite.
pub fn col_field_name(index: usize) -> String {
    format!("col{index}")
}

/// Column position encoded in a generated field name, if it is one.
pub fn col_field_index(name: &str) -> Option<usize> {
    name.strip_prefix("col")?.parse().ok()
}

/// One `field name -> kind` association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub kind: ValueKind,
}

/// Ordered, key-unique association from generated field names to the kind a
/// bound value must carry.
///
/// Built once during rewriting, immutable afterwards. Insertion order is
/// first-reference order, which makes repeated rewrites of the same snippet
/// against the same schema produce identical maps.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldMap {
    entries: Vec<FieldEntry>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name -> kind`. Re-inserting an existing name is a no-op; the
    /// rewriter derives the kind from the same schema every time, so a
    /// conflicting kind for an existing name cannot occur.
    pub fn insert(&mut self, name: impl Into<String>, kind: ValueKind) {
        let name = name.into();
        if let Some(existing) = self.entries.iter().find(|e| e.name == name) {
            debug_assert_eq!(existing.kind, kind, "conflicting kind for field {name}");
            return;
        }
        self.entries.push(FieldEntry { name, kind });
    }

    pub fn get(&self, name: &str) -> Option<ValueKind> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_keeps_first_reference_order() {
        let mut map = FieldMap::new();
        map.insert(col_field_name(2), ValueKind::Real);
        map.insert(ROW_INDEX, ValueKind::Int);
        map.insert(col_field_name(0), ValueKind::Text);
        let names: Vec<&str> = map.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["col2", "ROWNUMBER", "col0"]);
    }

    #[test]
    fn reinsert_is_a_noop() {
        let mut map = FieldMap::new();
        map.insert("col0", ValueKind::Int);
        map.insert("col0", ValueKind::Int);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn col_field_name_round_trip() {
        assert_eq!(col_field_name(17), "col17");
        assert_eq!(col_field_index("col17"), Some(17));
        assert_eq!(col_field_index("column17"), None);
        assert_eq!(col_field_index(ROW_KEY), None);
    }
}
