use crate::value::{CellValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Declared kind of a table column.
///
/// `Other` covers host column types the engine has no native representation
/// for; their cells degrade to a textual rendering when bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Real,
    Text,
    Other,
}

impl ColumnKind {
    /// The field kind a reference to a column of this kind resolves to:
    /// integer-compatible columns bind as `Int`, real-compatible as `Real`,
    /// everything else as `Text`.
    pub fn resolved_value_kind(self) -> ValueKind {
        match self {
            ColumnKind::Int => ValueKind::Int,
            ColumnKind::Real => ValueKind::Real,
            ColumnKind::Text | ColumnKind::Other => ValueKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableSpecError {
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// Name + kind of a single column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    name: String,
    kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }
}

/// Ordered, name-unique column layout of a table.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSpec {
    columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Builds a spec, rejecting duplicate column names.
    pub fn new(columns: impl IntoIterator<Item = ColumnSpec>) -> Result<Self, TableSpecError> {
        let columns: Vec<ColumnSpec> = columns.into_iter().collect();
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(TableSpecError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnSpec> {
        self.columns.get(index)
    }

    /// 0-based position of the named column, if present.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter()
    }
}

/// Unique, textual identifier of a row within one table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        RowKey::new(value)
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        RowKey(value)
    }
}

/// One table row: a key plus one cell per column of the owning spec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    key: RowKey,
    cells: Vec<CellValue>,
}

impl Row {
    pub fn new(key: impl Into<RowKey>, cells: Vec<CellValue>) -> Self {
        Self {
            key: key.into(),
            cells,
        }
    }

    pub fn key(&self) -> &RowKey {
        &self.key
    }

    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> TableSpec {
        TableSpec::new([
            ColumnSpec::new("A", ColumnKind::Int),
            ColumnSpec::new("B", ColumnKind::Real),
            ColumnSpec::new("C", ColumnKind::Text),
        ])
        .unwrap()
    }

    #[test]
    fn find_column_by_name() {
        let spec = spec();
        assert_eq!(spec.find_column("B"), Some(1));
        assert_eq!(spec.find_column("missing"), None);
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let err = TableSpec::new([
            ColumnSpec::new("A", ColumnKind::Int),
            ColumnSpec::new("A", ColumnKind::Text),
        ])
        .unwrap_err();
        assert_eq!(err, TableSpecError::DuplicateColumn("A".to_string()));
    }

    #[test]
    fn column_kind_resolution() {
        assert_eq!(ColumnKind::Int.resolved_value_kind(), ValueKind::Int);
        assert_eq!(ColumnKind::Real.resolved_value_kind(), ValueKind::Real);
        assert_eq!(ColumnKind::Other.resolved_value_kind(), ValueKind::Text);
    }
}
