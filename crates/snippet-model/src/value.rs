use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single table cell or snippet runtime value.
///
/// The enum uses an explicit `{type, value}` tagged layout for stable
/// persistence. `Bool` only occurs as an intermediate runtime value
/// (comparison results); it is not a valid column or output representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// Missing / unset cell value.
    Missing,
    /// 64-bit signed integer.
    Int(i64),
    /// IEEE-754 double precision number.
    Real(f64),
    /// Plain string.
    Text(String),
    /// Boolean (runtime-only).
    Bool(bool),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Missing
    }
}

impl CellValue {
    /// Returns true if the value is [`CellValue::Missing`].
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Lower-case kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CellValue::Missing => "missing",
            CellValue::Int(_) => "integer",
            CellValue::Real(_) => "real",
            CellValue::Text(_) => "text",
            CellValue::Bool(_) => "boolean",
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Real(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Missing => f.write_str("?"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Real(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The kind a bound snippet input field carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int,
    Real,
    Text,
}

impl ValueKind {
    /// Name as written in synthesized field declarations (`field x: Int;`).
    pub fn decl_name(self) -> &'static str {
        match self {
            ValueKind::Int => "Int",
            ValueKind::Real => "Real",
            ValueKind::Text => "Text",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.decl_name())
    }
}

/// Error returned when parsing an [`OutputKind`] from its persisted name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid return type: {0}")]
pub struct UnknownOutputKind(pub String);

/// Declared result representation of a compiled snippet.
///
/// Closed set; determines both the cast appended at compile time and the
/// concrete cell produced at evaluation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Int,
    Real,
    Text,
}

impl OutputKind {
    /// Stable name used when persisting settings.
    pub fn as_name(self) -> &'static str {
        match self {
            OutputKind::Int => "Int",
            OutputKind::Real => "Real",
            OutputKind::Text => "Text",
        }
    }

    /// Inverse of [`OutputKind::as_name`].
    pub fn from_name(name: &str) -> Result<Self, UnknownOutputKind> {
        match name {
            "Int" => Ok(OutputKind::Int),
            "Real" => Ok(OutputKind::Real),
            "Text" => Ok(OutputKind::Text),
            other => Err(UnknownOutputKind(other.to_string())),
        }
    }

    /// The column kind of the produced output column.
    pub fn column_kind(self) -> crate::table::ColumnKind {
        match self {
            OutputKind::Int => crate::table::ColumnKind::Int,
            OutputKind::Real => crate::table::ColumnKind::Real,
            OutputKind::Text => crate::table::ColumnKind::Text,
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cell_value_serde_tagged_layout() {
        let v = CellValue::Int(42);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"type":"int","value":42}"#);
        let back: CellValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn missing_serializes_without_content() {
        let json = serde_json::to_string(&CellValue::Missing).unwrap();
        let back: CellValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CellValue::Missing);
    }

    #[test]
    fn display_renders_missing_as_question_mark() {
        assert_eq!(CellValue::Missing.to_string(), "?");
        assert_eq!(CellValue::Text("a".into()).to_string(), "a");
        assert_eq!(CellValue::Real(1.5).to_string(), "1.5");
    }

    #[test]
    fn output_kind_name_round_trip() {
        for kind in [OutputKind::Int, OutputKind::Real, OutputKind::Text] {
            assert_eq!(OutputKind::from_name(kind.as_name()).unwrap(), kind);
        }
        assert!(OutputKind::from_name("Complex").is_err());
    }
}
