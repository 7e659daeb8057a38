//! Persisted configuration of one snippet column.
//!
//! The host hands the engine a flat key/value store; [`CalculatorSettings`]
//! is the typed view over it. Key names are stable across versions.

use serde::{Deserialize, Serialize};
use snippet_model::{OutputKind, UnknownOutputKind};
use std::collections::BTreeMap;
use thiserror::Error;

pub const CFG_EXPRESSION: &str = "expression";
pub const CFG_HEADER: &str = "header";
pub const CFG_COLUMN_NAME: &str = "replaced_column";
pub const CFG_IS_REPLACE: &str = "append_column";
pub const CFG_RETURN_TYPE: &str = "return_type";
/// Dialog-only flag; the engine itself never reads it.
pub const CFG_TEST_COMPILATION: &str = "test_compilation_on_dialog_close";
pub const CFG_IMPORTS: &str = "imports";
pub const CFG_LIBRARIES: &str = "libraries";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("missing settings key `{0}`")]
    MissingKey(String),
    #[error("settings key `{key}` has the wrong type (expected {expected})")]
    WrongType { key: String, expected: &'static str },
    #[error(transparent)]
    UnknownOutputKind(#[from] UnknownOutputKind),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingsValue {
    Text(String),
    Bool(bool),
    List(Vec<String>),
}

/// String-keyed flat store; the persistence contract with the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsMap {
    entries: BTreeMap<String, SettingsValue>,
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), SettingsValue::Text(value.into()));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.entries.insert(key.into(), SettingsValue::Bool(value));
    }

    pub fn set_list(&mut self, key: impl Into<String>, value: Vec<String>) {
        self.entries.insert(key.into(), SettingsValue::List(value));
    }

    pub fn text(&self, key: &str) -> Result<&str, SettingsError> {
        match self.entries.get(key) {
            Some(SettingsValue::Text(s)) => Ok(s),
            Some(_) => Err(SettingsError::WrongType {
                key: key.to_string(),
                expected: "text",
            }),
            None => Err(SettingsError::MissingKey(key.to_string())),
        }
    }

    pub fn boolean(&self, key: &str) -> Result<bool, SettingsError> {
        match self.entries.get(key) {
            Some(SettingsValue::Bool(b)) => Ok(*b),
            Some(_) => Err(SettingsError::WrongType {
                key: key.to_string(),
                expected: "bool",
            }),
            None => Err(SettingsError::MissingKey(key.to_string())),
        }
    }

    pub fn list(&self, key: &str) -> Result<&[String], SettingsError> {
        match self.entries.get(key) {
            Some(SettingsValue::List(l)) => Ok(l),
            Some(_) => Err(SettingsError::WrongType {
                key: key.to_string(),
                expected: "list",
            }),
            None => Err(SettingsError::MissingKey(key.to_string())),
        }
    }

    /// Like [`SettingsMap::text`], but a missing key yields the default.
    pub fn text_or(&self, key: &str, default: &str) -> Result<String, SettingsError> {
        match self.text(key) {
            Ok(s) => Ok(s.to_string()),
            Err(SettingsError::MissingKey(_)) => Ok(default.to_string()),
            Err(err) => Err(err),
        }
    }

    pub fn boolean_or(&self, key: &str, default: bool) -> Result<bool, SettingsError> {
        match self.boolean(key) {
            Ok(b) => Ok(b),
            Err(SettingsError::MissingKey(_)) => Ok(default),
            Err(err) => Err(err),
        }
    }

    pub fn list_or(&self, key: &str, default: Vec<String>) -> Result<Vec<String>, SettingsError> {
        match self.list(key) {
            Ok(l) => Ok(l.to_vec()),
            Err(SettingsError::MissingKey(_)) => Ok(default),
            Err(err) => Err(err),
        }
    }
}

/// Typed view of one snippet column configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorSettings {
    pub expression: String,
    /// Optional statement block evaluated before the expression.
    pub header: String,
    /// Name of the produced column (replacement target when `is_replace`).
    pub column_name: String,
    pub is_replace: bool,
    pub output: OutputKind,
    /// Dialog-only: verify the snippet compiles when the dialog closes.
    pub test_compilation_on_close: bool,
    /// Extra import declarations beyond the default set.
    pub imports: Vec<String>,
    /// Locations of extension function archives; resolved by the host.
    pub libraries: Vec<String>,
}

impl CalculatorSettings {
    pub fn new(
        expression: impl Into<String>,
        column_name: impl Into<String>,
        output: OutputKind,
    ) -> Self {
        Self {
            expression: expression.into(),
            header: String::new(),
            column_name: column_name.into(),
            is_replace: false,
            output,
            test_compilation_on_close: true,
            imports: Vec::new(),
            libraries: Vec::new(),
        }
    }

    pub fn save(&self, map: &mut SettingsMap) {
        map.set_text(CFG_EXPRESSION, self.expression.clone());
        map.set_text(CFG_HEADER, self.header.clone());
        map.set_text(CFG_COLUMN_NAME, self.column_name.clone());
        map.set_bool(CFG_IS_REPLACE, self.is_replace);
        map.set_text(CFG_RETURN_TYPE, self.output.as_name());
        map.set_bool(CFG_TEST_COMPILATION, self.test_compilation_on_close);
        map.set_list(CFG_IMPORTS, self.imports.clone());
        map.set_list(CFG_LIBRARIES, self.libraries.clone());
    }

    pub fn load(map: &SettingsMap) -> Result<Self, SettingsError> {
        let expression = map.text(CFG_EXPRESSION)?.to_string();
        let column_name = map.text(CFG_COLUMN_NAME)?.to_string();
        let is_replace = map.boolean(CFG_IS_REPLACE)?;
        let output = OutputKind::from_name(map.text(CFG_RETURN_TYPE)?)?;
        Ok(Self {
            expression,
            header: map.text_or(CFG_HEADER, "")?,
            column_name,
            is_replace,
            output,
            test_compilation_on_close: map.boolean_or(CFG_TEST_COMPILATION, true)?,
            imports: map.list_or(CFG_IMPORTS, Vec::new())?,
            libraries: map.list_or(CFG_LIBRARIES, Vec::new())?,
        })
    }

    /// Checks a store without materializing the settings.
    pub fn validate(map: &SettingsMap) -> Result<(), SettingsError> {
        Self::load(map).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn save_load_round_trip() {
        let mut settings = CalculatorSettings::new("$A$ + 1", "sum", OutputKind::Int);
        settings.is_replace = true;
        settings.header = "x = 1;".to_string();
        settings.imports = vec!["geo".to_string()];
        settings.libraries = vec!["/opt/libs/geo.snar".to_string()];

        let mut map = SettingsMap::new();
        settings.save(&mut map);
        let loaded = CalculatorSettings::load(&map).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_optional_keys_use_defaults() {
        let mut map = SettingsMap::new();
        map.set_text(CFG_EXPRESSION, "1");
        map.set_text(CFG_COLUMN_NAME, "out");
        map.set_bool(CFG_IS_REPLACE, false);
        map.set_text(CFG_RETURN_TYPE, "Real");

        let loaded = CalculatorSettings::load(&map).unwrap();
        assert_eq!(loaded.header, "");
        assert!(loaded.test_compilation_on_close);
        assert!(loaded.imports.is_empty());
        assert!(loaded.libraries.is_empty());
    }

    #[test]
    fn missing_required_key_fails() {
        let map = SettingsMap::new();
        let err = CalculatorSettings::validate(&map).unwrap_err();
        assert_eq!(err, SettingsError::MissingKey(CFG_EXPRESSION.to_string()));
    }

    #[test]
    fn unknown_return_type_fails() {
        let mut map = SettingsMap::new();
        map.set_text(CFG_EXPRESSION, "1");
        map.set_text(CFG_COLUMN_NAME, "out");
        map.set_bool(CFG_IS_REPLACE, false);
        map.set_text(CFG_RETURN_TYPE, "Complex");
        let err = CalculatorSettings::load(&map).unwrap_err();
        assert!(matches!(err, SettingsError::UnknownOutputKind(_)), "{err:?}");
    }

    #[test]
    fn wrong_type_is_not_masked_by_defaults() {
        let mut map = SettingsMap::new();
        map.set_text(CFG_EXPRESSION, "1");
        map.set_text(CFG_COLUMN_NAME, "out");
        map.set_bool(CFG_IS_REPLACE, false);
        map.set_text(CFG_RETURN_TYPE, "Int");
        map.set_text(CFG_TEST_COMPILATION, "yes");
        let err = CalculatorSettings::load(&map).unwrap_err();
        assert!(matches!(err, SettingsError::WrongType { .. }), "{err:?}");
    }

    #[test]
    fn settings_map_serde_round_trip() {
        let mut map = SettingsMap::new();
        CalculatorSettings::new("$A$", "out", OutputKind::Text).save(&mut map);
        let json = serde_json::to_string(&map).unwrap();
        let back: SettingsMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
