#![forbid(unsafe_code)]
#![deny(unreachable_patterns)]

//! Snippet expression compilation and row-by-row evaluation.
//!
//! A raw snippet references table columns as `$name$` and the row context as
//! `$$ROWNUMBER$$` / `$$ROWKEY$$`. The engine turns such text into a typed,
//! repeatedly-callable unit in two stages:
//!
//! 1. [`rewrite::rewrite_expression`] replaces every reference with a
//!    generated field name and records the field-to-kind mapping.
//! 2. [`unit::UnitCompiler`] synthesizes a complete compilation unit around
//!    the rewritten body, compiles it to bytecode, persists source and
//!    compiled artifacts to scratch storage and loads the artifact back as a
//!    reusable [`unit::CompiledUnit`].
//!
//! A [`instance::Instance`] binds per-row values into the unit's fields and
//! evaluates it; [`calculator::ColumnCalculator`] drives that across a table
//! stream, coercing cells in and reconciling results out. Function lookup
//! goes through an explicitly constructed [`functions::FunctionRegistry`]
//! threaded by reference; there is no global state.

pub mod ast;
pub mod calculator;
pub mod compiler;
pub mod field;
pub mod functions;
pub mod instance;
pub mod parser;
pub mod program;
pub mod rewrite;
pub mod runtime;
pub mod settings;
pub mod unit;
pub mod vm;

pub use calculator::{
    compile_snippet, ColumnCalculator, ConfigError, NoProgress, PassError, ProgressSink, Rearranger,
};
pub use field::{col_field_name, FieldEntry, FieldMap, ROW_INDEX, ROW_KEY};
pub use functions::{FunctionDef, FunctionLibrary, FunctionRegistry};
pub use instance::{BindError, Instance, ValueMap};
pub use rewrite::{rewrite_expression, RewriteError, Rewritten};
pub use runtime::EvalError;
pub use settings::{CalculatorSettings, SettingsError, SettingsMap, SettingsValue};
pub use unit::{
    CompileError, CompiledUnit, InstantiateError, LoadError, ScratchArea, UnitCompiler, UnitError,
};
