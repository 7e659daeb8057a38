#![forbid(unsafe_code)]
#![deny(unreachable_patterns)]

//! In-memory tabular data model shared by the snippet engine and its hosts.
//!
//! The model is deliberately small: a [`TableSpec`] describes an ordered,
//! name-unique column layout; a [`Row`] carries a unique [`RowKey`] plus one
//! [`CellValue`] per column. Cell values use an explicit `{type, value}`
//! tagged serde layout for stable persistence.

pub mod table;
pub mod value;

pub use table::{ColumnKind, ColumnSpec, Row, RowKey, TableSpec, TableSpecError};
pub use value::{CellValue, OutputKind, UnknownOutputKind, ValueKind};
