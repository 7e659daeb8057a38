//! Row binder / value coercer: drives one evaluation instance across an
//! ordered row stream, producing exactly one output cell per row.
//!
//! Per-row faults never abort a pass. Evaluation failures and output-kind
//! mismatches are logged with the row key and degrade to a missing cell;
//! cancellation is honored between rows.

use crate::field::{col_field_index, ROW_INDEX, ROW_KEY};
use crate::functions::FunctionRegistry;
use crate::instance::{Instance, ValueMap};
use crate::rewrite::{rewrite_expression, RewriteError};
use crate::settings::CalculatorSettings;
use crate::unit::{
    CompileError, CompiledUnit, InstantiateError, LoadError, ScratchArea, UnitCompiler, UnitError,
};
use snippet_model::{CellValue, ColumnKind, ColumnSpec, OutputKind, Row, RowKey, TableSpec};
use std::sync::Arc;
use thiserror::Error;

/// Configuration-time failure: blocks the expression from being accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Compile(CompileError),
    #[error(transparent)]
    Load(LoadError),
    #[error(transparent)]
    Instantiate(#[from] InstantiateError),
    #[error("no such column: {0}")]
    NoSuchColumn(String),
    #[error("column exists already: {0}")]
    ColumnExists(String),
}

impl From<UnitError> for ConfigError {
    fn from(err: UnitError) -> Self {
        match err {
            UnitError::Compile(e) => ConfigError::Compile(e),
            UnitError::Load(e) => ConfigError::Load(e),
        }
    }
}

/// Failure of a whole table pass. Per-row faults are not pass failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassError {
    #[error("execution canceled")]
    Canceled,
}

/// Progress sink a row pass reports to. Cancellation is polled between rows;
/// a canceled pass simply does not continue to the next row.
pub trait ProgressSink {
    fn row_done(&mut self, row_index: usize, key: &RowKey);

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Sink for hosts that do not track progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn row_done(&mut self, _row_index: usize, _key: &RowKey) {}
}

/// Rewrites and compiles `expression` against `spec` into a shareable unit.
pub fn compile_snippet(
    expression: &str,
    spec: &TableSpec,
    output: OutputKind,
    registry: &FunctionRegistry,
    extra_imports: &[String],
    scratch: &ScratchArea,
) -> Result<Arc<CompiledUnit>, ConfigError> {
    let rewritten = rewrite_expression(expression, spec)?;
    let unit = UnitCompiler::new(registry)
        .with_imports(extra_imports.iter().cloned())
        .compile(&rewritten.body, &rewritten.fields, output, scratch)?;
    Ok(Arc::new(unit))
}

/// Computes the new/replacing cell for each row of a table stream.
#[derive(Debug)]
pub struct ColumnCalculator {
    instance: Instance,
    spec: TableSpec,
    output: OutputKind,
    column_spec: ColumnSpec,
}

impl ColumnCalculator {
    pub fn new(
        unit: &Arc<CompiledUnit>,
        spec: &TableSpec,
        column_spec: ColumnSpec,
    ) -> Result<Self, InstantiateError> {
        Ok(Self {
            instance: unit.instance()?,
            spec: spec.clone(),
            output: unit.output(),
            column_spec,
        })
    }

    /// Spec of the produced column.
    pub fn column_spec(&self) -> &ColumnSpec {
        &self.column_spec
    }

    /// Computes the output cell for one row.
    ///
    /// Every mapped field is rebound: referenced columns from the row's cells
    /// (missing cells bind an explicit missing marker), the two special
    /// identifiers from the row context. Faults degrade to a missing cell.
    pub fn calculate(&mut self, row: &Row, row_index: usize) -> CellValue {
        let mut values = ValueMap::with_capacity(self.instance.fields().len());
        for entry in self.instance.fields().iter() {
            let value = if entry.name == ROW_INDEX {
                CellValue::Int(row_index as i64)
            } else if entry.name == ROW_KEY {
                CellValue::Text(row.key().as_str().to_string())
            } else if let Some(col) = col_field_index(&entry.name) {
                match (self.spec.column(col), row.cell(col)) {
                    (Some(spec), Some(cell)) => coerce_cell(cell, spec.kind()),
                    _ => CellValue::Missing,
                }
            } else {
                CellValue::Missing
            };
            values.insert(entry.name.clone(), value);
        }

        if let Err(err) = self.instance.bind(&values) {
            log::warn!(
                "evaluation of expression failed for row \"{}\": {err}",
                row.key()
            );
            return CellValue::Missing;
        }
        match self.instance.evaluate() {
            Ok(value) => self.reconcile(value, row.key()),
            Err(err) => {
                log::warn!(
                    "evaluation of expression failed for row \"{}\": {err}",
                    row.key()
                );
                CellValue::Missing
            }
        }
    }

    /// Maps the boxed result back onto the declared output kind; anything
    /// else degrades to missing with a logged warning.
    fn reconcile(&self, value: CellValue, key: &RowKey) -> CellValue {
        match (self.output, value) {
            (_, CellValue::Missing) => CellValue::Missing,
            (OutputKind::Int, CellValue::Int(i)) => CellValue::Int(i),
            (OutputKind::Real, CellValue::Real(n)) => {
                if n.is_nan() {
                    CellValue::Missing
                } else {
                    CellValue::Real(n)
                }
            }
            (OutputKind::Text, CellValue::Text(s)) => CellValue::Text(s),
            (output, other) => {
                log::warn!(
                    "unable to use result of kind {} as declared output {output} for row \"{key}\" - putting missing value instead",
                    other.kind_name()
                );
                CellValue::Missing
            }
        }
    }
}

/// Coerces a cell to the kind its column resolves to. Real columns widen
/// integer cells; anything without a native representation degrades to its
/// textual rendering.
fn coerce_cell(cell: &CellValue, kind: ColumnKind) -> CellValue {
    match (kind, cell) {
        (_, CellValue::Missing) => CellValue::Missing,
        (ColumnKind::Int, CellValue::Int(i)) => CellValue::Int(*i),
        (ColumnKind::Real, CellValue::Int(i)) => CellValue::Real(*i as f64),
        (ColumnKind::Real, CellValue::Real(n)) => CellValue::Real(*n),
        (ColumnKind::Text, CellValue::Text(s)) => CellValue::Text(s.clone()),
        (_, other) => CellValue::Text(other.to_string()),
    }
}

/// Drives one full table pass: output spec (append or replace) plus the
/// per-row calculation.
#[derive(Debug)]
pub struct Rearranger {
    calculator: ColumnCalculator,
    replace_at: Option<usize>,
    out_spec: TableSpec,
}

impl Rearranger {
    /// Builds the pass from persisted settings: compiles the snippet (header
    /// first, then the expression) and resolves the target column.
    pub fn from_settings(
        settings: &CalculatorSettings,
        spec: &TableSpec,
        registry: &FunctionRegistry,
        scratch: &ScratchArea,
    ) -> Result<Self, ConfigError> {
        let expression = if settings.header.is_empty() {
            settings.expression.clone()
        } else {
            format!("{}\n{}", settings.header, settings.expression)
        };
        let unit = compile_snippet(
            &expression,
            spec,
            settings.output,
            registry,
            &settings.imports,
            scratch,
        )?;
        let column_spec =
            ColumnSpec::new(settings.column_name.clone(), settings.output.column_kind());

        let (replace_at, out_spec) = if settings.is_replace {
            let Some(index) = spec.find_column(&settings.column_name) else {
                return Err(ConfigError::NoSuchColumn(settings.column_name.clone()));
            };
            let columns = spec.iter().enumerate().map(|(i, c)| {
                if i == index {
                    column_spec.clone()
                } else {
                    c.clone()
                }
            });
            let out_spec = TableSpec::new(columns)
                .map_err(|_| ConfigError::ColumnExists(settings.column_name.clone()))?;
            (Some(index), out_spec)
        } else {
            if spec.find_column(&settings.column_name).is_some() {
                return Err(ConfigError::ColumnExists(settings.column_name.clone()));
            }
            let columns = spec.iter().cloned().chain([column_spec.clone()]);
            let out_spec = TableSpec::new(columns)
                .map_err(|_| ConfigError::ColumnExists(settings.column_name.clone()))?;
            (None, out_spec)
        };

        let calculator = ColumnCalculator::new(&unit, spec, column_spec)?;
        Ok(Self {
            calculator,
            replace_at,
            out_spec,
        })
    }

    pub fn output_spec(&self) -> &TableSpec {
        &self.out_spec
    }

    /// Processes rows strictly in input order, one at a time. Progress is
    /// reported per finished row; cancellation is polled before each row.
    pub fn process<'r>(
        &mut self,
        rows: impl IntoIterator<Item = &'r Row>,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<Row>, PassError> {
        let mut out = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            if progress.is_canceled() {
                return Err(PassError::Canceled);
            }
            let cell = self.calculator.calculate(row, index);
            let mut cells = row.cells().to_vec();
            match self.replace_at {
                Some(at) => {
                    if let Some(slot) = cells.get_mut(at) {
                        *slot = cell;
                    } else {
                        cells.push(cell);
                    }
                }
                None => cells.push(cell),
            }
            out.push(Row::new(row.key().clone(), cells));
            progress.row_done(index, row.key());
        }
        Ok(out)
    }
}
