use snippet_engine::{
    CalculatorSettings, ConfigError, FunctionRegistry, NoProgress, PassError, ProgressSink,
    Rearranger, ScratchArea,
};
use snippet_model::{CellValue, ColumnKind, ColumnSpec, OutputKind, Row, RowKey, TableSpec};

fn spec() -> TableSpec {
    TableSpec::new([
        ColumnSpec::new("A", ColumnKind::Int),
        ColumnSpec::new("B", ColumnKind::Int),
        ColumnSpec::new("X", ColumnKind::Real),
        ColumnSpec::new("Name", ColumnKind::Text),
    ])
    .unwrap()
}

fn row(key: &str, a: CellValue, b: CellValue, x: CellValue, name: CellValue) -> Row {
    Row::new(key, vec![a, b, x, name])
}

fn run_pass(expression: &str, output: OutputKind, rows: &[Row]) -> Result<Vec<Row>, ConfigError> {
    let settings = CalculatorSettings::new(expression, "result", output);
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let mut rearranger = Rearranger::from_settings(&settings, &spec(), &registry, &scratch)?;
    Ok(rearranger.process(rows.iter(), &mut NoProgress).unwrap())
}

/// The appended cell of each processed row.
fn results(expression: &str, output: OutputKind, rows: &[Row]) -> Vec<CellValue> {
    run_pass(expression, output, rows)
        .unwrap()
        .into_iter()
        .map(|r| r.cells().last().unwrap().clone())
        .collect()
}

fn any_row(key: &str) -> Row {
    row(
        key,
        CellValue::Int(2),
        CellValue::Int(3),
        CellValue::Real(0.5),
        CellValue::Text("n".to_string()),
    )
}

#[test]
fn literal_expressions_yield_cells_of_each_output_kind() {
    let rows = [any_row("r0")];
    assert_eq!(results("1", OutputKind::Int, &rows), vec![CellValue::Int(1)]);
    assert_eq!(
        results("1.5", OutputKind::Real, &rows),
        vec![CellValue::Real(1.5)]
    );
    assert_eq!(
        results("\"hi\"", OutputKind::Text, &rows),
        vec![CellValue::Text("hi".to_string())]
    );
}

#[test]
fn row_number_counts_from_zero_in_order() {
    let rows: Vec<Row> = (0..5).map(|i| any_row(&format!("r{i}"))).collect();
    assert_eq!(
        results("$$ROWNUMBER$$", OutputKind::Int, &rows),
        (0..5).map(CellValue::Int).collect::<Vec<_>>()
    );
}

#[test]
fn row_key_binds_the_key_text() {
    let rows = [any_row("first"), any_row("second")];
    assert_eq!(
        results("$$ROWKEY$$", OutputKind::Text, &rows),
        vec![
            CellValue::Text("first".to_string()),
            CellValue::Text("second".to_string()),
        ]
    );
}

#[test]
fn int_column_sum_matches_and_missing_operand_degrades() {
    let rows = [
        row(
            "r0",
            CellValue::Int(2),
            CellValue::Int(3),
            CellValue::Missing,
            CellValue::Missing,
        ),
        row(
            "r1",
            CellValue::Missing,
            CellValue::Int(3),
            CellValue::Missing,
            CellValue::Missing,
        ),
        row(
            "r2",
            CellValue::Int(10),
            CellValue::Int(20),
            CellValue::Missing,
            CellValue::Missing,
        ),
    ];
    assert_eq!(
        results("$A$ + $B$", OutputKind::Int, &rows),
        vec![CellValue::Int(5), CellValue::Missing, CellValue::Int(30)]
    );
}

#[test]
fn missing_real_column_does_not_abort_the_pass() {
    let rows = [
        row(
            "r0",
            CellValue::Int(0),
            CellValue::Int(0),
            CellValue::Missing,
            CellValue::Missing,
        ),
        row(
            "r1",
            CellValue::Int(0),
            CellValue::Int(0),
            CellValue::Real(2.5),
            CellValue::Missing,
        ),
    ];
    assert_eq!(
        results("$X$", OutputKind::Real, &rows),
        vec![CellValue::Missing, CellValue::Real(2.5)]
    );
}

#[test]
fn nan_result_becomes_missing() {
    let rows = [any_row("r0")];
    assert_eq!(
        results("sqrt(0 - 1)", OutputKind::Real, &rows),
        vec![CellValue::Missing]
    );
}

#[test]
fn missing_text_cell_does_not_leak_the_previous_rows_value() {
    let rows = [
        row(
            "r0",
            CellValue::Int(0),
            CellValue::Int(0),
            CellValue::Missing,
            CellValue::Text("leaky".to_string()),
        ),
        row(
            "r1",
            CellValue::Int(0),
            CellValue::Int(0),
            CellValue::Missing,
            CellValue::Missing,
        ),
    ];
    assert_eq!(
        results("$Name$", OutputKind::Text, &rows),
        vec![CellValue::Text("leaky".to_string()), CellValue::Missing]
    );
}

#[test]
fn statements_run_before_the_trailing_expression() {
    let rows = [any_row("r0")];
    assert_eq!(
        results("x = $A$ * 10; y = x + $B$; y", OutputKind::Int, &rows),
        vec![CellValue::Int(23)]
    );
}

#[test]
fn real_output_wraps_integer_arithmetic() {
    let rows = [any_row("r0")];
    // The output cast widens the Int result of `$A$ + $B$`.
    assert_eq!(
        results("$A$ + $B$", OutputKind::Real, &rows),
        vec![CellValue::Real(5.0)]
    );
}

#[test]
fn unresolved_column_fails_at_configuration_time() {
    let settings = CalculatorSettings::new("$Nope$", "result", OutputKind::Int);
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let err = Rearranger::from_settings(&settings, &spec(), &registry, &scratch).unwrap_err();
    assert!(matches!(err, ConfigError::Rewrite(_)), "{err:?}");
}

#[test]
fn unknown_identifier_fails_as_a_compile_error() {
    let settings = CalculatorSettings::new("foo + 1", "result", OutputKind::Int);
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let err = Rearranger::from_settings(&settings, &spec(), &registry, &scratch).unwrap_err();
    assert!(matches!(err, ConfigError::Compile(_)), "{err:?}");
}

#[test]
fn append_extends_the_spec_and_replace_swaps_in_place() {
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();

    let append = CalculatorSettings::new("$A$", "result", OutputKind::Int);
    let rearranger = Rearranger::from_settings(&append, &spec(), &registry, &scratch).unwrap();
    assert_eq!(rearranger.output_spec().len(), 5);
    assert_eq!(rearranger.output_spec().find_column("result"), Some(4));

    let mut replace = CalculatorSettings::new("text(($A$))", "Name", OutputKind::Text);
    replace.is_replace = true;
    let mut rearranger = Rearranger::from_settings(&replace, &spec(), &registry, &scratch).unwrap();
    assert_eq!(rearranger.output_spec().len(), 4);
    assert_eq!(
        rearranger
            .output_spec()
            .column(3)
            .map(|c| (c.name().to_string(), c.kind())),
        Some(("Name".to_string(), ColumnKind::Text))
    );

    let out = rearranger
        .process([any_row("r0")].iter(), &mut NoProgress)
        .unwrap();
    assert_eq!(out[0].cells()[3], CellValue::Text("2".to_string()));
    assert_eq!(out[0].cells().len(), 4);
}

#[test]
fn replacing_an_absent_column_is_a_config_error() {
    let mut settings = CalculatorSettings::new("1", "Nope", OutputKind::Int);
    settings.is_replace = true;
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let err = Rearranger::from_settings(&settings, &spec(), &registry, &scratch).unwrap_err();
    assert!(matches!(err, ConfigError::NoSuchColumn(_)), "{err:?}");
}

#[test]
fn appending_an_existing_column_name_is_a_config_error() {
    let settings = CalculatorSettings::new("1", "A", OutputKind::Int);
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let err = Rearranger::from_settings(&settings, &spec(), &registry, &scratch).unwrap_err();
    assert!(matches!(err, ConfigError::ColumnExists(_)), "{err:?}");
}

struct CountingSink {
    seen: Vec<(usize, RowKey)>,
    cancel_after: Option<usize>,
}

impl ProgressSink for CountingSink {
    fn row_done(&mut self, row_index: usize, key: &RowKey) {
        self.seen.push((row_index, key.clone()));
    }

    fn is_canceled(&self) -> bool {
        self.cancel_after
            .is_some_and(|limit| self.seen.len() >= limit)
    }
}

#[test]
fn progress_reports_index_and_key_per_row() {
    let settings = CalculatorSettings::new("1", "result", OutputKind::Int);
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let mut rearranger = Rearranger::from_settings(&settings, &spec(), &registry, &scratch).unwrap();
    let rows = [any_row("a"), any_row("b")];
    let mut sink = CountingSink {
        seen: Vec::new(),
        cancel_after: None,
    };
    rearranger.process(rows.iter(), &mut sink).unwrap();
    assert_eq!(
        sink.seen,
        vec![(0, RowKey::new("a")), (1, RowKey::new("b"))]
    );
}

#[test]
fn cancellation_stops_between_rows() {
    let settings = CalculatorSettings::new("1", "result", OutputKind::Int);
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let mut rearranger = Rearranger::from_settings(&settings, &spec(), &registry, &scratch).unwrap();
    let rows = [any_row("a"), any_row("b"), any_row("c")];
    let mut sink = CountingSink {
        seen: Vec::new(),
        cancel_after: Some(1),
    };
    let err = rearranger.process(rows.iter(), &mut sink).unwrap_err();
    assert_eq!(err, PassError::Canceled);
    assert_eq!(sink.seen.len(), 1);
}

#[test]
fn header_statements_run_before_the_expression() {
    let mut settings = CalculatorSettings::new("base + $A$", "result", OutputKind::Int);
    settings.header = "base = 100;".to_string();
    let registry = FunctionRegistry::with_defaults();
    let scratch = ScratchArea::new().unwrap();
    let mut rearranger = Rearranger::from_settings(&settings, &spec(), &registry, &scratch).unwrap();
    let out = rearranger
        .process([any_row("r0")].iter(), &mut NoProgress)
        .unwrap();
    assert_eq!(out[0].cells().last(), Some(&CellValue::Int(102)));
}
