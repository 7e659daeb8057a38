//! Unit compiler and the reusable compiled unit.
//!
//! The compiler synthesizes a complete snippet-language unit (imports, field
//! declarations, evaluation body) from a rewritten expression body, persists
//! it to a scratch source file, compiles it to a [`Program`], persists the
//! compiled counterpart, and loads that artifact back through the function
//! registry. The loaded artifact is what evaluation runs against, so a
//! missing or corrupt compiled file surfaces as a distinct load failure.

use crate::compiler::lower_unit;
use crate::field::FieldMap;
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::instance::Instance;
use crate::parser::parse_unit;
use crate::program::Program;
use snippet_model::OutputKind;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;

/// Import modules every unit sees without an explicit declaration.
pub const DEFAULT_IMPORTS: &[&str] = &["math", "text"];

const SOURCE_SUFFIX: &str = ".snip";
const COMPILED_EXTENSION: &str = "snipc";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unable to write snippet scratch file: {0}")]
    Io(#[from] io::Error),
    #[error("unable to compile snippet: {diagnostic}\n--- synthesized unit ---\n{source_text}")]
    Syntax {
        source_text: String,
        diagnostic: String,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("compiled artifact {} does not exist", path.display())]
    ArtifactMissing { path: PathBuf },
    #[error(
        "unable to load compiled artifact {} (exists: {exists}, {size} bytes): {message}",
        path.display()
    )]
    ArtifactUnreadable {
        path: PathBuf,
        exists: bool,
        size: u64,
        message: String,
    },
    #[error("unknown function `{name}` referenced by compiled unit")]
    UnresolvedFunction { name: String },
}

/// Failure of [`UnitCompiler::compile`], keeping the compile and load stages
/// distinguishable.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Raised lazily when an evaluation instance is first created from a unit
/// whose loaded program turns out to be structurally unsound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compiled unit is corrupt: {0}")]
pub struct InstantiateError(pub(crate) String);

/// Process-managed temporary directory owning the scratch artifacts of every
/// unit compiled through it. The directory (and anything left in it) is
/// removed when the area is dropped.
#[derive(Debug)]
pub struct ScratchArea {
    dir: TempDir,
}

impl ScratchArea {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("snippet").tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Draws a fresh source/compiled path pair. A name whose compiled
    /// counterpart already exists is discarded and a new one drawn, so a
    /// stale artifact can never be picked up as this unit's output.
    fn allocate(&self) -> io::Result<ScratchPaths> {
        loop {
            let file = tempfile::Builder::new()
                .prefix("expr")
                .suffix(SOURCE_SUFFIX)
                .tempfile_in(self.dir.path())?;
            let compiled = file.path().with_extension(COMPILED_EXTENSION);
            if compiled.exists() {
                continue;
            }
            let (_, source) = file.keep().map_err(|e| e.error)?;
            return Ok(ScratchPaths { source, compiled });
        }
    }
}

#[derive(Debug, Clone)]
struct ScratchPaths {
    source: PathBuf,
    compiled: PathBuf,
}

/// Compiles rewritten snippet bodies into reusable [`CompiledUnit`]s.
pub struct UnitCompiler<'r> {
    registry: &'r FunctionRegistry,
    extra_imports: Vec<String>,
}

impl<'r> UnitCompiler<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self {
            registry,
            extra_imports: Vec::new(),
        }
    }

    /// Additional import declarations beyond [`DEFAULT_IMPORTS`], typically
    /// the modules contributed by extension libraries.
    #[must_use]
    pub fn with_imports(mut self, imports: impl IntoIterator<Item = String>) -> Self {
        self.extra_imports.extend(imports);
        self
    }

    pub fn compile(
        &self,
        body: &str,
        fields: &FieldMap,
        output: OutputKind,
        scratch: &ScratchArea,
    ) -> Result<CompiledUnit, UnitError> {
        let paths = scratch.allocate().map_err(CompileError::Io)?;
        match self.compile_at(body, fields, output, &paths) {
            Ok(unit) => Ok(unit),
            Err(err) => {
                // Failed builds leave no artifacts behind.
                let _ = fs::remove_file(&paths.source);
                let _ = fs::remove_file(&paths.compiled);
                Err(err)
            }
        }
    }

    fn compile_at(
        &self,
        body: &str,
        fields: &FieldMap,
        output: OutputKind,
        paths: &ScratchPaths,
    ) -> Result<CompiledUnit, UnitError> {
        let source = generate_source(body, fields, output, &self.extra_imports);
        fs::write(&paths.source, &source).map_err(CompileError::Io)?;

        let unit = parse_unit(&source).map_err(|e| CompileError::Syntax {
            source_text: source.clone(),
            diagnostic: format!("{} (line {})", e.message, e.line_in(&source)),
        })?;
        let program = lower_unit(&unit, output, self.registry).map_err(|e| CompileError::Syntax {
            source_text: source.clone(),
            diagnostic: e.message,
        })?;
        let bytes = serde_json::to_vec_pretty(&program)
            .map_err(|e| CompileError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::write(&paths.compiled, bytes).map_err(CompileError::Io)?;
        drop(program);

        // Evaluation runs against the persisted artifact, not the in-memory
        // lowering result.
        let program = load_program(&paths.compiled)?;
        let funcs = resolve_functions(self.registry, &program)?;
        log::debug!(
            "compiled snippet unit {} ({} field(s), output {output})",
            paths.source.display(),
            fields.len()
        );
        Ok(CompiledUnit {
            program,
            funcs,
            fields: fields.clone(),
            output,
            paths: paths.clone(),
        })
    }
}

/// Synthesizes the unit source: import header, one typed field declaration
/// per mapping entry, the statement prefix of the body and the final value
/// expression wrapped in the output-kind cast.
fn generate_source(
    body: &str,
    fields: &FieldMap,
    output: OutputKind,
    extra_imports: &[String],
) -> String {
    let mut buffer = String::with_capacity(4096);
    for import in DEFAULT_IMPORTS
        .iter()
        .copied()
        .chain(extra_imports.iter().map(String::as_str))
    {
        let _ = writeln!(buffer, "import {import};");
    }
    buffer.push('\n');

    for entry in fields.iter() {
        let _ = writeln!(buffer, "field {}: {};", entry.name, entry.kind.decl_name());
    }
    buffer.push('\n');

    let (stmts, value) = split_trailing_expression(body);
    if !stmts.is_empty() {
        buffer.push_str(stmts);
        buffer.push('\n');
    }
    let cast = match output {
        OutputKind::Int => "int",
        OutputKind::Real => "real",
        OutputKind::Text => "text",
    };
    let _ = writeln!(buffer, "return {cast}(({}));", value.trim());
    buffer
}

/// Splits the body at its last top-level `;` (one not inside a string
/// literal): everything up to and including it is the statement prefix, the
/// rest is the value expression.
fn split_trailing_expression(body: &str) -> (&str, &str) {
    let mut last_semi = None;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ';') => last_semi = Some(i),
            (None, _) => {}
        }
    }
    match last_semi {
        Some(i) => (&body[..=i], &body[i + 1..]),
        None => ("", body),
    }
}

fn artifact_info(path: &Path) -> (bool, u64) {
    match fs::metadata(path) {
        Ok(meta) => (true, meta.len()),
        Err(_) => (false, 0),
    }
}

fn load_program(path: &Path) -> Result<Program, LoadError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(LoadError::ArtifactMissing {
                path: path.to_path_buf(),
            });
        }
        Err(err) => {
            let (exists, size) = artifact_info(path);
            return Err(LoadError::ArtifactUnreadable {
                path: path.to_path_buf(),
                exists,
                size,
                message: err.to_string(),
            });
        }
    };
    serde_json::from_slice(&bytes).map_err(|err| {
        let (exists, size) = artifact_info(path);
        LoadError::ArtifactUnreadable {
            path: path.to_path_buf(),
            exists,
            size,
            message: err.to_string(),
        }
    })
}

fn resolve_functions(
    registry: &FunctionRegistry,
    program: &Program,
) -> Result<Vec<Arc<FunctionDef>>, LoadError> {
    program
        .funcs()
        .iter()
        .map(|name| {
            registry
                .resolve(program.imports(), name)
                .ok_or_else(|| LoadError::UnresolvedFunction { name: name.clone() })
        })
        .collect()
}

/// Reusable result of compiling one rewritten expression against one table
/// schema and output kind. Immutable after construction; share it read-only
/// (e.g. behind an [`Arc`]) across any number of evaluation instances.
#[derive(Debug)]
pub struct CompiledUnit {
    program: Program,
    funcs: Vec<Arc<FunctionDef>>,
    fields: FieldMap,
    output: OutputKind,
    paths: ScratchPaths,
}

impl CompiledUnit {
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn output(&self) -> OutputKind {
        self.output
    }

    pub fn source_path(&self) -> &Path {
        &self.paths.source
    }

    pub fn compiled_path(&self) -> &Path {
        &self.paths.compiled
    }

    pub(crate) fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn funcs(&self) -> &[Arc<FunctionDef>] {
        &self.funcs
    }

    /// Creates a fresh evaluation instance of this unit.
    pub fn instance(self: &Arc<Self>) -> Result<Instance, InstantiateError> {
        self.program.validate().map_err(InstantiateError)?;
        if self.program.fields() != self.fields.entries() {
            return Err(InstantiateError(
                "field table does not match the field mapping".to_string(),
            ));
        }
        Ok(Instance::new(Arc::clone(self)))
    }
}

impl Drop for CompiledUnit {
    fn drop(&mut self) {
        for path in [&self.paths.source, &self.paths.compiled] {
            if let Err(err) = fs::remove_file(path) {
                if err.kind() != io::ErrorKind::NotFound {
                    log::warn!("unable to delete scratch file {}: {err}", path.display());
                }
            }
        }
    }
}
