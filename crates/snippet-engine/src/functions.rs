//! Snippet function registry.
//!
//! The registry is constructed explicitly and threaded by reference through
//! the unit compiler and the compiled unit loader; there is no process-global
//! function table. A unit sees a module's functions only if the module is
//! imported (defaults plus the settings-supplied extra imports), which is
//! what makes extension libraries opt-in per configuration.

use crate::runtime::{display_text, EvalError};
use snippet_model::CellValue;
use std::collections::BTreeMap;
use std::sync::Arc;

type NativeFn = Arc<dyn Fn(&[CellValue]) -> Result<CellValue, EvalError> + Send + Sync>;

/// One callable snippet function. Arity is enforced at compile (lowering)
/// time; the implementation only ever sees an argument slice within
/// `min_args..=max_args`.
#[derive(Clone)]
pub struct FunctionDef {
    name: String,
    min_args: usize,
    max_args: usize,
    f: NativeFn,
}

impl FunctionDef {
    pub fn new(
        name: impl Into<String>,
        min_args: usize,
        max_args: usize,
        f: impl Fn(&[CellValue]) -> Result<CellValue, EvalError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            min_args,
            max_args,
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> usize {
        self.max_args
    }

    pub fn call(&self, args: &[CellValue]) -> Result<CellValue, EvalError> {
        (self.f)(args)
    }
}

impl std::fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

/// A named group of functions made visible by an `import` declaration.
#[derive(Debug, Clone, Default)]
pub struct Module {
    functions: BTreeMap<String, Arc<FunctionDef>>,
}

impl Module {
    pub fn get(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions.get(name)
    }

    fn insert(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.clone(), Arc::new(def));
    }
}

/// Extension function libraries implement this to contribute a module.
/// Resolving a settings archive location to a library instance is the
/// caller's concern; the engine only consumes the resulting functions.
pub trait FunctionLibrary {
    fn name(&self) -> &str;
    fn functions(&self) -> Vec<FunctionDef>;
}

/// Read-only lookup table from module name to function set.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    modules: BTreeMap<String, Module>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in `math` and `text` modules.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.modules.insert("math".to_string(), math_module());
        registry.modules.insert("text".to_string(), text_module());
        registry
    }

    pub fn register_library(&mut self, library: &dyn FunctionLibrary) {
        let mut module = Module::default();
        for def in library.functions() {
            module.insert(def);
        }
        self.modules.insert(library.name().to_string(), module);
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Resolves `name` against the listed imports, in import order.
    pub fn resolve(&self, imports: &[String], name: &str) -> Option<Arc<FunctionDef>> {
        imports
            .iter()
            .filter_map(|m| self.modules.get(m))
            .find_map(|m| m.get(name).cloned())
    }
}

fn func_err(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::Function {
        name: name.to_string(),
        message: message.into(),
    }
}

/// Numeric argument as `f64`; `None` for a missing value, which the builtins
/// uniformly propagate as a missing result.
fn real_arg(name: &str, v: &CellValue) -> Result<Option<f64>, EvalError> {
    match v {
        CellValue::Missing => Ok(None),
        CellValue::Int(i) => Ok(Some(*i as f64)),
        CellValue::Real(n) => Ok(Some(*n)),
        other => Err(func_err(name, format!("expected a number, got {}", other.kind_name()))),
    }
}

fn text_arg(v: &CellValue) -> Option<String> {
    match v {
        CellValue::Missing => None,
        other => Some(display_text(other)),
    }
}

fn unary_real(name: &'static str, f: fn(f64) -> f64) -> FunctionDef {
    FunctionDef::new(name, 1, 1, move |args| {
        Ok(match real_arg(name, &args[0])? {
            Some(n) => CellValue::Real(f(n)),
            None => CellValue::Missing,
        })
    })
}

fn math_module() -> Module {
    let mut m = Module::default();
    m.insert(FunctionDef::new("abs", 1, 1, |args| {
        Ok(match &args[0] {
            CellValue::Missing => CellValue::Missing,
            CellValue::Int(i) => CellValue::Int(i.wrapping_abs()),
            CellValue::Real(n) => CellValue::Real(n.abs()),
            other => return Err(func_err("abs", format!("expected a number, got {}", other.kind_name()))),
        })
    }));
    m.insert(FunctionDef::new("min", 2, 2, |args| min_max("min", args, true)));
    m.insert(FunctionDef::new("max", 2, 2, |args| min_max("max", args, false)));
    m.insert(unary_real("floor", f64::floor));
    m.insert(unary_real("ceil", f64::ceil));
    m.insert(FunctionDef::new("round", 1, 1, |args| {
        Ok(match real_arg("round", &args[0])? {
            Some(n) => CellValue::Int(n.round() as i64),
            None => CellValue::Missing,
        })
    }));
    m.insert(unary_real("sqrt", f64::sqrt));
    m.insert(unary_real("exp", f64::exp));
    m.insert(unary_real("ln", f64::ln));
    m.insert(unary_real("log10", f64::log10));
    m.insert(FunctionDef::new("pow", 2, 2, |args| {
        let a = real_arg("pow", &args[0])?;
        let b = real_arg("pow", &args[1])?;
        Ok(match (a, b) {
            (Some(a), Some(b)) => CellValue::Real(a.powf(b)),
            _ => CellValue::Missing,
        })
    }));
    m
}

fn min_max(name: &str, args: &[CellValue], take_min: bool) -> Result<CellValue, EvalError> {
    match (&args[0], &args[1]) {
        (CellValue::Missing, _) | (_, CellValue::Missing) => Ok(CellValue::Missing),
        (CellValue::Int(a), CellValue::Int(b)) => Ok(CellValue::Int(if take_min {
            *a.min(b)
        } else {
            *a.max(b)
        })),
        (a, b) => match (real_arg(name, a)?, real_arg(name, b)?) {
            (Some(a), Some(b)) => {
                Ok(CellValue::Real(if take_min { a.min(b) } else { a.max(b) }))
            }
            _ => Ok(CellValue::Missing),
        },
    }
}

fn unary_text(name: &'static str, f: fn(&str) -> String) -> FunctionDef {
    FunctionDef::new(name, 1, 1, move |args| {
        Ok(match text_arg(&args[0]) {
            Some(s) => CellValue::Text(f(&s)),
            None => CellValue::Missing,
        })
    })
}

fn text_module() -> Module {
    let mut m = Module::default();
    m.insert(unary_text("upperCase", |s| s.to_uppercase()));
    m.insert(unary_text("lowerCase", |s| s.to_lowercase()));
    m.insert(unary_text("strip", |s| s.trim().to_string()));
    m.insert(unary_text("reverse", |s| s.chars().rev().collect()));
    m.insert(unary_text("capitalize", capitalize));
    m.insert(FunctionDef::new("length", 1, 1, |args| {
        Ok(match text_arg(&args[0]) {
            Some(s) => CellValue::Int(s.chars().count() as i64),
            None => CellValue::Missing,
        })
    }));
    m.insert(FunctionDef::new("substr", 2, 3, |args| {
        let Some(s) = text_arg(&args[0]) else {
            return Ok(CellValue::Missing);
        };
        let Some(start) = int_arg("substr", &args[1])? else {
            return Ok(CellValue::Missing);
        };
        let len = match args.get(2) {
            Some(v) => match int_arg("substr", v)? {
                Some(len) => Some(len),
                None => return Ok(CellValue::Missing),
            },
            None => None,
        };
        let chars: Vec<char> = s.chars().collect();
        let start = start.max(0) as usize;
        if start >= chars.len() {
            return Ok(CellValue::Text(String::new()));
        }
        let end = match len {
            Some(len) => (start + len.max(0) as usize).min(chars.len()),
            None => chars.len(),
        };
        Ok(CellValue::Text(chars[start..end].iter().collect()))
    }));
    m.insert(FunctionDef::new("indexOf", 2, 2, |args| {
        let (Some(s), Some(needle)) = (text_arg(&args[0]), text_arg(&args[1])) else {
            return Ok(CellValue::Missing);
        };
        let index = match s.find(&needle) {
            Some(byte_idx) => s[..byte_idx].chars().count() as i64,
            None => -1,
        };
        Ok(CellValue::Int(index))
    }));
    m.insert(FunctionDef::new("replace", 3, 3, |args| {
        let (Some(s), Some(search), Some(repl)) =
            (text_arg(&args[0]), text_arg(&args[1]), text_arg(&args[2]))
        else {
            return Ok(CellValue::Missing);
        };
        Ok(CellValue::Text(s.replace(&search, &repl)))
    }));
    m.insert(FunctionDef::new("joinSep", 1, usize::MAX, |args| {
        let Some(sep) = text_arg(&args[0]) else {
            return Ok(CellValue::Missing);
        };
        let mut parts = Vec::with_capacity(args.len().saturating_sub(1));
        for v in &args[1..] {
            match text_arg(v) {
                Some(s) => parts.push(s),
                None => return Ok(CellValue::Missing),
            }
        }
        Ok(CellValue::Text(parts.join(&sep)))
    }));
    m
}

fn int_arg(name: &str, v: &CellValue) -> Result<Option<i64>, EvalError> {
    match v {
        CellValue::Missing => Ok(None),
        CellValue::Int(i) => Ok(Some(*i)),
        other => Err(func_err(name, format!("expected an integer, got {}", other.kind_name()))),
    }
}

fn capitalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            at_word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
