//! Lowers a parsed unit to a [`Program`].
//!
//! Name resolution happens here: identifiers resolve to locals first, then to
//! declared fields; anything else is a compile diagnostic. The cast helpers
//! `int(..)`, `real(..)` and `text(..)` lower to dedicated opcodes instead of
//! registry calls.

use crate::ast::{Accessor, BinaryOp, Expr, UnaryOp, UnitAst};
use crate::field::FieldEntry;
use crate::functions::FunctionRegistry;
use crate::program::{Instruction, OpCode, Program};
use ahash::AHashMap;
use snippet_model::{CellValue, OutputKind};

/// A lowering diagnostic; rendered into the compilation failure together with
/// the synthesized source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerError {
    pub message: String,
}

impl LowerError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LowerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LowerError {}

pub fn lower_unit(
    unit: &UnitAst,
    output: OutputKind,
    registry: &FunctionRegistry,
) -> Result<Program, LowerError> {
    for module in &unit.imports {
        if !registry.has_module(module) {
            return Err(LowerError::new(format!("unknown import `{module}`")));
        }
    }

    let mut ctx = LowerCtx {
        registry,
        imports: &unit.imports,
        fields: unit
            .fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i as u32))
            .collect(),
        locals: AHashMap::new(),
        instrs: Vec::new(),
        consts: Vec::new(),
        funcs: Vec::new(),
        depth: 0,
        max_depth: 0,
    };

    for stmt in &unit.stmts {
        if ctx.fields.contains_key(&stmt.name) {
            return Err(LowerError::new(format!(
                "cannot assign to input field `{}`",
                stmt.name
            )));
        }
        ctx.lower_expr(&stmt.value)?;
        let slot = match ctx.locals.get(&stmt.name) {
            Some(slot) => *slot,
            None => {
                let slot = ctx.locals.len() as u32;
                ctx.locals.insert(stmt.name.clone(), slot);
                slot
            }
        };
        ctx.emit(Instruction::new(OpCode::StoreLocal, slot, 0), 1, 0);
    }
    ctx.lower_expr(&unit.ret)?;
    ctx.emit(Instruction::new(OpCode::Ret, 0, 0), 0, 0);

    let fields: Vec<FieldEntry> = unit
        .fields
        .iter()
        .map(|(name, kind)| FieldEntry {
            name: name.clone(),
            kind: *kind,
        })
        .collect();

    Ok(Program {
        imports: unit.imports.clone(),
        instrs: ctx.instrs,
        consts: ctx.consts,
        fields,
        n_locals: ctx.locals.len() as u32,
        funcs: ctx.funcs,
        output,
        max_stack: ctx.max_depth.max(1),
    })
}

struct LowerCtx<'a> {
    registry: &'a FunctionRegistry,
    imports: &'a [String],
    fields: AHashMap<String, u32>,
    locals: AHashMap<String, u32>,
    instrs: Vec<Instruction>,
    consts: Vec<CellValue>,
    funcs: Vec<String>,
    depth: u32,
    max_depth: u32,
}

impl LowerCtx<'_> {
    fn emit(&mut self, inst: Instruction, pops: u32, pushes: u32) {
        debug_assert!(self.depth >= pops, "stack underflow during lowering");
        self.depth = self.depth - pops + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        self.instrs.push(inst);
    }

    fn push_const(&mut self, value: CellValue) {
        let idx = self.consts.len() as u32;
        self.consts.push(value);
        self.emit(Instruction::new(OpCode::PushConst, idx, 0), 0, 1);
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<(), LowerError> {
        match expr {
            Expr::IntLit(n) => self.push_const(CellValue::Int(*n)),
            Expr::RealLit(n) => self.push_const(CellValue::Real(*n)),
            Expr::TextLit(s) => self.push_const(CellValue::Text(s.clone())),
            Expr::BoolLit(b) => self.push_const(CellValue::Bool(*b)),
            Expr::Ident(name) => {
                if let Some(slot) = self.locals.get(name) {
                    self.emit(Instruction::new(OpCode::LoadLocal, *slot, 0), 0, 1);
                } else if let Some(slot) = self.fields.get(name) {
                    self.emit(Instruction::new(OpCode::LoadField, *slot, 0), 0, 1);
                } else {
                    return Err(LowerError::new(format!("unknown identifier `{name}`")));
                }
            }
            Expr::Unary { op, expr } => {
                self.lower_expr(expr)?;
                let opcode = match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit(Instruction::new(opcode, 0, 0), 1, 1);
            }
            Expr::Binary { op, left, right } => {
                self.lower_expr(left)?;
                self.lower_expr(right)?;
                let opcode = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Mod => OpCode::Mod,
                    BinaryOp::Eq => OpCode::Eq,
                    BinaryOp::Ne => OpCode::Ne,
                    BinaryOp::Lt => OpCode::Lt,
                    BinaryOp::Le => OpCode::Le,
                    BinaryOp::Gt => OpCode::Gt,
                    BinaryOp::Ge => OpCode::Ge,
                    BinaryOp::And => OpCode::And,
                    BinaryOp::Or => OpCode::Or,
                };
                self.emit(Instruction::new(opcode, 0, 0), 2, 1);
            }
            Expr::Access { expr, accessor } => {
                self.lower_expr(expr)?;
                let opcode = match accessor {
                    Accessor::Int => OpCode::AccessInt,
                    Accessor::Real => OpCode::AccessReal,
                };
                self.emit(Instruction::new(opcode, 0, 0), 1, 1);
            }
            Expr::Call { name, args } => {
                // Cast helpers are compiler intrinsics, not registry lookups.
                let cast_op = match name.as_str() {
                    "int" => Some(OpCode::CastInt),
                    "real" => Some(OpCode::CastReal),
                    "text" => Some(OpCode::CastText),
                    _ => None,
                };
                if let Some(op) = cast_op {
                    if args.len() != 1 {
                        return Err(LowerError::new(format!(
                            "cast `{name}(..)` takes exactly one argument, got {}",
                            args.len()
                        )));
                    }
                    self.lower_expr(&args[0])?;
                    self.emit(Instruction::new(op, 0, 0), 1, 1);
                    return Ok(());
                }

                let Some(def) = self.registry.resolve(self.imports, name) else {
                    return Err(LowerError::new(format!(
                        "unknown function `{name}` (not provided by any imported module)"
                    )));
                };
                if args.len() < def.min_args() || args.len() > def.max_args() {
                    return Err(LowerError::new(format!(
                        "function `{name}` expects {} argument(s), got {}",
                        arity_text(def.min_args(), def.max_args()),
                        args.len()
                    )));
                }
                for arg in args {
                    self.lower_expr(arg)?;
                }
                let idx = match self.funcs.iter().position(|f| f == name) {
                    Some(idx) => idx as u32,
                    None => {
                        self.funcs.push(name.clone());
                        (self.funcs.len() - 1) as u32
                    }
                };
                self.emit(
                    Instruction::new(OpCode::CallFunc, idx, args.len() as u32),
                    args.len() as u32,
                    1,
                );
            }
        }
        Ok(())
    }
}

fn arity_text(min: usize, max: usize) -> String {
    if min == max {
        format!("{min}")
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min} to {max}")
    }
}
