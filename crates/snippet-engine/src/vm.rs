use crate::ast::{Accessor, BinaryOp, UnaryOp};
use crate::functions::FunctionDef;
use crate::program::{OpCode, Program};
use crate::runtime::{access, apply_binary, apply_unary, cast, EvalError};
use snippet_model::{CellValue, ValueKind};
use std::sync::Arc;

/// Stack-based bytecode interpreter. Buffers are reused across evaluations.
#[derive(Debug, Default)]
pub struct Vm {
    stack: Vec<CellValue>,
    locals: Vec<CellValue>,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(stack: usize) -> Self {
        Self {
            stack: Vec::with_capacity(stack),
            locals: Vec::new(),
        }
    }

    /// Runs `program` against the given field slot values. `funcs` is the
    /// resolved function table in program order; both are provided by the
    /// owning compiled unit, which validated the program at load time.
    pub fn eval(
        &mut self,
        program: &Program,
        fields: &[CellValue],
        funcs: &[Arc<FunctionDef>],
    ) -> Result<CellValue, EvalError> {
        self.stack.clear();
        self.locals.clear();
        self.locals
            .resize(program.n_locals as usize, CellValue::Missing);
        for inst in program.instrs() {
            match inst.op() {
                OpCode::PushConst => {
                    self.stack.push(program.consts[inst.a() as usize].clone());
                }
                OpCode::LoadField => {
                    self.stack.push(fields[inst.a() as usize].clone());
                }
                OpCode::LoadLocal => {
                    self.stack.push(self.locals[inst.a() as usize].clone());
                }
                OpCode::StoreLocal => {
                    let v = self.stack.pop().unwrap_or(CellValue::Missing);
                    self.locals[inst.a() as usize] = v;
                }
                OpCode::Neg | OpCode::Not => {
                    let v = self.stack.pop().unwrap_or(CellValue::Missing);
                    let op = match inst.op() {
                        OpCode::Neg => UnaryOp::Neg,
                        _ => UnaryOp::Not,
                    };
                    self.stack.push(apply_unary(op, v)?);
                }
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Mod
                | OpCode::Eq
                | OpCode::Ne
                | OpCode::Lt
                | OpCode::Le
                | OpCode::Gt
                | OpCode::Ge
                | OpCode::And
                | OpCode::Or => {
                    let right = self.stack.pop().unwrap_or(CellValue::Missing);
                    let left = self.stack.pop().unwrap_or(CellValue::Missing);
                    let op = match inst.op() {
                        OpCode::Add => BinaryOp::Add,
                        OpCode::Sub => BinaryOp::Sub,
                        OpCode::Mul => BinaryOp::Mul,
                        OpCode::Div => BinaryOp::Div,
                        OpCode::Mod => BinaryOp::Mod,
                        OpCode::Eq => BinaryOp::Eq,
                        OpCode::Ne => BinaryOp::Ne,
                        OpCode::Lt => BinaryOp::Lt,
                        OpCode::Le => BinaryOp::Le,
                        OpCode::Gt => BinaryOp::Gt,
                        OpCode::Ge => BinaryOp::Ge,
                        OpCode::And => BinaryOp::And,
                        _ => BinaryOp::Or,
                    };
                    self.stack.push(apply_binary(op, left, right)?);
                }
                OpCode::CallFunc => {
                    let def = &funcs[inst.a() as usize];
                    let argc = inst.b() as usize;
                    let start = self.stack.len().saturating_sub(argc);
                    let result = def.call(&self.stack[start..])?;
                    self.stack.truncate(start);
                    self.stack.push(result);
                }
                OpCode::AccessInt | OpCode::AccessReal => {
                    let v = self.stack.pop().unwrap_or(CellValue::Missing);
                    let accessor = match inst.op() {
                        OpCode::AccessInt => Accessor::Int,
                        _ => Accessor::Real,
                    };
                    self.stack.push(access(accessor, v)?);
                }
                OpCode::CastInt | OpCode::CastReal | OpCode::CastText => {
                    let v = self.stack.pop().unwrap_or(CellValue::Missing);
                    let kind = match inst.op() {
                        OpCode::CastInt => ValueKind::Int,
                        OpCode::CastReal => ValueKind::Real,
                        _ => ValueKind::Text,
                    };
                    self.stack.push(cast(kind, v)?);
                }
                OpCode::Ret => break,
            }
        }
        Ok(self.stack.pop().unwrap_or(CellValue::Missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lower_unit;
    use crate::functions::FunctionRegistry;
    use crate::parser::parse_unit;
    use pretty_assertions::assert_eq;
    use snippet_model::OutputKind;

    fn eval_src(src: &str, output: OutputKind, fields: &[CellValue]) -> Result<CellValue, EvalError> {
        let registry = FunctionRegistry::with_defaults();
        let unit = parse_unit(src).unwrap();
        let program = lower_unit(&unit, output, &registry).unwrap();
        let funcs: Vec<_> = program
            .funcs()
            .iter()
            .map(|name| registry.resolve(program.imports(), name).unwrap())
            .collect();
        Vm::new().eval(&program, fields, &funcs)
    }

    #[test]
    fn statements_bind_locals() {
        let v = eval_src(
            "x = 2;\ny = x * 3;\nreturn int((x + y));",
            OutputKind::Int,
            &[],
        )
        .unwrap();
        assert_eq!(v, CellValue::Int(8));
    }

    #[test]
    fn fields_load_bound_values() {
        let v = eval_src(
            "field col0: Int;\nfield col1: Int;\nreturn int((col0.int() + col1.int()));",
            OutputKind::Int,
            &[CellValue::Int(2), CellValue::Int(3)],
        )
        .unwrap();
        assert_eq!(v, CellValue::Int(5));
    }

    #[test]
    fn function_calls_run_through_the_registry() {
        let v = eval_src(
            "import math;\nreturn real((sqrt(9)));",
            OutputKind::Real,
            &[],
        )
        .unwrap();
        assert_eq!(v, CellValue::Real(3.0));
    }

    #[test]
    fn accessor_on_missing_field_faults() {
        let err = eval_src(
            "field col0: Real;\nreturn real((col0.real()));",
            OutputKind::Real,
            &[CellValue::Missing],
        )
        .unwrap_err();
        assert_eq!(err, EvalError::MissingAccess { accessor: "real" });
    }

    #[test]
    fn text_cast_boxes_any_value() {
        let v = eval_src("return text((1 < 2));", OutputKind::Text, &[]).unwrap();
        assert_eq!(v, CellValue::Text("true".to_string()));
    }
}
