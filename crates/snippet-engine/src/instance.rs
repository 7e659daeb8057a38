//! A live, bindable/invocable use of a compiled unit.

use crate::field::FieldMap;
use crate::runtime::EvalError;
use crate::unit::CompiledUnit;
use crate::vm::Vm;
use ahash::AHashMap;
use snippet_model::CellValue;
use std::sync::Arc;
use thiserror::Error;

/// Field-name to value mapping supplied to [`Instance::bind`].
pub type ValueMap = AHashMap<String, CellValue>;

/// Caller contract violation of the bind protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("unresolved property: no value bound for field `{name}`")]
    MissingField { name: String },
    #[error("unresolved property: `{name}` is not a field of this unit")]
    UnknownField { name: String },
}

/// One instantiation of a [`CompiledUnit`]: mutable field slots plus a VM.
///
/// Not safe for unsynchronized concurrent use; parallel row processing takes
/// one instance per worker, all sharing the unit read-only.
#[derive(Debug)]
pub struct Instance {
    unit: Arc<CompiledUnit>,
    slots: Vec<CellValue>,
    vm: Vm,
}

impl Instance {
    pub(crate) fn new(unit: Arc<CompiledUnit>) -> Self {
        let slots = vec![CellValue::Missing; unit.fields().len()];
        let vm = Vm::with_capacity(unit.program().max_stack() as usize);
        Self { unit, slots, vm }
    }

    pub fn fields(&self) -> &FieldMap {
        self.unit.fields()
    }

    /// Assigns every declared field from `values`.
    ///
    /// The mapping must cover the whole field map (an explicit
    /// [`CellValue::Missing`] counts) and must not name anything else.
    /// Either violation is an unresolved-property failure and leaves the
    /// previous binding untouched, so a field can never silently carry a
    /// stale value from an earlier row.
    pub fn bind(&mut self, values: &ValueMap) -> Result<(), BindError> {
        for name in values.keys() {
            if !self.unit.fields().contains(name) {
                return Err(BindError::UnknownField { name: name.clone() });
            }
        }
        let mut next = Vec::with_capacity(self.slots.len());
        for entry in self.unit.fields().iter() {
            match values.get(&entry.name) {
                Some(v) => next.push(v.clone()),
                None => {
                    return Err(BindError::MissingField {
                        name: entry.name.clone(),
                    });
                }
            }
        }
        self.slots = next;
        Ok(())
    }

    /// Invokes the entry point against the currently-bound fields and returns
    /// the boxed result. Re-evaluating without rebinding reuses the last
    /// binding.
    pub fn evaluate(&mut self) -> Result<CellValue, EvalError> {
        self.vm
            .eval(self.unit.program(), &self.slots, self.unit.funcs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldMap;
    use crate::functions::FunctionRegistry;
    use crate::unit::{ScratchArea, UnitCompiler};
    use pretty_assertions::assert_eq;
    use snippet_model::{OutputKind, ValueKind};

    fn unit_with_field() -> (Arc<CompiledUnit>, ScratchArea) {
        let scratch = ScratchArea::new().unwrap();
        let registry = FunctionRegistry::with_defaults();
        let mut fields = FieldMap::new();
        fields.insert("col0", ValueKind::Int);
        let unit = UnitCompiler::new(&registry)
            .compile("col0.int() * 2", &fields, OutputKind::Int, &scratch)
            .unwrap();
        (Arc::new(unit), scratch)
    }

    #[test]
    fn bind_then_evaluate() {
        let (unit, _scratch) = unit_with_field();
        let mut instance = unit.instance().unwrap();
        let mut values = ValueMap::default();
        values.insert("col0".to_string(), CellValue::Int(21));
        instance.bind(&values).unwrap();
        assert_eq!(instance.evaluate().unwrap(), CellValue::Int(42));
    }

    #[test]
    fn omitting_a_mapped_field_is_unresolved_property() {
        let (unit, _scratch) = unit_with_field();
        let mut instance = unit.instance().unwrap();
        let err = instance.bind(&ValueMap::default()).unwrap_err();
        assert_eq!(
            err,
            BindError::MissingField {
                name: "col0".to_string()
            }
        );
    }

    #[test]
    fn unknown_field_name_is_unresolved_property() {
        let (unit, _scratch) = unit_with_field();
        let mut instance = unit.instance().unwrap();
        let mut values = ValueMap::default();
        values.insert("col0".to_string(), CellValue::Int(1));
        values.insert("col7".to_string(), CellValue::Int(2));
        let err = instance.bind(&values).unwrap_err();
        assert_eq!(
            err,
            BindError::UnknownField {
                name: "col7".to_string()
            }
        );
    }

    #[test]
    fn re_evaluation_reuses_the_last_binding() {
        let (unit, _scratch) = unit_with_field();
        let mut instance = unit.instance().unwrap();
        let mut values = ValueMap::default();
        values.insert("col0".to_string(), CellValue::Int(5));
        instance.bind(&values).unwrap();
        assert_eq!(instance.evaluate().unwrap(), CellValue::Int(10));
        assert_eq!(instance.evaluate().unwrap(), CellValue::Int(10));
    }

    #[test]
    fn instances_share_one_unit() {
        let (unit, _scratch) = unit_with_field();
        let mut a = unit.instance().unwrap();
        let mut b = unit.instance().unwrap();
        let mut values = ValueMap::default();
        values.insert("col0".to_string(), CellValue::Int(1));
        a.bind(&values).unwrap();
        values.insert("col0".to_string(), CellValue::Int(2));
        b.bind(&values).unwrap();
        assert_eq!(a.evaluate().unwrap(), CellValue::Int(2));
        assert_eq!(b.evaluate().unwrap(), CellValue::Int(4));
    }
}
