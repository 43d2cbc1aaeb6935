use std::collections::HashMap;
use std::sync::Arc;

use cel_interpreter::objects::{Key, Map};
use cel_interpreter::{Context, IdedExpr, Value as CelValue};
use cel_parser::ast::{operators, EntryExpr, Expr};
use cel_parser::reference::Val;
use cel_parser::Parser;
use serde_json::{Number, Value};

use super::{Engine, Evaluator, Scope};
use crate::error::EvaluationError;

const NOW: &str = "now";

/// Largest magnitude up to which every integer is exactly representable as `f64`
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Engine running snippet bodies as Common Expression Language programs
///
/// Every number is a double, both in bindings and in integer literals of
/// the body, so `v => v / 1000000` divides without truncation and integer
/// and fractional inputs mix freely. Literals used as list subscripts stay
/// integers. Integral results are handed back as JSON integers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CelEngine;

impl Engine for CelEngine {
    fn compile(&self, body: &str) -> Result<Arc<dyn Evaluator>, String> {
        let mut program = Parser::default().parse(body).map_err(|e| e.to_string())?;
        promote_integers(&mut program);

        Ok(Arc::new(CelProgram {
            body: body.to_owned(),
            program,
        }))
    }
}

#[derive(Debug)]
struct CelProgram {
    body: String,
    program: IdedExpr,
}

impl Evaluator for CelProgram {
    fn evaluate(
        &self,
        bindings: &[(&str, &Value)],
        scope: &Scope,
    ) -> Result<Value, EvaluationError> {
        let mut context = Context::default();
        context.add_variable_from_value(NOW, CelValue::Float(scope.now_millis() as f64));

        for (name, value) in bindings {
            context.add_variable_from_value(*name, to_cel(value));
        }

        let result = CelValue::resolve(&self.program, &context).map_err(|e| {
            EvaluationError::Execution {
                source_text: self.body.clone(),
                reason: e.to_string(),
            }
        })?;

        from_cel(result)
    }
}

fn promote_integers(expression: &mut IdedExpr) {
    match &mut expression.expr {
        Expr::Literal(literal) => {
            if let Val::Int(integer) = *literal {
                *literal = Val::Double(integer as f64);
            }
        }
        Expr::Call(call)
            if call.func_name == operators::INDEX || call.func_name == operators::OPT_INDEX =>
        {
            if let Some(target) = call.args.first_mut() {
                promote_integers(target);
            }
        }
        Expr::Call(call) => {
            if let Some(target) = call.target.as_deref_mut() {
                promote_integers(target);
            }
            call.args.iter_mut().for_each(promote_integers);
        }
        Expr::Comprehension(comprehension) => {
            promote_integers(&mut comprehension.iter_range);
            promote_integers(&mut comprehension.accu_init);
            promote_integers(&mut comprehension.loop_cond);
            promote_integers(&mut comprehension.loop_step);
            promote_integers(&mut comprehension.result);
        }
        Expr::List(list) => list.elements.iter_mut().for_each(promote_integers),
        Expr::Map(map) => {
            for entry in &mut map.entries {
                if let EntryExpr::MapEntry(entry) = &mut entry.expr {
                    promote_integers(&mut entry.value);
                }
            }
        }
        Expr::Struct(structure) => {
            for entry in &mut structure.entries {
                if let EntryExpr::StructField(field) = &mut entry.expr {
                    promote_integers(&mut field.value);
                }
            }
        }
        Expr::Select(select) => promote_integers(&mut select.operand),
        Expr::Ident(_) | Expr::Unspecified => {}
    }
}

fn to_cel(value: &Value) -> CelValue {
    match value {
        Value::Null => CelValue::Null,
        Value::Bool(b) => CelValue::Bool(*b),
        Value::Number(n) => CelValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => CelValue::String(Arc::new(s.clone())),
        Value::Array(items) => CelValue::List(Arc::new(items.iter().map(to_cel).collect())),
        Value::Object(map) => {
            let fields: HashMap<Key, CelValue> = map
                .iter()
                .map(|(key, value)| (Key::String(Arc::new(key.clone())), to_cel(value)))
                .collect();
            CelValue::Map(Map::from(fields))
        }
    }
}

fn from_cel(value: CelValue) -> Result<Value, EvaluationError> {
    match value {
        CelValue::Null => Ok(Value::Null),
        CelValue::Bool(b) => Ok(Value::Bool(b)),
        CelValue::Int(i) => Ok(Value::from(i)),
        CelValue::UInt(u) => Ok(Value::from(u)),
        CelValue::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
            Ok(Value::from(f as i64))
        }
        CelValue::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| EvaluationError::Conversion(format!("non-finite number {f}"))),
        CelValue::String(s) => Ok(Value::String(s.to_string())),
        CelValue::List(items) => items
            .iter()
            .cloned()
            .map(from_cel)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        CelValue::Map(map) => map
            .map
            .iter()
            .map(|(key, value)| Ok((key_to_string(key), from_cel(value.clone())?)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        CelValue::Timestamp(timestamp) => Ok(Value::String(timestamp.to_rfc3339())),
        CelValue::Duration(duration) => Ok(Value::from(duration.num_milliseconds())),
        other => Err(EvaluationError::Conversion(format!("{other:?}"))),
    }
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}
