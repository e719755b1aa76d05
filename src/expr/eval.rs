//! Evaluator for the filter subset.
//!
//! Every expression yields exactly one value (the subset has no
//! generators). jq semantics apply: missing object keys yield `null`,
//! indexing a scalar is an error unless the segment is marked optional,
//! `null` and `false` are the only falsy values.

use serde_json::Value;

use super::{CmpOp, Expr, ExprError, PathSeg};

pub fn eval(expr: &Expr, input: &Value) -> Result<Value, ExprError> {
    match expr {
        Expr::Identity => Ok(input.clone()),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(base, segments) => {
            let mut current = eval(base, input)?;
            for segment in segments {
                current = apply_segment(&current, segment)?;
            }
            Ok(current)
        }
        Expr::Pipe(lhs, rhs) => {
            let intermediate = eval(lhs, input)?;
            eval(rhs, &intermediate)
        }
        Expr::Cmp(op, lhs, rhs) => {
            let a = eval(lhs, input)?;
            let b = eval(rhs, input)?;
            compare(*op, &a, &b).map(Value::Bool)
        }
        Expr::And(lhs, rhs) => {
            if !truthy(&eval(lhs, input)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(rhs, input)?)))
        }
        Expr::Or(lhs, rhs) => {
            if truthy(&eval(lhs, input)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(rhs, input)?)))
        }
        Expr::Alt(lhs, rhs) => match eval(lhs, input) {
            Ok(value) if truthy(&value) => Ok(value),
            _ => eval(rhs, input),
        },
        Expr::Not => Ok(Value::Bool(!truthy(input))),
    }
}

fn apply_segment(current: &Value, segment: &PathSeg) -> Result<Value, ExprError> {
    match segment {
        PathSeg::Field { name, optional } => match current {
            Value::Null => Ok(Value::Null),
            Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            other => {
                if *optional {
                    Ok(Value::Null)
                } else {
                    Err(ExprError::Eval(format!(
                        "cannot index {} with \"{name}\"",
                        type_name(other)
                    )))
                }
            }
        },
        PathSeg::Index { index, optional } => match current {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => {
                let idx = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                if idx < 0 || idx as usize >= items.len() {
                    Ok(Value::Null)
                } else {
                    Ok(items[idx as usize].clone())
                }
            }
            other => {
                if *optional {
                    Ok(Value::Null)
                } else {
                    Err(ExprError::Eval(format!(
                        "cannot index {} with number",
                        type_name(other)
                    )))
                }
            }
        },
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq => return Ok(values_equal(a, b)),
        CmpOp::Ne => return Ok(!values_equal(a, b)),
        _ => {}
    }
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y)
                .ok_or_else(|| ExprError::Eval("numbers are not comparable".into()))?
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => {
            return Err(ExprError::Eval(format!(
                "{} and {} cannot be ordered",
                type_name(a),
                type_name(b)
            )))
        }
    };
    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // Compare numbers numerically so 1 == 1.0 holds.
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
