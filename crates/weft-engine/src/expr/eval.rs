use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

use super::parser::{BinaryOp, Expr, LogicalOp, UnaryOp};
use super::ExprError;

pub type Scope = BTreeMap<String, Value>;

pub fn eval(expr: &Expr, scope: &Scope) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownIdentifier(name.clone())),
        Expr::Member(target, name) => member(&eval(target, scope)?, name),
        Expr::Index(target, index) => {
            let target = eval(target, scope)?;
            let index = eval(index, scope)?;
            element(&target, &index)
        }
        Expr::Call {
            target,
            method,
            args,
        } => {
            let target = eval(target, scope)?;
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(&target, method, &args)
        }
        Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!truthy(&eval(operand, scope)?))),
        Expr::Unary(UnaryOp::Neg, operand) => {
            let v = eval(operand, scope)?;
            let n = to_number(&v)
                .ok_or_else(|| ExprError::Type(format!("cannot negate {}", type_name(&v))))?;
            Ok(Value::from(-n))
        }
        Expr::Logical(LogicalOp::And, lhs, rhs) => {
            let l = eval(lhs, scope)?;
            if truthy(&l) {
                eval(rhs, scope)
            } else {
                Ok(l)
            }
        }
        Expr::Logical(LogicalOp::Or, lhs, rhs) => {
            let l = eval(lhs, scope)?;
            if truthy(&l) {
                Ok(l)
            } else {
                eval(rhs, scope)
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, scope)?;
            let r = eval(rhs, scope)?;
            let result = match op {
                BinaryOp::LooseEq => loose_eq(&l, &r),
                BinaryOp::LooseNe => !loose_eq(&l, &r),
                BinaryOp::StrictEq => strict_eq(&l, &r),
                BinaryOp::StrictNe => !strict_eq(&l, &r),
                BinaryOp::Lt => compare(&l, &r)? == Some(Ordering::Less),
                BinaryOp::Le => matches!(compare(&l, &r)?, Some(Ordering::Less | Ordering::Equal)),
                BinaryOp::Gt => compare(&l, &r)? == Some(Ordering::Greater),
                BinaryOp::Ge => {
                    matches!(compare(&l, &r)?, Some(Ordering::Greater | Ordering::Equal))
                }
            };
            Ok(Value::Bool(result))
        }
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn member(target: &Value, name: &str) -> Result<Value, ExprError> {
    match target {
        Value::Null => Err(ExprError::Type(format!(
            "cannot read property '{}' of null",
            name
        ))),
        Value::Object(map) => Ok(match map.get(name) {
            Some(v) => v.clone(),
            None if name == "length" => Value::from(map.len()),
            None => Value::Null,
        }),
        // JavaScript string length counts UTF-16 code units.
        Value::String(s) if name == "length" => Ok(Value::from(s.encode_utf16().count())),
        Value::Array(items) if name == "length" => Ok(Value::from(items.len())),
        _ => Ok(Value::Null),
    }
}

fn element(target: &Value, index: &Value) -> Result<Value, ExprError> {
    match (target, index) {
        (Value::Null, _) => Err(ExprError::Type("cannot index null".into())),
        (Value::Array(items), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        (_, Value::String(key)) => member(target, key),
        _ => Ok(Value::Null),
    }
}

fn string_arg<'a>(method: &str, args: &'a [Value]) -> Result<&'a str, ExprError> {
    match args.first() {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ExprError::Type(format!("{}() expects a string argument", method))),
    }
}

fn call(target: &Value, method: &str, args: &[Value]) -> Result<Value, ExprError> {
    match (target, method) {
        (Value::String(s), "includes") => Ok(Value::Bool(s.contains(string_arg(method, args)?))),
        (Value::String(s), "startsWith") => {
            Ok(Value::Bool(s.starts_with(string_arg(method, args)?)))
        }
        (Value::String(s), "endsWith") => Ok(Value::Bool(s.ends_with(string_arg(method, args)?))),
        (Value::String(s), "toLowerCase") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "toUpperCase") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "trim") => Ok(Value::String(s.trim().to_string())),
        (Value::Array(items), "includes") => {
            let needle = args.first().unwrap_or(&Value::Null);
            Ok(Value::Bool(items.iter().any(|v| strict_eq(v, needle))))
        }
        _ if is_known_method(method) => Err(ExprError::Type(format!(
            "{}() is not available on {}",
            method,
            type_name(target)
        ))),
        _ => Err(ExprError::UnknownMethod(method.to_string())),
    }
}

fn is_known_method(method: &str) -> bool {
    matches!(
        method,
        "includes" | "startsWith" | "endsWith" | "toLowerCase" | "toUpperCase" | "trim"
    )
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(_), Value::String(_))
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => l == r,
        (Value::Number(_), Value::Number(_)) => strict_eq(l, r),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => match (to_number(l), to_number(r)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// `None` means the operands are unordered (NaN-like); all comparisons are then false.
fn compare(l: &Value, r: &Value) -> Result<Option<Ordering>, ExprError> {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return Ok(Some(a.cmp(b)));
    }
    for v in [l, r] {
        if matches!(v, Value::Array(_) | Value::Object(_)) {
            return Err(ExprError::Type(format!("cannot compare {}", type_name(v))));
        }
    }
    Ok(match (to_number(l), to_number(r)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => None,
    })
}
