//! Binary operator dispatch.
//!
//! Handlers are looked up in three tiers: the exact (operator, left kind,
//! right kind) triple, then the (left kind, right kind) pair, then the
//! operator alone. Anything left over falls back to CSS-style text joining
//! for `+`, `-` and `/`, and is an error otherwise.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use scss::ast::expr::BinaryOperator;

use crate::color::Color;
use crate::error::CompileError;
use crate::number::Number;
use crate::runtime_value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    Color,
    String,
    List,
    Map,
    Function,
}

const ALL_KINDS: [ValueKind; 8] = [
    ValueKind::Null,
    ValueKind::Boolean,
    ValueKind::Number,
    ValueKind::Color,
    ValueKind::String,
    ValueKind::List,
    ValueKind::Map,
    ValueKind::Function,
];

pub fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Boolean(_) => ValueKind::Boolean,
        Value::Number(_) => ValueKind::Number,
        Value::Color(_) => ValueKind::Color,
        Value::String { .. } => ValueKind::String,
        Value::List(_) => ValueKind::List,
        Value::Map(_) => ValueKind::Map,
        Value::Function(_) => ValueKind::Function,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OpKey {
    Exact(BinaryOperator, ValueKind, ValueKind),
    Pair(ValueKind, ValueKind),
    Op(BinaryOperator),
}

type Handler = fn(BinaryOperator, &Value, &Value) -> Result<Value, CompileError>;

static TABLE: Lazy<HashMap<OpKey, Handler>> = Lazy::new(|| {
    let mut table: HashMap<OpKey, Handler> = HashMap::new();
    table.insert(OpKey::Pair(ValueKind::Number, ValueKind::Number), number_op);
    table.insert(OpKey::Pair(ValueKind::Color, ValueKind::Color), color_op);
    table.insert(OpKey::Pair(ValueKind::Color, ValueKind::Number), color_number_op);
    table.insert(OpKey::Pair(ValueKind::Number, ValueKind::Color), number_color_op);
    for kind in ALL_KINDS {
        table.insert(OpKey::Exact(BinaryOperator::Add, ValueKind::String, kind), string_concat);
        table.insert(OpKey::Exact(BinaryOperator::Add, kind, ValueKind::String), string_concat);
        for other in ALL_KINDS {
            table.insert(OpKey::Exact(BinaryOperator::Eq, kind, other), equality);
            table.insert(OpKey::Exact(BinaryOperator::Neq, kind, other), equality);
        }
    }
    table.insert(OpKey::Op(BinaryOperator::Eq), equality);
    table.insert(OpKey::Op(BinaryOperator::Neq), equality);
    table
});

/// Evaluate `left op right`. `and`/`or` short-circuit in the evaluator and
/// never reach this table.
pub fn binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    let (lk, rk) = (kind_of(left), kind_of(right));
    let handler = TABLE
        .get(&OpKey::Exact(op, lk, rk))
        .or_else(|| TABLE.get(&OpKey::Pair(lk, rk)))
        .or_else(|| TABLE.get(&OpKey::Op(op)));
    match handler {
        Some(handler) => handler(op, left, right),
        None => fallback(op, left, right),
    }
}

fn undefined(op: BinaryOperator, left: &Value, right: &Value) -> CompileError {
    CompileError::UndefinedOperation {
        left: left.inspect(),
        op: op.symbol().to_string(),
        right: right.inspect(),
    }
}

fn fallback(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    match op {
        BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Div => {
            let symbol = if op == BinaryOperator::Add { "" } else { op.symbol() };
            Ok(Value::string(format!(
                "{}{}{}",
                left.to_css(false)?,
                symbol,
                right.to_css(false)?
            )))
        }
        _ => Err(undefined(op, left, right)),
    }
}

fn equality(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    let equal = left.equals(right);
    Ok(Value::Boolean(if op == BinaryOperator::Eq { equal } else { !equal }))
}

fn string_concat(_op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    let text_of = |value: &Value| -> Result<String, CompileError> {
        match value {
            Value::String { text, .. } => Ok(text.clone()),
            other => other.to_css(false),
        }
    };
    let quote = match (left, right) {
        (Value::String { quote, .. }, _) => *quote,
        (_, Value::String { quote, .. }) => *quote,
        _ => None,
    };
    Ok(Value::String {
        text: format!("{}{}", text_of(left)?, text_of(right)?),
        quote,
    })
}

fn number_op(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return fallback(op, left, right);
    };
    let number = |n: Number| Ok(Value::Number(n));
    match op {
        BinaryOperator::Add => number(a.add(b)?),
        BinaryOperator::Sub => number(a.sub(b)?),
        BinaryOperator::Mul => number(a.mul(b)),
        BinaryOperator::Div => number(a.div(b)),
        BinaryOperator::Mod => number(a.rem(b)?),
        BinaryOperator::Lt => Ok(Value::Boolean(a.compare(b)?.is_lt())),
        BinaryOperator::Lte => Ok(Value::Boolean(a.compare(b)?.is_le())),
        BinaryOperator::Gt => Ok(Value::Boolean(a.compare(b)?.is_gt())),
        BinaryOperator::Gte => Ok(Value::Boolean(a.compare(b)?.is_ge())),
        BinaryOperator::Eq | BinaryOperator::Neq => equality(op, left, right),
        BinaryOperator::And | BinaryOperator::Or => Err(undefined(op, left, right)),
    }
}

fn channel_op(op: BinaryOperator, a: f64, b: f64) -> Option<f64> {
    match op {
        BinaryOperator::Add => Some(a + b),
        BinaryOperator::Sub => Some(a - b),
        BinaryOperator::Mul => Some(a * b),
        BinaryOperator::Div if b != 0.0 => Some(a / b),
        BinaryOperator::Div => Some(a),
        BinaryOperator::Mod if b != 0.0 => Some(a.rem_euclid(b)),
        BinaryOperator::Mod => Some(a),
        _ => None,
    }
}

fn color_op(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    let (Value::Color(a), Value::Color(b)) = (left, right) else {
        return fallback(op, left, right);
    };
    if matches!(op, BinaryOperator::Eq | BinaryOperator::Neq) {
        return equality(op, left, right);
    }
    if (a.a - b.a).abs() > f64::EPSILON {
        return Err(CompileError::custom(format!(
            "Alpha channels must be equal: {} {} {}",
            left.inspect(),
            op.symbol(),
            right.inspect()
        )));
    }
    let channels = [(a.r, b.r), (a.g, b.g), (a.b, b.b)];
    let mut out = [0.0; 3];
    for (slot, (x, y)) in out.iter_mut().zip(channels) {
        *slot = channel_op(op, x, y).ok_or_else(|| undefined(op, left, right))?;
    }
    Ok(Value::Color(Color::rgba(out[0], out[1], out[2], a.a)))
}

fn color_number_op(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    let (Value::Color(c), Value::Number(n)) = (left, right) else {
        return fallback(op, left, right);
    };
    if !n.is_unitless() {
        return Err(undefined(op, left, right));
    }
    let mut out = [0.0; 3];
    for (slot, x) in out.iter_mut().zip([c.r, c.g, c.b]) {
        *slot = match channel_op(op, x, n.value) {
            Some(v) => v,
            None => return Err(undefined(op, left, right)),
        };
    }
    Ok(Value::Color(Color::rgba(out[0], out[1], out[2], c.a)))
}

fn number_color_op(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, CompileError> {
    match op {
        BinaryOperator::Add | BinaryOperator::Mul => color_number_op(op, right, left),
        _ => fallback(op, left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(v: f64) -> Value {
        Value::number(v, "px")
    }

    #[test]
    fn numbers_use_unit_arithmetic() {
        assert_eq!(
            binary(BinaryOperator::Mul, &px(1.0), &Value::number(2.0, "")).unwrap(),
            px(2.0)
        );
        assert_eq!(
            binary(BinaryOperator::Add, &Value::number(1.0, "in"), &Value::number(96.0, "px")).unwrap(),
            Value::number(2.0, "in")
        );
        assert!(binary(BinaryOperator::Add, &px(1.0), &Value::number(1.0, "s")).is_err());
        assert_eq!(
            binary(BinaryOperator::Lt, &px(1.0), &px(2.0)).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn strings_concatenate_keeping_left_quotes() {
        let result = binary(BinaryOperator::Add, &Value::quoted("a"), &Value::string("b")).unwrap();
        assert_eq!(result.inspect(), "\"ab\"");
        let result = binary(BinaryOperator::Add, &px(1.0), &Value::string("x")).unwrap();
        assert_eq!(result.inspect(), "1pxx");
    }

    #[test]
    fn fallbacks_join_text_or_fail() {
        let list = Value::list(
            vec![Value::string("a"), Value::string("b")],
            scss::ast::expr::ListSeparator::Space,
        );
        assert_eq!(
            binary(BinaryOperator::Div, &list, &px(2.0)).unwrap().inspect(),
            "a b/2px"
        );
        assert!(binary(BinaryOperator::Mul, &list, &px(2.0)).is_err());
        assert_eq!(
            binary(BinaryOperator::Eq, &list, &px(2.0)).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn colors_combine_channelwise() {
        let a = Value::Color(Color::rgba(16.0, 32.0, 48.0, 1.0));
        let b = Value::Color(Color::rgba(1.0, 2.0, 3.0, 1.0));
        let Value::Color(sum) = binary(BinaryOperator::Add, &a, &b).unwrap() else {
            panic!("expected a color");
        };
        assert_eq!(sum.channels(), [17, 34, 51]);
        let Value::Color(scaled) = binary(BinaryOperator::Mul, &Value::number(2.0, ""), &b).unwrap() else {
            panic!("expected a color");
        };
        assert_eq!(scaled.channels(), [2, 4, 6]);
    }
}
