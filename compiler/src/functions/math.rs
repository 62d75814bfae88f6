use crate::arguments::Args;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::number::{fuzzy_eq, Number};
use crate::runtime_value::Value;

use super::{bool_value, css_call, Registry};

pub(super) fn register(registry: &mut Registry) {
    registry.add("percentage", &["($number)"], percentage);
    registry.add("round", &["($number)"], round);
    registry.add("ceil", &["($number)"], ceil);
    registry.add("floor", &["($number)"], floor);
    registry.add("abs", &["($number)"], abs);
    registry.add("min", &["($numbers...)"], min);
    registry.add("max", &["($numbers...)"], max);
    registry.add("unit", &["($number)"], unit);
    registry.add("unitless", &["($number)"], unitless);
    registry.add("comparable", &["($number1, $number2)"], comparable);
}

fn percentage(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let n = args.number("number")?;
    if !n.is_unitless() {
        return Err(CompileError::type_error("number", n.to_css(false)?, "unitless number"));
    }
    Ok(Value::number(n.value * 100.0, "%"))
}

/// Round half away from zero, tolerating float noise just below `.5`.
fn fuzzy_round(value: f64) -> f64 {
    let fraction = value.abs().fract();
    if fuzzy_eq(fraction, 0.5) {
        value.signum() * value.abs().ceil()
    } else {
        value.round()
    }
}

fn map_number(args: &Args, f: fn(f64) -> f64) -> Result<Value, CompileError> {
    let n = args.number("number")?;
    Ok(Value::Number(n.with_value(f(n.value))))
}

fn round(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    map_number(args, fuzzy_round)
}

fn ceil(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    map_number(args, f64::ceil)
}

fn floor(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    map_number(args, f64::floor)
}

fn abs(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    map_number(args, f64::abs)
}

/// Pick the extreme of the arguments. Mixed, incomparable units are left
/// to the browser as a CSS `min()`/`max()`.
fn extremum(exec: &Executor<'_>, args: &Args, name: &str, wants: std::cmp::Ordering) -> Result<Value, CompileError> {
    let items = args.rest_items();
    if items.is_empty() {
        return Err(CompileError::Argument(format!("At least one argument must be passed to {}().", name)));
    }
    let mut numbers: Vec<&Number> = Vec::with_capacity(items.len());
    for item in &items {
        match item {
            Value::Number(n) => numbers.push(n),
            _ => return css_call(exec, name, &items),
        }
    }
    let mut best = numbers[0];
    for &candidate in &numbers[1..] {
        if !candidate.is_comparable_to(best) {
            return css_call(exec, name, &items);
        }
        if candidate.compare(best)? == wants {
            best = candidate;
        }
    }
    Ok(Value::Number(best.clone()))
}

fn min(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    extremum(exec, args, "min", std::cmp::Ordering::Less)
}

fn max(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    extremum(exec, args, "max", std::cmp::Ordering::Greater)
}

fn unit(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(Value::quoted(args.number("number")?.unit()))
}

fn unitless(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(args.number("number")?.is_unitless()))
}

fn comparable(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let a = args.number("number1")?;
    let b = args.number("number2")?;
    Ok(bool_value(a.is_comparable_to(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(fuzzy_round(2.5), 3.0);
        assert_eq!(fuzzy_round(-2.5), -3.0);
        assert_eq!(fuzzy_round(2.4999999999999), 3.0);
        assert_eq!(fuzzy_round(2.4), 2.0);
    }
}
