//! Built-in function library.
//!
//! Each built-in declares one or more prototypes in SCSS parameter syntax.
//! Calls are bound against the prototypes in order and the handler receives
//! the values of the first one that fits.

mod color;
mod introspection;
mod list;
mod map;
mod math;
mod selector;
mod string;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use scss::ast::expr::Params;
use scss::parser::parse_params;

use crate::arguments::Args;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::number::Number;
use crate::runtime_value::Value;

pub(crate) type Handler = fn(&mut Executor<'_>, &Args) -> Result<Value, CompileError>;

pub(crate) struct Builtin {
    pub name: &'static str,
    pub prototypes: &'static [&'static str],
    pub handler: Handler,
}

#[derive(Default)]
pub(crate) struct Registry {
    builtins: HashMap<&'static str, Builtin>,
}

impl Registry {
    pub fn add(&mut self, name: &'static str, prototypes: &'static [&'static str], handler: Handler) {
        self.builtins.insert(
            name,
            Builtin {
                name,
                prototypes,
                handler,
            },
        );
    }
}

static REGISTRY: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    let mut registry = Registry::default();
    math::register(&mut registry);
    string::register(&mut registry);
    list::register(&mut registry);
    map::register(&mut registry);
    selector::register(&mut registry);
    introspection::register(&mut registry);
    color::register(&mut registry);
    registry.builtins
});

static PROTOTYPES: Lazy<HashMap<&'static str, Vec<Params>>> = Lazy::new(|| {
    REGISTRY
        .values()
        .map(|builtin| {
            let parsed = builtin
                .prototypes
                .iter()
                .filter_map(|p| parse_params(p).ok())
                .collect();
            (builtin.name, parsed)
        })
        .collect()
});

/// Built-in registered under a normalized name.
pub(crate) fn lookup(name: &str) -> Option<&'static Builtin> {
    REGISTRY.get(name)
}

/// Parsed prototypes of a built-in.
pub(crate) fn prototypes(name: &str) -> &'static [Params] {
    PROTOTYPES.get(name).map(Vec::as_slice).unwrap_or(&[])
}

// Helpers shared by the modules.

fn bool_value(b: bool) -> Value {
    Value::Boolean(b)
}

fn number(value: f64, unit: &str) -> Value {
    Value::Number(Number::new(value, unit))
}

/// A plain CSS function call for arguments Sass cannot evaluate, such as
/// `min(10px, var(--x))`.
fn css_call(exec: &Executor<'_>, name: &str, items: &[Value]) -> Result<Value, CompileError> {
    let mut rendered = Vec::with_capacity(items.len());
    for item in items {
        rendered.push(item.to_css(exec.compressed)?);
    }
    let sep = if exec.compressed { "," } else { ", " };
    Ok(Value::string(format!("{}({})", name, rendered.join(sep))))
}

/// An integer argument, e.g. a list index.
fn int_arg(args: &Args, name: &str) -> Result<i64, CompileError> {
    let n = args.number(name)?;
    n.as_int()
        .ok_or_else(|| CompileError::type_error(name, n.to_css(false).unwrap_or_default(), "int"))
}

/// A percentage argument as a fraction; unitless numbers are accepted too.
fn percent_arg(args: &Args, name: &str, low: f64, high: f64) -> Result<f64, CompileError> {
    let n = args.number(name)?;
    if !n.is_unitless() && !n.has_unit("%") {
        return Err(CompileError::type_error(name, n.to_css(false).unwrap_or_default(), "percentage"));
    }
    if n.value < low || n.value > high {
        return Err(CompileError::Argument(format!(
            "${}: Amount {} must be between {}% and {}%.",
            name,
            n.to_css(false).unwrap_or_default(),
            low,
            high
        )));
    }
    Ok(n.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_prototype_parses() {
        for builtin in REGISTRY.values() {
            assert_eq!(
                prototypes(builtin.name).len(),
                builtin.prototypes.len(),
                "prototype of {} does not parse",
                builtin.name
            );
        }
    }

    #[test]
    fn aliases_share_handlers() {
        assert!(lookup("alpha").is_some());
        assert!(lookup("opacity").is_some());
        assert!(lookup("fade-in").is_some());
        assert!(lookup("map-merge").is_some());
        assert!(lookup("no-such-function").is_none());
    }
}
