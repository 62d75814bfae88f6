use crate::arguments::{Args, EvaluatedArgs};
use crate::environment::CallableKind;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::runtime_value::Value;

use super::{bool_value, css_call, Registry};

/// Answers of `feature-exists()`.
const FEATURES: &[&str] = &[
    "global-variable-shadowing",
    "extend-selector-pseudoclass",
    "units-level-3",
    "at-error",
    "custom-property",
];

pub(super) fn register(registry: &mut Registry) {
    registry.add("type-of", &["($value)"], type_of);
    registry.add("inspect", &["($value)"], inspect);
    registry.add("variable-exists", &["($name)"], variable_exists);
    registry.add("global-variable-exists", &["($name)"], global_variable_exists);
    registry.add("function-exists", &["($name)"], function_exists);
    registry.add("mixin-exists", &["($name)"], mixin_exists);
    registry.add("content-exists", &["()"], content_exists);
    registry.add("get-function", &["($name, $css: false)"], get_function);
    registry.add("call", &["($function, $args...)"], call);
    registry.add("if", &["($condition, $if-true, $if-false)"], eager_if);
    registry.add("feature-exists", &["($feature)"], feature_exists);
}

fn type_of(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(Value::string(args.get("value").type_name()))
}

fn inspect(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(Value::string(args.get("value").inspect()))
}

fn variable_exists(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(exec.env.lookup(args.string("name")?)?.is_some()))
}

fn global_variable_exists(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(exec.env.global(args.string("name")?).is_some()))
}

fn function_exists(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(exec.is_known_function(args.string("name")?)?))
}

fn mixin_exists(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let name = args.string("name")?;
    Ok(bool_value(exec.env.lookup_callable(name, CallableKind::Mixin)?.is_some()))
}

fn content_exists(exec: &mut Executor<'_>, _: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(exec.env.content()?.is_some()))
}

fn get_function(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let name = args.string("name")?;
    if args.get("css").is_truthy() || exec.is_known_function(name)? {
        return Ok(Value::Function(name.to_string()));
    }
    Err(CompileError::custom(format!("Function not found: {}", name)))
}

fn call(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let name = match args.get("function") {
        Value::Function(name) => name.clone(),
        Value::String { text, .. } => {
            exec.warn(
                "Passing a string to call() is deprecated; pass a function reference from get-function() instead.",
                true,
            );
            text.clone()
        }
        other => return Err(CompileError::type_error("function", other, "function reference")),
    };
    let call_args = EvaluatedArgs {
        positional: args.rest_items(),
        named: args.rest_keywords(),
    };
    if exec.is_known_function(&name)? {
        return exec.call_with_values(&name, call_args);
    }
    css_call(exec, &name, &call_args.positional)
}

fn eager_if(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(if args.get("condition").is_truthy() {
        args.get("if-true").clone()
    } else {
        args.get("if-false").clone()
    })
}

fn feature_exists(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(FEATURES.contains(&args.string("feature")?)))
}
