use scss::ast::expr::ListSeparator;

use crate::arguments::Args;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::runtime_value::{Map, Value};

use super::{bool_value, Registry};

pub(super) fn register(registry: &mut Registry) {
    registry.add("map-get", &["($map, $key, $keys...)"], map_get);
    registry.add("map-merge", &["($map1, $map2)"], map_merge);
    registry.add("map-remove", &["($map, $keys...)"], map_remove);
    registry.add("map-keys", &["($map)"], map_keys);
    registry.add("map-values", &["($map)"], map_values);
    registry.add("map-has-key", &["($map, $key, $keys...)"], map_has_key);
    registry.add("keywords", &["($args)"], keywords);
}

/// Follow `$key` and any further `$keys` into nested maps.
fn nested_get(args: &Args) -> Result<Option<Value>, CompileError> {
    let mut current = Value::Map(args.map("map")?);
    let mut keys = vec![args.get("key").clone()];
    keys.extend(args.rest_items());
    for key in keys {
        let Value::Map(map) = &current else {
            return Ok(None);
        };
        match map.get(&key) {
            Some(value) => current = value.clone(),
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn map_get(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(nested_get(args)?.unwrap_or(Value::Null))
}

fn map_has_key(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(nested_get(args)?.is_some()))
}

fn map_merge(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let first = args.map("map1")?;
    let second = args.map("map2")?;
    Ok(Value::Map(first.merged(&second)))
}

fn map_remove(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let mut map = args.map("map")?;
    for key in args.rest_items() {
        map.remove(&key);
    }
    Ok(Value::Map(map))
}

fn map_keys(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(Value::list(args.map("map")?.keys(), ListSeparator::Comma))
}

fn map_values(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(Value::list(args.map("map")?.values(), ListSeparator::Comma))
}

fn keywords(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    match args.get("args") {
        Value::List(list) => Ok(Value::Map(
            list.keywords
                .iter()
                .flatten()
                .map(|(name, value)| (Value::string(name.clone()), value.clone()))
                .collect::<Map>(),
        )),
        other => Err(CompileError::type_error("args", other, "argument list")),
    }
}
