use scss::ast::expr::ListSeparator;

use crate::arguments::Args;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::runtime_value::{List, Value};

use super::{bool_value, int_arg, number, Registry};

pub(super) fn register(registry: &mut Registry) {
    registry.add("length", &["($list)"], length);
    registry.add("nth", &["($list, $n)"], nth);
    registry.add("set-nth", &["($list, $n, $value)"], set_nth);
    registry.add(
        "join",
        &["($list1, $list2, $separator: auto, $bracketed: auto)"],
        join,
    );
    registry.add("append", &["($list, $val, $separator: auto)"], append);
    registry.add("zip", &["($lists...)"], zip);
    registry.add("index", &["($list, $value)"], index);
    registry.add("list-separator", &["($list)"], list_separator);
    registry.add("is-bracketed", &["($list)"], is_bracketed);
}

fn is_bracketed_value(value: &Value) -> bool {
    matches!(value, Value::List(list) if list.bracketed)
}

/// `auto`, `comma` or `space`; `None` for `auto`.
fn separator_arg(args: &Args, name: &str) -> Result<Option<ListSeparator>, CompileError> {
    match args.string(name)? {
        "auto" => Ok(None),
        "comma" => Ok(Some(ListSeparator::Comma)),
        "space" => Ok(Some(ListSeparator::Space)),
        _ => Err(CompileError::Argument(format!(
            "${}: Must be \"space\", \"comma\", or \"auto\".",
            name
        ))),
    }
}

/// Resolve a one-based, possibly negative index against `len`.
fn list_index(args: &Args, name: &str, len: usize) -> Result<usize, CompileError> {
    let n = int_arg(args, name)?;
    if n == 0 {
        return Err(CompileError::Argument(format!("${}: List index may not be 0.", name)));
    }
    let resolved = if n < 0 { len as i64 + n } else { n - 1 };
    if resolved < 0 || resolved >= len as i64 {
        return Err(CompileError::Argument(format!(
            "${}: Invalid index {} for a list with {} elements.",
            name, n, len
        )));
    }
    Ok(resolved as usize)
}

fn decided(separator: ListSeparator) -> Option<ListSeparator> {
    (separator != ListSeparator::Undecided).then_some(separator)
}

fn make_list(items: Vec<Value>, separator: ListSeparator, bracketed: bool) -> Value {
    let mut list = List::new(items, separator);
    list.bracketed = bracketed;
    Value::List(list)
}

fn length(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.get("list").as_items().len() as f64, ""))
}

fn nth(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let items = args.get("list").as_items();
    let i = list_index(args, "n", items.len())?;
    Ok(items[i].clone())
}

fn set_nth(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let list = args.get("list");
    let mut items = list.as_items();
    let i = list_index(args, "n", items.len())?;
    items[i] = args.get("value").clone();
    Ok(make_list(items, list.separator(), is_bracketed_value(list)))
}

fn join(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let (first, second) = (args.get("list1"), args.get("list2"));
    let separator = separator_arg(args, "separator")?
        .or_else(|| decided(first.separator()).filter(|_| !first.as_items().is_empty()))
        .or_else(|| decided(second.separator()).filter(|_| !second.as_items().is_empty()))
        .unwrap_or(ListSeparator::Space);
    let bracketed = match args.get("bracketed") {
        Value::String { text, quote: None } if text == "auto" => is_bracketed_value(first),
        other => other.is_truthy(),
    };
    let mut items = first.as_items();
    items.extend(second.as_items());
    Ok(make_list(items, separator, bracketed))
}

fn append(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let list = args.get("list");
    let separator = separator_arg(args, "separator")?
        .or_else(|| decided(list.separator()))
        .unwrap_or(ListSeparator::Space);
    let mut items = list.as_items();
    items.push(args.get("val").clone());
    Ok(make_list(items, separator, is_bracketed_value(list)))
}

fn zip(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let lists: Vec<Vec<Value>> = args.rest_items().iter().map(Value::as_items).collect();
    let shortest = lists.iter().map(Vec::len).min().unwrap_or(0);
    let rows = (0..shortest)
        .map(|i| Value::list(lists.iter().map(|l| l[i].clone()).collect(), ListSeparator::Space))
        .collect();
    Ok(Value::list(rows, ListSeparator::Comma))
}

fn index(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let needle = args.get("value");
    Ok(args
        .get("list")
        .as_items()
        .iter()
        .position(|item| item.equals(needle))
        .map(|i| number((i + 1) as f64, ""))
        .unwrap_or(Value::Null))
}

fn list_separator(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let name = match args.get("list").separator() {
        ListSeparator::Comma => "comma",
        _ => "space",
    };
    Ok(Value::string(name))
}

fn is_bracketed(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(bool_value(is_bracketed_value(args.get("list"))))
}
