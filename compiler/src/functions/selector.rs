use scss::ast::expr::ListSeparator;
use scss::ast::selector::SelectorList;
use scss::parser::parse_selector_list;

use crate::arguments::Args;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::extend::ExtendEngine;
use crate::runtime_value::Value;
use crate::selector::{self as algebra, list_to_parts, to_parts, Compound, Parts};

use super::{bool_value, Registry};

pub(super) fn register(registry: &mut Registry) {
    registry.add("selector-parse", &["($selector)"], selector_parse);
    registry.add("selector-nest", &["($selectors...)"], selector_nest);
    registry.add("selector-append", &["($selectors...)"], selector_append);
    registry.add("selector-unify", &["($selector1, $selector2)"], selector_unify);
    registry.add("selector-extend", &["($selector, $extendee, $extender)"], selector_extend);
    registry.add("selector-replace", &["($selector, $original, $replacement)"], selector_replace);
    registry.add("simple-selectors", &["($selector)"], simple_selectors);
    registry.add("is-superselector", &["($super, $sub)"], is_superselector);
}

/// Selector text of a string or of a (nested) list of strings.
fn selector_text(value: &Value, name: &str) -> Result<String, CompileError> {
    match value {
        Value::String { text, .. } => Ok(text.clone()),
        Value::List(list) => {
            let sep = if list.separator == ListSeparator::Comma { ", " } else { " " };
            let parts = list
                .items
                .iter()
                .map(|item| selector_text(item, name))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(sep))
        }
        other => Err(CompileError::type_error(name, other, "valid selector")),
    }
}

fn parse_value(value: &Value, name: &str) -> Result<SelectorList, CompileError> {
    let text = selector_text(value, name)?;
    parse_selector_list(text.trim()).map_err(|err| CompileError::InvalidSelector {
        selector: text.trim().to_string(),
        message: err.message,
    })
}

fn parse_arg(args: &Args, name: &str) -> Result<SelectorList, CompileError> {
    parse_value(args.get(name), name)
}

/// Selectors as a comma list of space lists.
fn to_value(selectors: &[Parts]) -> Value {
    let complexes = selectors
        .iter()
        .map(|parts| {
            Value::list(
                parts.iter().map(|compound| Value::string(compound.concat())).collect(),
                ListSeparator::Space,
            )
        })
        .collect();
    Value::list(complexes, ListSeparator::Comma)
}

fn single_compound(list: &SelectorList, name: &str) -> Result<Vec<Compound>, CompileError> {
    let mut out = Vec::with_capacity(list.selectors.len());
    for complex in &list.selectors {
        match to_parts(complex).as_slice() {
            [compound] => out.push(compound.clone()),
            _ => {
                return Err(CompileError::InvalidSelector {
                    selector: complex.to_string(),
                    message: format!("${} must contain only compound selectors", name),
                });
            }
        }
    }
    Ok(out)
}

fn selector_parse(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(to_value(&list_to_parts(&parse_arg(args, "selector")?)))
}

fn selector_nest(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let lists = args
        .rest_items()
        .iter()
        .map(|item| parse_value(item, "selectors"))
        .collect::<Result<Vec<_>, _>>()?;
    let levels: Vec<&SelectorList> = lists.iter().collect();
    match algebra::resolve_levels(None, &levels)? {
        Some(list) => Ok(to_value(&list_to_parts(&list))),
        None => Err(CompileError::Argument(
            "$selectors: At least one selector must be passed.".to_string(),
        )),
    }
}

fn selector_append(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let items = args.rest_items();
    let Some((first, rest)) = items.split_first() else {
        return Err(CompileError::Argument(
            "$selectors: At least one selector must be passed.".to_string(),
        ));
    };
    let mut acc = parse_value(first, "selectors")?;
    for item in rest {
        acc = algebra::append(&acc, &selector_text(item, "selectors")?)?;
    }
    Ok(to_value(&list_to_parts(&acc)))
}

fn selector_unify(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let a = list_to_parts(&parse_arg(args, "selector1")?);
    let b = list_to_parts(&parse_arg(args, "selector2")?);
    let unified = algebra::unify(&a, &b);
    Ok(if unified.is_empty() { Value::Null } else { to_value(&unified) })
}

fn engine_for(exec: &Executor<'_>, args: &Args, target: &str, origin: &str) -> Result<ExtendEngine, CompileError> {
    let targets = single_compound(&parse_arg(args, target)?, target)?;
    let origin = list_to_parts(&parse_arg(args, origin)?);
    let mut engine = ExtendEngine::new();
    for compound in targets {
        engine.push(compound, origin.clone(), true, exec.current_pos.clone());
    }
    Ok(engine)
}

fn selector_extend(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let selector = list_to_parts(&parse_arg(args, "selector")?);
    let mut engine = engine_for(exec, args, "extendee", "extender")?;
    Ok(to_value(&engine.extend_selectors(&selector)))
}

fn selector_replace(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let selector = list_to_parts(&parse_arg(args, "selector")?);
    let mut engine = engine_for(exec, args, "original", "replacement")?;
    let mut out = Vec::new();
    for complex in selector {
        let mut extended = engine.extend_selectors(std::slice::from_ref(&complex));
        if extended.len() > 1 {
            extended.retain(|s| *s != complex);
        }
        for s in extended {
            if !out.contains(&s) {
                out.push(s);
            }
        }
    }
    Ok(to_value(&out))
}

fn simple_selectors(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let list = parse_arg(args, "selector")?;
    let compounds = single_compound(&list, "selector")?;
    match compounds.as_slice() {
        [compound] => Ok(Value::list(
            compound.iter().map(|s| Value::string(s.clone())).collect(),
            ListSeparator::Comma,
        )),
        _ => Err(CompileError::Argument(
            "$selector: expected a single compound selector.".to_string(),
        )),
    }
}

fn is_superselector(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let sup = list_to_parts(&parse_arg(args, "super")?);
    let sub = list_to_parts(&parse_arg(args, "sub")?);
    Ok(bool_value(algebra::is_superselector(&sup, &sub)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_values_round_trip_through_text() {
        let list = parse_selector_list(".a > .b, c").unwrap();
        let value = to_value(&list_to_parts(&list));
        assert_eq!(selector_text(&value, "s").unwrap(), ".a > .b, c");
    }

    #[test]
    fn only_compounds_can_be_extendees() {
        let list = parse_selector_list(".a .b").unwrap();
        assert!(single_compound(&list, "extendee").is_err());
        let list = parse_selector_list("a.b").unwrap();
        assert_eq!(single_compound(&list, "extendee").unwrap(), vec![vec!["a".to_string(), ".b".to_string()]]);
    }
}
