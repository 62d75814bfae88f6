//! Expression evaluation.

use scss::ast::expr::{BinaryOperator, CallArg, Expr, ListSeparator, StringExpr, StringPart, UnaryOperator};

use crate::arguments::{select_prototype, Args, EvaluatedArgs};
use crate::color::Color;
use crate::environment::{normalize_name, CallableKind};
use crate::error::CompileError;
use crate::executor::Executor;
use crate::functions;
use crate::number::Number;
use crate::operators;
use crate::runtime_value::{List, Map, Value};

/// Properties whose slash-separated values are shorthand, never division.
const SLASH_PROPERTIES: &[&str] = &["font", "grid-row", "grid-column", "border-radius"];

pub fn keeps_slashes(property: &str) -> bool {
    SLASH_PROPERTIES.contains(&property)
}

/// Whether an operand forces the surrounding operation to be evaluated.
fn should_eval(expr: &Expr) -> bool {
    match expr {
        Expr::Binary {
            op: BinaryOperator::Div,
            lhs,
            rhs,
            ..
        } => should_eval(lhs) || should_eval(rhs),
        Expr::Binary { .. } | Expr::Variable(_) | Expr::FunctionCall { .. } => true,
        _ => false,
    }
}

fn right_has_unit(expr: &Expr) -> bool {
    match expr {
        Expr::Number { unit, .. } => !unit.is_empty(),
        _ => false,
    }
}

/// Bare color names take part in arithmetic as colors.
fn coerce_for_expression(value: Value) -> Value {
    match &value {
        Value::String { text, quote: None } => match Color::from_name(text) {
            Some(color) => Value::Color(color),
            None => value,
        },
        _ => value,
    }
}

impl Executor<'_> {
    /// Reduce an expression to a value. `in_exp` marks a context where `/`
    /// always divides; outside one, `a/b` between literal numbers with a
    /// united right side stays as written.
    pub(crate) fn reduce(&mut self, expr: &Expr, in_exp: bool) -> Result<Value, CompileError> {
        match expr {
            Expr::Number { value, unit } => Ok(Value::Number(Number::new(*value, unit))),
            Expr::Color { rgba, original } => {
                let mut color = Color::rgba(rgba[0], rgba[1], rgba[2], rgba[3]);
                color.original = Some(original.clone());
                Ok(Value::Color(color))
            }
            Expr::String(s) => self.eval_string(s),
            Expr::Keyword(word) => Ok(Value::string(word.clone())),
            Expr::Null => Ok(Value::Null),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Variable(name) => self.env.get(name),
            Expr::ParentSelector => self.parent_selector_value(),
            Expr::List {
                items,
                separator,
                bracketed,
            } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.reduce(item, in_exp)?);
                }
                let mut list = List::new(values, *separator);
                list.bracketed = *bracketed;
                Ok(Value::List(list))
            }
            Expr::Map(pairs) => {
                let mut map = Map::new();
                for (key, value) in pairs {
                    let key = self.reduce(key, true)?;
                    if map.contains(&key) {
                        return Err(CompileError::custom(format!("Duplicate key {} in map.", key.inspect())));
                    }
                    let value = self.reduce(value, true)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            Expr::Unary { op, operand, .. } => {
                let value = self.reduce(operand, true)?;
                unary(*op, value)
            }
            Expr::Binary {
                op,
                lhs,
                rhs,
                in_parens,
                space_before,
                space_after,
            } => {
                let in_exp = in_exp || should_eval(lhs) || should_eval(rhs);
                if *op == BinaryOperator::Div && !*in_parens && !in_exp && right_has_unit(rhs) {
                    let left = self.reduce(lhs, false)?;
                    let right = self.reduce(rhs, false)?;
                    return Ok(self.slash_string(&left, &right, *space_before, *space_after)?);
                }

                let left = coerce_for_expression(self.reduce(lhs, true)?);
                match op {
                    BinaryOperator::And if !left.is_truthy() => return Ok(left),
                    BinaryOperator::Or if left.is_truthy() => return Ok(left),
                    BinaryOperator::And | BinaryOperator::Or => return self.reduce(rhs, true),
                    _ => {}
                }
                let right = coerce_for_expression(self.reduce(rhs, true)?);
                operators::binary(*op, &left, &right)
            }
            Expr::FunctionCall { name, args } => self.call_function(name, args),
        }
    }

    fn slash_string(
        &self,
        left: &Value,
        right: &Value,
        space_before: bool,
        space_after: bool,
    ) -> Result<Value, CompileError> {
        Ok(Value::string(format!(
            "{}{}/{}{}",
            left.to_css(self.compressed)?,
            if space_before { " " } else { "" },
            if space_after { " " } else { "" },
            right.to_css(self.compressed)?
        )))
    }

    /// Evaluate a declaration value of a shorthand property, keeping every
    /// unparenthesized `/` as a separator.
    pub(crate) fn reduce_keeping_slashes(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        match expr {
            Expr::Binary {
                op: BinaryOperator::Div,
                lhs,
                rhs,
                in_parens: false,
                space_before,
                space_after,
            } => {
                let left = self.reduce_keeping_slashes(lhs)?;
                let right = self.reduce_keeping_slashes(rhs)?;
                self.slash_string(&left, &right, *space_before, *space_after)
            }
            Expr::List {
                items,
                separator,
                bracketed,
            } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.reduce_keeping_slashes(item)?);
                }
                let mut list = List::new(values, *separator);
                list.bracketed = *bracketed;
                Ok(Value::List(list))
            }
            other => self.reduce(other, false),
        }
    }

    fn eval_string(&mut self, s: &StringExpr) -> Result<Value, CompileError> {
        let text = self.interpolate(s)?;
        Ok(Value::String { text, quote: s.quote })
    }

    /// Text of an interpolated string; embedded strings lose their quotes.
    pub(crate) fn interpolate(&mut self, s: &StringExpr) -> Result<String, CompileError> {
        let mut out = String::new();
        for part in &s.parts {
            match part {
                StringPart::Literal(text) => out.push_str(text),
                StringPart::Interpolation(expr) => {
                    let value = self.reduce(expr, false)?;
                    out.push_str(&self.interpolated_text(&value)?);
                }
            }
        }
        Ok(out)
    }

    pub(crate) fn interpolated_text(&self, value: &Value) -> Result<String, CompileError> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String { text, .. } => Ok(text.clone()),
            Value::List(list) => {
                let sep = match list.separator {
                    ListSeparator::Comma if self.compressed => ",",
                    ListSeparator::Comma => ", ",
                    _ => " ",
                };
                let mut parts = Vec::with_capacity(list.items.len());
                for item in list.items.iter().filter(|v| !v.is_null()) {
                    parts.push(self.interpolated_text(item)?);
                }
                let body = parts.join(sep);
                Ok(if list.bracketed { format!("[{}]", body) } else { body })
            }
            Value::Map(_) | Value::Function(_) => Ok(value.inspect()),
            other => other.to_css(self.compressed),
        }
    }

    /// `&` as a value: a comma list of space lists, or null outside rules.
    fn parent_selector_value(&mut self) -> Result<Value, CompileError> {
        let Some(list) = self.current_selectors()? else {
            return Ok(Value::Null);
        };
        let complexes = crate::selector::list_to_parts(&list)
            .into_iter()
            .map(|parts| {
                Value::list(
                    parts.iter().map(|c| Value::string(c.concat())).collect(),
                    ListSeparator::Space,
                )
            })
            .collect();
        Ok(Value::list(complexes, ListSeparator::Comma))
    }

    /// Call a function by name from an expression.
    pub(crate) fn call_function(&mut self, name: &str, args: &[CallArg]) -> Result<Value, CompileError> {
        if normalize_name(name) == "if" && self.env.lookup_callable(name, CallableKind::Function)?.is_none() {
            return self.lazy_if(args);
        }
        if self.is_known_function(name)? {
            let evaluated = self.evaluate_args(args)?;
            return self.call_with_values(name, evaluated);
        }

        // Plain CSS function.
        let mut rendered = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.reduce(&arg.value, false)?;
            let items = if arg.splat { value.as_items() } else { vec![value] };
            for item in items {
                rendered.push(self.interpolated_text_keep_quotes(&item)?);
            }
        }
        let sep = if self.compressed { "," } else { ", " };
        Ok(Value::string(format!("{}({})", name, rendered.join(sep))))
    }

    fn interpolated_text_keep_quotes(&self, value: &Value) -> Result<String, CompileError> {
        match value {
            Value::Map(_) | Value::Function(_) => Ok(value.inspect()),
            other => other.to_css(self.compressed),
        }
    }

    pub(crate) fn is_known_function(&self, name: &str) -> Result<bool, CompileError> {
        Ok(self.env.lookup_callable(name, CallableKind::Function)?.is_some()
            || functions::lookup(&normalize_name(name)).is_some()
            || self.custom_function(name).is_some())
    }

    /// Call a user-defined, built-in or registered function with evaluated
    /// arguments.
    pub(crate) fn call_with_values(&mut self, name: &str, args: EvaluatedArgs) -> Result<Value, CompileError> {
        if let Some(callable) = self.env.lookup_callable(name, CallableKind::Function)? {
            return self.call_user_function(&callable, args);
        }
        let normalized = normalize_name(name);
        if let Some(builtin) = functions::lookup(&normalized) {
            let prototypes = functions::prototypes(builtin.name);
            let (prototype, bound) = select_prototype(builtin.name, prototypes, &args)?;
            let mut values = indexmap::IndexMap::new();
            for ((param_name, value), param) in bound.values.into_iter().zip(&prototypes[prototype].params) {
                let value = match (value, &param.default) {
                    (Some(value), _) => value,
                    (None, Some(default)) => self.reduce(default, true)?,
                    (None, None) => Value::Null,
                };
                values.insert(param_name, value);
            }
            let call = Args {
                function: builtin.name,
                prototype,
                values,
                rest: bound.rest.map(|(_, v)| v),
            };
            return (builtin.handler)(self, &call);
        }
        if let Some(custom) = self.custom_function(name) {
            let positional = match &custom.params {
                Some(params) => {
                    let (_, bound) = select_prototype(name, std::slice::from_ref(params), &args)?;
                    let mut values = Vec::with_capacity(bound.values.len());
                    for ((_, value), param) in bound.values.into_iter().zip(&params.params) {
                        values.push(match (value, &param.default) {
                            (Some(value), _) => value,
                            (None, Some(default)) => self.reduce(default, true)?,
                            (None, None) => Value::Null,
                        });
                    }
                    if let Some((_, rest)) = bound.rest {
                        values.extend(rest.as_items());
                    }
                    values
                }
                None => {
                    if let Some(key) = args.named.keys().next() {
                        return Err(CompileError::Argument(format!("{}: No argument named ${}.", name, key)));
                    }
                    args.positional
                }
            };
            return (custom.callback)(&positional);
        }
        Err(CompileError::UndefinedFunction(name.to_string()))
    }

    /// `if($condition, $if-true, $if-false)` only evaluates the branch taken.
    fn lazy_if(&mut self, args: &[CallArg]) -> Result<Value, CompileError> {
        let mut slots: [Option<&Expr>; 3] = [None, None, None];
        let mut position = 0;
        for arg in args {
            let index = match arg.name.as_deref().map(normalize_name).as_deref() {
                Some("condition") => 0,
                Some("if-true") => 1,
                Some("if-false") => 2,
                Some(other) => {
                    return Err(CompileError::Argument(format!("if: No argument named ${}.", other)));
                }
                None => {
                    position += 1;
                    position - 1
                }
            };
            if index > 2 {
                return Err(CompileError::Argument(
                    "if: Only 3 arguments allowed, but more were passed.".to_string(),
                ));
            }
            slots[index] = Some(&arg.value);
        }
        let names = ["condition", "if-true", "if-false"];
        for (slot, name) in slots.iter().zip(names) {
            if slot.is_none() {
                return Err(CompileError::MissingArgument {
                    function: "if".to_string(),
                    name: name.to_string(),
                });
            }
        }
        let [Some(condition), Some(if_true), Some(if_false)] = slots else {
            return Err(CompileError::custom("if: invalid arguments"));
        };
        let branch = if self.reduce(condition, true)?.is_truthy() {
            if_true
        } else {
            if_false
        };
        self.reduce(branch, true)
    }
}

fn unary(op: UnaryOperator, value: Value) -> Result<Value, CompileError> {
    match (op, value) {
        (UnaryOperator::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
        (UnaryOperator::Minus, Value::Number(n)) => Ok(Value::Number(n.with_value(-n.value))),
        (UnaryOperator::Plus, Value::Number(n)) => Ok(Value::Number(n)),
        (UnaryOperator::Minus, other) => Ok(Value::string(format!("-{}", other.to_css(false)?))),
        (UnaryOperator::Plus, other) => Ok(Value::string(format!("+{}", other.to_css(false)?))),
        (UnaryOperator::Slash, other) => Ok(Value::string(format!("/{}", other.to_css(false)?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_operands_force_evaluation() {
        let parse = |s: &str| scss::parser::parse_expression(s).unwrap();
        assert!(!should_eval(&parse("10px")));
        assert!(should_eval(&parse("$a")));
        assert!(should_eval(&parse("1 + 2")));
        assert!(!should_eval(&parse("1px/2px")));
        assert!(should_eval(&parse("1px/$a")));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(
            unary(UnaryOperator::Minus, Value::number(2.0, "px")).unwrap(),
            Value::number(-2.0, "px")
        );
        assert_eq!(unary(UnaryOperator::Not, Value::Null).unwrap(), Value::Boolean(true));
        assert_eq!(
            unary(UnaryOperator::Minus, Value::string("a")).unwrap().inspect(),
            "-a"
        );
    }

    #[test]
    fn shorthand_properties_keep_slashes() {
        assert!(keeps_slashes("font"));
        assert!(!keeps_slashes("width"));
    }
}
