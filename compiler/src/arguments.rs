//! Call-site argument evaluation and parameter binding.

use indexmap::IndexMap;
use scss::ast::expr::{CallArg, ListSeparator, Params};

use crate::color::Color;
use crate::environment::normalize_name;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::number::Number;
use crate::runtime_value::{List, Value};

/// Arguments after evaluation and splat expansion.
#[derive(Debug, Clone, Default)]
pub struct EvaluatedArgs {
    pub positional: Vec<Value>,
    pub named: IndexMap<String, Value>,
}

impl EvaluatedArgs {
    pub fn positional(values: Vec<Value>) -> Self {
        EvaluatedArgs {
            positional: values,
            named: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand `value...` into positional and keyword arguments.
    pub fn splat(&mut self, value: Value) {
        match value {
            Value::Map(map) => {
                for (key, value) in map.iter() {
                    let name = key.as_str().map(str::to_string).unwrap_or_else(|| key.inspect());
                    self.named.insert(normalize_name(&name), value.clone());
                }
            }
            Value::List(list) => {
                self.positional.extend(list.items);
                if let Some(keywords) = list.keywords {
                    self.named.extend(keywords);
                }
            }
            other => self.positional.push(other),
        }
    }
}

/// Parameters matched to arguments. `None` means the parameter takes its
/// default, evaluated later in the callee's scope.
#[derive(Debug, Clone)]
pub struct Bound {
    pub values: Vec<(String, Option<Value>)>,
    pub rest: Option<(String, Value)>,
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

/// Match `args` against `params`.
pub fn bind(function: &str, params: &Params, mut args: EvaluatedArgs) -> Result<Bound, CompileError> {
    let declared = params.params.len();
    if args.positional.len() > declared && params.rest.is_none() {
        return Err(CompileError::Argument(format!(
            "{}: Only {} allowed, but {} passed.",
            function,
            plural(declared, "argument"),
            args.positional.len()
        )));
    }

    let mut positional = std::mem::take(&mut args.positional).into_iter();
    let mut values = Vec::with_capacity(declared);
    for param in &params.params {
        let name = normalize_name(&param.name);
        let by_name = args.named.shift_remove(&name);
        match positional.next() {
            Some(value) => {
                if by_name.is_some() {
                    return Err(CompileError::Argument(format!(
                        "{}: argument ${} was passed both by position and by name.",
                        function, param.name
                    )));
                }
                values.push((name, Some(value)));
            }
            None => match by_name {
                Some(value) => values.push((name, Some(value))),
                None if param.default.is_some() => values.push((name, None)),
                None => {
                    return Err(CompileError::MissingArgument {
                        function: function.to_string(),
                        name: param.name.clone(),
                    });
                }
            },
        }
    }

    let remaining: Vec<Value> = positional.collect();
    let rest = match &params.rest {
        Some(rest_name) => {
            let mut list = List::new(remaining, ListSeparator::Comma);
            list.keywords = Some(std::mem::take(&mut args.named));
            Some((normalize_name(rest_name), Value::List(list)))
        }
        None => None,
    };

    if let Some(name) = args.named.keys().next() {
        return Err(CompileError::Argument(format!(
            "{}: No argument named ${}.",
            function, name
        )));
    }
    Ok(Bound { values, rest })
}

/// Pick the first prototype `args` bind to. When none does, the error of
/// the prototype whose arity is closest to the call is reported, ties going
/// to the one with more parameters.
pub fn select_prototype(
    function: &str,
    prototypes: &[Params],
    args: &EvaluatedArgs,
) -> Result<(usize, Bound), CompileError> {
    let mut first_error = None;
    for (index, params) in prototypes.iter().enumerate() {
        match bind(function, params, args.clone()) {
            Ok(bound) => return Ok((index, bound)),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    let count = args.len() as isize;
    let closest = prototypes.iter().enumerate().min_by(|(_, a), (_, b)| {
        let da = (a.params.len() as isize - count).abs();
        let db = (b.params.len() as isize - count).abs();
        da.cmp(&db).then(b.params.len().cmp(&a.params.len()))
    });
    match closest {
        Some((_, params)) => match bind(function, params, args.clone()) {
            Err(err) => Err(err),
            Ok(_) => Err(first_error.unwrap_or_else(|| CompileError::custom("no matching prototype"))),
        },
        None => Err(first_error.unwrap_or_else(|| CompileError::custom("no matching prototype"))),
    }
}

/// Bound arguments handed to a built-in function.
#[derive(Debug)]
pub struct Args {
    pub function: &'static str,
    /// Index of the matched prototype.
    pub prototype: usize,
    pub values: IndexMap<String, Value>,
    pub rest: Option<Value>,
}

impl Args {
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&Value::Null)
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn number(&self, name: &str) -> Result<&Number, CompileError> {
        match self.get(name) {
            Value::Number(n) => Ok(n),
            other => Err(CompileError::type_error(name, other, "number")),
        }
    }

    pub fn color(&self, name: &str) -> Result<Color, CompileError> {
        coerce_color(self.get(name)).ok_or_else(|| CompileError::type_error(name, self.get(name), "color"))
    }

    pub fn string(&self, name: &str) -> Result<&str, CompileError> {
        match self.get(name) {
            Value::String { text, .. } => Ok(text),
            other => Err(CompileError::type_error(name, other, "string")),
        }
    }

    pub fn map(&self, name: &str) -> Result<crate::runtime_value::Map, CompileError> {
        match self.get(name) {
            Value::Map(map) => Ok(map.clone()),
            Value::List(list) if list.items.is_empty() => Ok(crate::runtime_value::Map::new()),
            other => Err(CompileError::type_error(name, other, "map")),
        }
    }

    /// Rest arguments as a plain list of values.
    pub fn rest_items(&self) -> Vec<Value> {
        match &self.rest {
            Some(Value::List(list)) => list.items.clone(),
            _ => Vec::new(),
        }
    }

    pub fn rest_keywords(&self) -> IndexMap<String, Value> {
        match &self.rest {
            Some(Value::List(list)) => list.keywords.clone().unwrap_or_default(),
            _ => IndexMap::new(),
        }
    }
}

/// Colors, and bare color names such as `red`.
pub fn coerce_color(value: &Value) -> Option<Color> {
    match value {
        Value::Color(c) => Some(c.clone()),
        Value::String { text, quote: None } => Color::from_name(text),
        _ => None,
    }
}

impl Executor<'_> {
    /// Evaluate call-site arguments in the current scope.
    pub(crate) fn evaluate_args(&mut self, args: &[CallArg]) -> Result<EvaluatedArgs, CompileError> {
        let mut out = EvaluatedArgs::default();
        for arg in args {
            let value = self.reduce(&arg.value, true)?;
            if arg.splat {
                out.splat(value);
            } else if let Some(name) = &arg.name {
                out.named.insert(normalize_name(name), value);
            } else {
                if !out.named.is_empty() {
                    return Err(CompileError::Argument(
                        "Positional arguments must come before keyword arguments.".to_string(),
                    ));
                }
                out.positional.push(value);
            }
        }
        Ok(out)
    }

    /// Define bound parameters as locals of the current frame, evaluating
    /// missing ones from their defaults.
    pub(crate) fn define_params(&mut self, params: &Params, bound: Bound) -> Result<(), CompileError> {
        for ((name, value), param) in bound.values.into_iter().zip(&params.params) {
            let value = match (value, &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.reduce(default, true)?,
                (None, None) => Value::Null,
            };
            self.env.define_local(&name, value);
        }
        if let Some((name, value)) = bound.rest {
            self.env.define_local(&name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(text: &str) -> Params {
        scss::parser::parse_params(text).unwrap()
    }

    fn num(v: f64) -> Value {
        Value::number(v, "")
    }

    fn bound_value(bound: &Bound, name: &str) -> Option<Value> {
        bound
            .values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.clone())
    }

    #[test]
    fn positional_named_and_rest() {
        let p = params("($a, $b: 2, $rest...)");

        let b = bind("f", &p, EvaluatedArgs::positional(vec![num(1.0)])).unwrap();
        assert_eq!(bound_value(&b, "a"), Some(num(1.0)));
        assert_eq!(bound_value(&b, "b"), None);

        let mut args = EvaluatedArgs::positional(vec![num(1.0)]);
        args.named.insert("b".into(), num(9.0));
        let b = bind("f", &p, args).unwrap();
        assert_eq!(bound_value(&b, "b"), Some(num(9.0)));

        let b = bind("f", &p, EvaluatedArgs::positional(vec![num(1.0), num(2.0), num(3.0), num(4.0)])).unwrap();
        let (_, rest) = b.rest.unwrap();
        assert_eq!(rest.as_items(), vec![num(3.0), num(4.0)]);
    }

    #[test]
    fn missing_and_extra_arguments() {
        let p = params("($a, $b: 2, $rest...)");
        let mut args = EvaluatedArgs::default();
        args.named.insert("b".into(), num(9.0));
        let err = bind("f", &p, args).unwrap_err();
        assert!(err.to_string().contains("missing argument $a"));

        let p = params("($a)");
        let err = bind("f", &p, EvaluatedArgs::positional(vec![num(1.0), num(2.0)])).unwrap_err();
        assert!(err.to_string().contains("Only 1 argument allowed, but 2 passed."));

        let mut args = EvaluatedArgs::positional(vec![num(1.0)]);
        args.named.insert("a".into(), num(2.0));
        assert!(bind("f", &p, args).unwrap_err().to_string().contains("both by position and by name"));

        let mut args = EvaluatedArgs::positional(vec![num(1.0)]);
        args.named.insert("z".into(), num(2.0));
        assert!(bind("f", &p, args).unwrap_err().to_string().contains("No argument named $z"));
    }

    #[test]
    fn splat_expands_lists_and_maps() {
        let mut args = EvaluatedArgs::default();
        args.splat(Value::list(vec![num(1.0), num(2.0)], ListSeparator::Comma));
        let mut map = crate::runtime_value::Map::new();
        map.insert(Value::string("b_c"), num(3.0));
        args.splat(Value::Map(map));
        assert_eq!(args.positional.len(), 2);
        assert_eq!(args.named.get("b-c"), Some(&num(3.0)));
    }

    #[test]
    fn prototype_selection_prefers_first_match() {
        let protos = vec![params("($red, $green, $blue)"), params("($color)")];
        let (index, _) = select_prototype("rgb", &protos, &EvaluatedArgs::positional(vec![num(1.0)])).unwrap();
        assert_eq!(index, 1);
        let err = select_prototype("rgb", &protos, &EvaluatedArgs::positional(vec![num(1.0), num(2.0)])).unwrap_err();
        assert!(err.to_string().contains("missing argument $blue"));
    }
}
