use std::fmt;

use indexmap::IndexMap;
use scss::ast::expr::ListSeparator;

use crate::color::Color;
use crate::error::CompileError;
use crate::number::Number;

/// A value produced by evaluating an expression.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(Number),
    Color(Color),
    /// `quote` is `None` for bare identifiers such as `bold`.
    String {
        text: String,
        quote: Option<char>,
    },
    List(List),
    Map(Map),
    /// Result of `get-function()`.
    Function(String),
}

#[derive(Debug, Clone)]
pub struct List {
    pub items: Vec<Value>,
    pub separator: ListSeparator,
    pub bracketed: bool,
    /// Keyword arguments captured by a rest parameter.
    pub keywords: Option<IndexMap<String, Value>>,
}

impl List {
    pub fn new(items: Vec<Value>, separator: ListSeparator) -> Self {
        List {
            items,
            separator,
            bracketed: false,
            keywords: None,
        }
    }
}

/// Insertion-ordered map; keys compare by their printed form.
#[derive(Debug, Clone, Default)]
pub struct Map {
    entries: IndexMap<String, (Value, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Map::default()
    }

    fn key_of(key: &Value) -> String {
        match key {
            Value::String { text, .. } => text.clone(),
            other => other.inspect(),
        }
    }

    /// Insert or overwrite, keeping the original position of an existing key.
    pub fn insert(&mut self, key: Value, value: Value) {
        let k = Map::key_of(&key);
        match self.entries.get_mut(&k) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(k, (key, value));
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(&Map::key_of(key)).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.entries.contains_key(&Map::key_of(key))
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.entries.shift_remove(&Map::key_of(key)).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    /// `self` with every entry of `other` added, later keys winning.
    pub fn merged(&self, other: &Map) -> Map {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

impl FromIterator<(Value, Value)> for Map {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Wrap `text` in quotes, switching or escaping the quote character when the
/// text contains it.
pub fn quote_text(text: &str, preferred: char) -> String {
    let other = if preferred == '"' { '\'' } else { '"' };
    let quote = if text.contains(preferred) && !text.contains(other) {
        other
    } else {
        preferred
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    let mut escaped = false;
    for c in text.chars() {
        if c == quote && !escaped {
            out.push('\\');
        }
        escaped = c == '\\' && !escaped;
        out.push(c);
    }
    out.push(quote);
    out
}

impl Value {
    pub fn string(text: impl Into<String>) -> Self {
        Value::String {
            text: text.into(),
            quote: None,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Value::String {
            text: text.into(),
            quote: Some('"'),
        }
    }

    pub fn number(value: f64, unit: &str) -> Self {
        Value::Number(Number::new(value, unit))
    }

    pub fn list(items: Vec<Value>, separator: ListSeparator) -> Self {
        Value::List(List::new(items, separator))
    }

    pub fn empty_list() -> Self {
        Value::list(Vec::new(), ListSeparator::Undecided)
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Values that produce no declaration: null, `()`, and empty bare strings.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String { text, quote: None } => text.is_empty(),
            Value::List(list) => !list.bracketed && list.items.iter().all(Value::is_blank),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Number(_) => "number",
            Value::Color(_) => "color",
            Value::String { .. } => "string",
            Value::List(list) if list.keywords.is_some() => "arglist",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
        }
    }

    /// The value viewed as a list: maps become key/value pairs, scalars a
    /// one-element list.
    pub fn as_items(&self) -> Vec<Value> {
        match self {
            Value::List(list) => list.items.clone(),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| Value::list(vec![k.clone(), v.clone()], ListSeparator::Space))
                .collect(),
            other => vec![other.clone()],
        }
    }

    pub fn separator(&self) -> ListSeparator {
        match self {
            Value::List(list) => list.separator,
            Value::Map(map) if !map.is_empty() => ListSeparator::Comma,
            _ => ListSeparator::Space,
        }
    }

    /// Text content of a string, without quotes.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn unquoted(&self) -> Value {
        match self {
            Value::String { text, .. } => Value::string(text.clone()),
            other => other.clone(),
        }
    }

    /// CSS text for output.
    pub fn to_css(&self, compressed: bool) -> Result<String, CompileError> {
        match self {
            Value::Null => Ok(String::new()),
            Value::Boolean(b) => Ok(b.to_string()),
            Value::Number(n) => n.to_css(compressed),
            Value::Color(c) => Ok(c.to_css(compressed)),
            Value::String { text, quote: None } => Ok(text.clone()),
            Value::String {
                text,
                quote: Some(q),
            } => Ok(quote_text(text, *q)),
            Value::List(list) => {
                let sep = match list.separator {
                    ListSeparator::Comma if compressed => ",",
                    ListSeparator::Comma => ", ",
                    _ => " ",
                };
                let mut parts = Vec::with_capacity(list.items.len());
                for item in &list.items {
                    if item.is_null() {
                        continue;
                    }
                    let text = item.to_css(compressed)?;
                    if text.is_empty() && !matches!(item, Value::String { quote: Some(_), .. }) {
                        continue;
                    }
                    parts.push(text);
                }
                let body = parts.join(sep);
                Ok(if list.bracketed {
                    format!("[{}]", body)
                } else {
                    body
                })
            }
            Value::Map(_) => Err(CompileError::InvalidCss(self.inspect())),
            Value::Function(_) => Err(CompileError::InvalidCss(self.inspect())),
        }
    }

    /// Sass source-like representation used by `inspect()`, `@debug` and
    /// error messages.
    pub fn inspect(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String {
                text,
                quote: Some(q),
            } => quote_text(text, *q),
            Value::List(list) => {
                if list.items.is_empty() {
                    return if list.bracketed { "[]" } else { "()" }.to_string();
                }
                let sep = match list.separator {
                    ListSeparator::Comma => ", ",
                    _ => " ",
                };
                let items: Vec<String> = list
                    .items
                    .iter()
                    .map(|item| match item {
                        Value::List(inner)
                            if inner.items.len() > 1
                                && !inner.bracketed
                                && (inner.separator == ListSeparator::Comma
                                    || list.separator != ListSeparator::Comma) =>
                        {
                            format!("({})", item.inspect())
                        }
                        other => other.inspect(),
                    })
                    .collect();
                let body = items.join(sep);
                if list.bracketed {
                    format!("[{}]", body)
                } else if list.items.len() == 1 && list.separator == ListSeparator::Comma {
                    format!("({},)", body)
                } else {
                    body
                }
            }
            Value::Map(map) => {
                let entries: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.inspect(), v.inspect()))
                    .collect();
                format!("({})", entries.join(", "))
            }
            Value::Function(name) => format!("get-function(\"{}\")", name),
            other => other.to_css(false).unwrap_or_default(),
        }
    }

    /// Sass `==`: numbers convert units, strings ignore quoting.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.equals(b),
            (Value::Color(a), Value::Color(b)) => a.equals(b),
            (Value::String { text: a, .. }, Value::String { text: b, .. }) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.items.len() == b.items.len()
                    && a.bracketed == b.bracketed
                    && (a.items.len() < 2 || a.separator == b.separator)
                    && a.items.iter().zip(&b.items).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.equals(w)))
            }
            (Value::List(list), Value::Map(map)) | (Value::Map(map), Value::List(list)) => {
                list.items.is_empty() && map.is_empty()
            }
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keys_compare_by_printed_form() {
        let mut map = Map::new();
        map.insert(Value::string("a"), Value::number(1.0, ""));
        map.insert(Value::quoted("a"), Value::number(2.0, ""));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Value::string("a")), Some(&Value::number(2.0, "")));
    }

    #[test]
    fn lists_skip_nulls_in_css() {
        let list = Value::list(
            vec![Value::string("a"), Value::Null, Value::number(1.0, "px")],
            ListSeparator::Space,
        );
        assert_eq!(list.to_css(false).unwrap(), "a 1px");
        let comma = Value::list(vec![Value::string("a"), Value::string("b")], ListSeparator::Comma);
        assert_eq!(comma.to_css(true).unwrap(), "a,b");
    }

    #[test]
    fn inspect_shows_structure() {
        let inner = Value::list(vec![Value::string("a"), Value::string("b")], ListSeparator::Space);
        let outer = Value::list(vec![inner, Value::string("c")], ListSeparator::Space);
        assert_eq!(outer.inspect(), "(a b) c");
        assert_eq!(Value::empty_list().inspect(), "()");
        let mut map = Map::new();
        map.insert(Value::string("k"), Value::quoted("v"));
        assert_eq!(Value::Map(map).inspect(), "(k: \"v\")");
    }

    #[test]
    fn quoting_avoids_embedded_quotes() {
        assert_eq!(quote_text("say \"hi\"", '"'), "'say \"hi\"'");
        assert_eq!(quote_text("a'b\"c", '"'), "\"a'b\\\"c\"");
    }

    #[test]
    fn maps_are_invalid_css() {
        assert!(Value::Map(Map::new()).to_css(false).is_err());
        assert!(!Value::Null.is_truthy());
        assert!(Value::number(0.0, "").is_truthy());
    }
}
