use crate::arguments::Args;
use crate::error::CompileError;
use crate::executor::Executor;
use crate::runtime_value::Value;

use super::{int_arg, number, Registry};

pub(super) fn register(registry: &mut Registry) {
    registry.add("quote", &["($string)"], quote);
    registry.add("unquote", &["($string)"], unquote);
    registry.add("str-length", &["($string)"], str_length);
    registry.add("str-index", &["($string, $substring)"], str_index);
    registry.add("str-insert", &["($string, $insert, $index)"], str_insert);
    registry.add("str-slice", &["($string, $start-at, $end-at: -1)"], str_slice);
    registry.add("to-upper-case", &["($string)"], to_upper_case);
    registry.add("to-lower-case", &["($string)"], to_lower_case);
}

/// Keep the quoting of `template` for a derived string.
fn like(template: &Value, text: String) -> Value {
    match template {
        Value::String { quote, .. } => Value::String { text, quote: *quote },
        _ => Value::string(text),
    }
}

/// Zero-based character offset of a one-based Sass index. Negative indices
/// count from the end.
fn char_offset(index: i64, len: usize, allow_negative: bool) -> i64 {
    let len = len as i64;
    if index == 0 {
        0
    } else if index > 0 {
        (index - 1).min(len)
    } else {
        let offset = len + index;
        if offset < 0 && !allow_negative { 0 } else { offset }
    }
}

fn quote(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    match args.get("string") {
        Value::String { text, .. } => Ok(Value::quoted(text.clone())),
        other => Ok(Value::quoted(other.to_css(exec.compressed)?)),
    }
}

fn unquote(exec: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    match args.get("string") {
        Value::String { text, .. } => Ok(Value::string(text.clone())),
        other => {
            exec.warn(
                format!("Passing {}, a non-string value, to unquote() is deprecated.", other.inspect()),
                true,
            );
            Ok(other.clone())
        }
    }
}

fn str_length(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    Ok(number(args.string("string")?.chars().count() as f64, ""))
}

fn str_index(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let haystack = args.string("string")?;
    let needle = args.string("substring")?;
    Ok(match haystack.find(needle) {
        Some(byte) => number((haystack[..byte].chars().count() + 1) as f64, ""),
        None => Value::Null,
    })
}

fn str_insert(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let text = args.string("string")?;
    let insert = args.string("insert")?;
    let len = text.chars().count();
    let mut index = int_arg(args, "index")?;
    if index < 0 {
        // Negative indices insert after the addressed character.
        index = len as i64 + index + 2;
    }
    let at = char_offset(index, len, false).max(0) as usize;
    let mut out: String = text.chars().take(at).collect();
    out.push_str(insert);
    out.extend(text.chars().skip(at));
    Ok(like(args.get("string"), out))
}

fn str_slice(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let text = args.string("string")?;
    let len = text.chars().count();
    let start = char_offset(int_arg(args, "start-at")?, len, false);
    let mut end = char_offset(int_arg(args, "end-at")?, len, true);
    if end == len as i64 {
        end -= 1;
    }
    if end < start || len == 0 {
        return Ok(like(args.get("string"), String::new()));
    }
    let out: String = text
        .chars()
        .skip(start as usize)
        .take((end - start + 1) as usize)
        .collect();
    Ok(like(args.get("string"), out))
}

fn to_upper_case(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let text = args.string("string")?.to_ascii_uppercase();
    Ok(like(args.get("string"), text))
}

fn to_lower_case(_: &mut Executor<'_>, args: &Args) -> Result<Value, CompileError> {
    let text = args.string("string")?.to_ascii_lowercase();
    Ok(like(args.get("string"), text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sass_indices() {
        assert_eq!(char_offset(1, 5, false), 0);
        assert_eq!(char_offset(9, 5, false), 5);
        assert_eq!(char_offset(-1, 5, true), 4);
        assert_eq!(char_offset(-9, 5, false), 0);
    }

    #[test]
    fn derived_strings_keep_quotes() {
        assert_eq!(like(&Value::quoted("a"), "b".into()).inspect(), "\"b\"");
        assert_eq!(like(&Value::string("a"), "b".into()).inspect(), "b");
    }
}
