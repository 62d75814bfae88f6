//! Media query merging for nested `@media` blocks.

/// One evaluated media query part.
#[derive(Debug, Clone, PartialEq)]
pub enum CssMediaPart {
    /// `[type]` or `[modifier, type]`, e.g. `["not", "print"]`.
    Type(Vec<String>),
    Feature { name: String, value: Option<String> },
    /// Text that could not be split into parts.
    Raw(String),
}

/// Parts ANDed together.
pub type CssMediaQuery = Vec<CssMediaPart>;

fn split_type(ty: &[String]) -> (String, String) {
    match ty {
        [modifier, name, ..] => (modifier.to_ascii_lowercase(), name.to_ascii_lowercase()),
        [name] => (String::new(), name.to_ascii_lowercase()),
        [] => (String::new(), String::new()),
    }
}

/// AND two media types. `None` means the combination can never match.
pub fn merge_media_types(first: &[String], second: &[String]) -> Option<Vec<String>> {
    if first.is_empty() {
        return Some(second.to_vec());
    }
    if second.is_empty() {
        return Some(first.to_vec());
    }
    let (m1, t1) = split_type(first);
    let (m2, t2) = split_type(second);

    if (m1 == "not") ^ (m2 == "not") {
        if t1 == t2 {
            return None;
        }
        return Some(if m1 == "not" {
            keep_modifier(m2, t2)
        } else {
            keep_modifier(m1, t1)
        });
    }
    if m1 == "not" && m2 == "not" {
        // "neither screen nor print" has no CSS spelling.
        if t1 != t2 {
            return None;
        }
        return Some(vec!["not".to_string(), t1]);
    }
    if t1 != t2 {
        return None;
    }
    Some(keep_modifier(if m1.is_empty() { m2 } else { m1 }, t1))
}

fn keep_modifier(modifier: String, ty: String) -> Vec<String> {
    if modifier.is_empty() {
        vec![ty]
    } else {
        vec![modifier, ty]
    }
}

/// Every parent query ANDed with every child query.
pub fn multiply_queries(parent: &[CssMediaQuery], child: &[CssMediaQuery]) -> Vec<CssMediaQuery> {
    let mut out = Vec::with_capacity(parent.len() * child.len());
    for p in parent {
        for c in child {
            let mut query = p.clone();
            query.extend(c.iter().cloned());
            out.push(query);
        }
    }
    out
}

fn render_part(part: &CssMediaPart, assign_separator: &str) -> String {
    match part {
        CssMediaPart::Type(ty) => ty.join(" "),
        CssMediaPart::Feature { name, value: Some(value) } => {
            format!("({}{}{})", name, assign_separator, value)
        }
        CssMediaPart::Feature { name, value: None } => format!("({})", name),
        CssMediaPart::Raw(text) => text.clone(),
    }
}

/// Render a merged query list to the text following `@media`. Each returned
/// entry becomes one `@media` block; an empty result means nothing can match.
pub fn compile_media_query(queries: &[CssMediaQuery], compressed: bool) -> Vec<String> {
    let tag_separator = if compressed { "," } else { ", " };
    let assign_separator = if compressed { ":" } else { ": " };

    let mut out = Vec::new();
    let mut current = String::new();
    // What to print when no query survives: `Some("")` is a bare `@media`,
    // `None` drops the block.
    let mut default = Some(String::new());

    let flush = |current: &mut String, ty: &Option<Vec<String>>, parts: &mut Vec<String>| {
        if let Some(ty) = ty {
            parts.insert(0, ty.join(" "));
        }
        if !parts.is_empty() {
            if !current.is_empty() {
                current.push_str(tag_separator);
            }
            current.push_str(&parts.join(" and "));
        }
    };

    'queries: for query in queries {
        let mut ty: Option<Vec<String>> = None;
        let mut parts: Vec<String> = Vec::new();
        let type_only = query.iter().all(|q| matches!(q, CssMediaPart::Type(_)));

        for part in query {
            match part {
                CssMediaPart::Type(new_type) => {
                    let has_not = |t: &[String]| t.iter().any(|w| w.eq_ignore_ascii_case("not"));
                    // Mixing `not` with features is left unmerged.
                    if !type_only
                        && (has_not(new_type.as_slice()) || ty.as_deref().is_some_and(has_not))
                    {
                        flush(&mut current, &ty, &mut parts);
                        if !current.is_empty() {
                            out.push(std::mem::take(&mut current));
                        }
                        ty = None;
                        parts.clear();
                    }
                    let is_all = new_type.len() == 1 && new_type[0].eq_ignore_ascii_case("all");
                    if is_all {
                        if default.is_some() {
                            default = Some("all".to_string());
                        }
                        continue;
                    }
                    ty = match ty.take() {
                        Some(existing) => match merge_media_types(&existing, new_type) {
                            Some(merged) => Some(merged),
                            None => {
                                default = None;
                                continue 'queries;
                            }
                        },
                        None => Some(new_type.clone()),
                    };
                }
                other => parts.push(render_part(other, assign_separator)),
            }
        }
        flush(&mut current, &ty, &mut parts);
    }

    if !current.is_empty() {
        out.push(current);
    }
    if out.is_empty() {
        if let Some(default) = default {
            out.push(default);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(words: &[&str]) -> CssMediaPart {
        CssMediaPart::Type(words.iter().map(|w| w.to_string()).collect())
    }

    fn feature(name: &str, value: &str) -> CssMediaPart {
        CssMediaPart::Feature {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    #[test]
    fn contradictory_types_drop_the_block() {
        let merged = multiply_queries(&[vec![ty(&["screen"])]], &[vec![ty(&["not", "screen"])]]);
        assert!(compile_media_query(&merged, false).is_empty());
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn negated_type_yields_the_other_type() {
        assert_eq!(
            merge_media_types(&words(&["not", "print"]), &words(&["screen"])),
            Some(words(&["screen"]))
        );
        assert_eq!(
            merge_media_types(&words(&["not", "print"]), &words(&["not", "print"])),
            Some(words(&["not", "print"]))
        );
        assert_eq!(
            merge_media_types(&words(&["not", "print"]), &words(&["not", "screen"])),
            None
        );
    }

    #[test]
    fn features_are_anded() {
        let merged = multiply_queries(
            &[vec![feature("min-width", "10px")]],
            &[vec![feature("max-width", "20px")]],
        );
        assert_eq!(
            compile_media_query(&merged, false),
            vec!["(min-width: 10px) and (max-width: 20px)".to_string()]
        );
        assert_eq!(
            compile_media_query(&merged, true),
            vec!["(min-width:10px) and (max-width:20px)".to_string()]
        );
    }

    #[test]
    fn type_precedes_features_and_lists_join() {
        let queries = vec![
            vec![ty(&["only", "screen"]), feature("color", "8")],
            vec![ty(&["print"])],
        ];
        assert_eq!(
            compile_media_query(&queries, false),
            vec!["only screen and (color: 8), print".to_string()]
        );
    }

    #[test]
    fn all_is_absorbed() {
        let merged = multiply_queries(&[vec![ty(&["all"])]], &[vec![ty(&["print"])]]);
        assert_eq!(compile_media_query(&merged, false), vec!["print".to_string()]);
        assert_eq!(compile_media_query(&[vec![ty(&["all"])]], false), vec!["all".to_string()]);
    }
}
