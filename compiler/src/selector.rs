//! Selector algebra: parent (`&`) resolution on structured selectors, the flat
//! "parts" form used by `@extend` and output, and the operations behind the
//! `selector-*` functions.

use scss::ast::selector::{
    ComplexSelector, CompoundSelector, PseudoArgument, SelectorComponent, SelectorList,
    SimpleSelector,
};

use crate::error::CompileError;

/// Simple selectors of one compound, e.g. `["a", ".b", ":hover"]`; a
/// combinator is a compound of its own (`[">"]`).
pub type Compound = Vec<String>;

/// One complex selector in parts form.
pub type Parts = Vec<Compound>;

/// Passes of parent substitution before giving up on a selector.
const MAX_RESOLVE_PASSES: usize = 16;

fn selector_error(selector: impl ToString, message: &str) -> CompileError {
    CompileError::InvalidSelector {
        selector: selector.to_string(),
        message: message.to_string(),
    }
}

/// Join `child` onto `parent`. Complex selectors containing `&` substitute it
/// in place; others are prefixed with the parent when `implicit` is set and
/// left alone otherwise.
pub fn join(
    parent: &SelectorList,
    child: &SelectorList,
    implicit: bool,
) -> Result<SelectorList, CompileError> {
    let mut out = Vec::new();
    for complex in &child.selectors {
        if complex.has_parent_ref() {
            for p in &parent.selectors {
                let mut resolved = substitute(complex, p)?;
                let mut passes = 0;
                while resolved.has_parent_ref() {
                    passes += 1;
                    if passes > MAX_RESOLVE_PASSES {
                        return Err(selector_error(complex, "parent selector could not be resolved"));
                    }
                    resolved = substitute(&resolved, p)?;
                }
                out.push(resolved);
            }
        } else if implicit {
            for p in &parent.selectors {
                let mut components = p.components.clone();
                components.extend(complex.components.iter().cloned());
                out.push(ComplexSelector { components });
            }
        } else {
            out.push(complex.clone());
        }
    }
    Ok(SelectorList::new(out))
}

/// Resolve a stack of nested selector lists, outermost first. `base` is an
/// `@at-root` self-parent: it only replaces explicit `&`.
pub fn resolve_levels(
    base: Option<&SelectorList>,
    levels: &[&SelectorList],
) -> Result<Option<SelectorList>, CompileError> {
    let mut acc: Option<SelectorList> = base.cloned();
    let mut implicit = base.is_none();
    for level in levels {
        acc = Some(match acc {
            None => {
                if level.has_parent_ref() {
                    return Err(selector_error(
                        level,
                        "top-level selectors may not contain the parent selector \"&\"",
                    ));
                }
                (*level).clone()
            }
            Some(parent) => join(&parent, level, implicit)?,
        });
        implicit = true;
    }
    Ok(acc)
}

fn append_suffix(simple: &mut SimpleSelector, suffix: &str) -> bool {
    match simple {
        SimpleSelector::Class(name)
        | SimpleSelector::Id(name)
        | SimpleSelector::Type(name)
        | SimpleSelector::Placeholder(name) => {
            name.push_str(suffix);
            true
        }
        _ => false,
    }
}

fn substitute_in_argument(argument: &PseudoArgument, parent: &ComplexSelector) -> Result<PseudoArgument, CompileError> {
    let single = SelectorList::new(vec![parent.clone()]);
    Ok(match argument {
        PseudoArgument::Selector(list) if list.has_parent_ref() => {
            PseudoArgument::Selector(join(&single, list, false)?)
        }
        PseudoArgument::Nth { formula, of: Some(list) } if list.has_parent_ref() => PseudoArgument::Nth {
            formula: formula.clone(),
            of: Some(join(&single, list, false)?),
        },
        other => other.clone(),
    })
}

/// Replace every `&` in `complex` with `parent`.
fn substitute(complex: &ComplexSelector, parent: &ComplexSelector) -> Result<ComplexSelector, CompileError> {
    let mut components = Vec::with_capacity(complex.components.len() + parent.components.len());
    for component in &complex.components {
        let compound = match component {
            SelectorComponent::Combinator(c) => {
                components.push(SelectorComponent::Combinator(*c));
                continue;
            }
            SelectorComponent::Compound(compound) => compound,
        };

        let mut simples = Vec::with_capacity(compound.simples.len());
        for simple in &compound.simples {
            simples.push(match simple {
                SimpleSelector::Pseudo {
                    name,
                    element,
                    argument: Some(argument),
                } => SimpleSelector::Pseudo {
                    name: name.clone(),
                    element: *element,
                    argument: Some(substitute_in_argument(argument, parent)?),
                },
                other => other.clone(),
            });
        }

        if simples
            .iter()
            .skip(1)
            .any(|s| matches!(s, SimpleSelector::Parent { .. }))
        {
            return Err(selector_error(
                complex,
                "\"&\" may only be used at the beginning of a compound selector",
            ));
        }

        match simples.first() {
            Some(SimpleSelector::Parent { suffix }) => {
                let suffix = suffix.clone();
                let rest: Vec<SimpleSelector> = simples.drain(1..).collect();
                let mut replacement = parent.components.clone();
                match replacement.last_mut() {
                    Some(SelectorComponent::Compound(last)) => {
                        if let Some(suffix) = &suffix {
                            let ok = last
                                .simples
                                .last_mut()
                                .is_some_and(|s| append_suffix(s, suffix));
                            if !ok {
                                return Err(selector_error(
                                    parent,
                                    &format!("invalid parent selector for suffix \"{}\"", suffix),
                                ));
                            }
                        }
                        last.simples.extend(rest);
                    }
                    _ if suffix.is_none() && rest.is_empty() => {}
                    _ => {
                        return Err(selector_error(parent, "invalid parent selector"));
                    }
                }
                components.extend(replacement);
            }
            _ => components.push(SelectorComponent::Compound(CompoundSelector::new(simples))),
        }
    }
    Ok(ComplexSelector { components })
}

// ---------------------------------------------------------------------------
// Parts form
// ---------------------------------------------------------------------------

pub fn to_parts(complex: &ComplexSelector) -> Parts {
    complex
        .components
        .iter()
        .map(|component| match component {
            SelectorComponent::Compound(compound) => {
                compound.simples.iter().map(|s| s.to_string()).collect()
            }
            SelectorComponent::Combinator(c) => vec![c.symbol().to_string()],
        })
        .collect()
}

pub fn list_to_parts(list: &SelectorList) -> Vec<Parts> {
    list.selectors.iter().map(to_parts).collect()
}

pub fn render(parts: &Parts) -> String {
    parts
        .iter()
        .map(|compound| compound.concat())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_list(list: &[Parts], separator: &str) -> String {
    list.iter().map(render).collect::<Vec<_>>().join(separator)
}

pub fn is_combinator(part: &str) -> bool {
    matches!(part, ">" | "+" | "~")
}

pub fn has_placeholder(parts: &Parts) -> bool {
    parts
        .iter()
        .any(|compound| compound.iter().any(|p| p.starts_with('%')))
}

// ---------------------------------------------------------------------------
// selector-* operations
// ---------------------------------------------------------------------------

/// `selector-append(".a", "-b")` → `.a-b`; `selector-append(".a", ".b")` → `.a.b`.
pub fn append(parent: &SelectorList, child_text: &str) -> Result<SelectorList, CompileError> {
    let mut out = Vec::new();
    for p in &parent.selectors {
        let text = format!("&{}", child_text.trim());
        let child = scss::parser::parse_selector_list(&text)
            .map_err(|e| selector_error(child_text, &e.message))?;
        for complex in &child.selectors {
            out.push(substitute(complex, p)?);
        }
    }
    Ok(SelectorList::new(out))
}

fn is_type_part(part: &str) -> bool {
    part.starts_with(|c: char| c.is_ascii_alphabetic() || c == '*')
}

/// Unify two compounds into one matching both, or `None` when impossible.
pub fn unify_compounds(a: &Compound, b: &Compound) -> Option<Compound> {
    let type_a = a.iter().find(|p| is_type_part(p));
    let type_b = b.iter().find(|p| is_type_part(p));
    let ty = match (type_a, type_b) {
        (Some(x), Some(y)) if x == "*" => Some(y.clone()),
        (Some(x), Some(y)) if y == "*" || x == y => Some(x.clone()),
        (Some(_), Some(_)) => return None,
        (x, y) => x.or(y).cloned(),
    };
    let id_a = a.iter().find(|p| p.starts_with('#'));
    let id_b = b.iter().find(|p| p.starts_with('#'));
    if let (Some(x), Some(y)) = (id_a, id_b) {
        if x != y {
            return None;
        }
    }
    let mut out: Compound = ty.into_iter().collect();
    let mut pseudo_elements = Vec::new();
    for part in a.iter().chain(b.iter()) {
        if is_type_part(part) || out.contains(part) || pseudo_elements.contains(part) {
            continue;
        }
        if part.starts_with("::") {
            pseudo_elements.push(part.clone());
        } else {
            out.push(part.clone());
        }
    }
    if pseudo_elements.len() > 1 {
        return None;
    }
    out.extend(pseudo_elements);
    Some(out)
}

/// Selectors matching elements matched by both `a` and `b`.
pub fn unify(a: &[Parts], b: &[Parts]) -> Vec<Parts> {
    let mut out = Vec::new();
    for x in a {
        for y in b {
            let (Some((last_x, prefix_x)), Some((last_y, prefix_y))) = (x.split_last(), y.split_last()) else {
                continue;
            };
            let Some(unified) = unify_compounds(last_x, last_y) else {
                continue;
            };
            match (prefix_x.is_empty(), prefix_y.is_empty()) {
                (true, true) => out.push(vec![unified]),
                (false, true) => out.push(prefix_x.iter().cloned().chain([unified]).collect()),
                (true, false) => out.push(prefix_y.iter().cloned().chain([unified]).collect()),
                (false, false) => {
                    out.push(
                        prefix_x
                            .iter()
                            .chain(prefix_y)
                            .cloned()
                            .chain([unified.clone()])
                            .collect(),
                    );
                    out.push(prefix_y.iter().chain(prefix_x).cloned().chain([unified]).collect());
                }
            }
        }
    }
    out
}

fn compound_is_superselector(sup: &Compound, sub: &Compound) -> bool {
    sup.iter().all(|p| p == "*" || sub.contains(p))
}

/// Whether `sup` matches every element `sub` matches. Descendant and child
/// combinators are checked structurally; sibling combinators must line up.
pub fn complex_is_superselector(sup: &Parts, sub: &Parts) -> bool {
    let (Some((sup_last, sup_prefix)), Some((sub_last, sub_prefix))) = (sup.split_last(), sub.split_last()) else {
        return false;
    };
    if !compound_is_superselector(sup_last, sub_last) {
        return false;
    }
    let mut j = sub_prefix.len();
    let mut i = sup_prefix.len();
    while i > 0 {
        let needle = &sup_prefix[i - 1];
        if needle.len() == 1 && is_combinator(&needle[0]) {
            if j == 0 || sub_prefix[j - 1] != *needle {
                return false;
            }
            i -= 1;
            j -= 1;
            continue;
        }
        let mut found = false;
        while j > 0 {
            j -= 1;
            let candidate = &sub_prefix[j];
            if candidate.len() == 1 && is_combinator(&candidate[0]) {
                continue;
            }
            if compound_is_superselector(needle, candidate) {
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
        i -= 1;
    }
    true
}

pub fn is_superselector(sup: &[Parts], sub: &[Parts]) -> bool {
    sub.iter()
        .all(|s| sup.iter().any(|candidate| complex_is_superselector(candidate, s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scss::parser::parse_selector_list;

    fn sel(text: &str) -> SelectorList {
        parse_selector_list(text).unwrap()
    }

    fn resolve(levels: &[&str]) -> String {
        let lists: Vec<SelectorList> = levels.iter().map(|l| sel(l)).collect();
        let refs: Vec<&SelectorList> = lists.iter().collect();
        resolve_levels(None, &refs).unwrap().unwrap().to_string()
    }

    #[test]
    fn nesting_joins_with_descendant() {
        assert_eq!(resolve(&["A", "B", "&C"]), "A BC");
        assert_eq!(resolve(&[".a, .b", ".c"]), ".a .c, .b .c");
        assert_eq!(resolve(&[".a", "> .b"]), ".a > .b");
    }

    #[test]
    fn multiple_parent_references() {
        assert_eq!(resolve(&[".a", "& + &"]), ".a + .a");
        assert_eq!(resolve(&[".a .b", "&-x &.y"]), ".a .b-x .a .b.y");
    }

    #[test]
    fn parent_inside_pseudo_argument() {
        assert_eq!(resolve(&[".a", "&:not(&.b)"]), ".a:not(.a.b)");
        assert_eq!(resolve(&[".a", ":not(&)"]), ":not(.a)");
    }

    #[test]
    fn top_level_parent_is_an_error() {
        let list = sel("&.a");
        assert!(resolve_levels(None, &[&list]).is_err());
    }

    #[test]
    fn at_root_base_only_replaces_explicit_parent() {
        let base = sel(".a");
        let plain = sel(".x");
        let suffixed = sel("&-x");
        assert_eq!(resolve_levels(Some(&base), &[&plain]).unwrap().unwrap().to_string(), ".x");
        assert_eq!(resolve_levels(Some(&base), &[&suffixed]).unwrap().unwrap().to_string(), ".a-x");
    }

    #[test]
    fn suffix_on_pseudo_is_rejected() {
        assert!(resolve_levels(None, &[&sel("a:hover"), &sel("&-x")]).is_err());
    }

    #[test]
    fn parts_round_trip_through_render() {
        let parts = list_to_parts(&sel("ul.nav > li:hover, %p"));
        assert_eq!(parts[0], vec![vec!["ul".to_string(), ".nav".into()], vec![">".into()], vec!["li".into(), ":hover".into()]]);
        assert_eq!(render_list(&parts, ", "), "ul.nav > li:hover, %p");
        assert!(has_placeholder(&parts[1]));
    }

    #[test]
    fn unify_and_superselector() {
        let a = list_to_parts(&sel("a.x"));
        let b = list_to_parts(&sel(".y"));
        assert_eq!(render_list(&unify(&a, &b), ", "), "a.x.y");
        assert!(unify(&list_to_parts(&sel("a")), &list_to_parts(&sel("b"))).is_empty());
        assert!(is_superselector(&list_to_parts(&sel(".a")), &list_to_parts(&sel("div .a.b"))));
        assert!(!is_superselector(&list_to_parts(&sel(".a .b")), &list_to_parts(&sel(".b"))));
    }

    #[test]
    fn append_glues_suffixes() {
        assert_eq!(append(&sel(".a, .b"), "-x").unwrap().to_string(), ".a-x, .b-x");
        assert_eq!(append(&sel(".a"), ".c").unwrap().to_string(), ".a.c");
    }
}
