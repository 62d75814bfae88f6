//! `@extend` resolution.
//!
//! Extensions are registered while compiling and applied once, after the
//! whole output tree exists. Each registration is indexed by the simple
//! selectors of its target so that a compound only consults the extensions
//! mentioning one of its parts. A target matches a compound when every one of
//! its parts is present; the origin selector is then spliced in place of the
//! matched compound, and the result is searched again for further matches.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use scss::ast::SourcePos;
use tracing::debug;

use crate::error::CompileError;
use crate::selector::{is_combinator, list_to_parts, render, render_list, Compound, Parts};

static PSEUDO_WITH_SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^::?([\w-]+)\((.+)\)$").unwrap());
static BARE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").unwrap());

/// One `@extend` registration.
#[derive(Debug, Clone)]
pub struct Extension {
    /// The compound being extended, e.g. `[".btn"]`.
    pub target: Compound,
    /// Selectors of the rule containing the `@extend`.
    pub origin: Vec<Parts>,
    pub optional: bool,
    pub pos: SourcePos,
    matched: bool,
}

#[derive(Debug, Default)]
pub struct ExtendEngine {
    extensions: Vec<Extension>,
    index: HashMap<String, Vec<usize>>,
    /// Compounds currently being expanded, guarding against cycles.
    parts_pile: Vec<Compound>,
}

fn pseudo_parts(part: &str) -> Option<(String, String)> {
    if !part.starts_with(':') {
        return None;
    }
    PSEUDO_WITH_SELECTOR
        .captures(part)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

fn dedup_in_place(list: &mut Vec<Parts>) {
    let mut seen = HashSet::new();
    list.retain(|sel| seen.insert(sel.clone()));
}

/// Split trailing combinator-joined compounds off a fragment: `a > b + c`
/// yields (`a`, `> b + c`) when the fragment ends in a sibling chain.
fn extract_relationship(fragment: &[Compound]) -> (Vec<Compound>, Vec<Compound>) {
    let i = fragment.len();
    let mut j = i;
    loop {
        let parents = &fragment[..j];
        match parents.last() {
            Some(last) if !last.is_empty() && is_combinator(&last[0]) && j >= 2 => j -= 2,
            _ => break,
        }
    }
    (fragment[..j].to_vec(), fragment[j..i].to_vec())
}

/// Merge two fragments that share trailing direct-relationship compounds.
fn merge_direct_relationships(mut first: Vec<Compound>, mut second: Vec<Compound>) -> Vec<Compound> {
    if first.is_empty() || second.is_empty() {
        first.extend(second);
        return first;
    }
    let (Some(last1), Some(last2)) = (first.last(), second.last()) else {
        return first;
    };
    if !is_combinator(&last1[0]) && last1 != last2 {
        first.extend(second);
        return first;
    }

    let mut merged: Vec<Compound> = Vec::new();
    loop {
        let (Some(part1), Some(part2)) = (first.pop(), second.pop()) else {
            break;
        };
        if !is_combinator(&part1[0]) && part1 != part2 {
            let leading_combinator = merged.first().is_some_and(|m| is_combinator(&m[0]));
            if leading_combinator {
                merged.insert(0, vec![format!("{}{}", part1[0], part2[0])]);
                let mut out = first;
                out.extend(second);
                out.extend(merged);
                return out;
            }
            let mut out = first;
            out.push(part1);
            out.extend(second);
            out.push(part2);
            out.extend(merged);
            return out;
        }
        merged.insert(0, part1);
        if first.is_empty() || second.is_empty() {
            break;
        }
    }
    let mut out = first;
    out.extend(second);
    out.extend(merged);
    out
}

/// Combine the compound of an origin selector with the parts of the matched
/// compound that were not part of the target.
fn combine_compound(base: &Compound, other: &[String]) -> Compound {
    let mut other: Vec<String> = other.to_vec();
    let mut pseudo = Vec::new();
    while other.last().is_some_and(|p| p.starts_with(':')) {
        if let Some(p) = other.pop() {
            pseudo.insert(0, p);
        }
    }

    let mut tag: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    let mut was_tag = false;
    for single in [base.as_slice(), other.as_slice()] {
        let mut rank = single.len();
        for part in single.iter().rev() {
            if part.starts_with('[') || part.starts_with(':') {
                out.push(part.clone());
                was_tag = false;
            } else if part.starts_with('.') || part.starts_with('#') {
                out.insert(0, part.clone());
                was_tag = false;
            } else if !part.starts_with('_') && !part.starts_with('-') && rank == 1 {
                tag.push(part.clone());
                was_tag = true;
            } else if was_tag {
                if let Some(last) = tag.last_mut() {
                    last.push_str(part);
                }
            } else {
                out.insert(0, part.clone());
            }
            rank -= 1;
        }
    }
    if let Some(first) = tag.into_iter().next() {
        out.insert(0, first);
    }
    out.extend(pseudo);
    out
}

impl ExtendEngine {
    pub fn new() -> Self {
        ExtendEngine::default()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn push(&mut self, target: Compound, origin: Vec<Parts>, optional: bool, pos: SourcePos) {
        let id = self.extensions.len();
        for part in &target {
            self.index.entry(part.clone()).or_default().push(id);
        }
        debug!(target = %target.concat(), origin = %render_list(&origin, ", "), "registered @extend");
        self.extensions.push(Extension {
            target,
            origin,
            optional,
            pos,
            matched: false,
        });
    }

    /// Apply every registered extension to one rule's selectors and drop
    /// placeholder selectors. Returns the rendered selector strings.
    pub fn extend_selectors(&mut self, selectors: &[Parts]) -> Vec<Parts> {
        let mut out = Vec::new();
        for selector in selectors {
            out.push(selector.clone());
            if !self.extensions.is_empty() {
                self.match_extends(selector, &mut out, 0, true);
                dedup_in_place(&mut out);
            }
        }
        out
    }

    /// The first non-optional extension that never matched.
    pub fn unmatched(&self) -> Option<(CompileError, SourcePos)> {
        self.extensions
            .iter()
            .find(|e| !e.matched && !e.optional)
            .map(|e| {
                (
                    CompileError::UnmatchedExtend {
                        origin: render_list(&e.origin, ", "),
                        target: e.target.concat(),
                    },
                    e.pos.clone(),
                )
            })
    }

    fn match_extends(&mut self, selector: &Parts, out: &mut Vec<Parts>, from: usize, initial: bool) {
        if selector.len() == 1 && self.parts_pile.contains(&selector[0]) {
            return;
        }

        let mut out_recurse: Vec<Parts> = Vec::new();
        for (i, part) in selector.iter().enumerate() {
            if i < from {
                continue;
            }
            // A compound that only adds to one already being expanded would
            // extend forever.
            if part.len() > 1
                && self
                    .parts_pile
                    .iter()
                    .any(|previous| previous.iter().all(|p| part.contains(p)))
            {
                continue;
            }

            self.parts_pile.push(part.clone());
            if let Some(origin) = self.match_extends_single(part, initial) {
                let after = &selector[i + 1..];
                let (before, non_breakable_before) = extract_relationship(&selector[..i]);

                for new in &origin {
                    let mut k = 0;
                    if new.len() > 1 {
                        while k < i && k < new.len() && selector[k] == new[k] {
                            k += 1;
                        }
                    }
                    if !non_breakable_before.is_empty() && k == new.len() && k > 0 {
                        k -= 1;
                    }

                    let temp_replacement: &[Compound] = if k > 0 { &new[k..] } else { new };
                    let mut replacement: Vec<Compound> = Vec::new();
                    let mut l = temp_replacement.len();
                    while l > 0 {
                        l -= 1;
                        let mut slice: Compound = Vec::new();
                        for chunk in &temp_replacement[l] {
                            if !slice.contains(chunk) {
                                slice.push(chunk.clone());
                            }
                        }
                        let ends_in_combinator = slice.last().is_some_and(|p| is_combinator(p));
                        replacement.insert(0, slice);
                        if !ends_in_combinator {
                            break;
                        }
                    }

                    let after_before: Vec<Compound> = temp_replacement[..l].to_vec();
                    let merged_before =
                        merge_direct_relationships(after_before.clone(), non_breakable_before.clone());

                    let mut result: Parts = before.clone();
                    result.extend(merged_before.iter().cloned());
                    result.extend(replacement.iter().cloned());
                    result.extend(after.iter().cloned());
                    if result == *selector {
                        continue;
                    }
                    out.push(result.clone());

                    let start = before.len() + non_breakable_before.len().min(merged_before.len());
                    if origin.len() > 1 {
                        self.match_extends(&result, out, start, false);
                    } else {
                        self.match_extends(&result, &mut out_recurse, start, false);
                    }

                    // Interleave the shared ancestry in the other order too.
                    if !before.is_empty() && new.len() > 1 {
                        let pre_shared: Vec<Compound> =
                            if k > 0 { before[..k.min(before.len())].to_vec() } else { Vec::new() };
                        let post_shared: Vec<Compound> =
                            if k > 0 { before[k.min(before.len())..].to_vec() } else { before.clone() };
                        let (between_shared, non_breakable2) = extract_relationship(&after_before);
                        let mut result2 = pre_shared;
                        result2.extend(between_shared);
                        result2.extend(post_shared);
                        result2.extend(non_breakable2);
                        result2.extend(non_breakable_before.iter().cloned());
                        result2.extend(replacement.iter().cloned());
                        result2.extend(after.iter().cloned());
                        out.push(result2);
                    }
                }
            }
            self.parts_pile.pop();
        }
        out.extend(out_recurse);
    }

    /// Match one compound against the registered extensions, returning the
    /// origin selectors to substitute for it.
    fn match_extends_single(&mut self, raw: &Compound, initial: bool) -> Option<Vec<Parts>> {
        if raw.len() == 1 && is_combinator(&raw[0]) {
            return None;
        }

        let mut single: Vec<String> = Vec::new();
        for part in raw {
            let starts_simple = part.starts_with(['[', '.', ':', '#', '%']);
            match single.last_mut() {
                Some(last) if !starts_simple => last.push_str(part),
                _ => single.push(part.clone()),
            }
        }

        let decorated_tag = if single.len() > 1 && BARE_TAG.is_match(&single[0]) {
            Some(single[0].clone())
        } else {
            None
        };

        let mut counts: Vec<(usize, usize)> = Vec::new();
        let mut out_origin: Vec<Parts> = Vec::new();
        let mut found = false;

        for (k, part) in single.iter().enumerate() {
            if let Some(ids) = self.index.get(part) {
                for id in ids {
                    match counts.iter_mut().find(|(i, _)| i == id) {
                        Some(entry) => entry.1 += 1,
                        None => counts.push((*id, 1)),
                    }
                }
            }

            // Extend inside selector pseudo-classes such as `:is(...)`.
            if initial {
                if let Some((name, inner)) = pseudo_parts(part) {
                    if name != "not" {
                        if let Some(extended) = self.extend_pseudo_argument(&single, k, &inner) {
                            out_origin.extend(extended);
                            found = true;
                        }
                    }
                }
            }
        }

        for (id, count) in counts {
            if count != self.extensions[id].target.len() {
                continue;
            }
            self.extensions[id].matched = true;
            let target = self.extensions[id].target.clone();
            let mut origin = self.extensions[id].origin.clone();
            let remainder: Vec<String> = single.iter().filter(|p| !target.contains(p)).cloned().collect();

            // A selector extending itself must not recurse.
            let self_extend = origin.iter().any(|sel| sel.contains(&single));
            if self_extend && !initial {
                return None;
            }

            origin.retain(|new| {
                let Some(replacement) = new.last() else {
                    return false;
                };
                match (&decorated_tag, replacement.first()) {
                    (Some(tag), Some(first)) if first != tag && BARE_TAG.is_match(first) => false,
                    _ => true,
                }
            });
            for new in origin.iter_mut() {
                let Some(last) = new.last_mut() else {
                    continue;
                };
                let combined = combine_compound(last, &remainder);
                if combined.iter().any(|p| !last.contains(p)) {
                    *last = combined;
                }
            }
            out_origin.extend(origin);
            found = true;
        }

        found.then_some(out_origin)
    }

    fn extend_pseudo_argument(&mut self, single: &[String], k: usize, inner: &str) -> Option<Vec<Parts>> {
        let list = scss::parser::parse_selector_list(inner).ok()?;
        let sub_selectors = list_to_parts(&list);
        let mut results = Vec::new();
        for (index, sub) in sub_selectors.iter().enumerate() {
            let mut sub_extended = Vec::new();
            self.match_extends(sub, &mut sub_extended, 0, false);
            if sub_extended.is_empty() {
                continue;
            }
            let mut rendered: Vec<String> = sub_selectors.iter().map(render).collect();
            let mut replacement = vec![render(sub)];
            replacement.extend(sub_extended.iter().map(render));
            rendered[index] = replacement.join(", ");
            let mut single_extended = single.to_vec();
            single_extended[k] =
                single[k].replacen(&format!("({})", inner), &format!("({})", rendered.join(", ")), 1);
            results.push(vec![single_extended]);
        }
        (!results.is_empty()).then_some(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scss::parser::parse_selector_list;

    fn parts(text: &str) -> Vec<Parts> {
        list_to_parts(&parse_selector_list(text).unwrap())
    }

    fn compound(text: &str) -> Compound {
        parts(text).remove(0).remove(0)
    }

    fn extend(engine: &mut ExtendEngine, selector: &str) -> String {
        render_list(&engine.extend_selectors(&parts(selector)), ", ")
    }

    #[test]
    fn simple_extension_appends_origin() {
        let mut engine = ExtendEngine::new();
        engine.push(compound(".a"), parts(".b"), false, SourcePos::default());
        assert_eq!(extend(&mut engine, ".a"), ".a, .b");
        assert!(engine.unmatched().is_none());
    }

    #[test]
    fn extension_chains_are_transitive() {
        let mut engine = ExtendEngine::new();
        engine.push(compound(".z"), parts(".y"), false, SourcePos::default());
        engine.push(compound(".y"), parts(".x"), false, SourcePos::default());
        let result = engine.extend_selectors(&parts(".z"));
        let rendered: Vec<String> = result.iter().map(render).collect();
        assert_eq!(rendered, vec![".z", ".y", ".x"]);
    }

    #[test]
    fn compound_remainder_is_kept() {
        let mut engine = ExtendEngine::new();
        engine.push(compound(".a"), parts(".b"), false, SourcePos::default());
        assert_eq!(extend(&mut engine, ".a:hover"), ".a:hover, .b:hover");
        assert_eq!(extend(&mut engine, "div .a.c"), "div .a.c, div .c.b");
    }

    #[test]
    fn origin_ancestry_is_spliced() {
        let mut engine = ExtendEngine::new();
        engine.push(compound(".a"), parts(".p .b"), false, SourcePos::default());
        assert_eq!(extend(&mut engine, ".x .a"), ".x .a, .x .p .b, .p .x .b");
    }

    #[test]
    fn unmatched_targets_are_reported_unless_optional() {
        let mut engine = ExtendEngine::new();
        engine.push(compound(".missing"), parts(".b"), true, SourcePos::default());
        engine.extend_selectors(&parts(".a"));
        assert!(engine.unmatched().is_none());
        engine.push(compound(".gone"), parts(".c"), false, SourcePos::default());
        let (err, _) = engine.unmatched().unwrap();
        assert!(err.to_string().contains("The selector \".gone\" was not found."));
    }

    #[test]
    fn self_extension_terminates() {
        let mut engine = ExtendEngine::new();
        engine.push(compound(".a"), parts(".a.b"), false, SourcePos::default());
        let result = engine.extend_selectors(&parts(".a"));
        assert!(result.len() <= 3);
    }
}
