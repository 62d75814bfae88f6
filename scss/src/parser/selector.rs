use crate::ast::selector::{
    Combinator, ComplexSelector, CompoundSelector, PseudoArgument, SelectorComponent,
    SelectorList, SimpleSelector, NTH_PSEUDOS, SELECTOR_PSEUDOS,
};
use crate::ast::SelectorSource;
use crate::parser::cursor::{ScssParser, IDENT, KEYFRAME_PERCENT, NAME_CHARS};

fn unprefixed(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with('-') {
        if let Some(i) = lower[1..].find('-') {
            let bare = &lower[i + 2..];
            if SELECTOR_PSEUDOS.contains(&bare) || NTH_PSEUDOS.contains(&bare) {
                return bare.to_string();
            }
        }
    }
    lower
}

impl<'a> ScssParser<'a> {
    /// Selectors ahead of one of `terminators`: structured when possible,
    /// otherwise interpolated text to be re-parsed after evaluation.
    pub(crate) fn selector_source(&mut self, terminators: &[char]) -> Option<SelectorSource> {
        let start = self.pos;
        if let Some(list) = self.selector_list() {
            if self.at_end() || self.peek().is_some_and(|c| terminators.contains(&c)) {
                return Some(SelectorSource::Parsed(list));
            }
        }
        self.seek(start);

        let mut stops = vec!['{', ';', '}'];
        stops.extend_from_slice(terminators);
        let text = self.interpolated_text(&stops);
        match text {
            Some(text) if text.has_interpolation() => {
                if self.at_end() || self.peek().is_some_and(|c| terminators.contains(&c)) {
                    return Some(SelectorSource::Interpolated(text));
                }
                self.seek(start);
                None
            }
            _ => {
                self.seek(start);
                None
            }
        }
    }

    pub(crate) fn selector_list(&mut self) -> Option<SelectorList> {
        let start = self.pos;
        let mut selectors = vec![self.complex_selector()?];
        while self.char(',') {
            match self.complex_selector() {
                Some(sel) => selectors.push(sel),
                None => {
                    self.seek(start);
                    return None;
                }
            }
        }
        Some(SelectorList::new(selectors))
    }

    fn complex_selector(&mut self) -> Option<ComplexSelector> {
        let mut components = Vec::new();
        loop {
            if let Some(c) = self.peek() {
                if let Some(comb) = Combinator::from_symbol(c.encode_utf8(&mut [0; 4])) {
                    self.advance(1);
                    self.whitespace();
                    components.push(SelectorComponent::Combinator(comb));
                    continue;
                }
            }
            match self.compound_selector() {
                Some(compound) => {
                    components.push(SelectorComponent::Compound(compound));
                    self.whitespace();
                }
                None => break,
            }
        }
        if components.is_empty() {
            return None;
        }
        Some(ComplexSelector { components })
    }

    fn compound_selector(&mut self) -> Option<CompoundSelector> {
        let mut simples = Vec::new();
        while let Some(simple) = self.simple_selector(simples.is_empty()) {
            simples.push(simple);
        }
        if simples.is_empty() {
            return None;
        }
        Some(CompoundSelector::new(simples))
    }

    fn simple_selector(&mut self, first: bool) -> Option<SimpleSelector> {
        let start = self.pos;
        let c = self.peek()?;
        let simple = match c {
            '&' => {
                self.advance(1);
                let suffix = self.match_regex(&NAME_CHARS, false).map(|m| m[0].to_string());
                SimpleSelector::Parent { suffix }
            }
            '*' => {
                self.advance(1);
                if self.rest().starts_with('|') && !self.rest().starts_with("|=") {
                    self.advance(1);
                    match self.peek() {
                        Some('*') => {
                            self.advance(1);
                            SimpleSelector::Universal("*|".into())
                        }
                        _ => match self.ident(false) {
                            Some(name) => SimpleSelector::Type(format!("*|{}", name)),
                            None => {
                                self.seek(start);
                                return None;
                            }
                        },
                    }
                } else {
                    SimpleSelector::Universal(String::new())
                }
            }
            '.' => {
                self.advance(1);
                match self.ident(false) {
                    Some(name) => SimpleSelector::Class(name),
                    None => {
                        self.seek(start);
                        return None;
                    }
                }
            }
            '#' => {
                if self.rest().starts_with("#{") {
                    return None;
                }
                self.advance(1);
                match self.match_regex(&NAME_CHARS, false) {
                    Some(name) => SimpleSelector::Id(name[0].to_string()),
                    None => {
                        self.seek(start);
                        return None;
                    }
                }
            }
            '%' => {
                self.advance(1);
                match self.ident(false) {
                    Some(name) => SimpleSelector::Placeholder(name),
                    None => {
                        self.seek(start);
                        return None;
                    }
                }
            }
            '[' => return self.attribute_selector(),
            ':' => return self.pseudo_selector(),
            _ if first => {
                if let Some(m) = self.match_regex(&KEYFRAME_PERCENT, false) {
                    SimpleSelector::Type(m[0].to_string())
                } else if self.rest().starts_with("#{") {
                    return None;
                } else {
                    let name = self.match_regex(&IDENT, false)?;
                    SimpleSelector::Type(name[0].to_string())
                }
            }
            _ => return None,
        };
        if self.rest().starts_with("#{") {
            self.seek(start);
            return None;
        }
        Some(simple)
    }

    fn attribute_selector(&mut self) -> Option<SimpleSelector> {
        let start = self.pos;
        let rest = self.rest();
        let mut quote: Option<char> = None;
        for (i, c) in rest.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '#') if rest[i..].starts_with("#{") => return None,
                (None, ']') => {
                    let text = normalize_attribute(&rest[..=i]);
                    self.advance(i + 1);
                    return Some(SimpleSelector::Attribute(text));
                }
                (None, '{') | (None, ';') | (None, '}') => break,
                _ => {}
            }
        }
        self.seek(start);
        None
    }

    fn pseudo_selector(&mut self) -> Option<SimpleSelector> {
        let start = self.pos;
        self.advance(1);
        let element = self.match_char(':', false);
        let Some(name) = self.ident(false) else {
            self.seek(start);
            return None;
        };
        if self.peek() != Some('(') {
            return Some(SimpleSelector::Pseudo {
                name,
                element,
                argument: None,
            });
        }
        self.advance(1);
        self.whitespace();

        let bare = unprefixed(&name);
        let argument = if SELECTOR_PSEUDOS.contains(&bare.as_str()) {
            self.selector_list().map(PseudoArgument::Selector)
        } else if NTH_PSEUDOS.contains(&bare.as_str()) {
            self.nth_argument()
        } else {
            self.raw_pseudo_argument()
        };
        let Some(argument) = argument else {
            self.seek(start);
            return None;
        };
        if !self.match_char(')', false) {
            self.seek(start);
            return None;
        }
        Some(SimpleSelector::Pseudo {
            name,
            element,
            argument: Some(argument),
        })
    }

    /// `2n+1`, `odd`, `-n + 3 of .item`.
    fn nth_argument(&mut self) -> Option<PseudoArgument> {
        let rest = self.rest();
        let end = rest.find([')', '#'])?;
        if rest[end..].starts_with('#') {
            return None;
        }
        let text = &rest[..end];
        let (formula, of_text) = match text.find(" of ") {
            Some(i) => (&text[..i], Some(i + 4)),
            None => (text, None),
        };
        let formula: String = formula.split_whitespace().collect::<Vec<_>>().join(" ");
        let formula = formula.replace(" + ", "+").replace(" - ", "-");
        match of_text {
            None => {
                self.advance(end);
                Some(PseudoArgument::Nth { formula, of: None })
            }
            Some(offset) => {
                self.advance(offset);
                self.whitespace();
                let of = self.selector_list()?;
                Some(PseudoArgument::Nth {
                    formula,
                    of: Some(of),
                })
            }
        }
    }

    fn raw_pseudo_argument(&mut self) -> Option<PseudoArgument> {
        let rest = self.rest();
        let mut depth = 0usize;
        for (i, c) in rest.char_indices() {
            match c {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    let text = rest[..i].trim_end().to_string();
                    self.advance(i);
                    return Some(PseudoArgument::Raw(text));
                }
                ')' => depth -= 1,
                '#' if rest[i..].starts_with("#{") => return None,
                '{' | ';' | '}' => return None,
                _ => {}
            }
        }
        None
    }
}

/// `[ href ^= 'x' ]` becomes `[href^='x']`.
fn normalize_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                out.push(c);
            }
            None if c.is_whitespace() => {
                let last = out.chars().last();
                if !matches!(last, Some('[') | Some('=') | Some('~') | Some('^') | Some('$') | Some('*') | Some('|') | Some(' ')) {
                    out.push(' ');
                }
            }
            None => {
                if matches!(c, '=' | ']' | '~' | '^' | '$' | '*' | '|') && out.ends_with(' ') {
                    out.pop();
                }
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> SelectorList {
        let mut p = ScssParser::new(src, 0);
        let list = p.selector_list().expect("selector");
        assert!(p.at_end(), "unparsed: {:?}", p.rest());
        list
    }

    #[test]
    fn parses_combinators_and_compounds() {
        let list = parse("ul.nav > li + a:hover, #main");
        assert_eq!(list.selectors.len(), 2);
        assert_eq!(list.to_string(), "ul.nav > li + a:hover, #main");
    }

    #[test]
    fn parent_reference_with_suffix() {
        let list = parse("&-item &.x");
        let first = list.selectors[0].compounds().next().unwrap();
        assert_eq!(
            first.simples[0],
            SimpleSelector::Parent {
                suffix: Some("-item".into())
            }
        );
        assert!(list.has_parent_ref());
    }

    #[test]
    fn selector_pseudo_arguments_are_structured() {
        let list = parse("a:not(&.active, .b)");
        let compound = list.selectors[0].last_compound().unwrap();
        assert!(matches!(
            &compound.simples[1],
            SimpleSelector::Pseudo { argument: Some(PseudoArgument::Selector(inner)), .. }
                if inner.selectors.len() == 2
        ));
        assert!(list.has_parent_ref());
    }

    #[test]
    fn nth_arguments_keep_formula() {
        let list = parse("li:nth-child(2n + 1 of .x)");
        assert_eq!(list.to_string(), "li:nth-child(2n+1 of .x)");
    }

    #[test]
    fn attributes_are_normalized() {
        assert_eq!(parse("a[ href ^= 'http' ]").to_string(), "a[href^='http']");
    }

    #[test]
    fn interpolation_falls_back_to_text() {
        let mut p = ScssParser::new(".a-#{$b} {", 0);
        let source = p.selector_source(&['{']).expect("selector");
        assert!(matches!(source, SelectorSource::Interpolated(ref s) if s.has_interpolation()));
        assert_eq!(p.peek(), Some('{'));
    }

    #[test]
    fn keyframe_selectors() {
        assert_eq!(parse("from, 50%, to").to_string(), "from, 50%, to");
    }
}
