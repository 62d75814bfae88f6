use crate::ast::expr::{
    BinaryOperator, CallArg, Expr, ListSeparator, Param, Params, StringExpr, StringPart,
    UnaryOperator,
};
use crate::parser::cursor::{
    is_name_char, ScssParser, HEX_COLOR, IDENT, NAME_CHARS, NUMBER, UNICODE_RANGE, VARIABLE,
};

/// Functions whose arguments are kept as raw text (with interpolation).
const SPECIAL_FUNCTIONS: &[&str] = &["calc", "var", "env", "element", "expression", "url"];

fn push_literal(parts: &mut Vec<StringPart>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(StringPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(StringPart::Literal(text.to_string()));
    }
}

fn trim_parts(parts: &mut Vec<StringPart>) {
    if let Some(StringPart::Literal(first)) = parts.first_mut() {
        let trimmed = first.trim_start().to_string();
        *first = trimmed;
    }
    if let Some(StringPart::Literal(last)) = parts.last_mut() {
        let trimmed = last.trim_end().to_string();
        *last = trimmed;
    }
    parts.retain(|p| !matches!(p, StringPart::Literal(s) if s.is_empty()));
}

fn is_special_function(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let bare = ["-webkit-", "-moz-", "-ms-", "-o-"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower);
    SPECIAL_FUNCTIONS.contains(&bare)
}

fn hex_to_rgba(hex: &str) -> Option<[f64; 4]> {
    let digits: Vec<u8> = hex
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()?;
    let channel = |hi: u8, lo: u8| f64::from(hi * 16 + lo);
    match digits.len() {
        3 | 4 => {
            let mut rgba = [0.0, 0.0, 0.0, 1.0];
            for (i, d) in digits.iter().enumerate() {
                rgba[i] = channel(*d, *d);
            }
            if digits.len() == 4 {
                rgba[3] /= 255.0;
            }
            Some(rgba)
        }
        6 | 8 => {
            let mut rgba = [0.0, 0.0, 0.0, 1.0];
            for (i, pair) in digits.chunks(2).enumerate() {
                rgba[i] = channel(pair[0], pair[1]);
            }
            if digits.len() == 8 {
                rgba[3] = channel(digits[6], digits[7]) / 255.0;
            }
            Some(rgba)
        }
        _ => None,
    }
}

impl<'a> ScssParser<'a> {
    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    /// Comma-separated list; a single item is returned unwrapped.
    pub(crate) fn value_list(&mut self) -> Option<Expr> {
        let first = self.space_list()?;
        let mut items = vec![first];
        let mut saw_comma = false;
        while self.char(',') {
            saw_comma = true;
            match self.space_list() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        if !saw_comma {
            return items.pop();
        }
        Some(Expr::List {
            items,
            separator: ListSeparator::Comma,
            bracketed: false,
        })
    }

    /// Space-separated list; a single item is returned unwrapped.
    pub(crate) fn space_list(&mut self) -> Option<Expr> {
        let mut items = Vec::new();
        while let Some(item) = self.expression() {
            items.push(item);
        }
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Expr::List {
                items,
                separator: ListSeparator::Space,
                bracketed: false,
            }),
        }
    }

    /// A single operand followed by any binary operators.
    pub(crate) fn expression(&mut self) -> Option<Expr> {
        let lhs = self.value()?;
        Some(self.exp_helper(lhs, 0))
    }

    // -----------------------------------------------------------------------
    // Binary operators
    // -----------------------------------------------------------------------

    fn match_operator(&mut self) -> Option<BinaryOperator> {
        for token in ["==", "!=", "<=", ">="] {
            if self.literal(token, false) {
                return BinaryOperator::from_token(token);
            }
        }
        let start = self.pos;
        for word in ["and", "or"] {
            if self.literal(word, false) {
                if self.peek().is_some_and(is_name_char) {
                    self.seek(start);
                    continue;
                }
                return BinaryOperator::from_token(word);
            }
        }
        let c = self.peek()?;
        let op = match c {
            '+' => BinaryOperator::Add,
            '-' => BinaryOperator::Sub,
            '*' => BinaryOperator::Mul,
            '/' => BinaryOperator::Div,
            '%' => BinaryOperator::Mod,
            '<' => BinaryOperator::Lt,
            '>' => BinaryOperator::Gt,
            _ => return None,
        };
        self.advance(1);
        Some(op)
    }

    fn peek_operator(&mut self) -> Option<BinaryOperator> {
        let start = self.pos;
        let op = self.match_operator();
        self.seek(start);
        op
    }

    /// Precedence climbing over binary operators.
    fn exp_helper(&mut self, mut lhs: Expr, min_precedence: u8) -> Expr {
        loop {
            let start = self.pos;
            let space_before = self.preceded_by_space();
            let Some(op) = self.match_operator() else {
                break;
            };
            if op.precedence() < min_precedence {
                self.seek(start);
                break;
            }
            let space_after = self.followed_by_space();

            // `a -b` is a two-item list, not a subtraction.
            if op == BinaryOperator::Sub && !space_after {
                let next = self.peek();
                let ambiguous = space_before && next != Some('$');
                let keyword_follows = next.is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '-');
                if ambiguous || keyword_follows {
                    self.seek(start);
                    break;
                }
            }

            self.whitespace();
            let Some(mut rhs) = self.value() else {
                self.seek(start);
                break;
            };

            while let Some(next) = self.peek_operator() {
                if next.precedence() <= op.precedence() {
                    break;
                }
                let before = self.pos;
                rhs = self.exp_helper(rhs, op.precedence() + 1);
                if self.pos == before {
                    break;
                }
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                in_parens: self.in_parens,
                space_before,
                space_after,
            };
        }
        lhs
    }

    // -----------------------------------------------------------------------
    // Operands
    // -----------------------------------------------------------------------

    pub(crate) fn value(&mut self) -> Option<Expr> {
        let start = self.pos;
        let c = self.peek()?;

        match c {
            '(' => return self.parens(),
            '[' => return self.brackets(),
            '"' | '\'' => return self.quoted_string().map(Expr::String),
            '$' => {
                let caps = self.match_regex(&VARIABLE, self.eat_white_default)?;
                return Some(Expr::Variable(caps[1].to_string()));
            }
            '&' => {
                self.advance(1);
                self.white_default();
                return Some(Expr::ParentSelector);
            }
            '!' => {
                self.advance(1);
                self.whitespace();
                if self.literal("important", false) && !self.peek().is_some_and(is_name_char) {
                    self.white_default();
                    return Some(Expr::keyword("!important"));
                }
                self.seek(start);
                return None;
            }
            '#' if !self.rest().starts_with("#{") => return self.hex_color(),
            '+' | '-' => {
                if let Some(expr) = self.signed_value() {
                    return Some(expr);
                }
            }
            '/' => {
                self.advance(1);
                self.whitespace();
                if let Some(operand) = self.value() {
                    return Some(Expr::Unary {
                        op: UnaryOperator::Slash,
                        operand: Box::new(operand),
                        in_parens: self.in_parens,
                    });
                }
                self.seek(start);
                return None;
            }
            _ => {}
        }

        if self.keyword("not") {
            if let Some(operand) = self.value() {
                return Some(Expr::Unary {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                    in_parens: self.in_parens,
                });
            }
            self.seek(start);
        }

        if let Some(number) = self.number(1.0) {
            return Some(number);
        }

        if let Some(range) = self.match_regex(&UNICODE_RANGE, self.eat_white_default) {
            return Some(Expr::keyword(range[0].trim_end()));
        }

        self.word()
    }

    /// `-1`, `+.5`, `-$x`, `-(...)`.
    fn signed_value(&mut self) -> Option<Expr> {
        let start = self.pos;
        let sign = self.peek()?;
        self.advance(1);
        let factor = if sign == '-' { -1.0 } else { 1.0 };
        if let Some(number) = self.number(factor) {
            return Some(number);
        }
        if matches!(self.peek(), Some('$') | Some('(')) {
            if let Some(operand) = self.value() {
                return Some(Expr::Unary {
                    op: if sign == '-' {
                        UnaryOperator::Minus
                    } else {
                        UnaryOperator::Plus
                    },
                    operand: Box::new(operand),
                    in_parens: self.in_parens,
                });
            }
        }
        self.seek(start);
        None
    }

    fn number(&mut self, factor: f64) -> Option<Expr> {
        let caps = self.match_regex(&NUMBER, false)?;
        let value: f64 = caps[1].parse().unwrap_or_default();
        let unit = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        self.white_default();
        Some(Expr::Number {
            value: value * factor,
            unit,
        })
    }

    fn hex_color(&mut self) -> Option<Expr> {
        let start = self.pos;
        let caps = self.match_regex(&HEX_COLOR, false)?;
        if self.peek().is_some_and(is_name_char) {
            self.seek(start);
            return None;
        }
        let Some(rgba) = hex_to_rgba(&caps[1]) else {
            self.seek(start);
            return None;
        };
        self.white_default();
        Some(Expr::Color {
            rgba,
            original: caps[0].to_string(),
        })
    }

    /// Keywords, function calls and interpolated bare words.
    fn word(&mut self) -> Option<Expr> {
        let start = self.pos;
        let text = self.interpolated_ident(false)?;

        let Some(name) = text.as_plain() else {
            self.white_default();
            return Some(Expr::String(text));
        };

        if self.peek() == Some('(') {
            self.advance(1);
            if let Some(call) = self.function_call(&name, start) {
                return Some(call);
            }
            self.seek(start);
            return None;
        }

        self.white_default();
        Some(match name.as_str() {
            "true" => Expr::Boolean(true),
            "false" => Expr::Boolean(false),
            "null" => Expr::Null,
            _ => Expr::Keyword(name),
        })
    }

    /// The cursor sits just after `name(`.
    fn function_call(&mut self, name: &str, start: usize) -> Option<Expr> {
        let after_paren = self.pos;
        if is_special_function(name) {
            self.whitespace();
            let evaluated_url = name.eq_ignore_ascii_case("url")
                && matches!(self.peek(), Some('"') | Some('\'') | Some('$'));
            if !evaluated_url {
                self.seek(after_paren);
                return self.raw_call(name, start);
            }
        }

        self.whitespace();
        if let Some(args) = self.call_args() {
            self.white_default();
            return Some(Expr::FunctionCall {
                name: name.to_string(),
                args,
            });
        }

        // `alpha(opacity=50)` and other non-SassScript arguments.
        self.seek(after_paren);
        self.raw_call(name, start)
    }

    fn raw_call(&mut self, name: &str, start: usize) -> Option<Expr> {
        let mut parts = vec![StringPart::Literal(format!("{}(", name))];
        if let Some(inner) = self.scan_text(&[')'], true) {
            for part in inner.parts {
                match part {
                    StringPart::Literal(s) => push_literal(&mut parts, &s),
                    other => parts.push(other),
                }
            }
        }
        if !self.match_char(')', false) {
            self.seek(start);
            return None;
        }
        push_literal(&mut parts, ")");
        self.white_default();
        Some(Expr::String(StringExpr { quote: None, parts }))
    }

    /// Call-site arguments; the cursor sits after `(` and ends after `)`.
    pub(crate) fn call_args(&mut self) -> Option<Vec<CallArg>> {
        let mut args = Vec::new();
        loop {
            if self.char(')') {
                return Some(args);
            }
            let arg_start = self.pos;
            let mut name = None;
            if let Some(caps) = self.match_regex(&VARIABLE, true) {
                if self.char(':') {
                    name = Some(caps[1].to_string());
                } else {
                    self.seek(arg_start);
                }
            }
            let value = self.space_list()?;
            let splat = self.literal("...", true);
            args.push(CallArg { name, value, splat });
            if self.char(',') {
                continue;
            }
            if self.char(')') {
                return Some(args);
            }
            return None;
        }
    }

    /// Declared parameters: `($a, $b: 2, $rest...)`.
    pub(crate) fn params(&mut self) -> Option<Params> {
        let start = self.pos;
        if !self.char('(') {
            return None;
        }
        let mut params = Params::default();
        loop {
            if self.char(')') {
                return Some(params);
            }
            let Some(caps) = self.match_regex(&VARIABLE, true) else {
                self.seek(start);
                return None;
            };
            let name = caps[1].to_string();
            if self.literal("...", true) {
                params.rest = Some(name);
            } else {
                let default = if self.char(':') {
                    match self.space_list() {
                        Some(value) => Some(value),
                        None => {
                            self.seek(start);
                            return None;
                        }
                    }
                } else {
                    None
                };
                params.params.push(Param { name, default });
            }
            if self.char(',') {
                continue;
            }
            if self.char(')') {
                return Some(params);
            }
            self.seek(start);
            return None;
        }
    }

    // -----------------------------------------------------------------------
    // Parens, maps, brackets
    // -----------------------------------------------------------------------

    fn parens(&mut self) -> Option<Expr> {
        let start = self.pos;
        if !self.char('(') {
            return None;
        }
        let outer = self.in_parens;
        self.in_parens = true;
        let result = self.parens_body();
        self.in_parens = outer;
        if result.is_none() {
            self.seek(start);
        }
        result
    }

    fn parens_body(&mut self) -> Option<Expr> {
        if self.char(')') {
            return Some(Expr::List {
                items: Vec::new(),
                separator: ListSeparator::Undecided,
                bracketed: false,
            });
        }
        let inner = self.pos;
        if let Some(pairs) = self.map_body() {
            return Some(Expr::Map(pairs));
        }
        self.seek(inner);
        let value = self.value_list()?;
        if !self.char(')') {
            return None;
        }
        Some(value)
    }

    fn map_body(&mut self) -> Option<Vec<(Expr, Expr)>> {
        let mut pairs = Vec::new();
        loop {
            let key = self.expression()?;
            if !self.char(':') {
                return None;
            }
            let value = self.space_list()?;
            pairs.push((key, value));
            if self.char(',') {
                if self.peek() == Some(')') {
                    break;
                }
                continue;
            }
            break;
        }
        if !self.char(')') {
            return None;
        }
        Some(pairs)
    }

    fn brackets(&mut self) -> Option<Expr> {
        let start = self.pos;
        if !self.char('[') {
            return None;
        }
        if self.char(']') {
            return Some(Expr::List {
                items: Vec::new(),
                separator: ListSeparator::Undecided,
                bracketed: true,
            });
        }
        let Some(value) = self.value_list() else {
            self.seek(start);
            return None;
        };
        if !self.char(']') {
            self.seek(start);
            return None;
        }
        Some(match value {
            Expr::List {
                items, separator, ..
            } => Expr::List {
                items,
                separator,
                bracketed: true,
            },
            single => Expr::List {
                items: vec![single],
                separator: ListSeparator::Undecided,
                bracketed: true,
            },
        })
    }

    // -----------------------------------------------------------------------
    // Strings and interpolation
    // -----------------------------------------------------------------------

    fn white_default(&mut self) {
        if self.eat_white_default {
            self.whitespace();
        }
    }

    /// `#{ value-list }`. Leaves the cursor right after `}`.
    pub(crate) fn interpolation(&mut self) -> Option<Expr> {
        let start = self.pos;
        if !self.literal("#{", false) {
            return None;
        }
        let (outer_white, outer_parens) = (self.eat_white_default, self.in_parens);
        self.eat_white_default = true;
        self.in_parens = false;
        self.whitespace();
        let value = self.value_list();
        let closed = self.match_char('}', false);
        self.eat_white_default = outer_white;
        self.in_parens = outer_parens;
        match value {
            Some(value) if closed => Some(value),
            _ => {
                self.seek(start);
                None
            }
        }
    }

    /// A quoted string. Escapes are kept as written; `#{}` becomes a part.
    pub(crate) fn quoted_string(&mut self) -> Option<StringExpr> {
        let start = self.pos;
        let quote = self.peek().filter(|c| *c == '"' || *c == '\'')?;
        self.advance(1);
        let mut parts = Vec::new();

        loop {
            let rest = self.rest();
            let Some(i) = rest.find(|c: char| c == quote || c == '\\' || c == '#' || c == '\r' || c == '\n')
            else {
                self.seek(start);
                return None;
            };
            push_literal(&mut parts, &rest[..i]);
            self.advance(i);
            let rest = self.rest();
            match rest.chars().next() {
                Some(c) if c == quote => {
                    self.advance(1);
                    break;
                }
                Some('\\') => {
                    let mut chars = rest.chars();
                    chars.next();
                    match chars.next() {
                        // Line continuation.
                        Some('\n') => self.advance(2),
                        Some(next) => {
                            push_literal(&mut parts, &rest[..1 + next.len_utf8()]);
                            self.advance(1 + next.len_utf8());
                        }
                        None => {
                            self.seek(start);
                            return None;
                        }
                    }
                }
                Some('#') => {
                    if rest.starts_with("#{") {
                        let Some(expr) = self.interpolation() else {
                            self.seek(start);
                            return None;
                        };
                        parts.push(StringPart::Interpolation(Box::new(expr)));
                    } else {
                        push_literal(&mut parts, "#");
                        self.advance(1);
                    }
                }
                _ => {
                    self.seek(start);
                    return None;
                }
            }
        }

        self.white_default();
        Some(StringExpr {
            quote: Some(quote),
            parts,
        })
    }

    /// An identifier that may contain interpolation: `foo`, `#{$a}-b`, `-#{$x}`.
    pub(crate) fn interpolated_ident(&mut self, eat_white: bool) -> Option<StringExpr> {
        let start = self.pos;
        let mut parts = Vec::new();

        if self.rest().starts_with("-#{") {
            push_literal(&mut parts, "-");
            self.advance(1);
        }

        loop {
            if self.rest().starts_with("#{") {
                let Some(expr) = self.interpolation() else {
                    self.seek(start);
                    return None;
                };
                parts.push(StringPart::Interpolation(Box::new(expr)));
                continue;
            }
            let re = if parts.is_empty() { &*IDENT } else { &*NAME_CHARS };
            match self.match_regex(re, false) {
                Some(caps) => push_literal(&mut parts, &caps[0]),
                None => break,
            }
        }

        if parts.is_empty() {
            self.seek(start);
            return None;
        }
        if eat_white {
            self.whitespace();
        }
        Some(StringExpr { quote: None, parts })
    }

    /// Property names, possibly interpolated.
    pub(crate) fn property_name(&mut self) -> Option<StringExpr> {
        self.interpolated_ident(true)
    }

    /// Free text up to one of `stops` at bracket depth zero, with `#{}`
    /// interpolation. Quoted sections are copied verbatim. In raw mode braces
    /// nest and comments are kept; otherwise comments are dropped.
    pub(crate) fn scan_text(&mut self, stops: &[char], raw: bool) -> Option<StringExpr> {
        let start = self.pos;
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;

        while let Some(c) = self.peek() {
            if self.rest().starts_with("#{") {
                if !literal.is_empty() {
                    push_literal(&mut parts, &std::mem::take(&mut literal));
                }
                let Some(expr) = self.interpolation() else {
                    self.seek(start);
                    return None;
                };
                parts.push(StringPart::Interpolation(Box::new(expr)));
                continue;
            }

            if let Some(q) = quote {
                if c == '\\' {
                    let escaped: String = self.rest().chars().take(2).collect();
                    literal.push_str(&escaped);
                    self.advance(escaped.len());
                    continue;
                }
                if c == q {
                    quote = None;
                }
                literal.push(c);
                self.advance(c.len_utf8());
                continue;
            }

            if depth == 0 && stops.contains(&c) {
                break;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                '{' if raw => depth += 1,
                ')' | ']' | '}' if depth > 0 => depth -= 1,
                ')' | ']' | '}' => break,
                '/' if !raw && depth == 0 && (self.rest().starts_with("//") || self.rest().starts_with("/*")) => {
                    self.whitespace();
                    literal.push(' ');
                    continue;
                }
                _ => {}
            }
            literal.push(c);
            self.advance(c.len_utf8());
        }

        if quote.is_some() {
            self.seek(start);
            return None;
        }
        push_literal(&mut parts, &literal);
        trim_parts(&mut parts);
        if parts.is_empty() {
            return None;
        }
        Some(StringExpr { quote: None, parts })
    }

    pub(crate) fn interpolated_text(&mut self, stops: &[char]) -> Option<StringExpr> {
        self.scan_text(stops, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        let mut p = ScssParser::new(src, 0);
        let expr = p.value_list().expect("expression");
        assert!(p.at_end(), "unparsed input: {:?}", p.rest());
        expr
    }

    #[test]
    fn precedence_climbing_is_left_associative() {
        let expr = parse("1 - 2 - 3 * 4");
        let Expr::Binary { op, lhs, rhs, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOperator::Sub);
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOperator::Sub, .. }));
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOperator::Mul, .. }));
    }

    #[test]
    fn ambiguous_minus_makes_a_list() {
        let expr = parse("5 -3");
        assert!(matches!(
            expr,
            Expr::List { ref items, separator: ListSeparator::Space, .. } if items.len() == 2
        ));
        let expr = parse("5 - 3");
        assert!(matches!(expr, Expr::Binary { op: BinaryOperator::Sub, .. }));
        let expr = parse("$a -$b");
        assert!(matches!(expr, Expr::Binary { op: BinaryOperator::Sub, .. }));
    }

    #[test]
    fn slash_records_parens_and_spacing() {
        let Expr::Binary { in_parens, space_before, .. } = parse("12px/1.5") else {
            panic!("expected binary");
        };
        assert!(!in_parens);
        assert!(!space_before);
        let Expr::Binary { in_parens, .. } = parse("(12px / 2)") else {
            panic!("expected binary");
        };
        assert!(in_parens);
    }

    #[test]
    fn maps_and_lists_in_parens() {
        assert!(matches!(parse("(a: 1, b: 2)"), Expr::Map(ref pairs) if pairs.len() == 2));
        assert!(matches!(
            parse("(1, 2, 3)"),
            Expr::List { separator: ListSeparator::Comma, .. }
        ));
        assert!(matches!(parse("()"), Expr::List { ref items, .. } if items.is_empty()));
        assert!(matches!(parse("[a b]"), Expr::List { bracketed: true, .. }));
    }

    #[test]
    fn strings_keep_interpolation_parts() {
        let Expr::String(s) = parse("\"a #{$b} c\"") else {
            panic!("expected string");
        };
        assert_eq!(s.quote, Some('"'));
        assert_eq!(s.parts.len(), 3);
        assert!(s.has_interpolation());
    }

    #[test]
    fn special_functions_stay_raw() {
        let Expr::String(s) = parse("calc(100% - #{$gap})") else {
            panic!("expected raw string");
        };
        assert!(matches!(&s.parts[0], StringPart::Literal(t) if t == "calc(100% - "));
        let Expr::String(s) = parse("url(img/a.png)") else {
            panic!("expected raw url");
        };
        assert_eq!(s.as_plain().as_deref(), Some("url(img/a.png)"));
        assert!(matches!(parse("url(\"a.png\")"), Expr::FunctionCall { .. }));
    }

    #[test]
    fn call_args_support_names_and_splats() {
        let Expr::FunctionCall { args, .. } = parse("f(1, $b: 2, $rest...)") else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 3);
        assert_eq!(args[1].name.as_deref(), Some("b"));
        assert!(args[2].splat);
    }

    #[test]
    fn colors_and_numbers() {
        assert!(matches!(parse("#fff"), Expr::Color { rgba, .. } if rgba[0] == 255.0));
        assert!(matches!(parse("-1.5em"), Expr::Number { value, ref unit } if value == -1.5 && unit == "em"));
        assert!(matches!(parse("50%"), Expr::Number { ref unit, .. } if unit == "%"));
    }

    #[test]
    fn important_is_a_keyword_but_default_is_not() {
        assert!(matches!(
            parse("red !important"),
            Expr::List { ref items, .. } if items[1] == Expr::keyword("!important")
        ));
        let mut p = ScssParser::new("1 !default", 0);
        let value = p.value_list();
        assert!(matches!(value, Some(Expr::Number { .. })));
        assert_eq!(p.rest(), "!default");
    }
}
