use crate::ast::expr::StringPart;
use crate::ast::media::{MediaQuery, MediaQueryPart};
use crate::parser::cursor::ScssParser;

impl<'a> ScssParser<'a> {
    pub(crate) fn media_query_list(&mut self) -> Option<Vec<MediaQuery>> {
        let start = self.pos;
        let mut queries = vec![self.media_query()?];
        while self.char(',') {
            match self.media_query() {
                Some(query) => queries.push(query),
                None => {
                    self.seek(start);
                    return None;
                }
            }
        }
        Some(queries)
    }

    fn media_query(&mut self) -> Option<MediaQuery> {
        let start = self.pos;
        let mut parts = Vec::new();

        loop {
            let part = if self.peek() == Some('(') {
                self.media_feature()
            } else if parts.is_empty() {
                self.media_type()
            } else {
                None
            };
            match part {
                Some(part) => parts.push(part),
                None => break,
            }
            if !self.keyword("and") {
                break;
            }
        }

        if parts.is_empty() {
            self.seek(start);
            return None;
        }
        Some(MediaQuery { parts })
    }

    /// `screen`, `only screen`, `not print`, or an interpolated/variable query.
    fn media_type(&mut self) -> Option<MediaQueryPart> {
        let start = self.pos;
        if self.peek() == Some('$') {
            let value = self.value()?;
            return Some(MediaQueryPart::Raw(value));
        }

        let mut modifier = None;
        for word in ["only", "not"] {
            if self.keyword(word) {
                modifier = Some(word.to_string());
                break;
            }
        }

        if modifier.is_none() && self.rest().starts_with("#{") {
            let text = self.interpolated_ident(true)?;
            if text.as_plain().is_none() && text.parts.len() == 1 {
                let value = match text.parts.into_iter().next() {
                    Some(StringPart::Interpolation(expr)) => *expr,
                    _ => {
                        self.seek(start);
                        return None;
                    }
                };
                return Some(MediaQueryPart::Raw(value));
            }
            return Some(MediaQueryPart::Type {
                modifier: None,
                name: text,
            });
        }

        if self.peek() == Some('(') {
            self.seek(start);
            return None;
        }

        let Some(name) = self.interpolated_ident(true) else {
            self.seek(start);
            return None;
        };
        if name.as_plain().is_some_and(|n| n.eq_ignore_ascii_case("and")) {
            self.seek(start);
            return None;
        }
        Some(MediaQueryPart::Type { modifier, name })
    }

    /// `(min-width: 10px)`, `(color)`, `(width >= 600px)`.
    fn media_feature(&mut self) -> Option<MediaQueryPart> {
        let start = self.pos;
        if !self.char('(') {
            return None;
        }
        let Some(name) = self.expression() else {
            self.seek(start);
            return None;
        };
        let value = if self.char(':') {
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
        if !self.char(')') {
            self.seek(start);
            return None;
        }
        Some(MediaQueryPart::Feature { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::Expr;

    fn parse(src: &str) -> Vec<MediaQuery> {
        let mut p = ScssParser::new(src, 0);
        let list = p.media_query_list().expect("media query");
        assert!(p.at_end(), "unparsed: {:?}", p.rest());
        list
    }

    #[test]
    fn type_and_features() {
        let queries = parse("only screen and (min-width: 10px) and (color), print");
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].parts.len(), 3);
        assert!(matches!(
            &queries[0].parts[0],
            MediaQueryPart::Type { modifier: Some(m), .. } if m == "only"
        ));
        assert!(matches!(
            &queries[0].parts[2],
            MediaQueryPart::Feature { value: None, .. }
        ));
    }

    #[test]
    fn variables_and_interpolation_are_raw() {
        let queries = parse("$tablet");
        assert!(matches!(&queries[0].parts[0], MediaQueryPart::Raw(Expr::Variable(v)) if v == "tablet"));
        let queries = parse("#{$q}");
        assert!(matches!(&queries[0].parts[0], MediaQueryPart::Raw(_)));
    }

    #[test]
    fn feature_value_may_be_an_expression() {
        let queries = parse("(max-width: $bp - 1)");
        assert!(matches!(
            &queries[0].parts[0],
            MediaQueryPart::Feature { value: Some(Expr::Binary { .. }), .. }
        ));
    }
}
