use std::ops::Range;

use crate::ast::expr::{Expr, Params, StringExpr, StringPart};
use crate::ast::media::{MediaQuery, MediaQueryPart};
use crate::ast::{Block, BlockKind, SourcePos, Statement, StatementKind};
use crate::parser::cursor::{OpenBlock, PendingInclude, ScssParser, VARIABLE};
use crate::parser::error::ParseError;

type Chunk = Result<bool, ParseError>;

impl<'a> ScssParser<'a> {
    /// Parse the whole buffer into the root block.
    pub(crate) fn parse_root(&mut self) -> Result<Block, ParseError> {
        let root = Block::new(BlockKind::Root, self.pos_from(0));
        self.stack.push(OpenBlock {
            block: root,
            include: None,
        });
        self.whitespace();

        loop {
            self.flush_comments();
            if self.at_end() {
                break;
            }
            if !self.parse_chunk()? {
                return Err(self.error("parse error"));
            }
        }

        if self.stack.len() > 1 {
            let open = &self.stack[self.stack.len() - 1].block;
            return Err(self
                .error_at(open.pos.span.start, format!("unclosed {} block", open.kind_name()))
                .with_note("expected \"}\" before end of input"));
        }
        let mut root = self
            .stack
            .pop()
            .map(|open| open.block)
            .ok_or_else(|| self.error("parse error"))?;
        root.pos.span = 0..self.src.len();
        Ok(root)
    }

    // -----------------------------------------------------------------------
    // Block stack
    // -----------------------------------------------------------------------

    fn push_block(&mut self, kind: BlockKind, start: usize) {
        let block = Block::new(kind, self.pos_from(start));
        self.stack.push(OpenBlock {
            block,
            include: None,
        });
    }

    fn append(&mut self, kind: StatementKind, start: usize) {
        let pos = self.pos_from(start);
        self.append_at(kind, pos);
    }

    fn append_at(&mut self, kind: StatementKind, pos: SourcePos) {
        if let Some(top) = self.stack.last_mut() {
            top.block.children.push(Statement::new(kind, pos));
        }
    }

    /// Close the innermost block and attach it to its owner.
    fn pop_block(&mut self, close: usize) -> Result<(), ParseError> {
        if self.stack.len() <= 1 {
            return Err(self.error_at(close, "unexpected \"}\""));
        }
        let Some(open) = self.stack.pop() else {
            return Err(self.error_at(close, "unexpected \"}\""));
        };
        let mut block = open.block;
        block.pos.span.end = self.pos;

        if let Some(include) = open.include {
            self.append_at(
                StatementKind::Include {
                    name: include.name,
                    args: include.args,
                    content: Some(Box::new(block)),
                },
                include.pos,
            );
            return Ok(());
        }

        if matches!(block.kind, BlockKind::Else { .. }) {
            let else_start = block.pos.span.start;
            let owner = self
                .stack
                .last_mut()
                .and_then(|top| {
                    top.block
                        .children
                        .iter_mut()
                        .rev()
                        .find(|s| !matches!(s.kind, StatementKind::Comment(_)))
                })
                .and_then(|stmt| match &mut stmt.kind {
                    StatementKind::Block(Block {
                        kind: BlockKind::If { cases, .. },
                        ..
                    }) => Some(cases),
                    _ => None,
                });
            let attached = match owner {
                Some(cases) => {
                    cases.push(block);
                    true
                }
                None => false,
            };
            if !attached {
                return Err(self.error_at(else_start, "unexpected @else: no matching @if"));
            }
            return Ok(());
        }

        let pos = block.pos.clone();
        self.append_at(StatementKind::Block(block), pos);
        Ok(())
    }

    /// Turn pending loud comments into statements of the current block.
    fn flush_comments(&mut self) {
        for range in self.take_comments() {
            let text = self.comment_text(range.clone());
            let (line, column) = self.line_col(range.start);
            let pos = SourcePos {
                file_id: self.file_id,
                span: range,
                line,
                column,
            };
            self.append_at(StatementKind::Comment(text), pos);
        }
    }

    fn comment_text(&mut self, range: Range<usize>) -> StringExpr {
        let text = &self.src[range.clone()];
        if !text.contains("#{") {
            return StringExpr::plain(text);
        }
        let saved = self.pos;
        let mut parts = Vec::new();
        self.seek(range.start);
        while self.pos < range.end {
            let rest = &self.src[self.pos..range.end];
            let next = rest.find("#{").unwrap_or(rest.len());
            if next > 0 {
                parts.push(StringPart::Literal(rest[..next].to_string()));
                self.advance(next);
                continue;
            }
            match self.interpolation() {
                Some(expr) if self.pos <= range.end => {
                    parts.push(StringPart::Interpolation(Box::new(expr)))
                }
                _ => {
                    self.seek(range.start);
                    parts = vec![StringPart::Literal(text.to_string())];
                    break;
                }
            }
        }
        self.seek(saved);
        StringExpr { quote: None, parts }
    }

    /// Statement terminator: `;`, or a closing brace / end of input left unconsumed.
    fn end(&mut self) -> bool {
        self.char(';') || self.peek() == Some('}') || self.at_end()
    }

    // -----------------------------------------------------------------------
    // Chunks
    // -----------------------------------------------------------------------

    fn parse_chunk(&mut self) -> Chunk {
        let start = self.pos;

        if self.peek() == Some('@') {
            return self.directive(start);
        }
        if self.property_shortcut(start) {
            return Ok(true);
        }
        if self.peek() == Some('$') {
            if self.variable_assignment(start) {
                return Ok(true);
            }
            return Ok(false);
        }
        if self.custom_property(start) {
            return Ok(true);
        }
        if self.rule(start) {
            return Ok(true);
        }
        if self.property(start) {
            return Ok(true);
        }
        if self.char('}') {
            self.pop_block(start)?;
            return Ok(true);
        }
        if self.char(';') {
            return Ok(true);
        }
        Ok(false)
    }

    /// `name: value;` with a plain identifier name.
    fn property_shortcut(&mut self, start: usize) -> bool {
        if self.rest().starts_with("--") {
            return false;
        }
        let Some(name) = self.ident(true) else {
            return false;
        };
        if !self.char(':') || self.peek() == Some(':') {
            self.seek(start);
            return false;
        }
        let Some(value) = self.value_list() else {
            self.seek(start);
            return false;
        };
        if !self.end() {
            self.seek(start);
            return false;
        }
        self.append(
            StatementKind::Declaration {
                name: StringExpr::plain(name),
                value,
                custom: false,
            },
            start,
        );
        true
    }

    fn variable_assignment(&mut self, start: usize) -> bool {
        let Some(caps) = self.match_regex(&VARIABLE, true) else {
            return false;
        };
        let name = caps[1].to_string();
        if !self.char(':') {
            self.seek(start);
            return false;
        }
        let Some(value) = self.value_list() else {
            self.seek(start);
            return false;
        };

        let mut default = false;
        let mut global = false;
        loop {
            let flag_start = self.pos;
            if self.char('!') {
                if self.keyword("default") {
                    default = true;
                    continue;
                }
                if self.keyword("global") {
                    global = true;
                    continue;
                }
                self.seek(flag_start);
            }
            break;
        }

        if !self.end() {
            self.seek(start);
            return false;
        }
        self.append(
            StatementKind::Assign {
                name,
                value,
                default,
                global,
            },
            start,
        );
        true
    }

    /// `--name: anything;` keeps the value as raw text.
    fn custom_property(&mut self, start: usize) -> bool {
        if !self.rest().starts_with("--") {
            return false;
        }
        let Some(name) = self.property_name() else {
            return false;
        };
        if !self.match_char(':', false) {
            self.seek(start);
            return false;
        }
        let value = self
            .scan_text(&[';', '}'], true)
            .unwrap_or_else(|| StringExpr::plain(""));
        if !self.end() {
            self.seek(start);
            return false;
        }
        self.append(
            StatementKind::Declaration {
                name,
                value: Expr::String(value),
                custom: true,
            },
            start,
        );
        true
    }

    fn rule(&mut self, start: usize) -> bool {
        let Some(selectors) = self.selector_source(&['{']) else {
            return false;
        };
        if !self.char('{') {
            self.seek(start);
            return false;
        }
        self.push_block(BlockKind::Rule { selectors }, start);
        true
    }

    /// `name: value;`, `name: { ... }` or `name: value { ... }`.
    fn property(&mut self, start: usize) -> bool {
        let Some(name) = self.property_name() else {
            return false;
        };
        if !self.char(':') {
            self.seek(start);
            return false;
        }
        if self.char('{') {
            self.push_block(
                BlockKind::NestedProperty {
                    prefix: name,
                    value: None,
                },
                start,
            );
            return true;
        }
        let Some(value) = self.value_list() else {
            self.seek(start);
            return false;
        };
        if self.char('{') {
            self.push_block(
                BlockKind::NestedProperty {
                    prefix: name,
                    value: Some(value),
                },
                start,
            );
            return true;
        }
        if !self.end() {
            self.seek(start);
            return false;
        }
        self.append(
            StatementKind::Declaration {
                name,
                value,
                custom: false,
            },
            start,
        );
        true
    }

    // -----------------------------------------------------------------------
    // Directives
    // -----------------------------------------------------------------------

    fn directive(&mut self, start: usize) -> Chunk {
        self.advance(1);
        let Some(name) = self.ident(false) else {
            self.seek(start);
            return Ok(false);
        };
        let lower = name.to_ascii_lowercase();
        self.whitespace();

        let matched = match lower.as_str() {
            "media" => self.media_directive(start),
            "mixin" => self.callable_directive(start, false),
            "function" => self.callable_directive(start, true),
            "include" => self.include_directive(start),
            "import" => self.import_directive(start),
            "extend" => self.extend_directive(start),
            "return" => self.expression_statement(start, StatementKind::Return),
            "debug" => self.expression_statement(start, StatementKind::Debug),
            "warn" => self.expression_statement(start, StatementKind::Warn),
            "error" => self.expression_statement(start, StatementKind::Error),
            "each" => self.each_directive(start),
            "while" => self.while_directive(start),
            "for" => self.for_directive(start),
            "if" => self.if_directive(start),
            "else" => self.else_directive(start, false),
            "elseif" => self.else_directive(start, true),
            "content" => self.content_directive(start),
            "charset" => self.charset_directive(start),
            "supports" => self.supports_directive(start),
            "at-root" => self.at_root_directive(start),
            _ => return Ok(self.generic_directive(start, name)),
        };
        if matched {
            return Ok(true);
        }
        self.seek(start);
        Err(self.error(format!("invalid @{} directive", lower)))
    }

    fn media_directive(&mut self, start: usize) -> bool {
        let queries = match self.media_query_list() {
            Some(queries) if self.peek() == Some('{') => queries,
            _ => {
                // Anything else is kept as text and re-parsed after evaluation.
                let Some(text) = self.interpolated_text(&['{', ';', '}']) else {
                    return false;
                };
                vec![MediaQuery {
                    parts: vec![MediaQueryPart::Raw(Expr::String(text))],
                }]
            }
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(BlockKind::Media { queries }, start);
        true
    }

    fn callable_directive(&mut self, start: usize, function: bool) -> bool {
        let Some(name) = self.ident(true) else {
            return false;
        };
        let params = if self.peek() == Some('(') {
            match self.params() {
                Some(params) => params,
                None => return false,
            }
        } else {
            Params::default()
        };
        if !self.char('{') {
            return false;
        }
        let kind = if function {
            BlockKind::Function { name, params }
        } else {
            BlockKind::Mixin { name, params }
        };
        self.push_block(kind, start);
        true
    }

    fn include_directive(&mut self, start: usize) -> bool {
        let Some(name) = self.ident(false) else {
            return false;
        };
        let args = if self.match_char('(', true) {
            match self.call_args() {
                Some(args) => args,
                None => return false,
            }
        } else {
            self.whitespace();
            Vec::new()
        };

        let using = if self.keyword("using") {
            match self.params() {
                Some(params) => Some(params),
                None => return false,
            }
        } else {
            None
        };

        if self.peek() == Some('{') {
            let content_start = self.pos;
            self.advance(1);
            self.whitespace();
            let include_pos = self.pos_from(start);
            let content = Block::new(
                BlockKind::Content {
                    params: using.unwrap_or_default(),
                },
                self.pos_from(content_start),
            );
            self.stack.push(OpenBlock {
                block: content,
                include: Some(PendingInclude {
                    name,
                    args,
                    pos: include_pos,
                }),
            });
            return true;
        }

        if using.is_some() || !self.end() {
            return false;
        }
        self.append(
            StatementKind::Include {
                name,
                args,
                content: None,
            },
            start,
        );
        true
    }

    fn import_directive(&mut self, start: usize) -> bool {
        let mut targets = Vec::new();
        loop {
            match self.value() {
                Some(target) => targets.push(target),
                None => return false,
            }
            if !self.char(',') {
                break;
            }
        }
        let media = if self.end() {
            None
        } else {
            let media = self.interpolated_text(&[';', '}']);
            if !self.end() {
                return false;
            }
            media
        };
        self.append(StatementKind::Import { targets, media }, start);
        true
    }

    fn extend_directive(&mut self, start: usize) -> bool {
        let Some(selectors) = self.selector_source(&[';', '}', '!']) else {
            return false;
        };
        let mut optional = false;
        let flag_start = self.pos;
        if self.char('!') {
            if self.keyword("optional") {
                optional = true;
            } else {
                self.seek(flag_start);
            }
        }
        if !self.end() {
            return false;
        }
        self.append(StatementKind::Extend { selectors, optional }, start);
        true
    }

    fn expression_statement(&mut self, start: usize, make: fn(Expr) -> StatementKind) -> bool {
        let Some(value) = self.value_list() else {
            return false;
        };
        if !self.end() {
            return false;
        }
        self.append(make(value), start);
        true
    }

    fn each_directive(&mut self, start: usize) -> bool {
        let mut vars = Vec::new();
        loop {
            let Some(caps) = self.match_regex(&VARIABLE, true) else {
                return false;
            };
            vars.push(caps[1].to_string());
            if !self.char(',') {
                break;
            }
        }
        if !self.keyword("in") {
            return false;
        }
        let Some(list) = self.value_list() else {
            return false;
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(BlockKind::Each { vars, list }, start);
        true
    }

    fn while_directive(&mut self, start: usize) -> bool {
        let Some(condition) = self.value_list() else {
            return false;
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(BlockKind::While { condition }, start);
        true
    }

    fn for_directive(&mut self, start: usize) -> bool {
        let Some(caps) = self.match_regex(&VARIABLE, true) else {
            return false;
        };
        let var = caps[1].to_string();
        if !self.keyword("from") {
            return false;
        }
        let Some(from) = self.expression() else {
            return false;
        };
        let inclusive = if self.keyword("through") {
            true
        } else if self.keyword("to") {
            false
        } else {
            return false;
        };
        let Some(end) = self.expression() else {
            return false;
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(
            BlockKind::For {
                var,
                start: from,
                end,
                inclusive,
            },
            start,
        );
        true
    }

    fn if_directive(&mut self, start: usize) -> bool {
        let Some(condition) = self.value_list() else {
            return false;
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(
            BlockKind::If {
                condition,
                cases: Vec::new(),
            },
            start,
        );
        true
    }

    fn else_directive(&mut self, start: usize, joined_if: bool) -> bool {
        let condition = if joined_if || self.keyword("if") {
            match self.value_list() {
                Some(condition) => Some(condition),
                None => return false,
            }
        } else {
            None
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(BlockKind::Else { condition }, start);
        true
    }

    fn content_directive(&mut self, start: usize) -> bool {
        let args = if self.match_char('(', true) {
            match self.call_args() {
                Some(args) => args,
                None => return false,
            }
        } else {
            Vec::new()
        };
        if !self.end() {
            return false;
        }
        self.append(StatementKind::Content { args }, start);
        true
    }

    fn charset_directive(&mut self, start: usize) -> bool {
        let charset = match self.quoted_string() {
            Some(s) => s.as_plain(),
            None => self.ident(true),
        };
        let Some(charset) = charset else {
            return false;
        };
        if !self.end() {
            return false;
        }
        self.append(StatementKind::Charset(charset), start);
        true
    }

    fn supports_directive(&mut self, start: usize) -> bool {
        let Some(condition) = self.interpolated_text(&['{', ';', '}']) else {
            return false;
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(BlockKind::Supports { condition }, start);
        true
    }

    /// `@at-root [selector] {` or `@at-root (with|without: ...) {`.
    fn at_root_directive(&mut self, start: usize) -> bool {
        let mut query = None;
        if self.peek() == Some('(') {
            let Some(value) = self.value() else {
                return false;
            };
            query = Some(value);
        }
        let selectors = if query.is_none() && self.peek() != Some('{') {
            match self.selector_source(&['{']) {
                Some(selectors) => Some(selectors),
                None => return false,
            }
        } else {
            None
        };
        if !self.char('{') {
            return false;
        }
        self.push_block(BlockKind::AtRoot { selectors, query }, start);
        true
    }

    /// Any other at-rule, with or without a body.
    fn generic_directive(&mut self, start: usize, name: String) -> bool {
        let value = self.interpolated_text(&['{', ';', '}']);
        if self.char('{') {
            self.push_block(BlockKind::Directive { name, value }, start);
            return true;
        }
        if self.end() {
            self.append(StatementKind::Directive { name, value }, start);
            return true;
        }
        self.seek(start);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Block {
        ScssParser::new(src, 0).parse_root().expect("parse")
    }

    fn child_block(block: &Block, index: usize) -> &Block {
        match &block.children[index].kind {
            StatementKind::Block(b) => b,
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn nested_rules_and_declarations() {
        let root = parse("$x: 1px; .a { width: $x * 2; .b { color: red; } }");
        assert_eq!(root.children.len(), 2);
        assert!(matches!(root.children[0].kind, StatementKind::Assign { .. }));
        let a = child_block(&root, 1);
        assert!(matches!(a.kind, BlockKind::Rule { .. }));
        assert_eq!(a.children.len(), 2);
        assert!(matches!(child_block(a, 1).kind, BlockKind::Rule { .. }));
    }

    #[test]
    fn assignment_flags() {
        let root = parse("$a: 1 !default !global;");
        assert!(matches!(
            root.children[0].kind,
            StatementKind::Assign { default: true, global: true, .. }
        ));
    }

    #[test]
    fn else_chains_attach_to_if() {
        let root = parse("@if $a { x: 1 } /* c */ @else if $b { x: 2 } @else { x: 3 }");
        let BlockKind::If { cases, .. } = &child_block(&root, 0).kind else {
            panic!("expected @if");
        };
        assert_eq!(cases.len(), 2);
        assert!(matches!(cases[0].kind, BlockKind::Else { condition: Some(_) }));
        assert!(matches!(cases[1].kind, BlockKind::Else { condition: None }));
    }

    #[test]
    fn include_with_content_block() {
        let root = parse("@include m(1, $b: 2) using ($x) { a: $x; }");
        let StatementKind::Include { name, args, content } = &root.children[0].kind else {
            panic!("expected include");
        };
        assert_eq!(name, "m");
        assert_eq!(args.len(), 2);
        let content = content.as_ref().expect("content");
        assert!(matches!(&content.kind, BlockKind::Content { params } if params.params.len() == 1));
        assert_eq!(content.children.len(), 1);
    }

    #[test]
    fn nested_properties() {
        let root = parse(".a { font: 12px { weight: bold; } margin: { top: 1px; } }");
        let a = child_block(&root, 0);
        assert!(matches!(child_block(a, 0).kind, BlockKind::NestedProperty { value: Some(_), .. }));
        assert!(matches!(child_block(a, 1).kind, BlockKind::NestedProperty { value: None, .. }));
    }

    #[test]
    fn pseudo_selector_is_not_a_property() {
        let root = parse("a:hover { color: red }");
        assert!(matches!(child_block(&root, 0).kind, BlockKind::Rule { .. }));
    }

    #[test]
    fn loud_comments_are_kept() {
        let root = parse("/* top */\n.a { /* in #{1 + 1} */ b: c; }");
        assert!(matches!(root.children[0].kind, StatementKind::Comment(_)));
        let a = child_block(&root, 1);
        let StatementKind::Comment(text) = &a.children[0].kind else {
            panic!("expected comment");
        };
        assert!(text.has_interpolation());
    }

    #[test]
    fn generic_directives_and_keyframes() {
        let root = parse("@font-face { font-family: x; } @keyframes spin { from { a: b } 50% { a: c } }");
        assert!(matches!(&child_block(&root, 0).kind, BlockKind::Directive { name, value: None } if name == "font-face"));
        let spin = child_block(&root, 1);
        assert_eq!(spin.children.len(), 2);
    }

    #[test]
    fn custom_properties_are_raw() {
        let root = parse(":root { --main: { a: b }; --x: 1px  solid; }");
        let r = child_block(&root, 0);
        assert!(matches!(&r.children[0].kind, StatementKind::Declaration { custom: true, .. }));
        let StatementKind::Declaration { value: Expr::String(s), .. } = &r.children[1].kind else {
            panic!("expected raw value");
        };
        assert_eq!(s.as_plain().as_deref(), Some("1px  solid"));
    }

    #[test]
    fn syntax_errors_carry_position() {
        let err = ScssParser::new(".a {\n  color: red;\n  ) \n}", 0)
            .parse_root()
            .unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 3);
        assert!(err.message.contains("failed at `)`"));
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let err = ScssParser::new(".a { color: red;", 0).parse_root().unwrap_err();
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn known_directive_failure_is_an_error() {
        let err = ScssParser::new("@include ;", 0).parse_root().unwrap_err();
        assert!(err.message.contains("invalid @include"));
    }
}
