//! Rendering of the output tree to CSS text.
//!
//! Nested rule blocks are flattened: a rule's lines are written under its own
//! selectors and its child rules follow as siblings. At-rule blocks keep
//! their children nested inside them.

use std::fmt;

use scss::ast::SourcePos;

use crate::output::{BlockId, LineKind, OutputBlock, OutputKind, OutputLine, OutputTree, ROOT_BLOCK};
use crate::selector::render;
use crate::source_map::SourceMapBuilder;

/// Punctuation and layout of one output style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    /// One level of indentation.
    pub indent: &'static str,
    /// Between a selector or at-rule prelude and `{`.
    pub open: &'static str,
    /// After `{`, between lines, and before `}` of a rule.
    pub line_break: &'static str,
    /// After a closing `}` or a top-level at-rule.
    pub block_break: &'static str,
    /// Between the selectors of one rule.
    pub selector_separator: &'static str,
    /// Between a property and its value.
    pub colon: &'static str,
    /// Drop the semicolon after the last line of a block.
    pub drop_last_semicolon: bool,
    /// Nest child blocks of at-rules one indent deeper.
    pub indent_nested: bool,
}

impl Style {
    pub const EXPANDED: Style = Style {
        indent: "  ",
        open: " {",
        line_break: "\n",
        block_break: "\n",
        selector_separator: ",\n",
        colon: ": ",
        drop_last_semicolon: false,
        indent_nested: true,
    };

    pub const COMPACT: Style = Style {
        indent: "",
        open: " {",
        line_break: " ",
        block_break: "\n",
        selector_separator: ", ",
        colon: ": ",
        drop_last_semicolon: false,
        indent_nested: false,
    };

    pub const COMPRESSED: Style = Style {
        indent: "",
        open: "{",
        line_break: "",
        block_break: "",
        selector_separator: ",",
        colon: ":",
        drop_last_semicolon: true,
        indent_nested: false,
    };
}

/// Output text with the current generated position, recording source map
/// mappings when a builder is attached.
pub struct Writer<'m> {
    out: String,
    line: usize,
    column: usize,
    map: Option<&'m mut SourceMapBuilder>,
}

impl<'m> Writer<'m> {
    pub fn new(map: Option<&'m mut SourceMapBuilder>) -> Self {
        Writer {
            out: String::new(),
            line: 0,
            column: 0,
            map,
        }
    }

    /// Write `text`, mapping its start to `pos` when given.
    pub fn write(&mut self, text: &str, pos: Option<&SourcePos>) {
        if let (Some(map), Some(pos)) = (self.map.as_deref_mut(), pos) {
            if pos.line > 0 && !text.is_empty() {
                map.add(self.line, self.column, pos.file_id, pos.line, pos.column);
            }
        }
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += c.len_utf16();
            }
        }
        self.out.push_str(text);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Pluggable renderer of the output tree.
pub trait Formatter: fmt::Debug + Send + Sync {
    fn format(&self, tree: &OutputTree, writer: &mut Writer<'_>);

    /// Whether values should be serialized in their shortest form.
    fn compressed(&self) -> bool {
        false
    }
}

/// The built-in formatter, driven by a [`Style`].
#[derive(Debug, Clone)]
pub struct StyledFormatter {
    pub style: Style,
}

impl StyledFormatter {
    pub fn expanded() -> Self {
        StyledFormatter { style: Style::EXPANDED }
    }

    pub fn compact() -> Self {
        StyledFormatter { style: Style::COMPACT }
    }

    pub fn compressed() -> Self {
        StyledFormatter { style: Style::COMPRESSED }
    }

    fn indent(&self, level: usize) -> String {
        self.style.indent.repeat(level)
    }

    fn line_text(&self, line: &OutputLine) -> String {
        match &line.kind {
            LineKind::Declaration { name, value } => format!("{}{}{}", name, self.style.colon, value),
            LineKind::Comment(text) => text.clone(),
            LineKind::AtRule(text) => text.clone(),
        }
    }

    /// Write the lines of a block between its braces. `closing` is set when
    /// nothing follows them before the closing brace.
    fn write_lines(&self, lines: &[OutputLine], level: usize, closing: bool, w: &mut Writer<'_>) {
        let inner = self.indent(level);
        let count = lines.len();
        for (i, line) in lines.iter().enumerate() {
            let text = self.line_text(line);
            let is_comment = matches!(line.kind, LineKind::Comment(_));
            let last = i + 1 == count;
            w.write(&inner, None);
            w.write(&text, Some(&line.pos));
            if !is_comment && !(last && closing && self.style.drop_last_semicolon) {
                w.write(";", None);
            }
            if !last {
                w.write(self.style.line_break, None);
            }
        }
    }

    fn open_block(&self, prelude: &str, pos: &SourcePos, level: usize, w: &mut Writer<'_>) {
        w.write(&self.indent(level), None);
        w.write(prelude, Some(pos));
        w.write(self.style.open, None);
    }

    fn close_block(&self, level: usize, w: &mut Writer<'_>) {
        if self.style.line_break == "\n" {
            w.write(&self.indent(level), None);
        }
        w.write("}", None);
        w.write(self.style.block_break, None);
    }

    fn write_rule(&self, tree: &OutputTree, block: &OutputBlock, level: usize, w: &mut Writer<'_>) {
        if !block.selectors.is_empty() && !block.lines.is_empty() {
            let separator = if self.style.selector_separator.ends_with('\n') {
                format!("{}{}", self.style.selector_separator, self.indent(level))
            } else {
                self.style.selector_separator.to_string()
            };
            let selectors = block.selectors.iter().map(render).collect::<Vec<_>>().join(&separator);
            self.open_block(&selectors, &block.pos, level, w);
            w.write(self.style.line_break, None);
            self.write_lines(&block.lines, level + 1, true, w);
            w.write(self.style.line_break, None);
            self.close_block(level, w);
        }
        for &child in &block.children {
            self.write_block(tree, child, level, w);
        }
    }

    fn write_at_rule(&self, tree: &OutputTree, block: &OutputBlock, level: usize, w: &mut Writer<'_>) {
        let header = block.header.as_deref().unwrap_or_default();
        self.open_block(header, &block.pos, level, w);
        let inner = if self.style.indent_nested { level + 1 } else { level };
        let has_children = block.children.iter().any(|&c| !tree.is_empty(c));
        if !block.lines.is_empty() {
            w.write(self.style.line_break, None);
            self.write_lines(&block.lines, level + 1, !has_children, w);
        }
        if has_children {
            w.write(if self.style.line_break.is_empty() { "" } else { "\n" }, None);
            for &child in &block.children {
                self.write_block(tree, child, inner, w);
            }
            if self.style.line_break == "\n" || self.style.indent_nested {
                w.write(&self.indent(level), None);
            }
            w.write("}", None);
            w.write(self.style.block_break, None);
        } else {
            w.write(self.style.line_break, None);
            self.close_block(level, w);
        }
    }

    fn write_block(&self, tree: &OutputTree, id: BlockId, level: usize, w: &mut Writer<'_>) {
        if tree.is_empty(id) {
            return;
        }
        let block = tree.block(id);
        match block.kind {
            OutputKind::Root => {
                for &child in &block.children {
                    self.write_block(tree, child, level, w);
                }
            }
            OutputKind::Rule => self.write_rule(tree, block, level, w),
            OutputKind::Media | OutputKind::Supports | OutputKind::Directive => {
                self.write_at_rule(tree, block, level, w)
            }
            OutputKind::Comment => {
                w.write(&self.indent(level), None);
                w.write(block.header.as_deref().unwrap_or_default(), Some(&block.pos));
                w.write(self.style.block_break, None);
            }
            OutputKind::AtRule => {
                w.write(&self.indent(level), None);
                w.write(block.header.as_deref().unwrap_or_default(), Some(&block.pos));
                w.write(";", None);
                w.write(self.style.block_break, None);
            }
        }
    }
}

impl Formatter for StyledFormatter {
    fn format(&self, tree: &OutputTree, w: &mut Writer<'_>) {
        for import in &tree.imports {
            w.write(&self.line_text(import), Some(&import.pos));
            w.write(";", None);
            w.write(self.style.block_break, None);
        }
        self.write_block(tree, ROOT_BLOCK, 0, w);
    }

    fn compressed(&self) -> bool {
        self.style.drop_last_semicolon
    }
}

/// Whether any text in the tree needs a charset declaration.
pub fn has_non_ascii(tree: &OutputTree) -> bool {
    let line_text = |line: &OutputLine| match &line.kind {
        LineKind::Declaration { name, value } => !name.is_ascii() || !value.is_ascii(),
        LineKind::Comment(text) | LineKind::AtRule(text) => !text.is_ascii(),
    };
    tree.imports.iter().any(line_text)
        || (0..tree.len()).any(|id| {
            let block = tree.block(id);
            block.header.as_deref().is_some_and(|h| !h.is_ascii())
                || block.lines.iter().any(line_text)
                || block
                    .selectors
                    .iter()
                    .any(|parts| parts.iter().flatten().any(|p| !p.is_ascii()))
        })
}

/// Render `tree` with `formatter`, prefixing a charset declaration (or a BOM
/// when compressed) if the output is not plain ASCII.
pub fn format_tree(formatter: &dyn Formatter, tree: &OutputTree, map: Option<&mut SourceMapBuilder>) -> String {
    let mut w = Writer::new(map);
    if tree.charset.is_some() || has_non_ascii(tree) {
        if formatter.compressed() {
            w.write("\u{FEFF}", None);
        } else {
            w.write("@charset \"UTF-8\";\n", None);
        }
    }
    formatter.format(tree, &mut w);
    let mut css = w.finish();
    let trimmed = css.trim_end_matches('\n').len();
    css.truncate(trimmed);
    css
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::list_to_parts;

    fn rule(tree: &mut OutputTree, parent: BlockId, selector: &str, decls: &[(&str, &str)]) -> BlockId {
        let id = tree.push(OutputKind::Rule, parent, SourcePos::default());
        tree.block_mut(id).selectors =
            list_to_parts(&scss::parser::parse_selector_list(selector).unwrap());
        for (name, value) in decls {
            tree.add_line(
                id,
                LineKind::Declaration {
                    name: name.to_string(),
                    value: value.to_string(),
                },
                SourcePos::default(),
            );
        }
        id
    }

    fn sample() -> OutputTree {
        let mut tree = OutputTree::new();
        let a = rule(&mut tree, ROOT_BLOCK, ".a", &[("width", "2px")]);
        rule(&mut tree, a, ".a .b", &[("color", "red"), ("margin", "0")]);
        let media = tree.push(OutputKind::Media, ROOT_BLOCK, SourcePos::default());
        tree.block_mut(media).header = Some("@media screen".into());
        rule(&mut tree, media, ".c", &[("top", "0")]);
        rule(&mut tree, ROOT_BLOCK, ".empty", &[]);
        tree
    }

    #[test]
    fn expanded_output() {
        let css = format_tree(&StyledFormatter::expanded(), &sample(), None);
        assert_eq!(
            css,
            ".a {\n  width: 2px;\n}\n.a .b {\n  color: red;\n  margin: 0;\n}\n@media screen {\n  .c {\n    top: 0;\n  }\n}"
        );
    }

    #[test]
    fn compact_output() {
        let css = format_tree(&StyledFormatter::compact(), &sample(), None);
        assert_eq!(
            css,
            ".a { width: 2px; }\n.a .b { color: red; margin: 0; }\n@media screen {\n.c { top: 0; }\n}"
        );
    }

    #[test]
    fn compressed_output() {
        let css = format_tree(&StyledFormatter::compressed(), &sample(), None);
        assert_eq!(css, ".a{width:2px}.a .b{color:red;margin:0}@media screen{.c{top:0}}");
    }

    #[test]
    fn non_ascii_output_declares_a_charset() {
        let mut tree = OutputTree::new();
        rule(&mut tree, ROOT_BLOCK, ".a", &[("content", "\"é\"")]);
        let css = format_tree(&StyledFormatter::compact(), &tree, None);
        assert!(css.starts_with("@charset \"UTF-8\";\n.a"));
        let css = format_tree(&StyledFormatter::compressed(), &tree, None);
        assert!(css.starts_with('\u{FEFF}'));
    }
}
