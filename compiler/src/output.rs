//! The CSS tree produced by evaluation.
//!
//! Blocks live in an arena and refer to each other by index. Rule blocks are
//! nested the way their source rules were; formatters flatten them. At-rule
//! blocks are attached to the closest ancestor that is not a rule.

use scss::ast::SourcePos;

use crate::extend::ExtendEngine;
use crate::selector::{has_placeholder, Parts};

pub type BlockId = usize;

pub const ROOT_BLOCK: BlockId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Root,
    Rule,
    Media,
    Supports,
    /// `@font-face`, `@keyframes`, `@page` and other at-rules with a body.
    Directive,
    /// A loud comment outside any rule.
    Comment,
    /// A body-less at-rule outside any rule, e.g. `@namespace svg url(x)`.
    AtRule,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Declaration { name: String, value: String },
    Comment(String),
    /// A body-less at-rule such as `@namespace` inside a block.
    AtRule(String),
}

#[derive(Debug, Clone)]
pub struct OutputLine {
    pub kind: LineKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone)]
pub struct OutputBlock {
    pub kind: OutputKind,
    /// Rule selectors in parts form.
    pub selectors: Vec<Parts>,
    /// Prelude of an at-rule (`@media screen`), or the text of a comment.
    pub header: Option<String>,
    pub lines: Vec<OutputLine>,
    pub children: Vec<BlockId>,
    pub parent: Option<BlockId>,
    pub depth: usize,
    pub pos: SourcePos,
}

impl OutputBlock {
    pub fn is_at_rule(&self) -> bool {
        matches!(
            self.kind,
            OutputKind::Media | OutputKind::Supports | OutputKind::Directive
        )
    }
}

#[derive(Debug)]
pub struct OutputTree {
    blocks: Vec<OutputBlock>,
    /// `@charset` declared by the source.
    pub charset: Option<String>,
    /// Plain CSS `@import`s, emitted before everything else.
    pub imports: Vec<OutputLine>,
}

impl Default for OutputTree {
    fn default() -> Self {
        OutputTree::new()
    }
}

impl OutputTree {
    pub fn new() -> Self {
        OutputTree {
            blocks: vec![OutputBlock {
                kind: OutputKind::Root,
                selectors: Vec::new(),
                header: None,
                lines: Vec::new(),
                children: Vec::new(),
                parent: None,
                depth: 0,
                pos: SourcePos::default(),
            }],
            charset: None,
            imports: Vec::new(),
        }
    }

    pub fn block(&self, id: BlockId) -> &OutputBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut OutputBlock {
        &mut self.blocks[id]
    }

    /// Create a block and append it to `parent`'s children.
    pub fn push(&mut self, kind: OutputKind, parent: BlockId, pos: SourcePos) -> BlockId {
        let id = self.blocks.len();
        let depth = self.blocks[parent].depth + 1;
        self.blocks.push(OutputBlock {
            kind,
            selectors: Vec::new(),
            header: None,
            lines: Vec::new(),
            children: Vec::new(),
            parent: Some(parent),
            depth,
            pos,
        });
        self.blocks[parent].children.push(id);
        id
    }

    pub fn add_line(&mut self, id: BlockId, kind: LineKind, pos: SourcePos) {
        self.blocks[id].lines.push(OutputLine { kind, pos });
    }

    /// Closest block at or above `id` that can hold an at-rule.
    pub fn bubble_target(&self, mut id: BlockId) -> BlockId {
        while self.blocks[id].kind == OutputKind::Rule {
            match self.blocks[id].parent {
                Some(parent) => id = parent,
                None => break,
            }
        }
        id
    }

    /// Deep-copy `source` and its descendants as a new child of `parent`.
    pub fn copy_subtree(&mut self, source: BlockId, parent: BlockId) -> BlockId {
        let original = self.blocks[source].clone();
        let id = self.push(original.kind, parent, original.pos.clone());
        {
            let copy = &mut self.blocks[id];
            copy.selectors = original.selectors;
            copy.header = original.header;
            copy.lines = original.lines;
        }
        for child in original.children {
            self.copy_subtree(child, id);
        }
        id
    }

    /// Rewrite every rule's selectors through `@extend`, then drop selectors
    /// still containing placeholders.
    pub fn apply_extends(&mut self, engine: &mut ExtendEngine) {
        for block in &mut self.blocks {
            if block.kind != OutputKind::Rule {
                continue;
            }
            let mut selectors = if engine.is_empty() {
                std::mem::take(&mut block.selectors)
            } else {
                engine.extend_selectors(&block.selectors)
            };
            selectors.retain(|s| !has_placeholder(s));
            block.selectors = selectors;
        }
    }

    /// Whether a block renders nothing: no lines (or no selectors to carry
    /// them) and only empty children.
    pub fn is_empty(&self, id: BlockId) -> bool {
        let block = &self.blocks[id];
        match block.kind {
            OutputKind::Comment | OutputKind::AtRule => false,
            OutputKind::Rule => {
                (block.lines.is_empty() || block.selectors.is_empty())
                    && block.children.iter().all(|&c| self.is_empty(c))
            }
            _ => block.lines.is_empty() && block.children.iter().all(|&c| self.is_empty(c)),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty_tree(&self) -> bool {
        self.imports.is_empty() && self.is_empty(ROOT_BLOCK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(text: &str) -> Vec<Parts> {
        crate::selector::list_to_parts(&scss::parser::parse_selector_list(text).unwrap())
    }

    #[test]
    fn at_rules_bubble_past_rules() {
        let mut tree = OutputTree::new();
        let rule = tree.push(OutputKind::Rule, ROOT_BLOCK, SourcePos::default());
        let nested = tree.push(OutputKind::Rule, rule, SourcePos::default());
        assert_eq!(tree.bubble_target(nested), ROOT_BLOCK);
        let media = tree.push(OutputKind::Media, ROOT_BLOCK, SourcePos::default());
        let inner = tree.push(OutputKind::Rule, media, SourcePos::default());
        assert_eq!(tree.bubble_target(inner), media);
        assert_eq!(tree.block(inner).depth, 2);
    }

    #[test]
    fn copied_subtrees_are_independent() {
        let mut tree = OutputTree::new();
        let media = tree.push(OutputKind::Media, ROOT_BLOCK, SourcePos::default());
        let rule = tree.push(OutputKind::Rule, media, SourcePos::default());
        tree.block_mut(rule).selectors = parts(".a");
        let copy = tree.copy_subtree(media, ROOT_BLOCK);
        assert_eq!(tree.block(ROOT_BLOCK).children, vec![media, copy]);
        let copied_rule = tree.block(copy).children[0];
        assert_ne!(copied_rule, rule);
        assert_eq!(tree.block(copied_rule).selectors, parts(".a"));
    }

    #[test]
    fn empty_blocks_and_placeholders() {
        let mut tree = OutputTree::new();
        let rule = tree.push(OutputKind::Rule, ROOT_BLOCK, SourcePos::default());
        tree.block_mut(rule).selectors = parts("%p");
        tree.add_line(
            rule,
            LineKind::Declaration {
                name: "color".into(),
                value: "red".into(),
            },
            SourcePos::default(),
        );
        assert!(!tree.is_empty(rule));
        tree.apply_extends(&mut ExtendEngine::new());
        assert!(tree.is_empty(rule));
        assert!(tree.is_empty_tree());
    }
}
