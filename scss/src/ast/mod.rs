pub mod expr;
pub mod media;
pub mod selector;

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::ast::expr::{CallArg, Expr, Params, StringExpr};
use crate::ast::media::MediaQuery;
use crate::ast::selector::SelectorList;

/// Position of a node in its source file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePos {
    pub file_id: usize,
    /// Byte span in source for error reporting.
    pub span: Range<usize>,
    /// 1-based line of `span.start`.
    pub line: usize,
    /// 1-based column of `span.start`.
    pub column: usize,
}

/// A parsed block: the root, one `{ ... }` region, or a grammar-level construct
/// such as a mixin or control directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub children: Vec<Statement>,
    pub pos: SourcePos,
}

impl Block {
    pub fn new(kind: BlockKind, pos: SourcePos) -> Self {
        Block {
            kind,
            children: Vec::new(),
            pos,
        }
    }

    /// Short construct name used in call-stack traces and debug output.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            BlockKind::Root => "root",
            BlockKind::Rule { .. } => "rule",
            BlockKind::NestedProperty { .. } => "nested property",
            BlockKind::Media { .. } => "@media",
            BlockKind::Supports { .. } => "@supports",
            BlockKind::Directive { .. } => "directive",
            BlockKind::Mixin { .. } => "@mixin",
            BlockKind::Function { .. } => "@function",
            BlockKind::Content { .. } => "@content",
            BlockKind::Each { .. } => "@each",
            BlockKind::For { .. } => "@for",
            BlockKind::While { .. } => "@while",
            BlockKind::If { .. } => "@if",
            BlockKind::Else { .. } => "@else",
            BlockKind::AtRoot { .. } => "@at-root",
        }
    }
}

/// Selectors as written: parsed up front unless they contain interpolation,
/// in which case they are re-parsed after evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SelectorSource {
    Parsed(SelectorList),
    Interpolated(StringExpr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockKind {
    Root,
    /// A plain style rule.
    Rule { selectors: SelectorSource },
    /// `font: { family: x; }` or `font: 12px { weight: bold; }`.
    NestedProperty { prefix: StringExpr, value: Option<Expr> },
    Media { queries: Vec<MediaQuery> },
    Supports { condition: StringExpr },
    /// Any other at-rule with a body (`@font-face`, `@keyframes`, `@page`, unknown names).
    Directive { name: String, value: Option<StringExpr> },
    Mixin { name: String, params: Params },
    Function { name: String, params: Params },
    /// The content block passed to `@include`, with its `using (...)` parameters.
    Content { params: Params },
    Each { vars: Vec<String>, list: Expr },
    For { var: String, start: Expr, end: Expr, inclusive: bool },
    While { condition: Expr },
    /// `@if`; `cases` holds the `@else if` / `@else` blocks in order.
    If { condition: Expr, cases: Vec<Block> },
    /// `@else` (condition `None`) or `@else if`.
    Else { condition: Option<Expr> },
    AtRoot { selectors: Option<SelectorSource>, query: Option<Expr> },
}

/// A statement inside a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    Block(Block),
    /// Variable assignment: `$name: value [!default] [!global]`
    Assign {
        name: String,
        value: Expr,
        default: bool,
        global: bool,
    },
    /// Property declaration. Custom properties (`--x`) keep their value as raw text.
    Declaration {
        name: StringExpr,
        value: Expr,
        custom: bool,
    },
    Include {
        name: String,
        args: Vec<CallArg>,
        content: Option<Box<Block>>,
    },
    Content { args: Vec<CallArg> },
    Extend {
        selectors: SelectorSource,
        optional: bool,
    },
    /// `@import a, b [media]`; each target is evaluated, then resolved or passed through.
    Import {
        targets: Vec<Expr>,
        media: Option<StringExpr>,
    },
    Return(Expr),
    Debug(Expr),
    Warn(Expr),
    Error(Expr),
    Charset(String),
    /// A block-less at-rule, e.g. `@namespace svg url(...)`.
    Directive {
        name: String,
        value: Option<StringExpr>,
    },
    /// A loud `/* ... */` comment, possibly interpolated.
    Comment(StringExpr),
}

impl Statement {
    pub fn new(kind: StatementKind, pos: SourcePos) -> Self {
        Statement { kind, pos }
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            StatementKind::Block(block) => block.kind_name(),
            StatementKind::Assign { .. } => "assign",
            StatementKind::Declaration { .. } => "declaration",
            StatementKind::Include { .. } => "@include",
            StatementKind::Content { .. } => "@content",
            StatementKind::Extend { .. } => "@extend",
            StatementKind::Import { .. } => "@import",
            StatementKind::Return(_) => "@return",
            StatementKind::Debug(_) => "@debug",
            StatementKind::Warn(_) => "@warn",
            StatementKind::Error(_) => "@error",
            StatementKind::Charset(_) => "@charset",
            StatementKind::Directive { .. } => "directive",
            StatementKind::Comment(_) => "comment",
        }
    }
}
