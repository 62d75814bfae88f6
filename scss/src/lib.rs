pub mod ast;
pub mod cache;
pub mod parser;

use serde::{Deserialize, Serialize};

use crate::ast::Block;

/// A parsed SCSS stylesheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stylesheet {
    /// The root block (kind `Root`); every top-level statement is one of its children.
    pub root: Block,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
    /// Logical name of the source (path or `stdin`), if any.
    pub source_name: Option<String>,
}
