use serde::{Deserialize, Serialize};

use crate::ast::expr::{Expr, StringExpr};

/// One comma-separated media query; its parts are ANDed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaQuery {
    pub parts: Vec<MediaQueryPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaQueryPart {
    /// `screen`, `only screen`, `not print`.
    Type {
        modifier: Option<String>,
        name: StringExpr,
    },
    /// `(min-width: 10px)` or `(color)`.
    Feature { name: Expr, value: Option<Expr> },
    /// `#{$query}`: evaluated, then re-parsed as a query list.
    Raw(Expr),
}
