use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Plus,
    /// Arithmetic negation: -x
    Minus,
    /// Logical not: `not x`
    Not,
    /// Leading slash: `/x`
    Slash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinaryOperator {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            "%" => BinaryOperator::Mod,
            "==" => BinaryOperator::Eq,
            "!=" => BinaryOperator::Neq,
            "<" => BinaryOperator::Lt,
            "<=" => BinaryOperator::Lte,
            ">" => BinaryOperator::Gt,
            ">=" => BinaryOperator::Gte,
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            _ => return None,
        })
    }

    /// Binding power; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq | BinaryOperator::Neq => 3,
            BinaryOperator::Lt | BinaryOperator::Lte | BinaryOperator::Gt | BinaryOperator::Gte => 4,
            BinaryOperator::Add | BinaryOperator::Sub => 5,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 6,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::Neq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListSeparator {
    Space,
    Comma,
    /// Single-element or empty list whose separator is not yet decided.
    Undecided,
}

impl ListSeparator {
    pub fn as_str(self) -> &'static str {
        match self {
            ListSeparator::Space => " ",
            ListSeparator::Comma => ",",
            ListSeparator::Undecided => "",
        }
    }
}

/// A string that can contain `#{...}` interpolations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringExpr {
    /// `Some('"')` / `Some('\'')` for quoted strings, `None` for bare text.
    pub quote: Option<char>,
    pub parts: Vec<StringPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StringPart {
    /// Literal text content.
    Literal(String),
    /// An embedded expression, evaluated at compile time.
    Interpolation(Box<Expr>),
}

impl StringExpr {
    pub fn plain(text: impl Into<String>) -> Self {
        StringExpr {
            quote: None,
            parts: vec![StringPart::Literal(text.into())],
        }
    }

    pub fn has_interpolation(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, StringPart::Interpolation(_)))
    }

    /// The literal text, if there is no interpolation.
    pub fn as_plain(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                StringPart::Literal(s) => out.push_str(s),
                StringPart::Interpolation(_) => return None,
            }
        }
        Some(out)
    }
}

/// One argument at a call site: `value`, `$name: value`, or `value...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
    pub name: Option<String>,
    pub value: Expr,
    pub splat: bool,
}

/// One declared parameter: `$name` or `$name: default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// A parameter list, optionally ending in a rest parameter (`$args...`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Params {
    pub params: Vec<Param>,
    pub rest: Option<String>,
}

/// An expression AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // Literals
    Number {
        value: f64,
        unit: String,
    },
    Color {
        rgba: [f64; 4],
        /// Text as written, e.g. `#FFF`.
        original: String,
    },
    String(StringExpr),
    Keyword(String),
    Null,
    Boolean(bool),

    // References
    Variable(String),
    /// `&` used as a value.
    ParentSelector,

    // Containers
    List {
        items: Vec<Expr>,
        separator: ListSeparator,
        bracketed: bool,
    },
    Map(Vec<(Expr, Expr)>),

    // Operations
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
        in_parens: bool,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        in_parens: bool,
        /// Whitespace before / after the operator, kept to re-serialize `a / b`.
        space_before: bool,
        space_after: bool,
    },

    // Invocations
    FunctionCall {
        name: String,
        args: Vec<CallArg>,
    },
}

impl Expr {
    pub fn keyword(s: impl Into<String>) -> Self {
        Expr::Keyword(s.into())
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Expr::Variable(_))
    }
}
