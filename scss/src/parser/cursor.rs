use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::ast::expr::CallArg;
use crate::ast::{Block, SourcePos};
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Token matchers
// ---------------------------------------------------------------------------

const NAME_START: &str = r"(?:[A-Za-z_]|[^\x00-\x7F]|\\(?:[0-9A-Fa-f]{1,6} ?|[^0-9A-Fa-f\r\n]))";
const NAME_CHAR: &str = r"(?:[A-Za-z0-9_-]|[^\x00-\x7F]|\\(?:[0-9A-Fa-f]{1,6} ?|[^0-9A-Fa-f\r\n]))";

pub(crate) static IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(?:--{NAME_CHAR}*|-?{NAME_START}{NAME_CHAR}*)")).unwrap()
});
pub(crate) static NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^{NAME_CHAR}+")).unwrap());
pub(crate) static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]*\.?[0-9]+(?:[eE][+-]?[0-9]+)?)((?:[A-Za-z_]|[^\x00-\x7F])(?:[A-Za-z0-9_]|[^\x00-\x7F])*|%)?")
        .unwrap()
});
pub(crate) static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#([0-9A-Fa-f]+)").unwrap());
pub(crate) static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^\$({NAME_CHAR}+)")).unwrap());
pub(crate) static UNICODE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Uu]\+[0-9A-Fa-f?]{1,6}(?:-[0-9A-Fa-f]{1,6})?").unwrap());
pub(crate) static KEYFRAME_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]*\.?[0-9]+%").unwrap());

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii() || c == '\\'
}

// ---------------------------------------------------------------------------
// Parser state
// ---------------------------------------------------------------------------

/// An include whose content block is still being parsed.
#[derive(Debug)]
pub(crate) struct PendingInclude {
    pub name: String,
    pub args: Vec<CallArg>,
    pub pos: SourcePos,
}

/// A block on the nesting stack. The stack stands in for parent pointers: the
/// entry below is the owner, and the block is attached to it when popped.
#[derive(Debug)]
pub(crate) struct OpenBlock {
    pub block: Block,
    pub include: Option<PendingInclude>,
}

pub(crate) struct ScssParser<'a> {
    pub src: &'a str,
    pub pos: usize,
    pub file_id: usize,
    line_starts: Vec<usize>,
    /// Whether matchers eat trailing whitespace and comments by default.
    pub eat_white_default: bool,
    pub in_parens: bool,
    pub stack: Vec<OpenBlock>,
    pending_comments: Vec<Range<usize>>,
    comment_watermark: usize,
}

impl<'a> ScssParser<'a> {
    pub fn new(src: &'a str, file_id: usize) -> Self {
        ScssParser {
            src,
            pos: 0,
            file_id,
            line_starts: codespan_reporting::files::line_starts(src).collect(),
            eat_white_default: true,
            in_parens: false,
            stack: Vec::new(),
            pending_comments: Vec::new(),
            comment_watermark: 0,
        }
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn advance(&mut self, bytes: usize) {
        self.pos = (self.pos + bytes).min(self.src.len());
    }

    /// Match a single character, then optionally eat whitespace.
    pub fn match_char(&mut self, c: char, eat_white: bool) -> bool {
        if self.peek() != Some(c) {
            return false;
        }
        self.pos += c.len_utf8();
        if eat_white {
            self.whitespace();
        }
        true
    }

    /// `match_char` with the default whitespace policy.
    pub fn char(&mut self, c: char) -> bool {
        self.match_char(c, self.eat_white_default)
    }

    /// Match a literal (ASCII case-insensitive).
    pub fn literal(&mut self, lit: &str, eat_white: bool) -> bool {
        let rest = self.rest();
        if rest.len() < lit.len() || !rest.is_char_boundary(lit.len()) {
            return false;
        }
        if !rest[..lit.len()].eq_ignore_ascii_case(lit) {
            return false;
        }
        self.pos += lit.len();
        if eat_white {
            self.whitespace();
        }
        true
    }

    /// Match a whole word: the literal must not be followed by a name character.
    pub fn keyword(&mut self, word: &str) -> bool {
        let start = self.pos;
        if !self.literal(word, false) {
            return false;
        }
        if self.peek().is_some_and(is_name_char) {
            self.seek(start);
            return false;
        }
        self.whitespace();
        true
    }

    /// Match an anchored regex at the cursor.
    pub fn match_regex(&mut self, re: &Regex, eat_white: bool) -> Option<Captures<'a>> {
        let rest: &'a str = &self.src[self.pos..];
        let caps = re.captures(rest)?;
        let len = caps.get(0).map(|m| m.end()).unwrap_or(0);
        if len == 0 {
            return None;
        }
        self.pos += len;
        if eat_white {
            self.whitespace();
        }
        Some(caps)
    }

    pub fn ident(&mut self, eat_white: bool) -> Option<String> {
        self.match_regex(&IDENT, eat_white)
            .map(|c| c[0].to_string())
    }

    /// Eat whitespace and comments. Loud comments are recorded so the block
    /// parser can keep them; each is recorded once even across backtracking.
    pub fn whitespace(&mut self) -> bool {
        let start = self.pos;
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                let end = trimmed.find('\n').unwrap_or(trimmed.len());
                self.pos += end;
            } else if trimmed.starts_with("/*") {
                let comment_start = self.pos;
                let end = trimmed[2..].find("*/").map(|i| i + 4).unwrap_or(trimmed.len());
                self.pos += end;
                if comment_start >= self.comment_watermark {
                    self.pending_comments.push(comment_start..self.pos);
                    self.comment_watermark = self.pos;
                }
            } else {
                break;
            }
        }
        self.pos > start
    }

    pub fn take_comments(&mut self) -> Vec<Range<usize>> {
        std::mem::take(&mut self.pending_comments)
    }

    pub fn preceded_by_space(&self) -> bool {
        self.src[..self.pos]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_whitespace())
    }

    pub fn followed_by_space(&self) -> bool {
        self.peek().is_some_and(|c| c.is_ascii_whitespace())
    }

    // ------------------------------------------------------------------
    // Positions and errors
    // ------------------------------------------------------------------

    /// 1-based (line, column) of a byte offset, by binary search over line starts.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let index = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts.get(index).copied().unwrap_or(0);
        let offset = offset.min(self.src.len());
        let column = self
            .src
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (index + 1, column + 1)
    }

    pub fn pos_from(&self, start: usize) -> SourcePos {
        let (line, column) = self.line_col(start);
        SourcePos {
            file_id: self.file_id,
            span: start..self.pos.max(start),
            line,
            column,
        }
    }

    pub fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        let (line, column) = self.line_col(offset);
        let end = (offset + 1).min(self.src.len()).max(offset);
        ParseError::error(message, offset..end, self.file_id, line, column)
    }

    /// A syntax error at the cursor, quoting the offending fragment.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        let fragment: String = self
            .rest()
            .chars()
            .take_while(|c| *c != '\n')
            .take(30)
            .collect();
        let message = message.into();
        let message = if fragment.is_empty() {
            format!("{}: failed at end of input", message)
        } else {
            format!("{}: failed at `{}`", message, fragment.trim_end())
        };
        self.error_at(self.pos, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_records_loud_comments_once() {
        let mut p = ScssParser::new("  /* a */ // b\n  x", 0);
        assert!(p.whitespace());
        assert_eq!(p.peek(), Some('x'));
        p.seek(0);
        p.whitespace();
        let comments = p.take_comments();
        assert_eq!(comments, vec![2..9]);
    }

    #[test]
    fn line_col_uses_line_starts() {
        let p = ScssParser::new("a\nbc\ndef", 0);
        assert_eq!(p.line_col(0), (1, 1));
        assert_eq!(p.line_col(3), (2, 2));
        assert_eq!(p.line_col(7), (3, 3));
    }

    #[test]
    fn keyword_requires_word_boundary() {
        let mut p = ScssParser::new("android", 0);
        assert!(!p.keyword("and"));
        assert_eq!(p.pos, 0);
        let mut p = ScssParser::new("and $x", 0);
        assert!(p.keyword("and"));
        assert_eq!(p.peek(), Some('$'));
    }
}
