mod cursor;
pub mod error;
mod expression;
mod media;
mod selector;
mod structural;

pub use error::ParseError;

use std::sync::Arc;

use tracing::debug;

use crate::ast::expr::{Expr, Params};
use crate::ast::media::MediaQuery;
use crate::ast::selector::SelectorList;
use crate::ast::Block;
use crate::cache::{content_hash, CacheStore};
use crate::Stylesheet;
use cursor::ScssParser;

/// Cache operation name for parsed stylesheets.
const PARSE_OPERATION: &str = "parse";

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
    source_name: Option<String>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser {
            source,
            file_id,
            source_name: None,
            cache: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn CacheStore>>) -> Self {
        self.cache = cache;
        self
    }

    /// Parse the source into a stylesheet. Cached trees are reused when the
    /// source name and content hash match.
    pub fn parse(&self) -> Result<Stylesheet, ParseError> {
        let key = self.cache.as_ref().map(|_| {
            format!(
                "{}:{}",
                self.source_name.as_deref().unwrap_or("stdin"),
                content_hash(&self.source)
            )
        });

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(cached) = cache.get(PARSE_OPERATION, key, "utf8", None) {
                match serde_json::from_str::<Block>(&cached) {
                    Ok(mut root) => {
                        debug!(key = %key, "parse cache hit");
                        relabel(&mut root, self.file_id);
                        return Ok(self.stylesheet(root));
                    }
                    Err(err) => debug!(key = %key, error = %err, "discarding unreadable parse cache entry"),
                }
            }
        }

        let root = ScssParser::new(&self.source, self.file_id).parse_root()?;

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            match serde_json::to_string(&root) {
                Ok(json) => cache.put(PARSE_OPERATION, key, &json, "utf8"),
                Err(err) => debug!(key = %key, error = %err, "parse tree not cached"),
            }
        }
        Ok(self.stylesheet(root))
    }

    fn stylesheet(&self, root: Block) -> Stylesheet {
        Stylesheet {
            root,
            source_id: self.file_id,
            source_name: self.source_name.clone(),
        }
    }
}

/// Point every position of a cached tree at the current file id.
fn relabel(block: &mut Block, file_id: usize) {
    block.pos.file_id = file_id;
    for stmt in &mut block.children {
        stmt.pos.file_id = file_id;
        match &mut stmt.kind {
            crate::ast::StatementKind::Block(inner) => relabel(inner, file_id),
            crate::ast::StatementKind::Include {
                content: Some(content),
                ..
            } => relabel(content, file_id),
            _ => {}
        }
    }
    if let crate::ast::BlockKind::If { cases, .. } = &mut block.kind {
        for case in cases {
            relabel(case, file_id);
        }
    }
}

fn parse_fragment<T>(
    text: &str,
    what: &str,
    rule: impl FnOnce(&mut ScssParser<'_>) -> Option<T>,
) -> Result<T, ParseError> {
    let mut parser = ScssParser::new(text, 0);
    parser.whitespace();
    match rule(&mut parser) {
        Some(value) if parser.at_end() => Ok(value),
        _ => Err(parser.error(format!("invalid {}", what))),
    }
}

/// Parse a selector list from evaluated text.
pub fn parse_selector_list(text: &str) -> Result<SelectorList, ParseError> {
    parse_fragment(text, "selector", |p| p.selector_list())
}

/// Parse a media query list from evaluated text.
pub fn parse_media_query_list(text: &str) -> Result<Vec<MediaQuery>, ParseError> {
    parse_fragment(text, "media query", |p| p.media_query_list())
}

/// Parse a SassScript value list, e.g. a pre-set variable's source text.
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    parse_fragment(text, "expression", |p| p.value_list())
}

/// Parse a parameter list such as `($color, $amount: 10%)`.
pub fn parse_params(text: &str) -> Result<Params, ParseError> {
    parse_fragment(text, "parameter list", |p| p.params())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn fragments_must_be_fully_consumed() {
        assert!(parse_selector_list(".a > .b, c").is_ok());
        assert!(parse_selector_list(".a {").is_err());
        assert_eq!(parse_params("($a, $b: 2, $rest...)").unwrap().params.len(), 2);
        assert!(parse_expression("1px + 2px").is_ok());
    }

    #[test]
    fn parse_results_are_cached_by_content() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let source = ".a { b: c; }".to_string();
        let first = Parser::new(source.clone(), 0)
            .with_name("a.scss")
            .with_cache(Some(cache.clone()))
            .parse()
            .unwrap();
        assert_eq!(first.root.children.len(), 1);

        let key = format!("a.scss:{}", content_hash(&source));
        assert!(cache.get(PARSE_OPERATION, &key, "utf8", None).is_some());

        let second = Parser::new(source, 3)
            .with_name("a.scss")
            .with_cache(Some(cache))
            .parse()
            .unwrap();
        assert_eq!(second.root.children[0].pos.file_id, 3);
    }
}
