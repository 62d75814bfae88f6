//! Statement compilation: walks the parsed block tree, maintains scopes and
//! the call stack, and builds the [`OutputTree`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use codespan_reporting::files::SimpleFiles;
use scss::ast::expr::{Expr, ListSeparator, Params, StringExpr};
use scss::ast::media::{MediaQuery, MediaQueryPart};
use scss::ast::selector::SelectorList;
use scss::ast::{Block, BlockKind, SelectorSource, SourcePos, Statement, StatementKind};
use scss::parser::{parse_media_query_list, parse_selector_list, Parser};
use scss::Stylesheet;
use tracing::debug;

use crate::arguments::{bind, EvaluatedArgs};
use crate::compiler::{CompilerOptions, OutputStyle, RegisteredFunction};
use crate::environment::{
    normalize_name, Callable, CallableKind, ContentRef, Environment, Frame, MediaContext, Marker,
    SelectorContext,
};
use crate::error::{CompileError, DiagnosticError};
use crate::evaluator::keeps_slashes;
use crate::extend::ExtendEngine;
use crate::import::{is_css_import, resolve};
use crate::logger::Warning;
use crate::media::{compile_media_query, multiply_queries, CssMediaPart, CssMediaQuery};
use crate::output::{BlockId, LineKind, OutputKind, OutputLine, OutputTree, ROOT_BLOCK};
use crate::runtime_value::Value;
use crate::selector::{join, list_to_parts, resolve_levels, to_parts};

/// How a statement list finished.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    /// `@return` inside a function body.
    Return(Value),
}

/// One entry of the user-visible call stack.
#[derive(Debug, Clone)]
struct StackEntry {
    name: String,
    file_id: usize,
    line: usize,
}

/// Kinds of enclosing blocks an `@at-root` query can name.
#[derive(Debug)]
struct AtRootQuery {
    /// `with` lists what is kept; `without` lists what is removed.
    with: bool,
    names: HashSet<String>,
}

impl AtRootQuery {
    fn default_query() -> Self {
        AtRootQuery {
            with: false,
            names: HashSet::from(["rule".to_string()]),
        }
    }

    fn excludes(&self, name: &str) -> bool {
        if self.names.contains("all") {
            return !self.with;
        }
        self.names.contains(name) != self.with
    }
}

/// Share of a dedicated thread's stack kept free when the stack guard trips.
const STACK_RESERVE_DIVISOR: usize = 8;

/// Stack a compile running on the caller's thread may use.
const INLINE_STACK_BUDGET: usize = 1024 * 1024;

/// Bounds the native stack used by nested calls, whatever each evaluation
/// frame costs in the current build.
#[derive(Debug, Clone, Copy)]
struct StackGuard {
    base: usize,
    budget: usize,
}

impl StackGuard {
    /// Must be created on the thread that compiles.
    fn new(stack_size: Option<usize>) -> Self {
        let budget = match stack_size {
            Some(size) => size - size / STACK_RESERVE_DIVISOR,
            None => INLINE_STACK_BUDGET,
        };
        StackGuard {
            base: stack_position(),
            budget,
        }
    }

    fn exhausted(&self) -> bool {
        stack_position().abs_diff(self.base) > self.budget
    }
}

/// Address of a local in a fresh frame, as a measure of stack depth.
#[inline(never)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

pub(crate) struct Executor<'c> {
    pub(crate) env: Environment,
    pub(crate) tree: OutputTree,
    pub(crate) extends: ExtendEngine,
    pub(crate) options: &'c CompilerOptions,
    custom_functions: &'c HashMap<String, RegisteredFunction>,
    files: &'c mut SimpleFiles<String, String>,
    call_stack: Vec<StackEntry>,
    stack_guard: StackGuard,
    /// Position of the statement being compiled.
    pub(crate) current_pos: SourcePos,
    /// Real paths of the files being compiled, outermost first.
    import_stack: Vec<PathBuf>,
    file_paths: HashMap<usize, PathBuf>,
    pub(crate) included_files: Vec<PathBuf>,
    pub(crate) compressed: bool,
}

impl<'c> Executor<'c> {
    pub(crate) fn new(
        options: &'c CompilerOptions,
        custom_functions: &'c HashMap<String, RegisteredFunction>,
        files: &'c mut SimpleFiles<String, String>,
    ) -> Self {
        Executor {
            env: Environment::new(),
            tree: OutputTree::new(),
            extends: ExtendEngine::new(),
            options,
            custom_functions,
            files,
            call_stack: Vec::new(),
            stack_guard: StackGuard::new(options.stack_size),
            current_pos: SourcePos::default(),
            import_stack: Vec::new(),
            file_paths: HashMap::new(),
            included_files: Vec::new(),
            compressed: options.style == OutputStyle::Compressed,
        }
    }

    pub(crate) fn custom_function(&self, name: &str) -> Option<&'c RegisteredFunction> {
        self.custom_functions.get(&normalize_name(name))
    }

    /// Compile a whole stylesheet, then resolve `@extend`.
    pub(crate) fn run(&mut self, sheet: &Stylesheet, path: Option<&Path>) -> Result<(), DiagnosticError> {
        if let Some(path) = path {
            let real = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            self.file_paths.insert(sheet.source_id, real.clone());
            self.included_files.push(real.clone());
            self.import_stack.push(real);
        }

        if let Err(err) = self.compile_children(&sheet.root.children, ROOT_BLOCK) {
            return Err(self.diagnostic(err));
        }

        self.tree.apply_extends(&mut self.extends);
        if let Some((err, pos)) = self.extends.unmatched() {
            let file = self.file_name(pos.file_id);
            return Err(DiagnosticError::new(err, &pos, Some(file)));
        }
        debug!(blocks = self.tree.len(), frames = self.env.len(), "compiled stylesheet");
        Ok(())
    }

    pub(crate) fn finish(self) -> (OutputTree, Vec<PathBuf>) {
        (self.tree, self.included_files)
    }

    fn file_name(&self, file_id: usize) -> String {
        self.files
            .get(file_id)
            .map(|file| file.name().clone())
            .unwrap_or_else(|_| "stdin".to_string())
    }

    /// Call stack, innermost first.
    pub(crate) fn trace(&self) -> Vec<String> {
        self.call_stack
            .iter()
            .rev()
            .enumerate()
            .map(|(i, entry)| {
                format!("#{} {} {} on line {}", i, entry.name, self.file_name(entry.file_id), entry.line)
            })
            .collect()
    }

    fn diagnostic(&self, error: CompileError) -> DiagnosticError {
        let file = self.file_name(self.current_pos.file_id);
        DiagnosticError::new(error, &self.current_pos, Some(file)).with_trace(self.trace())
    }

    /// Send a warning at the current position to the configured logger.
    pub(crate) fn warn(&self, message: impl Into<String>, deprecation: bool) {
        let warning = Warning {
            message: message.into(),
            deprecation,
            file: Some(self.file_name(self.current_pos.file_id)),
            file_id: self.current_pos.file_id,
            span: Some(self.current_pos.span.clone()),
            line: self.current_pos.line,
            trace: self.trace(),
        };
        self.options.logger.warn(&warning);
    }

    fn push_call(&mut self, name: String) -> Result<(), CompileError> {
        if self.call_stack.len() >= self.options.max_call_depth || self.stack_guard.exhausted() {
            return Err(CompileError::StackOverflow(self.call_stack.len()));
        }
        self.call_stack.push(StackEntry {
            name,
            file_id: self.current_pos.file_id,
            line: self.current_pos.line,
        });
        Ok(())
    }

    fn pop_call(&mut self) {
        self.call_stack.pop();
    }

    pub(crate) fn compile_children(&mut self, children: &[Statement], out: BlockId) -> Result<Flow, CompileError> {
        for stmt in children {
            self.current_pos = stmt.pos.clone();
            if let Flow::Return(value) = self.compile_statement(stmt, out)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    /// Run `children` in a fresh frame, leaving it afterwards.
    fn compile_in_frame(&mut self, frame: Frame, children: &[Statement], out: BlockId) -> Result<Flow, CompileError> {
        let saved = self.env.current();
        self.env.enter(frame);
        let result = self.compile_children(children, out);
        self.env.leave(saved);
        result
    }

    fn compile_statement(&mut self, stmt: &Statement, out: BlockId) -> Result<Flow, CompileError> {
        match &stmt.kind {
            StatementKind::Block(block) => return self.compile_block(block, out),
            StatementKind::Assign {
                name,
                value,
                default,
                global,
            } => {
                if *default {
                    let existing = if *global {
                        self.env.global(name).cloned()
                    } else {
                        self.env.lookup(name)?.cloned()
                    };
                    if existing.is_some_and(|v| !v.is_null()) {
                        return Ok(Flow::Normal);
                    }
                }
                let value = self.reduce(value, true)?;
                self.env.assign(name, value, *global, *default)?;
            }
            StatementKind::Declaration { name, value, custom } => {
                self.compile_declaration(name, value, *custom, out)?;
            }
            StatementKind::Include { name, args, content } => {
                self.compile_include(name, args, content.as_deref(), out)?;
            }
            StatementKind::Content { args } => self.compile_content(args, out)?,
            StatementKind::Extend { selectors, optional } => self.compile_extend(selectors, *optional)?,
            StatementKind::Import { targets, media } => {
                for target in targets {
                    self.compile_import(target, media.as_ref(), out)?;
                }
            }
            StatementKind::Return(expr) => {
                if !self.env.in_function() {
                    return Err(CompileError::custom("@return may only be used within a function."));
                }
                return Ok(Flow::Return(self.reduce(expr, true)?));
            }
            StatementKind::Debug(expr) => {
                let value = self.reduce(expr, true)?;
                let message = format!(
                    "{}:{} DEBUG: {}",
                    self.file_name(self.current_pos.file_id),
                    self.current_pos.line,
                    message_text(&value)
                );
                self.options.logger.debug(&message);
            }
            StatementKind::Warn(expr) => {
                let value = self.reduce(expr, true)?;
                self.warn(message_text(&value), false);
            }
            StatementKind::Error(expr) => {
                let value = self.reduce(expr, true)?;
                return Err(CompileError::User(message_text(&value)));
            }
            StatementKind::Charset(charset) => {
                if self.tree.charset.is_none() {
                    self.tree.charset = Some(charset.clone());
                }
            }
            StatementKind::Directive { name, value } => {
                let text = self.directive_header(name, value.as_ref())?;
                self.add_at_rule(text, out);
            }
            StatementKind::Comment(comment) => {
                let text = self.interpolate(comment)?;
                if self.compressed && !text.starts_with("/*!") {
                    return Ok(Flow::Normal);
                }
                match self.tree.block(out).kind {
                    OutputKind::Root | OutputKind::Media | OutputKind::Supports => {
                        let id = self.tree.push(OutputKind::Comment, out, self.current_pos.clone());
                        self.tree.block_mut(id).header = Some(text);
                    }
                    _ => self.tree.add_line(out, LineKind::Comment(text), self.current_pos.clone()),
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn compile_block(&mut self, block: &Block, out: BlockId) -> Result<Flow, CompileError> {
        match &block.kind {
            BlockKind::Rule { selectors } => self.compile_rule(selectors, &block.children, &block.pos, out),
            BlockKind::NestedProperty { prefix, value } => {
                self.compile_nested_property(prefix, value.as_ref(), &block.children, out)
            }
            BlockKind::Media { queries } => self.compile_media(queries, block, out),
            BlockKind::Supports { condition } => {
                let header = format!("@supports {}", self.interpolate(condition)?.trim());
                self.compile_directive_body(OutputKind::Supports, header, block, out, false)
            }
            BlockKind::Directive { name, value } => {
                let header = self.directive_header(name, value.as_ref())?;
                let lower = name.to_ascii_lowercase();
                let keyframes = lower.ends_with("keyframes");
                let wrap = !keyframes && lower != "font-face";
                let saved = self.env.current();
                let mut frame = Frame::new(Marker::Block).with_media(MediaContext::Barrier);
                if keyframes {
                    frame = frame.with_selectors(SelectorContext::Keyframes);
                }
                self.env.enter(frame);
                let result = self.compile_directive_body(OutputKind::Directive, header, block, out, !wrap);
                self.env.leave(saved);
                result
            }
            BlockKind::Mixin { name, params } => {
                self.define(name, CallableKind::Mixin, params, block);
                Ok(Flow::Normal)
            }
            BlockKind::Function { name, params } => {
                self.define(name, CallableKind::Function, params, block);
                Ok(Flow::Normal)
            }
            BlockKind::Each { vars, list } => self.compile_each(vars, list, &block.children, out),
            BlockKind::For {
                var,
                start,
                end,
                inclusive,
            } => self.compile_for(var, start, end, *inclusive, &block.children, out),
            BlockKind::While { condition } => {
                while self.reduce(condition, true)?.is_truthy() {
                    if let Flow::Return(value) = self.compile_in_frame(Frame::new(Marker::Flow), &block.children, out)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            BlockKind::If { condition, cases } => {
                if self.reduce(condition, true)?.is_truthy() {
                    return self.compile_in_frame(Frame::new(Marker::Flow), &block.children, out);
                }
                for case in cases {
                    let taken = match &case.kind {
                        BlockKind::Else { condition: Some(condition) } => {
                            self.current_pos = case.pos.clone();
                            self.reduce(condition, true)?.is_truthy()
                        }
                        _ => true,
                    };
                    if taken {
                        return self.compile_in_frame(Frame::new(Marker::Flow), &case.children, out);
                    }
                }
                Ok(Flow::Normal)
            }
            BlockKind::AtRoot { selectors, query } => self.compile_at_root(selectors.as_ref(), query.as_ref(), block, out),
            BlockKind::Root | BlockKind::Content { .. } | BlockKind::Else { .. } => Err(CompileError::custom(format!(
                "Unexpected {} block.",
                block.kind_name()
            ))),
        }
    }

    fn define(&mut self, name: &str, kind: CallableKind, params: &Params, block: &Block) {
        let callable = Callable {
            name: name.to_string(),
            kind,
            params: params.clone(),
            body: Rc::new(block.clone()),
            scope: self.env.current(),
        };
        self.env.define_callable(callable);
    }

    // Selectors

    fn evaluate_selector(&mut self, source: &SelectorSource) -> Result<SelectorList, CompileError> {
        match source {
            SelectorSource::Parsed(list) => Ok(list.clone()),
            SelectorSource::Interpolated(text) => {
                let text = self.interpolate(text)?;
                parse_selector_list(text.trim()).map_err(|err| CompileError::InvalidSelector {
                    selector: text.trim().to_string(),
                    message: err.message,
                })
            }
        }
    }

    /// Fully resolved selectors of the innermost rule, or `None` outside
    /// any rule.
    pub(crate) fn current_selectors(&self) -> Result<Option<SelectorList>, CompileError> {
        for frame in self.env.ancestors() {
            match &frame.selectors {
                SelectorContext::Rule(resolved) => return Ok(Some(resolved.clone())),
                SelectorContext::AtRoot { .. } | SelectorContext::Keyframes => break,
                SelectorContext::None => {}
            }
        }
        Ok(None)
    }

    /// Resolve `list` against the enclosing rule. Only the nearest rule frame
    /// is consulted since it already holds its own resolved selectors.
    fn resolve_rule_selectors(&self, list: &SelectorList) -> Result<SelectorList, CompileError> {
        let mut base = None;
        for frame in self.env.ancestors() {
            match &frame.selectors {
                SelectorContext::Rule(resolved) => return join(resolved, list, true),
                SelectorContext::AtRoot { self_parent } => {
                    base = self_parent.as_ref();
                    break;
                }
                SelectorContext::Keyframes => break,
                SelectorContext::None => {}
            }
        }
        Ok(resolve_levels(base, &[list])?.unwrap_or_else(|| list.clone()))
    }

    fn in_keyframes(&self) -> bool {
        self.env
            .ancestors()
            .find(|frame| !matches!(frame.selectors, SelectorContext::None))
            .is_some_and(|frame| matches!(frame.selectors, SelectorContext::Keyframes))
    }

    fn compile_rule(
        &mut self,
        source: &SelectorSource,
        children: &[Statement],
        pos: &SourcePos,
        out: BlockId,
    ) -> Result<Flow, CompileError> {
        let list = self.evaluate_selector(source)?;
        self.compile_resolved_rule(&list, children, pos, out)
    }

    fn compile_resolved_rule(
        &mut self,
        list: &SelectorList,
        children: &[Statement],
        pos: &SourcePos,
        out: BlockId,
    ) -> Result<Flow, CompileError> {
        let resolved = self.resolve_rule_selectors(list)?;
        let id = self.tree.push(OutputKind::Rule, out, pos.clone());
        self.tree.block_mut(id).selectors = list_to_parts(&resolved);
        let saved = self.env.current();
        self.env
            .enter(Frame::new(Marker::Block).with_selectors(SelectorContext::Rule(resolved)));
        let result = self.compile_children(children, id);
        self.env.leave(saved);
        result
    }

    /// A rule carrying the current selectors, for declarations inside an
    /// at-rule nested in a rule.
    fn wrapper_rule(&mut self, parent: BlockId, pos: &SourcePos) -> Result<BlockId, CompileError> {
        match self.current_selectors()? {
            Some(list) if !self.in_keyframes() => {
                let id = self.tree.push(OutputKind::Rule, parent, pos.clone());
                self.tree.block_mut(id).selectors = list_to_parts(&list);
                Ok(id)
            }
            _ => Ok(parent),
        }
    }

    // Declarations

    fn property_prefix(&self) -> Option<String> {
        for frame in self.env.ancestors() {
            if let Some(prefix) = &frame.property_prefix {
                return Some(prefix.clone());
            }
            if !matches!(frame.selectors, SelectorContext::None) {
                break;
            }
        }
        None
    }

    fn prefixed(&self, name: String) -> String {
        match self.property_prefix() {
            Some(prefix) => format!("{}-{}", prefix, name),
            None => name,
        }
    }

    fn compile_declaration(&mut self, name: &StringExpr, value: &Expr, custom: bool, out: BlockId) -> Result<(), CompileError> {
        let name = self.interpolate(name)?;
        let name = self.prefixed(name.trim().to_string());
        if self.tree.block(out).kind == OutputKind::Root {
            return Err(CompileError::custom("Declarations may only be used within style rules."));
        }

        let value = if custom {
            match value {
                Expr::String(text) => Value::string(self.interpolate(text)?),
                other => self.reduce(other, false)?,
            }
        } else if keeps_slashes(&name) {
            self.reduce_keeping_slashes(value)?
        } else {
            self.reduce(value, false)?
        };
        self.emit_declaration(name, &value, out)
    }

    fn emit_declaration(&mut self, name: String, value: &Value, out: BlockId) -> Result<(), CompileError> {
        if value.is_blank() {
            return Ok(());
        }
        let text = value.to_css(self.compressed)?;
        if text.is_empty() {
            return Ok(());
        }
        self.tree
            .add_line(out, LineKind::Declaration { name, value: text }, self.current_pos.clone());
        Ok(())
    }

    fn compile_nested_property(
        &mut self,
        prefix: &StringExpr,
        value: Option<&Expr>,
        children: &[Statement],
        out: BlockId,
    ) -> Result<Flow, CompileError> {
        let prefix = self.interpolate(prefix)?;
        let full = self.prefixed(prefix.trim().to_string());
        if let Some(value) = value {
            if self.tree.block(out).kind == OutputKind::Root {
                return Err(CompileError::custom("Declarations may only be used within style rules."));
            }
            let value = self.reduce(value, false)?;
            self.emit_declaration(full.clone(), &value, out)?;
        }
        let mut frame = Frame::new(Marker::Block);
        frame.property_prefix = Some(full);
        self.compile_in_frame(frame, children, out)
    }

    // At-rules

    fn directive_header(&mut self, name: &str, value: Option<&StringExpr>) -> Result<String, CompileError> {
        let value = match value {
            Some(value) => self.interpolate(value)?.trim().to_string(),
            None => String::new(),
        };
        Ok(if value.is_empty() {
            format!("@{}", name)
        } else {
            format!("@{} {}", name, value)
        })
    }

    /// A body-less at-rule: a line inside rules, a block elsewhere.
    fn add_at_rule(&mut self, text: String, out: BlockId) {
        if self.tree.block(out).kind == OutputKind::Rule {
            self.tree.add_line(out, LineKind::AtRule(text), self.current_pos.clone());
        } else {
            let id = self.tree.push(OutputKind::AtRule, out, self.current_pos.clone());
            self.tree.block_mut(id).header = Some(text);
        }
    }

    fn compile_directive_body(
        &mut self,
        kind: OutputKind,
        header: String,
        block: &Block,
        out: BlockId,
        bare: bool,
    ) -> Result<Flow, CompileError> {
        let target = self.tree.bubble_target(out);
        let id = self.tree.push(kind, target, block.pos.clone());
        self.tree.block_mut(id).header = Some(header);
        let inner = if bare { id } else { self.wrapper_rule(id, &block.pos)? };
        self.compile_children(&block.children, inner)
    }

    fn evaluate_media_queries(&mut self, queries: &[MediaQuery]) -> Result<Vec<CssMediaQuery>, CompileError> {
        let mut out = Vec::with_capacity(queries.len());
        for query in queries {
            let mut parts = Vec::with_capacity(query.parts.len());
            let mut reparsed = Vec::new();
            for part in &query.parts {
                match part {
                    MediaQueryPart::Type { modifier, name } => {
                        let mut words: Vec<String> = modifier.iter().cloned().collect();
                        words.push(self.interpolate(name)?.trim().to_string());
                        parts.push(CssMediaPart::Type(words));
                    }
                    MediaQueryPart::Feature { name, value } => {
                        let name = self.reduce(name, false)?;
                        let name = self.interpolated_text(&name)?;
                        let value = match value {
                            Some(value) => {
                                let value = self.reduce(value, false)?;
                                Some(value.to_css(self.compressed)?)
                            }
                            None => None,
                        };
                        parts.push(CssMediaPart::Feature { name, value });
                    }
                    MediaQueryPart::Raw(expr) => {
                        let value = self.reduce(expr, false)?;
                        let text = self.interpolated_text(&value)?;
                        match parse_media_query_list(text.trim()) {
                            Ok(parsed) if !matches!(parsed.as_slice(), [q] if matches!(q.parts.as_slice(), [MediaQueryPart::Raw(_)])) => {
                                reparsed.extend(self.evaluate_media_queries(&parsed)?);
                            }
                            _ => parts.push(CssMediaPart::Raw(text.trim().to_string())),
                        }
                    }
                }
            }
            if !parts.is_empty() {
                out.push(parts);
            }
            out.extend(reparsed);
        }
        Ok(out)
    }

    /// Merged queries of the enclosing `@media`, up to a barrier.
    fn enclosing_media(&self) -> Option<Vec<CssMediaQuery>> {
        for frame in self.env.ancestors() {
            match &frame.media {
                MediaContext::Media(queries) => return Some(queries.clone()),
                MediaContext::Barrier => return None,
                MediaContext::None => {}
            }
        }
        None
    }

    fn media_target(&self, mut id: BlockId) -> BlockId {
        loop {
            let block = self.tree.block(id);
            match (block.kind, block.parent) {
                (OutputKind::Rule | OutputKind::Media, Some(parent)) => id = parent,
                _ => return id,
            }
        }
    }

    fn compile_media(&mut self, queries: &[MediaQuery], block: &Block, out: BlockId) -> Result<Flow, CompileError> {
        let evaluated = self.evaluate_media_queries(queries)?;
        let merged = match self.enclosing_media() {
            Some(parent) => multiply_queries(&parent, &evaluated),
            None => evaluated,
        };
        let rendered = compile_media_query(&merged, self.compressed);
        let Some((first, rest)) = rendered.split_first() else {
            debug!("dropping @media block that can never match");
            return Ok(Flow::Normal);
        };

        let target = self.media_target(out);
        let id = self.tree.push(OutputKind::Media, target, block.pos.clone());
        self.tree.block_mut(id).header = Some(media_header(first));

        let saved = self.env.current();
        self.env
            .enter(Frame::new(Marker::Block).with_media(MediaContext::Media(merged)));
        let result = self
            .wrapper_rule(id, &block.pos)
            .and_then(|inner| self.compile_children(&block.children, inner));
        self.env.leave(saved);
        let flow = result?;

        for query in rest {
            let copy = self.tree.copy_subtree(id, target);
            self.tree.block_mut(copy).header = Some(media_header(query));
        }
        Ok(flow)
    }

    fn at_root_query(&mut self, query: Option<&Expr>) -> Result<AtRootQuery, CompileError> {
        let Some(query) = query else {
            return Ok(AtRootQuery::default_query());
        };
        let value = self.reduce(query, true)?;
        let Value::Map(map) = &value else {
            return Err(CompileError::custom(format!(
                "Invalid @at-root query: {}. Expected (with: ...) or (without: ...).",
                value.inspect()
            )));
        };
        let (with, names) = if let Some(names) = map.get(&Value::string("with")) {
            (true, names)
        } else if let Some(names) = map.get(&Value::string("without")) {
            (false, names)
        } else {
            return Err(CompileError::custom("@at-root query must name \"with\" or \"without\"."));
        };
        let names = names
            .as_items()
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_ascii_lowercase()))
            .collect();
        Ok(AtRootQuery { with, names })
    }

    fn block_query_name(&self, id: BlockId) -> Option<String> {
        let block = self.tree.block(id);
        match block.kind {
            OutputKind::Rule => Some("rule".to_string()),
            OutputKind::Media => Some("media".to_string()),
            OutputKind::Supports => Some("supports".to_string()),
            OutputKind::Directive => block
                .header
                .as_deref()
                .and_then(|h| h.trim_start_matches('@').split_whitespace().next())
                .map(str::to_ascii_lowercase),
            _ => None,
        }
    }

    fn compile_at_root(
        &mut self,
        selectors: Option<&SelectorSource>,
        query: Option<&Expr>,
        block: &Block,
        out: BlockId,
    ) -> Result<Flow, CompileError> {
        let query = self.at_root_query(query)?;

        // Blocks from `out` up to the root, innermost first.
        let mut chain = Vec::new();
        let mut id = Some(out);
        while let Some(current) = id {
            if current == ROOT_BLOCK {
                break;
            }
            chain.push(current);
            id = self.tree.block(current).parent;
        }
        let outermost_excluded = chain
            .iter()
            .rposition(|&b| self.block_query_name(b).is_some_and(|name| query.excludes(&name)));

        let mut target = match outermost_excluded {
            Some(index) => self.tree.block(chain[index]).parent.unwrap_or(ROOT_BLOCK),
            None => out,
        };
        // Re-create kept at-rules that sat between excluded ones.
        if let Some(index) = outermost_excluded {
            for &kept in chain[..index].iter().rev() {
                let kept_block = self.tree.block(kept);
                if !kept_block.is_at_rule() {
                    continue;
                }
                let name = self.block_query_name(kept).unwrap_or_default();
                if query.excludes(&name) {
                    continue;
                }
                let (kind, header, pos) = (kept_block.kind, kept_block.header.clone(), kept_block.pos.clone());
                let copy = self.tree.push(kind, target, pos);
                self.tree.block_mut(copy).header = header;
                target = copy;
            }
        }

        // `&` in the selector still refers to the enclosing rule.
        let selectors = match selectors {
            Some(source) => Some(self.evaluate_selector(source)?),
            None => None,
        };

        let rule_excluded = query.excludes("rule");
        let mut frame = Frame::new(Marker::Block);
        if rule_excluded {
            frame.selectors = SelectorContext::AtRoot {
                self_parent: self.current_selectors()?,
            };
        }
        if query.excludes("media") {
            frame.media = MediaContext::Barrier;
        }

        let saved = self.env.current();
        self.env.enter(frame);
        let result = match selectors {
            Some(list) => self.compile_resolved_rule(&list, &block.children, &block.pos, target),
            None => {
                let inner = if !rule_excluded && self.tree.block(target).kind != OutputKind::Rule {
                    self.wrapper_rule(target, &block.pos)
                } else {
                    Ok(target)
                };
                inner.and_then(|inner| self.compile_children(&block.children, inner))
            }
        };
        self.env.leave(saved);
        result
    }

    fn compile_extend(&mut self, source: &SelectorSource, optional: bool) -> Result<(), CompileError> {
        let targets = self.evaluate_selector(source)?;
        let Some(origin) = self.current_selectors()? else {
            return Err(CompileError::custom("@extend may only be used within style rules."));
        };
        let origin = list_to_parts(&origin);
        for complex in &targets.selectors {
            let parts = to_parts(complex);
            let [compound] = parts.as_slice() else {
                return Err(CompileError::custom(format!(
                    "complex selectors may not be extended: {}",
                    complex
                )));
            };
            if compound.len() > 1 {
                self.warn(
                    format!(
                        "Extending a compound selector, {}, is deprecated and will not be supported in a future release.",
                        compound.concat()
                    ),
                    true,
                );
            }
            self.extends
                .push(compound.clone(), origin.clone(), optional, self.current_pos.clone());
        }
        Ok(())
    }

    // Mixins, content and functions

    fn compile_include(
        &mut self,
        name: &str,
        args: &[scss::ast::expr::CallArg],
        content: Option<&Block>,
        out: BlockId,
    ) -> Result<(), CompileError> {
        let callable = self
            .env
            .lookup_callable(name, CallableKind::Mixin)?
            .ok_or_else(|| CompileError::UndefinedMixin(name.to_string()))?;
        let args = self.evaluate_args(args)?;
        let content = content.map(|block| {
            let params = match &block.kind {
                BlockKind::Content { params } => params.clone(),
                _ => Params::default(),
            };
            Rc::new(ContentRef {
                block: Rc::new(block.clone()),
                params,
                scope: self.env.current(),
            })
        });

        let pos = self.current_pos.clone();
        self.push_call(format!("@include {}", name))?;
        let mut frame = Frame::new(Marker::Mixin);
        frame.declaration_scope_parent = Some(callable.scope);
        frame.parent_store = Some(self.env.current());
        frame.content = content;

        let saved = self.env.current();
        self.env.enter(frame);
        let result = bind(&callable.name, &callable.params, args)
            .and_then(|bound| self.define_params(&callable.params, bound))
            .and_then(|_| self.compile_children(&callable.body.children, out));
        self.env.leave(saved);
        result?;
        self.pop_call();
        self.current_pos = pos;
        Ok(())
    }

    fn compile_content(&mut self, args: &[scss::ast::expr::CallArg], out: BlockId) -> Result<(), CompileError> {
        let Some(content) = self.env.content()? else {
            return Ok(());
        };
        let args = self.evaluate_args(args)?;

        let pos = self.current_pos.clone();
        self.push_call("@content".to_string())?;
        let mut frame = Frame::new(Marker::Content);
        frame.declaration_scope_parent = Some(content.scope);
        frame.parent_store = Some(self.env.current());

        let saved = self.env.current();
        self.env.enter(frame);
        let result = bind("@content", &content.params, args)
            .and_then(|bound| self.define_params(&content.params, bound))
            .and_then(|_| self.compile_children(&content.block.children, out));
        self.env.leave(saved);
        result?;
        self.pop_call();
        self.current_pos = pos;
        Ok(())
    }

    pub(crate) fn call_user_function(&mut self, callable: &Callable, args: EvaluatedArgs) -> Result<Value, CompileError> {
        let pos = self.current_pos.clone();
        self.push_call(callable.name.clone())?;
        let mut frame = Frame::new(Marker::Function);
        frame.declaration_scope_parent = Some(callable.scope);
        frame.parent_store = Some(self.env.current());

        let saved = self.env.current();
        self.env.enter(frame);
        let result = bind(&callable.name, &callable.params, args)
            .and_then(|bound| self.define_params(&callable.params, bound))
            .and_then(|_| self.compile_children(&callable.body.children, ROOT_BLOCK));
        self.env.leave(saved);
        let value = match result? {
            Flow::Return(value) => value,
            Flow::Normal => {
                return Err(CompileError::custom(format!(
                    "Function {} finished without @return.",
                    callable.name
                )));
            }
        };
        self.pop_call();
        self.current_pos = pos;
        Ok(value)
    }

    // Control flow

    fn compile_each(&mut self, vars: &[String], list: &Expr, children: &[Statement], out: BlockId) -> Result<Flow, CompileError> {
        let items: Vec<Value> = match self.reduce(list, true)? {
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| Value::list(vec![k.clone(), v.clone()], ListSeparator::Space))
                .collect(),
            other => other.as_items(),
        };
        for item in items {
            let saved = self.env.current();
            self.env.enter(Frame::new(Marker::Flow));
            if let [var] = vars {
                self.env.define_local(var, item);
            } else {
                let values = item.as_items();
                for (i, var) in vars.iter().enumerate() {
                    self.env.define_local(var, values.get(i).cloned().unwrap_or(Value::Null));
                }
            }
            let result = self.compile_children(children, out);
            self.env.leave(saved);
            if let Flow::Return(value) = result? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn compile_for(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        inclusive: bool,
        children: &[Statement],
        out: BlockId,
    ) -> Result<Flow, CompileError> {
        let start = match self.reduce(start, true)? {
            Value::Number(n) => n,
            other => return Err(CompileError::type_error("start", other, "number")),
        };
        let end = match self.reduce(end, true)? {
            Value::Number(n) => n,
            other => return Err(CompileError::type_error("end", other, "number")),
        };
        let end_value = if end.is_unitless() || start.is_unitless() {
            end.value
        } else {
            end.coerce_to(&start)?
        };
        let (from, to) = (start.value.round() as i64, end_value.round() as i64);
        let step = if from <= to { 1 } else { -1 };
        let last = if inclusive { to } else { to - step };
        if !inclusive && from == to {
            return Ok(Flow::Normal);
        }

        let mut i = from;
        loop {
            let saved = self.env.current();
            self.env.enter(Frame::new(Marker::Flow));
            self.env.define_local(var, Value::Number(start.with_value(i as f64)));
            let result = self.compile_children(children, out);
            self.env.leave(saved);
            if let Flow::Return(value) = result? {
                return Ok(Flow::Return(value));
            }
            if i == last {
                break;
            }
            i += step;
        }
        Ok(Flow::Normal)
    }

    // Imports

    fn compile_import(&mut self, target: &Expr, media: Option<&StringExpr>, out: BlockId) -> Result<(), CompileError> {
        let value = self.reduce(target, false)?;
        let url = match &value {
            Value::String { text, .. } => text.clone(),
            other => other.to_css(self.compressed)?,
        };
        let is_url_call = matches!(target, Expr::FunctionCall { name, .. } if name.eq_ignore_ascii_case("url"));
        if is_url_call || is_css_import(&url, media.is_some()) {
            let mut text = format!("@import {}", value.to_css(self.compressed)?);
            if let Some(media) = media {
                let media = self.interpolate(media)?;
                text.push(' ');
                text.push_str(media.trim());
            }
            if out == ROOT_BLOCK {
                self.tree.imports.push(OutputLine {
                    kind: LineKind::AtRule(text),
                    pos: self.current_pos.clone(),
                });
            } else {
                self.add_at_rule(text, out);
            }
            return Ok(());
        }
        self.import_file(&url, out)
    }

    fn import_file(&mut self, url: &str, out: BlockId) -> Result<(), CompileError> {
        let current_dir = self
            .file_paths
            .get(&self.current_pos.file_id)
            .and_then(|p| p.parent())
            .map(Path::to_path_buf);
        let resolved = resolve(url, current_dir.as_deref(), &self.options.import_paths)
            .ok_or_else(|| CompileError::ImportNotFound(url.to_string()))?;
        if resolved.from_cwd {
            self.warn(
                format!(
                    "Importing {} relative to the working directory is deprecated; add it to the import paths.",
                    url
                ),
                true,
            );
        }

        let io_error = |path: &Path, err: std::io::Error| CompileError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        };
        let real = resolved.path.canonicalize().map_err(|e| io_error(&resolved.path, e))?;
        if self.import_stack.contains(&real) {
            return Err(CompileError::ImportLoop(real.display().to_string()));
        }
        let source = std::fs::read_to_string(&real).map_err(|e| io_error(&real, e))?;

        let name = resolved.path.display().to_string();
        let file_id = self.files.add(name.clone(), source.clone());
        let sheet = Parser::new(source, file_id)
            .with_name(name)
            .with_cache(self.options.cache.clone())
            .parse()
            .map_err(CompileError::Parse)?;
        debug!(url, path = %real.display(), "importing");

        self.file_paths.insert(file_id, real.clone());
        if !self.included_files.contains(&real) {
            self.included_files.push(real.clone());
        }

        let pos = self.current_pos.clone();
        self.push_call(format!("@import {}", url))?;
        self.import_stack.push(real);
        self.compile_children(&sheet.root.children, out)?;
        self.import_stack.pop();
        self.pop_call();
        self.current_pos = pos;
        Ok(())
    }
}

fn media_header(query: &str) -> String {
    if query.is_empty() {
        "@media".to_string()
    } else {
        format!("@media {}", query)
    }
}

/// Text of a `@warn`, `@debug` or `@error` argument.
fn message_text(value: &Value) -> String {
    match value {
        Value::String { text, .. } => text.clone(),
        other => other.inspect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_root_queries() {
        let default = AtRootQuery::default_query();
        assert!(default.excludes("rule"));
        assert!(!default.excludes("media"));

        let with = AtRootQuery {
            with: true,
            names: HashSet::from(["media".to_string()]),
        };
        assert!(with.excludes("rule"));
        assert!(!with.excludes("media"));

        let all = AtRootQuery {
            with: false,
            names: HashSet::from(["all".to_string()]),
        };
        assert!(all.excludes("supports"));
        assert!(all.excludes("rule"));
    }

    #[test]
    fn message_text_unquotes_strings() {
        assert_eq!(message_text(&Value::quoted("hi")), "hi");
        assert_eq!(message_text(&Value::number(2.0, "px")), "2px");
    }

    #[test]
    fn empty_media_queries_render_a_bare_at_rule() {
        assert_eq!(media_header(""), "@media");
        assert_eq!(media_header("print"), "@media print");
    }
}
