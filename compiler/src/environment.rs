use std::collections::HashMap;
use std::rc::Rc;

use scss::ast::expr::Params;
use scss::ast::selector::SelectorList;
use scss::ast::Block;

use crate::error::CompileError;
use crate::media::CssMediaQuery;
use crate::runtime_value::Value;

/// Index of a frame in the [`Environment`] arena.
pub type FrameId = usize;

/// The global frame.
pub const ROOT: FrameId = 0;

/// Upper bound on frames visited by one variable lookup.
pub const MAX_LOOKUP_HOPS: usize = 10_000;

/// Why a frame was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// A rule, media block or directive body.
    Block,
    /// One `@if` branch or loop iteration. Assignments to existing globals
    /// from flow frames directly under the root update the global.
    Flow,
    Mixin,
    Function,
    /// A `@content` block evaluated inside its mixin.
    Content,
}

impl Marker {
    /// Frames whose lookups continue in their declaration scope rather than
    /// in their caller.
    fn is_closure(self) -> bool {
        matches!(self, Marker::Mixin | Marker::Function | Marker::Content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Mixin,
    Function,
}

/// A user-defined mixin or function closed over its declaring frame.
#[derive(Debug)]
pub struct Callable {
    pub name: String,
    pub kind: CallableKind,
    pub params: Params,
    pub body: Rc<Block>,
    pub scope: FrameId,
}

/// The content block passed to the current mixin invocation.
#[derive(Debug)]
pub struct ContentRef {
    pub block: Rc<Block>,
    pub params: Params,
    /// Frame active at the `@include` site.
    pub scope: FrameId,
}

/// What a frame contributes to selector resolution.
#[derive(Debug, Clone, Default)]
pub enum SelectorContext {
    #[default]
    None,
    /// A style rule, holding its fully resolved selectors.
    Rule(SelectorList),
    /// `@at-root` barrier; `&` below it refers to `self_parent`.
    AtRoot { self_parent: Option<SelectorList> },
    /// `@keyframes` barrier; nested selectors are never joined.
    Keyframes,
}

/// What a frame contributes to media query merging.
#[derive(Debug, Clone, Default)]
pub enum MediaContext {
    #[default]
    None,
    Media(Vec<CssMediaQuery>),
    /// A directive or `@at-root (without: media)`; enclosing queries stop here.
    Barrier,
}

#[derive(Debug, Default)]
pub struct Frame {
    vars: HashMap<String, Value>,
    mixins: HashMap<String, Rc<Callable>>,
    functions: HashMap<String, Rc<Callable>>,
    /// Enclosing frame at evaluation time.
    pub parent: Option<FrameId>,
    /// Calling frame of a mixin, function or content invocation.
    pub parent_store: Option<FrameId>,
    /// Frame in which the invoked callable was declared.
    pub declaration_scope_parent: Option<FrameId>,
    pub marker: Option<Marker>,
    pub selectors: SelectorContext,
    pub media: MediaContext,
    pub content: Option<Rc<ContentRef>>,
    /// Prefix of nested properties, e.g. `font` in `font: { size: 1px }`.
    pub property_prefix: Option<String>,
    /// Referenced by a callable or content block; kept when left.
    captured: bool,
}

impl Frame {
    pub fn new(marker: Marker) -> Self {
        Frame {
            marker: Some(marker),
            ..Frame::default()
        }
    }

    pub fn with_selectors(mut self, selectors: SelectorContext) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_media(mut self, media: MediaContext) -> Self {
        self.media = media;
        self
    }

    fn marker(&self) -> Marker {
        self.marker.unwrap_or(Marker::Block)
    }
}

/// Variable names treat `-` and `_` as the same character.
pub fn normalize_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Arena of scope frames. Frames are addressed by index; a frame stays alive
/// while a callable or content block declared in it may still run.
#[derive(Debug)]
pub struct Environment {
    frames: Vec<Frame>,
    current: FrameId,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            frames: vec![Frame::new(Marker::Block)],
            current: ROOT,
        }
    }

    pub fn current(&self) -> FrameId {
        self.current
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id]
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id]
    }

    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    pub fn current_frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.current]
    }

    /// Push `frame` as a child of the current frame and make it current.
    pub fn enter(&mut self, mut frame: Frame) -> FrameId {
        frame.parent = Some(self.current);
        self.frames.push(frame);
        self.current = self.frames.len() - 1;
        self.current
    }

    /// Return to `saved`, releasing the frame being left if nothing captured it.
    pub fn leave(&mut self, saved: FrameId) {
        let left = self.current;
        self.current = saved;
        if left != ROOT && left == self.frames.len() - 1 && !self.frames[left].captured && left > saved {
            self.frames.pop();
        }
    }

    /// Run `f` with `id` made current, then restore the previous frame.
    pub fn with_current<T>(&mut self, id: FrameId, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.current;
        self.current = id;
        let result = f(self);
        self.current = saved;
        result
    }

    pub fn capture(&mut self, id: FrameId) {
        self.frames[id].captured = true;
    }

    /// Next frame to search after `id`: closures continue in their
    /// declaration scope, everything else in its parent.
    fn next_scope(&self, id: FrameId) -> Option<FrameId> {
        if id == ROOT {
            return None;
        }
        let frame = &self.frames[id];
        if frame.marker().is_closure() {
            Some(frame.declaration_scope_parent.unwrap_or(ROOT))
        } else {
            frame.parent
        }
    }

    /// Frames searched by a lookup starting at `from`, nearest first.
    fn scope_chain(&self, from: FrameId, name: &str) -> Result<Vec<FrameId>, CompileError> {
        let mut chain = Vec::new();
        let mut next = Some(from);
        while let Some(id) = next {
            if chain.len() >= MAX_LOOKUP_HOPS {
                return Err(CompileError::ScopeDepth(name.to_string()));
            }
            chain.push(id);
            next = self.next_scope(id);
        }
        Ok(chain)
    }

    fn find_var(&self, name: &str, from: FrameId) -> Result<Option<FrameId>, CompileError> {
        let mut next = Some(from);
        let mut hops = 0;
        while let Some(id) = next {
            hops += 1;
            if hops > MAX_LOOKUP_HOPS {
                return Err(CompileError::ScopeDepth(name.to_string()));
            }
            if self.frames[id].vars.contains_key(name) {
                return Ok(Some(id));
            }
            next = self.next_scope(id);
        }
        Ok(None)
    }

    pub fn lookup(&self, name: &str) -> Result<Option<&Value>, CompileError> {
        self.lookup_from(name, self.current)
    }

    pub fn lookup_from(&self, name: &str, from: FrameId) -> Result<Option<&Value>, CompileError> {
        let name = normalize_name(name);
        Ok(self
            .find_var(&name, from)?
            .and_then(|id| self.frames[id].vars.get(&name)))
    }

    pub fn get(&self, name: &str) -> Result<Value, CompileError> {
        self.lookup(name)?
            .cloned()
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.frames[ROOT].vars.get(&normalize_name(name))
    }

    /// Whether every frame between the current one and the root is a flow frame.
    fn in_semi_global_scope(&self) -> bool {
        let mut id = self.current;
        while id != ROOT {
            let frame = &self.frames[id];
            if frame.marker() != Marker::Flow {
                return false;
            }
            match frame.parent {
                Some(parent) => id = parent,
                None => return false,
            }
        }
        true
    }

    /// Assign a variable.
    ///
    /// `!global` writes the root frame. Otherwise an existing local binding
    /// in an enclosing frame is updated; an existing global is updated only
    /// from the root or from flow frames directly under it; anything else
    /// creates a binding in the current frame.
    pub fn assign(
        &mut self,
        name: &str,
        value: Value,
        global: bool,
        default: bool,
    ) -> Result<(), CompileError> {
        let name = normalize_name(name);
        if default {
            let existing = if global {
                self.frames[ROOT].vars.get(&name)
            } else {
                self.find_var(&name, self.current)?
                    .and_then(|id| self.frames[id].vars.get(&name))
            };
            if existing.is_some_and(|v| !v.is_null()) {
                return Ok(());
            }
        }
        if global {
            self.frames[ROOT].vars.insert(name, value);
            return Ok(());
        }
        let target = match self.find_var(&name, self.current)? {
            Some(ROOT) if self.current != ROOT && !self.in_semi_global_scope() => self.current,
            Some(id) => id,
            None => self.current,
        };
        self.frames[target].vars.insert(name, value);
        Ok(())
    }

    /// Bind a variable in the current frame only (parameters, loop variables).
    pub fn define_local(&mut self, name: &str, value: Value) {
        self.frames[self.current]
            .vars
            .insert(normalize_name(name), value);
    }

    pub fn define_callable(&mut self, callable: Callable) {
        let name = normalize_name(&callable.name);
        self.capture(callable.scope);
        let frame = &mut self.frames[self.current];
        match callable.kind {
            CallableKind::Mixin => frame.mixins.insert(name, Rc::new(callable)),
            CallableKind::Function => frame.functions.insert(name, Rc::new(callable)),
        };
    }

    pub fn lookup_callable(
        &self,
        name: &str,
        kind: CallableKind,
    ) -> Result<Option<Rc<Callable>>, CompileError> {
        let name = normalize_name(name);
        for id in self.scope_chain(self.current, &name)? {
            let frame = &self.frames[id];
            let table = match kind {
                CallableKind::Mixin => &frame.mixins,
                CallableKind::Function => &frame.functions,
            };
            if let Some(callable) = table.get(&name) {
                return Ok(Some(callable.clone()));
            }
        }
        Ok(None)
    }

    /// The content block of the innermost mixin invocation visible from the
    /// current frame.
    pub fn content(&self) -> Result<Option<Rc<ContentRef>>, CompileError> {
        for id in self.scope_chain(self.current, "content")? {
            let frame = &self.frames[id];
            if frame.marker() == Marker::Mixin {
                return Ok(frame.content.clone());
            }
        }
        Ok(None)
    }

    /// Frames from the current one up to the root along evaluation parents.
    pub fn ancestors(&self) -> impl Iterator<Item = &Frame> {
        let mut next = Some(self.current);
        std::iter::from_fn(move || {
            let id = next?;
            let frame = &self.frames[id];
            next = frame.parent;
            Some(frame)
        })
    }

    /// Whether any enclosing frame is a function body.
    pub fn in_function(&self) -> bool {
        self.ancestors()
            .any(|f| f.marker() == Marker::Function)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Value {
        Value::number(v, "")
    }

    #[test]
    fn nested_blocks_shadow_globals() {
        let mut env = Environment::new();
        env.assign("x", num(1.0), false, false).unwrap();
        let saved = env.current();
        env.enter(Frame::new(Marker::Block));
        env.assign("x", num(2.0), false, false).unwrap();
        assert_eq!(env.get("x").unwrap(), num(2.0));
        env.leave(saved);
        assert_eq!(env.get("x").unwrap(), num(1.0));
    }

    #[test]
    fn flow_frames_at_root_update_globals() {
        let mut env = Environment::new();
        env.assign("sum", num(0.0), false, false).unwrap();
        let saved = env.current();
        env.enter(Frame::new(Marker::Flow));
        env.define_local("i", num(3.0));
        env.assign("sum", num(3.0), false, false).unwrap();
        env.leave(saved);
        assert_eq!(env.get("sum").unwrap(), num(3.0));
        assert!(env.lookup("i").unwrap().is_none());
    }

    #[test]
    fn enclosing_locals_are_updated() {
        let mut env = Environment::new();
        let saved = env.current();
        env.enter(Frame::new(Marker::Block));
        env.assign("a", num(1.0), false, false).unwrap();
        let inner_saved = env.current();
        env.enter(Frame::new(Marker::Block));
        env.assign("a", num(5.0), false, false).unwrap();
        env.leave(inner_saved);
        assert_eq!(env.get("a").unwrap(), num(5.0));
        env.leave(saved);
    }

    #[test]
    fn default_and_global_flags() {
        let mut env = Environment::new();
        env.assign("a", num(1.0), false, true).unwrap();
        env.assign("a", num(2.0), false, true).unwrap();
        assert_eq!(env.get("a").unwrap(), num(1.0));
        let saved = env.current();
        env.enter(Frame::new(Marker::Block));
        env.assign("b", num(7.0), true, false).unwrap();
        env.leave(saved);
        assert_eq!(env.global("b"), Some(&num(7.0)));
    }

    #[test]
    fn closures_skip_the_call_site() {
        let mut env = Environment::new();
        env.assign("v", num(1.0), false, false).unwrap();
        let saved = env.current();
        env.enter(Frame::new(Marker::Block));
        env.define_local("v", num(99.0));
        let mut call = Frame::new(Marker::Mixin);
        call.declaration_scope_parent = Some(ROOT);
        call.parent_store = Some(env.current());
        env.enter(call);
        assert_eq!(env.get("v").unwrap(), num(1.0));
        env.leave(saved);
    }

    #[test]
    fn underscores_and_hyphens_are_interchangeable() {
        let mut env = Environment::new();
        env.assign("my_var", num(4.0), false, false).unwrap();
        assert_eq!(env.get("my-var").unwrap(), num(4.0));
    }
}
