//! The public compiler API: options, custom functions, and the
//! parse → evaluate → format pipeline.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use codespan_reporting::files::SimpleFiles;
use indexmap::IndexMap;
use scss::ast::expr::Params;
use scss::cache::{content_hash, CacheStore};
use scss::parser::{parse_expression, parse_params, ParseError, Parser};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompileError, DiagnosticError, Error};
use crate::executor::Executor;
use crate::formatter::{format_tree, Formatter, StyledFormatter};
use crate::import::ImportPath;
use crate::logger::{Logger, TracingLogger};
use crate::output::OutputTree;
use crate::runtime_value::Value;
use crate::source_map::{inline_comment, url_comment, SourceMapBuilder};

/// Mixin/function nesting allowed before a compile is aborted.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 25_000;

/// Stack reserved for the compiling thread.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024 * 1024;

const RESULT_CACHE_OPERATION: &str = "compile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compact,
    Compressed,
}

impl FromStr for OutputStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expanded" => Ok(OutputStyle::Expanded),
            "compact" => Ok(OutputStyle::Compact),
            "compressed" => Ok(OutputStyle::Compressed),
            other => Err(format!("unknown output style '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMapMode {
    #[default]
    None,
    /// Embedded in the CSS as a base64 data URL.
    Inline,
    /// Returned next to the CSS, referenced by `source_map_url`.
    File,
}

pub type FunctionCallback = Arc<dyn Fn(&[Value]) -> Result<Value, CompileError> + Send + Sync>;

/// A native function registered by the host.
#[derive(Clone)]
pub struct RegisteredFunction {
    pub callback: FunctionCallback,
    /// Declared parameters. Without them arguments are passed positionally
    /// and named arguments are rejected.
    pub params: Option<Params>,
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct CompilerOptions {
    pub style: OutputStyle,
    pub import_paths: Vec<ImportPath>,
    pub source_map: SourceMapMode,
    /// URL written into the `sourceMappingURL` comment in `File` mode.
    pub source_map_url: Option<String>,
    /// `file` field of the map.
    pub source_map_file: Option<String>,
    pub source_map_root: String,
    /// Variables defined before compiling, as `name → expression source`.
    pub variables: IndexMap<String, String>,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub logger: Arc<dyn Logger>,
    /// Overrides the formatter picked by `style`.
    pub formatter: Option<Arc<dyn Formatter>>,
    pub max_call_depth: usize,
    /// Compile on a dedicated thread with this much stack; `None` compiles
    /// on the calling thread. Either way nested calls fail with
    /// `StackOverflow` before the native stack runs out; on the calling
    /// thread only a conservative 1 MiB is assumed to be available.
    pub stack_size: Option<usize>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            style: OutputStyle::default(),
            import_paths: Vec::new(),
            source_map: SourceMapMode::None,
            source_map_url: None,
            source_map_file: None,
            source_map_root: String::new(),
            variables: IndexMap::new(),
            cache: None,
            logger: Arc::new(TracingLogger),
            formatter: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            stack_size: Some(DEFAULT_STACK_SIZE),
        }
    }
}

impl fmt::Debug for CompilerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerOptions")
            .field("style", &self.style)
            .field("import_paths", &self.import_paths)
            .field("source_map", &self.source_map)
            .field("source_map_url", &self.source_map_url)
            .field("source_map_root", &self.source_map_root)
            .field("variables", &self.variables)
            .field("cache", &self.cache.is_some())
            .field("formatter", &self.formatter)
            .field("max_call_depth", &self.max_call_depth)
            .field("stack_size", &self.stack_size)
            .finish_non_exhaustive()
    }
}

impl CompilerOptions {
    /// Everything that changes the output for the same source.
    fn fingerprint(&self) -> String {
        format!(
            "{:?}|{:?}|{:?}|{:?}|{}|{:?}|{:?}",
            self.style,
            self.import_paths,
            self.source_map,
            self.source_map_url,
            self.source_map_root,
            self.variables,
            self.formatter,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationResult {
    pub css: String,
    pub source_map: Option<String>,
    /// Real paths of every file read, the entry file first.
    pub included_files: Vec<PathBuf>,
}

/// A compile result as stored in the cache, with the modification times its
/// validity depends on.
#[derive(Serialize, Deserialize)]
struct CachedResult {
    result: CompilationResult,
    mtimes: Vec<Option<SystemTime>>,
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// A parse error surfacing from an imported file is reported as such.
fn into_error(err: DiagnosticError) -> Error {
    match err.error {
        CompileError::Parse(parse) => Error::Parse(parse),
        _ => Error::Compile(err),
    }
}

pub struct Compiler {
    options: CompilerOptions,
    functions: HashMap<String, RegisteredFunction>,
    files: SimpleFiles<String, String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new(CompilerOptions::default())
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Compiler")
            .field("options", &self.options)
            .field("functions", &functions)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Compiler {
            options,
            functions: HashMap::new(),
            files: SimpleFiles::new(),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut CompilerOptions {
        &mut self.options
    }

    /// Sources of the last compile, for rendering diagnostics.
    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    /// Register a native function. `prototype` declares its parameters in
    /// SCSS syntax, e.g. `($a, $b: 1)`.
    pub fn register_function<F>(&mut self, name: &str, prototype: Option<&str>, callback: F) -> Result<(), ParseError>
    where
        F: Fn(&[Value]) -> Result<Value, CompileError> + Send + Sync + 'static,
    {
        let params = prototype.map(parse_params).transpose()?;
        self.functions.insert(
            crate::environment::normalize_name(name),
            RegisteredFunction {
                callback: Arc::new(callback),
                params,
            },
        );
        Ok(())
    }

    pub fn unregister_function(&mut self, name: &str) {
        self.functions.remove(&crate::environment::normalize_name(name));
    }

    pub fn compile_file(&mut self, path: &Path) -> Result<CompilationResult, Error> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::Compile(DiagnosticError::from(CompileError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            }))
        })?;
        self.compile_string(&source, Some(path))
    }

    /// Compile `source`. `path` names the file for relative imports and
    /// error messages.
    pub fn compile_string(&mut self, source: &str, path: Option<&Path>) -> Result<CompilationResult, Error> {
        self.files = SimpleFiles::new();

        let cache_key = self.options.cache.as_ref().map(|_| {
            let path = path.map(|p| p.display().to_string()).unwrap_or_default();
            format!("{}:{}", path, content_hash(source))
        });
        if let Some(hit) = self.cached_result(cache_key.as_deref()) {
            return Ok(hit);
        }

        let (tree, included_files) = self.evaluate(source, path)?;

        let formatter: Arc<dyn Formatter> = match &self.options.formatter {
            Some(formatter) => formatter.clone(),
            None => Arc::new(match self.options.style {
                OutputStyle::Expanded => StyledFormatter::expanded(),
                OutputStyle::Compact => StyledFormatter::compact(),
                OutputStyle::Compressed => StyledFormatter::compressed(),
            }),
        };

        let result = match self.options.source_map {
            SourceMapMode::None => CompilationResult {
                css: format_tree(formatter.as_ref(), &tree, None),
                source_map: None,
                included_files,
            },
            mode => {
                let mut map = SourceMapBuilder::new();
                let mut css = format_tree(formatter.as_ref(), &tree, Some(&mut map));
                let files = &self.files;
                let json = map
                    .to_json(
                        self.options.source_map_file.as_deref(),
                        &self.options.source_map_root,
                        |id| files.get(id).map(|f| f.name().clone()).unwrap_or_default(),
                    )
                    .map_err(|e| Error::Compile(CompileError::custom(e.to_string()).into()))?;
                let source_map = if mode == SourceMapMode::Inline {
                    css.push('\n');
                    css.push_str(&inline_comment(&json));
                    None
                } else {
                    if let Some(url) = &self.options.source_map_url {
                        css.push('\n');
                        css.push_str(&url_comment(url));
                    }
                    Some(json)
                };
                CompilationResult {
                    css,
                    source_map,
                    included_files,
                }
            }
        };

        if let (Some(cache), Some(key)) = (&self.options.cache, &cache_key) {
            let cached = CachedResult {
                mtimes: result.included_files.iter().map(|p| mtime(p)).collect(),
                result: result.clone(),
            };
            if let Ok(json) = serde_json::to_string(&cached) {
                cache.put(RESULT_CACHE_OPERATION, key, &json, &self.options.fingerprint());
            }
        }
        Ok(result)
    }

    /// A cached result whose included files are all unchanged.
    fn cached_result(&self, key: Option<&str>) -> Option<CompilationResult> {
        let (cache, key) = (self.options.cache.as_ref()?, key?);
        let json = cache.get(RESULT_CACHE_OPERATION, key, &self.options.fingerprint(), None)?;
        let cached: CachedResult = serde_json::from_str(&json).ok()?;
        let fresh = cached.result.included_files.len() == cached.mtimes.len()
            && cached
                .result
                .included_files
                .iter()
                .zip(&cached.mtimes)
                .all(|(path, recorded)| mtime(path) == *recorded);
        if !fresh {
            debug!(key, "stale compile result");
            return None;
        }
        debug!(key, "compile result cache hit");
        Some(cached.result)
    }

    /// Parse and evaluate, on a thread with a large stack when configured.
    fn evaluate(&mut self, source: &str, path: Option<&Path>) -> Result<(OutputTree, Vec<PathBuf>), Error> {
        let options = &self.options;
        let functions = &self.functions;
        let files = &mut self.files;
        let Some(stack_size) = options.stack_size else {
            return evaluate(options, functions, files, source, path);
        };
        std::thread::scope(|scope| {
            let handle = std::thread::Builder::new()
                .name("scss-compile".to_string())
                .stack_size(stack_size)
                .spawn_scoped(scope, move || evaluate(options, functions, files, source, path))
                .map_err(|e| {
                    Error::Compile(CompileError::custom(format!("cannot start compiler thread: {}", e)).into())
                })?;
            match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }
}

fn evaluate(
    options: &CompilerOptions,
    functions: &HashMap<String, RegisteredFunction>,
    files: &mut SimpleFiles<String, String>,
    source: &str,
    path: Option<&Path>,
) -> Result<(OutputTree, Vec<PathBuf>), Error> {
    let name = path.map(|p| p.display().to_string()).unwrap_or_else(|| "stdin".to_string());
    let file_id = files.add(name.clone(), source.to_string());
    let sheet = Parser::new(source.to_string(), file_id)
        .with_name(name)
        .with_cache(options.cache.clone())
        .parse()?;

    let mut executor = Executor::new(options, functions, files);
    for (name, text) in &options.variables {
        let expr = parse_expression(text)?;
        let value = executor.reduce(&expr, true).map_err(|e| Error::Compile(e.into()))?;
        executor
            .env
            .assign(name.trim_start_matches('$'), value, true, false)
            .map_err(|e| Error::Compile(e.into()))?;
    }
    executor.run(&sheet, path).map_err(into_error)?;
    Ok(executor.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str, style: OutputStyle) -> Result<String, Error> {
        let mut compiler = Compiler::new(CompilerOptions {
            style,
            stack_size: None,
            ..CompilerOptions::default()
        });
        compiler.compile_string(source, None).map(|r| r.css)
    }

    #[test]
    fn styles_parse_from_names() {
        assert_eq!("compact".parse::<OutputStyle>(), Ok(OutputStyle::Compact));
        assert!("nested".parse::<OutputStyle>().is_err());
    }

    #[test]
    fn preset_variables_are_global() {
        let mut options = CompilerOptions {
            style: OutputStyle::Compact,
            ..CompilerOptions::default()
        };
        options.variables.insert("$gap".into(), "4px * 2".into());
        let mut compiler = Compiler::new(options);
        let css = compiler.compile_string(".a { margin: $gap; }", None).unwrap().css;
        assert_eq!(css, ".a { margin: 8px; }");
    }

    #[test]
    fn registered_functions_are_callable() {
        let mut compiler = Compiler::new(CompilerOptions {
            style: OutputStyle::Compact,
            stack_size: None,
            ..CompilerOptions::default()
        });
        compiler
            .register_function("double", Some("($n, $by: 2)"), |args| match (&args[0], &args[1]) {
                (Value::Number(n), Value::Number(by)) => Ok(Value::Number(n.mul(by))),
                _ => Err(CompileError::custom("numbers expected")),
            })
            .unwrap();
        let css = compiler.compile_string(".a { width: double(3px); }", None).unwrap().css;
        assert_eq!(css, ".a { width: 6px; }");
    }

    #[test]
    fn parse_errors_are_not_compile_errors() {
        assert!(matches!(compile(".a { color: red", OutputStyle::Expanded), Err(Error::Parse(_))));
        assert!(matches!(compile(".a { color: $nope; }", OutputStyle::Expanded), Err(Error::Compile(_))));
    }

    #[test]
    fn inline_source_maps_are_appended() {
        let mut compiler = Compiler::new(CompilerOptions {
            source_map: SourceMapMode::Inline,
            ..CompilerOptions::default()
        });
        let result = compiler.compile_string(".a { color: red; }", None).unwrap();
        assert!(result.source_map.is_none());
        assert!(result.css.contains("sourceMappingURL=data:application/json"));
    }
}
