pub mod arguments;
pub mod color;
pub mod compiler;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod extend;
pub mod formatter;
mod functions;
pub mod import;
pub mod logger;
pub mod media;
pub mod number;
pub mod operators;
pub mod output;
pub mod runtime_value;
pub mod selector;
pub mod source_map;

pub use compiler::{
    CompilationResult, Compiler, CompilerOptions, OutputStyle, RegisteredFunction, SourceMapMode,
};
pub use error::{CompileError, DiagnosticError, Error};
pub use import::ImportPath;
pub use logger::{CollectingLogger, Logger, TracingLogger, Warning};
pub use runtime_value::Value;
