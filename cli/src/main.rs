mod test_runner;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use compiler::{
    CollectingLogger, Compiler, CompilerOptions, ImportPath, OutputStyle, SourceMapMode,
};
use scss::cache::{CacheConfig, CacheStore, FileCache};

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];

#[derive(Parser)]
#[command(name = "scssc", version, about = "SCSS to CSS compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a stylesheet
    Run(RunArgs),

    /// Run .test.scss test files
    Test(TestArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    Expanded,
    Compact,
    Compressed,
}

impl From<StyleArg> for OutputStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Expanded => OutputStyle::Expanded,
            StyleArg::Compact => OutputStyle::Compact,
            StyleArg::Compressed => OutputStyle::Compressed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceMapArg {
    None,
    Inline,
    File,
}

#[derive(clap::Args)]
struct RunArgs {
    /// SCSS source file, or `-` for stdin
    file: String,

    /// Output style
    #[arg(short, long, value_enum, default_value = "expanded")]
    style: StyleArg,

    /// Directory searched for imports. Repeatable.
    #[arg(short = 'I', long = "load-path")]
    load_paths: Vec<PathBuf>,

    /// Write CSS here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Source map generation. `file` writes `<output>.map` next to the CSS.
    #[arg(long, value_enum, default_value = "none")]
    sourcemap: SourceMapArg,

    /// Pre-set a global variable, e.g. `-D primary=#333`. Repeatable.
    #[arg(short = 'D', long = "define", value_parser = parse_define)]
    defines: Vec<(String, String)>,

    /// Cache parse trees and compile results in this directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Parse only, don't compile (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump parsed AST
    #[arg(long)]
    ast: bool,

    /// Don't print warnings or `@debug` output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.scss file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn parse_define(text: &str) -> Result<(String, String), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", text))?;
    Ok((name.trim().to_string(), value.to_string()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // `scssc file.scss` works like `scssc run file.scss`.
    let mut args: Vec<String> = std::env::args().collect();
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-') || *a == "-");
    if first_positional.is_some_and(|a| !SUBCOMMANDS.contains(&a.as_str())) {
        args.insert(1, "run".to_string());
    }

    let cli = Cli::parse_from(&args);

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn read_source(file: &str) -> std::io::Result<String> {
    if file == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(file)
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}

/// `@debug` output, one message per line.
fn write_debug_messages(out: &mut impl std::io::Write, messages: &[String]) -> std::io::Result<()> {
    for message in messages {
        writeln!(out, "{}", message)?;
    }
    Ok(())
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();

    let source = read_source(&args.file)
        .unwrap_or_else(|e| fail(format!("cannot read '{}': {}", args.file, e)));
    let path = (args.file != "-").then(|| PathBuf::from(&args.file));

    if args.check || args.ast {
        let mut files = SimpleFiles::new();
        let file_id = files.add(args.file.clone(), source.clone());
        match scss::parser::Parser::new(source, file_id).with_name(args.file.clone()).parse() {
            Ok(sheet) if args.ast => println!("{:#?}", sheet),
            Ok(_) => eprintln!("ok: {} parsed successfully", args.file),
            Err(error) => {
                let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &error.to_diagnostic());
                process::exit(1);
            }
        }
        return;
    }

    let cache = args.cache_dir.as_ref().map(|dir| {
        let cache = FileCache::new(CacheConfig::new(dir))
            .unwrap_or_else(|e| fail(format!("cannot open cache '{}': {}", dir.display(), e)));
        if let Err(e) = cache.gc() {
            tracing::warn!(error = %e, "cache sweep failed");
        }
        Arc::new(cache) as Arc<dyn CacheStore>
    });

    let source_map = match args.sourcemap {
        SourceMapArg::None => SourceMapMode::None,
        SourceMapArg::Inline => SourceMapMode::Inline,
        SourceMapArg::File => match &args.output {
            Some(_) => SourceMapMode::File,
            None => fail("--sourcemap file requires --output"),
        },
    };
    let map_path = args.output.as_ref().map(|out| {
        let mut name = out.clone().into_os_string();
        name.push(".map");
        PathBuf::from(name)
    });

    let logger = Arc::new(CollectingLogger::new());
    let mut options = CompilerOptions {
        style: args.style.into(),
        import_paths: args.load_paths.into_iter().map(ImportPath::Directory).collect(),
        source_map,
        source_map_url: map_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned()),
        source_map_file: args
            .output
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned()),
        cache,
        logger: logger.clone(),
        ..CompilerOptions::default()
    };
    options.variables.extend(args.defines);

    let mut compiler = Compiler::new(options);
    let result = compiler.compile_string(&source, path.as_deref());

    if !args.quiet {
        let _ = write_debug_messages(&mut std::io::stderr().lock(), &logger.debug_messages());
        for warning in logger.warnings() {
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, compiler.files(), &warning.to_diagnostic());
        }
    }

    let result = match result {
        Ok(result) => result,
        Err(error) => {
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, compiler.files(), &error.to_diagnostic());
            process::exit(1);
        }
    };

    match &args.output {
        Some(out) => {
            if let Err(e) = std::fs::write(out, format!("{}\n", result.css)) {
                fail(format!("cannot write '{}': {}", out.display(), e));
            }
            if let (Some(map), Some(map_path)) = (&result.source_map, &map_path) {
                if let Err(e) = std::fs::write(map_path, map) {
                    fail(format!("cannot write '{}': {}", map_path.display(), e));
                }
            }
        }
        None => println!("{}", result.css),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::Logger;

    #[test]
    fn debug_messages_are_written_in_order() {
        let logger = CollectingLogger::new();
        logger.debug("input.scss:1 DEBUG: first");
        logger.debug("input.scss:2 DEBUG: second");

        let mut out = Vec::new();
        write_debug_messages(&mut out, &logger.debug_messages()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "input.scss:1 DEBUG: first\ninput.scss:2 DEBUG: second\n"
        );
    }

    #[test]
    fn defines_split_on_the_first_equals() {
        assert_eq!(parse_define("a=b=c"), Ok(("a".to_string(), "b=c".to_string())));
        assert!(parse_define("novalue").is_err());
    }
}
