use std::fs;
use std::path::Path;
use std::sync::Arc;

use compiler::{CollectingLogger, CompileError, Compiler, CompilerOptions, Error, OutputStyle, SourceMapMode};
use scss::cache::MemoryCache;

fn options(style: OutputStyle) -> CompilerOptions {
    CompilerOptions {
        style,
        ..CompilerOptions::default()
    }
}

fn compile_with(source: &str, options: CompilerOptions) -> Result<String, Error> {
    Compiler::new(options).compile_string(source, None).map(|r| r.css)
}

fn compact(source: &str) -> String {
    match compile_with(source, options(OutputStyle::Compact)) {
        Ok(css) => css,
        Err(err) => panic!("compile failed: {}", err),
    }
}

fn compile_error(source: &str) -> Error {
    match compile_with(source, options(OutputStyle::Compact)) {
        Ok(css) => panic!("expected an error, got:\n{}", css),
        Err(err) => err,
    }
}

/// Selectors of the first rule containing `declaration`.
fn selectors_of(css: &str, declaration: &str) -> Vec<String> {
    let line = css
        .lines()
        .find(|line| line.contains(declaration))
        .unwrap_or_else(|| panic!("no rule with {} in:\n{}", declaration, css));
    let (selectors, _) = line.split_once(" {").unwrap();
    selectors.split(", ").map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Nesting and parent selectors
// ---------------------------------------------------------------------------

#[test]
fn variables_arithmetic_and_nesting() {
    let css = compact("$x: 1px; .a { width: $x * 2; .b { color: red; } }");
    assert_eq!(css, ".a { width: 2px; }\n.a .b { color: red; }");
}

#[test]
fn expanded_style() {
    let css = compile_with("$x: 1px; .a { width: $x * 2; .b { color: red; } }", options(OutputStyle::Expanded)).unwrap();
    assert_eq!(css, ".a {\n  width: 2px;\n}\n.a .b {\n  color: red;\n}");
}

#[test]
fn compressed_style() {
    let css = compile_with(".a { color: red; width: 0.5px; }\n.b { top: 0; }", options(OutputStyle::Compressed)).unwrap();
    assert_eq!(css, ".a{color:red;width:.5px}.b{top:0}");
}

#[test]
fn parent_selector_joins() {
    assert_eq!(compact(".a { &:hover { x: y; } }"), ".a:hover { x: y; }");
    assert_eq!(compact(".a { .b & { x: y; } }"), ".b .a { x: y; }");
    assert_eq!(compact(".a { .b { & & { x: y; } } }"), ".a .b .a .b { x: y; }");
    assert_eq!(compact(".a { .c:not(&) { x: y; } }"), ".c:not(.a) { x: y; }");
    assert_eq!(compact(".a, .b { .c { x: y; } }"), ".a .c, .b .c { x: y; }");
}

#[test]
fn nested_properties() {
    let css = compact(".a { font: { family: serif; size: 1px; } }");
    assert_eq!(css, ".a { font-family: serif; font-size: 1px; }");
}

#[test]
fn flat_css_round_trips() {
    let source = "a { color: red; }\n.b, .c > d { margin: 0 auto; }";
    assert_eq!(compact(source), source);
}

#[test]
fn loud_comments_survive_except_compressed() {
    assert_eq!(compact("/* hi */\n.a { b: c; }"), "/* hi */\n.a { b: c; }");
    let css = compile_with("/* hi */\n.a { b: c; }", options(OutputStyle::Compressed)).unwrap();
    assert_eq!(css, ".a{b:c}");
}

#[test]
fn at_root_leaves_the_parent() {
    assert_eq!(compact(".a { @at-root .b { c: d; } }"), ".b { c: d; }");
}

#[test]
fn parent_reference_inside_at_root_selector() {
    assert_eq!(compact(".a { @at-root #{&}-x { y: z; } }"), ".a-x { y: z; }");
    assert_eq!(compact(".a { .b { @at-root & .c { d: e; } } }"), ".a .b .c { d: e; }");
    assert_eq!(compact(".a { @at-root .b { &-c { d: e; } } }"), ".b-c { d: e; }");
}

#[test]
fn deeply_nested_rules_resolve_against_every_ancestor() {
    let mut source = String::new();
    for depth in 0..40 {
        source.push_str(&format!(".l{} {{ ", depth));
    }
    source.push_str("&-end { x: y; }");
    source.push_str(&" }".repeat(40));

    let expected: Vec<String> = (0..40).map(|depth| format!(".l{}", depth)).collect();
    assert_eq!(compact(&source), format!("{}-end {{ x: y; }}", expected.join(" ")));
}

// ---------------------------------------------------------------------------
// @extend
// ---------------------------------------------------------------------------

#[test]
fn extend_is_transitive() {
    let css = compact(".z { color: red; }\n.y { @extend .z; }\n.x { @extend .y; }");
    let mut selectors = selectors_of(&css, "color: red");
    selectors.sort();
    assert_eq!(selectors, vec![".x", ".y", ".z"]);
}

#[test]
fn placeholders_only_appear_through_extend() {
    assert_eq!(compact("%p { color: red; }\n.a { @extend %p; }"), ".a { color: red; }");
    assert_eq!(compact("%p { color: red; }"), "");
}

#[test]
fn unmatched_extend_fails_unless_optional() {
    let err = compile_error(".a { @extend .missing; }");
    assert!(err.to_string().contains("failed to @extend"), "{}", err);
    assert_eq!(compact(".a { @extend .missing !optional; b: c; }"), ".a { b: c; }");
}

// ---------------------------------------------------------------------------
// Functions, mixins and arguments
// ---------------------------------------------------------------------------

#[test]
fn argument_binding() {
    let css = compact(
        "@function f($a, $b: 2, $rest...) { @return ($a, $b, length($rest)); }\n\
         .t { one: f(1); two: f(1, 5); three: f(1, $b: 9); four: f(1, 2, 3, 4); }",
    );
    assert_eq!(css, ".t { one: 1, 2, 0; two: 1, 5, 0; three: 1, 9, 0; four: 1, 2, 2; }");
}

#[test]
fn missing_argument_names_the_parameter() {
    let err = compile_error("@function f($a, $b: 2, $rest...) { @return $a; }\n.t { x: f($b: 9); }");
    assert!(matches!(err, Error::Compile(_)));
    assert!(err.to_string().contains("missing argument $a"), "{}", err);
}

#[test]
fn mixins_with_content() {
    let css = compact("@mixin m { .in { @content; } }\n.a { @include m { color: red; } }");
    assert_eq!(css, ".a .in { color: red; }");
}

#[test]
fn builtin_functions() {
    let css = compact(
        ".t { p: percentage(0.5); s: str-slice(\"abcd\", 2, 3); c: rgba(255, 0, 0, 0.5); i: if(true, 1, 2); }",
    );
    assert_eq!(css, ".t { p: 50%; s: \"bc\"; c: rgba(255, 0, 0, 0.5); i: 1; }");
}

#[test]
fn map_merge_keeps_keys_unique() {
    let css = compact("$m: map-merge((a: 1), (a: 2));\n.t { n: length($m); v: map-get($m, a); }");
    assert_eq!(css, ".t { n: 1; v: 2; }");
}

// ---------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------

#[test]
fn for_and_each_loops() {
    let css = compact("@for $i from 1 through 3 { .m-#{$i} { margin: $i * 4px; } }");
    assert_eq!(css, ".m-1 { margin: 4px; }\n.m-2 { margin: 8px; }\n.m-3 { margin: 12px; }");

    let css = compact("@each $k, $v in (a: 1, b: 2) { .#{$k} { w: $v; } }");
    assert_eq!(css, ".a { w: 1; }\n.b { w: 2; }");
}

#[test]
fn if_else_chains() {
    let css = compact("$n: 2;\n.t { @if $n == 1 { a: one; } @else if $n == 2 { a: two; } @else { a: other; } }");
    assert_eq!(css, ".t { a: two; }");
}

// ---------------------------------------------------------------------------
// @media
// ---------------------------------------------------------------------------

#[test]
fn contradictory_media_is_dropped() {
    assert_eq!(compact("@media screen { @media not screen { .a { b: c; } } }"), "");
}

#[test]
fn nested_media_features_are_anded() {
    let css = compact("@media (min-width: 10px) { @media (max-width: 20px) { .a { b: c; } } }");
    assert_eq!(css, "@media (min-width: 10px) and (max-width: 20px) {\n.a { b: c; }\n}");
}

#[test]
fn media_inside_rules_bubbles_up() {
    let css = compact(".a { @media print { color: red; } }");
    assert_eq!(css, "@media print {\n.a { color: red; }\n}");
}

// ---------------------------------------------------------------------------
// Errors, warnings and limits
// ---------------------------------------------------------------------------

#[test]
fn undefined_variable_has_a_location() {
    match compile_error(".a {\n  color: $nope;\n}") {
        Error::Compile(err) => {
            assert!(matches!(err.error, CompileError::UndefinedVariable(ref name) if name == "nope"));
            assert_eq!(err.line, 2);
        }
        Error::Parse(err) => panic!("unexpected parse error: {}", err.message),
    }
}

#[test]
fn user_errors_carry_the_call_stack() {
    let err = compile_error("@mixin boom { @error \"bad\"; }\n.a { @include boom; }");
    let Error::Compile(err) = err else {
        panic!("expected a compile error");
    };
    assert!(matches!(err.error, CompileError::User(ref m) if m == "bad"));
    assert!(err.trace.iter().any(|frame| frame.contains("@include boom")));
}

#[test]
fn runaway_recursion_is_an_error() {
    let options = CompilerOptions {
        max_call_depth: 50,
        ..options(OutputStyle::Compact)
    };
    let err = compile_with("@mixin m { @include m; }\n.a { @include m; }", options).unwrap_err();
    assert!(matches!(err, Error::Compile(ref e) if matches!(e.error, CompileError::StackOverflow(50))));
}

fn assert_stack_overflow(source: &str) {
    let err = compile_with(source, CompilerOptions::default()).unwrap_err();
    let Error::Compile(err) = err else {
        panic!("expected a compile error");
    };
    assert!(matches!(err.error, CompileError::StackOverflow(_)), "got {}", err);
}

#[test]
fn runaway_mixin_recursion_fails_with_default_options() {
    assert_stack_overflow("@mixin m { @include m; }\n.a { @include m; }");
}

#[test]
fn runaway_function_recursion_fails_with_default_options() {
    assert_stack_overflow("@function f($n) { @return f($n); }\n.a { b: f(1); }");
}

#[test]
fn runaway_recursion_through_nested_rules_fails() {
    let options = CompilerOptions {
        max_call_depth: 200,
        ..options(OutputStyle::Compact)
    };
    let err = compile_with("@mixin m { .x { @include m; } }\n.a { @include m; }", options).unwrap_err();
    assert!(matches!(err, Error::Compile(ref e) if matches!(e.error, CompileError::StackOverflow(200))));
}

#[test]
fn integer_arguments_reject_fractions() {
    let Error::Compile(err) = compile_error(".a { b: nth(1 2 3, 1.5); }") else {
        panic!("expected a compile error");
    };
    assert_eq!(err.error.to_string(), "$n: 1.5 is not an int.");
}

#[test]
fn debug_messages_reach_the_logger() {
    let logger = Arc::new(CollectingLogger::new());
    let options = CompilerOptions {
        logger: logger.clone(),
        ..options(OutputStyle::Compact)
    };
    let css = compile_with(".a {\n  @debug 1 + 2;\n  b: c;\n}", options).unwrap();
    assert_eq!(css, ".a { b: c; }");
    let messages = logger.debug_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].ends_with(":2 DEBUG: 3"), "got {}", messages[0]);
    assert!(logger.warnings().is_empty());
}

#[test]
fn warnings_reach_the_logger() {
    let logger = Arc::new(CollectingLogger::new());
    let options = CompilerOptions {
        logger: logger.clone(),
        ..options(OutputStyle::Compact)
    };
    compile_with("@warn \"careful\";\n.a { b: c; }", options).unwrap();
    let warnings = logger.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "careful");
    assert!(!warnings[0].deprecation);
}

// ---------------------------------------------------------------------------
// Imports, caching and source maps
// ---------------------------------------------------------------------------

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[test]
fn imports_resolve_partials() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "_vars.scss", "$c: blue;");
    write(dir.path(), "main.scss", "@import \"vars\";\n.a { color: $c; }");

    let mut compiler = Compiler::new(options(OutputStyle::Compact));
    let result = compiler.compile_file(&dir.path().join("main.scss")).unwrap();
    assert_eq!(result.css, ".a { color: blue; }");
    assert_eq!(result.included_files.len(), 2);
}

#[test]
fn css_imports_are_hoisted() {
    let css = compact(".a { b: c; }\n@import url(foo.css);");
    assert_eq!(css, "@import url(foo.css);\n.a { b: c; }");
}

#[test]
fn import_loops_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.scss", "@import \"b\";");
    write(dir.path(), "b.scss", "@import \"a\";");

    let mut compiler = Compiler::new(options(OutputStyle::Compact));
    let err = compiler.compile_file(&dir.path().join("a.scss")).unwrap_err();
    assert!(matches!(err, Error::Compile(ref e) if matches!(e.error, CompileError::ImportLoop(_))), "{}", err);
}

#[test]
fn missing_imports_fail() {
    let err = compile_error("@import \"nowhere\";");
    assert!(matches!(err, Error::Compile(ref e) if matches!(e.error, CompileError::ImportNotFound(_))), "{}", err);
}

#[test]
fn results_are_cached() {
    let cache = Arc::new(MemoryCache::new());
    let options = CompilerOptions {
        cache: Some(cache.clone()),
        ..options(OutputStyle::Compact)
    };
    let mut compiler = Compiler::new(options);
    let first = compiler.compile_string(".a { b: c; }", None).unwrap();
    let stored = cache.len();
    assert!(stored > 0);
    let second = compiler.compile_string(".a { b: c; }", None).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.len(), stored);
}

#[test]
fn file_source_maps() {
    let options = CompilerOptions {
        source_map: SourceMapMode::File,
        source_map_url: Some("out.css.map".into()),
        ..options(OutputStyle::Expanded)
    };
    let mut compiler = Compiler::new(options);
    let result = compiler.compile_string(".a {\n  color: red;\n}", None).unwrap();
    assert!(result.css.ends_with("/*# sourceMappingURL=out.css.map */"));
    let map: serde_json::Value = serde_json::from_str(result.source_map.as_deref().unwrap()).unwrap();
    assert_eq!(map["version"], 3);
    assert_eq!(map["sources"][0], "stdin");
    assert!(!map["mappings"].as_str().unwrap().is_empty());
}
