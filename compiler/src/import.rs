//! `@import` target resolution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

/// Callable import path: given the raw URL, return the file to load.
pub type Resolver = Arc<dyn Fn(&str) -> Option<PathBuf> + Send + Sync>;

/// One entry of the import search path.
#[derive(Clone)]
pub enum ImportPath {
    Directory(PathBuf),
    Resolver(Resolver),
}

impl fmt::Debug for ImportPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportPath::Directory(dir) => f.debug_tuple("Directory").field(dir).finish(),
            ImportPath::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<PathBuf> for ImportPath {
    fn from(dir: PathBuf) -> Self {
        ImportPath::Directory(dir)
    }
}

impl From<&str> for ImportPath {
    fn from(dir: &str) -> Self {
        ImportPath::Directory(PathBuf::from(dir))
    }
}

const EXTENSIONS: &[&str] = &["scss", "sass", "css"];

/// Whether an import is left to the browser instead of being inlined.
pub fn is_css_import(url: &str, has_media: bool) -> bool {
    has_media
        || url.starts_with("url(")
        || url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("//")
        || url.ends_with(".css")
}

fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// Partial (`_name`) first, then the plain name.
fn with_partial(dir: &Path, url: &Path, file_name: &str) -> Option<PathBuf> {
    let parent = url.parent().map(|p| dir.join(p)).unwrap_or_else(|| dir.to_path_buf());
    let partial = parent.join(format!("_{}", file_name));
    if is_file(&partial) {
        return Some(partial);
    }
    let plain = parent.join(file_name);
    is_file(&plain).then_some(plain)
}

/// Look for `url` inside `dir`, trying partials, the known extensions and
/// finally a directory index.
pub fn find_in(dir: &Path, url: &str) -> Option<PathBuf> {
    let url_path = Path::new(url);
    let file_name = url_path.file_name()?.to_string_lossy().into_owned();

    let has_extension = url_path
        .extension()
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext == *known));
    if has_extension {
        if let Some(found) = with_partial(dir, url_path, &file_name) {
            return Some(found);
        }
    } else {
        for ext in EXTENSIONS {
            if let Some(found) = with_partial(dir, url_path, &format!("{}.{}", file_name, ext)) {
                return Some(found);
            }
        }
    }

    let index_dir = dir.join(url_path);
    ["_index.scss", "index.scss"]
        .iter()
        .map(|name| index_dir.join(name))
        .find(|candidate| is_file(candidate))
}

/// Result of resolving one import.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub path: PathBuf,
    /// Found only relative to the working directory.
    pub from_cwd: bool,
}

/// Resolve `url` against the importing file's directory, then the import
/// paths in order, then the working directory.
pub fn resolve(url: &str, current_dir: Option<&Path>, import_paths: &[ImportPath]) -> Option<Resolved> {
    let found = |path: PathBuf| Resolved { path, from_cwd: false };

    if let Some(dir) = current_dir {
        if let Some(path) = find_in(dir, url) {
            debug!(url, path = %path.display(), "import resolved next to importing file");
            return Some(found(path));
        }
    }
    for entry in import_paths {
        let candidate = match entry {
            ImportPath::Directory(dir) => find_in(dir, url),
            ImportPath::Resolver(resolver) => resolver(url).filter(|p| is_file(p)),
        };
        if let Some(path) = candidate {
            debug!(url, path = %path.display(), "import resolved on import path");
            return Some(found(path));
        }
    }
    let cwd = std::env::current_dir().ok()?;
    find_in(&cwd, url).map(|path| Resolved { path, from_cwd: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn css_imports_are_passed_through() {
        assert!(is_css_import("foo.css", false));
        assert!(is_css_import("url(foo)", false));
        assert!(is_css_import("http://x/y", false));
        assert!(is_css_import("foo", true));
        assert!(!is_css_import("foo", false));
    }

    #[test]
    fn partials_win_over_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("_colors.scss"), "").unwrap();
        fs::write(dir.path().join("colors.scss"), "").unwrap();
        assert_eq!(find_in(dir.path(), "colors"), Some(dir.path().join("_colors.scss")));
        assert_eq!(
            find_in(dir.path(), "colors.scss"),
            Some(dir.path().join("_colors.scss"))
        );
    }

    #[test]
    fn nested_paths_and_directory_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/grid")).unwrap();
        fs::write(dir.path().join("lib/_mixins.scss"), "").unwrap();
        fs::write(dir.path().join("lib/grid/_index.scss"), "").unwrap();
        assert_eq!(
            find_in(dir.path(), "lib/mixins"),
            Some(dir.path().join("lib/_mixins.scss"))
        );
        assert_eq!(
            find_in(dir.path(), "lib/grid"),
            Some(dir.path().join("lib/grid/_index.scss"))
        );
        assert_eq!(find_in(dir.path(), "missing"), None);
    }

    #[test]
    fn resolvers_are_consulted_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("theme.scss");
        fs::write(&target, "").unwrap();
        let resolved_target = target.clone();
        let paths = vec![
            ImportPath::Directory(dir.path().join("nowhere")),
            ImportPath::Resolver(Arc::new(move |url| {
                (url == "theme").then(|| resolved_target.clone())
            })),
        ];
        let resolved = resolve("theme", None, &paths).unwrap();
        assert_eq!(resolved.path, target);
        assert!(!resolved.from_cwd);
    }
}
