//! Source collector - bounded, symlink-safe file collection
//!
//! Walks a package directory depth-first in lexical order and produces
//! the text file set every downstream stage consumes. Collection is
//! budgeted: a per-file cap, a total-size cap, and a fixed exclusion
//! list keep the payload small enough for LLM audits.

mod profile;

pub use profile::{detect_profile, extract_tool_definitions, PackageKind, PackageProfile};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

/// Maximum bytes read from a single file.
pub const MAX_FILE_SIZE: u64 = 50_000;
/// Total byte budget for one collection.
pub const MAX_TOTAL_SIZE: u64 = 300_000;

/// One collected text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Repo-relative path, `/`-separated.
    pub path: String,
    pub content: String,
    pub size: usize,
}

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "venv",
    "dist",
    "build",
    "coverage",
    "vendor",
    "test",
    "tests",
    "__tests__",
    "spec",
    "specs",
    "docs",
    "doc",
    "examples",
    "example",
    "fixtures",
    "e2e",
    "benchmarks",
    "htmlcov",
];

/// Extensions treated as opaque binaries.
const EXCLUDED_EXTENSIONS: &[&str] = &[
    // images and fonts
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "woff", "woff2", "ttf", "otf",
    "eot", // audio/video
    "mp3", "wav", "ogg", "mp4", "avi", "mov", "mkv", "webm", // archives
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", // compiled artefacts
    "pyc", "pyo", "class", "o", "a", "so", "dll", "dylib", "exe", "bin", "wasm",
    // databases and maps
    "db", "sqlite", "sqlite3", "map", "lock",
];

/// Lockfiles and bundles rejected by full file name.
const EXCLUDED_FILENAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "uv.lock",
    "composer.lock",
    "Gemfile.lock",
];

/// Collect text files under `root`, honouring the exclusion rules and
/// size budgets. Individual read errors are swallowed; an empty result
/// is a valid return.
pub fn collect_files(root: &Path) -> Vec<FileEntry> {
    let mut entries = Vec::new();
    let mut total_bytes: u64 = 0;
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

    if let Ok(canonical_root) = root.canonicalize() {
        visited_dirs.insert(canonical_root);
    }

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(item) = walker.next() {
        let entry = match item {
            Ok(e) => e,
            Err(e) => {
                trace!("walk error swallowed: {e}");
                continue;
            }
        };

        let rel = match entry.path().strip_prefix(root) {
            Ok(r) if !r.as_os_str().is_empty() => r.to_path_buf(),
            _ => continue,
        };

        if entry.file_type().is_dir() {
            if should_skip_dir(&rel) {
                walker.skip_current_dir();
                continue;
            }
            // Refuse to re-enter a directory already seen through
            // another route (bind mounts, hard links).
            match entry.path().canonicalize() {
                Ok(canonical) => {
                    if !visited_dirs.insert(canonical) {
                        debug!("already visited, pruning: {}", rel.display());
                        walker.skip_current_dir();
                    }
                }
                Err(_) => walker.skip_current_dir(),
            }
            continue;
        }

        // Symlinks are never followed, directory targets or otherwise.
        if entry.path_is_symlink() {
            continue;
        }

        if !entry.file_type().is_file() || should_skip_file(&rel) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(_) => continue,
        };
        if size == 0 || size > MAX_FILE_SIZE {
            continue;
        }
        if total_bytes + size > MAX_TOTAL_SIZE {
            debug!("total-size budget reached at {} bytes", total_bytes);
            break;
        }

        let bytes = match std::fs::read(entry.path()) {
            Ok(b) => b,
            Err(e) => {
                trace!("read error swallowed for {}: {e}", rel.display());
                continue;
            }
        };
        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => continue,
        };

        total_bytes += size;
        entries.push(FileEntry {
            path: rel_to_slash(&rel),
            size: content.len(),
            content,
        });
    }

    entries
}

/// Directory pruning: the fixed exclusion set, plus every dot-directory
/// except `.github`, whose `workflows/` subtree is security-relevant.
fn should_skip_dir(rel: &Path) -> bool {
    let name = match rel.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return true,
    };

    if EXCLUDED_DIRS.contains(&name) || name == ".tox" || name == ".eggs" {
        return true;
    }

    if name.starts_with('.') {
        return name != ".github";
    }

    // Inside .github only the workflows subtree survives.
    if first_component(rel) == Some(".github") {
        let depth = rel.components().count();
        if depth == 2 && name != "workflows" {
            return true;
        }
    }

    false
}

fn should_skip_file(rel: &Path) -> bool {
    let name = match rel.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return true,
    };

    if EXCLUDED_FILENAMES.contains(&name) {
        return true;
    }

    // Files directly under .github (not in workflows/) are skipped.
    if first_component(rel) == Some(".github") {
        let in_workflows = rel
            .components()
            .nth(1)
            .and_then(|c| c.as_os_str().to_str())
            == Some("workflows");
        if !in_workflows {
            return true;
        }
    }

    let lower = name.to_lowercase();
    if lower.ends_with(".min.js") || lower.ends_with(".min.css") || lower.ends_with(".d.ts") {
        return true;
    }

    match rel.extension().and_then(|e| e.to_str()) {
        Some(ext) => EXCLUDED_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

fn first_component(rel: &Path) -> Option<&str> {
    rel.components().next().and_then(|c| c.as_os_str().to_str())
}

fn rel_to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn collects_in_lexical_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.py", "print(2)");
        write(&dir, "a.py", "print(1)");
        write(&dir, "sub/c.py", "print(3)");

        let files = collect_files(dir.path());
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py", "sub/c.py"]);
    }

    #[test]
    fn excludes_fixed_directories() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/main.py", "x = 1");
        write(&dir, "node_modules/pkg/index.js", "evil()");
        write(&dir, "tests/test_main.py", "assert True");
        write(&dir, ".git/config", "[core]");
        write(&dir, "venv/lib/thing.py", "x");

        let files = collect_files(dir.path());
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.py"]);
    }

    #[test]
    fn github_workflows_survive_dot_pruning() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".github/workflows/ci.yml", "on: push");
        write(&dir, ".github/FUNDING.yml", "github: someone");
        write(&dir, ".vscode/settings.json", "{}");

        let files = collect_files(dir.path());
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![".github/workflows/ci.yml"]);
    }

    #[test]
    fn skips_binaries_lockfiles_and_empty_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "main.py", "x = 1");
        write(&dir, "logo.png", "not really a png");
        write(&dir, "package-lock.json", "{}");
        write(&dir, "bundle.min.js", "!function(){}");
        write(&dir, "types.d.ts", "export {}");
        write(&dir, "empty.py", "");

        let files = collect_files(dir.path());
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.py"]);
    }

    #[test]
    fn skips_oversized_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "big.py", &"x".repeat(MAX_FILE_SIZE as usize + 1));
        write(&dir, "small.py", "ok");

        let files = collect_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "small.py");
    }

    #[test]
    fn total_budget_stops_collection() {
        let dir = TempDir::new().unwrap();
        // 8 files x 45 KB = 360 KB > 300 KB budget
        for i in 0..8 {
            write(&dir, &format!("f{i}.py"), &"y".repeat(45_000));
        }

        let files = collect_files(dir.path());
        let total: usize = files.iter().map(|f| f.size).sum();
        assert!(total as u64 <= MAX_TOTAL_SIZE);
        assert!(files.len() < 8);
    }

    #[test]
    fn skips_non_utf8_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ok.py", "x = 1");
        fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let files = collect_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "ok.py");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let dir = TempDir::new().unwrap();
        write(&dir, "real/a.py", "x = 1");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("linked")).unwrap();

        let files = collect_files(dir.path());
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["real/a.py"]);
    }

    #[test]
    fn empty_directory_is_a_valid_collection() {
        let dir = TempDir::new().unwrap();
        assert!(collect_files(dir.path()).is_empty());
    }
}
