//! Source resolution
//!
//! Turns the user's `<source>` argument into a directory on disk:
//! local paths are used in place, remote git URLs are validated and
//! shallow-cloned into a temp directory. Validation runs before any
//! clone command is constructed.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::AuditError;

/// Characters never allowed in a source URL; they would otherwise
/// reach a subprocess argument.
const SHELL_METACHARACTERS: &[char] =
    &[';', '&', '|', '`', '$', '(', ')', '{', '}', '!', '\n', '\r', '<', '>', '"', '\''];

/// A resolved source argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// An existing local directory.
    Local(PathBuf),
    /// A validated remote git URL.
    Remote(String),
}

impl SourceRef {
    /// Short identifier used as the report's skill slug.
    pub fn slug(&self) -> String {
        let raw = match self {
            SourceRef::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "package".to_string()),
            SourceRef::Remote(url) => url
                .trim_end_matches('/')
                .rsplit(['/', ':'])
                .next()
                .unwrap_or("package")
                .to_string(),
        };
        raw.trim_end_matches(".git").to_string()
    }

    pub fn url(&self) -> String {
        match self {
            SourceRef::Local(path) => path.display().to_string(),
            SourceRef::Remote(url) => url.clone(),
        }
    }
}

/// Parse and validate a source argument.
///
/// Accepted remote forms: `https://`, `http://`, `git://`, `ssh://`,
/// `git@host:path`, and the `owner/repo` GitHub shorthand.
pub fn parse_source(input: &str) -> Result<SourceRef, AuditError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AuditError::input("source argument is empty"));
    }

    let path = Path::new(trimmed);
    if path.is_dir() {
        return Ok(SourceRef::Local(path.to_path_buf()));
    }

    if let Some(bad) = trimmed.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(AuditError::input_with_hint(
            format!("source URL contains forbidden character {bad:?}"),
            "URLs are passed to git; shell metacharacters are rejected outright.",
        ));
    }

    let is_url = trimmed.starts_with("https://")
        || trimmed.starts_with("http://")
        || trimmed.starts_with("git://")
        || trimmed.starts_with("ssh://")
        || is_scp_form(trimmed);
    if is_url {
        return Ok(SourceRef::Remote(trimmed.to_string()));
    }

    if is_shorthand(trimmed) {
        return Ok(SourceRef::Remote(format!("https://github.com/{trimmed}")));
    }

    Err(AuditError::input_with_hint(
        format!("'{trimmed}' is not a directory, git URL, or owner/repo reference"),
        "Examples: ./my-server, https://github.com/acme/mcp-tools, acme/mcp-tools",
    ))
}

/// `git@host:owner/repo` form.
fn is_scp_form(input: &str) -> bool {
    if let Some(rest) = input.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            return !host.is_empty() && !path.is_empty();
        }
    }
    false
}

/// `owner/repo`: exactly one slash, both parts word-like.
fn is_shorthand(input: &str) -> bool {
    let Some((owner, repo)) = input.split_once('/') else {
        return false;
    };
    let word = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    word(owner) && word(repo) && !repo.contains('/')
}

/// A source materialised on disk, with cleanup for cloned checkouts.
pub struct FetchedSource {
    pub root: PathBuf,
    pub commit_sha: Option<String>,
    cloned: bool,
}

impl FetchedSource {
    /// Remove the checkout if we created it.
    pub fn cleanup(&self) {
        if self.cloned {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

/// Materialise a source on disk. Remote refs are shallow-cloned.
pub async fn fetch_source(source: &SourceRef) -> Result<FetchedSource, AuditError> {
    match source {
        SourceRef::Local(path) => Ok(FetchedSource {
            commit_sha: read_commit_sha(path).await,
            root: path.clone(),
            cloned: false,
        }),
        SourceRef::Remote(url) => {
            let target = std::env::temp_dir().join(format!(
                "agentaudit-{}-{}",
                std::process::id(),
                chrono::Utc::now().timestamp_millis()
            ));
            info!(%url, target = %target.display(), "cloning source");

            let output = Command::new("git")
                .arg("clone")
                .arg("--depth")
                .arg("1")
                .arg("--quiet")
                .arg(url)
                .arg(&target)
                .output()
                .await
                .map_err(|e| AuditError::fetch(format!("failed to spawn git: {e}")))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(AuditError::Fetch {
                    message: format!("git clone failed: {}", stderr.trim()),
                    hint: Some(
                        "Check that the URL exists and is reachable; private repos \
                         need credentials configured in git."
                            .to_string(),
                    ),
                });
            }

            Ok(FetchedSource {
                commit_sha: read_commit_sha(&target).await,
                root: target,
                cloned: true,
            })
        }
    }
}

async fn read_commit_sha(root: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .arg("rev-parse")
        .arg("HEAD")
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        debug!("no git commit available for {}", root.display());
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_url_accepted() {
        let source = parse_source("https://github.com/acme/mcp-tools").unwrap();
        assert_eq!(
            source,
            SourceRef::Remote("https://github.com/acme/mcp-tools".to_string())
        );
        assert_eq!(source.slug(), "mcp-tools");
    }

    #[test]
    fn git_and_ssh_schemes_accepted() {
        assert!(parse_source("git://host/repo.git").is_ok());
        assert!(parse_source("ssh://git@host/repo.git").is_ok());
    }

    #[test]
    fn scp_form_accepted() {
        let source = parse_source("git@github.com:acme/mcp-tools.git").unwrap();
        assert_eq!(source.slug(), "mcp-tools");
    }

    #[test]
    fn shorthand_expands_to_github() {
        let source = parse_source("acme/mcp-tools").unwrap();
        assert_eq!(
            source,
            SourceRef::Remote("https://github.com/acme/mcp-tools".to_string())
        );
    }

    #[test]
    fn shell_metacharacters_rejected() {
        for input in [
            "https://x.com/a;rm -rf /",
            "https://x.com/$(whoami)",
            "https://x.com/a|b",
            "https://x.com/a`b`",
            "git@host:a/b&c",
        ] {
            assert!(parse_source(input).is_err(), "accepted {input}");
        }
    }

    #[test]
    fn garbage_rejected() {
        assert!(parse_source("not a source at all").is_err());
        assert!(parse_source("").is_err());
        assert!(parse_source("ftp://host/thing").is_err());
    }

    #[test]
    fn local_directory_resolves() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = parse_source(dir.path().to_str().unwrap()).unwrap();
        assert!(matches!(source, SourceRef::Local(_)));
    }

    #[test]
    fn slug_strips_git_suffix() {
        assert_eq!(
            parse_source("https://github.com/a/b.git").unwrap().slug(),
            "b"
        );
    }
}
