//! Prompt assembly
//!
//! The system prompts are opaque blobs shipped with the binary and
//! overridable from disk. The user message enumerates every collected
//! file in fenced form.

use crate::collector::FileEntry;
use crate::report::Finding;

/// Embedded default audit system prompt.
const AUDIT_SYSTEM_PROMPT: &str = include_str!("../../prompts/audit_system.md");
/// Embedded default verification system prompt.
const VERIFY_SYSTEM_PROMPT: &str = include_str!("../../prompts/verify_system.md");

/// Environment override pointing at an alternative audit prompt file.
pub const SYSTEM_PROMPT_OVERRIDE_VAR: &str = "AGENTAUDIT_SYSTEM_PROMPT";

/// The audit system prompt: the override file when set and readable,
/// else the embedded blob. The content is never interpreted.
pub fn audit_system_prompt() -> String {
    if let Ok(path) = std::env::var(SYSTEM_PROMPT_OVERRIDE_VAR) {
        if let Ok(content) = std::fs::read_to_string(&path) {
            return content;
        }
    }
    AUDIT_SYSTEM_PROMPT.to_string()
}

pub fn verify_system_prompt() -> String {
    VERIFY_SYSTEM_PROMPT.to_string()
}

/// Build the audit user message: a short preamble plus every file as
/// `### FILE: <path>` followed by its fenced content.
pub fn build_audit_user_message(slug: &str, files: &[FileEntry]) -> String {
    let mut message = String::with_capacity(files.iter().map(|f| f.size + 64).sum::<usize>() + 256);
    message.push_str(&format!(
        "Audit the package '{slug}'. It contains {} collected file(s).\n\n",
        files.len()
    ));
    for file in files {
        message.push_str("### FILE: ");
        message.push_str(&file.path);
        message.push_str("\n```\n");
        message.push_str(&file.content);
        if !file.content.ends_with('\n') {
            message.push('\n');
        }
        message.push_str("```\n\n");
    }
    message
}

/// Build the user message for one verification call: the finding
/// fields, the cited file's full text (or an explicit absence marker),
/// a file listing, and the manifest.
pub fn build_verify_user_message(finding: &Finding, files: &[FileEntry]) -> String {
    let mut message = String::new();

    message.push_str("## Finding under review\n\n```json\n");
    message.push_str(
        &serde_json::to_string_pretty(finding).unwrap_or_else(|_| "{}".to_string()),
    );
    message.push_str("\n```\n\n");

    message.push_str("## Cited file\n\n");
    match finding
        .file
        .as_deref()
        .and_then(|path| files.iter().find(|f| f.path == path))
    {
        Some(file) => {
            message.push_str(&format!("### FILE: {}\n```\n{}\n```\n\n", file.path, file.content));
        }
        None => {
            message.push_str("THE CITED FILE IS NOT PRESENT IN THE COLLECTED SET.\n\n");
        }
    }

    message.push_str("## File listing\n\n");
    for file in files {
        message.push_str(&format!("- {} ({} bytes)\n", file.path, file.size));
    }
    message.push('\n');

    message.push_str("## Package manifest\n\n");
    match files.iter().find(|f| is_manifest(&f.path)) {
        Some(manifest) => {
            message.push_str(&format!("### FILE: {}\n```\n{}\n```\n", manifest.path, manifest.content));
        }
        None => message.push_str("No manifest was collected.\n"),
    }

    message
}

fn is_manifest(path: &str) -> bool {
    matches!(
        path,
        "package.json" | "pyproject.toml" | "setup.py" | "setup.cfg" | "Cargo.toml"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Category, Severity};

    fn entry(path: &str, content: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            content: content.to_string(),
            size: content.len(),
        }
    }

    #[test]
    fn default_prompt_is_nonempty_and_three_phase() {
        let prompt = AUDIT_SYSTEM_PROMPT;
        assert!(prompt.contains("UNDERSTAND"));
        assert!(prompt.contains("DETECT"));
        assert!(prompt.contains("CLASSIFY"));
        assert!(prompt.contains("UNTRUSTED"));
    }

    #[test]
    fn user_message_enumerates_files() {
        let files = vec![entry("a.py", "x = 1"), entry("b/c.js", "let y = 2;")];
        let message = build_audit_user_message("demo", &files);
        assert!(message.contains("### FILE: a.py"));
        assert!(message.contains("### FILE: b/c.js"));
        assert!(message.contains("x = 1"));
        assert!(message.contains("let y = 2;"));
    }

    #[test]
    fn verify_message_includes_cited_file() {
        let files = vec![entry("server.py", "os.system(cmd)")];
        let finding = Finding::new(
            "CMD_INJECT",
            Category::Injection,
            Severity::Critical,
            "Command injection",
            "desc",
        )
        .with_file("server.py");
        let message = build_verify_user_message(&finding, &files);
        assert!(message.contains("### FILE: server.py"));
        assert!(message.contains("os.system(cmd)"));
        assert!(message.contains("Finding under review"));
    }

    #[test]
    fn verify_message_marks_absent_file() {
        let finding = Finding::new(
            "CMD_INJECT",
            Category::Injection,
            Severity::Critical,
            "Command injection",
            "desc",
        )
        .with_file("gone.py");
        let message = build_verify_user_message(&finding, &[]);
        assert!(message.contains("NOT PRESENT"));
    }

    #[test]
    fn verify_message_includes_manifest_when_present() {
        let files = vec![
            entry("package.json", r#"{"name": "demo"}"#),
            entry("index.js", "console.log(1)"),
        ];
        let finding = Finding::new(
            "CODE_EVAL",
            Category::Injection,
            Severity::High,
            "Eval",
            "desc",
        )
        .with_file("index.js");
        let message = build_verify_user_message(&finding, &files);
        assert!(message.contains(r#"{"name": "demo"}"#));
    }
}
