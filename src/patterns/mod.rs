//! Source pattern scanner
//!
//! A small fixed rule pack run over every collected file. Matching is
//! oblivious to syntactic position: comments are scanned like code.

use std::sync::LazyLock;

use regex::Regex;

use crate::collector::FileEntry;
use crate::report::{Category, Finding, Severity};

/// One rule in the pack.
pub struct PatternRule {
    pub id: &'static str,
    pub title: &'static str,
    pub category: Category,
    pub severity: Severity,
    pub regex: &'static LazyLock<Regex>,
}

macro_rules! rule_regex {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
    };
}

rule_regex!(
    RE_CMD_INJECT,
    r#"(?:child_process\.(?:exec|execSync|spawn)|subprocess\.(?:run|call|check_output|Popen)|os\.system|execSync)\s*\([^)\n]*(?:\+|\$\{|%\s*\(|f["'])"#
);
rule_regex!(
    RE_CODE_EVAL,
    r"\beval\s*\(|\bnew\s+Function\s*\(|\bexec\s*\(\s*compile\s*\("
);
rule_regex!(
    RE_HARDCODED_SECRET,
    r#"(?i)(?:api[_-]?key|apikey|secret|password|passwd|auth[_-]?token|access[_-]?token)\s*[:=]\s*["'][A-Za-z0-9+/_\-]{16,}["']"#
);
rule_regex!(
    RE_TLS_VERIFY_OFF,
    r"(?i)verify\s*=\s*False|rejectUnauthorized\s*:\s*false|InsecureSkipVerify\s*:\s*true|NODE_TLS_REJECT_UNAUTHORIZED"
);
rule_regex!(
    RE_PATH_TRAV,
    r#"(?:open|readFile(?:Sync)?|writeFile(?:Sync)?|createReadStream)\s*\(\s*[^),\n]*(?:\+\s*[a-zA-Z_]|\$\{|%s|f["'])"#
);
rule_regex!(
    RE_CORS_WILDCARD,
    r#"(?i)access-control-allow-origin["'\s:,]*\*|origin\s*:\s*["']\*["']"#
);
rule_regex!(
    RE_TELEMETRY,
    r"(?i)\b(?:mixpanel|amplitude|posthog|segment\.com|google-analytics|telemetry\.(?:send|post|track)|trackEvent)\b"
);
rule_regex!(
    RE_SHELL_EXEC,
    r"(?i)\bos\.system\s*\(|\bchild_process\b|\bexecSync\s*\(|shell\s*=\s*True|Runtime\.getRuntime\(\)\.exec"
);
rule_regex!(
    RE_SQL_INJECT,
    r#"(?i)\b(?:execute|query)\s*\(\s*(?:f["']|["'][^"'\n]*(?:%s|\{)|[^,)\n]*\+\s*)"#
);
rule_regex!(RE_YAML_UNSAFE, r"\byaml\.load\s*\(|\byaml\.unsafe_load\s*\(");
rule_regex!(
    RE_PICKLE_LOAD,
    r"\b(?:pickle|cPickle|_pickle)\.loads?\s*\(|\bmarshal\.loads?\s*\("
);
rule_regex!(
    RE_PROMPT_INJECT,
    r"(?i)ignore\s+(?:all\s+)?(?:previous|prior)\s+instructions|<\s*important\s*>|do\s+not\s+tell\s+the\s+user"
);

/// The fixed rule pack, in scan order.
pub static PATTERN_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        PatternRule {
            id: "CMD_INJECT",
            title: "Command built from tainted input",
            category: Category::Injection,
            severity: Severity::Critical,
            regex: &RE_CMD_INJECT,
        },
        PatternRule {
            id: "CODE_EVAL",
            title: "Dynamic code evaluation",
            category: Category::Injection,
            severity: Severity::High,
            regex: &RE_CODE_EVAL,
        },
        PatternRule {
            id: "HARDCODED_SECRET",
            title: "Hardcoded credential",
            category: Category::Secrets,
            severity: Severity::High,
            regex: &RE_HARDCODED_SECRET,
        },
        PatternRule {
            id: "TLS_VERIFY_OFF",
            title: "TLS verification disabled",
            category: Category::Crypto,
            severity: Severity::High,
            regex: &RE_TLS_VERIFY_OFF,
        },
        PatternRule {
            id: "PATH_TRAV",
            title: "Path built from tainted input",
            category: Category::Filesystem,
            severity: Severity::High,
            regex: &RE_PATH_TRAV,
        },
        PatternRule {
            id: "CORS_WILDCARD",
            title: "Wildcard CORS origin",
            category: Category::Network,
            severity: Severity::Medium,
            regex: &RE_CORS_WILDCARD,
        },
        PatternRule {
            id: "TELEMETRY",
            title: "Telemetry or analytics endpoint",
            category: Category::Privacy,
            severity: Severity::Medium,
            regex: &RE_TELEMETRY,
        },
        PatternRule {
            id: "SHELL_EXEC",
            title: "Shell execution primitive",
            category: Category::Injection,
            severity: Severity::Medium,
            regex: &RE_SHELL_EXEC,
        },
        PatternRule {
            id: "SQL_INJECT",
            title: "SQL built from tainted input",
            category: Category::Injection,
            severity: Severity::High,
            regex: &RE_SQL_INJECT,
        },
        PatternRule {
            id: "YAML_UNSAFE",
            title: "Unsafe YAML loading",
            category: Category::Deserialization,
            severity: Severity::High,
            regex: &RE_YAML_UNSAFE,
        },
        PatternRule {
            id: "PICKLE_LOAD",
            title: "Pickle deserialization",
            category: Category::Deserialization,
            severity: Severity::High,
            regex: &RE_PICKLE_LOAD,
        },
        PatternRule {
            id: "PROMPT_INJECT",
            title: "Prompt-injection marker",
            category: Category::PromptInjection,
            severity: Severity::High,
            regex: &RE_PROMPT_INJECT,
        },
    ]
});

/// Scan every collected file with the rule pack.
///
/// Findings come back ordered by file, then rule, then match offset.
pub fn scan_files(files: &[FileEntry]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for file in files {
        for rule in PATTERN_RULES.iter() {
            for m in rule.regex.find_iter(&file.content) {
                let line = line_number(&file.content, m.start());
                findings.push(
                    Finding::new(
                        rule.id,
                        rule.category.clone(),
                        rule.severity,
                        rule.title,
                        format!("{} in {}", rule.title, file.path),
                    )
                    .with_file(file.path.clone())
                    .with_line(line)
                    .with_content(snippet(&file.content, m.start()))
                    .with_evidence(m.as_str().trim().to_string()),
                );
            }
        }
    }
    findings
}

/// 1-based line number from the byte offset of a match.
fn line_number(text: &str, offset: usize) -> u32 {
    text[..offset].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}

/// The full source line containing the match, trimmed and bounded.
fn snippet(text: &str, offset: usize) -> String {
    let start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(text.len());
    let line = text[start..end].trim();
    if line.len() > 160 {
        let mut cut = 160;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &line[..cut])
    } else {
        line.to_string()
    }
}
