//! Finding enrichment and scoring
//!
//! Deterministic post-processing of findings from every producer:
//! sanitise locations, back-fill CWE ids, snippets, and remediation,
//! recompute the score. Enrichment is idempotent.

use crate::collector::FileEntry;
use crate::report::{AuditResult, Finding, Report};

/// Values treated as "no content" when deciding whether to back-fill.
const PLACEHOLDERS: &[&str] = &["", "n/a", "none", "null", "todo", "-", "...", "unknown"];

/// Enricher over one collected file set.
pub struct Enricher<'a> {
    files: &'a [FileEntry],
}

impl<'a> Enricher<'a> {
    pub fn new(files: &'a [FileEntry]) -> Self {
        Self { files }
    }

    /// Apply all enrichment steps to one finding, in place.
    pub fn enrich(&self, finding: &mut Finding) {
        // Line must be a positive integer or unset.
        if finding.line == Some(0) {
            finding.line = None;
        }

        // A file path with NUL, dot-dot segments, or a URL scheme is
        // invalid; the field is cleared rather than trusted.
        if let Some(file) = &finding.file {
            if !is_safe_path(file) {
                finding.file = None;
                finding.line = None;
            }
        }

        if finding
            .cwe_id
            .as_deref()
            .map(is_placeholder)
            .unwrap_or(true)
        {
            finding.cwe_id = Some(cwe_for(&finding.pattern_id).to_string());
        }

        if finding
            .content
            .as_deref()
            .map(is_placeholder)
            .unwrap_or(true)
        {
            if let (Some(file), Some(line)) = (&finding.file, finding.line) {
                if let Some(snippet) = self.snippet(file, line) {
                    finding.content = Some(snippet);
                }
            }
        }

        if finding
            .remediation
            .as_deref()
            .map(is_placeholder)
            .unwrap_or(true)
        {
            finding.remediation = Some(remediation_for(&finding.pattern_id).to_string());
        }

        finding.score_impact = if finding.by_design {
            0
        } else {
            finding.severity.score_impact()
        };
    }

    /// Three lines of context around `line` (1-based): line-1..=line+1.
    fn snippet(&self, path: &str, line: u32) -> Option<String> {
        let file = self.files.iter().find(|f| f.path == path)?;
        let lines: Vec<&str> = file.content.lines().collect();
        let target = line as usize;
        if target == 0 || target > lines.len() {
            return None;
        }
        let start = target.saturating_sub(2);
        let end = target.min(lines.len().saturating_sub(1));
        Some(lines[start..=end].join("\n"))
    }
}

/// Enrich a findings list in place, preserving order.
pub fn enrich_findings(findings: &mut [Finding], files: &[FileEntry]) {
    let enricher = Enricher::new(files);
    for finding in findings.iter_mut() {
        enricher.enrich(finding);
    }
}

/// Enrich a whole report: findings first, then the derived fields.
pub fn enrich_report(report: &mut Report, files: &[FileEntry]) {
    enrich_findings(&mut report.findings, files);
    report.recompute();
    debug_assert!(matches!(
        report.result,
        AuditResult::Safe | AuditResult::Caution | AuditResult::Unsafe
    ));
}

fn is_placeholder(value: &str) -> bool {
    PLACEHOLDERS.contains(&value.trim().to_lowercase().as_str())
}

fn is_safe_path(path: &str) -> bool {
    if path.contains('\0') {
        return false;
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return false;
    }
    // A scheme prefix means this is a URL, not a repo path.
    if let Some(colon) = path.find(':') {
        let prefix = &path[..colon];
        if !prefix.is_empty()
            && prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
            && prefix.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
        {
            return false;
        }
    }
    true
}

/// Fixed pattern_id -> CWE table, with CWE-693 as the backstop.
fn cwe_for(pattern_id: &str) -> &'static str {
    match pattern_id {
        "CMD_INJECT" | "SHELL_EXEC" => "CWE-78",
        "CODE_EVAL" => "CWE-95",
        "HARDCODED_SECRET" => "CWE-798",
        "TLS_VERIFY_OFF" => "CWE-295",
        "PATH_TRAV" => "CWE-22",
        "CORS_WILDCARD" => "CWE-942",
        "TELEMETRY" => "CWE-359",
        "SQL_INJECT" => "CWE-89",
        "YAML_UNSAFE" | "PICKLE_LOAD" => "CWE-502",
        "PROMPT_INJECT" => "CWE-1427",
        "TP_SCHEMA_001" => "CWE-915",
        "TP_SCHEMA_003" => "CWE-454",
        "TP_SCHEMA_004" => "CWE-20",
        id if id.starts_with("TP_INJECT_") => "CWE-1427",
        id if id.starts_with("TP_UNICODE_") => "CWE-116",
        id if id.starts_with("TP_HOMOGLYPH_") => "CWE-1007",
        id if id.starts_with("TP_OBFUSC_") => "CWE-506",
        id if id.starts_with("TP_URL_") => "CWE-830",
        _ => "CWE-693",
    }
}

/// Fixed pattern_id -> remediation template table.
fn remediation_for(pattern_id: &str) -> &'static str {
    match pattern_id {
        "CMD_INJECT" | "SHELL_EXEC" => {
            "Pass arguments as an array to the process API instead of building \
             shell strings; never interpolate client input into a command line."
        }
        "CODE_EVAL" => {
            "Remove dynamic evaluation; parse data with a real parser and \
             dispatch on it explicitly."
        }
        "HARDCODED_SECRET" => {
            "Move the credential to an environment variable or secret store and \
             rotate it; it must be treated as compromised."
        }
        "TLS_VERIFY_OFF" => {
            "Re-enable certificate verification; pin or install the expected CA \
             instead of disabling checks."
        }
        "PATH_TRAV" => {
            "Resolve the path, then verify it is inside the permitted base \
             directory before any filesystem access."
        }
        "CORS_WILDCARD" => "Restrict Access-Control-Allow-Origin to the origins you serve.",
        "TELEMETRY" => {
            "Disclose the telemetry in the README and gate it behind an explicit \
             opt-in setting."
        }
        "SQL_INJECT" => "Use parameterised queries; never concatenate input into SQL.",
        "YAML_UNSAFE" => "Use yaml.safe_load (or an equivalent restricted loader).",
        "PICKLE_LOAD" => {
            "Replace pickle with a data-only format such as JSON; pickle \
             deserialises attacker-controlled code."
        }
        "PROMPT_INJECT" => {
            "Remove instruction-shaped text from data files; content shown to a \
             model must not carry directives."
        }
        id if id.starts_with("TP_INJECT_") => {
            "Strip directive language from the tool description; describe what \
             the tool does, not what the agent must do."
        }
        id if id.starts_with("TP_UNICODE_") => {
            "Remove the hidden characters and normalise tool metadata to plain \
             ASCII where possible."
        }
        id if id.starts_with("TP_HOMOGLYPH_") => {
            "Rename using ASCII characters only; lookalike glyphs in tool \
             metadata are indistinguishable to reviewers."
        }
        id if id.starts_with("TP_OBFUSC_") => {
            "Remove the encoded blob; tool descriptions must be readable in the \
             clear."
        }
        id if id.starts_with("TP_URL_") => {
            "Remove the URL or point it at the project's documented domain."
        }
        id if id.starts_with("TP_SCHEMA_") => {
            "Declare every property explicitly, drop instruction-bearing \
             defaults, and keep schema prose descriptive."
        }
        id if id.starts_with("TP_LENGTH_") => {
            "Keep tool descriptions short and factual; move long documentation \
             into the README."
        }
        id if id.starts_with("TP_XTOOL_") => {
            "Describe only this tool's behaviour; orchestration across tools \
             belongs to the agent, not to tool metadata."
        }
        _ => {
            "Review the flagged behaviour; remove it or document and gate it \
             behind explicit user consent."
        }
    }
}
