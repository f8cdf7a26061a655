//! Suspicious-URL checks
//!
//! The allowlist is host-only; payload paths are not inspected.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::report::{Category, Confidence, Finding, Severity};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>`\)\]]+"#).unwrap());

/// Hosts a tool description may legitimately reference.
const ALLOWED_HOSTS: &[&str] = &["github.com", "npmjs.com", "pypi.org"];
const ALLOWED_PREFIXES: &[&str] = &["api.", "docs.", "www."];

/// Tunnel and interception infrastructure tokens.
const TUNNEL_TOKENS: &[&str] = &[
    "ngrok",
    "serveo",
    "localtunnel",
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "burp",
    "oast",
    "interact.sh",
    "webhook.site",
    "requestbin",
    "pipedream",
];

fn host_allowed(host: &str) -> bool {
    let host = host.to_lowercase();
    ALLOWED_HOSTS
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
        || ALLOWED_PREFIXES.iter().any(|prefix| host.starts_with(prefix))
}

fn host_is_tunnel(host: &str) -> bool {
    let host = host.to_lowercase();
    TUNNEL_TOKENS.iter().any(|token| host.contains(token))
}

/// Scan one tool field for external URLs.
pub fn scan_field(tool_name: &str, field: &str, text: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    for m in URL_PATTERN.find_iter(text) {
        let raw = m.as_str().trim_end_matches(['.', ',', ';']);
        let Ok(parsed) = Url::parse(raw) else {
            continue;
        };
        let Some(host) = parsed.host_str() else {
            continue;
        };

        if host_is_tunnel(host) {
            findings.push(
                Finding::new(
                    "TP_URL_002",
                    Category::SuspiciousUrl,
                    Severity::High,
                    "Tunnel or interception endpoint",
                    format!(
                        "Tool '{tool_name}' {field} references '{host}', a known \
                         tunnel/interception host."
                    ),
                )
                .with_confidence(Confidence::High)
                .with_evidence(raw.to_string()),
            );
        } else if !host_allowed(host) {
            findings.push(
                Finding::new(
                    "TP_URL_001",
                    Category::SuspiciousUrl,
                    Severity::Medium,
                    "External URL outside the allowlist",
                    format!(
                        "Tool '{tool_name}' {field} references external host '{host}'."
                    ),
                )
                .with_confidence(Confidence::Medium)
                .with_evidence(raw.to_string()),
            );
        }
    }

    findings
}
