//! Obfuscated-payload detection
//!
//! Attempts bounded decoding of Base64 and hex-escape runs embedded in
//! tool descriptions, then re-scans accepted decodings with the
//! injection pack. Nesting is capped at two layers.

use std::sync::LazyLock;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use regex::Regex;

use super::injection;
use crate::report::{Category, Confidence, Finding, Severity};

/// Minimum length for a Base64 candidate substring.
const MIN_BASE64_LEN: usize = 24;
/// Minimum decoded size to report otherwise-clean encoded content.
const MIN_UNUSUAL_DECODED: usize = 50;
/// Fraction of decoded bytes that must be printable.
const PRINTABLE_THRESHOLD: f64 = 0.75;

static BASE64_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{24,}={0,2}").unwrap());
static HEX_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:\\x[0-9a-f]{2}){8,}").unwrap());

fn printable_fraction(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let printable = bytes
        .iter()
        .filter(|b| (32..=126).contains(*b) || matches!(b, 9 | 10 | 13))
        .count();
    printable as f64 / bytes.len() as f64
}

/// Decode a Base64 candidate; `None` unless the result clears the
/// printability threshold and differs from the input.
fn decode_base64(candidate: &str) -> Option<String> {
    let bytes = STANDARD
        .decode(candidate)
        .or_else(|_| STANDARD_NO_PAD.decode(candidate.trim_end_matches('=')))
        .ok()?;
    if printable_fraction(&bytes) < PRINTABLE_THRESHOLD {
        return None;
    }
    let decoded = String::from_utf8_lossy(&bytes).into_owned();
    if decoded == candidate {
        return None;
    }
    Some(decoded)
}

fn decode_hex_run(run: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(run.len() / 4);
    for chunk in run.split("\\x").filter(|c| !c.is_empty()) {
        bytes.push(u8::from_str_radix(chunk, 16).ok()?);
    }
    if printable_fraction(&bytes) < PRINTABLE_THRESHOLD {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn prefix(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Scan one tool field for encoded payloads.
pub fn scan_field(tool_name: &str, field: &str, text: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    for m in BASE64_CANDIDATE.find_iter(text) {
        let candidate = m.as_str();
        let Some(decoded) = decode_base64(candidate) else {
            continue;
        };

        let inner_hits = injection::scan_text(&decoded);
        if !inner_hits.is_empty() {
            findings.push(
                Finding::new(
                    "TP_OBFUSC_001",
                    Category::ObfuscatedPayload,
                    Severity::Critical,
                    "Base64-encoded injection payload",
                    format!(
                        "Tool '{tool_name}' {field} carries a Base64 payload that \
                         decodes to instruction-injection content ({}).",
                        inner_hits[0].pattern.id
                    ),
                )
                .with_confidence(Confidence::High)
                .with_evidence(format!(
                    "encoded: \"{}...\" decodes to: \"{}\"",
                    prefix(candidate, 40),
                    prefix(&decoded, 60)
                )),
            );
        } else if decoded.len() >= MIN_UNUSUAL_DECODED {
            findings.push(
                Finding::new(
                    "TP_OBFUSC_002",
                    Category::ObfuscatedPayload,
                    Severity::Medium,
                    "Unusual encoded content",
                    format!(
                        "Tool '{tool_name}' {field} carries a {}-byte Base64 payload \
                         with no obvious purpose.",
                        decoded.len()
                    ),
                )
                .with_confidence(Confidence::Medium)
                .with_evidence(format!(
                    "encoded: \"{}...\" decodes to: \"{}\"",
                    prefix(candidate, 40),
                    prefix(&decoded, 60)
                )),
            );
        }

        // Second layer: double encoding is itself strong evidence.
        for inner in BASE64_CANDIDATE.find_iter(&decoded) {
            if decode_base64(inner.as_str()).is_some() {
                findings.push(
                    Finding::new(
                        "TP_OBFUSC_003",
                        Category::ObfuscatedPayload,
                        Severity::Critical,
                        "Double-encoded payload",
                        format!(
                            "Tool '{tool_name}' {field} contains a Base64 payload \
                             nested inside another Base64 payload."
                        ),
                    )
                    .with_confidence(Confidence::High)
                    .with_evidence(format!("outer: \"{}...\"", prefix(candidate, 40))),
                );
                break;
            }
        }
    }

    for m in HEX_CANDIDATE.find_iter(text) {
        let Some(decoded) = decode_hex_run(m.as_str()) else {
            continue;
        };
        let inner_hits = injection::scan_text(&decoded);
        if !inner_hits.is_empty() {
            findings.push(
                Finding::new(
                    "TP_OBFUSC_004",
                    Category::ObfuscatedPayload,
                    Severity::Critical,
                    "Hex-encoded injection payload",
                    format!(
                        "Tool '{tool_name}' {field} carries a hex-escape payload that \
                         decodes to instruction-injection content ({}).",
                        inner_hits[0].pattern.id
                    ),
                )
                .with_confidence(Confidence::High)
                .with_evidence(format!(
                    "encoded: \"{}...\" decodes to: \"{}\"",
                    prefix(m.as_str(), 40),
                    prefix(&decoded, 60)
                )),
            );
        } else if decoded.len() >= MIN_UNUSUAL_DECODED {
            findings.push(
                Finding::new(
                    "TP_OBFUSC_005",
                    Category::ObfuscatedPayload,
                    Severity::Medium,
                    "Unusual hex-encoded content",
                    format!(
                        "Tool '{tool_name}' {field} carries a {}-byte hex-escape \
                         payload with no obvious purpose.",
                        decoded.len()
                    ),
                )
                .with_confidence(Confidence::Medium)
                .with_evidence(format!("encoded: \"{}...\"", prefix(m.as_str(), 40))),
            );
        }
    }

    findings
}
