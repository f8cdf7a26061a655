//! JSON extraction from model output
//!
//! Models wrap JSON in prose, fences, or both. Extraction tries, in
//! order: the whole body, fenced code blocks, then every balanced
//! top-level object found by a character walk that respects string
//! literals and escapes.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap());

/// Extract the first JSON object from `body` that satisfies `accept`.
pub fn extract_json<F>(body: &str, accept: F) -> Option<serde_json::Value>
where
    F: Fn(&serde_json::Value) -> bool,
{
    // Mode (a): the whole body.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body.trim()) {
        if accept(&value) {
            return Some(value);
        }
    }

    // Mode (b): fenced code blocks, largest first.
    let mut blocks: Vec<&str> = FENCED_BLOCK
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    blocks.sort_by_key(|b| std::cmp::Reverse(b.len()));
    for block in blocks {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(block.trim()) {
            if accept(&value) {
                return Some(value);
            }
        }
    }

    // Mode (c): balanced top-level objects, largest first.
    let mut candidates = balanced_objects(body);
    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));
    for candidate in candidates {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            if accept(&value) {
                return Some(value);
            }
        }
    }

    None
}

/// An audit report must carry a `findings` array plus at least one
/// identifying field. This rejects JSON-shaped prose.
pub fn is_report_shaped(value: &serde_json::Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    let has_findings = object.get("findings").map(|f| f.is_array()).unwrap_or(false);
    let has_identity = object.contains_key("skill_slug")
        || object.contains_key("risk_score")
        || object.contains_key("result");
    has_findings && has_identity
}

/// Extract an audit-report-shaped object.
pub fn extract_report(body: &str) -> Option<serde_json::Value> {
    extract_json(body, is_report_shaped)
}

/// Extract a verification verdict (shape keyed by `verification_status`).
pub fn extract_verification(body: &str) -> Option<serde_json::Value> {
    extract_json(body, |value| {
        value
            .as_object()
            .map(|o| o.contains_key("verification_status"))
            .unwrap_or(false)
    })
}

/// Walk state for the balanced-object scan.
enum WalkState {
    Normal,
    InString,
    EscapeInString,
}

/// Find every balanced top-level `{…}` span in `text`.
///
/// The walk tracks string literals and backslash escapes so braces
/// inside strings never count toward nesting.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut state = WalkState::Normal;
    let mut depth: usize = 0;
    let mut start: Option<usize> = None;

    for (index, byte) in bytes.iter().enumerate() {
        match state {
            WalkState::Normal => match byte {
                b'{' => {
                    if depth == 0 {
                        start = Some(index);
                    }
                    depth += 1;
                }
                b'}' => {
                    if depth > 0 {
                        depth -= 1;
                        if depth == 0 {
                            if let Some(s) = start.take() {
                                spans.push(&text[s..=index]);
                            }
                        }
                    }
                }
                b'"' => {
                    if depth > 0 {
                        state = WalkState::InString;
                    }
                }
                _ => {}
            },
            WalkState::InString => match byte {
                b'\\' => state = WalkState::EscapeInString,
                b'"' => state = WalkState::Normal,
                _ => {}
            },
            WalkState::EscapeInString => state = WalkState::InString,
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REPORT: &str = r#"{"skill_slug": "demo", "risk_score": 10, "findings": []}"#;

    #[test]
    fn whole_body_report() {
        let value = extract_report(REPORT).unwrap();
        assert_eq!(value["skill_slug"], "demo");
    }

    #[test]
    fn fenced_block_report() {
        let body = format!("Here is my analysis:\n```json\n{REPORT}\n```\nDone.");
        assert!(extract_report(&body).is_some());
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let body = format!("```\n{REPORT}\n```");
        assert!(extract_report(&body).is_some());
    }

    #[test]
    fn embedded_object_in_prose() {
        let body = format!("The package looks risky. {REPORT} That is my verdict.");
        assert!(extract_report(&body).is_some());
    }

    #[test]
    fn braces_inside_strings_do_not_break_balance() {
        let body = r#"Verdict: {"risk_score": 5, "result": "safe", "findings": [{"title": "uses {braces} and \"escapes\""}]}"#;
        let value = extract_report(body).unwrap();
        assert_eq!(value["findings"][0]["title"], "uses {braces} and \"escapes\"");
    }

    #[test]
    fn json_shaped_prose_is_rejected() {
        // An object without a findings array must not be accepted
        let body = r#"{"summary": "this package is fine", "note": "no issues"}"#;
        assert!(extract_report(body).is_none());
    }

    #[test]
    fn findings_must_be_an_array() {
        let body = r#"{"risk_score": 1, "findings": "none"}"#;
        assert!(extract_report(body).is_none());
    }

    #[test]
    fn identity_field_required() {
        let body = r#"{"findings": []}"#;
        assert!(extract_report(body).is_none());
    }

    #[test]
    fn largest_candidate_wins() {
        let small = r#"{"risk_score": 1, "findings": []}"#;
        let large = json!({
            "skill_slug": "real",
            "risk_score": 40,
            "result": "caution",
            "findings": [{"title": "a"}, {"title": "b"}]
        })
        .to_string();
        let body = format!("{small} then the full report {large}");
        let value = extract_report(&body).unwrap();
        assert_eq!(value["skill_slug"], "real");
    }

    #[test]
    fn html_body_yields_none() {
        let body = "<html><head><title>502 Bad Gateway</title></head></html>";
        assert!(extract_report(body).is_none());
    }

    #[test]
    fn verification_shape_extraction() {
        let body = r#"Checked. {"verification_status": "verified", "code_exists": true}"#;
        let value = extract_verification(body).unwrap();
        assert_eq!(value["verification_status"], "verified");
    }

    #[test]
    fn unterminated_object_is_ignored() {
        let body = r#"{"findings": [ and then the model stopped"#;
        assert!(extract_report(body).is_none());
    }
}
