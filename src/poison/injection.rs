//! Instruction-injection pattern pack
//!
//! Fixed regexes over tool description text. Each pattern carries a
//! stable id, a baseline severity, and a confidence. The pack is also
//! re-used by the obfuscation decoder (over decoded payloads) and the
//! schema checks (over defaults and enum values).

use std::sync::LazyLock;

use regex::Regex;

use crate::report::{Category, Confidence, Finding, Severity};

/// One entry in the injection pack.
pub struct InjectionPattern {
    pub id: &'static str,
    pub title: &'static str,
    pub severity: Severity,
    pub confidence: Confidence,
    pub regex: &'static LazyLock<Regex>,
}

macro_rules! pattern_regex {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
    };
}

pattern_regex!(RE_IMPORTANT_TAG, r"(?i)<\s*important\s*>");
pattern_regex!(RE_SYSTEM_TAG, r"(?i)<\s*system\s*>");
pattern_regex!(
    RE_OVERRIDE,
    r"(?i)\b(?:ignore|disregard|forget)\s+(?:all\s+|any\s+)?(?:previous|prior|above|earlier)\s+(?:instructions?|prompts?|directions?|rules?)"
);
pattern_regex!(RE_BRACKET_IMPORTANT, r"(?i)[\[{(]\s*important\s*[\]})]");
pattern_regex!(RE_ROLE_HIJACK, r"(?i)\byou\s+are\s+now\b");
pattern_regex!(
    RE_PRE_ACTION,
    r"(?i)\b(?:first|before\s+(?:anything|responding|proceeding|continuing)),?\s+(?:run|call|execute|invoke|use)\b"
);
pattern_regex!(
    RE_MANDATORY,
    r"(?i)\b(?:you\s+must\s+(?:always|never|first)|it\s+is\s+(?:mandatory|required)\s+(?:to|that)|always\s+(?:call|run|execute|invoke))\b"
);
pattern_regex!(
    RE_HIDDEN_LABEL,
    r"(?i)\[\s*(?:hidden|secret|internal|private)\s*\]"
);
pattern_regex!(
    RE_HTML_COMMENT,
    r"(?is)<!--.{0,400}?\b(?:instruction|execute|call|run|ignore|system|secret)\b.{0,400}?-->"
);
pattern_regex!(
    RE_CSS_HIDDEN,
    r#"(?i)(?:display\s*:\s*none|visibility\s*:\s*hidden|font-size\s*:\s*0)"#
);
pattern_regex!(
    RE_USER_DECEPTION,
    r"(?i)\b(?:do\s+not|don'?t|never)\s+(?:tell|inform|show|mention|alert|notify)\s+the\s+user\b|\bwithout\s+(?:telling|informing|notifying)\s+the\s+user\b|\bhide\s+this\s+from\s+the\s+user\b"
);
pattern_regex!(
    RE_SECURITY_BYPASS,
    r"(?i)\b(?:bypass|disable|skip|circumvent)\s+(?:any\s+|all\s+)?(?:security|safety|validation|sanitization|sanitisation|filtering|checks?)\b"
);
pattern_regex!(
    RE_EXFILTRATION,
    r"(?i)\b(?:send|transmit|forward|upload|post|exfiltrate|leak)\s+(?:all\s+|the\s+|any\s+|every\s+)?(?:data|conversation|history|messages?|credentials?|secrets?|keys?|files?|contents?)\b"
);
pattern_regex!(
    RE_HTTP_FETCH,
    r"(?i)\b(?:fetch|curl|wget|download)\b[^\n]{0,40}https?://"
);
pattern_regex!(
    RE_REDIRECTION,
    r"(?i)\b(?:redirect|pipe|forward|copy|mirror)\b[^\n]{0,40}\b(?:to|into)\s+(?:https?://|the\s+(?:server|endpoint|address))"
);
pattern_regex!(
    RE_OVERRIDE_DEFAULT,
    r"(?i)\b(?:override|replace|change)\s+(?:the\s+)?default\s+(?:behaviou?r|settings?|configuration|values?)\b"
);
pattern_regex!(RE_DETAILS_HIDING, r"(?i)<\s*details\s*>|<\s*summary\s*>");
pattern_regex!(
    RE_SHELL_LITERAL,
    r"(?i)(?:\brm\s+-rf?\b|\bcurl\s+-|\bwget\s+http|\bbash\s+-c\b|\bsh\s+-c\b|\bnc\s+-e\b|\bchmod\s+\+x\b|\beval\s*\()"
);
pattern_regex!(RE_ROLE_LABEL, r"(?im)^\s*(?:system|assistant)\s*:");
pattern_regex!(
    RE_DECODE_EXECUTE,
    r"(?i)\b(?:decode|unbase64|deobfuscate)\b[^\n]{0,40}\b(?:and\s+)?(?:run|execute|eval)\b"
);
pattern_regex!(RE_TEMPLATE_ESCAPE, r"\{\{[^}]{1,80}\}\}|\$\{[^}]{1,80}\}");

/// The fixed pack, in id order.
pub static INJECTION_PATTERNS: LazyLock<Vec<InjectionPattern>> = LazyLock::new(|| {
    vec![
        InjectionPattern {
            id: "TP_INJECT_001",
            title: "Injected <IMPORTANT> directive block",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_IMPORTANT_TAG,
        },
        InjectionPattern {
            id: "TP_INJECT_002",
            title: "Injected <SYSTEM> directive block",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_SYSTEM_TAG,
        },
        InjectionPattern {
            id: "TP_INJECT_003",
            title: "Instruction-override phrasing",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_OVERRIDE,
        },
        InjectionPattern {
            id: "TP_INJECT_004",
            title: "Bracketed IMPORTANT marker",
            severity: Severity::High,
            confidence: Confidence::Medium,
            regex: &RE_BRACKET_IMPORTANT,
        },
        InjectionPattern {
            id: "TP_INJECT_005",
            title: "Role-hijack phrasing",
            severity: Severity::High,
            confidence: Confidence::Medium,
            regex: &RE_ROLE_HIJACK,
        },
        InjectionPattern {
            id: "TP_INJECT_006",
            title: "Pre-action directive",
            severity: Severity::High,
            confidence: Confidence::High,
            regex: &RE_PRE_ACTION,
        },
        InjectionPattern {
            id: "TP_INJECT_007",
            title: "Mandatory-action directive",
            severity: Severity::Medium,
            confidence: Confidence::Medium,
            regex: &RE_MANDATORY,
        },
        InjectionPattern {
            id: "TP_INJECT_008",
            title: "Hidden-instruction label",
            severity: Severity::High,
            confidence: Confidence::High,
            regex: &RE_HIDDEN_LABEL,
        },
        InjectionPattern {
            id: "TP_INJECT_009",
            title: "Directive hidden in HTML comment",
            severity: Severity::High,
            confidence: Confidence::Medium,
            regex: &RE_HTML_COMMENT,
        },
        InjectionPattern {
            id: "TP_INJECT_010",
            title: "CSS-hidden directive block",
            severity: Severity::High,
            confidence: Confidence::Medium,
            regex: &RE_CSS_HIDDEN,
        },
        InjectionPattern {
            id: "TP_INJECT_011",
            title: "User-deception directive",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_USER_DECEPTION,
        },
        InjectionPattern {
            id: "TP_INJECT_012",
            title: "Security-bypass directive",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_SECURITY_BYPASS,
        },
        InjectionPattern {
            id: "TP_INJECT_013",
            title: "Data-exfiltration directive",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_EXFILTRATION,
        },
        InjectionPattern {
            id: "TP_INJECT_014",
            title: "Embedded HTTP fetch verb",
            severity: Severity::High,
            confidence: Confidence::Medium,
            regex: &RE_HTTP_FETCH,
        },
        InjectionPattern {
            id: "TP_INJECT_015",
            title: "Data-redirection verb",
            severity: Severity::High,
            confidence: Confidence::Medium,
            regex: &RE_REDIRECTION,
        },
        InjectionPattern {
            id: "TP_INJECT_016",
            title: "Override-default directive",
            severity: Severity::Medium,
            confidence: Confidence::Medium,
            regex: &RE_OVERRIDE_DEFAULT,
        },
        InjectionPattern {
            id: "TP_INJECT_017",
            title: "Collapsible-details hiding",
            severity: Severity::Medium,
            confidence: Confidence::Low,
            regex: &RE_DETAILS_HIDING,
        },
        InjectionPattern {
            id: "TP_INJECT_018",
            title: "Shell-command literal",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_SHELL_LITERAL,
        },
        InjectionPattern {
            id: "TP_INJECT_019",
            title: "Role-label line prefix",
            severity: Severity::High,
            confidence: Confidence::Medium,
            regex: &RE_ROLE_LABEL,
        },
        InjectionPattern {
            id: "TP_INJECT_020",
            title: "Decode-then-execute directive",
            severity: Severity::Critical,
            confidence: Confidence::High,
            regex: &RE_DECODE_EXECUTE,
        },
        InjectionPattern {
            id: "TP_INJECT_021",
            title: "Template-expansion placeholder",
            severity: Severity::Medium,
            confidence: Confidence::Low,
            regex: &RE_TEMPLATE_ESCAPE,
        },
    ]
});

/// A raw pattern hit inside a text field.
pub struct InjectionHit {
    pub pattern: &'static InjectionPattern,
    pub offset: usize,
    pub evidence: String,
}

/// Run the full pack over one text; hits come back in pack order.
pub fn scan_text(text: &str) -> Vec<InjectionHit> {
    let mut hits = Vec::new();
    for pattern in INJECTION_PATTERNS.iter() {
        for m in pattern.regex.find_iter(text) {
            hits.push(InjectionHit {
                pattern,
                offset: m.start(),
                evidence: context_window(text, m.start(), m.end()),
            });
        }
    }
    hits
}

/// Produce findings for every pack hit in a tool field.
pub fn scan_field(tool_name: &str, field: &str, text: &str) -> Vec<Finding> {
    scan_text(text)
        .into_iter()
        .map(|hit| {
            Finding::new(
                hit.pattern.id,
                Category::InstructionInjection,
                hit.pattern.severity,
                hit.pattern.title,
                format!(
                    "Tool '{tool_name}' {field} matches the {} pattern.",
                    hit.pattern.title.to_lowercase()
                ),
            )
            .with_confidence(hit.pattern.confidence)
            .with_evidence(hit.evidence)
        })
        .collect()
}

/// 100-character window around a match, clamped to char boundaries.
pub fn context_window(text: &str, start: usize, end: usize) -> String {
    let span = end.saturating_sub(start);
    let pad = 100usize.saturating_sub(span) / 2;
    let mut lo = start.saturating_sub(pad);
    let mut hi = (end + pad).min(text.len());
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    text[lo..hi].to_string()
}
