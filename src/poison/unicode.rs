//! Hidden-character detection
//!
//! A fixed dictionary of invisible and directional code points, plus
//! the Unicode tag range. Tag detection is a range check, not a table.

use std::collections::BTreeMap;

use crate::report::{Category, Confidence, Finding, Severity};

/// Named invisible/directional code points.
const HIDDEN_CODEPOINTS: &[(u32, &str)] = &[
    (0x200B, "zero width space"),
    (0x200C, "zero width non-joiner"),
    (0x200D, "zero width joiner"),
    (0x200E, "left-to-right mark"),
    (0x200F, "right-to-left mark"),
    (0x202A, "left-to-right embedding"),
    (0x202B, "right-to-left embedding"),
    (0x202C, "pop directional formatting"),
    (0x202D, "left-to-right override"),
    (0x202E, "right-to-left override"),
    (0x2060, "word joiner"),
    (0x2061, "function application"),
    (0x2062, "invisible times"),
    (0x2063, "invisible separator"),
    (0x2064, "invisible plus"),
    (0xFEFF, "byte order mark"),
    (0xFFF9, "interlinear annotation anchor"),
    (0xFFFA, "interlinear annotation separator"),
    (0xFFFB, "interlinear annotation terminator"),
];

fn hidden_name(cp: u32) -> Option<&'static str> {
    if (0xE0020..=0xE007E).contains(&cp) {
        return Some("tag character");
    }
    if cp == 0xE0001 {
        return Some("language tag");
    }
    if cp == 0xE007F {
        return Some("cancel tag");
    }
    HIDDEN_CODEPOINTS
        .iter()
        .find(|(hidden, _)| *hidden == cp)
        .map(|(_, name)| *name)
}

fn is_critical_codepoint(cp: u32) -> bool {
    // RTL override, or anything in the tag block.
    cp == 0x202E || cp == 0xE0001 || cp == 0xE007F || (0xE0020..=0xE007E).contains(&cp)
}

/// Scan one tool field for hidden characters.
///
/// A lone BOM at offset 0 is benign and ignored. Evidence reports the
/// first five byte offsets plus the total count.
pub fn scan_field(tool_name: &str, field: &str, text: &str) -> Option<Finding> {
    let mut offsets: Vec<(usize, u32)> = Vec::new();
    let mut by_codepoint: BTreeMap<u32, usize> = BTreeMap::new();

    for (offset, ch) in text.char_indices() {
        let cp = ch as u32;
        if hidden_name(cp).is_none() {
            continue;
        }
        if cp == 0xFEFF && offset == 0 {
            continue;
        }
        offsets.push((offset, cp));
        *by_codepoint.entry(cp).or_default() += 1;
    }

    if offsets.is_empty() {
        return None;
    }

    let count = offsets.len();
    let severity = if offsets.iter().any(|(_, cp)| is_critical_codepoint(*cp)) {
        Severity::Critical
    } else if count > 3 {
        Severity::High
    } else if count > 1 {
        Severity::Medium
    } else {
        Severity::Warning
    };

    let shown: Vec<String> = offsets
        .iter()
        .take(5)
        .map(|(offset, cp)| {
            format!(
                "U+{cp:04X} ({}) at byte {offset}",
                hidden_name(*cp).unwrap_or("hidden")
            )
        })
        .collect();

    let breakdown: Vec<String> = by_codepoint
        .iter()
        .map(|(cp, n)| format!("U+{cp:04X} x{n}"))
        .collect();

    Some(
        Finding::new(
            "TP_UNICODE_001",
            Category::HiddenUnicode,
            severity,
            "Hidden Unicode characters",
            format!(
                "Tool '{tool_name}' {field} contains {count} hidden Unicode \
                 character(s) that can conceal instructions ({}).",
                breakdown.join(", ")
            ),
        )
        .with_confidence(Confidence::High)
        .with_evidence(format!("{}; total {count}", shown.join(", "))),
    )
}
