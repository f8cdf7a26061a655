//! Homoglyph detection
//!
//! Two fixed lookalike maps (Cyrillic and Greek) covering the common
//! confusable ranges. Mixed-script text is the attack signal: a field
//! that renders as Latin but is not.

use crate::report::{Category, Confidence, Finding, Severity};

/// Cyrillic characters visually identical to Latin letters.
const CYRILLIC_MAP: &[(char, char)] = &[
    ('а', 'a'),
    ('в', 'b'),
    ('е', 'e'),
    ('ѕ', 's'),
    ('і', 'i'),
    ('ј', 'j'),
    ('о', 'o'),
    ('р', 'p'),
    ('с', 'c'),
    ('т', 't'),
    ('у', 'y'),
    ('х', 'x'),
    ('ь', 'b'),
    ('А', 'A'),
    ('В', 'B'),
    ('Е', 'E'),
    ('Ѕ', 'S'),
    ('І', 'I'),
    ('Ј', 'J'),
    ('К', 'K'),
    ('М', 'M'),
    ('Н', 'H'),
    ('О', 'O'),
    ('Р', 'P'),
    ('С', 'C'),
    ('Т', 'T'),
    ('У', 'Y'),
    ('Х', 'X'),
];

/// Greek characters visually identical to Latin letters.
const GREEK_MAP: &[(char, char)] = &[
    ('α', 'a'),
    ('ε', 'e'),
    ('ι', 'i'),
    ('κ', 'k'),
    ('ν', 'v'),
    ('ο', 'o'),
    ('ρ', 'p'),
    ('τ', 't'),
    ('υ', 'u'),
    ('χ', 'x'),
    ('Α', 'A'),
    ('Β', 'B'),
    ('Ε', 'E'),
    ('Ζ', 'Z'),
    ('Η', 'H'),
    ('Ι', 'I'),
    ('Κ', 'K'),
    ('Μ', 'M'),
    ('Ν', 'N'),
    ('Ο', 'O'),
    ('Ρ', 'P'),
    ('Τ', 'T'),
    ('Υ', 'Y'),
    ('Χ', 'X'),
];

/// Latin equivalent of a lookalike, if the character is one.
pub fn latin_equivalent(ch: char) -> Option<char> {
    CYRILLIC_MAP
        .iter()
        .chain(GREEK_MAP.iter())
        .find(|(glyph, _)| *glyph == ch)
        .map(|(_, latin)| *latin)
}

struct HomoglyphHit {
    offset: usize,
    glyph: char,
    latin: char,
}

fn find_homoglyphs(text: &str) -> Vec<HomoglyphHit> {
    text.char_indices()
        .filter_map(|(offset, glyph)| {
            latin_equivalent(glyph).map(|latin| HomoglyphHit {
                offset,
                glyph,
                latin,
            })
        })
        .collect()
}

/// Scan one tool field for mixed-script homoglyph use.
///
/// A lookalike in a tool name is always critical (names are identity);
/// in other fields the severity escalates with the count. A name made
/// entirely of lookalikes gets its own finding carrying the
/// reconstructed Latin pseudonym.
pub fn scan_field(tool_name: &str, field: &str, text: &str) -> Option<Finding> {
    let hits = find_homoglyphs(text);
    if hits.is_empty() {
        return None;
    }

    let has_latin = text.chars().any(|c| c.is_ascii_alphabetic());

    // Full-lookalike name: no Latin letters, every alphabetic char maps.
    if field == "name" && !has_latin {
        let all_mapped = text
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| latin_equivalent(c).is_some());
        if all_mapped {
            let pseudonym: String = text
                .chars()
                .map(|c| latin_equivalent(c).unwrap_or(c))
                .collect();
            return Some(
                Finding::new(
                    "TP_HOMOGLYPH_002",
                    Category::Homoglyph,
                    Severity::Critical,
                    "Tool name is entirely non-Latin lookalikes",
                    format!(
                        "Tool name '{text}' is composed of non-Latin lookalike \
                         characters and renders as '{pseudonym}'."
                    ),
                )
                .with_confidence(Confidence::High)
                .with_evidence(mapping_evidence(&hits)),
            );
        }
    }

    if !has_latin {
        // Genuinely non-Latin text, not an imitation.
        return None;
    }

    let severity = if field == "name" || hits.len() > 5 {
        Severity::Critical
    } else {
        Severity::High
    };

    Some(
        Finding::new(
            "TP_HOMOGLYPH_001",
            Category::Homoglyph,
            severity,
            "Mixed-script homoglyph characters",
            format!(
                "Tool '{tool_name}' {field} mixes Latin text with {} non-Latin \
                 lookalike character(s).",
                hits.len()
            ),
        )
        .with_confidence(Confidence::High)
        .with_evidence(mapping_evidence(&hits)),
    )
}

fn mapping_evidence(hits: &[HomoglyphHit]) -> String {
    hits.iter()
        .take(5)
        .map(|hit| {
            format!(
                "U+{:04X} '{}' -> '{}' at byte {}",
                hit.glyph as u32, hit.glyph, hit.latin, hit.offset
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyrillic_a_in_name_is_critical() {
        // "get_dаta" with Cyrillic U+0430
        let finding = scan_field("get_d\u{0430}ta", "name", "get_d\u{0430}ta").unwrap();
        assert_eq!(finding.pattern_id, "TP_HOMOGLYPH_001");
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.evidence.contains("U+0430"));
        assert!(finding.evidence.contains("-> 'a'"));
    }

    #[test]
    fn few_lookalikes_in_description_are_high() {
        let finding = scan_field("t", "description", "Use s\u{0435}rver mode").unwrap();
        assert_eq!(finding.severity, Severity::High);
    }

    #[test]
    fn many_lookalikes_in_description_are_critical() {
        let text = "c\u{0430}ll th\u{0435} s\u{0435}rv\u{0435}r t\u{043E}\u{043E}l now";
        let finding = scan_field("t", "description", text).unwrap();
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn fully_cyrillic_name_reports_pseudonym() {
        // "сору" = Cyrillic с о р у, renders as "copy"
        let name = "\u{0441}\u{043E}\u{0440}\u{0443}";
        let finding = scan_field(name, "name", name).unwrap();
        assert_eq!(finding.pattern_id, "TP_HOMOGLYPH_002");
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.description.contains("copy"));
    }

    #[test]
    fn pure_non_latin_description_is_not_flagged() {
        // Russian prose with no Latin letters is not an imitation attack
        assert!(scan_field("t", "description", "это просто текст").is_none());
    }

    #[test]
    fn plain_ascii_is_clean() {
        assert!(scan_field("get_data", "name", "get_data").is_none());
        assert!(scan_field("t", "description", "Fetches data from the API.").is_none());
    }

    #[test]
    fn greek_omicron_detected() {
        let finding = scan_field("t", "description", "t\u{03BF}ol output").unwrap();
        assert_eq!(finding.pattern_id, "TP_HOMOGLYPH_001");
    }
}
