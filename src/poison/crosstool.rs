//! Cross-tool manipulation checks
//!
//! A tool's description has no business directing the agent toward or
//! away from its sibling tools. These checks run once per batch.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::mcp::ToolDefinition;
use crate::report::{Category, Confidence, Finding, Severity};

static RUN_BEFORE_ANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:before|prior\s+to)\s+(?:using|calling|running|invoking)?\s*any\s+other\s+tools?\b|\bmust\s+be\s+(?:called|run|used|invoked)\s+first\b",
    )
    .unwrap()
});
static EXCLUSIVITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bonly\s+use\s+this\s+tool\b|\bdo\s+not\s+use\s+(?:any\s+)?other\s+tools?\b|\bnever\s+use\s+(?:any\s+)?other\s+tools?\b|\bexclusively\s+use\s+this\b",
    )
    .unwrap()
});
static REPLACES_OTHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:replaces?|overrides?|supersedes?)\s+(?:the\s+)?(?:\w+\s+){0,2}tools?\b")
        .unwrap()
});

const ACTION_VERBS: &str = "call|use|invoke|run|execute|trigger";
const PRIORITY_ADVERBS: &str = "first|always|immediately|instead|preferentially";

fn named_pattern(kind: &str, name: &str) -> Regex {
    let escaped = regex::escape(name);
    let pattern = match kind {
        "verb" => format!(r"(?i)\b(?:{ACTION_VERBS})\b[^.\n]{{0,40}}\b{escaped}\b"),
        "order" => format!(
            r"(?i)\b(?:before|after|instead\s+of)\b[^.\n]{{0,40}}\b{escaped}\b|\b{escaped}\b[^.\n]{{0,40}}\b(?:before|after|instead\s+of)\b"
        ),
        _ => format!(
            r"(?i)\b{escaped}\b[^.\n]{{0,30}}\b(?:{PRIORITY_ADVERBS})\b|\b(?:{PRIORITY_ADVERBS})\b[^.\n]{{0,30}}\b{escaped}\b"
        ),
    };
    Regex::new(&pattern).expect("escaped tool name always compiles")
}

/// Run the cross-tool checks over a batch of tools.
pub fn scan_tools(tools: &[ToolDefinition]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for tool in tools {
        if tool.description.is_empty() {
            continue;
        }

        for other in tools {
            if other.name == tool.name || other.name.len() < 3 {
                continue;
            }
            if !tool
                .description
                .to_lowercase()
                .contains(&other.name.to_lowercase())
            {
                continue;
            }

            if let Some(m) = named_pattern("verb", &other.name).find(&tool.description) {
                findings.push(named_finding(
                    "TP_XTOOL_001",
                    "Directs the agent to invoke a sibling tool",
                    tool,
                    &other.name,
                    m.as_str(),
                ));
            }
            if let Some(m) = named_pattern("order", &other.name).find(&tool.description) {
                findings.push(named_finding(
                    "TP_XTOOL_002",
                    "Imposes ordering against a sibling tool",
                    tool,
                    &other.name,
                    m.as_str(),
                ));
            }
            if let Some(m) = named_pattern("priority", &other.name).find(&tool.description) {
                findings.push(named_finding(
                    "TP_XTOOL_003",
                    "Claims priority over a sibling tool",
                    tool,
                    &other.name,
                    m.as_str(),
                ));
            }
        }

        if let Some(m) = RUN_BEFORE_ANY.find(&tool.description) {
            findings.push(generic_finding(
                "TP_XTOOL_004",
                "Demands to run before any other tool",
                tool,
                m.as_str(),
            ));
        }
        if let Some(m) = EXCLUSIVITY.find(&tool.description) {
            findings.push(generic_finding(
                "TP_XTOOL_005",
                "Demands tool exclusivity",
                tool,
                m.as_str(),
            ));
        }
        if let Some(m) = REPLACES_OTHER.find(&tool.description) {
            findings.push(generic_finding(
                "TP_XTOOL_006",
                "Claims to replace another tool",
                tool,
                m.as_str(),
            ));
        }
    }

    // Duplicate names shadow each other; later registrations win in
    // most SDKs, which is exactly what an attacker wants.
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tool in tools {
        *counts.entry(tool.name.as_str()).or_default() += 1;
    }
    let mut duplicates: Vec<&str> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect();
    duplicates.sort_unstable();
    for name in duplicates {
        findings.push(
            Finding::new(
                "TP_XTOOL_007",
                Category::CrossToolManipulation,
                Severity::High,
                "Duplicate tool name",
                format!("Tool name '{name}' is declared more than once in this server."),
            )
            .with_confidence(Confidence::High),
        );
    }

    findings
}

fn named_finding(
    id: &str,
    title: &str,
    tool: &ToolDefinition,
    other: &str,
    matched: &str,
) -> Finding {
    Finding::new(
        id,
        Category::CrossToolManipulation,
        Severity::High,
        title,
        format!(
            "Tool '{}' description manipulates how the agent should treat \
             sibling tool '{other}'.",
            tool.name
        ),
    )
    .with_confidence(Confidence::Medium)
    .with_evidence(matched.to_string())
}

fn generic_finding(id: &str, title: &str, tool: &ToolDefinition, matched: &str) -> Finding {
    Finding::new(
        id,
        Category::CrossToolManipulation,
        Severity::High,
        title,
        format!("Tool '{}' description: {title}.", tool.name),
    )
    .with_confidence(Confidence::Medium)
    .with_evidence(matched.to_string())
}
