//! Multi-model consensus
//!
//! Deterministic fusion of per-model reports: risk statistics,
//! severity agreement, and title-keyed finding overlap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::report::Report;

/// A finding title confirmed by two or more models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedFinding {
    /// Normalised title key.
    pub key: String,
    /// Representative title (from the first model that produced it).
    pub title: String,
    /// Models that independently produced it, in input order.
    pub models: Vec<String>,
}

/// Consensus view over N per-model reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consensus {
    pub risk_min: u32,
    pub risk_max: u32,
    pub risk_mean: f64,
    /// Set when every model produced the same max severity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unanimous_severity: Option<String>,
    /// Per-model max severities when not unanimous.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub severity_by_model: Vec<(String, String)>,
    /// Findings confirmed by at least two models; the preferred set.
    pub shared: Vec<SharedFinding>,
    /// Titles only one model produced, keyed by model.
    pub unique_by_model: BTreeMap<String, Vec<String>>,
}

/// Normalise a title into a fusion key: lowercase, non-alphanumerics
/// collapsed to single spaces, trimmed.
pub fn normalize_title(title: &str) -> String {
    let mut key = String::with_capacity(title.len());
    let mut last_was_space = true;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            key.extend(ch.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            key.push(' ');
            last_was_space = true;
        }
    }
    key.trim_end().to_string()
}

/// Fuse per-model reports into a consensus view.
pub fn build_consensus(reports: &[Report]) -> Consensus {
    let scores: Vec<u32> = reports.iter().map(|r| r.risk_score).collect();
    let risk_min = scores.iter().copied().min().unwrap_or(0);
    let risk_max = scores.iter().copied().max().unwrap_or(0);
    let risk_mean = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64
    };

    let severities: Vec<(String, String)> = reports
        .iter()
        .map(|r| (r.audit_model.clone(), r.max_severity.clone()))
        .collect();
    let unanimous = !severities.is_empty()
        && severities.iter().all(|(_, s)| *s == severities[0].1);

    // key -> (representative title, models that produced it)
    let mut by_key: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
    for report in reports {
        let mut seen_in_this_model: Vec<String> = Vec::new();
        for finding in &report.findings {
            let key = normalize_title(&finding.title);
            if key.is_empty() || seen_in_this_model.contains(&key) {
                continue;
            }
            seen_in_this_model.push(key.clone());
            let entry = by_key
                .entry(key)
                .or_insert_with(|| (finding.title.clone(), Vec::new()));
            entry.1.push(report.audit_model.clone());
        }
    }

    let mut shared = Vec::new();
    let mut unique_by_model: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, (title, models)) in by_key {
        if models.len() >= 2 {
            shared.push(SharedFinding { key, title, models });
        } else if let Some(model) = models.first() {
            unique_by_model.entry(model.clone()).or_default().push(title);
        }
    }

    Consensus {
        risk_min,
        risk_max,
        risk_mean,
        unanimous_severity: if unanimous {
            Some(severities[0].1.clone())
        } else {
            None
        },
        severity_by_model: if unanimous { Vec::new() } else { severities },
        shared,
        unique_by_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Category, Finding, Severity};

    fn report(model: &str, risk: u32, max_severity: &str, titles: &[&str]) -> Report {
        let mut r = Report::new("demo", "https://github.com/x/y");
        r.audit_model = model.to_string();
        r.risk_score = risk;
        r.max_severity = max_severity.to_string();
        r.findings = titles
            .iter()
            .map(|t| Finding::new("X", Category::Injection, Severity::High, *t, "d"))
            .collect();
        r
    }

    #[test]
    fn title_normalisation_collapses_punctuation() {
        assert_eq!(
            normalize_title("Command Injection (os.system)!"),
            "command injection os system"
        );
        assert_eq!(normalize_title("  A--B  "), "a b");
        assert_eq!(
            normalize_title("command injection os system"),
            normalize_title("Command-Injection: os.system")
        );
    }

    #[test]
    fn shared_requires_two_models() {
        let reports = vec![
            report("m1", 40, "high", &["Command injection in run_cmd", "Telemetry beacon"]),
            report("m2", 30, "high", &["Command Injection in run_cmd!"]),
        ];
        let consensus = build_consensus(&reports);
        assert_eq!(consensus.shared.len(), 1);
        assert_eq!(consensus.shared[0].models, vec!["m1", "m2"]);
        assert_eq!(consensus.unique_by_model["m1"], vec!["Telemetry beacon"]);
    }

    #[test]
    fn risk_statistics() {
        let reports = vec![
            report("m1", 10, "low", &[]),
            report("m2", 50, "high", &[]),
            report("m3", 30, "medium", &[]),
        ];
        let consensus = build_consensus(&reports);
        assert_eq!(consensus.risk_min, 10);
        assert_eq!(consensus.risk_max, 50);
        assert!((consensus.risk_mean - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unanimous_severity() {
        let reports = vec![
            report("m1", 40, "high", &[]),
            report("m2", 45, "high", &[]),
        ];
        let consensus = build_consensus(&reports);
        assert_eq!(consensus.unanimous_severity.as_deref(), Some("high"));
        assert!(consensus.severity_by_model.is_empty());
    }

    #[test]
    fn disagreement_lists_per_model_severities() {
        let reports = vec![
            report("m1", 40, "high", &[]),
            report("m2", 5, "low", &[]),
        ];
        let consensus = build_consensus(&reports);
        assert!(consensus.unanimous_severity.is_none());
        assert_eq!(consensus.severity_by_model.len(), 2);
    }

    #[test]
    fn duplicate_titles_within_one_model_count_once() {
        let reports = vec![
            report("m1", 20, "high", &["Eval usage", "Eval usage"]),
            report("m2", 20, "high", &["Eval usage"]),
        ];
        let consensus = build_consensus(&reports);
        assert_eq!(consensus.shared.len(), 1);
        assert_eq!(consensus.shared[0].models.len(), 2);
    }
}
