//! Report-level invariants
//!
//! Risk scoring, result thresholds, enrichment idempotence, SARIF
//! fingerprint stability, and the verification decision rules.

use agentaudit::audit::{extract_report, select_for_verification, VerifierVerdict};
use agentaudit::report::{enrich_report, max_severity_label, risk_score, to_sarif};
use agentaudit::{AuditResult, Category, FileEntry, Finding, Report, Severity};

fn finding(id: &str, severity: Severity) -> Finding {
    Finding::new(id, Category::Injection, severity, format!("{id} title"), "desc")
}

fn entry(path: &str, content: &str) -> FileEntry {
    FileEntry {
        path: path.to_string(),
        content: content.to_string(),
        size: content.len(),
    }
}

#[test]
fn risk_score_is_capped_sum_of_impacts() {
    let findings = vec![
        finding("A", Severity::Critical), // 25
        finding("B", Severity::High),     // 15
        finding("C", Severity::Medium),   // 5
        finding("D", Severity::Low),      // 1
        finding("E", Severity::Info),     // 0
    ];
    assert_eq!(risk_score(&findings), 46);
}

#[test]
fn result_follows_thresholds_through_enrichment() {
    for (count, expected) in [
        (0usize, AuditResult::Safe),
        (5, AuditResult::Safe),      // 5 x 5 = 25
        (6, AuditResult::Caution),   // 30
        (10, AuditResult::Caution),  // 50
        (11, AuditResult::Unsafe),   // 55
    ] {
        let mut report = Report::new("demo", "url");
        report.findings = (0..count)
            .map(|i| finding(&format!("F{i}"), Severity::Medium))
            .collect();
        enrich_report(&mut report, &[]);
        assert_eq!(report.result, expected, "at {count} medium findings");
    }
}

#[test]
fn by_design_findings_never_score() {
    let mut report = Report::new("demo", "url");
    let mut f = finding("SHELL_EXEC", Severity::Critical);
    f.by_design = true;
    report.findings = vec![f];
    enrich_report(&mut report, &[]);

    assert_eq!(report.risk_score, 0);
    assert_eq!(report.result, AuditResult::Safe);
    assert_eq!(report.findings[0].score_impact, 0);
    // Still present and suppressed in SARIF, not dropped
    let sarif = to_sarif(&report);
    assert_eq!(
        sarif["runs"][0]["results"][0]["suppressions"][0]["kind"],
        "inSource"
    );
}

#[test]
fn file_sanitisation_holds_for_all_producers() {
    let mut report = Report::new("demo", "url");
    report.findings = vec![
        finding("A", Severity::High).with_file("src/ok.py").with_line(3),
        finding("B", Severity::High).with_file("../../etc/shadow").with_line(1),
        finding("C", Severity::High).with_file("https://host/x"),
        finding("D", Severity::High).with_file("nul\0byte"),
    ];
    enrich_report(&mut report, &[]);

    assert!(report.findings[0].file.is_some());
    for f in &report.findings[1..] {
        assert!(f.file.is_none(), "{} kept an unsafe path", f.pattern_id);
    }
}

#[test]
fn enrichment_is_idempotent_over_a_full_report() {
    let files = vec![entry("a.py", "import os\nos.system(x)\nprint(2)\n")];
    let mut report = Report::new("demo", "url");
    report.findings = vec![
        finding("CMD_INJECT", Severity::Critical).with_file("a.py").with_line(2),
        finding("LLM_MADE_UP", Severity::Warning),
    ];
    enrich_report(&mut report, &files);
    let once = serde_json::to_value(&report).unwrap();
    enrich_report(&mut report, &files);
    let twice = serde_json::to_value(&report).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn warning_folds_into_low_for_max_severity() {
    assert_eq!(max_severity_label(&[finding("A", Severity::Warning)]), "low");
    assert_eq!(
        max_severity_label(&[finding("A", Severity::Warning), finding("B", Severity::Medium)]),
        "medium"
    );
    assert_eq!(max_severity_label(&[]), "none");
}

#[test]
fn sarif_fingerprints_are_stable_per_location() {
    let mut report = Report::new("demo", "url");
    report.findings = vec![
        finding("CMD_INJECT", Severity::Critical).with_file("a.py").with_line(7),
        finding("CMD_INJECT", Severity::Critical).with_file("a.py").with_line(7),
        finding("CMD_INJECT", Severity::Critical).with_file("a.py").with_line(8),
    ];
    report.recompute();
    let sarif = to_sarif(&report);
    let results = sarif["runs"][0]["results"].as_array().unwrap();
    let hash = |i: usize| {
        results[i]["partialFingerprints"]["primaryLocationLineHash"]
            .as_str()
            .unwrap()
            .to_string()
    };
    assert_eq!(hash(0), hash(1));
    assert_ne!(hash(0), hash(2));
    assert_eq!(hash(0).len(), 16);
}

#[test]
fn extraction_accepts_reports_and_rejects_prose() {
    let report = serde_json::json!({
        "skill_slug": "demo",
        "risk_score": 30,
        "result": "caution",
        "findings": [{"title": "x", "severity": "high"}]
    })
    .to_string();

    assert!(extract_report(&report).is_some());
    assert!(extract_report(&format!("prose before\n```json\n{report}\n```\nafter")).is_some());
    assert!(extract_report(&format!("inline {report} trailing")).is_some());

    // JSON-shaped prose without a findings array is rejected
    assert!(extract_report(r#"{"skill_slug": "demo", "verdict": "fine"}"#).is_none());
    // Findings present but no identity field is rejected
    assert!(extract_report(r#"{"findings": []}"#).is_none());
    // Gateway HTML is rejected
    assert!(extract_report("<html>502</html>").is_none());
}

#[test]
fn rejecting_every_finding_yields_a_safe_empty_report() {
    let mut report = Report::new("demo", "url");
    report.findings = vec![
        finding("A", Severity::Critical),
        finding("B", Severity::High),
    ];

    // Verifier refutes everything: the cited code does not exist.
    let verdict = VerifierVerdict {
        code_exists: false,
        ..Default::default()
    };
    let order = select_for_verification(&report.findings);
    let mut rejected: Vec<usize> = Vec::new();
    for index in order {
        if agentaudit::audit::apply_verdict(&mut report.findings[index], &verdict)
            == agentaudit::report::VerificationStatus::Rejected
        {
            rejected.push(index);
        }
    }
    rejected.sort_unstable();
    for index in rejected.into_iter().rev() {
        report.findings.remove(index);
    }
    enrich_report(&mut report, &[]);

    assert_eq!(report.risk_score, 0);
    assert_eq!(report.result, AuditResult::Safe);
    assert_eq!(report.max_severity, "none");
    assert_eq!(report.findings_count, 0);
}

#[test]
fn verification_order_is_severity_then_position() {
    let findings = vec![
        finding("m1", Severity::Medium),
        finding("c1", Severity::Critical),
        finding("l1", Severity::Low),
        finding("h1", Severity::High),
        finding("c2", Severity::Critical),
    ];
    let order = select_for_verification(&findings);
    let ids: Vec<&str> = order.iter().map(|&i| findings[i].pattern_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "h1", "m1", "l1"]);
}
