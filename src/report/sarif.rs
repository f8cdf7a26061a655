//! SARIF 2.1.0 emission
//!
//! One run per report; each unique pattern_id becomes a rule, each
//! finding a result. By-design findings are suppressed in place so CI
//! keeps the record without failing the build.

use std::collections::HashSet;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::report::{Finding, Report};

const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";

/// Convert a report to a SARIF 2.1.0 document.
pub fn to_sarif(report: &Report) -> serde_json::Value {
    let mut seen_rules: HashSet<&str> = HashSet::new();
    let mut rules = Vec::new();

    for finding in &report.findings {
        if seen_rules.insert(finding.pattern_id.as_str()) {
            rules.push(json!({
                "id": finding.pattern_id,
                "name": finding.title,
                "shortDescription": { "text": finding.title },
                "fullDescription": { "text": finding.description },
                "defaultConfiguration": { "level": finding.severity.sarif_level() },
                "properties": {
                    "security-severity": finding.severity.security_severity(),
                    "category": finding.category.as_str(),
                }
            }));
        }
    }

    let results: Vec<serde_json::Value> = report.findings.iter().map(to_result).collect();

    json!({
        "$schema": SARIF_SCHEMA,
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "AgentAudit",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/agentaudit/agentaudit",
                    "rules": rules
                }
            },
            "results": results
        }]
    })
}

fn to_result(finding: &Finding) -> serde_json::Value {
    let mut result = json!({
        "ruleId": finding.pattern_id,
        "level": finding.severity.sarif_level(),
        "message": { "text": format!("{}: {}", finding.title, finding.description) },
        "partialFingerprints": {
            "primaryLocationLineHash": fingerprint(finding)
        }
    });
    let object = result.as_object_mut().expect("json! object");

    if let Some(file) = &finding.file {
        let mut physical = json!({ "artifactLocation": { "uri": file } });
        if let Some(line) = finding.line {
            let mut region = json!({ "startLine": line });
            if let Some(content) = &finding.content {
                region["snippet"] = json!({ "text": content });
            }
            physical["region"] = region;
        }
        object.insert(
            "locations".to_string(),
            json!([{ "physicalLocation": physical }]),
        );
    }

    if let Some(remediation) = &finding.remediation {
        object.insert(
            "fixes".to_string(),
            json!([{ "description": { "text": remediation } }]),
        );
    }

    if finding.by_design {
        object.insert("suppressions".to_string(), json!([{ "kind": "inSource" }]));
    }

    result
}

/// First 16 hex chars of SHA-256 over `ruleId:file:line`, or
/// `ruleId:title` when location is unset.
fn fingerprint(finding: &Finding) -> String {
    let seed = match (&finding.file, finding.line) {
        (Some(file), Some(line)) => format!("{}:{}:{}", finding.pattern_id, file, line),
        _ => format!("{}:{}", finding.pattern_id, finding.title),
    };
    let digest = Sha256::digest(seed.as_bytes());
    format!("{digest:x}")[..16].to_string()
}
