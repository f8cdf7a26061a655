//! Description-length checks
//!
//! Absolute thresholds always apply; z-score anomaly detection runs
//! only when the batch has at least five tools.

use crate::mcp::ToolDefinition;
use crate::report::{Category, Confidence, Finding, Severity};

const HIGH_THRESHOLD: usize = 2000;
const WARN_THRESHOLD: usize = 1000;
const MIN_TOOLS_FOR_ZSCORE: usize = 5;
const ZSCORE_THRESHOLD: f64 = 2.5;

/// Run the length checks over a batch of tools.
pub fn scan_tools(tools: &[ToolDefinition]) -> Vec<Finding> {
    let mut findings = Vec::new();
    // Tools whose absolute threshold already fired are excluded from
    // the anomaly pass.
    let mut absolute_fired = vec![false; tools.len()];

    for (index, tool) in tools.iter().enumerate() {
        let len = tool.description.len();
        if tool.description.is_empty() {
            findings.push(
                Finding::new(
                    "TP_LENGTH_002",
                    Category::ExcessiveLength,
                    Severity::Info,
                    "Tool has no description",
                    format!(
                        "Tool '{}' declares no description; agents cannot assess \
                         what it does.",
                        tool.name
                    ),
                )
                .with_confidence(Confidence::High),
            );
            continue;
        }

        if len > WARN_THRESHOLD {
            let severity = if len > HIGH_THRESHOLD {
                Severity::High
            } else {
                Severity::Warning
            };
            absolute_fired[index] = true;
            findings.push(
                Finding::new(
                    "TP_LENGTH_001",
                    Category::ExcessiveLength,
                    severity,
                    "Excessively long tool description",
                    format!(
                        "Tool '{}' description is {len} characters; oversized \
                         descriptions are a common carrier for injected instructions.",
                        tool.name
                    ),
                )
                .with_confidence(Confidence::Medium)
                .with_evidence(format!("description length {len}")),
            );
        }
    }

    if tools.len() >= MIN_TOOLS_FOR_ZSCORE {
        findings.extend(zscore_anomalies(tools, &absolute_fired));
    }

    findings
}

fn zscore_anomalies(tools: &[ToolDefinition], absolute_fired: &[bool]) -> Vec<Finding> {
    let lengths: Vec<f64> = tools.iter().map(|t| t.description.len() as f64).collect();
    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    let variance =
        lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Vec::new();
    }

    tools
        .iter()
        .enumerate()
        .filter(|(index, _)| !absolute_fired[*index])
        .filter_map(|(index, tool)| {
            let z = (lengths[index] - mean) / std_dev;
            if z > ZSCORE_THRESHOLD {
                Some(
                    Finding::new(
                        "TP_LENGTH_003",
                        Category::ExcessiveLength,
                        Severity::Warning,
                        "Description length anomaly",
                        format!(
                            "Tool '{}' description is {:.1} standard deviations longer \
                             than its siblings.",
                            tool.name, z
                        ),
                    )
                    .with_confidence(Confidence::Medium)
                    .with_evidence(format!(
                        "length {} vs batch mean {mean:.0}",
                        tool.description.len()
                    )),
                )
            } else {
                None
            }
        })
        .collect()
}
