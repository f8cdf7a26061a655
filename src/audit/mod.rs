//! LLM audit orchestrator
//!
//! Drives the three-phase audit against the selected provider, the
//! optional adversarial verification pass, and multi-model fan-out
//! with consensus. The orchestrator enforces the response contract
//! only; the phases themselves live in the system prompt.

mod client;
mod consensus;
mod context_window;
mod extract;
mod prompt;
mod providers;
mod verify;

pub use client::{LlmClient, LlmResponse, CALL_TIMEOUT};
pub use consensus::{build_consensus, normalize_title, Consensus, SharedFinding};
pub use context_window::{check_context, context_window, estimate_tokens};
pub use extract::{extract_report, extract_verification, is_report_shaped};
pub use prompt::{audit_system_prompt, build_audit_user_message, verify_system_prompt};
pub use providers::{
    cross_family_model, env_api_key, model_family, provider_by_key, select_provider,
    ProviderDef, ProviderKind, PROVIDERS,
};
pub use verify::{apply_verdict, run_verification, select_for_verification, VerifierVerdict};

use std::time::Instant;

use futures::future::join_all;
use tracing::{info, warn};

use crate::collector::{FileEntry, PackageProfile};
use crate::errors::AuditError;
use crate::report::{
    enrich_report, source_hash, Category, Confidence, Finding, Report, Severity,
    VerificationStatus,
};

/// Output token budget for the primary audit call.
const AUDIT_MAX_TOKENS: u32 = 8_000;

/// How the verification pass picks its model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VerifyMode {
    /// No verification pass.
    #[default]
    Off,
    /// Same model verifies its own findings.
    SelfModel,
    /// A model from a different family verifies.
    Cross,
    /// An explicit verifier model id.
    Model(String),
}

/// Everything one audit needs besides the LLM.
pub struct AuditInput<'a> {
    pub slug: String,
    pub source_url: String,
    pub files: &'a [FileEntry],
    pub profile: &'a PackageProfile,
    pub commit_sha: Option<String>,
    /// Findings already produced by the static stages, in pipeline order.
    pub static_findings: Vec<Finding>,
}

/// Caller-controlled knobs.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub model: Option<String>,
    pub preferred_provider: Option<String>,
    pub verify: VerifyMode,
}

/// Run a single-model audit end to end.
pub async fn audit_package(
    input: &AuditInput<'_>,
    options: &AuditOptions,
) -> Result<Report, AuditError> {
    let (provider, model) = select_provider(
        options.model.as_deref(),
        options.preferred_provider.as_deref(),
        &env_api_key,
    )
    .ok_or_else(AuditError::no_provider)?;
    let client = LlmClient::new(provider, model)?;
    audit_with_client(input, options, &client).await
}

async fn audit_with_client(
    input: &AuditInput<'_>,
    options: &AuditOptions,
    client: &LlmClient,
) -> Result<Report, AuditError> {
    let started = Instant::now();

    let system = audit_system_prompt();
    let user = build_audit_user_message(&input.slug, input.files);
    check_context(client.model(), &system, &user)?;

    info!(
        model = client.model(),
        provider = client.provider().key,
        files = input.files.len(),
        "starting LLM audit"
    );
    let response = client.complete(&system, &user, AUDIT_MAX_TOKENS).await?;

    let value = extract_report(&response.text).ok_or_else(|| AuditError::ProviderParse {
        message: "no report-shaped JSON in model output".to_string(),
        body_preview: response.text.chars().take(2000).collect(),
    })?;

    let mut report = Report::new(&input.slug, &input.source_url);
    report.package_type = input.profile.kind.as_str().to_string();
    report.package_version = input.profile.version.clone();
    report.audit_model = client.model().to_string();
    report.audit_provider = client.provider().key.to_string();
    report.commit_sha = input.commit_sha.clone();
    report.source_hash = source_hash(
        &input
            .files
            .iter()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect::<Vec<_>>(),
    );
    report.input_tokens = response.input_tokens;
    report.output_tokens = response.output_tokens;
    report.output_truncated = response.truncated;
    if response.truncated {
        warn!("model output hit the token ceiling; findings may be partial");
    }

    // Finding order mirrors production order: static stages first,
    // then the LLM's own emission order.
    report.findings = input.static_findings.clone();
    if let Some(items) = value.get("findings").and_then(|f| f.as_array()) {
        report
            .findings
            .extend(items.iter().map(finding_from_value));
    }

    enrich_report(&mut report, input.files);

    match resolve_verifier(&options.verify, client) {
        Ok(Some(verifier)) => {
            let summary = run_verification(&verifier, &mut report.findings, input.files).await;
            report.verification = Some(summary);
            enrich_report(&mut report, input.files);
        }
        Ok(None) => {}
        Err(error) => {
            warn!(%error, "verification pass skipped");
            for finding in &mut report.findings {
                finding.verification_status = VerificationStatus::Unverified;
            }
        }
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    Ok(report)
}

/// Resolve the verifier client for the requested mode, if any.
fn resolve_verifier(
    mode: &VerifyMode,
    scanner: &LlmClient,
) -> Result<Option<LlmClient>, AuditError> {
    match mode {
        VerifyMode::Off => Ok(None),
        VerifyMode::SelfModel => {
            LlmClient::new(scanner.provider(), scanner.model().to_string()).map(Some)
        }
        VerifyMode::Cross => {
            let (provider, model) = cross_family_model(scanner.model(), &env_api_key)
                .ok_or_else(|| AuditError::VerificationUnavailable {
                    message: "no provider outside the scanner's model family has a key"
                        .to_string(),
                })?;
            LlmClient::new(provider, model).map(Some)
        }
        VerifyMode::Model(model) => {
            let (provider, resolved) = select_provider(Some(model), None, &env_api_key)
                .ok_or_else(|| AuditError::VerificationUnavailable {
                    message: format!("no provider can serve verifier model '{model}'"),
                })?;
            LlmClient::new(provider, resolved).map(Some)
        }
    }
}

/// Outcome of a multi-model fan-out.
pub struct MultiAuditOutcome {
    pub reports: Vec<Report>,
    pub failures: Vec<(String, AuditError)>,
    pub consensus: Option<Consensus>,
}

/// Dispatch one audit per model in parallel. Independent failures do
/// not block peers; only a full sweep of failures is an error for the
/// caller (who inspects `reports` vs `failures`).
pub async fn audit_multi(
    input: &AuditInput<'_>,
    models: &[String],
    options: &AuditOptions,
) -> MultiAuditOutcome {
    let runs = models.iter().map(|model| {
        let per_model = AuditOptions {
            model: Some(model.clone()),
            preferred_provider: options.preferred_provider.clone(),
            verify: options.verify.clone(),
        };
        async move { (model.clone(), audit_package(input, &per_model).await) }
    });

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (model, outcome) in join_all(runs).await {
        match outcome {
            Ok(report) => reports.push(report),
            Err(error) => {
                warn!(%model, %error, "model audit failed; continuing with peers");
                failures.push((model, error));
            }
        }
    }

    let consensus = if reports.len() > 1 {
        Some(build_consensus(&reports))
    } else {
        None
    };

    MultiAuditOutcome {
        reports,
        failures,
        consensus,
    }
}

/// Leniently convert one LLM finding object. Out-of-range fields are
/// normalised here and again by the enricher, which is authoritative.
fn finding_from_value(value: &serde_json::Value) -> Finding {
    let text = |key: &str| -> String {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let severity = value
        .get("severity")
        .and_then(|v| v.as_str())
        .and_then(Severity::parse)
        .unwrap_or(Severity::Medium);

    let mut finding = Finding::new(
        non_empty_or(text("pattern_id"), "LLM_FINDING"),
        Category::parse(&non_empty_or(text("category"), "uncategorized")),
        severity,
        non_empty_or(text("title"), "Unnamed finding"),
        text("description"),
    );

    finding.confidence = value
        .get("confidence")
        .and_then(|v| v.as_str())
        .and_then(Confidence::parse)
        .unwrap_or(Confidence::Medium);
    finding.evidence = text("evidence");
    finding.by_design = value
        .get("by_design")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let file = text("file");
    if !file.is_empty() {
        finding.file = Some(file);
    }
    finding.line = value.get("line").and_then(|line| {
        line.as_u64()
            .or_else(|| line.as_str().and_then(|s| s.parse().ok()))
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
    });
    let content = text("content");
    if !content.is_empty() {
        finding.content = Some(content);
    }
    let cwe = text("cwe_id");
    if !cwe.is_empty() {
        finding.cwe_id = Some(cwe);
    }
    let remediation = text("remediation");
    if !remediation.is_empty() {
        finding.remediation = Some(remediation);
    }

    finding.score_impact = if finding.by_design {
        0
    } else {
        severity.score_impact()
    };
    finding
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finding_from_complete_value() {
        let value = json!({
            "pattern_id": "LLM_NET_001",
            "category": "network",
            "severity": "high",
            "confidence": "high",
            "title": "Undisclosed beacon",
            "description": "POSTs usage data on start",
            "evidence": "requests.post(...)",
            "file": "telemetry.py",
            "line": 12,
            "by_design": false
        });
        let finding = finding_from_value(&value);
        assert_eq!(finding.pattern_id, "LLM_NET_001");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.line, Some(12));
        assert_eq!(finding.score_impact, -15);
    }

    #[test]
    fn invalid_severity_defaults_to_medium() {
        let value = json!({"severity": "catastrophic", "title": "x"});
        assert_eq!(finding_from_value(&value).severity, Severity::Medium);
    }

    #[test]
    fn string_line_numbers_are_parsed() {
        let value = json!({"title": "x", "line": "42"});
        assert_eq!(finding_from_value(&value).line, Some(42));
    }

    #[test]
    fn zero_and_garbage_lines_are_dropped() {
        assert_eq!(finding_from_value(&json!({"line": 0})).line, None);
        assert_eq!(finding_from_value(&json!({"line": "abc"})).line, None);
        assert_eq!(finding_from_value(&json!({"line": -3})).line, None);
    }

    #[test]
    fn by_design_zeroes_score_impact() {
        let value = json!({"severity": "critical", "by_design": true, "title": "x"});
        let finding = finding_from_value(&value);
        assert!(finding.by_design);
        assert_eq!(finding.score_impact, 0);
    }

    #[test]
    fn llm_category_tags_survive() {
        let value = json!({"category": "supply-chain", "title": "x"});
        assert_eq!(
            finding_from_value(&value).category.as_str(),
            "supply-chain"
        );
    }
}
