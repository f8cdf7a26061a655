//! Adversarial verification pass
//!
//! A second, narrow LLM pass over the highest-severity findings. The
//! verifier's verdict is applied through fixed decision rules; the
//! orchestrator never trusts the verdict blindly.

use serde::Deserialize;
use tracing::{debug, warn};

use super::client::LlmClient;
use super::extract;
use super::prompt;
use crate::collector::FileEntry;
use crate::report::{Confidence, Finding, Severity, VerificationStatus, VerificationSummary};

/// At most this many findings are individually verified.
pub const MAX_VERIFIED_FINDINGS: usize = 10;

/// Verifier output shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifierVerdict {
    #[serde(default)]
    pub verification_status: String,
    #[serde(default)]
    pub verified_severity: Option<String>,
    #[serde(default)]
    pub verified_confidence: Option<String>,
    #[serde(default = "default_true")]
    pub code_exists: bool,
    #[serde(default = "default_true")]
    pub code_matches_description: bool,
    #[serde(default)]
    pub is_opt_in: bool,
    #[serde(default)]
    pub is_core_functionality: bool,
    #[serde(default)]
    pub attack_scenario: String,
    #[serde(default)]
    pub rejection_reason: String,
    #[serde(default)]
    pub reasoning: String,
}

fn default_true() -> bool {
    true
}

/// Indices of up to ten findings in verification order: severity
/// descending (critical first), position as the tiebreak.
pub fn select_for_verification(findings: &[Finding]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..findings.len()).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(findings[i].severity), i));
    order.truncate(MAX_VERIFIED_FINDINGS);
    order
}

/// Apply the decision rules to one finding. Returns the resulting
/// status; `Rejected` means the caller removes the finding.
pub fn apply_verdict(finding: &mut Finding, verdict: &VerifierVerdict) -> VerificationStatus {
    finding.verified_confidence = verdict
        .verified_confidence
        .as_deref()
        .and_then(Confidence::parse);
    if !verdict.reasoning.is_empty() {
        finding.verification_reasoning = Some(verdict.reasoning.clone());
    }

    // Missing or misdescribed code refutes the finding outright.
    if !verdict.code_exists || !verdict.code_matches_description {
        finding.verification_status = VerificationStatus::Rejected;
        return VerificationStatus::Rejected;
    }

    let was_severe = matches!(finding.severity, Severity::Critical | Severity::High);

    if verdict.is_opt_in && was_severe {
        demote(finding, Severity::Low);
        return VerificationStatus::Demoted;
    }

    if verdict.attack_scenario.trim().is_empty() && was_severe {
        demote(finding, Severity::Medium);
        return VerificationStatus::Demoted;
    }

    // Verified, possibly with a severity adjustment from the verifier.
    if let Some(adjusted) = verdict
        .verified_severity
        .as_deref()
        .and_then(Severity::parse)
    {
        if adjusted != finding.severity {
            finding.original_severity.get_or_insert(finding.severity);
            finding.severity = adjusted;
            finding.score_impact = if finding.by_design {
                0
            } else {
                adjusted.score_impact()
            };
        }
    }
    finding.verification_status = VerificationStatus::Verified;
    VerificationStatus::Verified
}

fn demote(finding: &mut Finding, to: Severity) {
    finding.original_severity.get_or_insert(finding.severity);
    finding.severity = to;
    finding.score_impact = if finding.by_design { 0 } else { to.score_impact() };
    finding.verification_status = VerificationStatus::Demoted;
}

/// Run the verification pass in place. Rejected findings are removed;
/// untouched findings are marked `unverified`.
pub async fn run_verification(
    client: &LlmClient,
    findings: &mut Vec<Finding>,
    files: &[FileEntry],
) -> VerificationSummary {
    let mut summary = VerificationSummary {
        verifier_model: client.model().to_string(),
        ..Default::default()
    };

    let order = select_for_verification(findings);
    let mut rejected_indices: Vec<usize> = Vec::new();

    for index in order {
        let user = prompt::build_verify_user_message(&findings[index], files);
        let system = prompt::verify_system_prompt();

        let verdict = match client.complete(&system, &user, 2_000).await {
            Ok(response) => match extract::extract_verification(&response.text) {
                Some(value) => serde_json::from_value::<VerifierVerdict>(value).ok(),
                None => None,
            },
            Err(error) => {
                warn!(%error, "verification call failed; finding stays unverified");
                None
            }
        };

        let Some(verdict) = verdict else {
            findings[index].verification_status = VerificationStatus::Unverified;
            summary.unverified += 1;
            continue;
        };

        match apply_verdict(&mut findings[index], &verdict) {
            VerificationStatus::Rejected => {
                debug!(
                    pattern_id = %findings[index].pattern_id,
                    reason = %verdict.rejection_reason,
                    "finding rejected by verifier"
                );
                rejected_indices.push(index);
                summary.rejected += 1;
            }
            VerificationStatus::Demoted => summary.demoted += 1,
            _ => summary.verified += 1,
        }
    }

    // Everything the pass never reached keeps status unverified.
    for finding in findings.iter_mut() {
        if finding.verification_status == VerificationStatus::Unset {
            finding.verification_status = VerificationStatus::Unverified;
            summary.unverified += 1;
        }
    }

    rejected_indices.sort_unstable();
    for index in rejected_indices.into_iter().rev() {
        findings.remove(index);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Category;

    fn finding(id: &str, severity: Severity) -> Finding {
        Finding::new(id, Category::Injection, severity, "title", "description")
    }

    #[test]
    fn selection_is_severity_then_position() {
        let findings = vec![
            finding("A", Severity::Medium),
            finding("B", Severity::Critical),
            finding("C", Severity::High),
            finding("D", Severity::Critical),
        ];
        assert_eq!(select_for_verification(&findings), vec![1, 3, 2, 0]);
    }

    #[test]
    fn selection_caps_at_ten() {
        let findings: Vec<Finding> =
            (0..15).map(|_| finding("X", Severity::High)).collect();
        assert_eq!(select_for_verification(&findings).len(), 10);
    }

    #[test]
    fn missing_code_rejects() {
        let mut f = finding("A", Severity::Critical);
        let verdict = VerifierVerdict {
            code_exists: false,
            ..Default::default()
        };
        assert_eq!(apply_verdict(&mut f, &verdict), VerificationStatus::Rejected);
    }

    #[test]
    fn mismatched_description_rejects() {
        let mut f = finding("A", Severity::High);
        let verdict = VerifierVerdict {
            code_exists: true,
            code_matches_description: false,
            ..Default::default()
        };
        assert_eq!(apply_verdict(&mut f, &verdict), VerificationStatus::Rejected);
    }

    #[test]
    fn opt_in_critical_demotes_to_low() {
        let mut f = finding("A", Severity::Critical);
        let verdict = VerifierVerdict {
            code_exists: true,
            code_matches_description: true,
            is_opt_in: true,
            attack_scenario: "plausible".to_string(),
            ..Default::default()
        };
        assert_eq!(apply_verdict(&mut f, &verdict), VerificationStatus::Demoted);
        assert_eq!(f.severity, Severity::Low);
        assert_eq!(f.original_severity, Some(Severity::Critical));
        assert_eq!(f.score_impact, Severity::Low.score_impact());
    }

    #[test]
    fn no_attack_scenario_demotes_severe_to_medium() {
        let mut f = finding("A", Severity::High);
        let verdict = VerifierVerdict {
            code_exists: true,
            code_matches_description: true,
            attack_scenario: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(apply_verdict(&mut f, &verdict), VerificationStatus::Demoted);
        assert_eq!(f.severity, Severity::Medium);
    }

    #[test]
    fn medium_without_scenario_is_still_verified() {
        let mut f = finding("A", Severity::Medium);
        let verdict = VerifierVerdict {
            code_exists: true,
            code_matches_description: true,
            ..Default::default()
        };
        assert_eq!(apply_verdict(&mut f, &verdict), VerificationStatus::Verified);
        assert_eq!(f.severity, Severity::Medium);
    }

    #[test]
    fn verified_with_severity_adjustment() {
        let mut f = finding("A", Severity::Critical);
        let verdict = VerifierVerdict {
            code_exists: true,
            code_matches_description: true,
            attack_scenario: "attacker posts crafted tool output".to_string(),
            verified_severity: Some("high".to_string()),
            verified_confidence: Some("high".to_string()),
            ..Default::default()
        };
        assert_eq!(apply_verdict(&mut f, &verdict), VerificationStatus::Verified);
        assert_eq!(f.severity, Severity::High);
        assert_eq!(f.original_severity, Some(Severity::Critical));
        assert_eq!(f.verified_confidence, Some(Confidence::High));
        assert_eq!(f.score_impact, -15);
    }

    #[test]
    fn existing_original_severity_is_kept_on_second_demotion() {
        let mut f = finding("A", Severity::Critical);
        f.original_severity = Some(Severity::Critical);
        f.severity = Severity::High;
        let verdict = VerifierVerdict {
            code_exists: true,
            code_matches_description: true,
            is_opt_in: true,
            ..Default::default()
        };
        apply_verdict(&mut f, &verdict);
        assert_eq!(f.original_severity, Some(Severity::Critical));
        assert_eq!(f.severity, Severity::Low);
    }
}
