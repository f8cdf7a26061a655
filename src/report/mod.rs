//! Report model - findings, severities, and the audit report
//!
//! Defines the structures shared by every stage of the pipeline: the
//! detectors and the LLM audit produce [`Finding`]s, the enricher
//! normalises them, and the reporter freezes them into a [`Report`].

mod enrich;
mod sarif;

pub use enrich::{enrich_findings, enrich_report, Enricher};
pub use sarif::to_sarif;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Severity level for findings.
///
/// Declared in ascending order so `Ord` ranks `Critical` highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a severity string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warning" | "warn" => Some(Severity::Warning),
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Points this severity subtracts from a perfect score.
    ///
    /// By-design findings override this to zero.
    pub fn score_impact(&self) -> i32 {
        match self {
            Severity::Critical => -25,
            Severity::High => -15,
            Severity::Medium => -5,
            Severity::Low => -1,
            Severity::Warning | Severity::Info => 0,
        }
    }

    /// SARIF `level` for this severity.
    pub fn sarif_level(&self) -> &'static str {
        match self {
            Severity::Critical | Severity::High => "error",
            Severity::Medium | Severity::Warning => "warning",
            Severity::Low | Severity::Info => "note",
        }
    }

    /// GitHub `security-severity` property score.
    pub fn security_severity(&self) -> f64 {
        match self {
            Severity::Critical => 9.5,
            Severity::High => 8.0,
            Severity::Medium | Severity::Warning => 5.5,
            Severity::Low => 2.0,
            Severity::Info => 0.5,
        }
    }

    /// Label for `max_severity`, whose closed set has no warning member.
    /// Warning folds into low.
    pub fn max_severity_label(&self) -> &'static str {
        match self {
            Severity::Warning => "low",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence in a finding.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}

/// Category tag for a finding.
///
/// The static detectors use the closed set; LLM-produced tags that fall
/// outside it are carried verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    HiddenUnicode,
    InstructionInjection,
    ObfuscatedPayload,
    ExcessiveLength,
    CrossToolManipulation,
    Homoglyph,
    SuspiciousUrl,
    SchemaManipulation,
    Injection,
    Secrets,
    Crypto,
    Filesystem,
    Network,
    Privacy,
    Deserialization,
    PromptInjection,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::HiddenUnicode => "hidden_unicode",
            Category::InstructionInjection => "instruction_injection",
            Category::ObfuscatedPayload => "obfuscated_payload",
            Category::ExcessiveLength => "excessive_length",
            Category::CrossToolManipulation => "cross_tool_manipulation",
            Category::Homoglyph => "homoglyph",
            Category::SuspiciousUrl => "suspicious_url",
            Category::SchemaManipulation => "schema_manipulation",
            Category::Injection => "injection",
            Category::Secrets => "secrets",
            Category::Crypto => "crypto",
            Category::Filesystem => "filesystem",
            Category::Network => "network",
            Category::Privacy => "privacy",
            Category::Deserialization => "deserialization",
            Category::PromptInjection => "prompt-injection",
            Category::Other(tag) => tag,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "hidden_unicode" => Category::HiddenUnicode,
            "instruction_injection" => Category::InstructionInjection,
            "obfuscated_payload" => Category::ObfuscatedPayload,
            "excessive_length" => Category::ExcessiveLength,
            "cross_tool_manipulation" => Category::CrossToolManipulation,
            "homoglyph" => Category::Homoglyph,
            "suspicious_url" => Category::SuspiciousUrl,
            "schema_manipulation" => Category::SchemaManipulation,
            "injection" => Category::Injection,
            "secrets" => Category::Secrets,
            "crypto" => Category::Crypto,
            "filesystem" => Category::Filesystem,
            "network" => Category::Network,
            "privacy" => Category::Privacy,
            "deserialization" => Category::Deserialization,
            "prompt-injection" => Category::PromptInjection,
            other => Category::Other(other.to_string()),
        }
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Category::parse(&s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the adversarial verification pass for one finding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// No verification pass has considered this finding.
    #[default]
    Unset,
    /// The verifier confirmed the finding.
    Verified,
    /// The verifier lowered the severity.
    Demoted,
    /// The verifier refuted the finding; it is removed from the report.
    Rejected,
    /// A pass ran but this finding was not individually checked.
    Unverified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unset => "unset",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Demoted => "demoted",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::Unverified => "unverified",
        }
    }
}

/// A single security finding.
///
/// Produced by the tool-poisoning detector, the pattern scanner, or the
/// LLM audit; mutated only by the verification pass and the enricher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Stable identifier, e.g. `TP_INJECT_003` or `CMD_INJECT`.
    pub pattern_id: String,
    pub category: Category,
    pub severity: Severity,
    #[serde(default)]
    pub confidence: Confidence,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Snippet around the match; back-filled by the enricher when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Expected, documented functionality; contributes zero to risk.
    #[serde(default)]
    pub by_design: bool,
    #[serde(default)]
    pub score_impact: i32,
    #[serde(default, skip_serializing_if = "is_unset")]
    pub verification_status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_reasoning: Option<String>,
}

fn is_unset(status: &VerificationStatus) -> bool {
    *status == VerificationStatus::Unset
}

impl Finding {
    pub fn new(
        pattern_id: impl Into<String>,
        category: Category,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            category,
            severity,
            confidence: Confidence::Medium,
            title: title.into(),
            description: description.into(),
            evidence: String::new(),
            file: None,
            line: None,
            content: None,
            cwe_id: None,
            remediation: None,
            by_design: false,
            score_impact: severity.score_impact(),
            verification_status: VerificationStatus::Unset,
            original_severity: None,
            verified_confidence: None,
            verification_reasoning: None,
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_cwe(mut self, cwe: impl Into<String>) -> Self {
        self.cwe_id = Some(cwe.into());
        self
    }
}

/// Overall audit verdict derived from the risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Safe,
    Caution,
    Unsafe,
}

impl AuditResult {
    /// safe <= 25 < caution <= 50 < unsafe
    pub fn from_risk_score(score: u32) -> Self {
        if score <= 25 {
            AuditResult::Safe
        } else if score <= 50 {
            AuditResult::Caution
        } else {
            AuditResult::Unsafe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Safe => "safe",
            AuditResult::Caution => "caution",
            AuditResult::Unsafe => "unsafe",
        }
    }
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tallies from the verification pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub verified: usize,
    pub demoted: usize,
    pub rejected: usize,
    pub unverified: usize,
    pub verifier_model: String,
}

/// The authoritative audit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub skill_slug: String,
    pub source_url: String,
    pub package_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    pub audit_model: String,
    pub audit_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub source_hash: String,
    pub risk_score: u32,
    pub max_severity: String,
    pub result: AuditResult,
    pub findings_count: usize,
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub output_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSummary>,
}

impl Report {
    pub fn new(skill_slug: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            skill_slug: skill_slug.into(),
            source_url: source_url.into(),
            package_type: "unknown".to_string(),
            package_version: None,
            audit_model: String::new(),
            audit_provider: String::new(),
            commit_sha: None,
            source_hash: String::new(),
            risk_score: 0,
            max_severity: "none".to_string(),
            result: AuditResult::Safe,
            findings_count: 0,
            findings: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            output_truncated: false,
            verification: None,
        }
    }

    /// Recompute `risk_score`, `result`, `max_severity`, and
    /// `findings_count` from the current findings list.
    pub fn recompute(&mut self) {
        self.risk_score = risk_score(&self.findings);
        self.result = AuditResult::from_risk_score(self.risk_score);
        self.max_severity = max_severity_label(&self.findings).to_string();
        self.findings_count = self.findings.len();
    }
}

/// risk_score = min(100, sum of |score_impact| over non-by-design findings)
pub fn risk_score(findings: &[Finding]) -> u32 {
    let total: i64 = findings
        .iter()
        .filter(|f| !f.by_design)
        .map(|f| f.score_impact.unsigned_abs() as i64)
        .sum();
    total.min(100) as u32
}

/// Highest severity among findings, or "none". Warning folds into low.
pub fn max_severity_label(findings: &[Finding]) -> &'static str {
    findings
        .iter()
        .map(|f| f.severity)
        .max()
        .map(|s| s.max_severity_label())
        .unwrap_or("none")
}

/// sha-256 over the sorted (path, content) sequence of the collected set.
pub fn source_hash(entries: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = entries.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (path, content) in sorted {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
