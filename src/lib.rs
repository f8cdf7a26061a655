//! AgentAudit - security scanner for AI-agent packages
//!
//! Ingests an MCP server, agent skill, or related code artifact and
//! produces a structured security report for terminals, CI (SARIF
//! 2.1.0), and the trust registry.
//!
//! # Pipeline
//!
//! - `collector` - bounded, symlink-safe file collection and package
//!   profiling
//! - `poison` - static tool-poisoning detection over MCP tool
//!   definitions
//! - `patterns` - regex rule pack over collected source text
//! - `audit` - three-phase LLM audit, verification pass, multi-model
//!   consensus
//! - `report` - finding enrichment, risk scoring, JSON and SARIF
//!   emission

pub mod audit;
pub mod collector;
pub mod errors;
pub mod mcp;
pub mod patterns;
pub mod poison;
pub mod registry;
pub mod report;
pub mod settings;
pub mod source;

// Re-export the types most callers touch
pub use collector::{collect_files, detect_profile, FileEntry, PackageKind, PackageProfile};
pub use errors::AuditError;
pub use mcp::{InputSchema, SchemaProperty, ToolDefinition};
pub use poison::{scan_tools, RiskLevel, ToolScanReport, ToolScanSummary};
pub use report::{
    enrich_report, to_sarif, AuditResult, Category, Confidence, Finding, Report, Severity,
};
pub use settings::Settings;
