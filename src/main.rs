//! AgentAudit - security scanner for AI-agent packages
//!
//! Scans MCP servers, agent skills, and related code artifacts for
//! tool poisoning and vulnerable patterns, optionally driving an
//! LLM audit, and emits terminal, JSON, or SARIF reports.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use agentaudit::audit::{audit_multi, audit_package, AuditInput, AuditOptions, VerifyMode, PROVIDERS};
use agentaudit::errors::AuditError;
use agentaudit::patterns::{self, PATTERN_RULES};
use agentaudit::poison::{self, INJECTION_PATTERNS};
use agentaudit::report::{self, source_hash, Finding, Report, Severity};
use agentaudit::settings::Settings;
use agentaudit::source::{fetch_source, parse_source};
use agentaudit::{collect_files, collector, registry};

/// AgentAudit - security scanner for AI-agent packages
#[derive(Parser)]
#[command(
    name = "agentaudit",
    version,
    about = "Security scanner for MCP servers and agent skills",
    long_about = "AgentAudit ingests an agent package (git URL, local path, or \
                  owner/repo reference), runs static tool-poisoning and pattern \
                  analysis, and can drive a multi-phase LLM audit with an \
                  adversarial verification pass.\n\n\
                  Exit codes: 0 clean, 1 findings retained, 2 error."
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug mode: verbose logs plus raw-body previews on parse errors
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Sarif,
}

#[derive(Subcommand)]
enum Commands {
    /// Full LLM-driven audit of one or more packages
    Audit {
        /// Sources: git URLs, local paths, or owner/repo references
        #[arg(required = true)]
        sources: Vec<String>,

        /// Model override (slash-form ids route through OpenRouter)
        #[arg(long)]
        model: Option<String>,

        /// Comma-separated model list for multi-model consensus
        #[arg(long, value_delimiter = ',')]
        models: Option<Vec<String>>,

        /// Verification mode: self, cross, or an explicit model id
        #[arg(long, num_args = 0..=1, default_missing_value = "self")]
        verify: Option<String>,

        /// Skip the verification pass
        #[arg(long, conflicts_with = "verify")]
        no_verify: bool,

        /// Do not upload the report to the registry
        #[arg(long)]
        no_upload: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit 1 only for findings at these severities (e.g. critical,high)
        #[arg(long, value_delimiter = ',')]
        fail_on: Option<Vec<String>>,
    },

    /// Static scan only (collection + pattern rules, no LLM)
    Scan {
        /// Source: git URL, local path, or owner/repo reference
        source: String,

        /// Forward to a full LLM audit
        #[arg(long)]
        deep: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Query the trust registry for a published audit
    Lookup {
        /// Package name
        name: String,
    },

    /// List MCP endpoints configured on this machine
    Discover,

    /// List the LLM provider table and configured keys
    Providers,

    /// List the static rule packs
    Rules,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime construction");
    match runtime.block_on(run(&cli)) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            report_error(&error, cli.debug);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("agentaudit={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<u8, AuditError> {
    let settings = Settings::load();

    match &cli.command {
        Commands::Audit {
            sources,
            model,
            models,
            verify,
            no_verify,
            no_upload,
            output,
            fail_on,
        } => {
            let verify_mode = if *no_verify {
                VerifyMode::Off
            } else {
                match verify.as_deref() {
                    None | Some("self") => VerifyMode::SelfModel,
                    Some("cross") => VerifyMode::Cross,
                    Some(other) => VerifyMode::Model(other.to_string()),
                }
            };
            let options = AuditOptions {
                model: model.clone().or_else(|| settings.default_model.clone()),
                preferred_provider: settings.preferred_provider.clone(),
                verify: verify_mode,
            };
            let fail_on = parse_fail_on(fail_on.as_deref())?;

            // Independent sources are processed independently; one
            // failure does not abandon the rest.
            let mut worst = 0u8;
            for source in sources {
                match audit_one(
                    cli,
                    source,
                    &options,
                    models.as_deref(),
                    &settings,
                    *no_upload,
                    output.as_deref(),
                    &fail_on,
                )
                .await
                {
                    Ok(code) => worst = worst.max(code),
                    Err(error) => {
                        report_error(&error, cli.debug);
                        worst = 2;
                    }
                }
            }
            Ok(worst)
        }

        Commands::Scan { source, deep, output } => {
            if *deep {
                let options = AuditOptions {
                    model: settings.default_model.clone(),
                    preferred_provider: settings.preferred_provider.clone(),
                    verify: VerifyMode::SelfModel,
                };
                return audit_one(cli, source, &options, None, &settings, true, output.as_deref(), &None)
                    .await;
            }
            scan_one(cli, source, output.as_deref()).await
        }

        Commands::Lookup { name } => {
            let base = settings.registry_url.ok_or_else(|| {
                AuditError::input_with_hint(
                    "no registry configured",
                    "Set AGENTAUDIT_REGISTRY_URL or registry_url in settings.json.",
                )
            })?;
            let value = registry::lookup(&base, name).await?;
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            Ok(0)
        }

        Commands::Discover => {
            discover();
            Ok(0)
        }

        Commands::Providers => {
            print_providers();
            Ok(0)
        }

        Commands::Rules => {
            print_rules();
            Ok(0)
        }
    }
}

/// Collected source plus the static-stage findings.
struct Gathered {
    fetched: agentaudit::source::FetchedSource,
    source: agentaudit::source::SourceRef,
    files: Vec<agentaudit::FileEntry>,
    profile: agentaudit::PackageProfile,
    /// Tool-poisoning findings (C2); audits only.
    poison_findings: Vec<Finding>,
    /// Pattern-rule findings (C3); both scan and audit.
    pattern_findings: Vec<Finding>,
}

/// Collect, profile, and run the static stages for one source.
async fn gather(source_arg: &str) -> Result<Gathered, AuditError> {
    let source = parse_source(source_arg)?;
    let fetched = fetch_source(&source).await?;
    let files = collect_files(&fetched.root);
    let profile = collector::detect_profile(&files);

    let tools = collector::extract_tool_definitions(&files);
    let poison_findings = poison::scan_tools(&tools).findings;
    let pattern_findings = patterns::scan_files(&files);

    Ok(Gathered {
        fetched,
        source,
        files,
        profile,
        poison_findings,
        pattern_findings,
    })
}

#[allow(clippy::too_many_arguments)]
async fn audit_one(
    cli: &Cli,
    source_arg: &str,
    options: &AuditOptions,
    models: Option<&[String]>,
    settings: &Settings,
    no_upload: bool,
    output: Option<&std::path::Path>,
    fail_on: &Option<Vec<Severity>>,
) -> Result<u8, AuditError> {
    let gathered = gather(source_arg).await?;
    let mut static_findings = gathered.poison_findings;
    static_findings.extend(gathered.pattern_findings);

    let input = AuditInput {
        slug: gathered.source.slug(),
        source_url: gathered.source.url(),
        files: &gathered.files,
        profile: &gathered.profile,
        commit_sha: gathered.fetched.commit_sha.clone(),
        static_findings,
    };

    let outcome = match models {
        Some(models) if models.len() > 1 => {
            let multi = audit_multi(&input, models, options).await;
            if multi.reports.is_empty() {
                gathered.fetched.cleanup();
                let (_, error) = multi
                    .failures
                    .into_iter()
                    .next()
                    .expect("no reports implies at least one failure");
                return Err(error);
            }
            if let Some(consensus) = &multi.consensus {
                if !cli.quiet && cli.format == OutputFormat::Text {
                    print_consensus(consensus);
                }
            }
            multi.reports
        }
        Some(models) if models.len() == 1 => {
            let single = AuditOptions {
                model: Some(models[0].clone()),
                ..options.clone()
            };
            vec![audit_package(&input, &single).await?]
        }
        _ => vec![audit_package(&input, options).await?],
    };
    gathered.fetched.cleanup();

    let mut worst = 0u8;
    for report in &outcome {
        emit_report(cli, report, output)?;
        if let Some(base) = &settings.registry_url {
            if !no_upload {
                if let Err(error) = registry::upload(base, report).await {
                    report_error(&error, cli.debug);
                }
            }
        }
        worst = worst.max(exit_for(report, fail_on));
    }
    Ok(worst)
}

async fn scan_one(
    cli: &Cli,
    source_arg: &str,
    output: Option<&std::path::Path>,
) -> Result<u8, AuditError> {
    let gathered = gather(source_arg).await?;
    gathered.fetched.cleanup();

    let mut report = Report::new(gathered.source.slug(), gathered.source.url());
    report.package_type = gathered.profile.kind.as_str().to_string();
    report.package_version = gathered.profile.version.clone();
    report.audit_model = "static".to_string();
    report.audit_provider = "none".to_string();
    report.commit_sha = gathered.fetched.commit_sha.clone();
    report.source_hash = source_hash(
        &gathered
            .files
            .iter()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect::<Vec<_>>(),
    );
    report.findings = gathered.pattern_findings;
    report::enrich_report(&mut report, &gathered.files);

    emit_report(cli, &report, output)?;
    Ok(exit_for(&report, &None))
}

fn emit_report(
    cli: &Cli,
    report: &Report,
    output: Option<&std::path::Path>,
) -> Result<(), AuditError> {
    let rendered = match cli.format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| AuditError::input(format!("report serialization failed: {e}")))?,
        OutputFormat::Sarif => serde_json::to_string_pretty(&report::to_sarif(report))
            .map_err(|e| AuditError::input(format!("SARIF serialization failed: {e}")))?,
        OutputFormat::Text => {
            if !cli.quiet {
                print_text_report(report);
            }
            return Ok(());
        }
    };

    match output {
        Some(path) => std::fs::write(path, rendered)
            .map_err(|e| AuditError::input(format!("cannot write {}: {e}", path.display()))),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}

fn print_text_report(report: &Report) {
    println!("{}", "Audit Report".cyan().bold());
    println!("{}", "=".repeat(60));
    println!("  Package: {} ({})", report.skill_slug.yellow(), report.package_type);
    if let Some(version) = &report.package_version {
        println!("  Version: {version}");
    }
    if report.audit_model != "static" {
        println!("  Model: {} via {}", report.audit_model, report.audit_provider);
    }
    println!("  Source hash: {}", &report.source_hash[..16.min(report.source_hash.len())]);
    println!();

    if report.findings.is_empty() {
        println!("{}", "  No findings ✓".green().bold());
    } else {
        for finding in &report.findings {
            let severity = match finding.severity {
                Severity::Critical => "CRITICAL".red().bold(),
                Severity::High => "HIGH".red(),
                Severity::Medium => "MEDIUM".yellow(),
                Severity::Warning => "WARNING".yellow(),
                Severity::Low => "LOW".blue(),
                Severity::Info => "INFO".dimmed(),
            };
            println!("  [{}] {} ({})", severity, finding.title, finding.pattern_id.dimmed());
            if let (Some(file), Some(line)) = (&finding.file, finding.line) {
                println!("    at {}:{}", file.cyan(), line);
            }
            if finding.by_design {
                println!("    {}", "by design - excluded from score".dimmed());
            }
            if !finding.evidence.is_empty() {
                println!("    evidence: {}", finding.evidence.dimmed());
            }
            if let Some(remediation) = &finding.remediation {
                println!("    fix: {}", remediation.green());
            }
            println!();
        }
    }

    println!("{}", "─".repeat(60));
    let result = match report.result {
        agentaudit::AuditResult::Safe => report.result.as_str().green().bold(),
        agentaudit::AuditResult::Caution => report.result.as_str().yellow().bold(),
        agentaudit::AuditResult::Unsafe => report.result.as_str().red().bold(),
    };
    println!(
        "Result: {} (risk {}/100, max severity {}, {} finding(s))",
        result, report.risk_score, report.max_severity, report.findings_count
    );
    if report.output_truncated {
        println!("{}", "Model output was truncated; findings may be partial.".yellow());
    }
    if let Some(verification) = &report.verification {
        println!(
            "Verification by {}: {} verified, {} demoted, {} rejected, {} unverified",
            verification.verifier_model,
            verification.verified,
            verification.demoted,
            verification.rejected,
            verification.unverified
        );
    }
}

fn print_consensus(consensus: &agentaudit::audit::Consensus) {
    println!("{}", "Consensus".cyan().bold());
    println!(
        "  Risk: min {} / mean {:.1} / max {}",
        consensus.risk_min, consensus.risk_mean, consensus.risk_max
    );
    match &consensus.unanimous_severity {
        Some(severity) => println!("  Max severity: {severity} (unanimous)"),
        None => {
            for (model, severity) in &consensus.severity_by_model {
                println!("  {model}: {severity}");
            }
        }
    }
    for shared in &consensus.shared {
        println!(
            "  {} {} ({})",
            "shared:".green(),
            shared.title,
            shared.models.join(", ")
        );
    }
    for (model, titles) in &consensus.unique_by_model {
        for title in titles {
            println!("  {} {title} ({model})", "unique:".dimmed());
        }
    }
    println!();
}

fn print_providers() {
    println!("{}", "LLM Providers".cyan().bold());
    for provider in PROVIDERS {
        let configured = std::env::var(provider.env_var)
            .map(|k| !k.is_empty())
            .unwrap_or(false);
        let status = if configured {
            "configured".green()
        } else {
            "no key".dimmed()
        };
        println!(
            "  {:<14} {:<22} {:<42} [{}]",
            provider.key, provider.env_var, provider.default_model, status
        );
    }
}

fn print_rules() {
    println!("{}", "Tool-poisoning patterns".cyan().bold());
    for pattern in INJECTION_PATTERNS.iter() {
        println!(
            "  {:<16} {:<8} {}",
            pattern.id,
            pattern.severity.as_str(),
            pattern.title
        );
    }
    println!();
    println!("{}", "Source patterns".cyan().bold());
    for rule in PATTERN_RULES.iter() {
        println!(
            "  {:<18} {:<8} {:<16} {}",
            rule.id,
            rule.severity.as_str(),
            rule.category.as_str(),
            rule.title
        );
    }
}

/// Well-known MCP client config locations.
fn discover() {
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        println!("HOME is not set; nothing to discover.");
        return;
    };
    let candidates = [
        home.join(".config/Claude/claude_desktop_config.json"),
        home.join("Library/Application Support/Claude/claude_desktop_config.json"),
        home.join(".cursor/mcp.json"),
        home.join(".codeium/windsurf/mcp_config.json"),
    ];

    let mut found = false;
    for path in candidates {
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
            continue;
        };
        if let Some(servers) = value.get("mcpServers").and_then(|s| s.as_object()) {
            found = true;
            println!("{}", path.display().to_string().cyan());
            for (name, entry) in servers {
                let command = entry.get("command").and_then(|c| c.as_str()).unwrap_or("?");
                println!("  {name}: {command}");
            }
        }
    }
    if !found {
        println!("No MCP endpoints found in known config locations.");
    }
}

fn parse_fail_on(raw: Option<&[String]>) -> Result<Option<Vec<Severity>>, AuditError> {
    let Some(raw) = raw else { return Ok(None) };
    let mut severities = Vec::new();
    for item in raw {
        let severity = Severity::parse(item).ok_or_else(|| {
            AuditError::input_with_hint(
                format!("unknown severity '{item}' in --fail-on"),
                "Valid severities: critical, high, medium, low, warning, info.",
            )
        })?;
        severities.push(severity);
    }
    Ok(Some(severities))
}

/// 0 clean, 1 findings retained (filtered by --fail-on when given).
fn exit_for(report: &Report, fail_on: &Option<Vec<Severity>>) -> u8 {
    let triggering = match fail_on {
        Some(severities) => report
            .findings
            .iter()
            .any(|f| severities.contains(&f.severity)),
        None => !report.findings.is_empty(),
    };
    u8::from(triggering)
}

fn report_error(error: &AuditError, debug: bool) {
    eprintln!("{} {}", "error:".red().bold(), error);
    if let Some(hint) = error.hint() {
        eprintln!("  {} {}", "hint:".yellow(), hint);
    }
    if debug {
        if let AuditError::ProviderParse { body_preview, .. } = error {
            eprintln!("  raw body preview:\n{body_preview}");
        }
    }
}
