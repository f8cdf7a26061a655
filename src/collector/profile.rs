//! Package shape detection
//!
//! Derives the package profile from the collected file set: kind,
//! dominant language, declared version, exposed tool and prompt names,
//! and a suggested entrypoint.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::FileEntry;
use crate::mcp::ToolDefinition;

/// What kind of package this is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    McpServer,
    AgentSkill,
    CliTool,
    Library,
    #[default]
    Unknown,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::McpServer => "mcp-server",
            PackageKind::AgentSkill => "agent-skill",
            PackageKind::CliTool => "cli-tool",
            PackageKind::Library => "library",
            PackageKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of the package under scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageProfile {
    pub kind: PackageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub tools: Vec<String>,
    pub prompts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
}

/// Substrings that mark a file as using an MCP SDK.
const MCP_FINGERPRINTS: &[&str] = &[
    "@modelcontextprotocol/sdk",
    "modelcontextprotocol",
    "from mcp",
    "import mcp",
    "FastMCP",
    "McpServer",
    "mcp.server",
    "CallToolRequestSchema",
    "@mcp.tool",
];

/// Substrings that mark a CLI framework.
const CLI_FINGERPRINTS: &[&str] = &[
    "argparse",
    "import click",
    "from click",
    "commander",
    "yargs",
    "clap::Parser",
    "cobra.Command",
];

/// Identifier noise never reported as a tool or prompt name.
const NAME_BLOCKLIST: &[&str] = &[
    "main", "init", "test", "setup", "run", "app", "server", "client", "index", "name",
    "description", "type", "object", "string", "array", "number", "boolean", "true", "false",
    "self", "tool", "prompt",
];

static TOOL_DECORATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@(?:\w+\.)?tool\s*(?:\([^)]*\))?\s*\n\s*(?:async\s+)?def\s+([A-Za-z_]\w*)"#)
        .unwrap()
});
static TOOL_REGISTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:registerTool|server\.tool|addTool)\(\s*["']([^"']+)["']"#).unwrap()
});
static TOOL_CTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Tool\(\s*name\s*=\s*["']([^"']+)["']"#).unwrap());
static TOOL_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*name:\s*["']([^"']+)["']\s*,\s*description:"#).unwrap()
});

static PROMPT_DECORATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@(?:\w+\.)?prompt\s*(?:\([^)]*\))?\s*\n\s*(?:async\s+)?def\s+([A-Za-z_]\w*)"#)
        .unwrap()
});
static PROMPT_REGISTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:registerPrompt|server\.prompt)\(\s*["']([^"']+)["']"#).unwrap()
});
static PROMPT_CTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Prompt\(\s*name\s*=\s*["']([^"']+)["']"#).unwrap());

/// Manifests searched for a declared version, in precedence order.
static VERSION_SOURCES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "package.json",
            Regex::new(r#""version"\s*:\s*"([^"]+)""#).unwrap(),
        ),
        (
            "pyproject.toml",
            Regex::new(r#"(?m)^version\s*=\s*["']([^"']+)["']"#).unwrap(),
        ),
        (
            "setup.py",
            Regex::new(r#"version\s*=\s*["']([^"']+)["']"#).unwrap(),
        ),
        (
            "setup.cfg",
            Regex::new(r#"(?m)^version\s*=\s*(\S+)"#).unwrap(),
        ),
        (
            "Cargo.toml",
            Regex::new(r#"(?m)^version\s*=\s*"([^"]+)""#).unwrap(),
        ),
    ]
});

const ENTRYPOINT_CANDIDATES: &[&str] = &[
    "server.py",
    "main.py",
    "index.js",
    "index.ts",
    "src/index.ts",
    "src/index.js",
    "src/main.rs",
];

const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("py", "Python"),
    ("js", "JavaScript"),
    ("mjs", "JavaScript"),
    ("cjs", "JavaScript"),
    ("jsx", "JavaScript"),
    ("ts", "TypeScript"),
    ("tsx", "TypeScript"),
    ("rs", "Rust"),
    ("go", "Go"),
    ("rb", "Ruby"),
    ("java", "Java"),
    ("kt", "Kotlin"),
    ("sh", "Shell"),
    ("php", "PHP"),
    ("cs", "C#"),
];

/// Derive the package profile from the collected set.
pub fn detect_profile(files: &[FileEntry]) -> PackageProfile {
    let mcp_files: Vec<&FileEntry> = files
        .iter()
        .filter(|f| MCP_FINGERPRINTS.iter().any(|fp| f.content.contains(fp)))
        .collect();

    let kind = if !mcp_files.is_empty() {
        PackageKind::McpServer
    } else if files
        .iter()
        .any(|f| f.path == "SKILL.md" || f.path.ends_with("/SKILL.md"))
    {
        PackageKind::AgentSkill
    } else if files.iter().any(|f| {
        f.content.starts_with("#!") || CLI_FINGERPRINTS.iter().any(|fp| f.content.contains(fp))
    }) {
        PackageKind::CliTool
    } else if files.is_empty() {
        PackageKind::Unknown
    } else {
        PackageKind::Library
    };

    let mut tools = Vec::new();
    let mut prompts = Vec::new();
    for file in &mcp_files {
        extract_names(
            &file.content,
            &[&TOOL_DECORATOR, &TOOL_REGISTER, &TOOL_CTOR, &TOOL_LITERAL],
            &mut tools,
        );
        extract_names(
            &file.content,
            &[&PROMPT_DECORATOR, &PROMPT_REGISTER, &PROMPT_CTOR],
            &mut prompts,
        );
    }

    PackageProfile {
        kind,
        language: dominant_language(files),
        version: declared_version(files),
        tools,
        prompts,
        entrypoint: ENTRYPOINT_CANDIDATES
            .iter()
            .find(|c| files.iter().any(|f| f.path == **c))
            .map(|c| c.to_string()),
    }
}

static TOOL_DEF_DOCSTRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@(?:\w+\.)?tool\s*(?:\([^)]*\))?\s*\n\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\([^)]*\)(?:\s*->\s*[^:\n]+)?:\s*\n\s*(?:"""|''')([\s\S]*?)(?:"""|''')"#,
    )
    .unwrap()
});
static TOOL_CTOR_DESC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Tool\(\s*name\s*=\s*["']([^"']+)["']\s*,\s*description\s*=\s*["']([^"']+)["']"#)
        .unwrap()
});
static TOOL_LITERAL_DESC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*name:\s*["']([^"']+)["']\s*,\s*description:\s*["']([^"']+)["']"#).unwrap()
});

/// Extract tool definitions (name plus description where the source
/// carries one) from MCP-SDK-bearing files, for the poisoning scan.
pub fn extract_tool_definitions(files: &[FileEntry]) -> Vec<ToolDefinition> {
    let mut tools: Vec<ToolDefinition> = Vec::new();
    let push = |name: &str, description: &str, tools: &mut Vec<ToolDefinition>| {
        if name.len() < 3 || name.len() > 49 {
            return;
        }
        if NAME_BLOCKLIST.contains(&name.to_lowercase().as_str()) {
            return;
        }
        if let Some(existing) = tools.iter_mut().find(|t| t.name == name) {
            if existing.description.is_empty() && !description.is_empty() {
                existing.description = description.trim().to_string();
            }
            return;
        }
        tools.push(ToolDefinition::new(name, description.trim()));
    };

    for file in files {
        if !MCP_FINGERPRINTS.iter().any(|fp| file.content.contains(fp)) {
            continue;
        }
        for captures in TOOL_DEF_DOCSTRING.captures_iter(&file.content) {
            push(&captures[1], &captures[2], &mut tools);
        }
        for captures in TOOL_CTOR_DESC.captures_iter(&file.content) {
            push(&captures[1], &captures[2], &mut tools);
        }
        for captures in TOOL_LITERAL_DESC.captures_iter(&file.content) {
            push(&captures[1], &captures[2], &mut tools);
        }
        // Forms without an adjacent description still register the tool.
        for pattern in [&TOOL_DECORATOR, &TOOL_REGISTER, &TOOL_CTOR, &TOOL_LITERAL] {
            for captures in pattern.captures_iter(&file.content) {
                push(&captures[1], "", &mut tools);
            }
        }
    }
    tools
}

fn extract_names(content: &str, patterns: &[&Regex], out: &mut Vec<String>) {
    for pattern in patterns {
        for captures in pattern.captures_iter(content) {
            let name = &captures[1];
            if name.len() < 3 || name.len() > 49 {
                continue;
            }
            if NAME_BLOCKLIST.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            if !out.iter().any(|existing| existing == name) {
                out.push(name.to_string());
            }
        }
    }
}

/// Extension mode over the collected set, mapped through the fixed
/// language dictionary.
fn dominant_language(files: &[FileEntry]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for file in files {
        if let Some(ext) = file.path.rsplit('.').next() {
            if let Some((_, lang)) = LANGUAGE_MAP.iter().find(|(e, _)| *e == ext) {
                *counts.entry(*lang).or_default() += 1;
            }
        }
    }
    counts
        .into_iter()
        .max_by_key(|(lang, count)| (*count, std::cmp::Reverse(*lang)))
        .map(|(lang, _)| lang.to_string())
}

fn declared_version(files: &[FileEntry]) -> Option<String> {
    for (manifest, pattern) in VERSION_SOURCES.iter() {
        if let Some(file) = files
            .iter()
            .find(|f| f.path == *manifest || f.path.ends_with(&format!("/{manifest}")))
        {
            if let Some(captures) = pattern.captures(&file.content) {
                return Some(captures[1].trim_matches(['"', '\'']).to_string());
            }
        }
    }
    None
}
