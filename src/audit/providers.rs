//! LLM provider registry
//!
//! Thirteen providers over three wire formats. Selection precedence:
//! explicit model override, then the persisted preferred provider,
//! then the first declared provider with a configured key.

use serde::{Deserialize, Serialize};

/// Wire format a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Anthropic,
    Gemini,
    OpenAiCompatible,
}

/// One provider table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDef {
    /// Human name shown in reports and errors.
    pub name: &'static str,
    /// Stable key used in settings.
    pub key: &'static str,
    /// Environment variable holding the API key.
    pub env_var: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub kind: ProviderKind,
}

/// The provider table, in selection order.
pub const PROVIDERS: &[ProviderDef] = &[
    ProviderDef {
        name: "Anthropic",
        key: "anthropic",
        env_var: "ANTHROPIC_API_KEY",
        base_url: "https://api.anthropic.com",
        default_model: "claude-sonnet-4-20250514",
        kind: ProviderKind::Anthropic,
    },
    ProviderDef {
        name: "OpenAI",
        key: "openai",
        env_var: "OPENAI_API_KEY",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Google Gemini",
        key: "gemini",
        env_var: "GEMINI_API_KEY",
        base_url: "https://generativelanguage.googleapis.com",
        default_model: "gemini-2.0-flash",
        kind: ProviderKind::Gemini,
    },
    ProviderDef {
        name: "OpenRouter",
        key: "openrouter",
        env_var: "OPENROUTER_API_KEY",
        base_url: "https://openrouter.ai/api/v1",
        default_model: "anthropic/claude-sonnet-4",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "DeepSeek",
        key: "deepseek",
        env_var: "DEEPSEEK_API_KEY",
        base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Mistral",
        key: "mistral",
        env_var: "MISTRAL_API_KEY",
        base_url: "https://api.mistral.ai/v1",
        default_model: "mistral-large-latest",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "xAI",
        key: "xai",
        env_var: "XAI_API_KEY",
        base_url: "https://api.x.ai/v1",
        default_model: "grok-3",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Groq",
        key: "groq",
        env_var: "GROQ_API_KEY",
        base_url: "https://api.groq.com/openai/v1",
        default_model: "llama-3.3-70b-versatile",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Together",
        key: "together",
        env_var: "TOGETHER_API_KEY",
        base_url: "https://api.together.xyz/v1",
        default_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Fireworks",
        key: "fireworks",
        env_var: "FIREWORKS_API_KEY",
        base_url: "https://api.fireworks.ai/inference/v1",
        default_model: "accounts/fireworks/models/llama-v3p3-70b-instruct",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Zhipu",
        key: "zhipu",
        env_var: "ZHIPU_API_KEY",
        base_url: "https://open.bigmodel.cn/api/paas/v4",
        default_model: "glm-4-plus",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Moonshot",
        key: "moonshot",
        env_var: "MOONSHOT_API_KEY",
        base_url: "https://api.moonshot.cn/v1",
        default_model: "moonshot-v1-128k",
        kind: ProviderKind::OpenAiCompatible,
    },
    ProviderDef {
        name: "Perplexity",
        key: "perplexity",
        env_var: "PERPLEXITY_API_KEY",
        base_url: "https://api.perplexity.ai",
        default_model: "sonar",
        kind: ProviderKind::OpenAiCompatible,
    },
];

/// Model-name prefixes that identify a native provider.
const MODEL_PREFIXES: &[(&str, &str)] = &[
    ("claude", "anthropic"),
    ("gemini", "gemini"),
    ("gpt", "openai"),
    ("deepseek", "deepseek"),
    ("mistral", "mistral"),
    ("grok", "xai"),
    ("glm", "zhipu"),
];

pub fn provider_by_key(key: &str) -> Option<&'static ProviderDef> {
    PROVIDERS.iter().find(|p| p.key == key)
}

fn openrouter() -> &'static ProviderDef {
    provider_by_key("openrouter").expect("openrouter is in the table")
}

/// Resolve the active provider and model.
///
/// `env` abstracts environment lookup so selection stays testable;
/// production callers pass [`env_api_key`].
pub fn select_provider(
    model_override: Option<&str>,
    preferred: Option<&str>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<(&'static ProviderDef, String)> {
    let has_key = |p: &ProviderDef| env(p.env_var).map(|k| !k.is_empty()).unwrap_or(false);

    if let Some(model) = model_override {
        // A slash means a routed model id; those always go to OpenRouter.
        if model.contains('/') {
            return Some((openrouter(), model.to_string()));
        }
        for (prefix, key) in MODEL_PREFIXES {
            if model.to_lowercase().starts_with(prefix) {
                let native = provider_by_key(key).expect("prefix table keys exist");
                if has_key(native) {
                    return Some((native, model.to_string()));
                }
                return Some((openrouter(), model.to_string()));
            }
        }
        return Some((openrouter(), model.to_string()));
    }

    if let Some(preferred_key) = preferred {
        if let Some(provider) = provider_by_key(preferred_key) {
            if has_key(provider) {
                return Some((provider, provider.default_model.to_string()));
            }
        }
    }

    PROVIDERS
        .iter()
        .find(|p| has_key(p))
        .map(|p| (p, p.default_model.to_string()))
}

/// Environment-backed key lookup for production use.
pub fn env_api_key(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// The family a model id belongs to, for cross-verification. Two
/// models share a family when their ids share a known prefix.
pub fn model_family(model: &str) -> Option<&'static str> {
    let bare = model.rsplit('/').next().unwrap_or(model).to_lowercase();
    MODEL_PREFIXES
        .iter()
        .find(|(prefix, _)| bare.starts_with(prefix))
        .map(|(prefix, _)| *prefix)
}

/// Pick a verifier model from a different family than `scanner_model`,
/// restricted to providers with configured keys.
pub fn cross_family_model(
    scanner_model: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<(&'static ProviderDef, String)> {
    let scanner_family = model_family(scanner_model);
    PROVIDERS
        .iter()
        .filter(|p| env(p.env_var).map(|k| !k.is_empty()).unwrap_or(false))
        .find(|p| {
            let family = model_family(p.default_model);
            family.is_none() || family != scanner_family
        })
        .map(|p| (p, p.default_model.to_string()))
}
