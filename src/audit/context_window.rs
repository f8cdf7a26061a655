//! Context-limit guard
//!
//! Estimates input tokens before dispatch and refuses to send a
//! payload the model cannot hold. Lookup is longest-key-first so a
//! specific entry is never shadowed by a shorter prefix.

use tracing::warn;

use crate::errors::AuditError;

/// Known context windows, in tokens. Prefix-matched against model ids.
const CONTEXT_WINDOWS: &[(&str, u64)] = &[
    ("claude-3-5-haiku", 200_000),
    ("claude-3-5-sonnet", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-opus-4", 200_000),
    ("claude", 200_000),
    ("gemini-1.5-pro", 2_097_152),
    ("gemini-1.5-flash", 1_048_576),
    ("gemini-2.0-flash", 1_048_576),
    ("gemini-2.5-pro", 1_048_576),
    ("gemini", 1_048_576),
    ("gpt-4o-mini", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("deepseek-reasoner", 65_536),
    ("deepseek", 65_536),
    ("mistral-large", 131_072),
    ("mistral", 131_072),
    ("grok-3", 131_072),
    ("grok", 131_072),
    ("glm-4-plus", 131_072),
    ("glm", 131_072),
    ("llama-3.3", 131_072),
    ("moonshot-v1-128k", 131_072),
    ("sonar", 127_072),
];

/// Assumed window for models not in the table.
const DEFAULT_WINDOW: u64 = 128_000;
/// Warn when estimated usage crosses this fraction of the window.
const WARN_FRACTION: f64 = 0.9;

/// Context window for a model id, longest matching key first.
pub fn context_window(model: &str) -> u64 {
    let bare = model.rsplit('/').next().unwrap_or(model).to_lowercase();
    let mut best: Option<(&str, u64)> = None;
    for (key, window) in CONTEXT_WINDOWS {
        if bare.starts_with(key) {
            match best {
                Some((best_key, _)) if best_key.len() >= key.len() => {}
                _ => best = Some((key, *window)),
            }
        }
    }
    best.map(|(_, w)| w).unwrap_or(DEFAULT_WINDOW)
}

/// Estimated input tokens: ceil(chars / 3.5).
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as f64;
    (chars / 3.5).ceil() as u64
}

/// Check an input payload against the model's window. Usage above 90%
/// warns; above 100% fails fast without calling the provider.
pub fn check_context(model: &str, system: &str, user: &str) -> Result<u64, AuditError> {
    let window = context_window(model);
    let estimated = estimate_tokens(system) + estimate_tokens(user);

    if estimated > window {
        return Err(AuditError::ContextTooLarge {
            model: model.to_string(),
            message: format!("estimated {estimated} tokens against a {window}-token window"),
            hint: "Scan a subdirectory, or pick a larger-context model with --model."
                .to_string(),
        });
    }
    if estimated as f64 > window as f64 * WARN_FRACTION {
        warn!(
            model,
            estimated,
            window,
            "input payload is above 90% of the model's context window"
        );
    }
    Ok(estimated)
}
