//! Error taxonomy
//!
//! Errors are values of a closed taxonomy, not exceptions that unwind
//! arbitrary state. Every variant carries a message and, where one
//! exists, an actionable hint printed alongside the single-line error.

use thiserror::Error;

/// Main error type for the audit pipeline.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Malformed URL, missing argument, unsupported format. Exit 2.
    #[error("invalid input: {message}")]
    Input { message: String, hint: Option<String> },

    /// Subprocess or network failure while fetching a source. Exit 2.
    #[error("fetch failed: {message}")]
    Fetch { message: String, hint: Option<String> },

    /// Provider rejected the API key.
    #[error("provider auth error ({provider}): {message}")]
    ProviderAuth {
        provider: String,
        message: String,
        hint: String,
    },

    /// Provider rate limit hit. Retryable in principle; not auto-retried.
    #[error("provider rate limit ({provider}): {message}")]
    ProviderRateLimit {
        provider: String,
        message: String,
        hint: String,
    },

    /// The requested model does not exist on the provider.
    #[error("model not found ({provider}): {model}")]
    ModelNotFound {
        provider: String,
        model: String,
        hint: String,
    },

    /// Input exceeds the model's context window. Detected before or
    /// reported by the provider; never sent twice.
    #[error("context too large for {model}: {message}")]
    ContextTooLarge {
        model: String,
        message: String,
        hint: String,
    },

    /// Provider-side 5xx. Retryable in principle; not auto-retried.
    #[error("provider server error ({provider}): {message}")]
    ProviderServer {
        provider: String,
        message: String,
        hint: String,
    },

    /// The model's response is not valid JSON in any extraction mode.
    #[error("failed to parse model response: {message}")]
    ProviderParse {
        message: String,
        /// First 2000 chars of the raw body; printed only with --debug.
        body_preview: String,
    },

    /// No provider has a configured API key.
    #[error("no LLM provider configured")]
    NoProvider { hint: String },

    /// Verifier provider missing; the pass is skipped, not fatal.
    #[error("verification unavailable: {message}")]
    VerificationUnavailable { message: String },
}

impl AuditError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            hint: None,
        }
    }

    pub fn input_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
            hint: None,
        }
    }

    pub fn no_provider() -> Self {
        Self::NoProvider {
            hint: "Set one of the provider API key variables, e.g. \
                   export ANTHROPIC_API_KEY=<key>. Run `agentaudit providers` \
                   to list all thirteen."
                .to_string(),
        }
    }

    /// The hint to print under the error line, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            AuditError::Input { hint, .. } | AuditError::Fetch { hint, .. } => hint.as_deref(),
            AuditError::ProviderAuth { hint, .. }
            | AuditError::ProviderRateLimit { hint, .. }
            | AuditError::ModelNotFound { hint, .. }
            | AuditError::ContextTooLarge { hint, .. }
            | AuditError::ProviderServer { hint, .. }
            | AuditError::NoProvider { hint } => Some(hint),
            AuditError::ProviderParse { .. } | AuditError::VerificationUnavailable { .. } => None,
        }
    }

    /// Retryable in principle (the orchestrator still does not auto-retry).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuditError::ProviderRateLimit { .. } | AuditError::ProviderServer { .. }
        )
    }
}

/// Map an HTTP status plus body to the provider error taxonomy.
pub fn map_provider_error(provider: &str, model: &str, status: u16, body: &str) -> AuditError {
    let lower = body.to_lowercase();

    if status == 401 || status == 403 {
        return AuditError::ProviderAuth {
            provider: provider.to_string(),
            message: format!("HTTP {status}"),
            hint: format!("Check that the API key for {provider} is valid and not expired."),
        };
    }

    if status == 429 {
        return AuditError::ProviderRateLimit {
            provider: provider.to_string(),
            message: "rate limit exceeded".to_string(),
            hint: "Wait a minute and retry, or switch providers with --model.".to_string(),
        };
    }

    if status == 404
        || lower.contains("model_not_found")
        || lower.contains("model not found")
        || lower.contains("does not exist")
    {
        return AuditError::ModelNotFound {
            provider: provider.to_string(),
            model: model.to_string(),
            hint: "Run `agentaudit providers` for each provider's default model id.".to_string(),
        };
    }

    if status == 400
        && (lower.contains("context")
            || lower.contains("too long")
            || lower.contains("maximum length")
            || lower.contains("token limit"))
    {
        return AuditError::ContextTooLarge {
            model: model.to_string(),
            message: format!("HTTP {status}"),
            hint: "The package is too large for this model. Try a larger-context \
                   model or scan a subdirectory."
                .to_string(),
        };
    }

    if status >= 500 {
        return AuditError::ProviderServer {
            provider: provider.to_string(),
            message: format!("HTTP {status}"),
            hint: "Provider-side failure. Retry shortly or switch providers.".to_string(),
        };
    }

    AuditError::ProviderServer {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {}", truncate(body, 200)),
        hint: "Unexpected provider response.".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_maps_to_auth() {
        let err = map_provider_error("Anthropic", "claude-x", 401, "unauthorized");
        assert!(matches!(err, AuditError::ProviderAuth { .. }));
        assert!(err.hint().is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_429_maps_to_rate_limit_and_is_retryable() {
        let err = map_provider_error("OpenAI", "gpt-4o", 429, "slow down");
        assert!(matches!(err, AuditError::ProviderRateLimit { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn model_not_found_by_body_substring() {
        let err = map_provider_error(
            "OpenRouter",
            "nope/nope",
            400,
            r#"{"error": {"code": "model_not_found"}}"#,
        );
        assert!(matches!(err, AuditError::ModelNotFound { .. }));
    }

    #[test]
    fn context_too_large_by_body_substring() {
        let err = map_provider_error(
            "Anthropic",
            "claude-x",
            400,
            "prompt is too long: exceeds maximum length",
        );
        assert!(matches!(err, AuditError::ContextTooLarge { .. }));
    }

    #[test]
    fn status_500_maps_to_server() {
        let err = map_provider_error("Gemini", "gemini-2.0-flash", 503, "overloaded");
        assert!(matches!(err, AuditError::ProviderServer { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn error_display_is_single_line() {
        let err = AuditError::input("bad url");
        assert!(!err.to_string().contains('\n'));
    }
}
