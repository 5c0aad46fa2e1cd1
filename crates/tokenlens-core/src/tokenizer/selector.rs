//! Tokenizer policy selection
//!
//! Scans the turn sequence newest-first and picks one policy for the
//! whole analysis: the most recent turn's model is what the session is
//! currently billed under. This is a priority cascade, not a best-effort
//! search; the first satisfied rule is authoritative.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::TokenizerPolicy;
use crate::models::Turn;

/// Providers whose model names tiktoken understands directly
static OPENAI_COMPATIBLE_PROVIDERS: &[&str] = &["openai", "azure", "azure-openai", "github-copilot"];

/// Model-id aliases mapped to canonical tiktoken model names
static OPENAI_MODEL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("gpt-4o", "gpt-4o"),
        ("gpt-4o-mini", "gpt-4o-mini"),
        ("gpt-4.1", "gpt-4o"),
        ("gpt-4.1-mini", "gpt-4o-mini"),
        ("gpt-4-turbo", "gpt-4-turbo"),
        ("gpt-4", "gpt-4"),
        ("gpt-3.5-turbo", "gpt-3.5-turbo"),
        ("o1", "o1"),
        ("o1-mini", "o1-mini"),
        ("o3", "o1"),
        ("o3-mini", "o1-mini"),
        ("o4-mini", "o1-mini"),
    ])
});

/// Known model ids mapped to transformer-hub tokenizer repos
static HUB_MODEL_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("claude-3-5-sonnet", "Xenova/claude-tokenizer"),
        ("claude-3-5-haiku", "Xenova/claude-tokenizer"),
        ("claude-3-opus", "Xenova/claude-tokenizer"),
        ("gemini-1.5-pro", "Xenova/gemma-tokenizer"),
        ("gemini-1.5-flash", "Xenova/gemma-tokenizer"),
        ("gemini-2.0-flash", "Xenova/gemma-tokenizer"),
        ("grok-2", "Xenova/grok-1-tokenizer"),
        ("grok-3", "Xenova/grok-1-tokenizer"),
    ])
});

/// Default hub repo per provider, for models absent from the alias table
static PROVIDER_DEFAULT_HUBS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("anthropic", "Xenova/claude-tokenizer"),
        ("google", "Xenova/gemma-tokenizer"),
        ("meta", "Xenova/llama-3-tokenizer"),
        ("mistral", "Xenova/mistral-tokenizer-v3"),
        ("deepseek", "deepseek-ai/DeepSeek-V3"),
        ("xai", "Xenova/grok-1-tokenizer"),
    ])
});

/// Ordered model-name prefix rules, tried last
static PREFIX_RULES: &[(&str, &str)] = &[
    ("claude", "Xenova/claude-tokenizer"),
    ("llama", "Xenova/llama-3-tokenizer"),
    ("mistral", "Xenova/mistral-tokenizer-v3"),
    ("deepseek", "deepseek-ai/DeepSeek-V3"),
];

/// Strip a `provider/` prefix, lowercase and trim a model identifier
fn canonicalize(id: &str) -> String {
    let id = id.trim();
    let id = match id.split_once('/') {
        Some((_, rest)) => rest,
        None => id,
    };
    id.trim().to_lowercase()
}

/// Evaluate the cascade for a single turn's identifiers
fn policy_for_identity(provider: Option<&str>, model: Option<&str>) -> Option<TokenizerPolicy> {
    let provider = provider.map(|p| p.trim().to_lowercase());
    let model = model.map(canonicalize);

    // Rule 1: OpenAI-compatible provider or known OpenAI alias
    if let Some(model) = model.as_deref() {
        let provider_is_openai = provider
            .as_deref()
            .is_some_and(|p| OPENAI_COMPATIBLE_PROVIDERS.contains(&p));
        if provider_is_openai {
            let mapped = OPENAI_MODEL_ALIASES.get(model).copied().unwrap_or(model);
            return Some(TokenizerPolicy::OpenAi {
                model: mapped.to_string(),
            });
        }
        if let Some(mapped) = OPENAI_MODEL_ALIASES.get(model) {
            return Some(TokenizerPolicy::OpenAi {
                model: (*mapped).to_string(),
            });
        }
    }

    // Rule 2: hub alias table, then provider default hub
    if let Some(model) = model.as_deref() {
        if let Some(repo) = HUB_MODEL_ALIASES.get(model) {
            return Some(TokenizerPolicy::Hub {
                repo: (*repo).to_string(),
            });
        }
    }
    if let Some(provider) = provider.as_deref() {
        if let Some(repo) = PROVIDER_DEFAULT_HUBS.get(provider) {
            return Some(TokenizerPolicy::Hub {
                repo: (*repo).to_string(),
            });
        }
    }

    // Rule 3: ordered prefix rules
    if let Some(model) = model.as_deref() {
        for (prefix, repo) in PREFIX_RULES {
            if model.starts_with(prefix) {
                return Some(TokenizerPolicy::Hub {
                    repo: (*repo).to_string(),
                });
            }
        }
    }

    None
}

/// Pick the tokenizer policy for an analysis
///
/// Scans turns newest-first; the first turn whose provider/model
/// identity satisfies a rule decides the policy. Sessions with no
/// recognizable identity count approximately.
pub fn select_policy(turns: &[Turn]) -> TokenizerPolicy {
    for turn in turns.iter().rev() {
        let Some(telemetry) = &turn.telemetry else {
            continue;
        };
        if let Some(policy) =
            policy_for_identity(telemetry.provider_id.as_deref(), telemetry.model_id.as_deref())
        {
            return policy;
        }
    }
    TokenizerPolicy::Approximate
}
