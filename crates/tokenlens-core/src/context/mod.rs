//! Context decomposition
//!
//! Best-effort supplementary view of a request's static context: what
//! the tool schemas cost, how the system prompt breaks into sections,
//! how well the cache is working and how the most recent call's input
//! splits into static and dynamic buckets. Failures here must never
//! affect the primary analysis; the analyzer wraps this module in its
//! own failure boundary and simply drops the snapshot on error.

pub mod sections;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::CoreError;
use crate::models::{
    CacheEfficiency, ContextSnapshot, ReconciledUsage, RequestComposition, Role, ToolTokenEntry,
    Turn,
};
use crate::tokenizer::{TokenResolver, TokenizerPolicy};

pub use sections::decompose_prompt;

/// One tool definition available to the current model
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub id: String,
    pub description: String,
    pub parameter_schema: Value,
}

/// External tool-definition catalog
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn get_tool_definitions(
        &self,
        provider_id: &str,
        model_id: &str,
    ) -> Result<Vec<ToolDefinition>, CoreError>;
}

/// Tokenize each tool's description and serialized parameter schema
///
/// Counted separately so schema bloat is visible on its own; the
/// per-tool list comes back ranked descending by combined cost.
pub fn tool_token_entries(
    tools: &[ToolDefinition],
    resolver: &TokenResolver,
    policy: &TokenizerPolicy,
) -> Vec<ToolTokenEntry> {
    let mut entries: Vec<ToolTokenEntry> = tools
        .iter()
        .map(|tool| {
            let schema = serde_json::to_string(&tool.parameter_schema).unwrap_or_default();
            ToolTokenEntry {
                name: tool.id.clone(),
                description_tokens: resolver.count(&tool.description, policy),
                schema_tokens: resolver.count(&schema, policy),
            }
        })
        .collect();
    entries.sort_by(|a, b| b.total().cmp(&a.total()));
    entries
}

/// Cache-efficiency metrics from session token buckets
///
/// Hit rate is reads over reads-plus-fresh. Effective cost reduction
/// compares the blended price actually paid (reads at 10% of list,
/// writes at a 25% premium) against everything at list price.
pub fn cache_efficiency(usage: &ReconciledUsage) -> CacheEfficiency {
    let fresh = usage.input_tokens as f64;
    let read = usage.cache_read_tokens as f64;
    let write = usage.cache_write_tokens as f64;

    let hit_rate = if fresh + read > 0.0 {
        read / (fresh + read)
    } else {
        0.0
    };

    let denominator = fresh + read + write;
    let effective_cost_reduction = if denominator > 0.0 {
        1.0 - (fresh + read * 0.1 + write * 1.25) / denominator
    } else {
        0.0
    };

    CacheEfficiency {
        hit_rate,
        effective_cost_reduction,
    }
}

/// Split the most recent call's total input into static and dynamic
/// buckets
///
/// The latest-user-message bucket is re-tokenized with the analysis
/// policy so units stay consistent with the rest of the report; history
/// is the remainder after subtracting the other buckets, floored at
/// zero.
pub fn request_composition(
    turns: &[Turn],
    usage: &ReconciledUsage,
    system_tokens: u64,
    tool_tokens: u64,
    resolver: &TokenResolver,
    policy: &TokenizerPolicy,
) -> RequestComposition {
    let last_user_tokens = turns
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| resolver.count(&t.text_content(), policy))
        .unwrap_or(0);

    let total_input = usage.last_call.input_tokens
        + usage.last_call.cache_read_tokens
        + usage.last_call.cache_write_tokens;
    let history_tokens =
        total_input.saturating_sub(tool_tokens + system_tokens + last_user_tokens);

    RequestComposition {
        tool_tokens,
        system_tokens,
        history_tokens,
        last_user_tokens,
    }
}

/// First raw system prompt found in the turn sequence
fn raw_system_prompt(turns: &[Turn]) -> Option<String> {
    for turn in turns {
        if turn.role == Role::System {
            let text = turn.text_content();
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
        if let Some(prompt) = turn.system_prompts.iter().find(|p| !p.trim().is_empty()) {
            return Some(prompt.clone());
        }
    }
    None
}

/// Assemble the full best-effort context snapshot
///
/// The tool-definition and system-prompt tokenizations are independent
/// of each other (and of the primary pipeline), so they run
/// concurrently. `tools` may be empty when the catalog was unavailable;
/// every other input comes from the already-computed primary analysis.
pub async fn build_snapshot(
    turns: &[Turn],
    usage: &ReconciledUsage,
    system_tokens: u64,
    tools: &[ToolDefinition],
    resolver: &std::sync::Arc<TokenResolver>,
    policy: &TokenizerPolicy,
) -> ContextSnapshot {
    let tool_task = {
        let resolver = resolver.clone();
        let policy = policy.clone();
        let tools = tools.to_vec();
        tokio::task::spawn_blocking(move || tool_token_entries(&tools, &resolver, &policy))
    };
    let section_task = {
        let resolver = resolver.clone();
        let policy = policy.clone();
        let prompt = raw_system_prompt(turns);
        tokio::task::spawn_blocking(move || match prompt {
            Some(prompt) => decompose_prompt(&prompt, &resolver, &policy),
            None => Vec::new(),
        })
    };

    // A panicking tokenization task surfaces as a JoinError; the slot
    // degrades to empty rather than re-running the panic inline.
    let (tool_entries, prompt_sections) = tokio::join!(tool_task, section_task);
    let tool_entries = tool_entries.unwrap_or_else(|e| {
        warn!(error = %e, "Tool tokenization task failed, omitting tool entries");
        Vec::new()
    });
    let prompt_sections = prompt_sections.unwrap_or_else(|e| {
        warn!(error = %e, "Prompt sectioning task failed, omitting prompt sections");
        Vec::new()
    });

    let tool_description_tokens = tool_entries.iter().map(|e| e.description_tokens).sum();
    let tool_schema_tokens: u64 = tool_entries.iter().map(|e| e.schema_tokens).sum();

    let composition = request_composition(
        turns,
        usage,
        system_tokens,
        tool_description_tokens + tool_schema_tokens,
        resolver,
        policy,
    );

    ContextSnapshot {
        tool_description_tokens,
        tool_schema_tokens,
        tool_entries,
        prompt_sections,
        cache_efficiency: cache_efficiency(usage),
        request_composition: composition,
    }
}

/// Fetch tool definitions, degrading to an empty list on failure
pub async fn fetch_tools(catalog: &dyn ToolCatalog, provider_id: &str, model_id: &str) -> Vec<ToolDefinition> {
    match catalog.get_tool_definitions(provider_id, model_id).await {
        Ok(tools) => tools,
        Err(e) => {
            warn!(provider = %provider_id, model = %model_id, error = %e, "Tool catalog unavailable, continuing without tool definitions");
            Vec::new()
        }
    }
}
