//! Analysis result models
//!
//! Everything the engine produces for a single analysis: per-category
//! token summaries, reconciled usage, cost estimate, subtree totals and
//! the best-effort context snapshot. All of these are created fresh per
//! invocation and never mutated afterward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tokenizer::TokenizerPolicy;

/// Default number of ranked entries retained per category
pub const DEFAULT_TOP_N: usize = 10;

/// Semantic content category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    System,
    User,
    Assistant,
    Tools,
    Reasoning,
}

impl Category {
    /// Every category, in reporting order
    pub const ALL: [Category; 5] = [
        Category::System,
        Category::User,
        Category::Assistant,
        Category::Tools,
        Category::Reasoning,
    ];
}

/// One contributor within a category: a (label, token-count) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub label: String,
    pub tokens: u64,
}

impl CategoryEntry {
    pub fn new(label: impl Into<String>, tokens: u64) -> Self {
        Self {
            label: label.into(),
            tokens,
        }
    }
}

/// Token summary for one content category
///
/// Invariants: `total_tokens == sum(all_entries.tokens)` and `entries`
/// is the top-N prefix of `all_entries` sorted descending by tokens.
/// Zero-token entries are dropped entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySummary {
    pub total_tokens: u64,
    /// Capped ranked view (top-N by token count)
    pub entries: Vec<CategoryEntry>,
    /// Full list, sorted descending by token count
    pub all_entries: Vec<CategoryEntry>,
}

impl CategorySummary {
    /// Build a summary from raw entries: drop zeros, sort descending,
    /// cap the ranked view at `top_n`.
    pub fn from_entries(mut entries: Vec<CategoryEntry>, top_n: usize) -> Self {
        entries.retain(|e| e.tokens > 0);
        entries.sort_by(|a, b| b.tokens.cmp(&a.tokens));

        let total_tokens = entries.iter().map(|e| e.tokens).sum();
        let top = entries.iter().take(top_n).cloned().collect();

        Self {
            total_tokens,
            entries: top,
            all_entries: entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.all_entries.is_empty()
    }
}

/// Telemetry snapshot of a single API call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CallUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl CallUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.reasoning_tokens
            + self.cache_read_tokens
            + self.cache_write_tokens
    }
}

/// Reconciled per-analysis usage figures
///
/// Session-wide sums across every assistant turn carrying telemetry,
/// plus the "most recent non-zero call" snapshot used for inference and
/// request-composition math.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciledUsage {
    /// Fresh input tokens summed across the session
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,

    /// Provider-reported cost summed across the session (USD)
    pub reported_cost_usd: f64,

    /// Number of assistant turns ("API calls") observed
    pub assistant_turns: u64,

    /// Most recent call with a positive combined token sum, falling
    /// back to the chronologically last assistant call
    pub last_call: CallUsage,
}

/// Computed costs mirroring the four token buckets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_read_cost: f64,
    pub cache_write_cost: f64,
    pub total_cost: f64,

    /// True when real activity occurred but the provider reported zero
    /// cost, implying a flat-rate subscription plan
    pub is_subscription: bool,
}

impl CostEstimate {
    /// Human-readable cost, e.g. "$0.6161"
    pub fn cost_display(&self) -> String {
        format_cost(self.total_cost)
    }
}

/// One node in the subagent session tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNode {
    pub session_id: String,
    /// Human label derived from the session title
    pub label: String,
    pub usage: ReconciledUsage,
    pub cost: CostEstimate,
    /// Depth below the root session (direct children are 1)
    pub depth: usize,
}

/// Elementwise grand totals across a visited subtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtreeTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_cost: f64,
    /// Assistant-turn count across the subtree
    pub api_calls: u64,
    /// Nodes successfully visited
    pub nodes: u64,
}

impl SubtreeTotals {
    /// Fold one node's figures into the running totals
    pub fn absorb(&mut self, usage: &ReconciledUsage, cost: &CostEstimate) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.reasoning_tokens += usage.reasoning_tokens;
        self.cache_read_tokens += usage.cache_read_tokens;
        self.cache_write_tokens += usage.cache_write_tokens;
        self.total_cost += cost.total_cost;
        self.api_calls += usage.assistant_turns;
        self.nodes += 1;
    }
}

/// Flattened subtree aggregation result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtreeReport {
    /// Per-node summaries in visit order
    pub nodes: Vec<SessionNode>,
    pub totals: SubtreeTotals,
    /// True when a depth or node budget stopped the traversal early
    pub truncated: bool,
    /// Children skipped because their fetch failed
    pub failed_fetches: u64,
}

/// A labeled, non-overlapping span of the raw system prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPromptSection {
    pub label: String,
    pub tokens: u64,
    /// Half-open character range [start, end) in the source prompt
    pub start: usize,
    pub end: usize,
}

/// Per-tool definition token cost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolTokenEntry {
    pub name: String,
    pub description_tokens: u64,
    pub schema_tokens: u64,
}

impl ToolTokenEntry {
    pub fn total(&self) -> u64 {
        self.description_tokens + self.schema_tokens
    }
}

/// Cache-efficiency metrics derived from the reconciled usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheEfficiency {
    /// cacheRead / (cacheRead + freshInput), in [0, 1]
    pub hit_rate: f64,
    /// 1 - effective price paid relative to everything at list price
    pub effective_cost_reduction: f64,
}

/// Static-vs-dynamic split of the most recent call's input
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RequestComposition {
    /// Tool-definition tokens (static, cacheable)
    pub tool_tokens: u64,
    /// System-prompt tokens (static, cacheable)
    pub system_tokens: u64,
    /// Conversation history carried into the call (dynamic)
    pub history_tokens: u64,
    /// The latest user message (dynamic)
    pub last_user_tokens: u64,
}

/// Best-effort supplementary context view
///
/// Populated independently of the primary analysis; a failure here
/// leaves the slot empty rather than affecting the main result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub tool_description_tokens: u64,
    pub tool_schema_tokens: u64,
    /// Per-tool ranked list, descending by total tokens
    pub tool_entries: Vec<ToolTokenEntry>,
    /// Prompt sections, descending by token count
    pub prompt_sections: Vec<SystemPromptSection>,
    pub cache_efficiency: CacheEfficiency,
    pub request_composition: RequestComposition,
}

/// Complete result of one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAnalysis {
    pub system: CategorySummary,
    pub user: CategorySummary,
    pub assistant: CategorySummary,
    pub tools: CategorySummary,
    pub reasoning: CategorySummary,

    pub usage: ReconciledUsage,
    pub cost: CostEstimate,

    /// Present when subtree aggregation was requested and a session
    /// source was available
    pub subtree: Option<SubtreeReport>,

    /// Best-effort; None when decomposition failed or was not requested
    pub context: Option<ContextSnapshot>,

    /// Tokenizer policy the whole analysis was counted under
    pub policy: TokenizerPolicy,

    pub computed_at: DateTime<Utc>,
}

impl TokenAnalysis {
    /// Summary for one content category
    pub fn summary(&self, category: Category) -> &CategorySummary {
        match category {
            Category::System => &self.system,
            Category::User => &self.user,
            Category::Assistant => &self.assistant,
            Category::Tools => &self.tools,
            Category::Reasoning => &self.reasoning,
        }
    }

    /// Sum of the five (inference-corrected) category totals
    pub fn total_tokens(&self) -> u64 {
        Category::ALL
            .iter()
            .map(|c| self.summary(*c).total_tokens)
            .sum()
    }
}

/// Human-readable token count, e.g. "1.2M", "45.3K", "821"
pub fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

/// Human-readable USD cost with sub-cent precision
pub fn format_cost(cost: f64) -> String {
    if cost >= 1.0 {
        format!("${:.2}", cost)
    } else {
        format!("${:.4}", cost)
    }
}
