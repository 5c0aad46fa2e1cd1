//! Data models for tokenlens

pub mod analysis;
pub mod turn;

pub use analysis::{
    CacheEfficiency, CallUsage, Category, CategoryEntry, CategorySummary, ContextSnapshot,
    CostEstimate, ReconciledUsage, RequestComposition, SessionNode, SubtreeReport, SubtreeTotals,
    SystemPromptSection, TokenAnalysis, ToolTokenEntry, format_cost, format_tokens, DEFAULT_TOP_N,
};
pub use turn::{ContentPart, Role, Telemetry, ToolStatus, Turn};
