//! tokenlens-core - Token & cost accounting engine for AI-agent sessions
//!
//! Ingests a hierarchical log of agent conversation turns and produces
//! an accounting of token consumption by semantic category and its
//! monetary cost, reconciling local estimates against partial provider
//! telemetry. The engine is an estimator, not a provider clone: it
//! degrades to documented fallbacks instead of failing, and the only
//! error it surfaces is a session with nothing to analyze.

pub mod analysis;
pub mod classify;
pub mod context;
pub mod error;
pub mod models;
pub mod pricing;
pub mod reconcile;
pub mod subtree;
pub mod tokenizer;

pub use analysis::{AnalysisOptions, Analyzer};
pub use classify::Classified;
pub use context::{ToolCatalog, ToolDefinition};
pub use error::CoreError;
pub use models::{
    CategoryEntry, CategorySummary, ContextSnapshot, CostEstimate, ReconciledUsage, SessionNode,
    SubtreeReport, TokenAnalysis, Turn,
};
pub use pricing::{estimate_cost, ModelPricing, PricingTable};
pub use subtree::{AggregationLimits, ChildSession, SessionSource};
pub use tokenizer::{TokenEncoder, TokenResolver, TokenizerPolicy};
