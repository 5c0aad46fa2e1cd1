//! Analysis orchestration
//!
//! Wires the pipeline together: tokenizer selection, concurrent
//! classification, telemetry reconciliation, cost estimation, optional
//! subtree aggregation and the best-effort context snapshot. Only an
//! empty turn list surfaces as an error; every internal failure
//! degrades with a fallback and a logged warning.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::classify::classify;
use crate::context::{build_snapshot, fetch_tools, ToolCatalog};
use crate::error::CoreError;
use crate::models::{TokenAnalysis, Turn, DEFAULT_TOP_N};
use crate::pricing::{estimate_cost, PricingTable};
use crate::reconcile::reconcile;
use crate::subtree::{aggregate, AggregationLimits, SessionSource};
use crate::tokenizer::{select_policy, TokenResolver};

/// Knobs for a single analysis
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Ranked entries retained per category
    pub top_n: usize,
    /// Walk descendant sessions (requires a session source)
    pub include_subtree: bool,
    /// Produce the best-effort context snapshot
    pub include_context: bool,
    pub limits: AggregationLimits,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            include_subtree: false,
            include_context: true,
            limits: AggregationLimits::default(),
        }
    }
}

/// The engine facade
///
/// Holds the process-lifetime shared state (encoder cache, pricing
/// table) and the injected collaborators. Cheap to share behind an
/// `Arc`; each call to [`Analyzer::analyze_turns`] is stateless over
/// its input.
pub struct Analyzer {
    resolver: Arc<TokenResolver>,
    table: PricingTable,
    source: Option<Arc<dyn SessionSource>>,
    catalog: Option<Arc<dyn ToolCatalog>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// Analyzer with the process-wide pricing table and no external
    /// collaborators
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(TokenResolver::new()),
            table: crate::pricing::active_table(),
            source: None,
            catalog: None,
        }
    }

    pub fn with_pricing(mut self, table: PricingTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn SessionSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn resolver(&self) -> &Arc<TokenResolver> {
        &self.resolver
    }

    /// Fetch a session's turns and analyze them
    pub async fn analyze_session(
        &self,
        session_id: &str,
        opts: &AnalysisOptions,
    ) -> Result<TokenAnalysis, CoreError> {
        let source = self.source.as_ref().ok_or_else(|| {
            CoreError::session_fetch(session_id, "no session source configured")
        })?;
        let turns = source.get_turns(session_id).await?;
        self.analyze_turns(session_id, &turns, opts).await
    }

    /// Analyze an already-fetched turn sequence
    ///
    /// `session_id` identifies the session for error reporting and as
    /// the subtree root when aggregation is requested.
    pub async fn analyze_turns(
        &self,
        session_id: &str,
        turns: &[Turn],
        opts: &AnalysisOptions,
    ) -> Result<TokenAnalysis, CoreError> {
        if turns.is_empty() {
            return Err(CoreError::NoTurns {
                session_id: session_id.to_string(),
            });
        }

        let policy = select_policy(turns);
        debug!(session_id = %session_id, policy = %policy, "Starting analysis");

        let mut classified =
            classify(turns, self.resolver.clone(), &policy, opts.top_n).await;
        let usage = reconcile(turns, &mut classified, opts.top_n);

        let pricing = self
            .table
            .resolve(newest_model(turns).as_deref().unwrap_or("default"));
        let cost = estimate_cost(&usage, &pricing);

        let subtree = match (&self.source, opts.include_subtree) {
            (Some(source), true) => {
                Some(aggregate(source.as_ref(), session_id, &self.table, opts.limits).await)
            }
            _ => None,
        };

        let context = if opts.include_context {
            let tools = match (&self.catalog, newest_identity(turns)) {
                (Some(catalog), Some((provider, model))) => {
                    fetch_tools(catalog.as_ref(), &provider, &model).await
                }
                _ => Vec::new(),
            };
            Some(
                build_snapshot(
                    turns,
                    &usage,
                    classified.system.total_tokens,
                    &tools,
                    &self.resolver,
                    &policy,
                )
                .await,
            )
        } else {
            None
        };

        Ok(TokenAnalysis {
            system: classified.system,
            user: classified.user,
            assistant: classified.assistant,
            tools: classified.tools,
            reasoning: classified.reasoning,
            usage,
            cost,
            subtree,
            context,
            policy,
            computed_at: Utc::now(),
        })
    }
}

/// Model id of the newest assistant turn carrying telemetry
fn newest_model(turns: &[Turn]) -> Option<String> {
    turns
        .iter()
        .rev()
        .filter(|t| t.is_assistant())
        .find_map(|t| t.telemetry.as_ref().and_then(|tel| tel.model_id.clone()))
}

/// (provider, model) identity of the newest assistant turn
fn newest_identity(turns: &[Turn]) -> Option<(String, String)> {
    turns.iter().rev().filter(|t| t.is_assistant()).find_map(|t| {
        let tel = t.telemetry.as_ref()?;
        Some((tel.provider_id.clone()?, tel.model_id.clone()?))
    })
}
