//! Subagent subtree aggregation
//!
//! Walks a session's descendant sessions depth-first through an
//! injected [`SessionSource`], computing per-node usage and cost from
//! telemetry and folding everything into running grand totals. A
//! failing child fetch is logged and skipped (zero contribution);
//! defensive depth and node budgets guard against malformed trees.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::models::{SessionNode, SubtreeReport, Turn};
use crate::pricing::PricingTable;
use crate::reconcile::session_usage;

/// A child-session reference: opaque id plus human title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSession {
    pub id: String,
    pub title: String,
}

/// External session store the aggregator depends on
///
/// Injected so the aggregation logic is testable against an in-memory
/// fake tree, including trees with intentionally failing nodes.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn get_turns(&self, session_id: &str) -> Result<Vec<Turn>, CoreError>;

    async fn get_child_sessions(&self, session_id: &str) -> Result<Vec<ChildSession>, CoreError>;
}

/// Bounds on total aggregation work
///
/// Subagent trees are user-controlled in depth and breadth; on
/// exceeding a bound the traversal stops descending and reports
/// partial totals instead of hanging.
#[derive(Debug, Clone, Copy)]
pub struct AggregationLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for AggregationLimits {
    fn default() -> Self {
        Self {
            max_depth: 16,
            max_nodes: 512,
        }
    }
}

static SUBAGENT_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\w+)\s+subagent").expect("subagent title regex"));

/// Extract a type label from a session title
///
/// `@<word> subagent` wins, then the first whitespace-delimited word,
/// then a generic placeholder.
pub fn label_from_title(title: &str) -> String {
    if let Some(caps) = SUBAGENT_TITLE.captures(title) {
        return caps[1].to_string();
    }
    title
        .split_whitespace()
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| "subagent".to_string())
}

fn model_from_turns(turns: &[Turn]) -> Option<String> {
    turns
        .iter()
        .rev()
        .filter(|t| t.is_assistant())
        .find_map(|t| t.telemetry.as_ref().and_then(|tel| tel.model_id.clone()))
}

/// Aggregate cost/usage across every descendant of `session_id`
///
/// Depth-first, siblings in listing order; totals are elementwise sums
/// so the result is independent of sibling order. The root session
/// itself is not included - it is the primary analysis's subject.
pub async fn aggregate(
    source: &dyn SessionSource,
    session_id: &str,
    table: &PricingTable,
    limits: AggregationLimits,
) -> SubtreeReport {
    let mut report = SubtreeReport::default();

    // Explicit DFS worklist; children are pushed in reverse so siblings
    // pop in listing order.
    let mut stack: Vec<(ChildSession, usize)> = Vec::new();
    push_children(source, session_id, 1, &mut stack, &mut report).await;

    while let Some((child, depth)) = stack.pop() {
        if report.nodes.len() >= limits.max_nodes {
            warn!(
                max_nodes = limits.max_nodes,
                "Node budget exhausted, reporting partial subtree totals"
            );
            report.truncated = true;
            break;
        }

        let turns = match source.get_turns(&child.id).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(session_id = %child.id, error = %e, "Skipping child session, fetch failed");
                report.failed_fetches += 1;
                continue;
            }
        };

        let usage = session_usage(&turns);
        let pricing = table.resolve(model_from_turns(&turns).as_deref().unwrap_or("default"));
        let cost = crate::pricing::estimate_cost(&usage, &pricing);

        report.totals.absorb(&usage, &cost);
        report.nodes.push(SessionNode {
            session_id: child.id.clone(),
            label: label_from_title(&child.title),
            usage,
            cost,
            depth,
        });

        if depth >= limits.max_depth {
            // Only flag truncation when the cap actually cuts something off
            match source.get_child_sessions(&child.id).await {
                Ok(children) if !children.is_empty() => {
                    debug!(session_id = %child.id, depth, "Depth cap reached, not descending further");
                    report.truncated = true;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id = %child.id, error = %e, "Child listing failed, treating as leaf");
                    report.failed_fetches += 1;
                }
            }
            continue;
        }
        push_children(source, &child.id, depth + 1, &mut stack, &mut report).await;
    }

    report
}

async fn push_children(
    source: &dyn SessionSource,
    session_id: &str,
    depth: usize,
    stack: &mut Vec<(ChildSession, usize)>,
    report: &mut SubtreeReport,
) {
    match source.get_child_sessions(session_id).await {
        Ok(children) => {
            for child in children.into_iter().rev() {
                stack.push((child, depth));
            }
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Child listing failed, treating as leaf");
            report.failed_fetches += 1;
        }
    }
}
