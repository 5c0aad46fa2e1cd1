//! Telemetry reconciliation
//!
//! Merges the classifier's locally estimated category totals with the
//! provider's authoritative-but-partial usage records: session-wide
//! sums, a "most recent non-zero call" snapshot, and the system-prompt
//! inference that fills the one category providers never echo back.

use tracing::debug;

use crate::classify::Classified;
use crate::models::{CallUsage, CategoryEntry, CategorySummary, ReconciledUsage, Turn};

/// Placeholder label for an inferred system-prompt entry
pub const INFERRED_SYSTEM_LABEL: &str = "System (inferred from API)";

fn snapshot(t: &crate::models::Telemetry) -> CallUsage {
    CallUsage {
        input_tokens: t.input_tokens,
        output_tokens: t.output_tokens,
        reasoning_tokens: t.reasoning_tokens,
        cache_read_tokens: t.cache_read_tokens,
        cache_write_tokens: t.cache_write_tokens,
    }
}

/// Select the canonical "most recent call" snapshot
///
/// Newest-first scan for the last assistant turn whose combined token
/// fields are positive; a session whose every call reports zero usage
/// still gets the chronologically last assistant snapshot.
fn last_call_snapshot(turns: &[Turn]) -> CallUsage {
    let mut fallback = None;
    for turn in turns.iter().rev() {
        let Some(t) = turn.telemetry.as_ref().filter(|_| turn.is_assistant()) else {
            continue;
        };
        if t.total_tokens() > 0 {
            return snapshot(t);
        }
        if fallback.is_none() {
            fallback = Some(snapshot(t));
        }
    }
    fallback.unwrap_or_default()
}

/// Inferred system-prompt size from the most recent call's input
///
/// The most recent call's total input covers the fully-expanded context
/// (system + tools + conversation + cache-carried history); subtracting
/// the locally observable user and tool content isolates the remainder,
/// which is attributed to "system". This is a documented approximation:
/// the remainder also absorbs any cache-carried history the classifier
/// never saw locally.
pub fn infer_system_tokens(last_call: &CallUsage, user_total: u64, tools_total: u64) -> u64 {
    let available = last_call.input_tokens + last_call.cache_read_tokens;
    available.saturating_sub(user_total + tools_total)
}

/// Session-wide telemetry sums plus the last-call snapshot
///
/// Used directly by the subtree aggregator, where per-node usage is
/// telemetry-only (no local classification).
pub fn session_usage(turns: &[Turn]) -> ReconciledUsage {
    let mut usage = ReconciledUsage {
        last_call: last_call_snapshot(turns),
        ..Default::default()
    };

    for turn in turns.iter().filter(|t| t.is_assistant()) {
        usage.assistant_turns += 1;
        let Some(t) = &turn.telemetry else { continue };
        usage.input_tokens += t.input_tokens;
        usage.output_tokens += t.output_tokens;
        usage.reasoning_tokens += t.reasoning_tokens;
        usage.cache_read_tokens += t.cache_read_tokens;
        usage.cache_write_tokens += t.cache_write_tokens;
        usage.reported_cost_usd += t.cost_usd;
    }

    usage
}

/// Produce the reconciled usage and apply the system-prompt fix-up
///
/// Inference only fills a gap: it fires when the classifier's system
/// total is exactly zero and never overrides a locally detected value,
/// so an analysis can never carry both a direct and an inferred system
/// entry.
pub fn reconcile(turns: &[Turn], classified: &mut Classified, top_n: usize) -> ReconciledUsage {
    let usage = session_usage(turns);

    if classified.system.total_tokens == 0 {
        let inferred = infer_system_tokens(
            &usage.last_call,
            classified.user.total_tokens,
            classified.tools.total_tokens,
        );
        if inferred > 0 {
            debug!(inferred, "Filling system category from telemetry inference");
            classified.system = CategorySummary::from_entries(
                vec![CategoryEntry::new(INFERRED_SYSTEM_LABEL, inferred)],
                top_n,
            );
        }
    }

    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, Telemetry};

    fn assistant_with(t: Telemetry) -> Turn {
        Turn {
            role: Role::Assistant,
            telemetry: Some(t),
            ..Default::default()
        }
    }

    fn classified_with_totals(system: u64, user: u64, tools: u64) -> Classified {
        let summary = |label: &str, tokens: u64| {
            CategorySummary::from_entries(vec![CategoryEntry::new(label, tokens)], 10)
        };
        Classified {
            system: summary("System#1", system),
            user: summary("User#1", user),
            tools: summary("bash", tools),
            ..Default::default()
        }
    }

    #[test]
    fn test_inference_formula_known_figures() {
        // freshInput=6, cacheRead=32912, userTotal=753, toolsTotal=15202
        let last = CallUsage {
            input_tokens: 6,
            cache_read_tokens: 32912,
            ..Default::default()
        };
        assert_eq!(infer_system_tokens(&last, 753, 15202), 16963);
    }

    #[test]
    fn test_inference_floors_at_zero() {
        let last = CallUsage {
            input_tokens: 10,
            cache_read_tokens: 0,
            ..Default::default()
        };
        assert_eq!(infer_system_tokens(&last, 500, 500), 0);
    }

    #[test]
    fn test_inference_fills_zero_system() {
        let turns = vec![assistant_with(Telemetry {
            input_tokens: 6,
            cache_read_tokens: 32912,
            output_tokens: 1,
            ..Default::default()
        })];
        let mut classified = classified_with_totals(0, 753, 15202);

        reconcile(&turns, &mut classified, 10);

        assert_eq!(classified.system.total_tokens, 16963);
        assert_eq!(classified.system.all_entries.len(), 1);
        assert_eq!(classified.system.all_entries[0].label, INFERRED_SYSTEM_LABEL);
    }

    #[test]
    fn test_inference_never_overrides_detected_system() {
        let turns = vec![assistant_with(Telemetry {
            input_tokens: 1000,
            cache_read_tokens: 50000,
            ..Default::default()
        })];
        let mut classified = classified_with_totals(4200, 100, 100);

        reconcile(&turns, &mut classified, 10);

        // Direct detection and inference are mutually exclusive
        assert_eq!(classified.system.total_tokens, 4200);
        assert_eq!(classified.system.all_entries[0].label, "System#1");
    }

    #[test]
    fn test_session_totals_sum_all_assistant_telemetry() {
        let turns = vec![
            Turn::text(Role::User, "hi"),
            assistant_with(Telemetry {
                input_tokens: 10,
                output_tokens: 20,
                cost_usd: 0.01,
                ..Default::default()
            }),
            assistant_with(Telemetry {
                input_tokens: 5,
                output_tokens: 15,
                reasoning_tokens: 7,
                cache_read_tokens: 100,
                cache_write_tokens: 50,
                cost_usd: 0.02,
                ..Default::default()
            }),
        ];
        let mut classified = classified_with_totals(1, 1, 1);
        let usage = reconcile(&turns, &mut classified, 10);

        assert_eq!(usage.input_tokens, 15);
        assert_eq!(usage.output_tokens, 35);
        assert_eq!(usage.reasoning_tokens, 7);
        assert_eq!(usage.cache_read_tokens, 100);
        assert_eq!(usage.cache_write_tokens, 50);
        assert_eq!(usage.assistant_turns, 2);
        assert!((usage.reported_cost_usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_last_call_skips_zero_usage() {
        let turns = vec![
            assistant_with(Telemetry {
                input_tokens: 100,
                output_tokens: 10,
                ..Default::default()
            }),
            assistant_with(Telemetry::default()),
        ];
        let last = last_call_snapshot(&turns);
        assert_eq!(last.input_tokens, 100);
    }

    #[test]
    fn test_last_call_fallback_to_all_zero() {
        // A session with exactly one zero-usage call still needs a snapshot
        let turns = vec![assistant_with(Telemetry::default())];
        let last = last_call_snapshot(&turns);
        assert_eq!(last, CallUsage::default());
    }

    #[test]
    fn test_no_telemetry_at_all() {
        let turns = vec![Turn::text(Role::User, "hello there")];
        let mut classified = classified_with_totals(0, 3, 0);
        let usage = reconcile(&turns, &mut classified, 10);
        assert_eq!(usage.assistant_turns, 0);
        assert_eq!(usage.last_call.total(), 0);
        // Inference yields zero, so no placeholder entry appears
        assert!(classified.system.is_empty());
    }
}
