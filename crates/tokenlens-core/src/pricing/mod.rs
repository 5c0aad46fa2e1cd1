//! Cache-aware cost calculation
//!
//! A [`PricingTable`] maps normalized model names (or prefixes) to four
//! per-million rates. Lookup is a fallback cascade - exact match,
//! case-insensitive prefix, the reserved `"default"` entry, then a
//! zero-rate fallback - so an unknown model can never abort an analysis.
//! External tables merge over the embedded defaults at process start;
//! once merged the table is immutable for the process lifetime.

pub mod embedded;

use std::collections::BTreeMap;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CostEstimate, ReconciledUsage};

pub use embedded::EMBEDDED_PRICING;

/// Four per-million-token rates for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub cache_write_per_million: f64,
    pub cache_read_per_million: f64,
}

impl ModelPricing {
    /// Zero-rate last resort when even the `"default"` entry is absent
    pub fn zero() -> Self {
        Self {
            input_per_million: 0.0,
            output_per_million: 0.0,
            cache_write_per_million: 0.0,
            cache_read_per_million: 0.0,
        }
    }
}

/// Read-only pricing reference data
///
/// Keys are normalized model names or prefixes; a `BTreeMap` keeps
/// prefix resolution deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingTable {
    entries: BTreeMap<String, ModelPricing>,
}

impl PricingTable {
    /// Table seeded with the embedded defaults
    pub fn embedded() -> Self {
        Self {
            entries: EMBEDDED_PRICING
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Build from an already-parsed external map, layered over the
    /// embedded defaults. An empty map degrades to embedded-only.
    pub fn from_external(external: HashMap<String, ModelPricing>) -> Self {
        let mut table = Self::embedded();
        table.entries.extend(external);
        table
    }

    /// Strip a `provider/` prefix from a model name
    fn normalize(model: &str) -> &str {
        match model.split_once('/') {
            Some((_, rest)) => rest,
            None => model,
        }
    }

    /// Resolve pricing for a model name
    ///
    /// Cascade: exact key match, then the longest case-insensitive
    /// prefix key, then the `"default"` entry, then zero rates. Never
    /// errors for an unknown model.
    pub fn resolve(&self, model: &str) -> ModelPricing {
        let name = Self::normalize(model);

        if let Some(p) = self.entries.get(name) {
            return *p;
        }

        let lower = name.to_lowercase();
        let prefix_match = self
            .entries
            .iter()
            .filter(|(key, _)| *key != "default" && lower.starts_with(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len());
        if let Some((key, p)) = prefix_match {
            debug!(model = %model, key = %key, "Pricing resolved by prefix");
            return *p;
        }

        self.entries
            .get("default")
            .copied()
            .unwrap_or_else(ModelPricing::zero)
    }
}

/// Process-lifetime pricing table, lazily seeded with embedded defaults
static ACTIVE_TABLE: Lazy<RwLock<PricingTable>> = Lazy::new(|| RwLock::new(PricingTable::embedded()));

/// Snapshot of the process-wide pricing table
pub fn active_table() -> PricingTable {
    ACTIVE_TABLE.read().clone()
}

/// Merge an externally loaded table over the process-wide defaults
///
/// Intended to be called once at startup by whichever collaborator owns
/// table loading; malformed or empty data leaves the embedded defaults
/// in place.
pub fn install_external(external: HashMap<String, ModelPricing>) -> usize {
    let count = external.len();
    let merged = PricingTable::from_external(external);
    *ACTIVE_TABLE.write() = merged;
    count
}

/// Compute the cache-tiered cost estimate for reconciled usage
///
/// Reasoning tokens are billed at the output rate (providers bill
/// "thinking" as output). The subscription flag is set when real
/// assistant activity exists but the provider reported exactly zero
/// cost, implying a flat-rate plan.
pub fn estimate_cost(usage: &ReconciledUsage, pricing: &ModelPricing) -> CostEstimate {
    let input_cost = usage.input_tokens as f64 / 1_000_000.0 * pricing.input_per_million;
    let output_cost = (usage.output_tokens + usage.reasoning_tokens) as f64 / 1_000_000.0
        * pricing.output_per_million;
    let cache_read_cost =
        usage.cache_read_tokens as f64 / 1_000_000.0 * pricing.cache_read_per_million;
    let cache_write_cost =
        usage.cache_write_tokens as f64 / 1_000_000.0 * pricing.cache_write_per_million;

    let had_activity =
        usage.assistant_turns > 0 && (usage.input_tokens > 0 || usage.output_tokens > 0);
    let is_subscription = had_activity && usage.reported_cost_usd == 0.0;

    CostEstimate {
        input_cost,
        output_cost,
        cache_read_cost,
        cache_write_cost,
        total_cost: input_cost + output_cost + cache_read_cost + cache_write_cost,
        is_subscription,
    }
}
